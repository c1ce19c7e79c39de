use crate::record::SimulationInfo;
use crate::sources::Cosmology;

/// Hubble time in Gyr for H0 = 1 km/s/Mpc.
const HUBBLE_TIME_GYR: f64 = 977.792_221_513_197_9;

const INTEGRATION_STEPS: usize = 2048;

/// Flat Lambda-CDM background with no radiation term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatLambdaCdm {
    /// km/s/Mpc
    pub h0: f64,
    pub omega_m: f64,
}

impl FlatLambdaCdm {
    pub fn new(h0: f64, omega_m: f64) -> Self {
        FlatLambdaCdm { h0, omega_m }
    }

    /// Background for a snapshot's simulation header, or `None` when it has no
    /// usable Hubble parameter. `hubble_unit` defaults to 100.
    pub fn from_simulation(info: &SimulationInfo) -> Option<Self> {
        if info.h_val <= 0.0 {
            return None;
        }
        let unit = if info.hubble_unit > 0.0 { info.hubble_unit } else { 100.0 };
        Some(FlatLambdaCdm::new(info.h_val * unit, 1.0 - info.omega_lambda))
    }

    fn efunc(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        (self.omega_m * zp1 * zp1 * zp1 + (1.0 - self.omega_m)).sqrt()
    }
}

impl Cosmology for FlatLambdaCdm {
    fn lookback_time(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        // Simpson's rule over dz / ((1 + z) E(z)).
        let integrand = |x: f64| 1.0 / ((1.0 + x) * self.efunc(x));
        let step = z / INTEGRATION_STEPS as f64;
        let mut sum = integrand(0.0) + integrand(z);
        for i in 1..INTEGRATION_STEPS {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight * integrand(i as f64 * step);
        }
        HUBBLE_TIME_GYR / self.h0 * sum * step / 3.0
    }
}
