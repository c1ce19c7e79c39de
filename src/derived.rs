//! Per-halo fields computed from group membership: host-centric radius, peer
//! count and mass rank among peers. Field (host-less) halos get NaN.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::config::DerivedField;
use crate::rank::rank;
use crate::record::{fields, Column, HaloRecord, NO_HOST};
use crate::HaloError;

fn int_column<'a>(record: &'a HaloRecord, name: &str) -> Result<&'a [i64], HaloError> {
    record.ints(name).ok_or_else(|| HaloError::MissingField {
        snap: record.snap,
        field: name.to_string(),
    })
}

fn float_column(record: &HaloRecord, name: &str) -> Result<Vec<f64>, HaloError> {
    record
        .column(name)
        .map(Column::to_f64)
        .ok_or_else(|| HaloError::MissingField {
            snap: record.snap,
            field: name.to_string(),
        })
}

/// Local index of the halo whose `ID` equals `host_id`.
pub fn host_index(ids: &[i64], host_id: i64) -> Option<usize> {
    ids.iter().position(|&id| id == host_id)
}

/// Distance to the host's centre in units of the host's `R_200crit`.
pub fn relative_radius(record: &HaloRecord) -> Result<Vec<f64>, HaloError> {
    let ids = int_column(record, fields::ID)?;
    let hosts = int_column(record, fields::HOST_ID)?;
    let xc = float_column(record, fields::XC)?;
    let yc = float_column(record, fields::YC)?;
    let zc = float_column(record, fields::ZC)?;
    let radius = float_column(record, fields::R_200CRIT)?;

    let out = hosts
        .iter()
        .enumerate()
        .map(|(ihalo, &host_id)| {
            if host_id == NO_HOST {
                return f64::NAN;
            }
            let Some(ihost) = host_index(ids, host_id) else {
                warn!(snap = record.snap, ihalo, host_id, "host not found in snapshot");
                return f64::NAN;
            };
            let dx = xc[ihalo] - xc[ihost];
            let dy = yc[ihalo] - yc[ihost];
            let dz = zc[ihalo] - zc[ihost];
            (dx * dx + dy * dy + dz * dz).sqrt() / radius[ihost]
        })
        .collect();
    Ok(out)
}

/// Number of other halos sharing each halo's host.
pub fn peer_counts(record: &HaloRecord) -> Result<Vec<f64>, HaloError> {
    let hosts = int_column(record, fields::HOST_ID)?;

    let mut members: FxHashMap<i64, usize> = FxHashMap::default();
    for &host_id in hosts.iter().filter(|&&h| h != NO_HOST) {
        *members.entry(host_id).or_insert(0) += 1;
    }

    Ok(hosts
        .iter()
        .map(|host_id| match members.get(host_id) {
            Some(&n) => (n - 1) as f64,
            None => f64::NAN,
        })
        .collect())
}

/// Rank by `Mass_200crit` among the halos sharing a host; 1 is the most massive.
pub fn subhalo_ranks(record: &HaloRecord) -> Result<Vec<f64>, HaloError> {
    let hosts = int_column(record, fields::HOST_ID)?;
    let mass = float_column(record, fields::MASS_200CRIT)?;

    let mut out = vec![f64::NAN; hosts.len()];
    let mut processed: FxHashSet<i64> = FxHashSet::default();
    for &host_id in hosts {
        if host_id == NO_HOST || !processed.insert(host_id) {
            continue;
        }
        let peers: Vec<usize> = hosts
            .iter()
            .enumerate()
            .filter(|&(_, &h)| h == host_id)
            .map(|(i, _)| i)
            .collect();
        let peer_mass: Vec<f64> = peers.iter().map(|&i| mass[i]).collect();
        for (&peer, r) in peers.iter().zip(rank(&peer_mass)) {
            out[peer] = r as f64;
        }
    }
    Ok(out)
}

pub fn compute(record: &HaloRecord, field: DerivedField) -> Result<Vec<f64>, HaloError> {
    match field {
        DerivedField::RelativeRadius => relative_radius(record),
        DerivedField::PeerCount => peer_counts(record),
        DerivedField::SubhaloRank => subhalo_ranks(record),
    }
}

/// Add every requested derived field to `record`.
///
/// A field that cannot be computed is logged and left out; the others are still
/// added. Returns the fields that failed.
pub fn add_derived_fields(record: &mut HaloRecord, wanted: &[DerivedField]) -> Vec<DerivedField> {
    let mut failed = Vec::new();
    for &field in wanted {
        let result = compute(record, field)
            .and_then(|values| record.insert_column(field.field_name(), Column::Float(values)));
        match result {
            Ok(()) => debug!(snap = record.snap, field = field.field_name(), "added derived field"),
            Err(e) => {
                warn!(snap = record.snap, field = field.field_name(), error = %e, "skipping derived field");
                failed.push(field);
            }
        }
    }
    failed
}
