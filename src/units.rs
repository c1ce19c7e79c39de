use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::Column;

/// Catalog-native mass unit, in units of `1 / h` solar masses.
pub const MASS_UNIT: f64 = 1.0e10;

/// How a catalog field converts to physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Scaled by `10^10 / h`.
    Mass,
    /// Positions and radii stay in catalog units.
    Length,
    #[default]
    None,
}

pub type UnitTable = BTreeMap<String, UnitKind>;

/// Factor applied to a field of the given kind for Hubble parameter `h`.
pub fn physical_factor(kind: UnitKind, h: f64) -> f64 {
    match kind {
        UnitKind::Mass => MASS_UNIT / h,
        UnitKind::Length | UnitKind::None => 1.0,
    }
}

/// Convert `column` to physical units, or return `None` when it is already physical.
pub fn to_physical(column: &Column, kind: UnitKind, h: f64) -> Option<Column> {
    match kind {
        UnitKind::Mass => Some(column.scaled(physical_factor(kind, h))),
        UnitKind::Length | UnitKind::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_scaled_by_hubble() {
        let col = Column::Float(vec![1.0, 2.0]);
        let out = to_physical(&col, UnitKind::Mass, 0.5).unwrap();
        assert_eq!(out, Column::Float(vec![2.0e10, 4.0e10]));
    }

    #[test]
    fn test_length_untouched() {
        let col = Column::Float(vec![3.0]);
        assert_eq!(to_physical(&col, UnitKind::Length, 0.7), None);
        assert_eq!(physical_factor(UnitKind::Length, 0.7), 1.0);
    }

    #[test]
    fn test_unit_kind_parses_lowercase() {
        let table: UnitTable = serde_json::from_str(r#"{"Mass_tot":"mass","Xc":"length"}"#).unwrap();
        assert_eq!(table["Mass_tot"], UnitKind::Mass);
        assert_eq!(table["Xc"], UnitKind::Length);
    }
}
