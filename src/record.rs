//! Per-snapshot halo records.
//!
//! A [`HaloRecord`] is a struct-of-arrays: one [`Column`] per field, every column
//! as long as the snapshot's halo count. Record-level metadata (snapshot index,
//! file paths, simulation info) lives beside the columns and survives projection.

use bincode::{Decode, Encode};
use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Index;

use crate::HaloError;

/// Well-known column names.
pub mod fields {
    pub const ID: &str = "ID";
    pub const HOST_ID: &str = "HostID";
    pub const HEAD: &str = "Head";
    pub const TAIL: &str = "Tail";
    pub const STRUCTURE_TYPE: &str = "Structuretype";
    pub const NUM_SUBSTRUCT: &str = "numSubStruct";

    pub const MASS_200CRIT: &str = "Mass_200crit";
    pub const R_200CRIT: &str = "R_200crit";
    pub const XC: &str = "Xc";
    pub const YC: &str = "Yc";
    pub const ZC: &str = "Zc";

    pub const R_REL: &str = "R_rel";
    pub const N_PEERS: &str = "N_peers";
    pub const SUBHALO_RANK: &str = "Subhalo_rank";

    /// Fields requested from the structure finder when assembling the base catalog.
    pub const BASE: [&str; 4] = [ID, HOST_ID, STRUCTURE_TYPE, NUM_SUBSTRUCT];

    /// Columns kept in the reduced checkpoint tier.
    pub const REDUCED: [&str; 6] = [ID, HOST_ID, HEAD, TAIL, STRUCTURE_TYPE, NUM_SUBSTRUCT];
}

/// `HostID` of a halo with no host.
pub const NO_HOST: i64 = -1;

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Column::Int(v) => Some(v),
            Column::Float(_) => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Column::Float(v) => Some(v),
            Column::Int(_) => None,
        }
    }

    /// Values widened to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Column::Int(v) => v.iter().map(|&x| x as f64).collect(),
            Column::Float(v) => v.clone(),
        }
    }

    /// Multiply every value by `factor`; integer columns become float columns.
    pub fn scaled(&self, factor: f64) -> Column {
        Column::Float(self.to_f64().into_iter().map(|x| x * factor).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Availability {
    Available,
    /// No input data for this snapshot; the record only holds placeholder metadata.
    Padded,
}

#[derive(Debug, Clone, PartialEq, Default, Encode, Decode, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationInfo {
    pub h_val: f64,
    pub hubble_unit: f64,
    pub omega_lambda: f64,
    pub scale_factor: f64,
    pub period: f64,
    pub z: Option<f64>,
    pub lookback_time: Option<f64>,
    pub box_size_comoving: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct HaloRecord {
    pub snap: usize,
    pub availability: Availability,
    pub count: usize,
    pub catalog_path: Option<String>,
    pub catalog_file_type: u32,
    pub particle_path: Option<String>,
    pub particle_file_type: String,
    pub outname: String,
    pub simulation: Option<SimulationInfo>,
    pub units: BTreeMap<String, f64>,
    columns: BTreeMap<String, Column>,
}

impl HaloRecord {
    /// A snapshot with halo data and no columns yet.
    pub fn available(snap: usize, count: usize) -> Self {
        HaloRecord {
            snap,
            availability: Availability::Available,
            count,
            catalog_path: None,
            catalog_file_type: 0,
            particle_path: None,
            particle_file_type: String::new(),
            outname: String::new(),
            simulation: None,
            units: BTreeMap::new(),
            columns: BTreeMap::new(),
        }
    }

    /// A padded snapshot: snapshot index and particle file metadata only.
    pub fn placeholder(snap: usize, particle_path: Option<String>, particle_file_type: &str) -> Self {
        HaloRecord {
            snap,
            availability: Availability::Padded,
            count: 0,
            catalog_path: None,
            catalog_file_type: 0,
            particle_path,
            particle_file_type: particle_file_type.to_string(),
            outname: String::new(),
            simulation: None,
            units: BTreeMap::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn ints(&self, name: &str) -> Option<&[i64]> {
        self.columns.get(name).and_then(Column::as_ints)
    }

    pub fn floats(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).and_then(Column::as_floats)
    }

    pub fn ints_mut(&mut self, name: &str) -> Option<&mut Vec<i64>> {
        match self.columns.get_mut(name) {
            Some(Column::Int(v)) => Some(v),
            _ => None,
        }
    }

    /// Insert or replace a column. Its length must match the halo count.
    pub fn insert_column(&mut self, name: &str, column: Column) -> Result<(), HaloError> {
        if column.len() != self.count {
            return Err(HaloError::InvalidArgument(format!(
                "column {} has {} values but snap {} has {} halos",
                name,
                column.len(),
                self.snap,
                self.count
            )));
        }
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        self.columns.remove(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn retain_columns<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.columns.retain(|name, _| keep(name));
    }
}

/// One record per configured snapshot, in simulation time order.
#[derive(Debug, Clone, PartialEq, Default, Encode, Decode)]
pub struct SnapshotSet {
    records: Vec<HaloRecord>,
}

impl SnapshotSet {
    pub fn new(records: Vec<HaloRecord>) -> Self {
        SnapshotSet { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, snap: usize) -> Option<&HaloRecord> {
        self.records.get(snap)
    }

    pub fn get_mut(&mut self, snap: usize) -> Option<&mut HaloRecord> {
        self.records.get_mut(snap)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HaloRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, HaloRecord> {
        self.records.iter_mut()
    }

    pub fn records(&self) -> &[HaloRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<HaloRecord> {
        self.records
    }

    /// Bit `s` is set when snapshot `s` holds real halo data.
    pub fn availability_mask(&self) -> FixedBitSet {
        let mut mask = FixedBitSet::with_capacity(self.records.len());
        for (snap, record) in self.records.iter().enumerate() {
            mask.set(snap, record.is_available());
        }
        mask
    }
}

impl Index<usize> for SnapshotSet {
    type Output = HaloRecord;

    fn index(&self, snap: usize) -> &HaloRecord {
        &self.records[snap]
    }
}

impl<'a> IntoIterator for &'a SnapshotSet {
    type Item = &'a HaloRecord;
    type IntoIter = std::slice::Iter<'a, HaloRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_column_checks_length() {
        let mut record = HaloRecord::available(2, 3);
        assert!(record.insert_column(fields::ID, Column::Int(vec![1, 2, 3])).is_ok());
        let err = record.insert_column(fields::HOST_ID, Column::Int(vec![1])).unwrap_err();
        assert!(matches!(err, HaloError::InvalidArgument(_)));
        assert!(record.has_field(fields::ID));
        assert!(!record.has_field(fields::HOST_ID));
    }

    #[test]
    fn test_typed_accessors() {
        let mut record = HaloRecord::available(0, 2);
        record.insert_column("Mass", Column::Float(vec![1.5, 2.5])).unwrap();
        record.insert_column(fields::ID, Column::Int(vec![4, 9])).unwrap();
        assert_eq!(record.floats("Mass"), Some(&[1.5, 2.5][..]));
        assert_eq!(record.ints("Mass"), None);
        assert_eq!(record.ints(fields::ID), Some(&[4, 9][..]));
        assert_eq!(record.column("missing"), None);
    }

    #[test]
    fn test_scaled_int_column_becomes_float() {
        let col = Column::Int(vec![1, 2]);
        assert_eq!(col.scaled(0.5), Column::Float(vec![0.5, 1.0]));
    }

    #[test]
    fn test_placeholder_is_padded() {
        let record = HaloRecord::placeholder(4, None, "EAGLE");
        assert!(!record.is_available());
        assert_eq!(record.snap, 4);
        assert_eq!(record.particle_path, None);
        assert_eq!(record.particle_file_type, "EAGLE");
        assert_eq!(record.field_names().count(), 0);
    }

    #[test]
    fn test_availability_mask() {
        let set = SnapshotSet::new(vec![
            HaloRecord::placeholder(0, None, "SWIFT"),
            HaloRecord::available(1, 0),
            HaloRecord::available(2, 0),
        ]);
        let mask = set.availability_mask();
        assert!(!mask.contains(0));
        assert!(mask.contains(1));
        assert!(mask.contains(2));
        assert_eq!(mask.count_ones(..), 2);
    }
}
