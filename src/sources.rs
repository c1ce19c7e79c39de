//! Interfaces to the external structure finder, tree builder, particle store and
//! cosmology.
//!
//! The pipeline only talks to these traits. [`crate::json_source`] provides a
//! file-backed implementation; tests use in-memory fakes.

use bincode::{Decode, Encode};
use std::collections::BTreeMap;

use crate::record::{Column, HaloRecord, SimulationInfo};
use crate::units::UnitTable;
use crate::HaloError;

/// Base fields for one snapshot as returned by the structure finder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BaseCatalog {
    pub count: usize,
    pub columns: BTreeMap<String, Column>,
    pub simulation: Option<SimulationInfo>,
    pub units: BTreeMap<String, f64>,
}

/// Additional per-halo properties and the unit kind of each.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyBlock {
    pub columns: BTreeMap<String, Column>,
    pub unit_kinds: UnitTable,
}

pub trait CatalogReader: Send + Sync {
    /// `Ok(None)` when the finder has no catalog at `path`.
    fn read_base_fields(
        &self,
        path: &str,
        file_type: u32,
        fields: &[&str],
    ) -> Result<Option<BaseCatalog>, HaloError>;

    /// Every property the catalog at `path` can provide. A missing property file is
    /// [`HaloError::MissingInput`].
    fn available_fields(&self, path: &str, file_type: u32) -> Result<Vec<String>, HaloError>;

    fn read_properties(
        &self,
        path: &str,
        file_type: u32,
        fields: &[String],
    ) -> Result<PropertyBlock, HaloError>;
}

pub trait TreeReader {
    type Tree;

    fn read_descendant_tree(&self, files: &[String], file_type: u32) -> Result<Self::Tree, HaloError>;

    /// Attach `Head` and `Tail` columns to `records`, which are the available
    /// snapshots in time order; `counts[k]` is the halo count of `records[k]`.
    fn build_head_tail(
        &self,
        tree: &Self::Tree,
        counts: &[usize],
        records: &mut [HaloRecord],
        multiplier: i64,
    ) -> Result<(), HaloError>;
}

/// Particle membership of every halo at one snapshot.
#[derive(Debug, Clone, PartialEq, Default, Encode, Decode)]
pub struct ParticleLists {
    pub particle_ids: Vec<Vec<i64>>,
    pub particle_types: Vec<Vec<u8>>,
    pub npart: Vec<usize>,
}

impl ParticleLists {
    pub fn new(particle_ids: Vec<Vec<i64>>, particle_types: Vec<Vec<u8>>) -> Self {
        let npart = particle_ids.iter().map(Vec::len).collect();
        ParticleLists {
            particle_ids,
            particle_types,
            npart,
        }
    }

    pub fn len(&self) -> usize {
        self.particle_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particle_ids.is_empty()
    }

    /// One types list and one count per halo, each types list as long as its IDs.
    pub fn check_shape(&self) -> Result<(), String> {
        let halos = self.particle_ids.len();
        if self.particle_types.len() != halos || self.npart.len() != halos {
            return Err(format!(
                "{} ID lists, {} type lists, {} counts",
                halos,
                self.particle_types.len(),
                self.npart.len()
            ));
        }
        let ragged = self
            .particle_ids
            .iter()
            .zip(&self.particle_types)
            .position(|(ids, types)| ids.len() != types.len());
        match ragged {
            Some(i) => Err(format!(
                "halo {} has {} IDs and {} types",
                i,
                self.particle_ids[i].len(),
                self.particle_types[i].len()
            )),
            None => Ok(()),
        }
    }
}

pub trait ParticleReader: Send + Sync {
    /// `Ok(None)` when the catalog carries no particle data.
    ///
    /// With `include_unbound` false, particles the catalog marks as unbound are
    /// left out. Catalogs that record no binding state return every particle.
    fn read_particle_lists(
        &self,
        path: &str,
        file_type: u32,
        include_unbound: bool,
    ) -> Result<Option<ParticleLists>, HaloError>;
}

pub trait Cosmology {
    /// Lookback time in Gyr to redshift `z`.
    fn lookback_time(&self, z: f64) -> f64;
}

/// Redshift of a snapshot from its expansion factor.
pub fn redshift(scale_factor: f64) -> f64 {
    1.0 / scale_factor - 1.0
}

impl BaseCatalog {
    /// Move this catalog's columns into a fresh record for `snap`.
    pub fn into_record(self, snap: usize) -> Result<HaloRecord, HaloError> {
        let mut record = HaloRecord::available(snap, self.count);
        for (name, column) in self.columns {
            record.insert_column(&name, column)?;
        }
        record.simulation = self.simulation;
        record.units = self.units;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redshift_from_scale_factor() {
        assert_eq!(redshift(1.0), 0.0);
        assert!((redshift(0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_particle_lists_shape_check() {
        let lists = ParticleLists::new(vec![vec![1, 2], vec![3]], vec![vec![1, 1], vec![0]]);
        assert!(lists.check_shape().is_ok());

        let short = ParticleLists::new(vec![vec![1, 2], vec![3]], vec![vec![1, 1]]);
        assert!(short.check_shape().unwrap_err().contains("1 type lists"));

        let ragged = ParticleLists::new(vec![vec![1, 2], vec![3]], vec![vec![1], vec![0]]);
        assert_eq!(ragged.check_shape().unwrap_err(), "halo 0 has 2 IDs and 1 types");
    }

    #[test]
    fn test_particle_lists_count_members() {
        let lists = ParticleLists::new(vec![vec![1, 2, 3], vec![]], vec![vec![0, 1, 1], vec![]]);
        assert_eq!(lists.npart, vec![3, 0]);
        assert_eq!(lists.len(), 2);
    }

    #[test]
    fn test_base_catalog_into_record_checks_lengths() {
        let mut columns = BTreeMap::new();
        columns.insert("ID".to_string(), Column::Int(vec![1, 2]));
        let catalog = BaseCatalog {
            count: 3,
            columns,
            ..Default::default()
        };
        assert!(catalog.into_record(0).is_err());
    }
}
