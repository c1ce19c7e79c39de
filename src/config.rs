use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::record::fields;
use crate::HaloError;

/// Multiplier the tree builder uses to make halo IDs unique across snapshots.
pub const DEFAULT_TEMPORAL_MULTIPLIER: i64 = 1_000_000_000_000;

/// Snapshots with fewer halos than this skip derived-field computation.
pub const DEFAULT_MIN_HALOS_FOR_DERIVED: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivedField {
    /// Host-centric distance over host radius.
    #[serde(rename = "R_rel")]
    RelativeRadius,
    #[serde(rename = "N_peers")]
    PeerCount,
    /// Mass rank among halos sharing the same host.
    #[serde(rename = "Subhalo_rank")]
    SubhaloRank,
}

impl DerivedField {
    pub const ALL: [DerivedField; 3] = [
        DerivedField::RelativeRadius,
        DerivedField::PeerCount,
        DerivedField::SubhaloRank,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            DerivedField::RelativeRadius => fields::R_REL,
            DerivedField::PeerCount => fields::N_PEERS,
            DerivedField::SubhaloRank => fields::SUBHALO_RANK,
        }
    }
}

fn default_catalog_file_type() -> u32 {
    2
}

fn default_multiplier() -> i64 {
    DEFAULT_TEMPORAL_MULTIPLIER
}

fn default_min_halos() -> usize {
    DEFAULT_MIN_HALOS_FOR_DERIVED
}

fn default_workers() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Everything a run needs to know about its inputs. Loaded from JSON.
///
/// File lists are indexed by snapshot and padded with `null` for snapshots that
/// have no data. `catalog_files` decides how many snapshots the run covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub outname: String,
    pub catalog_files: Vec<Option<String>>,
    #[serde(default = "default_catalog_file_type")]
    pub catalog_file_type: u32,
    /// Defaults to `catalog_files` when empty.
    #[serde(default)]
    pub tree_files: Vec<Option<String>>,
    #[serde(default)]
    pub particle_files: Vec<Option<String>>,
    #[serde(default)]
    pub particle_file_type: String,
    #[serde(default = "default_multiplier")]
    pub temporal_multiplier: i64,
    /// Properties to add during enrichment; every available property when `None`.
    #[serde(default)]
    pub property_fields: Option<Vec<String>>,
    #[serde(default)]
    pub derived_fields: Vec<DerivedField>,
    #[serde(default)]
    pub extra_export_fields: Vec<String>,
    #[serde(default = "default_min_halos")]
    pub min_halos_for_derived: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub add_subparts_to_fofs: bool,
    #[serde(default = "default_true")]
    pub include_unbound: bool,
}

impl PipelineConfig {
    /// A configuration with defaults for everything but the catalog list.
    pub fn new(outname: &str, catalog_files: Vec<Option<String>>) -> Self {
        PipelineConfig {
            outname: outname.to_string(),
            catalog_files,
            catalog_file_type: default_catalog_file_type(),
            tree_files: Vec::new(),
            particle_files: Vec::new(),
            particle_file_type: String::new(),
            temporal_multiplier: DEFAULT_TEMPORAL_MULTIPLIER,
            property_fields: None,
            derived_fields: Vec::new(),
            extra_export_fields: Vec::new(),
            min_halos_for_derived: DEFAULT_MIN_HALOS_FOR_DERIVED,
            workers: default_workers(),
            add_subparts_to_fofs: false,
            include_unbound: true,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HaloError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            HaloError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HaloError> {
        let n = self.snapshot_count();
        if n == 0 {
            return Err(HaloError::Config("catalog_files is empty".to_string()));
        }
        if self.workers == 0 {
            return Err(HaloError::Config("workers must be at least 1".to_string()));
        }
        if self.temporal_multiplier <= 0 {
            return Err(HaloError::Config("temporal_multiplier must be positive".to_string()));
        }
        for (name, list) in [("tree_files", &self.tree_files), ("particle_files", &self.particle_files)] {
            if !list.is_empty() && list.len() != n {
                return Err(HaloError::Config(format!(
                    "{} has {} entries, expected {}",
                    name,
                    list.len(),
                    n
                )));
            }
        }
        Ok(())
    }

    pub fn snapshot_count(&self) -> usize {
        self.catalog_files.len()
    }

    pub fn catalog_file(&self, snap: usize) -> Option<&str> {
        self.catalog_files.get(snap)?.as_deref()
    }

    pub fn tree_file(&self, snap: usize) -> Option<&str> {
        if self.tree_files.is_empty() {
            self.catalog_file(snap)
        } else {
            self.tree_files.get(snap)?.as_deref()
        }
    }

    pub fn particle_file(&self, snap: usize) -> Option<&str> {
        self.particle_files.get(snap)?.as_deref()
    }
}
