//! Final pipeline stage: project the collated data onto the fields needed
//! downstream.

use itertools::Itertools;
use tracing::info;

use crate::record::{fields, SnapshotSet};
use crate::store::{self, project, CheckpointLayout};
use crate::HaloError;

pub const DEFAULT_EXPORT_FIELDS: [&str; 9] = [
    fields::ID,
    fields::HOST_ID,
    fields::HEAD,
    fields::TAIL,
    "Mass_tot",
    "M_gas",
    fields::MASS_200CRIT,
    "Mass_200mean",
    "N_part",
];

/// Default export fields followed by `extra`, without duplicates.
pub fn export_fields(extra: &[String]) -> Vec<String> {
    DEFAULT_EXPORT_FIELDS
        .iter()
        .map(|f| f.to_string())
        .chain(extra.iter().cloned())
        .unique()
        .collect()
}

/// Project every available snapshot onto the export fields. Padded snapshots are
/// copied as they are.
pub fn compress(set: &SnapshotSet, extra: &[String]) -> SnapshotSet {
    let wanted = export_fields(extra);
    SnapshotSet::new(
        set.iter()
            .map(|record| {
                if record.is_available() {
                    project(record, wanted.as_slice())
                } else {
                    record.clone()
                }
            })
            .collect(),
    )
}

/// Compress `set` and write the export checkpoint.
pub fn compress_and_save(set: &SnapshotSet, extra: &[String], layout: &CheckpointLayout) -> Result<SnapshotSet, HaloError> {
    let compressed = compress(set, extra);
    info!(path = %layout.export().display(), fields = export_fields(extra).len(), "saving compressed halo data");
    store::save_set(&compressed, &layout.export())?;
    Ok(compressed)
}
