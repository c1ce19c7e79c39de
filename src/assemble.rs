//! First pipeline stage: read base catalogs, give halos temporal IDs, attach
//! merger-tree links and write the full and reduced checkpoints.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::cosmology::FlatLambdaCdm;
use crate::linker::normalize_ids;
use crate::record::{fields, HaloRecord, SnapshotSet};
use crate::sources::{redshift, CatalogReader, Cosmology, TreeReader};
use crate::store::{self, CheckpointLayout};
use crate::HaloError;

/// Read every configured snapshot's base fields. Snapshots without a catalog
/// path become placeholders.
pub fn read_base_catalogs(config: &PipelineConfig, catalogs: &dyn CatalogReader) -> Result<SnapshotSet, HaloError> {
    let mut records = Vec::with_capacity(config.snapshot_count());
    for snap in 0..config.snapshot_count() {
        let particle_path = config.particle_file(snap).map(str::to_string);

        let Some(path) = config.catalog_file(snap) else {
            info!(snap, "no halo data for snap (not given a file)");
            let mut record = HaloRecord::placeholder(snap, particle_path, &config.particle_file_type);
            record.outname = config.outname.clone();
            records.push(record);
            continue;
        };

        debug!(snap, path, "searching for halo data");
        let base = catalogs
            .read_base_fields(path, config.catalog_file_type, &fields::BASE)?
            .ok_or_else(|| HaloError::MissingBaseCatalog {
                snap,
                path: PathBuf::from(path),
            })?;

        let mut record = base.into_record(snap)?;
        record.catalog_path = Some(path.to_string());
        record.catalog_file_type = config.catalog_file_type;
        record.particle_path = particle_path;
        record.particle_file_type = config.particle_file_type.clone();
        record.outname = config.outname.clone();
        info!(snap, halos = record.count, "read base halo data");
        records.push(record);
    }
    Ok(SnapshotSet::new(records))
}

/// Attach `Head` and `Tail` to the available snapshots from the descendant trees.
pub fn link_trees<T: TreeReader>(
    set: SnapshotSet,
    config: &PipelineConfig,
    trees: &T,
) -> Result<SnapshotSet, HaloError> {
    let (mut linked, padded): (Vec<HaloRecord>, Vec<HaloRecord>) =
        set.into_records().into_iter().partition(HaloRecord::is_available);

    if linked.is_empty() {
        warn!("no snapshots with halo data, skipping tree assembly");
    } else {
        let tree_files = linked
            .iter()
            .map(|r| {
                config
                    .tree_file(r.snap)
                    .map(str::to_string)
                    .ok_or_else(|| HaloError::Config(format!("snap {} has halo data but no tree file", r.snap)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let counts: Vec<usize> = linked.iter().map(|r| r.count).collect();

        info!(snapshots = linked.len(), "assembling descendant tree");
        let tree = trees.read_descendant_tree(&tree_files, config.catalog_file_type)?;
        trees.build_head_tail(&tree, &counts, &mut linked, config.temporal_multiplier)?;
    }

    let mut records: Vec<HaloRecord> = linked.into_iter().chain(padded).collect();
    records.sort_by_key(|r| r.snap);
    Ok(SnapshotSet::new(records))
}

/// Fill in redshift, lookback time and comoving box size from each snapshot's
/// simulation header.
///
/// Without an explicit `cosmology`, a flat Lambda-CDM background is built from the
/// first available snapshot's header.
pub fn add_time_info(set: &mut SnapshotSet, cosmology: Option<&dyn Cosmology>) {
    let fallback = set
        .iter()
        .find(|r| r.is_available())
        .and_then(|r| r.simulation.as_ref())
        .and_then(FlatLambdaCdm::from_simulation);
    let cosmology: Option<&dyn Cosmology> = match (cosmology, fallback.as_ref()) {
        (Some(c), _) => Some(c),
        (None, Some(f)) => Some(f as &dyn Cosmology),
        (None, None) => None,
    };

    for record in set.iter_mut().filter(|r| r.is_available()) {
        let Some(info) = record.simulation.as_mut() else {
            warn!(snap = record.snap, "no simulation info, skipping time information");
            continue;
        };
        if info.scale_factor <= 0.0 {
            warn!(snap = record.snap, a = info.scale_factor, "invalid scale factor");
            continue;
        }
        let z = redshift(info.scale_factor);
        info.z = Some(z);
        info.lookback_time = cosmology.map(|c| c.lookback_time(z));
        info.box_size_comoving = Some(info.period / info.scale_factor);
    }
}

/// Run the whole stage and write the full (`B2`) and reduced (`B1`) checkpoints.
///
/// A catalog that the reader cannot find aborts the stage before anything is
/// written.
pub fn assemble<T: TreeReader>(
    config: &PipelineConfig,
    catalogs: &dyn CatalogReader,
    trees: &T,
    cosmology: Option<&dyn Cosmology>,
    layout: &CheckpointLayout,
) -> Result<SnapshotSet, HaloError> {
    let mut set = read_base_catalogs(config, catalogs)?;
    normalize_ids(&mut set, config.temporal_multiplier);
    let mut set = link_trees(set, config, trees)?;
    add_time_info(&mut set, cosmology);

    info!(path = %layout.full().display(), "saving full halo data");
    store::save_set(&set, &layout.full())?;
    info!(path = %layout.reduced().display(), "saving reduced halo data");
    store::save_set(&store::reduce(&set), &layout.reduced())?;

    let available = set.availability_mask().count_ones(..);
    info!(snapshots = set.len(), available, "done generating base halo data");
    Ok(set)
}
