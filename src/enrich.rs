//! Second pipeline stage: add catalog properties and derived fields to each
//! snapshot, one checkpoint file per snapshot, spread over the worker pool.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::derived::add_derived_fields;
use crate::pool::WorkerPool;
use crate::record::{fields, HaloRecord, SnapshotSet, NO_HOST};
use crate::sources::CatalogReader;
use crate::store::{self, CheckpointLayout};
use crate::units::to_physical;
use crate::HaloError;

/// Properties read for one snapshot, or a reason to pass the record through unchanged.
enum PropertySource {
    Read(Vec<String>),
    PassThrough,
}

fn wanted_properties(
    record: &HaloRecord,
    catalogs: &dyn CatalogReader,
    config: &PipelineConfig,
) -> Result<PropertySource, HaloError> {
    let Some(path) = record.catalog_path.as_deref().filter(|_| record.is_available()) else {
        return Ok(PropertySource::PassThrough);
    };
    let wanted = match &config.property_fields {
        Some(list) => list.clone(),
        None => match catalogs.available_fields(path, record.catalog_file_type) {
            Ok(list) => list,
            Err(e) if !e.is_fatal() => {
                warn!(snap = record.snap, error = %e, "no property listing");
                return Ok(PropertySource::PassThrough);
            }
            Err(e) => return Err(e),
        },
    };
    Ok(PropertySource::Read(
        wanted.into_iter().filter(|f| !record.has_field(f)).collect(),
    ))
}

/// Build the enriched record for one snapshot without writing anything.
///
/// Padded snapshots and snapshots whose property data is missing come back as an
/// unchanged copy.
pub fn enrich_record(
    record: &HaloRecord,
    catalogs: &dyn CatalogReader,
    config: &PipelineConfig,
) -> Result<HaloRecord, HaloError> {
    let needed = match wanted_properties(record, catalogs, config)? {
        PropertySource::Read(needed) => needed,
        PropertySource::PassThrough => {
            info!(snap = record.snap, "skipping padded snap");
            return Ok(record.clone());
        }
    };
    let Some(path) = record.catalog_path.as_deref() else {
        return Ok(record.clone());
    };

    debug!(snap = record.snap, fields = ?needed, "adding fields from properties file");
    let block = match catalogs.read_properties(path, record.catalog_file_type, &needed) {
        Ok(block) => block,
        Err(e) if !e.is_fatal() => {
            warn!(snap = record.snap, error = %e, "property data missing, passing snap through");
            return Ok(record.clone());
        }
        Err(e) => return Err(e),
    };

    let h = record.simulation.as_ref().map(|s| s.h_val).filter(|&h| h > 0.0);
    let mut out = record.clone();
    for (name, column) in block.columns {
        let kind = block.unit_kinds.get(&name).copied().unwrap_or_default();
        let column = match h {
            Some(h) => to_physical(&column, kind, h).unwrap_or(column),
            None => {
                if to_physical(&column, kind, 1.0).is_some() {
                    warn!(snap = record.snap, field = %name, "no Hubble parameter, leaving field in catalog units");
                }
                column
            }
        };
        out.insert_column(&name, column)?;
    }

    if record.count >= config.min_halos_for_derived {
        let failed = add_derived_fields(&mut out, &config.derived_fields);
        if !failed.is_empty() {
            debug!(snap = record.snap, failed = failed.len(), "derived fields skipped");
        }
    } else if !config.derived_fields.is_empty() {
        info!(
            snap = record.snap,
            halos = record.count,
            "skipping derived halo fields for this snap (insufficient halo count)"
        );
    }
    Ok(out)
}

fn subhalo_count(record: &HaloRecord) -> usize {
    record
        .ints(fields::HOST_ID)
        .map_or(0, |hosts| hosts.iter().filter(|&&h| h != NO_HOST).count())
}

fn write_progress(layout: &CheckpointLayout, record: &HaloRecord, seconds: f64) -> Result<(), HaloError> {
    fs::create_dir_all(layout.log_dir())?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(layout.progress_log(record.snap))?;
    writeln!(
        file,
        "Done with snap {}: num halos = {} ({} subhalos), took {:.2} sec",
        record.snap,
        record.count,
        subhalo_count(record),
        seconds
    )?;
    Ok(())
}

/// Enrich one snapshot, write its checkpoint and append its progress line.
pub fn enrich_snapshot(
    record: &HaloRecord,
    catalogs: &dyn CatalogReader,
    config: &PipelineConfig,
    layout: &CheckpointLayout,
) -> Result<HaloRecord, HaloError> {
    let started = Instant::now();
    let log_path = layout.progress_log(record.snap);
    if log_path.exists() {
        fs::remove_file(&log_path)?;
    }

    let enriched = enrich_record(record, catalogs, config)?;
    store::save_record(&enriched, &layout.enriched_snapshot(record.snap))?;
    write_progress(layout, record, started.elapsed().as_secs_f64())?;
    info!(snap = record.snap, fields = enriched.field_names().count(), "saved detailed halo data");
    Ok(enriched)
}

/// Enrich every snapshot of `set` across `pool`. Returns the number of snapshot
/// files written once every worker has finished, or the first failure.
pub fn enrich(
    set: &SnapshotSet,
    catalogs: &dyn CatalogReader,
    config: &PipelineConfig,
    layout: &CheckpointLayout,
    pool: &WorkerPool,
) -> Result<usize, HaloError> {
    let outcomes = pool.run(set.len(), |shard| {
        debug!(worker_id = shard.worker_id, snaps = ?shard.indices, "worker has snaps");
        for &snap in &shard.indices {
            enrich_snapshot(&set[snap], catalogs, config, layout)?;
        }
        Ok(shard.len())
    })?;

    let mut written = 0;
    let mut first_failure = None;
    for outcome in outcomes {
        match outcome.result {
            Ok(n) => written += n,
            Err(e) => {
                warn!(worker_id = outcome.worker_id, error = %e, "enrichment task failed");
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
    }
    match first_failure {
        Some(e) => Err(e),
        None => {
            info!(snapshots = written, workers = pool.workers(), "enrichment finished");
            Ok(written)
        }
    }
}
