//! Per-halo particle membership, read from the structure finder and written
//! out one file per snapshot.

use tracing::{info, warn};

use crate::record::{fields, HaloRecord, NO_HOST};
use crate::sources::{ParticleLists, ParticleReader};
use crate::store::{self, CheckpointLayout};
use crate::HaloError;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParticleOptions {
    pub include_unbound: bool,
    /// Append each subhalo's particles to its field host.
    pub add_subparts_to_fofs: bool,
}

/// Read the particle lists for every halo in `record`.
///
/// A snapshot without particle data, or one whose read fails, yields an empty
/// set and a warning.
pub fn particle_lists(
    reader: &dyn ParticleReader,
    record: &HaloRecord,
    options: ParticleOptions,
) -> Result<ParticleLists, HaloError> {
    let Some(path) = record.catalog_path.as_deref() else {
        warn!(snap = record.snap, "no catalog path, no particle data");
        return Ok(ParticleLists::default());
    };

    let mut lists = match reader.read_particle_lists(path, record.catalog_file_type, options.include_unbound) {
        Ok(Some(lists)) => lists,
        Ok(None) => {
            warn!(snap = record.snap, path, "particle data not found");
            return Ok(ParticleLists::default());
        }
        Err(e) => {
            warn!(snap = record.snap, path, error = %e, "particle data not readable");
            return Ok(ParticleLists::default());
        }
    };

    if lists.len() != record.count {
        return Err(HaloError::InvalidArgument(format!(
            "snap {}: {} particle lists for {} halos",
            record.snap,
            lists.len(),
            record.count
        )));
    }
    checked_shape(record, &lists)?;

    if options.add_subparts_to_fofs {
        fold_subhalos_into_hosts(record, &mut lists)?;
    }
    Ok(lists)
}

fn checked_shape(record: &HaloRecord, lists: &ParticleLists) -> Result<(), HaloError> {
    lists
        .check_shape()
        .map_err(|e| HaloError::InvalidArgument(format!("snap {}: particle lists: {}", record.snap, e)))
}

/// Append the particles of every subhalo to its field (host-less) host.
pub fn fold_subhalos_into_hosts(record: &HaloRecord, lists: &mut ParticleLists) -> Result<(), HaloError> {
    let missing = |field: &str| HaloError::MissingField {
        snap: record.snap,
        field: field.to_string(),
    };
    let ids = record.ints(fields::ID).ok_or_else(|| missing(fields::ID))?;
    let hosts = record.ints(fields::HOST_ID).ok_or_else(|| missing(fields::HOST_ID))?;
    checked_shape(record, lists)?;
    if ids.len() != hosts.len() || lists.len() != hosts.len() {
        return Err(HaloError::InvalidArgument(format!(
            "snap {}: {} IDs, {} hosts, {} particle lists",
            record.snap,
            ids.len(),
            hosts.len(),
            lists.len()
        )));
    }

    let mut folded = 0;
    for (ifield, _) in hosts.iter().enumerate().filter(|&(_, &h)| h == NO_HOST) {
        let field_id = ids[ifield];
        let subs: Vec<usize> = hosts
            .iter()
            .enumerate()
            .filter(|&(_, &h)| h == field_id)
            .map(|(i, _)| i)
            .collect();
        if subs.is_empty() {
            continue;
        }
        for isub in subs {
            let (sub_ids, sub_types) = (lists.particle_ids[isub].clone(), lists.particle_types[isub].clone());
            lists.particle_ids[ifield].extend(sub_ids);
            lists.particle_types[ifield].extend(sub_types);
        }
        lists.npart[ifield] = lists.particle_ids[ifield].len();
        folded += 1;
    }
    info!(snap = record.snap, hosts = folded, "appended substructure particles to field halos");
    Ok(())
}

/// Keep only the listed halos, in order. `None` entries, out-of-range indices
/// and halos missing from any of the three columns become empty lists.
pub fn select(lists: &ParticleLists, halo_indices: &[Option<usize>]) -> ParticleLists {
    let mut out = ParticleLists::default();
    for index in halo_indices {
        let halo = index.and_then(|i| {
            Some((
                lists.particle_ids.get(i)?,
                lists.particle_types.get(i)?,
                *lists.npart.get(i)?,
            ))
        });
        match halo {
            Some((ids, types, npart)) => {
                out.particle_ids.push(ids.clone());
                out.particle_types.push(types.clone());
                out.npart.push(npart);
            }
            None => {
                out.particle_ids.push(Vec::new());
                out.particle_types.push(Vec::new());
                out.npart.push(0);
            }
        }
    }
    out
}

/// Read and write the particle lists of `record`. Padded snapshots are skipped.
pub fn dump_snapshot(
    reader: &dyn ParticleReader,
    record: &HaloRecord,
    layout: &CheckpointLayout,
    options: ParticleOptions,
) -> Result<Option<ParticleLists>, HaloError> {
    if !record.is_available() {
        return Ok(None);
    }
    let lists = particle_lists(reader, record, options)?;
    store::save(&lists, &layout.particle_snapshot(record.snap))?;
    info!(snap = record.snap, halos = lists.len(), "saved particle lists");
    Ok(Some(lists))
}

pub fn load_snapshot(layout: &CheckpointLayout, snap: usize) -> Result<ParticleLists, HaloError> {
    store::load(&layout.particle_snapshot(snap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;

    struct FixedParticles(Option<ParticleLists>);

    impl ParticleReader for FixedParticles {
        fn read_particle_lists(&self, _: &str, _: u32, _: bool) -> Result<Option<ParticleLists>, HaloError> {
            Ok(self.0.clone())
        }
    }

    fn record() -> HaloRecord {
        let mut r = HaloRecord::available(2, 3);
        r.catalog_path = Some("/vr/snap_002".to_string());
        r.insert_column(fields::ID, Column::Int(vec![10, 11, 12])).unwrap();
        r.insert_column(fields::HOST_ID, Column::Int(vec![-1, 10, 10])).unwrap();
        r
    }

    fn lists() -> ParticleLists {
        ParticleLists::new(
            vec![vec![1, 2], vec![3], vec![4, 5]],
            vec![vec![0, 1], vec![4], vec![0, 0]],
        )
    }

    #[test]
    fn test_fold_appends_subhalo_particles() {
        let mut l = lists();
        fold_subhalos_into_hosts(&record(), &mut l).unwrap();
        assert_eq!(l.particle_ids[0], vec![1, 2, 3, 4, 5]);
        assert_eq!(l.particle_types[0], vec![0, 1, 4, 0, 0]);
        assert_eq!(l.npart, vec![5, 1, 2]);
    }

    #[test]
    fn test_select_fills_gaps() {
        let out = select(&lists(), &[Some(2), None, Some(0), Some(9)]);
        assert_eq!(out.particle_ids, vec![vec![4, 5], vec![], vec![1, 2], vec![]]);
        assert_eq!(out.npart, vec![2, 0, 2, 0]);
    }

    #[test]
    fn test_short_type_lists_are_rejected() {
        let mut r = HaloRecord::available(2, 2);
        r.catalog_path = Some("/vr/snap_002".to_string());
        r.insert_column(fields::ID, Column::Int(vec![1, 2])).unwrap();
        r.insert_column(fields::HOST_ID, Column::Int(vec![-1, 1])).unwrap();
        let reader = FixedParticles(Some(ParticleLists::new(vec![vec![1, 2], vec![3]], vec![vec![1, 1]])));
        let options = ParticleOptions {
            include_unbound: false,
            add_subparts_to_fofs: true,
        };

        match particle_lists(&reader, &r, options) {
            Err(HaloError::InvalidArgument(message)) => assert!(message.contains("snap 2"), "{}", message),
            other => panic!("expected invalid argument, got {:?}", other),
        }
        let mut ragged = ParticleLists::new(vec![vec![1, 2], vec![3]], vec![vec![1], vec![0]]);
        assert!(fold_subhalos_into_hosts(&r, &mut ragged).is_err());
        assert!(particle_lists(&reader, &r, ParticleOptions::default()).is_err());
    }

    #[test]
    fn test_select_tolerates_short_columns() {
        let mut short = lists();
        short.particle_types.truncate(1);
        let out = select(&short, &[Some(0), Some(1)]);
        assert_eq!(out.particle_ids, vec![vec![1, 2], vec![]]);
        assert_eq!(out.npart, vec![2, 0]);
    }

    #[test]
    fn test_missing_particle_data_is_empty() {
        let options = ParticleOptions::default();
        let out = particle_lists(&FixedParticles(None), &record(), options).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_dump_writes_file_and_skips_padded() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CheckpointLayout::new(dir.path(), "run");
        let reader = FixedParticles(Some(lists()));
        let options = ParticleOptions {
            include_unbound: true,
            add_subparts_to_fofs: true,
        };

        let written = dump_snapshot(&reader, &record(), &layout, options).unwrap().unwrap();
        assert_eq!(written.npart[0], 5);
        assert_eq!(load_snapshot(&layout, 2).unwrap(), written);

        let padded = HaloRecord::placeholder(0, None, "EAGLE");
        assert!(dump_snapshot(&reader, &padded, &layout, options).unwrap().is_none());
        assert!(!layout.particle_snapshot(0).exists());
    }
}
