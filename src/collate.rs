//! Third pipeline stage: gather the per-snapshot enrichment files back into one
//! time-ordered set.

use fixedbitset::FixedBitSet;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::record::SnapshotSet;
use crate::store::{self, CheckpointLayout};
use crate::HaloError;

/// Snapshot number encoded in an enriched file name of this run, e.g. `7` for
/// `B3_HaloData_<outname>_007.dat`. Files of other runs give `None`, including
/// runs whose outname merely starts with this one.
fn enriched_snap(layout: &CheckpointLayout, file_name: &str) -> Option<usize> {
    let digits = file_name
        .strip_prefix("B3_HaloData_")?
        .strip_prefix(layout.outname())?
        .strip_prefix('_')?
        .strip_suffix(".dat")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Enriched snapshot files of this run with their snapshot numbers, in snapshot order.
pub fn enriched_files(layout: &CheckpointLayout) -> Result<Vec<(usize, PathBuf)>, HaloError> {
    let mut files: Vec<(usize, PathBuf)> = store::list_checkpoints(&layout.enriched_dir())?
        .into_iter()
        .filter_map(|path| {
            let snap = enriched_snap(layout, path.file_name()?.to_str()?)?;
            Some((snap, path))
        })
        .collect();
    // Snap numbers past 999 are wider than the zero padding.
    files.sort_by_key(|(snap, _)| *snap);
    Ok(files)
}

/// Load every enriched snapshot of this run, in snapshot order.
///
/// Records are placed by position and each must carry the snapshot index of its
/// position. With `expected` set, any of `0..expected` without a file is reported
/// as [`HaloError::IncompleteCollation`].
pub fn collect(layout: &CheckpointLayout, expected: Option<usize>) -> Result<SnapshotSet, HaloError> {
    let files: Vec<PathBuf> = enriched_files(layout)?.into_iter().map(|(_, path)| path).collect();
    info!(files = files.len(), "number of halo data snaps");

    let mut records = Vec::with_capacity(files.len());
    for path in &files {
        debug!(path = %path.display(), "adding data");
        records.push(store::load_record(path)?);
    }

    let span = records.iter().map(|r| r.snap + 1).max().unwrap_or(0);
    let expected_count = expected.unwrap_or(span).max(span);
    let mut present = FixedBitSet::with_capacity(expected_count);
    for record in &records {
        present.insert(record.snap);
    }
    let missing: Vec<usize> = (0..expected_count).filter(|&s| !present.contains(s)).collect();
    if !missing.is_empty() {
        return Err(HaloError::IncompleteCollation {
            expected: expected_count,
            missing,
        });
    }

    if let Some((position, record)) = records.iter().enumerate().find(|(i, r)| r.snap != *i) {
        return Err(HaloError::CorruptCheckpoint {
            path: files[position].clone(),
            reason: format!("holds snap {} at position {}", record.snap, position),
        });
    }
    Ok(SnapshotSet::new(records))
}

/// Collect the enriched snapshots and write the collated checkpoint.
pub fn collate(layout: &CheckpointLayout, expected: Option<usize>) -> Result<SnapshotSet, HaloError> {
    let set = collect(layout, expected)?;
    info!(path = %layout.collated().display(), snapshots = set.len(), "saving collated halo data");
    store::save_set(&set, &layout.collated())?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::HaloRecord;

    fn write_snaps(layout: &CheckpointLayout, snaps: &[usize]) {
        for &snap in snaps {
            let record = HaloRecord::placeholder(snap, None, "EAGLE");
            store::save_record(&record, &layout.enriched_snapshot(snap)).unwrap();
        }
    }

    #[test]
    fn test_collects_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CheckpointLayout::new(dir.path(), "run");
        write_snaps(&layout, &[2, 0, 1]);

        let set = collate(&layout, Some(3)).unwrap();
        let snaps: Vec<usize> = set.iter().map(|r| r.snap).collect();
        assert_eq!(snaps, vec![0, 1, 2]);
        assert_eq!(store::load_set(&layout.collated()).unwrap(), set);
    }

    #[test]
    fn test_reports_missing_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CheckpointLayout::new(dir.path(), "run");
        write_snaps(&layout, &[0, 2]);

        match collate(&layout, Some(4)) {
            Err(HaloError::IncompleteCollation { expected, missing }) => {
                assert_eq!(expected, 4);
                assert_eq!(missing, vec![1, 3]);
            }
            other => panic!("expected incomplete collation, got {:?}", other),
        }
        assert!(!layout.collated().exists());

        // Gaps are found even without an expected count.
        assert!(matches!(
            collect(&layout, None),
            Err(HaloError::IncompleteCollation { .. })
        ));
    }

    #[test]
    fn test_ignores_other_runs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CheckpointLayout::new(dir.path(), "run");
        let other = CheckpointLayout::new(dir.path(), "other");
        write_snaps(&layout, &[0]);
        write_snaps(&other, &[0, 1]);

        assert_eq!(collect(&layout, None).unwrap().len(), 1);
    }

    #[test]
    fn test_ignores_runs_sharing_outname_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CheckpointLayout::new(dir.path(), "run");
        let sibling = CheckpointLayout::new(dir.path(), "run_x");
        write_snaps(&layout, &[0, 1]);
        write_snaps(&sibling, &[0, 1]);

        let set = collect(&layout, Some(2)).unwrap();
        let snaps: Vec<usize> = set.iter().map(|r| r.snap).collect();
        assert_eq!(snaps, vec![0, 1]);
        assert_eq!(enriched_files(&sibling).unwrap().len(), 2);
    }

    #[test]
    fn test_snapshots_past_999_follow_999() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CheckpointLayout::new(dir.path(), "run");
        write_snaps(&layout, &[1000, 999, 7]);

        let files = enriched_files(&layout).unwrap();
        let snaps: Vec<usize> = files.iter().map(|(snap, _)| *snap).collect();
        // File name order would put 1000 before 999.
        assert_eq!(snaps, vec![7, 999, 1000]);
        assert_eq!(files[2].1, layout.enriched_snapshot(1000));
        assert_eq!(enriched_snap(&layout, "B3_HaloData_run_1000.dat"), Some(1000));
        assert_eq!(enriched_snap(&layout, "B3_HaloData_run_x_001.dat"), None);
        assert_eq!(enriched_snap(&layout, "B3_HaloData_run_.dat"), None);
    }

    #[test]
    fn test_collates_across_999_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CheckpointLayout::new(dir.path(), "run");
        let snaps: Vec<usize> = (0..=1000).collect();
        write_snaps(&layout, &snaps);

        let set = collect(&layout, Some(1001)).unwrap();
        assert_eq!(set.len(), 1001);
        assert_eq!(set[999].snap, 999);
        assert_eq!(set[1000].snap, 1000);
    }

    #[test]
    fn test_empty_dir_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CheckpointLayout::new(dir.path(), "run");
        assert!(collect(&layout, None).unwrap().is_empty());
        assert!(collect(&layout, Some(2)).is_err());
    }
}
