//! Cross-snapshot identifier resolution.
//!
//! `Head` and `Tail` hold temporal IDs of the descendant and progenitor. The
//! linker turns those IDs into local array positions at the adjacent snapshot by
//! looking them up in a per-snapshot sorted ID index.

use tracing::debug;

use crate::matcher::{self, SearchStrategy};
use crate::record::{fields, SnapshotSet, NO_HOST};

/// Rewrite local `ID` / `HostID` values into global temporal form.
///
/// A column is rewritten to `snap * multiplier + value` only when every
/// non-negative value in it is still below `multiplier`, so running this twice is
/// a no-op. Negative host IDs are normalised to [`NO_HOST`]. Returns the number of
/// columns rewritten.
pub fn normalize_ids(set: &mut SnapshotSet, multiplier: i64) -> usize {
    let mut rewritten = 0;
    for record in set.iter_mut().filter(|r| r.is_available()) {
        let offset = record.snap as i64 * multiplier;

        if let Some(ids) = record.ints_mut(fields::ID) {
            if is_local(ids, multiplier) {
                for id in ids.iter_mut().filter(|id| **id >= 0) {
                    *id += offset;
                }
                rewritten += 1;
            }
        }

        if let Some(hosts) = record.ints_mut(fields::HOST_ID) {
            if is_local(hosts, multiplier) {
                for host in hosts.iter_mut() {
                    *host = if *host < 0 { NO_HOST } else { *host + offset };
                }
                rewritten += 1;
            }
        }
    }
    debug!(rewritten, "normalized halo ids");
    rewritten
}

fn is_local(values: &[i64], multiplier: i64) -> bool {
    values.iter().any(|&v| v >= 0) && values.iter().filter(|&&v| v >= 0).all(|&v| v < multiplier)
}

/// Sorted `ID -> local position` index for one snapshot.
#[derive(Debug, Clone)]
struct IdIndex {
    sorted_ids: Vec<i64>,
    positions: Vec<usize>,
}

impl IdIndex {
    fn build(ids: &[i64]) -> Self {
        let mut pairs: Vec<(i64, usize)> = ids.iter().copied().zip(0..).collect();
        pairs.sort_unstable();
        let (sorted_ids, positions) = pairs.into_iter().unzip();
        IdIndex { sorted_ids, positions }
    }

    fn lookup(&self, id: i64) -> Option<usize> {
        matcher::find(&id, &self.sorted_ids).map(|k| self.positions[k])
    }

    fn lookup_many(&self, ids: &[i64], strategy: SearchStrategy) -> Vec<Option<usize>> {
        matcher::resolve(ids, &self.sorted_ids, true, strategy)
            .into_iter()
            .map(|k| k.map(|k| self.positions[k]))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

impl Direction {
    fn link_field(self) -> &'static str {
        match self {
            Direction::Backward => fields::TAIL,
            Direction::Forward => fields::HEAD,
        }
    }

    fn step(self, snap: usize) -> Option<usize> {
        match self {
            Direction::Backward => snap.checked_sub(1),
            Direction::Forward => snap.checked_add(1),
        }
    }
}

pub struct TemporalLinker<'a> {
    set: &'a SnapshotSet,
    indexes: Vec<Option<IdIndex>>,
    strategy: SearchStrategy,
}

impl<'a> TemporalLinker<'a> {
    /// Index every available snapshot of `set`. Padded snapshots, and snapshots
    /// without an `ID` column, get no index and resolve nothing.
    pub fn new(set: &'a SnapshotSet) -> Self {
        let indexes = set
            .iter()
            .map(|record| {
                if !record.is_available() {
                    return None;
                }
                record.ints(fields::ID).map(IdIndex::build)
            })
            .collect();
        TemporalLinker {
            set,
            indexes,
            strategy: SearchStrategy::Auto,
        }
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Local index of `id` at `snap`.
    pub fn index_of(&self, snap: usize, id: i64) -> Option<usize> {
        self.indexes.get(snap)?.as_ref()?.lookup(id)
    }

    /// Follow `Tail` links `depth` times from `(snap, halo_index)`.
    ///
    /// Returns the local index at `snap - depth`, or `None` as soon as any hop
    /// fails to resolve.
    pub fn find_progenitor(&self, halo_index: usize, snap: usize, depth: usize) -> Option<usize> {
        self.walk(halo_index, snap, depth, Direction::Backward)
    }

    /// Follow `Head` links `depth` times from `(snap, halo_index)` to `snap + depth`.
    pub fn find_descendant(&self, halo_index: usize, snap: usize, depth: usize) -> Option<usize> {
        self.walk(halo_index, snap, depth, Direction::Forward)
    }

    /// Local index at `snap - 1` of every halo's progenitor.
    pub fn resolve_tails(&self, snap: usize) -> Vec<Option<usize>> {
        self.resolve_links(snap, Direction::Backward)
    }

    /// Local index at `snap + 1` of every halo's descendant.
    pub fn resolve_heads(&self, snap: usize) -> Vec<Option<usize>> {
        self.resolve_links(snap, Direction::Forward)
    }

    fn walk(&self, halo_index: usize, snap: usize, depth: usize, direction: Direction) -> Option<usize> {
        let start = self.set.get(snap)?;
        if !start.is_available() || halo_index >= start.count {
            return None;
        }

        let mut current = halo_index;
        let mut at = snap;
        for _ in 0..depth {
            let link = *self.set.get(at)?.ints(direction.link_field())?.get(current)?;
            let next = direction.step(at)?;
            current = self.indexes.get(next)?.as_ref()?.lookup(link)?;
            at = next;
        }
        Some(current)
    }

    fn resolve_links(&self, snap: usize, direction: Direction) -> Vec<Option<usize>> {
        let Some(record) = self.set.get(snap) else {
            return Vec::new();
        };
        let Some(links) = record.ints(direction.link_field()) else {
            return vec![None; record.count];
        };
        let target = direction
            .step(snap)
            .and_then(|next| self.indexes.get(next))
            .and_then(Option::as_ref);
        match target {
            Some(index) => index.lookup_many(links, self.strategy),
            None => vec![None; links.len()],
        }
    }
}
