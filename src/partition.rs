use crate::HaloError;

/// The index set handed to [`partition`]: either the range `[0, n)` or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indices {
    Range(usize),
    List(Vec<usize>),
}

impl Indices {
    fn into_vec(self) -> Vec<usize> {
        match self {
            Indices::Range(n) => (0..n).collect(),
            Indices::List(list) => list,
        }
    }
}

impl From<usize> for Indices {
    fn from(n: usize) -> Self {
        Indices::Range(n)
    }
}

impl From<Vec<usize>> for Indices {
    fn from(list: Vec<usize>) -> Self {
        Indices::List(list)
    }
}

impl From<&[usize]> for Indices {
    fn from(list: &[usize]) -> Self {
        Indices::List(list.to_vec())
    }
}

/// A disjoint slice of the index set assigned to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkShard {
    pub worker_id: usize,
    pub indices: Vec<usize>,
}

impl WorkShard {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Stripe `indices` across `worker_count` workers.
///
/// Worker `w` receives the elements at input positions `w, w + W, w + 2W, ...`,
/// so the first `len % W` workers carry one extra element. Every worker gets a
/// shard, even when it is empty.
pub fn partition<I: Into<Indices>>(indices: I, worker_count: usize) -> Result<Vec<WorkShard>, HaloError> {
    if worker_count == 0 {
        return Err(HaloError::InvalidArgument(
            "worker_count must be at least 1".to_string(),
        ));
    }

    let indices = indices.into().into_vec();
    let base = indices.len() / worker_count;
    let remainder = indices.len() % worker_count;

    let shards = (0..worker_count)
        .map(|worker_id| {
            let share = base + usize::from(worker_id < remainder);
            let picked = (0..share)
                .map(|k| indices[k * worker_count + worker_id])
                .collect();
            WorkShard {
                worker_id,
                indices: picked,
            }
        })
        .collect();

    Ok(shards)
}

/// Rebuild the original sequence from striped shards by reading them back in stride order.
pub fn interleave(shards: &[WorkShard]) -> Vec<usize> {
    let mut ordered: Vec<&WorkShard> = shards.iter().collect();
    ordered.sort_by_key(|s| s.worker_id);

    let total: usize = ordered.iter().map(|s| s.len()).sum();
    let longest = ordered.iter().map(|s| s.len()).max().unwrap_or(0);

    let mut out = Vec::with_capacity(total);
    for round in 0..longest {
        for shard in &ordered {
            if let Some(&index) = shard.indices.get(round) {
                out.push(index);
            }
        }
    }
    out
}
