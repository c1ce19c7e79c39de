//! Lower-bound lookups of query keys in an ascending key array.
//!
//! Keys must be sorted ascending. This is checked in debug builds only; with
//! unsorted keys the returned positions are meaningless but no panic occurs in
//! release builds.

/// Query count above which [`SearchStrategy::Auto`] switches to the batch sweep.
pub const BATCH_THRESHOLD: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// One binary search per query.
    Scalar,
    /// Sort the queries once and sweep the keys with a monotonically narrowing window.
    Batch,
    #[default]
    Auto,
}

impl SearchStrategy {
    fn pick(self, query_count: usize) -> SearchStrategy {
        match self {
            SearchStrategy::Auto if query_count > BATCH_THRESHOLD => SearchStrategy::Batch,
            SearchStrategy::Auto => SearchStrategy::Scalar,
            other => other,
        }
    }
}

/// Resolve every query to its lower-bound position in `sorted_keys`.
///
/// Without `validate` every query yields `Some(insertion_index)`, which may equal
/// `sorted_keys.len()`. With `validate`, positions whose key is not equal to the
/// query become `None`.
pub fn resolve<K: Ord>(
    queries: &[K],
    sorted_keys: &[K],
    validate: bool,
    strategy: SearchStrategy,
) -> Vec<Option<usize>> {
    debug_assert!(sorted_keys.is_sorted(), "sorted_keys must be ascending");

    if queries.is_empty() {
        return Vec::new();
    }

    let positions = match strategy.pick(queries.len()) {
        SearchStrategy::Batch => batch_lower_bounds(queries, sorted_keys),
        _ => queries
            .iter()
            .map(|q| sorted_keys.partition_point(|k| k < q))
            .collect(),
    };

    positions
        .into_iter()
        .zip(queries)
        .map(|(pos, q)| {
            if !validate {
                return Some(pos);
            }
            match sorted_keys.get(pos) {
                Some(k) if k == q => Some(pos),
                _ => None,
            }
        })
        .collect()
}

/// Resolve a single key with validation.
pub fn find<K: Ord>(query: &K, sorted_keys: &[K]) -> Option<usize> {
    let pos = sorted_keys.partition_point(|k| k < query);
    match sorted_keys.get(pos) {
        Some(k) if k == query => Some(pos),
        _ => None,
    }
}

fn batch_lower_bounds<K: Ord>(queries: &[K], sorted_keys: &[K]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..queries.len()).collect();
    order.sort_by(|&a, &b| queries[a].cmp(&queries[b]));

    let mut out = vec![0; queries.len()];
    let mut lo = 0;
    for qi in order {
        let q = &queries[qi];
        lo += sorted_keys[lo..].partition_point(|k| k < q);
        out[qi] = lo;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRATEGIES: [SearchStrategy; 3] = [
        SearchStrategy::Scalar,
        SearchStrategy::Batch,
        SearchStrategy::Auto,
    ];

    #[test]
    fn test_exact_positions_for_present_keys() {
        let keys = vec![2i64, 5, 9, 14, 20];
        let queries = vec![14i64, 2, 20, 5];
        for strategy in STRATEGIES {
            let got = resolve(&queries, &keys, true, strategy);
            assert_eq!(got, vec![Some(3), Some(0), Some(4), Some(1)], "{:?}", strategy);
        }
    }

    #[test]
    fn test_absent_key_validated_is_none() {
        let keys = vec![2i64, 5, 9];
        for strategy in STRATEGIES {
            assert_eq!(resolve(&[6i64], &keys, true, strategy), vec![None]);
            assert_eq!(resolve(&[100i64], &keys, true, strategy), vec![None]);
            assert_eq!(resolve(&[-3i64], &keys, true, strategy), vec![None]);
        }
    }

    #[test]
    fn test_absent_key_unvalidated_is_insertion_point() {
        let keys = vec![2i64, 5, 9];
        for strategy in STRATEGIES {
            let got = resolve(&[6i64, 100, -3, 5], &keys, false, strategy);
            assert_eq!(got, vec![Some(2), Some(3), Some(0), Some(1)]);
        }
    }

    #[test]
    fn test_insertion_point_brackets_query() {
        let keys: Vec<i64> = (0..50).map(|i| i * 3).collect();
        let queries: Vec<i64> = (-2..160).collect();
        let got = resolve(&queries, &keys, false, SearchStrategy::Scalar);
        for (q, pos) in queries.iter().zip(got) {
            let pos = pos.unwrap();
            if pos > 0 {
                assert!(keys[pos - 1] < *q);
            }
            if pos < keys.len() {
                assert!(*q <= keys[pos]);
            }
        }
    }

    #[test]
    fn test_empty_queries_and_empty_keys() {
        let keys = vec![1i64, 2, 3];
        for strategy in STRATEGIES {
            assert!(resolve::<i64>(&[], &keys, true, strategy).is_empty());
            assert!(resolve::<i64>(&[], &keys, false, strategy).is_empty());
            assert_eq!(resolve(&[4i64], &[], true, strategy), vec![None]);
            assert_eq!(resolve(&[4i64], &[], false, strategy), vec![Some(0)]);
        }
    }

    #[test]
    fn test_strategies_agree_with_duplicates_and_large_batches() {
        let keys: Vec<i64> = vec![1, 1, 3, 3, 3, 7, 8, 8, 12, 40, 41, 41];
        // Deterministic pseudo-random queries, enough to cross the Auto threshold.
        let mut state: i64 = 17;
        let queries: Vec<i64> = (0..600)
            .map(|_| {
                state = (state * 1103515245 + 12345) % 2147483648;
                state % 50 - 3
            })
            .collect();

        for validate in [true, false] {
            let scalar = resolve(&queries, &keys, validate, SearchStrategy::Scalar);
            let batch = resolve(&queries, &keys, validate, SearchStrategy::Batch);
            let auto = resolve(&queries, &keys, validate, SearchStrategy::Auto);
            assert_eq!(scalar, batch);
            assert_eq!(scalar, auto);
        }
    }

    #[test]
    fn test_duplicate_keys_resolve_to_first_occurrence() {
        let keys = vec![1i64, 3, 3, 3, 7];
        for strategy in STRATEGIES {
            assert_eq!(resolve(&[3i64], &keys, true, strategy), vec![Some(1)]);
        }
    }

    #[test]
    fn test_find_single_key() {
        let keys = vec![10i64, 20, 30];
        assert_eq!(find(&20, &keys), Some(1));
        assert_eq!(find(&25, &keys), None);
    }
}
