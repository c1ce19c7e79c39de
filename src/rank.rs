/// Competition rank of every value: `1 + count(values strictly greater)`.
///
/// Rank 1 is the maximum. Equal values share a rank, so the output is not a
/// permutation when duplicates exist: `[5, 3, 3, 1]` ranks as `[1, 2, 2, 4]`.
pub fn rank<T: PartialOrd>(values: &[T]) -> Vec<usize> {
    values
        .iter()
        .map(|x| 1 + values.iter().filter(|y| *y > x).count())
        .collect()
}
