//! Independent per-orbital work items.
//!
//! Each closure reads shared state and produces one value; the caller writes
//! the results back after the whole batch has finished.

/// Maps `op` over `0..count`, in parallel when the `rayon` feature is on.
#[cfg(feature = "rayon")]
pub fn map_batch<T, F>(count: usize, op: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    (0..count).into_par_iter().map(op).collect()
}

/// Maps `op` over `0..count`, in parallel when the `rayon` feature is on.
#[cfg(not(feature = "rayon"))]
pub fn map_batch<T, F>(count: usize, op: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    (0..count).map(op).collect()
}

/// Like [`map_batch`], stopping at the first error in index order.
pub fn try_map_batch<T, E, F>(count: usize, op: F) -> Result<Vec<T>, E>
where
    T: Send,
    E: Send,
    F: Fn(usize) -> Result<T, E> + Sync + Send,
{
    map_batch(count, op).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::{map_batch, try_map_batch};

    #[test]
    fn results_keep_index_order() {
        let squares = map_batch(6, |i| i * i);
        assert_eq!(squares, vec![0, 1, 4, 9, 16, 25]);
    }

    #[test]
    fn first_error_is_returned() {
        let result: Result<Vec<usize>, String> =
            try_map_batch(5, |i| if i >= 3 { Err(format!("item {i}")) } else { Ok(i) });
        assert_eq!(result, Err("item 3".to_string()));
    }
}
