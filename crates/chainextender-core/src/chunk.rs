//! Fixed-size chunking of per-block work.

/// Split `items` into chunks of at most `size` items, preserving order.
///
/// Yields `ceil(n / size)` chunks; every chunk but the last holds exactly
/// `size` items. A `size` of zero is treated as one.
pub fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut out = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        out.push(iter.by_ref().take(size).collect());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_counts_and_sizes() {
        for (n, c) in [(0usize, 3usize), (1, 3), (3, 3), (10, 3), (250, 100), (7, 1)] {
            let items: Vec<usize> = (0..n).collect();
            let chunks = chunk(items.clone(), c);
            assert_eq!(chunks.len(), n.div_ceil(c), "n={n} c={c}");
            if let Some((last, rest)) = chunks.split_last() {
                assert!(rest.iter().all(|ch| ch.len() == c));
                assert!(!last.is_empty() && last.len() <= c);
            }
            let flat: Vec<usize> = chunks.into_iter().flatten().collect();
            assert_eq!(flat, items);
        }
    }

    #[test]
    fn zero_size_behaves_like_one() {
        assert_eq!(chunk(vec![1, 2], 0), vec![vec![1], vec![2]]);
    }
}
