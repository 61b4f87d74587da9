use super::{Chunk, Solution, SparseSolution};
use log::trace;

/// Merges two solutions into one sparse solution that holds their pointwise sum.
///
/// The solutions may use different representations. Combining with a solution without any
/// non-zero weight keeps the weights of the other one.
///
/// # Example
/// ```
/// use treesat::table::{combine_tree, DenseSolution, Solution, SparseSolution};
///
/// let mut dense = DenseSolution::zeroed(&(0..4));
/// dense.set(1, 2.0);
/// let mut sparse = SparseSolution::new(3);
/// sparse.set(1, 0.5);
/// sparse.set(6, 1.0);
///
/// let combined = combine_tree(&Solution::Dense(dense), &Solution::Sparse(sparse), 3);
/// assert_eq!(combined.iter().collect::<Vec<_>>(), vec![(1, 2.5), (6, 1.0)]);
/// ```
pub fn combine_tree(first: &Solution, second: &Solution, width: usize) -> SparseSolution {
    match (first, second) {
        (Solution::Sparse(sparse), other) | (other, Solution::Sparse(sparse))
            if other.is_empty() =>
        {
            return sparse.clone();
        }
        _ => (),
    }

    let mut combined = SparseSolution::new(width);
    for (id, weight) in first.iter().chain(second.iter()) {
        combined.add(id, weight);
    }
    combined
}

/// Merges adjacent sparse chunks as long as the merged chunk stays within `max_bytes`.
///
/// Two tries share at least their root, so the merged trie never needs more than the sum of
/// both sizes minus one node. Dense chunks are left alone.
pub fn compact_chunks(chunks: Vec<Chunk>, width: usize, max_bytes: usize) -> Vec<Chunk> {
    let before = chunks.len();
    let mut compacted: Vec<Chunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        if let Some(last) = compacted.last_mut() {
            let fits = last.solution.size_bytes() + chunk.solution.size_bytes()
                <= max_bytes + std::mem::size_of::<u64>();
            let both_sparse = matches!(
                (&last.solution, &chunk.solution),
                (Solution::Sparse(_), Solution::Sparse(_))
            );

            if fits && both_sparse && last.range.end == chunk.range.start {
                let mut merged = combine_tree(&last.solution, &chunk.solution, width);
                merged.shrink_to_fit();
                last.solution = Solution::Sparse(merged);
                last.range.end = chunk.range.end;
                continue;
            }
        }
        compacted.push(chunk);
    }

    if compacted.len() < before {
        trace!("Compacted {before} chunks into {}.", compacted.len());
    }
    compacted
}
