//! Solution tables: the weights of all assignments of a bag's scope.
//!
//! A table is split into chunks over contiguous ranges of assignment ids. Every chunk stores
//! its weights either densely, one `f64` per id, or sparsely in a trie that only holds the
//! non-zero weights. Ids that no chunk stores have weight 0.

pub mod combine;
mod dense;
mod sparse;

pub use combine::{combine_tree, compact_chunks};
pub use dense::DenseSolution;
pub use sparse::SparseSolution;

use itertools::Either;
use serde::Serialize;
use std::ops::Range;
use treesat_cnf::Variable;

/// The storage layout of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Representation {
    Dense,
    Sparse,
}

/// How the solver lays out the tables it computes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum TableStrategy {
    Dense,
    Sparse,
    /// Dense if the complete table of a bag fits into a single buffer, sparse otherwise.
    #[default]
    Auto,
}

impl TableStrategy {
    /// The representation used for a bag with `width` variables.
    pub fn representation(self, width: usize, max_memory_buffer: usize) -> Representation {
        match self {
            TableStrategy::Dense => Representation::Dense,
            TableStrategy::Sparse => Representation::Sparse,
            TableStrategy::Auto => {
                if width < 63 && DenseSolution::bytes_for(1 << width) <= max_memory_buffer as u128
                {
                    Representation::Dense
                } else {
                    Representation::Sparse
                }
            }
        }
    }
}

/// The weights of one chunk in either representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Solution {
    Dense(DenseSolution),
    Sparse(SparseSolution),
}

impl Solution {
    /// A solution without any non-zero weight that can hold the ids of `range`.
    pub fn empty(representation: Representation, width: usize, range: &Range<u64>) -> Self {
        match representation {
            Representation::Dense => Solution::Dense(DenseSolution::zeroed(range)),
            Representation::Sparse => Solution::Sparse(SparseSolution::new(width)),
        }
    }

    /// The bytes the output of a dispatch over `len` ids needs at most.
    pub fn bytes_for(representation: Representation, width: usize, len: u64) -> u128 {
        match representation {
            Representation::Dense => DenseSolution::bytes_for(len),
            Representation::Sparse => SparseSolution::bytes_for(width, len),
        }
    }

    #[inline]
    pub fn representation(&self) -> Representation {
        match self {
            Solution::Dense(_) => Representation::Dense,
            Solution::Sparse(_) => Representation::Sparse,
        }
    }

    #[inline]
    pub fn get(&self, id: u64) -> f64 {
        match self {
            Solution::Dense(dense) => dense.get(id),
            Solution::Sparse(sparse) => sparse.get(id),
        }
    }

    #[inline]
    pub fn set(&mut self, id: u64, weight: f64) {
        match self {
            Solution::Dense(dense) => dense.set(id, weight),
            Solution::Sparse(sparse) => sparse.set(id, weight),
        }
    }

    #[inline]
    pub fn add(&mut self, id: u64, weight: f64) {
        match self {
            Solution::Dense(dense) => dense.add(id, weight),
            Solution::Sparse(sparse) => sparse.add(id, weight),
        }
    }

    /// All ids with a non-zero weight, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        match self {
            Solution::Dense(dense) => Either::Left(dense.iter()),
            Solution::Sparse(sparse) => Either::Right(sparse.iter()),
        }
    }

    /// Folds over the ids with a non-zero weight in ascending order.
    pub fn fold_assignments<B>(&self, init: B, f: impl FnMut(B, (u64, f64)) -> B) -> B {
        self.iter().fold(init, f)
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            Solution::Dense(dense) => dense.size_bytes(),
            Solution::Sparse(sparse) => sparse.size_bytes(),
        }
    }

    /// Whether every weight is 0.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Whether a weight became infinite or NaN.
    pub fn has_overflowed(&self) -> bool {
        self.iter().any(|(_, weight)| !weight.is_finite())
    }

    /// Converts the solution into `representation`, keeping its weights.
    pub fn into_representation(
        self,
        representation: Representation,
        width: usize,
        range: &Range<u64>,
    ) -> Self {
        if self.representation() == representation {
            return self;
        }

        let mut converted = Solution::empty(representation, width, range);
        for (id, weight) in self.iter() {
            converted.set(id, weight);
        }
        converted
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        if let Solution::Sparse(sparse) = self {
            sparse.shrink_to_fit();
        }
    }
}

/// A solution together with the range of ids it is responsible for.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub range: Range<u64>,
    pub solution: Solution,
}

/// The solution table of a bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// The scope of the table, sorted ascending.
    pub variables: Vec<Variable>,
    /// Chunks with disjoint ranges in ascending order. Chunks without a non-zero weight are
    /// not stored.
    pub chunks: Vec<Chunk>,
}

impl Table {
    /// The table over the empty scope that assigns weight 1 to the empty assignment.
    pub fn identity() -> Self {
        let range = 0..1;
        let mut solution = DenseSolution::zeroed(&range);
        solution.set(0, 1.0);
        Table {
            variables: Vec::new(),
            chunks: vec![Chunk {
                range,
                solution: Solution::Dense(solution),
            }],
        }
    }

    /// Creates a table and drops the chunks that only hold zeros.
    pub fn new(variables: Vec<Variable>, chunks: impl IntoIterator<Item = Chunk>) -> Self {
        let chunks = chunks
            .into_iter()
            .filter(|chunk| !chunk.solution.is_empty())
            .collect::<Vec<_>>();
        debug_assert!(chunks
            .windows(2)
            .all(|pair| pair[0].range.end <= pair[1].range.start));

        Table { variables, chunks }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.variables.len()
    }

    /// The weight of an assignment id.
    pub fn get(&self, id: u64) -> f64 {
        let index = self.chunks.partition_point(|chunk| chunk.range.end <= id);
        self.chunks
            .get(index)
            .filter(|chunk| chunk.range.contains(&id))
            .map_or(0.0, |chunk| chunk.solution.get(id))
    }

    /// All ids with a non-zero weight, ascending.
    pub fn entries(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.chunks.iter().flat_map(|chunk| chunk.solution.iter())
    }

    /// Folds over the ids with a non-zero weight in ascending order.
    pub fn fold_assignments<B>(&self, init: B, f: impl FnMut(B, (u64, f64)) -> B) -> B {
        self.entries().fold(init, f)
    }

    /// The sum of all weights.
    pub fn total(&self) -> f64 {
        self.fold_assignments(0.0, |sum, (_, weight)| sum + weight)
    }

    pub fn size_bytes(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| chunk.solution.size_bytes())
            .sum()
    }

    /// The size of the largest chunk.
    pub fn max_chunk_bytes(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| chunk.solution.size_bytes())
            .max()
            .unwrap_or(0)
    }

    /// A table without any non-zero weight means that no assignment satisfies the clauses
    /// seen so far.
    pub fn is_unsatisfiable(&self) -> bool {
        self.chunks.iter().all(|chunk| chunk.solution.is_empty())
    }

    pub fn has_overflowed(&self) -> bool {
        self.chunks
            .iter()
            .any(|chunk| chunk.solution.has_overflowed())
    }

    /// Converts every chunk into `representation`.
    pub fn into_representation(self, representation: Representation) -> Self {
        let width = self.width();
        Table {
            variables: self.variables,
            chunks: self
                .chunks
                .into_iter()
                .map(|Chunk { range, solution }| Chunk {
                    solution: solution.into_representation(representation, width, &range),
                    range,
                })
                .collect(),
        }
    }
}
