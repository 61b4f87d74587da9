use crate::backend::DeviceMemory;
use crate::error::MemoryError;
use crate::table::{Representation, Solution};
use log::trace;
use std::ops::Range;

/// Scopes wider than this do not have an addressable assignment space.
pub const MAX_WIDTH: usize = 62;

/// The partition of a table's assignment ids into equally sized, aligned ranges that are
/// dispatched one after another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub representation: Representation,
    /// The number of ids of every range, a power of two.
    pub chunk_len: u64,
    pub chunks: u64,
    /// The bytes an output buffer of one range needs at most.
    pub output_bytes: usize,
}

impl ChunkPlan {
    /// Finds the fewest chunks such that one output buffer fits into `max_memory_buffer` and,
    /// together with the `input_bytes` of the largest inputs, into the free device memory.
    pub fn new(
        label: usize,
        width: usize,
        representation: Representation,
        input_bytes: usize,
        max_memory_buffer: usize,
        memory: &DeviceMemory,
    ) -> Result<Self, MemoryError> {
        let available = memory.available();
        let to_usize = |bytes: u128| usize::try_from(bytes).unwrap_or(usize::MAX);
        let required = to_usize(
            Solution::bytes_for(representation, width, 1) + input_bytes as u128,
        );

        if width > MAX_WIDTH {
            return Err(MemoryError {
                bag: label,
                width,
                required,
                available,
            });
        }

        let total = 1_u64 << width;
        for bits in (0..=width).rev() {
            let chunk_len = 1_u64 << bits;
            let output = Solution::bytes_for(representation, width, chunk_len);

            if output <= max_memory_buffer as u128 && output + input_bytes as u128 <= available as u128
            {
                let plan = ChunkPlan {
                    representation,
                    chunk_len,
                    chunks: total / chunk_len,
                    output_bytes: to_usize(output),
                };
                trace!(
                    "Bag {label} with {width} variables is split into {} chunks of {} ids.",
                    plan.chunks,
                    plan.chunk_len
                );
                return Ok(plan);
            }
        }

        Err(MemoryError {
            bag: label,
            width,
            required,
            available: available.min(max_memory_buffer),
        })
    }

    /// The ranges in dispatch order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> {
        let chunk_len = self.chunk_len;
        (0..self.chunks).map(move |index| index * chunk_len..(index + 1) * chunk_len)
    }
}
