//! The seam between the solving engine and the device that evaluates the per-bag kernels.
//!
//! The engine moves chunks of solution tables into [Buffer]s, copies them to the device
//! explicitly and asks a [ComputeBackend] to fill an output buffer over a range of assignment
//! ids. A dispatch is synchronous: it returns once the output holds its results.

pub mod cpu;
pub(crate) mod kernel;

pub use cpu::CpuBackend;

use crate::error::{BackendError, ErrorKind};
use crate::masks::BagMask;
use crate::table::{Chunk, Representation, Solution};
use serde::Serialize;
use std::ops::Range;
use treesat_cnf::{Literal, LiteralWeights, Variable};

/// Where the contents of a buffer currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Location {
    Host,
    Device,
}

/// Accounting of the device memory. Buffers reserve their bytes when they are copied to the
/// device and release them when they are copied back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceMemory {
    capacity: usize,
    used: usize,
    peak: usize,
}

impl DeviceMemory {
    pub fn new(capacity: usize) -> Self {
        DeviceMemory {
            capacity,
            ..Default::default()
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.capacity - self.used
    }

    /// The largest number of bytes that were reserved at once.
    #[inline]
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn reserve(&mut self, bytes: usize) -> Result<(), BackendError> {
        if bytes > self.available() {
            return Err(BackendError::DeviceFull {
                required: bytes,
                available: self.available(),
            });
        }
        self.used += bytes;
        self.peak = self.peak.max(self.used);
        Ok(())
    }

    pub fn release(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.used);
        self.used = self.used.saturating_sub(bytes);
    }
}

/// A chunk of a solution table that can be handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    range: Range<u64>,
    solution: Solution,
    location: Location,
    /// The bytes the buffer occupies on the device.
    capacity: usize,
}

impl Buffer {
    /// Wraps an existing chunk. The buffer starts on the host.
    pub fn input(chunk: Chunk) -> Self {
        Buffer {
            capacity: chunk.solution.size_bytes(),
            range: chunk.range,
            solution: chunk.solution,
            location: Location::Host,
        }
    }

    /// An empty output over `range` that may grow to `capacity` bytes on the device.
    pub fn output(
        representation: Representation,
        width: usize,
        range: Range<u64>,
        capacity: usize,
    ) -> Self {
        Buffer {
            solution: Solution::empty(representation, width, &range),
            range,
            location: Location::Host,
            capacity,
        }
    }

    #[inline]
    pub fn location(&self) -> Location {
        self.location
    }

    #[inline]
    pub fn range(&self) -> &Range<u64> {
        &self.range
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    #[inline]
    pub fn solution_mut(&mut self) -> &mut Solution {
        &mut self.solution
    }

    /// Reserves the bytes of the buffer on the device. Copying a buffer that already is on the
    /// device does nothing.
    pub fn copy_to_device(&mut self, memory: &mut DeviceMemory) -> Result<(), BackendError> {
        if self.location == Location::Device {
            return Ok(());
        }
        memory.reserve(self.capacity)?;
        self.location = Location::Device;
        Ok(())
    }

    pub fn copy_to_host(&mut self, memory: &mut DeviceMemory) {
        if self.location == Location::Host {
            return;
        }
        memory.release(self.capacity);
        self.location = Location::Host;
    }

    /// Turns the buffer back into a chunk. Only buffers on the host can be read.
    pub fn into_chunk(self) -> Result<Chunk, BackendError> {
        match self.location {
            Location::Host => Ok(Chunk {
                range: self.range,
                solution: self.solution,
            }),
            Location::Device => Err(BackendError::DeviceBuffer),
        }
    }
}

/// A clause restricted to the scope of its owning bag.
/// Bit `i` is set if the `i`-th scope variable occurs with the respective sign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LocalClause {
    pub positive: u64,
    pub negative: u64,
}

impl LocalClause {
    /// Translates the literals of a clause to bits of `scope`.
    /// Literals over variables outside of the scope are dropped.
    pub fn new(scope: &[Variable], clause: &[Literal]) -> Self {
        clause.iter().fold(LocalClause::default(), |mut local, &literal| {
            if let Ok(bit) = scope.binary_search(&literal.unsigned_abs()) {
                if literal > 0 {
                    local.positive |= 1 << bit;
                } else {
                    local.negative |= 1 << bit;
                }
            }
            local
        })
    }

    /// Whether the assignment satisfies at least one literal.
    #[inline]
    pub fn is_satisfied(self, id: u64) -> bool {
        id & self.positive != 0 || !id & self.negative != 0
    }
}

/// The weights of the literals of a scope variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalWeight {
    pub bit: u32,
    pub positive: f64,
    pub negative: f64,
}

impl LocalWeight {
    pub fn new(bit: u32, weights: LiteralWeights) -> Self {
        LocalWeight {
            bit,
            positive: weights.positive,
            negative: weights.negative,
        }
    }

    #[inline]
    pub fn of(self, id: u64) -> f64 {
        if (id >> self.bit) & 1 == 1 {
            self.positive
        } else {
            self.negative
        }
    }
}

/// The operator that computes the table of a bag and how its inputs align with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    IntroduceForget(BagMask),
    Join { left: BagMask, right: BagMask },
}

/// Everything a backend needs to know about the bag it computes.
#[derive(Debug, Clone, PartialEq)]
pub struct BagDescriptor {
    pub label: usize,
    pub width: usize,
    /// The clauses this bag is responsible for.
    pub clauses: Vec<LocalClause>,
    /// Introduce-forget multiplies by the weights of the introduced variables, join divides by
    /// the weights of the whole scope. Empty when counting unweighted.
    pub weights: Vec<LocalWeight>,
    pub operation: Operation,
}

/// Evaluates the operators of the dynamic program on a device.
///
/// Implementations must be deterministic. The results for the ids of `range` are added to
/// `output`, so an output can accumulate several dispatches over different inputs.
pub trait ComputeBackend {
    fn dispatch_introduce_forget(
        &self,
        child: &Buffer,
        bag: &BagDescriptor,
        range: Range<u64>,
        output: &mut Buffer,
    ) -> Result<(), ErrorKind>;

    fn dispatch_join(
        &self,
        left: &Buffer,
        right: &Buffer,
        bag: &BagDescriptor,
        range: Range<u64>,
        output: &mut Buffer,
    ) -> Result<(), ErrorKind>;
}

/// Checks the preconditions every dispatch shares.
pub fn check_dispatch(
    inputs: &[&Buffer],
    output: &Buffer,
    range: &Range<u64>,
) -> Result<(), BackendError> {
    if inputs
        .iter()
        .chain(std::iter::once(&output))
        .any(|buffer| buffer.location != Location::Device)
    {
        return Err(BackendError::HostBuffer);
    }

    if range.start < output.range.start || range.end > output.range.end {
        return Err(BackendError::RangeOutOfBounds {
            start: range.start,
            end: range.end,
        });
    }

    Ok(())
}
