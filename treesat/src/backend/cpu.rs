use super::{check_dispatch, kernel, BagDescriptor, Buffer, ComputeBackend, Operation};
use crate::error::{BackendError, ErrorKind};
use crate::table::Solution;
use std::ops::Range;
use std::sync::mpsc;
use std::thread;
use workctl::WorkQueue;

/// The number of ids a worker evaluates before it reports back.
const BLOCK_SIZE: u64 = 1 << 12;

/// A backend that evaluates the kernels on the host.
///
/// With more than one worker, the dispatched range is cut into blocks that are distributed
/// over a work queue. The results are applied in block order, so the output does not depend
/// on the number of workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuBackend {
    pub workers: u16,
}

impl Default for CpuBackend {
    fn default() -> Self {
        CpuBackend { workers: 1 }
    }
}

impl CpuBackend {
    pub fn new(workers: u16) -> Self {
        CpuBackend { workers }
    }

    /// Replaces the weight of every id of `range` by what `kernel` makes of it.
    fn evaluate<F>(&self, range: Range<u64>, output: &mut Solution, kernel: F)
    where
        F: Fn(u64, f64) -> f64 + Sync,
    {
        if self.workers <= 1 || range.end - range.start <= BLOCK_SIZE {
            for id in range {
                let current = output.get(id);
                let weight = kernel(id, current);
                if weight != current {
                    output.set(id, weight);
                }
            }
            return;
        }

        let blocks = (range.end - range.start).div_ceil(BLOCK_SIZE) as usize;
        let mut queue = WorkQueue::with_capacity(blocks);
        for index in 0..blocks {
            let start = range.start + index as u64 * BLOCK_SIZE;
            queue.push_work((index, start..range.end.min(start + BLOCK_SIZE)));
        }

        let (results_tx, results_rx) = mpsc::channel();
        let kernel = &kernel;
        let current = &*output;

        let mut results = thread::scope(|scope| {
            for _ in 0..self.workers {
                let mut t_queue = queue.clone();
                let t_results_tx = results_tx.clone();

                scope.spawn(move || {
                    while let Some((index, block)) = t_queue.pull_work() {
                        let weights = block
                            .filter_map(|id| {
                                let before = current.get(id);
                                let weight = kernel(id, before);
                                (weight != before).then_some((id, weight))
                            })
                            .collect::<Vec<_>>();

                        // the receiver only hangs up once every block arrived
                        if t_results_tx.send((index, weights)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(results_tx);

            results_rx.iter().take(blocks).collect::<Vec<_>>()
        });

        results.sort_unstable_by_key(|&(index, _)| index);
        for (id, weight) in results.into_iter().flat_map(|(_, weights)| weights) {
            output.set(id, weight);
        }
    }
}

impl ComputeBackend for CpuBackend {
    fn dispatch_introduce_forget(
        &self,
        child: &Buffer,
        bag: &BagDescriptor,
        range: Range<u64>,
        output: &mut Buffer,
    ) -> Result<(), ErrorKind> {
        check_dispatch(&[child], output, &range)?;
        let Operation::IntroduceForget(mask) = &bag.operation else {
            return Err(BackendError::OperationMismatch { bag: bag.label }.into());
        };

        let child = child.solution();
        self.evaluate(range, output.solution_mut(), |id, current| {
            kernel::introduce_forget(child, bag, mask, id, current)
        });
        Ok(())
    }

    fn dispatch_join(
        &self,
        left: &Buffer,
        right: &Buffer,
        bag: &BagDescriptor,
        range: Range<u64>,
        output: &mut Buffer,
    ) -> Result<(), ErrorKind> {
        check_dispatch(&[left, right], output, &range)?;
        let Operation::Join {
            left: left_mask,
            right: right_mask,
        } = &bag.operation
        else {
            return Err(BackendError::OperationMismatch { bag: bag.label }.into());
        };

        // children sharing the scope of the join are read at the id itself
        let aligned = left_mask.is_identity() && right_mask.is_identity();
        let (left, right) = (left.solution(), right.solution());
        self.evaluate(range, output.solution_mut(), |id, current| {
            let children = if aligned {
                (id, id)
            } else {
                (left_mask.project(id), right_mask.project(id))
            };
            kernel::join(left, right, bag, children, id, current)
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::{DeviceMemory, LocalClause};
    use crate::masks::BagMask;
    use crate::table::{Chunk, Representation};

    // (x1 ∨ x2 ∨ … ∨ x16) introduced from the identity table
    fn introduce_all(backend: CpuBackend, representation: Representation) -> Vec<(u64, f64)> {
        let scope: Vec<usize> = (1..=16).collect();
        let literals: Vec<isize> = (1..=16).collect();
        let bag = BagDescriptor {
            label: 1,
            width: 16,
            clauses: vec![LocalClause::new(&scope, &literals)],
            weights: Vec::new(),
            operation: Operation::IntroduceForget(BagMask::new(&scope, &[])),
        };

        let mut identity = Solution::empty(Representation::Dense, 0, &(0..1));
        identity.set(0, 1.0);
        let mut memory = DeviceMemory::new(usize::MAX);
        let mut child = Buffer::input(Chunk {
            range: 0..1,
            solution: identity,
        });
        let mut output = Buffer::output(representation, 16, 0..1 << 16, 1 << 22);

        child.copy_to_device(&mut memory).unwrap();
        output.copy_to_device(&mut memory).unwrap();
        backend
            .dispatch_introduce_forget(&child, &bag, 0..1 << 16, &mut output)
            .unwrap();
        output.copy_to_host(&mut memory);

        output.solution().iter().collect()
    }

    #[test]
    fn workers_agree() {
        for representation in [Representation::Dense, Representation::Sparse] {
            let sequential = introduce_all(CpuBackend::new(1), representation);
            assert_eq!(sequential.len(), (1 << 16) - 1);
            assert_eq!(sequential.first(), Some(&(1, 1.0)));
            assert_eq!(introduce_all(CpuBackend::new(4), representation), sequential);
        }
    }

    #[test]
    fn join_children_of_the_same_scope() {
        let mut memory = DeviceMemory::new(1 << 10);
        let table = |entries: &[(u64, f64)]| {
            let mut solution = Solution::empty(Representation::Dense, 2, &(0..4));
            for &(id, weight) in entries {
                solution.set(id, weight);
            }
            Buffer::input(Chunk {
                range: 0..4,
                solution,
            })
        };
        let mut left = table(&[(1, 2.0), (2, 3.0), (3, 1.0)]);
        let mut right = table(&[(0, 5.0), (2, 0.5), (3, 4.0)]);
        let mut output = Buffer::output(Representation::Dense, 2, 0..4, 32);
        for buffer in [&mut left, &mut right, &mut output] {
            buffer.copy_to_device(&mut memory).unwrap();
        }

        let mask = BagMask::new(&[1, 2], &[1, 2]);
        assert!(mask.is_identity());
        let bag = BagDescriptor {
            label: 1,
            width: 2,
            clauses: Vec::new(),
            weights: Vec::new(),
            operation: Operation::Join {
                left: mask.clone(),
                right: mask,
            },
        };
        CpuBackend::default()
            .dispatch_join(&left, &right, &bag, 0..4, &mut output)
            .unwrap();
        output.copy_to_host(&mut memory);

        assert_eq!(
            output.solution().iter().collect::<Vec<_>>(),
            vec![(2, 1.5), (3, 4.0)]
        );
    }

    #[test]
    fn reject_mismatched_operation() {
        let mut memory = DeviceMemory::new(1 << 10);
        let mut input = Buffer::output(Representation::Dense, 1, 0..2, 16);
        let mut output = Buffer::output(Representation::Dense, 1, 0..2, 16);
        input.copy_to_device(&mut memory).unwrap();
        output.copy_to_device(&mut memory).unwrap();

        let bag = BagDescriptor {
            label: 3,
            width: 1,
            clauses: Vec::new(),
            weights: Vec::new(),
            operation: Operation::IntroduceForget(BagMask::new(&[1], &[1])),
        };
        assert_eq!(
            CpuBackend::default().dispatch_join(&input, &input, &bag, 0..2, &mut output),
            Err(ErrorKind::Backend(BackendError::OperationMismatch { bag: 3 }))
        );
    }
}
