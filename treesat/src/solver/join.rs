use super::{BagInput, BagStatus, ChunkPlan, Context};
use crate::backend::{BagDescriptor, Buffer, ComputeBackend, Operation};
use crate::error::{DecompositionError, ErrorKind};
use crate::masks::BagMask;
use crate::table::Table;
use std::ops::Range;

fn intersect(first: &Range<u64>, second: &Range<u64>) -> Option<Range<u64>> {
    let range = first.start.max(second.start)..first.end.min(second.end);
    (range.start < range.end).then_some(range)
}

/// Computes the table of a bag from the tables of its two children, each given with the
/// label of its bag.
///
/// Both children must have the scope of the bag. Only pairs of chunks whose ranges overlap
/// are dispatched, an id that is missing in either child has weight 0 in the result.
pub(crate) fn join<B: ComputeBackend>(
    backend: &B,
    context: &mut Context<'_>,
    bag: BagInput<'_>,
    left: (usize, Table),
    right: (usize, Table),
    status: &mut BagStatus,
) -> Result<Table, ErrorKind> {
    for (child, table) in [(left.0, &left.1), (right.0, &right.1)] {
        if table.variables != bag.variables {
            return Err(DecompositionError::JoinScopeMismatch {
                bag: bag.label,
                child,
            }
            .into());
        }
    }
    let (left, right) = (left.1, right.1);

    let width = bag.variables.len();
    let representation = context.representation(width);
    let plan = ChunkPlan::new(
        bag.label,
        width,
        representation,
        left.max_chunk_bytes() + right.max_chunk_bytes(),
        context.config.max_memory_buffer,
        &context.memory,
    )?;

    let descriptor = BagDescriptor {
        label: bag.label,
        width,
        clauses: bag.clauses,
        weights: context.weights(bag.variables, 0..width as u32),
        operation: Operation::Join {
            left: BagMask::new(bag.variables, &left.variables),
            right: BagMask::new(bag.variables, &right.variables),
        },
    };

    let mut lefts = left.chunks.into_iter().map(Buffer::input).collect::<Vec<_>>();
    let mut rights = right.chunks.into_iter().map(Buffer::input).collect::<Vec<_>>();
    let mut chunks = Vec::with_capacity(plan.chunks as usize);

    for (index, range) in plan.ranges().enumerate() {
        *status = BagStatus::ChunkDispatch(index);
        let mut output = Buffer::output(representation, width, range.clone(), plan.output_bytes);
        output.copy_to_device(&mut context.memory)?;

        for left in &mut lefts {
            let Some(outer) = intersect(&range, left.range()) else {
                continue;
            };
            left.copy_to_device(&mut context.memory)?;

            for right in &mut rights {
                let Some(inner) = intersect(&outer, right.range()) else {
                    continue;
                };
                right.copy_to_device(&mut context.memory)?;
                let dispatched = backend.dispatch_join(left, right, &descriptor, inner, &mut output);
                right.copy_to_host(&mut context.memory);
                dispatched?;
                context.statistics.dispatches += 1;
            }

            left.copy_to_host(&mut context.memory);
        }

        output.copy_to_host(&mut context.memory);
        chunks.push(output.into_chunk()?);
    }

    context.statistics.joins += 1;
    Ok(context.finish(bag.variables, representation, chunks, status))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::{CpuBackend, LocalClause};
    use crate::solver::introduce_forget::introduce_forget;
    use crate::solver::SolverConfig;
    use crate::table::TableStrategy;
    use treesat_cnf::{Cnf, LiteralWeights};

    const SCOPE: [usize; 3] = [1, 2, 3];

    fn leaf(context: &mut Context<'_>, clauses: &[Vec<isize>]) -> Table {
        let bag = BagInput {
            label: 1,
            variables: &SCOPE,
            clauses: clauses
                .iter()
                .map(|clause| LocalClause::new(&SCOPE, clause))
                .collect(),
        };
        introduce_forget(
            &CpuBackend::default(),
            context,
            bag,
            Table::identity(),
            &mut BagStatus::Pending,
        )
        .unwrap()
    }

    fn join_bag(context: &mut Context<'_>, left: Table, right: Table) -> Table {
        let bag = BagInput {
            label: 3,
            variables: &SCOPE,
            clauses: vec![LocalClause::new(&SCOPE, &[-1, -2])],
        };
        join(
            &CpuBackend::new(2),
            context,
            bag,
            (1, left),
            (2, right),
            &mut BagStatus::Pending,
        )
        .unwrap()
    }

    fn weighted_formula() -> Cnf {
        let mut formula = Cnf::from(vec![vec![1, 2, 3]]);
        formula.set_weights(
            1,
            LiteralWeights {
                positive: 0.3,
                negative: 0.7,
            },
        );
        formula.set_weights(
            3,
            LiteralWeights {
                positive: 2.0,
                negative: 0.5,
            },
        );
        formula
    }

    #[test]
    fn commutative() {
        let formula = weighted_formula();
        for strategy in [TableStrategy::Dense, TableStrategy::Sparse] {
            let config = SolverConfig {
                max_memory_buffer: 40,
                strategy,
                weighted: true,
                ..Default::default()
            };
            let mut context = Context::new(&formula, config);
            let left = leaf(&mut context, &[vec![1, 2], vec![-3, 2]]);
            let right = leaf(&mut context, &[vec![3, -1]]);

            let forward = join_bag(&mut context, left.clone(), right.clone());
            let backward = join_bag(&mut context, right, left);
            assert!(!forward.is_unsatisfiable());
            assert_eq!(
                forward.entries().collect::<Vec<_>>(),
                backward.entries().collect::<Vec<_>>()
            );
            assert_eq!(context.statistics.joins, 2);
            assert_eq!(context.memory.used(), 0);
        }
    }

    #[test]
    fn product_of_children() {
        let formula = weighted_formula();
        let config = SolverConfig {
            weighted: true,
            ..Default::default()
        };
        let mut context = Context::new(&formula, config);
        let left = leaf(&mut context, &[vec![1, 2]]);
        let right = leaf(&mut context, &[vec![3]]);
        let joined = join_bag(&mut context, left.clone(), right.clone());

        for id in 0..8_u64 {
            // the clause (¬x1 ∨ ¬x2) of the join bag
            let expected = if id & 0b011 == 0b011 {
                0.0
            } else {
                let correction = (0..3)
                    .map(|bit| {
                        let weights = formula.weights_of(SCOPE[bit]);
                        weights.of((id >> bit) & 1 == 1)
                    })
                    .product::<f64>();
                left.get(id) * right.get(id) / correction
            };
            assert!((joined.get(id) - expected).abs() < 1e-12, "assignment {id}");
        }
    }

    #[test]
    fn scope_mismatch() {
        let formula = Cnf::default();
        let mut context = Context::new(&formula, SolverConfig::default());
        let left = leaf(&mut context, &[]);
        let right = Table::identity();

        let bag = BagInput {
            label: 5,
            variables: &SCOPE,
            clauses: Vec::new(),
        };
        assert_eq!(
            join(
                &CpuBackend::default(),
                &mut context,
                bag,
                (6, left),
                (7, right),
                &mut BagStatus::Pending,
            ),
            Err(ErrorKind::MalformedDecomposition(
                DecompositionError::JoinScopeMismatch { bag: 5, child: 7 }
            ))
        );
    }
}
