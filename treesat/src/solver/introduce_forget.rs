use super::{BagInput, BagStatus, ChunkPlan, Context};
use crate::backend::{BagDescriptor, Buffer, ComputeBackend, Operation};
use crate::error::ErrorKind;
use crate::masks::BagMask;
use crate::table::Table;
use log::trace;

/// Computes the table of a bag from the table of its only child.
///
/// Leaves pass the identity table as their child. Every output range is dispatched once per
/// chunk of the child and the partial sums are accumulated in the output.
pub(crate) fn introduce_forget<B: ComputeBackend>(
    backend: &B,
    context: &mut Context<'_>,
    bag: BagInput<'_>,
    child: Table,
    status: &mut BagStatus,
) -> Result<Table, ErrorKind> {
    let width = bag.variables.len();
    let mask = BagMask::new(bag.variables, &child.variables);
    trace!(
        "Bag {} introduces {} and forgets {} variables.",
        bag.label,
        mask.introduced().len(),
        mask.forgotten().len()
    );

    let representation = context.representation(width);
    let plan = ChunkPlan::new(
        bag.label,
        width,
        representation,
        child.max_chunk_bytes(),
        context.config.max_memory_buffer,
        &context.memory,
    )?;

    let descriptor = BagDescriptor {
        label: bag.label,
        width,
        clauses: bag.clauses,
        weights: context.weights(bag.variables, mask.introduced().iter().copied()),
        operation: Operation::IntroduceForget(mask),
    };

    let mut inputs = child
        .chunks
        .into_iter()
        .map(Buffer::input)
        .collect::<Vec<_>>();
    let mut chunks = Vec::with_capacity(plan.chunks as usize);

    for (index, range) in plan.ranges().enumerate() {
        *status = BagStatus::ChunkDispatch(index);
        let mut output = Buffer::output(representation, width, range.clone(), plan.output_bytes);
        output.copy_to_device(&mut context.memory)?;

        for input in &mut inputs {
            input.copy_to_device(&mut context.memory)?;
            let dispatched =
                backend.dispatch_introduce_forget(input, &descriptor, range.clone(), &mut output);
            input.copy_to_host(&mut context.memory);
            dispatched?;
            context.statistics.dispatches += 1;
        }

        output.copy_to_host(&mut context.memory);
        chunks.push(output.into_chunk()?);
    }

    context.statistics.introduce_forgets += 1;
    Ok(context.finish(bag.variables, representation, chunks, status))
}
