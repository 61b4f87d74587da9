//! The dynamic program over a tree decomposition.
//!
//! Bags are visited children first. Every bag turns the tables of its children into its own
//! table with one of two operators: introduce-forget for leaves and single children, join for
//! two children. Each operator cuts its output into chunks that fit the device, dispatches
//! them to a [ComputeBackend] and assembles the results. A child table is dropped as soon as
//! its parent consumed it.

mod chunking;
mod introduce_forget;
mod join;
mod statistics;

pub use chunking::{ChunkPlan, MAX_WIDTH};
pub use statistics::{BagStatus, Overflow, SolveReport, Statistics};

use crate::backend::{ComputeBackend, DeviceMemory, LocalClause, LocalWeight};
use crate::decomposition::{Bag, BagId, Decomposition};
use crate::error::{DecompositionError, ErrorKind};
use crate::table::{compact_chunks, Chunk, Representation, Table, TableStrategy};
use crate::util::format_vec;
use introduce_forget::introduce_forget;
use join::join;
use log::{debug, info, trace, warn};
use serde::Serialize;
use treesat_cnf::{Cnf, Variable};

/// The resource limits and counting mode of a [Solver].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SolverConfig {
    /// The bytes of device memory available to a run.
    pub memory_size: usize,
    /// The bytes a single output buffer may occupy.
    pub max_memory_buffer: usize,
    pub strategy: TableStrategy,
    /// Whether literal weights of the formula are applied.
    pub weighted: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            memory_size: 1 << 30,
            max_memory_buffer: 1 << 28,
            strategy: TableStrategy::Auto,
            weighted: false,
        }
    }
}

/// Counts models with a compute backend.
#[derive(Debug, Clone)]
pub struct Solver<B: ComputeBackend> {
    pub config: SolverConfig,
    backend: B,
}

/// The state the operators share during a single run.
pub(crate) struct Context<'a> {
    pub formula: &'a Cnf,
    pub config: SolverConfig,
    pub memory: DeviceMemory,
    pub statistics: Statistics,
}

impl<'a> Context<'a> {
    pub fn new(formula: &'a Cnf, config: SolverConfig) -> Self {
        Context {
            formula,
            config,
            memory: DeviceMemory::new(config.memory_size),
            statistics: Statistics::default(),
        }
    }

    /// The weights of the scope variables at `bits`, none when counting unweighted.
    pub fn weights(
        &self,
        variables: &[Variable],
        bits: impl IntoIterator<Item = u32>,
    ) -> Vec<LocalWeight> {
        if !self.config.weighted {
            return Vec::new();
        }
        bits.into_iter()
            .map(|bit| LocalWeight::new(bit, self.formula.weights_of(variables[bit as usize])))
            .collect()
    }

    pub fn representation(&self, width: usize) -> Representation {
        self.config
            .strategy
            .representation(width, self.config.max_memory_buffer)
    }

    /// Assembles the chunks of a computed table.
    pub fn finish(
        &mut self,
        variables: &[Variable],
        representation: Representation,
        mut chunks: Vec<Chunk>,
        status: &mut BagStatus,
    ) -> Table {
        chunks
            .iter_mut()
            .for_each(|chunk| chunk.solution.shrink_to_fit());
        if representation == Representation::Sparse {
            chunks = compact_chunks(chunks, variables.len(), self.config.max_memory_buffer);
        }

        let table = Table::new(variables.to_vec(), chunks);
        self.statistics.record_table(table.size_bytes());
        *status = BagStatus::Combined;
        table
    }
}

/// A bag as the operators see it.
pub(crate) struct BagInput<'a> {
    pub label: usize,
    pub variables: &'a [Variable],
    /// The clauses the bag is responsible for.
    pub clauses: Vec<LocalClause>,
}

impl<'a> BagInput<'a> {
    fn new(formula: &Cnf, bag: &'a Bag, owned: &[usize]) -> Self {
        BagInput {
            label: bag.label,
            variables: &bag.variables,
            clauses: owned
                .iter()
                .map(|&clause| LocalClause::new(&bag.variables, &formula.clauses[clause]))
                .collect(),
        }
    }
}

impl<B: ComputeBackend> Solver<B> {
    pub fn new(config: SolverConfig, backend: B) -> Self {
        Solver { config, backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Computes the model count of `formula` over the whole decomposition.
    ///
    /// # Example
    /// ```
    /// use treesat::backend::CpuBackend;
    /// use treesat::{Cnf, Decomposition, Solver, SolverConfig};
    ///
    /// // x1 ∨ x2
    /// let formula = Cnf::from(vec![vec![1, 2]]);
    /// let decomposition = Decomposition::new(2, [1, 2]);
    ///
    /// let solver = Solver::new(SolverConfig::default(), CpuBackend::default());
    /// let report = solver.solve(&formula, &decomposition).unwrap();
    /// assert!(report.satisfiable);
    /// assert_eq!(report.model_count, 3.0);
    /// ```
    pub fn solve(
        &self,
        formula: &Cnf,
        decomposition: &Decomposition,
    ) -> Result<SolveReport, ErrorKind> {
        let virtual_parent = Bag::new(0, []);
        self.solve_problem(formula, decomposition, decomposition.root, &virtual_parent)
    }

    /// Computes the model count of `formula` over the subtree below `root`.
    ///
    /// The table of `root` is projected onto the scope of `virtual_parent`, a bag above the
    /// root that is not part of the decomposition. Clauses no bag of the subtree covers may
    /// still be covered by the virtual parent. Variables outside of both count as free.
    pub fn solve_problem(
        &self,
        formula: &Cnf,
        decomposition: &Decomposition,
        root: BagId,
        virtual_parent: &Bag,
    ) -> Result<SolveReport, ErrorKind> {
        decomposition.validate(formula)?;
        if let Some(&variable) = virtual_parent
            .variables
            .iter()
            .find(|&&v| v == 0 || v > formula.num_variables)
        {
            return Err(DecompositionError::VariableOutOfRange {
                bag: virtual_parent.label,
                variable,
                declared: formula.num_variables,
            }
            .into());
        }

        let order = decomposition.post_order_from(root);
        let (owned, parent_owned) =
            assign_clauses(formula, decomposition, &order, virtual_parent)?;

        info!(
            "Solving {} clauses over {} variables along {} bags of width at most {}.",
            formula.clauses.len(),
            formula.num_variables,
            order.len(),
            order
                .iter()
                .map(|&id| decomposition[id].width())
                .max()
                .unwrap_or(0)
        );

        let mut context = Context::new(formula, self.config);
        let mut tables: Vec<Option<Table>> = vec![None; decomposition.len()];
        let mut status = vec![BagStatus::Pending; decomposition.len()];
        // every bag below the root is consumed by its parent exactly once
        let mut consumers = vec![0_usize; decomposition.len()];
        for &id in order.iter().filter(|&&id| id != root) {
            consumers[id.0] = 1;
        }
        let mut sizes = vec![0_usize; decomposition.len()];
        let mut live_bytes = 0;
        let mut overflow = None;

        for &id in &order {
            let bag = &decomposition[id];
            let input = BagInput::new(formula, bag, &owned[id.0]);

            let table = match bag.children[..] {
                [] => introduce_forget(
                    &self.backend,
                    &mut context,
                    input,
                    Table::identity(),
                    &mut status[id.0],
                )?,
                [child] => {
                    let child_table = take_table(&mut tables, decomposition, child)?;
                    introduce_forget(
                        &self.backend,
                        &mut context,
                        input,
                        child_table,
                        &mut status[id.0],
                    )?
                }
                [left, right] => {
                    let left_table = take_table(&mut tables, decomposition, left)?;
                    let right_table = take_table(&mut tables, decomposition, right)?;
                    join(
                        &self.backend,
                        &mut context,
                        input,
                        (decomposition[left].label, left_table),
                        (decomposition[right].label, right_table),
                        &mut status[id.0],
                    )?
                }
                _ => {
                    return Err(DecompositionError::TooManyChildren {
                        bag: bag.label,
                        children: bag.children.len(),
                    }
                    .into())
                }
            };

            sizes[id.0] = table.size_bytes();
            live_bytes += sizes[id.0];
            context.statistics.peak_live_bytes = context.statistics.peak_live_bytes.max(live_bytes);

            for &child in &bag.children {
                consumers[child.0] -= 1;
                if consumers[child.0] == 0 {
                    status[child.0] = BagStatus::Released;
                    live_bytes -= sizes[child.0];
                }
            }

            trace!(
                "Bag {} holds {} bytes in {} chunks.",
                bag.label,
                sizes[id.0],
                table.chunks.len()
            );

            if overflow.is_none() && table.has_overflowed() {
                warn!("The weights of bag {} exceed the range of f64.", bag.label);
                overflow = Some(Overflow { bag: bag.label });
            }

            if table.is_unsatisfiable() {
                debug!(
                    "No assignment of bag {} satisfies its clauses, stopping early.",
                    bag.label
                );
                return Ok(self.report(0.0, overflow, context));
            }

            tables[id.0] = Some(table);
        }

        let root_table = take_table(&mut tables, decomposition, root)?;
        status[root.0] = BagStatus::Released;
        let mut parent_status = BagStatus::Pending;
        let projected = introduce_forget(
            &self.backend,
            &mut context,
            BagInput::new(formula, virtual_parent, &parent_owned),
            root_table,
            &mut parent_status,
        )?;

        let free = decomposition
            .uncovered_variables_from(root)
            .into_iter()
            .filter(|&variable| !virtual_parent.contains(variable))
            .collect::<Vec<_>>();
        if !free.is_empty() {
            debug!(
                "The variables {} occur in no bag and are unconstrained.",
                format_vec(free.iter())
            );
        }
        let free_factor = free
            .into_iter()
            .map(|variable| {
                if self.config.weighted {
                    formula.weights_of(variable).sum()
                } else {
                    2.0
                }
            })
            .product::<f64>();

        let model_count = projected.total() * free_factor;
        if overflow.is_none() && !model_count.is_finite() {
            warn!("The model count exceeds the range of f64.");
            overflow = Some(Overflow {
                bag: virtual_parent.label,
            });
        }

        Ok(self.report(model_count, overflow, context))
    }

    fn report(
        &self,
        model_count: f64,
        overflow: Option<Overflow>,
        context: Context<'_>,
    ) -> SolveReport {
        let mut statistics = context.statistics;
        statistics.peak_device_bytes = context.memory.peak();

        info!(
            "Finished with {} joins and {} introduce-forgets in {} dispatches, the largest table had {} bytes.",
            statistics.joins,
            statistics.introduce_forgets,
            statistics.dispatches,
            statistics.max_table_size
        );

        SolveReport {
            satisfiable: model_count > 0.0,
            model_count,
            overflow,
            statistics,
        }
    }
}

/// Moves a computed table out of its arena slot.
fn take_table(
    tables: &mut [Option<Table>],
    decomposition: &Decomposition,
    id: BagId,
) -> Result<Table, ErrorKind> {
    // a slot is only empty twice if two parents list the same child
    tables[id.0].take().ok_or_else(|| {
        DecompositionError::NotATree {
            bags: decomposition.len(),
            edges: decomposition
                .bags
                .iter()
                .map(|bag| bag.children.len())
                .sum(),
        }
        .into()
    })
}

/// Hands every clause to the first bag in `order` whose scope contains all of its variables.
/// Clauses no bag covers go to the virtual parent if it covers them.
fn assign_clauses(
    formula: &Cnf,
    decomposition: &Decomposition,
    order: &[BagId],
    virtual_parent: &Bag,
) -> Result<(Vec<Vec<usize>>, Vec<usize>), ErrorKind> {
    let mut owned = vec![Vec::new(); decomposition.len()];
    let mut parent_owned = Vec::new();

    for (index, clause) in formula.clauses.iter().enumerate() {
        let variables = Cnf::clause_variables(clause);
        let covers = |bag: &Bag| variables.iter().all(|&variable| bag.contains(variable));

        if let Some(&id) = order.iter().find(|&&id| covers(&decomposition[id])) {
            owned[id.0].push(index);
        } else if covers(virtual_parent) {
            parent_owned.push(index);
        } else {
            return Err(DecompositionError::UncoveredClause { clause: index + 1 }.into());
        }
    }

    Ok((owned, parent_owned))
}
