#![warn(unused_qualifications)]
#![deny(deprecated)]
#![deny(missing_copy_implementations)]
#![warn(clippy::disallowed_types)]

pub mod backend;
pub mod decomposition;
pub mod error;
pub mod masks;
pub mod parser;
pub mod solver;
pub mod table;
pub mod util;

pub use crate::decomposition::{Bag, BagId, BagKind, Decomposition};
pub use crate::error::ErrorKind;
pub use crate::solver::{Overflow, SolveReport, Solver, SolverConfig, Statistics};
pub use crate::table::TableStrategy;
pub use treesat_cnf::{Clause, Cnf, Literal, LiteralWeights, Variable};
