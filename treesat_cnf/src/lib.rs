//! Passive model of a formula in conjunctive normal form.

mod cnf;

pub use cnf::{Clause, Cnf, Literal, LiteralWeights, Variable};
