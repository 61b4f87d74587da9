//! Error types used in the library.
//!
//! Every failure is fatal for the solve that raised it. Nothing is retried, the computation is
//! deterministic and a second attempt would fail the same way.
//! Overflow of weights is not an error, it is reported in the [SolveReport](crate::SolveReport).

use std::fmt::{Display, Formatter};
use treesat_cnf::Variable;

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    Parse(ParseError),
    MalformedDecomposition(DecompositionError),
    OutOfMemory(MemoryError),
    Backend(BackendError),
}

/// Errors while reading a formula or a decomposition.
/// Line numbers start at 1.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The input could not be read.
    Io(String),

    /// No problem line was found before the content.
    MissingHeader,

    /// A second problem line.
    DuplicateHeader(usize),

    /// Some unspecific problem at a specific line.
    Line(usize),

    /// A clause line without a terminating zero, or with a zero before its end.
    Unterminated(usize),

    /// A variable outside of the range declared in the header.
    VariableOutOfRange {
        line: usize,
        variable: Variable,
        declared: usize,
    },

    /// A bag id outside of the range declared in the header.
    BagOutOfRange {
        line: usize,
        bag: usize,
        declared: usize,
    },
}

impl From<ParseError> for ErrorKind {
    fn from(e: ParseError) -> Self {
        ErrorKind::Parse(e)
    }
}

/// Violations of the structure a tree decomposition must have.
/// Bags are named by their label.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecompositionError {
    /// A bag contains a variable the formula does not declare.
    VariableOutOfRange {
        bag: usize,
        variable: Variable,
        declared: usize,
    },

    /// A child of a join bag does not have the scope of the join bag.
    JoinScopeMismatch { bag: usize, child: usize },

    /// A bag with more than two children reached the solver.
    TooManyChildren { bag: usize, children: usize },

    /// No bag contains all variables of a clause. Clauses are numbered from 1 in input order.
    UncoveredClause { clause: usize },

    /// The bags containing a variable do not form a connected subtree.
    Disconnected { variable: Variable },

    /// The edges do not form a tree over the bags.
    NotATree { bags: usize, edges: usize },
}

impl From<DecompositionError> for ErrorKind {
    fn from(e: DecompositionError) -> Self {
        ErrorKind::MalformedDecomposition(e)
    }
}

/// Not even a single assignment of a bag fits into the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemoryError {
    /// The label of the bag.
    pub bag: usize,
    /// The number of variables in the scope of the bag.
    pub width: usize,
    /// The bytes needed by the smallest possible dispatch.
    pub required: usize,
    /// The bytes that were available.
    pub available: usize,
}

impl From<MemoryError> for ErrorKind {
    fn from(e: MemoryError) -> Self {
        ErrorKind::OutOfMemory(e)
    }
}

/// Misuse of a compute backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendError {
    /// A buffer handed to a dispatch was not copied to the device.
    HostBuffer,

    /// A buffer was read on the host while its contents still live on the device.
    DeviceBuffer,

    /// Copying a buffer to the device would exceed the device memory.
    DeviceFull { required: usize, available: usize },

    /// A bag was dispatched with the operator of another bag kind, the label is given.
    OperationMismatch { bag: usize },

    /// The dispatched range is not covered by the output buffer.
    RangeOutOfBounds { start: u64, end: u64 },
}

impl From<BackendError> for ErrorKind {
    fn from(e: BackendError) -> Self {
        ErrorKind::Backend(e)
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io(message) => write!(f, "unable to read the input: {message}"),
            ParseError::MissingHeader => write!(f, "the input has no problem line"),
            ParseError::DuplicateHeader(line) => write!(f, "line {line}: second problem line"),
            ParseError::Line(line) => write!(f, "line {line}: unable to parse"),
            ParseError::Unterminated(line) => {
                write!(f, "line {line}: clause is not terminated by a single 0")
            }
            ParseError::VariableOutOfRange {
                line,
                variable,
                declared,
            } => write!(
                f,
                "line {line}: variable {variable} is outside of the declared range 1..={declared}"
            ),
            ParseError::BagOutOfRange {
                line,
                bag,
                declared,
            } => write!(
                f,
                "line {line}: bag {bag} is outside of the declared range 1..={declared}"
            ),
        }
    }
}

impl Display for DecompositionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DecompositionError::VariableOutOfRange {
                bag,
                variable,
                declared,
            } => write!(
                f,
                "bag {bag} contains variable {variable}, the formula declares {declared} variables"
            ),
            DecompositionError::JoinScopeMismatch { bag, child } => {
                write!(f, "join bag {bag} and its child {child} differ in scope")
            }
            DecompositionError::TooManyChildren { bag, children } => {
                write!(f, "bag {bag} has {children} children, at most two are supported")
            }
            DecompositionError::UncoveredClause { clause } => {
                write!(f, "no bag contains all variables of clause {clause}")
            }
            DecompositionError::Disconnected { variable } => {
                write!(f, "the bags containing variable {variable} are not connected")
            }
            DecompositionError::NotATree { bags, edges } => {
                write!(f, "{edges} edges over {bags} bags do not form a tree")
            }
        }
    }
}

impl Display for MemoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bag {} with {} variables needs at least {} bytes, only {} are available",
            self.bag, self.width, self.required, self.available
        )
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::HostBuffer => write!(f, "dispatched a buffer that is not on the device"),
            BackendError::DeviceBuffer => {
                write!(f, "read a buffer that was not copied back to the host")
            }
            BackendError::DeviceFull {
                required,
                available,
            } => write!(
                f,
                "copying {required} bytes to the device exceeds the {available} available bytes"
            ),
            BackendError::OperationMismatch { bag } => {
                write!(f, "bag {bag} was dispatched with the wrong operator")
            }
            BackendError::RangeOutOfBounds { start, end } => {
                write!(f, "range {start}..{end} is not covered by the output buffer")
            }
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Parse(e) => write!(f, "parse error: {e}"),
            ErrorKind::MalformedDecomposition(e) => write!(f, "malformed decomposition: {e}"),
            ErrorKind::OutOfMemory(e) => write!(f, "out of memory: {e}"),
            ErrorKind::Backend(e) => write!(f, "backend error: {e}"),
        }
    }
}

impl std::error::Error for ErrorKind {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(
            ErrorKind::from(ParseError::Line(3)),
            ErrorKind::Parse(ParseError::Line(3))
        );
        let disconnected = DecompositionError::Disconnected { variable: 2 };
        assert_eq!(
            ErrorKind::from(disconnected),
            ErrorKind::MalformedDecomposition(disconnected)
        );
    }

    #[test]
    fn messages_name_the_culprit() {
        let error = ErrorKind::from(MemoryError {
            bag: 7,
            width: 40,
            required: 64,
            available: 32,
        });
        assert_eq!(
            error.to_string(),
            "out of memory: bag 7 with 40 variables needs at least 64 bytes, only 32 are available"
        );

        let error = ErrorKind::from(ParseError::VariableOutOfRange {
            line: 4,
            variable: 9,
            declared: 3,
        });
        assert!(error.to_string().contains("line 4"));
    }
}
