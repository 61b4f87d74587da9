pub mod cnf_lexer;
pub mod td_lexer;

use crate::decomposition::Decomposition;
use crate::error::{ErrorKind, ParseError};
use crate::util::format_vec;
use cnf_lexer::{lex_line_cnf, CnfToken};
use log::{debug, warn};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use td_lexer::{lex_line_td, TdToken};
use treesat_cnf::{Cnf, Literal, LiteralWeights, Variable};

/// Reads a whole input file, or the standard input if no path is given.
pub fn read_input(path: Option<&Path>) -> Result<String, ParseError> {
    let mut input = String::new();
    let read = match path {
        Some(path) => File::open(path)
            .and_then(|file| BufReader::new(file).read_to_string(&mut input)),
        None => io::stdin().lock().read_to_string(&mut input),
    };

    read.map_err(|e| match path {
        Some(path) => ParseError::Io(format!("{}: {e}", path.display())),
        None => ParseError::Io(format!("stdin: {e}")),
    })?;
    Ok(input)
}

/// Lexes every non-empty line and hands the tokens with their line number to `handle`.
/// A line that is not lexed completely is an error at that line.
fn lex_lines<'a, T>(
    input: &'a str,
    lex: impl Fn(&'a str) -> nom::IResult<&'a str, T>,
    mut handle: impl FnMut(usize, T) -> Result<bool, ParseError>,
) -> Result<(), ParseError> {
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let token = match lex(line) {
            Ok((rest, token)) if rest.trim().is_empty() => token,
            _ => return Err(ParseError::Line(index + 1)),
        };
        if !handle(index + 1, token)? {
            break;
        }
    }
    Ok(())
}

fn variable_in_range(line: usize, literal: i64, declared: usize) -> Result<Literal, ParseError> {
    let variable = literal.unsigned_abs() as Variable;
    if variable == 0 || variable > declared {
        return Err(ParseError::VariableOutOfRange {
            line,
            variable,
            declared,
        });
    }
    Ok(literal as Literal)
}

/// Parses a formula in the DIMACS CNF format.
///
/// Weights may be given as `w L W [0]`, where `W` also determines the weight `1 - W` of the
/// negated literal and `W = -1` leaves both literals at 1, or as `c p weight L W 0`, which
/// only sets the weight of `L`.
///
/// # Example
/// ```
/// use treesat::parser::parse_formula;
///
/// let formula = parse_formula("c two clauses\np cnf 3 2\n1 -2 0\n2 3 0\n").unwrap();
/// assert_eq!(formula.num_variables, 3);
/// assert_eq!(formula.clauses, vec![vec![1, -2], vec![2, 3]]);
/// assert!(!formula.is_weighted());
/// ```
pub fn parse_formula(input: &str) -> Result<Cnf, ErrorKind> {
    let mut formula = Cnf::default();
    let mut declared_clauses = None;
    // the header count is only a hint, every clause needs a line of its own
    let lines = input.lines().count();

    lex_lines(input, lex_line_cnf, |line, token| {
        use CnfToken::*;

        if let Header { variables, clauses } = token {
            if declared_clauses.is_some() {
                return Err(ParseError::DuplicateHeader(line));
            }
            declared_clauses = Some(clauses);
            formula.num_variables = variables;
            formula.clauses.reserve(clauses.min(lines));
            return Ok(true);
        }

        let declared = formula.num_variables;
        match token {
            Comment => (),
            End => return Ok(false),
            _ if declared_clauses.is_none() => return Err(ParseError::MissingHeader),
            Clause(numbers) => {
                let Some((&0, literals)) = numbers.split_last() else {
                    return Err(ParseError::Unterminated(line));
                };
                let clause = literals
                    .iter()
                    .map(|&literal| match literal {
                        0 => Err(ParseError::Unterminated(line)),
                        _ => variable_in_range(line, literal, declared),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                formula.clauses.push(clause);
            }
            Weight { literal, weight } => {
                let literal = variable_in_range(line, literal, declared)?;
                if weight == -1.0 {
                    formula.set_weights(literal.unsigned_abs(), LiteralWeights::default());
                } else {
                    formula.set_literal_weight(literal, weight);
                    formula.set_literal_weight(-literal, 1.0 - weight);
                }
            }
            LiteralWeight { literal, weight } => {
                let literal = variable_in_range(line, literal, declared)?;
                formula.set_literal_weight(literal, weight);
            }
            Header { .. } => (),
        }
        Ok(true)
    })?;

    let Some(declared_clauses) = declared_clauses else {
        return Err(ParseError::MissingHeader.into());
    };
    if formula.clauses.len() != declared_clauses {
        warn!(
            "The header declares {} clauses, but {} were found.",
            declared_clauses,
            formula.clauses.len()
        );
    }

    debug!(
        "Parsed a formula with {} variables and {} clauses.",
        formula.num_variables,
        formula.clauses.len()
    );
    Ok(formula)
}

/// Reads a formula from a file, or from the standard input if no path is given.
pub fn build_formula(path: Option<&Path>) -> Result<Cnf, ErrorKind> {
    parse_formula(&read_input(path)?)
}

/// Parses a tree decomposition in the PACE format, rooted at bag 1.
///
/// # Example
/// ```
/// use treesat::parser::parse_decomposition;
///
/// let decomposition = parse_decomposition("s td 2 2 3\nb 1 1 2\nb 2 2 3\n1 2\n").unwrap();
/// assert_eq!(decomposition.len(), 2);
/// assert_eq!(decomposition[decomposition.root].variables, vec![1, 2]);
/// ```
pub fn parse_decomposition(input: &str) -> Result<Decomposition, ErrorKind> {
    let lines = input.lines().count();
    let mut header = None;
    let mut scopes: Vec<Option<Vec<Variable>>> = Vec::new();
    let mut edges = Vec::new();

    lex_lines(input, lex_line_td, |line, token| {
        use TdToken::*;

        if let Header {
            bags,
            width,
            variables,
        } = token
        {
            if header.is_some() {
                return Err(ParseError::DuplicateHeader(line));
            }
            // a tree over `bags` bags has `bags - 1` edge lines
            if bags > lines {
                return Err(ParseError::Line(line));
            }
            header = Some((bags, width, variables));
            scopes = vec![None; bags];
            return Ok(true);
        }

        let Some((bags, _, declared)) = header else {
            return match token {
                Comment => Ok(true),
                _ => Err(ParseError::MissingHeader),
            };
        };
        let bag_in_range = |bag: usize| {
            if bag == 0 || bag > bags {
                Err(ParseError::BagOutOfRange {
                    line,
                    bag,
                    declared: bags,
                })
            } else {
                Ok(bag)
            }
        };

        match token {
            Bag { id, variables } => {
                bag_in_range(id)?;
                if let Some(&variable) = variables.iter().find(|&&v| v == 0 || v > declared) {
                    return Err(ParseError::VariableOutOfRange {
                        line,
                        variable,
                        declared,
                    });
                }
                if scopes[id - 1].replace(variables).is_some() {
                    warn!("Line {line}: bag {id} is described a second time, keeping the last scope.");
                }
            }
            Edge { from, to } => edges.push((bag_in_range(from)?, bag_in_range(to)?)),
            Comment | Header { .. } => (),
        }
        Ok(true)
    })?;

    let Some((_, width, variables)) = header else {
        return Err(ParseError::MissingHeader.into());
    };

    let missing = scopes
        .iter()
        .enumerate()
        .filter(|(_, scope)| scope.is_none())
        .map(|(index, _)| index + 1)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        warn!(
            "The bags {} have no bag line and are treated as empty.",
            format_vec(missing.iter())
        );
    }
    let scopes = scopes
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect::<Vec<_>>();

    let decomposition = Decomposition::from_edges(variables, scopes, &edges)?;
    if decomposition.width() > width {
        warn!(
            "The header declares bags of at most {} variables, but a bag has {}.",
            width,
            decomposition.width()
        );
    }

    Ok(decomposition)
}

/// Reads a tree decomposition from a file and prepares it for the solver.
///
/// Chains of single children are contracted while their union has at most `combine_width`
/// variables, then every join gets exactly two children with its own scope.
pub fn build_decomposition(
    path: &Path,
    combine_width: Option<usize>,
) -> Result<Decomposition, ErrorKind> {
    let mut decomposition = parse_decomposition(&read_input(Some(path))?)?;
    if let Some(combine_width) = combine_width {
        decomposition.contract(combine_width);
    }
    decomposition.normalize();
    Ok(decomposition)
}
