use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, i64 as signed, space1, u64 as unsigned},
    combinator::{map, opt, rest, value},
    multi::separated_list1,
    number::complete::double,
    sequence::preceded,
    IResult, Parser,
};

use CnfToken::*;

#[derive(Debug, Clone, PartialEq)]
/// Every line of a DIMACS CNF file gets an enum instance for the lexing progress
pub enum CnfToken {
    /// The problem line "p cnf V C"
    Header { variables: usize, clauses: usize },
    /// A line starting with "c" that carries no weight
    Comment,
    /// "c p weight L W 0", sets the weight of exactly that literal
    LiteralWeight { literal: i64, weight: f64 },
    /// "w L W [0]", sets the weight of the literal and the complement of its negation
    Weight { literal: i64, weight: f64 },
    /// "%", everything after it is ignored
    End,
    /// All numbers of a clause line, including the terminating zero
    Clause(Vec<i64>),
}

/// Tests all lexers for a given line and returns the result of the fitting one.
/// Weighted comments have to be tried before plain comments because both start with "c".
///
/// # Examples
///
/// ```
/// use treesat::parser::cnf_lexer::*;
///
/// assert_eq!(
///     lex_line_cnf("p cnf 3 2"),
///     Ok(("", CnfToken::Header { variables: 3, clauses: 2 }))
/// );
/// assert_eq!(lex_line_cnf("-1 2 0"), Ok(("", CnfToken::Clause(vec![-1, 2, 0]))));
/// assert_eq!(
///     lex_line_cnf("c p weight -2 0.25 0"),
///     Ok(("", CnfToken::LiteralWeight { literal: -2, weight: 0.25 }))
/// );
/// assert_eq!(lex_line_cnf("c just a comment"), Ok(("", CnfToken::Comment)));
/// ```
#[inline]
pub fn lex_line_cnf(line: &str) -> IResult<&str, CnfToken> {
    alt((
        lex_clause,
        lex_literal_weight,
        lex_comment,
        lex_header,
        lex_weight,
        lex_end,
    ))
    .parse(line)
}

// Lexes the problem line "p cnf V C" with V variables and C clauses.
fn lex_header(line: &str) -> IResult<&str, CnfToken> {
    map(
        preceded(
            (char('p'), space1, tag("cnf")),
            (preceded(space1, unsigned), preceded(space1, unsigned)),
        ),
        |(variables, clauses)| Header {
            variables: variables as usize,
            clauses: clauses as usize,
        },
    )
    .parse(line)
}

// Lexes a weight comment "c p weight L W 0".
fn lex_literal_weight(line: &str) -> IResult<&str, CnfToken> {
    map(
        preceded(
            (char('c'), space1, char('p'), space1, tag("weight")),
            (
                preceded(space1, signed),
                preceded(space1, double),
                opt(preceded(space1, char('0'))),
            ),
        ),
        |(literal, weight, _)| LiteralWeight { literal, weight },
    )
    .parse(line)
}

// Lexes any other comment.
fn lex_comment(line: &str) -> IResult<&str, CnfToken> {
    value(Comment, (char('c'), rest)).parse(line)
}

// Lexes a weight line "w L W" with an optional terminating zero.
fn lex_weight(line: &str) -> IResult<&str, CnfToken> {
    map(
        preceded(
            char('w'),
            (
                preceded(space1, signed),
                preceded(space1, double),
                opt(preceded(space1, char('0'))),
            ),
        ),
        |(literal, weight, _)| Weight { literal, weight },
    )
    .parse(line)
}

fn lex_end(line: &str) -> IResult<&str, CnfToken> {
    value(End, (char('%'), rest)).parse(line)
}

// Lexes a sequence of signed numbers separated by spaces.
fn lex_clause(line: &str) -> IResult<&str, CnfToken> {
    map(separated_list1(space1, signed), Clause).parse(line)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lex_lines() {
        assert_eq!(
            lex_line_cnf("p  cnf 20\t7"),
            Ok((
                "",
                Header {
                    variables: 20,
                    clauses: 7
                }
            ))
        );
        assert_eq!(lex_line_cnf("0"), Ok(("", Clause(vec![0]))));
        assert_eq!(
            lex_line_cnf("w 4 0.75 0"),
            Ok((
                "",
                Weight {
                    literal: 4,
                    weight: 0.75
                }
            ))
        );
        assert_eq!(
            lex_line_cnf("w -4 -1"),
            Ok((
                "",
                Weight {
                    literal: -4,
                    weight: -1.0
                }
            ))
        );
        assert_eq!(lex_line_cnf("c"), Ok(("", Comment)));
        assert_eq!(lex_line_cnf("c p show 1 2 0"), Ok(("", Comment)));
        assert_eq!(lex_line_cnf("%"), Ok(("", End)));
    }

    #[test]
    fn leftovers() {
        // the caller rejects lines that are not consumed completely
        assert_eq!(lex_line_cnf("1 2 x"), Ok((" x", Clause(vec![1, 2]))));
        assert!(lex_line_cnf("x 1 2").is_err());
        assert!(lex_line_cnf("p dnf 1 2").is_err());
    }
}
