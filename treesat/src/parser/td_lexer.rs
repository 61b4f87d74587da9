use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, space1, u64 as unsigned},
    combinator::{map, rest, value},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};

use TdToken::*;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Every line of a PACE tree decomposition gets an enum instance for the lexing progress
pub enum TdToken {
    /// The solution line "s td B W V" with B bags of at most W variables over V variables
    Header {
        bags: usize,
        width: usize,
        variables: usize,
    },
    /// "b id v1 v2 ...", the scope of a bag
    Bag { id: usize, variables: Vec<usize> },
    /// "i j", an undirected edge between two bags
    Edge { from: usize, to: usize },
    Comment,
}

/// Tests all lexers for a given line and returns the result of the fitting one.
///
/// # Examples
///
/// ```
/// use treesat::parser::td_lexer::*;
///
/// assert_eq!(
///     lex_line_td("s td 3 2 4"),
///     Ok(("", TdToken::Header { bags: 3, width: 2, variables: 4 }))
/// );
/// assert_eq!(
///     lex_line_td("b 2 3 4"),
///     Ok(("", TdToken::Bag { id: 2, variables: vec![3, 4] }))
/// );
/// assert_eq!(lex_line_td("1 2"), Ok(("", TdToken::Edge { from: 1, to: 2 })));
/// ```
#[inline]
pub fn lex_line_td(line: &str) -> IResult<&str, TdToken> {
    alt((lex_edge, lex_bag, lex_header, lex_comment)).parse(line)
}

fn number(input: &str) -> IResult<&str, usize> {
    map(unsigned, |n| n as usize).parse(input)
}

// Lexes the solution line "s td B W V".
fn lex_header(line: &str) -> IResult<&str, TdToken> {
    map(
        preceded(
            (char('s'), space1, tag("td")),
            (
                preceded(space1, number),
                preceded(space1, number),
                preceded(space1, number),
            ),
        ),
        |(bags, width, variables)| Header {
            bags,
            width,
            variables,
        },
    )
    .parse(line)
}

// Lexes a bag line "b id v1 v2 ...", the scope may be empty.
fn lex_bag(line: &str) -> IResult<&str, TdToken> {
    map(
        preceded(
            char('b'),
            (preceded(space1, number), many0(preceded(space1, number))),
        ),
        |(id, variables)| Bag { id, variables },
    )
    .parse(line)
}

fn lex_edge(line: &str) -> IResult<&str, TdToken> {
    map((number, preceded(space1, number)), |(from, to)| Edge {
        from,
        to,
    })
    .parse(line)
}

fn lex_comment(line: &str) -> IResult<&str, TdToken> {
    value(Comment, (char('c'), rest)).parse(line)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lex_lines() {
        assert_eq!(
            lex_line_td("b 7"),
            Ok((
                "",
                Bag {
                    id: 7,
                    variables: vec![]
                }
            ))
        );
        assert_eq!(
            lex_line_td("s td 1 0 0"),
            Ok((
                "",
                Header {
                    bags: 1,
                    width: 0,
                    variables: 0
                }
            ))
        );
        assert_eq!(lex_line_td("c bags and edges"), Ok(("", Comment)));
        assert!(lex_line_td("b").is_err());
        assert!(lex_line_td("s tw 1 2 3").is_err());
        assert_eq!(lex_line_td("1 2 3"), Ok((" 3", Edge { from: 1, to: 2 })));
    }
}
