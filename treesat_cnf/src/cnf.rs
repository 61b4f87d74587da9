use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

pub type Variable = usize;
pub type Literal = isize;
pub type Clause = Vec<Literal>;

/// The weights of both literals of a variable.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LiteralWeights {
    pub positive: f64,
    pub negative: f64,
}

impl Default for LiteralWeights {
    fn default() -> Self {
        Self {
            positive: 1.0,
            negative: 1.0,
        }
    }
}

impl LiteralWeights {
    /// The weight of the literal that is true under the given value of its variable.
    #[inline]
    pub fn of(self, value: bool) -> f64 {
        if value {
            self.positive
        } else {
            self.negative
        }
    }

    /// The combined weight of a variable that may take both values.
    #[inline]
    pub fn sum(self) -> f64 {
        self.positive + self.negative
    }
}

/// A formula over the variables `1..=num_variables`.
///
/// Literal weights are optional. Without them every literal weighs `1.0` and the weighted count
/// equals the plain model count.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Cnf {
    pub num_variables: usize,
    pub clauses: Vec<Clause>,
    /// Indexed by `variable - 1`.
    pub weights: Option<Vec<LiteralWeights>>,
}

impl Cnf {
    /// Whether any literal carries an explicit weight.
    pub fn is_weighted(&self) -> bool {
        self.weights.is_some()
    }

    /// Returns the weights of both literals of a variable.
    ///
    /// Variables without explicit weights, and all variables of an unweighted formula, weigh `1.0`.
    pub fn weights_of(&self, variable: Variable) -> LiteralWeights {
        self.weights
            .as_ref()
            .and_then(|weights| weights.get(variable.wrapping_sub(1)))
            .copied()
            .unwrap_or_default()
    }

    /// Sets the weight of a single literal, keeping the weight of its negation.
    pub fn set_literal_weight(&mut self, literal: Literal, weight: f64) {
        let index = literal.unsigned_abs() - 1;
        let weights = self
            .weights
            .get_or_insert_with(|| vec![LiteralWeights::default(); self.num_variables]);

        if weights.len() <= index {
            weights.resize(index + 1, LiteralWeights::default());
        }

        if literal > 0 {
            weights[index].positive = weight;
        } else {
            weights[index].negative = weight;
        }
    }

    /// Sets the weights of both literals of a variable.
    pub fn set_weights(&mut self, variable: Variable, weights: LiteralWeights) {
        self.set_literal_weight(variable as Literal, weights.positive);
        self.set_literal_weight(-(variable as Literal), weights.negative);
    }

    /// The variables occurring in a clause, sorted and without duplicates.
    pub fn clause_variables(clause: &[Literal]) -> Vec<Variable> {
        clause
            .iter()
            .map(|literal| literal.unsigned_abs())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl Display for Cnf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "p cnf {} {}", self.num_variables, self.clauses.len())?;

        self.clauses.iter().try_for_each(|clause| {
            writeln!(f)?;
            clause
                .iter()
                .try_for_each(|literal| write!(f, "{literal} "))?;
            write!(f, "0")
        })?;

        if let Some(weights) = &self.weights {
            for (index, weight) in weights.iter().enumerate() {
                let variable = index + 1;
                write!(f, "\nc p weight {variable} {} 0", weight.positive)?;
                write!(f, "\nc p weight -{variable} {} 0", weight.negative)?;
            }
        }

        Ok(())
    }
}

impl FromIterator<Clause> for Cnf {
    fn from_iter<T: IntoIterator<Item = Clause>>(iter: T) -> Self {
        let clauses: Vec<Clause> = iter.into_iter().collect();
        let num_variables = clauses
            .iter()
            .flat_map(|clause| clause.iter())
            .map(|literal| literal.unsigned_abs())
            .max()
            .unwrap_or(0);

        Cnf {
            num_variables,
            clauses,
            weights: None,
        }
    }
}

impl From<Vec<Vec<Literal>>> for Cnf {
    fn from(value: Vec<Vec<Literal>>) -> Self {
        value.into_iter().collect()
    }
}

#[cfg(test)]
mod test {
    use super::{Cnf, LiteralWeights};

    #[test]
    fn display_cnf() {
        let cnf = Cnf {
            num_variables: 3,
            clauses: vec![vec![1, -2, 3], vec![-1]],
            weights: None,
        };

        let expected = r#"p cnf 3 2
1 -2 3 0
-1 0"#;

        assert_eq!(cnf.to_string(), expected);
    }

    #[test]
    fn display_weighted_cnf() {
        let mut cnf = Cnf::from(vec![vec![1]]);
        cnf.set_weights(
            1,
            LiteralWeights {
                positive: 0.25,
                negative: 0.75,
            },
        );

        let expected = r#"p cnf 1 1
1 0
c p weight 1 0.25 0
c p weight -1 0.75 0"#;

        assert_eq!(cnf.to_string(), expected);
    }

    #[test]
    fn variables_from_clauses() {
        // the largest variable determines the range, not the number of distinct variables
        let cnf = Cnf::from(vec![vec![1, -7], vec![3]]);
        assert_eq!(cnf.num_variables, 7);
        assert!(!cnf.is_weighted());
        assert_eq!(Cnf::clause_variables(&[3, -1, 1]), vec![1, 3]);
    }

    #[test]
    fn literal_weights() {
        let mut cnf = Cnf::from(vec![vec![1]]);
        assert_eq!(cnf.weights_of(1), LiteralWeights::default());

        cnf.set_literal_weight(-1, 0.5);
        assert_eq!(cnf.weights_of(1).positive, 1.0);
        assert_eq!(cnf.weights_of(1).negative, 0.5);
        assert_eq!(cnf.weights_of(1).sum(), 1.5);
        assert_eq!(cnf.weights_of(1).of(false), 0.5);

        // unknown variables fall back to the neutral weight
        assert_eq!(cnf.weights_of(0), LiteralWeights::default());
        assert_eq!(cnf.weights_of(42), LiteralWeights::default());
    }
}
