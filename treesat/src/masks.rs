//! Bit alignment between the scopes of neighbouring bags.
//!
//! An assignment of a scope is encoded as an integer whose bit `i` holds the value of the
//! `i`-th variable of the sorted scope. Two bags order their shared variables the same way,
//! but the shared variables sit at different bit positions once one of the scopes contains a
//! variable the other one lacks.

use itertools::{EitherOrBoth, Itertools};
use treesat_cnf::Variable;

/// The bit positions of a parent/child edge.
/// Built once per edge and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagMask {
    /// (parent bit, child bit) of every variable in both scopes.
    shared: Vec<(u32, u32)>,
    /// Parent bits of the variables that are not in the child.
    introduced: Vec<u32>,
    /// Child bits of the variables that are not in the parent.
    forgotten: Vec<u32>,
}

impl BagMask {
    /// Aligns the sorted scopes of a parent and its child.
    ///
    /// # Example
    /// ```
    /// use treesat::masks::BagMask;
    ///
    /// let mask = BagMask::new(&[1, 3], &[2, 3]);
    ///
    /// // variable 3 is bit 1 in both scopes, variable 2 is forgotten
    /// assert_eq!(mask.shared(), &[(1, 1)]);
    /// assert_eq!(mask.introduced(), &[0]);
    /// assert_eq!(mask.forgotten(), &[0]);
    /// assert_eq!(mask.extend(mask.project(0b10), 0b1), 0b11);
    /// ```
    pub fn new(parent: &[Variable], child: &[Variable]) -> Self {
        let mut mask = BagMask::default();

        parent
            .iter()
            .enumerate()
            .merge_join_by(child.iter().enumerate(), |(_, p), (_, c)| p.cmp(c))
            .for_each(|pair| match pair {
                EitherOrBoth::Both((p, _), (c, _)) => mask.shared.push((p as u32, c as u32)),
                EitherOrBoth::Left((p, _)) => mask.introduced.push(p as u32),
                EitherOrBoth::Right((c, _)) => mask.forgotten.push(c as u32),
            });

        mask
    }

    #[inline]
    pub fn shared(&self) -> &[(u32, u32)] {
        &self.shared
    }

    #[inline]
    pub fn introduced(&self) -> &[u32] {
        &self.introduced
    }

    #[inline]
    pub fn forgotten(&self) -> &[u32] {
        &self.forgotten
    }

    /// Whether both scopes are the same, so assignments need no translation.
    pub fn is_identity(&self) -> bool {
        self.introduced.is_empty()
            && self.forgotten.is_empty()
            && self.shared.iter().all(|(p, c)| p == c)
    }

    /// The number of assignments of the forgotten variables.
    #[inline]
    pub fn forgotten_assignments(&self) -> u64 {
        1 << self.forgotten.len()
    }

    /// Moves the shared bits of a parent assignment to their child positions.
    /// Forgotten variables are false in the result.
    #[inline]
    pub fn project(&self, parent_id: u64) -> u64 {
        self.shared
            .iter()
            .fold(0, |id, &(p, c)| id | (((parent_id >> p) & 1) << c))
    }

    /// Sets the forgotten variables of a projected child assignment.
    /// Bit `i` of `forgotten_assignment` is the value of the `i`-th forgotten variable.
    #[inline]
    pub fn extend(&self, projected: u64, forgotten_assignment: u64) -> u64 {
        self.forgotten
            .iter()
            .enumerate()
            .fold(projected, |id, (i, &c)| {
                id | (((forgotten_assignment >> i) & 1) << c)
            })
    }
}
