//! The per-assignment functions every backend evaluates over the ids of a dispatched range.

use super::{BagDescriptor, LocalClause, LocalWeight};
use crate::masks::BagMask;
use crate::table::Solution;

#[inline]
pub(crate) fn satisfies(clauses: &[LocalClause], id: u64) -> bool {
    clauses.iter().all(|clause| clause.is_satisfied(id))
}

#[inline]
pub(crate) fn weight_product(weights: &[LocalWeight], id: u64) -> f64 {
    weights.iter().map(|weight| weight.of(id)).product()
}

/// Adds the weight `id` gets from `child` to `current`, the weight accumulated from earlier
/// chunks of the child.
///
/// Every child weight of an extension by the forgotten variables is multiplied by the weights
/// of the introduced variables before it is added. Extensions are visited in ascending order
/// and child chunks are dispatched in ascending order, so the terms reach the output in the
/// same order however the child is chunked.
pub(crate) fn introduce_forget(
    child: &Solution,
    bag: &BagDescriptor,
    mask: &BagMask,
    id: u64,
    current: f64,
) -> f64 {
    if !satisfies(&bag.clauses, id) {
        return current;
    }

    let weight = weight_product(&bag.weights, id);
    let projected = mask.project(id);
    (0..mask.forgotten_assignments())
        .map(|forgotten| child.get(mask.extend(projected, forgotten)))
        .filter(|&child_weight| child_weight != 0.0)
        .fold(current, |sum, child_weight| sum + child_weight * weight)
}

/// The product of both children at the ids `children`, corrected by the weights both of them
/// already applied to the scope of the bag, added to `current`.
pub(crate) fn join(
    left: &Solution,
    right: &Solution,
    bag: &BagDescriptor,
    children: (u64, u64),
    id: u64,
    current: f64,
) -> f64 {
    if !satisfies(&bag.clauses, id) {
        return current;
    }

    let left = left.get(children.0);
    if left == 0.0 {
        return current;
    }
    let right = right.get(children.1);
    if right == 0.0 {
        return current;
    }

    let correction = weight_product(&bag.weights, id);
    if correction == 0.0 {
        current
    } else {
        current + left * right / correction
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::Operation;
    use crate::table::{DenseSolution, Representation};

    fn descriptor(clauses: Vec<LocalClause>, weights: Vec<LocalWeight>) -> BagDescriptor {
        BagDescriptor {
            label: 1,
            width: 2,
            clauses,
            weights,
            operation: Operation::IntroduceForget(BagMask::default()),
        }
    }

    #[test]
    fn introduce_and_filter() {
        // the identity table, introducing {1, 2} under (x1 ∨ x2)
        let mut identity = Solution::empty(Representation::Dense, 0, &(0..1));
        identity.set(0, 1.0);
        let mask = BagMask::new(&[1, 2], &[]);
        let bag = descriptor(vec![LocalClause::new(&[1, 2], &[1, 2])], Vec::new());

        let weights = (0..4)
            .map(|id| introduce_forget(&identity, &bag, &mask, id, 0.0))
            .collect::<Vec<_>>();
        assert_eq!(weights, vec![0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn forget_sums() {
        let mut child = DenseSolution::zeroed(&(0..4));
        child.set(0b01, 2.0);
        child.set(0b11, 3.0);
        let child = Solution::Dense(child);

        // forget variable 1 of the scope {1, 2}
        let mask = BagMask::new(&[2], &[1, 2]);
        let bag = descriptor(Vec::new(), Vec::new());
        assert_eq!(introduce_forget(&child, &bag, &mask, 0, 0.0), 2.0);
        assert_eq!(introduce_forget(&child, &bag, &mask, 1, 0.0), 3.0);
        // earlier chunks of the child are kept
        assert_eq!(introduce_forget(&child, &bag, &mask, 1, 4.0), 7.0);
    }

    #[test]
    fn weighted_join() {
        let mut left = DenseSolution::zeroed(&(0..2));
        left.set(1, 0.3);
        let mut right = DenseSolution::zeroed(&(0..2));
        right.set(1, 0.6);
        right.set(0, 0.7);

        let weight = LocalWeight {
            bit: 0,
            positive: 0.3,
            negative: 0.0,
        };
        let bag = descriptor(Vec::new(), vec![weight]);

        let left = Solution::Dense(left);
        let right = Solution::Dense(right);
        let joined = join(&left, &right, &bag, (1, 1), 1, 0.0);
        assert!((joined - 0.6).abs() < 1e-12);
        // a missing left weight and a zero correction both leave the output alone
        assert_eq!(join(&left, &right, &bag, (0, 0), 0, 0.0), 0.0);
        assert_eq!(join(&left, &right, &bag, (0, 0), 0, 0.5), 0.5);
    }
}
