pub mod graph;

use crate::error::{DecompositionError, ErrorKind};
use itertools::Itertools;
use log::{debug, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::ops::Index;
use treesat_cnf::{Cnf, Variable};

/// The index of a bag in the arena of a [Decomposition].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BagId(pub usize);

/// The operation that computes the table of a bag, derived from its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BagKind {
    /// No children, the bag starts from the identity table.
    Leaf,
    /// A single child whose scope differs by introduced and forgotten variables.
    IntroduceForget,
    /// Two children with the scope of the bag.
    Join,
}

/// A node of the decomposition tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bag {
    /// The id of the bag in the input. Bags created while normalizing get fresh labels.
    pub label: usize,
    /// The scope of the bag, sorted ascending and without duplicates.
    pub variables: Vec<Variable>,
    pub children: Vec<BagId>,
    pub parent: Option<BagId>,
}

impl Bag {
    /// Creates a detached bag. The scope gets sorted and deduplicated.
    pub fn new(label: usize, variables: impl IntoIterator<Item = Variable>) -> Bag {
        Bag {
            label,
            variables: variables.into_iter().sorted_unstable().dedup().collect(),
            children: Vec::new(),
            parent: None,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.variables.len()
    }

    #[inline]
    pub fn kind(&self) -> BagKind {
        match self.children.len() {
            0 => BagKind::Leaf,
            1 => BagKind::IntroduceForget,
            _ => BagKind::Join,
        }
    }

    #[inline]
    pub fn contains(&self, variable: Variable) -> bool {
        self.variables.binary_search(&variable).is_ok()
    }
}

/// A rooted tree decomposition stored as an arena of bags.
///
/// Parents exclusively own their children. Bags refer to each other by [BagId], so the
/// tree can be traversed without recursion and per-bag state can live in parallel vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    pub bags: Vec<Bag>,
    pub root: BagId,
    /// The number of variables declared by the input.
    pub num_variables: usize,
}

impl Decomposition {
    /// Creates a decomposition that only consists of its root.
    pub fn new(num_variables: usize, root_variables: impl IntoIterator<Item = Variable>) -> Self {
        Decomposition {
            bags: vec![Bag::new(1, root_variables)],
            root: BagId(0),
            num_variables,
        }
    }

    /// Creates a new bag below `parent` and returns its id. The label is the next free one.
    pub fn add_child(
        &mut self,
        parent: BagId,
        variables: impl IntoIterator<Item = Variable>,
    ) -> BagId {
        let mut bag = Bag::new(self.fresh_label(), variables);
        bag.parent = Some(parent);
        let id = self.push(bag);
        self.bags[parent.0].children.push(id);
        id
    }

    /// Builds a decomposition from the scopes of the bags labeled `1..=scopes.len()` and
    /// undirected edges between labels. The tree is rooted at the bag labeled 1.
    ///
    /// # Example
    /// ```
    /// use treesat::{BagKind, Decomposition};
    ///
    /// let decomposition =
    ///     Decomposition::from_edges(3, vec![vec![2, 1], vec![1, 3]], &[(2, 1)]).unwrap();
    ///
    /// let root = &decomposition[decomposition.root];
    /// assert_eq!(root.variables, vec![1, 2]);
    /// assert_eq!(root.kind(), BagKind::IntroduceForget);
    /// ```
    pub fn from_edges(
        num_variables: usize,
        scopes: Vec<Vec<Variable>>,
        edges: &[(usize, usize)],
    ) -> Result<Self, ErrorKind> {
        if scopes.is_empty() && edges.is_empty() {
            return Ok(Decomposition::new(num_variables, []));
        }

        let zero_based = edges
            .iter()
            .map(|&(from, to)| (from.wrapping_sub(1), to.wrapping_sub(1)))
            .collect_vec();
        let parents = graph::orient_tree(scopes.len(), &zero_based, 0)?;

        let mut bags = scopes
            .into_iter()
            .enumerate()
            .map(|(index, variables)| Bag::new(index + 1, variables))
            .collect_vec();

        for (index, parent) in parents.into_iter().enumerate() {
            if let Some(parent) = parent {
                bags[index].parent = Some(BagId(parent));
                bags[parent].children.push(BagId(index));
            }
        }

        Ok(Decomposition {
            bags,
            root: BagId(0),
            num_variables,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bags.is_empty()
    }

    /// The size of the largest bag.
    pub fn width(&self) -> usize {
        self.bags.iter().map(Bag::width).max().unwrap_or(0)
    }

    fn fresh_label(&self) -> usize {
        self.bags.iter().map(|bag| bag.label).max().unwrap_or(0) + 1
    }

    fn push(&mut self, bag: Bag) -> BagId {
        self.bags.push(bag);
        BagId(self.bags.len() - 1)
    }

    fn single_child(&self, id: BagId) -> Option<BagId> {
        match self.bags[id.0].children[..] {
            [child] => Some(child),
            _ => None,
        }
    }

    /// The bags below and including `start`, children before their parents.
    pub fn post_order_from(&self, start: BagId) -> Vec<BagId> {
        let mut order = Vec::with_capacity(self.bags.len());
        let mut stack = vec![(start, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                for &child in self.bags[id.0].children.iter().rev() {
                    stack.push((child, false));
                }
            }
        }

        order
    }

    /// All bags, children before their parents.
    pub fn post_order(&self) -> Vec<BagId> {
        self.post_order_from(self.root)
    }

    /// Variables of the formula that occur in no bag.
    pub fn uncovered_variables(&self) -> Vec<Variable> {
        self.uncovered_variables_from(self.root)
    }

    /// Variables of the formula that occur in no bag below and including `start`.
    pub fn uncovered_variables_from(&self, start: BagId) -> Vec<Variable> {
        let mut covered = vec![false; self.num_variables + 1];
        let subtree = self.post_order_from(start);
        for &variable in subtree.iter().flat_map(|&id| self.bags[id.0].variables.iter()) {
            if let Some(flag) = covered.get_mut(variable) {
                *flag = true;
            }
        }

        (1..=self.num_variables)
            .filter(|&variable| !covered[variable])
            .collect()
    }

    /// Merges every bag with its only child as long as both scopes together have at most
    /// `combine_width` variables. Fewer, wider bags mean fewer dispatches.
    pub fn contract(&mut self, combine_width: usize) {
        let mut merged = 0;
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            while let Some(child) = self.single_child(id) {
                let union = self.bags[id.0]
                    .variables
                    .iter()
                    .merge(self.bags[child.0].variables.iter())
                    .dedup()
                    .copied()
                    .collect_vec();
                if union.len() > combine_width {
                    break;
                }

                let grandchildren = std::mem::take(&mut self.bags[child.0].children);
                for &grandchild in &grandchildren {
                    self.bags[grandchild.0].parent = Some(id);
                }

                let bag = &mut self.bags[id.0];
                bag.variables = union;
                bag.children = grandchildren;
                merged += 1;
            }

            stack.extend(self.bags[id.0].children.iter().copied());
        }

        if merged > 0 {
            debug!("Contracted {merged} bags into their parents with width {combine_width}.");
            self.compact();
        }
    }

    /// Rebuilds the arena with the bags reachable from the root in pre-order.
    fn compact(&mut self) {
        let mut order = Vec::with_capacity(self.bags.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.bags[id.0].children.iter().rev());
        }

        let mut remap = vec![None; self.bags.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.0] = Some(BagId(new));
        }

        let mut old_bags = std::mem::take(&mut self.bags)
            .into_iter()
            .map(Some)
            .collect_vec();

        self.bags = order
            .iter()
            .filter_map(|old| old_bags[old.0].take())
            .map(|mut bag| {
                bag.parent = bag.parent.and_then(|parent| remap[parent.0]);
                bag.children = bag
                    .children
                    .iter()
                    .filter_map(|child| remap[child.0])
                    .collect();
                bag
            })
            .collect();
        self.root = BagId(0);
    }

    /// Brings every bag with several children into the shape the join operator expects:
    /// each child gets the scope of its parent, through an inserted adapter bag where needed,
    /// and more than two children are split into a balanced tree of join bags.
    pub fn normalize(&mut self) {
        let mut adapters = 0;
        let mut joins = 0;
        let mut next_label = self.fresh_label();

        for index in 0..self.bags.len() {
            if self.bags[index].children.len() < 2 {
                continue;
            }

            let id = BagId(index);
            let scope = self.bags[index].variables.clone();
            let children = std::mem::take(&mut self.bags[index].children);
            let mut queue = VecDeque::with_capacity(children.len());

            for child in children {
                if self.bags[child.0].variables == scope {
                    queue.push_back(child);
                    continue;
                }

                let adapter = self.push(Bag {
                    label: next_label,
                    variables: scope.clone(),
                    children: vec![child],
                    parent: Some(id),
                });
                next_label += 1;
                adapters += 1;
                self.bags[child.0].parent = Some(adapter);
                queue.push_back(adapter);
            }

            while queue.len() > 2 {
                let (Some(left), Some(right)) = (queue.pop_front(), queue.pop_front()) else {
                    break;
                };

                let join = self.push(Bag {
                    label: next_label,
                    variables: scope.clone(),
                    children: vec![left, right],
                    parent: Some(id),
                });
                next_label += 1;
                joins += 1;
                self.bags[left.0].parent = Some(join);
                self.bags[right.0].parent = Some(join);
                queue.push_back(join);
            }

            self.bags[index].children = queue.into_iter().collect();
        }

        if adapters + joins > 0 {
            debug!("Normalizing inserted {adapters} adapter bags and {joins} join bags.");
        }
    }

    /// Checks the structure of the decomposition against the formula it decomposes:
    /// every variable must be declared by the formula, no bag may have more than two children
    /// and the bags containing a variable have to form a connected subtree.
    ///
    /// Whether the clauses are covered is checked when they are assigned to their bags.
    pub fn validate(&self, formula: &Cnf) -> Result<(), ErrorKind> {
        let declared = formula.num_variables;
        if self.num_variables != declared {
            warn!(
                "The decomposition declares {} variables, the formula {}.",
                self.num_variables, declared
            );
        }

        for bag in &self.bags {
            if let Some(&variable) = bag.variables.iter().find(|&&v| v == 0 || v > declared) {
                return Err(DecompositionError::VariableOutOfRange {
                    bag: bag.label,
                    variable,
                    declared,
                }
                .into());
            }

            if bag.children.len() > 2 {
                return Err(DecompositionError::TooManyChildren {
                    bag: bag.label,
                    children: bag.children.len(),
                }
                .into());
            }
        }

        // every variable may enter the tree (seen from the root) at a single bag only
        let mut entries = vec![0_usize; declared + 1];
        for bag in &self.bags {
            for &variable in &bag.variables {
                let inherited = bag
                    .parent
                    .is_some_and(|parent| self.bags[parent.0].contains(variable));
                if !inherited {
                    entries[variable] += 1;
                    if entries[variable] > 1 {
                        return Err(DecompositionError::Disconnected { variable }.into());
                    }
                }
            }
        }

        Ok(())
    }
}

impl Index<BagId> for Decomposition {
    type Output = Bag;

    fn index(&self, id: BagId) -> &Bag {
        &self.bags[id.0]
    }
}

/// Writes the decomposition in the PACE format, bags numbered by their position in the arena.
impl Display for Decomposition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "s td {} {} {}",
            self.bags.len(),
            self.width(),
            self.num_variables
        )?;

        for (index, bag) in self.bags.iter().enumerate() {
            write!(f, "\nb {}", index + 1)?;
            bag.variables
                .iter()
                .try_for_each(|variable| write!(f, " {variable}"))?;
        }

        for (index, bag) in self.bags.iter().enumerate() {
            if let Some(parent) = bag.parent {
                write!(f, "\n{} {}", parent.0 + 1, index + 1)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // 1 {1,2}
    // ├── 2 {2,3}
    // ├── 3 {2}
    // └── 4 {1,4}
    fn star() -> Decomposition {
        Decomposition::from_edges(
            4,
            vec![vec![1, 2], vec![2, 3], vec![2], vec![4, 1]],
            &[(1, 2), (3, 1), (1, 4)],
        )
        .unwrap()
    }

    #[test]
    fn bags_are_sorted() {
        let bag = Bag::new(3, [5, 1, 5, 2]);
        assert_eq!(bag.variables, vec![1, 2, 5]);
        assert_eq!(bag.kind(), BagKind::Leaf);
        assert!(bag.contains(5));
        assert!(!bag.contains(3));
    }

    #[test]
    fn post_order_visits_children_first() {
        let mut decomposition = Decomposition::new(3, [1]);
        let left = decomposition.add_child(BagId(0), [1, 2]);
        let right = decomposition.add_child(BagId(0), [1, 3]);
        let below = decomposition.add_child(left, [2]);

        assert_eq!(
            decomposition.post_order(),
            vec![below, left, right, BagId(0)]
        );
        assert_eq!(decomposition[below].label, 4);
        assert_eq!(decomposition[BagId(0)].kind(), BagKind::Join);
    }

    #[test]
    fn normalize_star() {
        let mut decomposition = star();
        decomposition.normalize();

        let formula = Cnf {
            num_variables: 4,
            ..Default::default()
        };
        assert_eq!(decomposition.validate(&formula), Ok(()));

        // three children with foreign scopes: three adapters and one extra join
        assert_eq!(decomposition.len(), 4 + 3 + 1);
        for id in decomposition.post_order() {
            let bag = &decomposition[id];
            assert!(bag.children.len() <= 2);
            if bag.kind() == BagKind::Join {
                for &child in &bag.children {
                    assert_eq!(decomposition[child].variables, bag.variables);
                    assert_eq!(decomposition[child].parent, Some(id));
                }
            }
        }
        assert_eq!(decomposition.post_order().len(), decomposition.len());
    }

    #[test]
    fn contract_chain() {
        let mut decomposition = Decomposition::new(4, [1, 2]);
        let middle = decomposition.add_child(BagId(0), [2, 3]);
        let leaf = decomposition.add_child(middle, [3, 4]);
        decomposition.add_child(leaf, [4]);

        decomposition.contract(3);

        // {1,2} absorbs {2,3}, the union with {3,4} would exceed the width,
        // {3,4} then absorbs {4}
        assert_eq!(decomposition.len(), 2);
        assert_eq!(decomposition[decomposition.root].variables, vec![1, 2, 3]);
        let child = decomposition[decomposition.root].children[0];
        assert_eq!(decomposition[child].variables, vec![3, 4]);
        assert_eq!(decomposition[child].parent, Some(decomposition.root));
        assert_eq!(decomposition[child].kind(), BagKind::Leaf);
    }

    #[test]
    fn validation_errors() {
        let formula = Cnf {
            num_variables: 3,
            ..Default::default()
        };

        let out_of_range = Decomposition::new(3, [1, 4]);
        assert_eq!(
            out_of_range.validate(&formula),
            Err(ErrorKind::MalformedDecomposition(
                DecompositionError::VariableOutOfRange {
                    bag: 1,
                    variable: 4,
                    declared: 3
                }
            ))
        );

        // variable 1 reappears below a bag that does not contain it
        let mut disconnected = Decomposition::new(3, [1, 2]);
        let middle = disconnected.add_child(BagId(0), [2, 3]);
        disconnected.add_child(middle, [1, 3]);
        assert_eq!(
            disconnected.validate(&formula),
            Err(ErrorKind::MalformedDecomposition(
                DecompositionError::Disconnected { variable: 1 }
            ))
        );

        let mut crowded = Decomposition::new(3, [1]);
        for _ in 0..3 {
            crowded.add_child(BagId(0), [1]);
        }
        assert!(matches!(
            crowded.validate(&formula),
            Err(ErrorKind::MalformedDecomposition(
                DecompositionError::TooManyChildren { bag: 1, children: 3 }
            ))
        ));
    }

    #[test]
    fn uncovered_variables() {
        let mut decomposition = Decomposition::new(5, [2, 4]);
        assert_eq!(decomposition.uncovered_variables(), vec![1, 3, 5]);

        let child = decomposition.add_child(BagId(0), [4, 5]);
        assert_eq!(decomposition.uncovered_variables(), vec![1, 3]);
        assert_eq!(decomposition.uncovered_variables_from(child), vec![1, 2, 3]);
    }

    #[test]
    fn display_pace() {
        let decomposition =
            Decomposition::from_edges(3, vec![vec![1, 2], vec![2, 3]], &[(1, 2)]).unwrap();
        assert_eq!(decomposition.to_string(), "s td 2 2 3\nb 1 1 2\nb 2 2 3\n1 2");
    }
}
