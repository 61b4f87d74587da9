use std::mem::size_of;

/// A node of the trie.
///
/// Inner nodes pack the indices of their two children into the lower and upper half, leaves
/// hold the bits of their weight. Index 0 is the root and never a child, so it marks a missing
/// child. The depth tells both kinds apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TreeNode(u64);

impl TreeNode {
    #[inline]
    fn child(self, bit: u64) -> usize {
        ((self.0 >> (32 * bit)) & 0xFFFF_FFFF) as usize
    }

    #[inline]
    fn with_child(self, bit: u64, index: usize) -> Self {
        let shift = 32 * bit;
        TreeNode((self.0 & !(0xFFFF_FFFF << shift)) | ((index as u64) << shift))
    }

    #[inline]
    fn leaf(weight: f64) -> Self {
        TreeNode(weight.to_bits())
    }

    #[inline]
    fn weight(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// A binary trie keyed by the bits of an assignment id, most significant bit first.
///
/// Only assignments with a non-zero weight get a path, so the memory grows with the number of
/// satisfying assignments instead of the size of the scope's assignment space.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseSolution {
    width: u32,
    nodes: Vec<TreeNode>,
}

impl SparseSolution {
    /// Creates an empty trie for assignments of `width` variables.
    pub fn new(width: usize) -> Self {
        SparseSolution {
            width: width as u32,
            nodes: vec![TreeNode::default()],
        }
    }

    /// The bytes a trie holding every id of an aligned range of `len` ids occupies at most.
    ///
    /// The range needs a complete subtree of `2·len − 1` nodes plus the path from the root down
    /// to that subtree.
    pub fn bytes_for(width: usize, len: u64) -> u128 {
        let len = len.max(1).next_power_of_two();
        let path = (width as u128).saturating_sub(len.trailing_zeros() as u128);
        (path + 2 * len as u128 - 1) * size_of::<TreeNode>() as u128
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn get(&self, id: u64) -> f64 {
        let mut index = 0;
        for level in (0..self.width).rev() {
            index = self.nodes[index].child((id >> level) & 1);
            if index == 0 {
                return 0.0;
            }
        }
        self.nodes[index].weight()
    }

    /// Returns the index of the leaf of an id, creating its path if necessary.
    fn entry(&mut self, id: u64) -> usize {
        debug_assert!(self.width == 64 || id >> self.width == 0);

        let mut index = 0;
        for level in (0..self.width).rev() {
            let bit = (id >> level) & 1;
            let mut next = self.nodes[index].child(bit);
            if next == 0 {
                next = self.nodes.len();
                debug_assert!(next <= u32::MAX as usize);
                self.nodes.push(TreeNode::default());
                self.nodes[index] = self.nodes[index].with_child(bit, next);
            }
            index = next;
        }
        index
    }

    pub fn set(&mut self, id: u64, weight: f64) {
        if weight == 0.0 && self.get(id) == 0.0 {
            return;
        }
        let leaf = self.entry(id);
        self.nodes[leaf] = TreeNode::leaf(weight);
    }

    pub fn add(&mut self, id: u64, weight: f64) {
        if weight == 0.0 {
            return;
        }
        let leaf = self.entry(id);
        self.nodes[leaf] = TreeNode::leaf(self.nodes[leaf].weight() + weight);
    }

    /// All ids with a non-zero weight, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        let mut stack = vec![(0_usize, 0_u32, 0_u64)];

        std::iter::from_fn(move || {
            while let Some((index, depth, prefix)) = stack.pop() {
                let node = self.nodes[index];
                if depth == self.width {
                    let weight = node.weight();
                    if weight != 0.0 {
                        return Some((prefix, weight));
                    }
                    continue;
                }

                // the 0 branch is popped first
                for bit in [1, 0] {
                    let child = node.child(bit);
                    if child != 0 {
                        stack.push((child, depth + 1, (prefix << 1) | bit));
                    }
                }
            }
            None
        })
    }

    /// The number of stored assignments.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn size_bytes(&self) -> usize {
        self.nodes.len() * size_of::<TreeNode>()
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_packing() {
        let node = TreeNode::default().with_child(1, 7).with_child(0, 3);
        assert_eq!(node.child(0), 3);
        assert_eq!(node.child(1), 7);
        assert_eq!(node.with_child(1, 9).child(0), 3);
        assert_eq!(TreeNode::leaf(2.5).weight(), 2.5);
        assert_eq!(TreeNode::default().weight(), 0.0);
    }

    #[test]
    fn insert_and_iterate() {
        let mut solution = SparseSolution::new(3);
        assert!(solution.is_empty());

        solution.set(6, 1.0);
        solution.add(1, 2.0);
        solution.add(6, 0.5);
        // zero weights do not create paths
        solution.add(3, 0.0);
        solution.set(4, 0.0);

        assert_eq!(solution.get(6), 1.5);
        assert_eq!(solution.get(1), 2.0);
        assert_eq!(solution.get(3), 0.0);
        assert_eq!(solution.get(7), 0.0);
        assert_eq!(solution.len(), 2);
        assert_eq!(
            solution.iter().collect::<Vec<_>>(),
            vec![(1, 2.0), (6, 1.5)]
        );
        // the root, two disjoint paths of three nodes each
        assert_eq!(solution.size_bytes(), 7 * 8);
    }

    #[test]
    fn empty_scope() {
        let mut solution = SparseSolution::new(0);
        assert_eq!(solution.get(0), 0.0);
        solution.add(0, 1.0);
        assert_eq!(solution.get(0), 1.0);
        assert_eq!(solution.iter().collect::<Vec<_>>(), vec![(0, 1.0)]);
        assert_eq!(solution.size_bytes(), 8);
    }

    #[test]
    fn worst_case_is_an_upper_bound() {
        assert_eq!(SparseSolution::bytes_for(0, 1), 8);
        assert_eq!(SparseSolution::bytes_for(3, 1), 4 * 8);
        assert_eq!(SparseSolution::bytes_for(3, 2), 5 * 8);
        assert_eq!(SparseSolution::bytes_for(3, 8), 15 * 8);

        for width in 0..6_usize {
            let ids = 1_u64 << width;
            for bits in 0..=width {
                let len = 1_u64 << bits;
                // fill the last aligned range completely
                let mut solution = SparseSolution::new(width);
                for id in ids - len..ids {
                    solution.set(id, 1.0);
                }
                assert_eq!(
                    solution.size_bytes() as u128,
                    SparseSolution::bytes_for(width, len)
                );
            }
        }
    }
}
