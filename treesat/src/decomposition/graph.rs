use crate::error::DecompositionError;
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::Bfs;

/// Orients the undirected edges of a tree away from `root`.
///
/// Nodes are `0..nodes`, the result holds the parent of every node and `None` for the root.
/// Edge lists that do not describe a tree over all nodes are rejected.
pub fn orient_tree(
    nodes: usize,
    edges: &[(usize, usize)],
    root: usize,
) -> Result<Vec<Option<usize>>, DecompositionError> {
    let not_a_tree = DecompositionError::NotATree {
        bags: nodes,
        edges: edges.len(),
    };

    if nodes == 0 || edges.len() + 1 != nodes || root >= nodes {
        return Err(not_a_tree);
    }

    let mut graph = UnGraph::<(), ()>::with_capacity(nodes, edges.len());
    for _ in 0..nodes {
        graph.add_node(());
    }
    for &(from, to) in edges {
        if from >= nodes || to >= nodes {
            return Err(not_a_tree);
        }
        graph.add_edge(NodeIndex::new(from), NodeIndex::new(to), ());
    }

    // n - 1 edges and a single component leave no room for cycles
    if connected_components(&graph) != 1 {
        return Err(not_a_tree);
    }

    let mut parents = vec![None; nodes];
    let mut bfs = Bfs::new(&graph, NodeIndex::new(root));
    while let Some(nx) = bfs.next(&graph) {
        for neighbour in graph.neighbors(nx) {
            if parents[nx.index()] != Some(neighbour.index()) {
                parents[neighbour.index()] = Some(nx.index());
            }
        }
    }

    Ok(parents)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn orient_path_and_star() {
        // 0 - 1 - 2, rooted at the middle
        assert_eq!(
            orient_tree(3, &[(0, 1), (2, 1)], 1),
            Ok(vec![Some(1), None, Some(1)])
        );

        // 0 is the hub of a star
        assert_eq!(
            orient_tree(4, &[(3, 0), (0, 1), (2, 0)], 0),
            Ok(vec![None, Some(0), Some(0), Some(0)])
        );

        assert_eq!(orient_tree(1, &[], 0), Ok(vec![None]));
    }

    #[test]
    fn reject_non_trees() {
        // a cycle plus an isolated node has the right number of edges
        assert!(orient_tree(4, &[(0, 1), (1, 2), (2, 0)], 0).is_err());
        // too many edges
        assert!(orient_tree(2, &[(0, 1), (1, 0)], 0).is_err());
        // a forest
        assert!(orient_tree(3, &[(0, 1)], 0).is_err());
        assert!(orient_tree(0, &[], 0).is_err());
        assert!(orient_tree(2, &[(0, 5)], 0).is_err());
    }
}
