//! Shortest-path tree over the module import graph
//!
//! The import graph may contain cycles (forward references). The tree keeps
//! one parent per module: the first one discovered, replaced whenever a
//! strictly shorter path from the root shows up. An import of a module that
//! already hangs below the importer is skipped, so the earlier path wins.

use ahash::RandomState;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A vertex of a directed graph that can be mapped into a [`TopologyTree`].
pub trait GraphNode: Clone {
    type Id: Hash + Eq + Clone;

    fn node_id(&self) -> Self::Id;

    /// Outgoing edges, in declaration order
    fn imports(&self) -> Vec<Self>;
}

struct TreeNode<N> {
    value: N,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Arena-backed tree rooted at the application module.
pub struct TopologyTree<N: GraphNode> {
    nodes: Vec<TreeNode<N>>,
    links: HashMap<N::Id, usize, RandomState>,
}

impl<N: GraphNode> TopologyTree<N> {
    /// Build the tree reachable from `root`
    pub fn new(root: N) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            links: HashMap::with_hasher(RandomState::new()),
        };
        let root = tree.push(root, None);
        tree.traverse_and_map(root, 1);
        tree
    }

    fn push(&mut self, value: N, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.links.insert(value.node_id(), index);
        self.nodes.push(TreeNode {
            value,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        index
    }

    fn traverse_and_map(&mut self, current: usize, depth: usize) {
        for child in self.nodes[current].value.imports() {
            let Some(existing) = self.links.get(&child.node_id()).copied() else {
                let node = self.push(child, Some(current));
                self.traverse_and_map(node, depth + 1);
                continue;
            };

            if self.has_cycle_with(existing, current) {
                continue;
            }
            // A child of `current` sits at `depth + 1`.
            if self.depth_at(existing).is_some_and(|known| known > depth + 1) {
                self.relink(existing, current);
            }
        }
    }

    /// Whether `target` is `node` itself or one of its ancestors.
    ///
    /// Returns `false` instead of looping when the parent chain is corrupted.
    fn has_cycle_with(&self, node: usize, target: usize) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(node);
        while let Some(index) = current {
            if index == target {
                return true;
            }
            if !visited.insert(index) {
                return false;
            }
            current = self.nodes[index].parent;
        }
        false
    }

    fn relink(&mut self, node: usize, parent: usize) {
        if let Some(previous) = self.nodes[node].parent {
            self.nodes[previous].children.retain(|child| *child != node);
        }
        self.nodes[node].parent = Some(parent);
        self.nodes[parent].children.push(node);
    }

    /// Depth of a node with the root at 1, `None` if the parent chain loops.
    fn depth_at(&self, node: usize) -> Option<usize> {
        let mut visited = HashSet::new();
        let mut depth = 0;
        let mut current = Some(node);
        while let Some(index) = current {
            if !visited.insert(index) {
                return None;
            }
            depth += 1;
            current = self.nodes[index].parent;
        }
        Some(depth)
    }

    /// Depth of the node for `id`; `None` when unknown or on a looping chain
    pub fn depth(&self, id: &N::Id) -> Option<usize> {
        self.links.get(id).and_then(|index| self.depth_at(*index))
    }

    /// Parent of the node for `id`
    pub fn parent(&self, id: &N::Id) -> Option<&N> {
        let index = self.links.get(id)?;
        self.nodes[*index].parent.map(|parent| &self.nodes[parent].value)
    }

    /// Pre-order traversal; the root is visited at depth 1
    pub fn walk(&self, mut visit: impl FnMut(&N, usize)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut visited = HashSet::new();
        let mut stack = vec![(0_usize, 1_usize)];
        while let Some((index, depth)) = stack.pop() {
            if !visited.insert(index) {
                continue;
            }
            let node = &self.nodes[index];
            visit(&node.value, depth);
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
    }

    /// Number of distinct nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<N: GraphNode> std::fmt::Debug for TopologyTree<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyTree")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone)]
    struct Node {
        name: &'static str,
        graph: Arc<HashMap<&'static str, Vec<&'static str>>>,
    }

    impl GraphNode for Node {
        type Id = &'static str;

        fn node_id(&self) -> Self::Id {
            self.name
        }

        fn imports(&self) -> Vec<Self> {
            self.graph
                .get(self.name)
                .into_iter()
                .flatten()
                .map(|name| Node {
                    name: *name,
                    graph: Arc::clone(&self.graph),
                })
                .collect()
        }
    }

    fn tree(edges: &[(&'static str, &[&'static str])]) -> TopologyTree<Node> {
        let graph: HashMap<_, _> = edges
            .iter()
            .map(|(name, imports)| (*name, imports.to_vec()))
            .collect();
        TopologyTree::new(Node {
            name: edges[0].0,
            graph: Arc::new(graph),
        })
    }

    fn walked(tree: &TopologyTree<Node>) -> Vec<(&'static str, usize)> {
        let mut out = Vec::new();
        tree.walk(|node, depth| out.push((node.name, depth)));
        out
    }

    #[test]
    fn test_walk_is_preorder_from_depth_one() {
        let tree = tree(&[("App", &["Users", "Cats"]), ("Users", &["Db"]), ("Cats", &[])]);
        assert_eq!(
            walked(&tree),
            vec![("App", 1), ("Users", 2), ("Db", 3), ("Cats", 2)]
        );
    }

    #[test]
    fn test_mutual_imports_terminate() {
        let tree = tree(&[("App", &["A"]), ("A", &["B"]), ("B", &["A"])]);

        assert_eq!(walked(&tree), vec![("App", 1), ("A", 2), ("B", 3)]);
        assert_eq!(tree.depth(&"A"), Some(2));
        assert_eq!(tree.depth(&"B"), Some(3));
        assert_eq!(tree.parent(&"A").map(|node| node.name), Some("App"));
    }

    #[test]
    fn test_self_import_is_skipped() {
        let tree = tree(&[("App", &["App", "A"]), ("A", &["A"])]);
        assert_eq!(walked(&tree), vec![("App", 1), ("A", 2)]);
    }

    #[test]
    fn test_shorter_path_relinks() {
        // Db is first discovered below Users -> Repo, then imported by Cats.
        let tree = tree(&[
            ("App", &["Users", "Cats"]),
            ("Users", &["Repo"]),
            ("Repo", &["Db"]),
            ("Cats", &["Db"]),
            ("Db", &[]),
        ]);

        assert_eq!(tree.depth(&"Db"), Some(3));
        assert_eq!(tree.parent(&"Db").map(|node| node.name), Some("Cats"));
        assert_eq!(
            walked(&tree),
            vec![("App", 1), ("Users", 2), ("Repo", 3), ("Cats", 2), ("Db", 3)]
        );
    }

    #[test]
    fn test_import_of_own_descendant_keeps_earlier_path() {
        let tree = tree(&[("App", &["A"]), ("A", &["B", "C"]), ("B", &["C"]), ("C", &[])]);

        assert_eq!(tree.depth(&"C"), Some(4));
        assert_eq!(tree.parent(&"C").map(|node| node.name), Some("B"));
        assert_eq!(walked(&tree), vec![("App", 1), ("A", 2), ("B", 3), ("C", 4)]);
    }

    #[test]
    fn test_longer_path_keeps_first_parent() {
        let tree = tree(&[
            ("App", &["Db", "Users"]),
            ("Users", &["Db"]),
            ("Db", &[]),
        ]);
        assert_eq!(tree.parent(&"Db").map(|node| node.name), Some("App"));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_corrupted_parent_chain_reports_sentinel() {
        let mut tree = tree(&[("App", &["A"]), ("A", &["B"]), ("B", &[])]);
        let a = tree.links[&"A"];
        let b = tree.links[&"B"];
        tree.nodes[a].parent = Some(b);

        assert_eq!(tree.depth(&"B"), None);
        assert!(!tree.has_cycle_with(b, 0));
        assert_eq!(tree.depth(&"missing"), None);
    }
}
