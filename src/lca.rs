//! Lowest-common-ancestor index over one forest component.
//!
//! Built from an Euler tour with a sparse-table range minimum, giving O(1)
//! `lca` queries after an O(n log n) build. The index captures a snapshot
//! of the component: any restructuring (cut, contract, synchronization)
//! invalidates it, and callers rebuild rather than patch. Folded sibling
//! pairs are leaves here, like everywhere else in the search.

use std::collections::HashMap;

use crate::node::{Arena, NodeId};

pub struct Lca {
    euler: Vec<NodeId>,
    depth: Vec<u32>,
    first: HashMap<NodeId, usize>,
    last: HashMap<NodeId, usize>,
    /// sparse[j][i] = index of the minimum depth in euler[i .. i + 2^j]
    sparse: Vec<Vec<usize>>,
}

impl Lca {
    pub fn new(arena: &Arena, root: NodeId) -> Self {
        let mut lca = Lca {
            euler: Vec::new(),
            depth: Vec::new(),
            first: HashMap::new(),
            last: HashMap::new(),
            sparse: Vec::new(),
        };
        lca.tour(arena, root, 0);
        lca.build_sparse();
        lca
    }

    fn tour(&mut self, arena: &Arena, n: NodeId, d: u32) {
        let visit = self.euler.len();
        self.first.entry(n).or_insert(visit);
        self.euler.push(n);
        self.depth.push(d);
        for child in [arena[n].lchild, arena[n].rchild].into_iter().flatten() {
            self.tour(arena, child, d + 1);
            self.euler.push(n);
            self.depth.push(d);
        }
        self.last.insert(n, self.euler.len() - 1);
    }

    fn build_sparse(&mut self) {
        let m = self.euler.len();
        self.sparse.push((0..m).collect());
        let mut width = 1;
        while width * 2 <= m {
            let prev = self.sparse.last().unwrap();
            let mut row = Vec::with_capacity(m - width * 2 + 1);
            for i in 0..=(m - width * 2) {
                let a = prev[i];
                let b = prev[i + width];
                row.push(if self.depth[a] <= self.depth[b] { a } else { b });
            }
            self.sparse.push(row);
            width *= 2;
        }
    }

    fn argmin(&self, lo: usize, hi: usize) -> usize {
        let j = (usize::BITS - 1 - (hi - lo + 1).leading_zeros()) as usize;
        let a = self.sparse[j][lo];
        let b = self.sparse[j][hi + 1 - (1 << j)];
        if self.depth[a] <= self.depth[b] { a } else { b }
    }

    /// Lowest common ancestor of two nodes of the indexed component.
    /// Panics if either node was not part of the snapshot.
    pub fn lca(&self, u: NodeId, v: NodeId) -> NodeId {
        let fu = *self.first.get(&u).expect("node not in LCA snapshot");
        let fv = *self.first.get(&v).expect("node not in LCA snapshot");
        let (lo, hi) = if fu <= fv { (fu, fv) } else { (fv, fu) };
        self.euler[self.argmin(lo, hi)]
    }

    /// Interval ancestor test: is `a` an ancestor of (or equal to) `d`?
    pub fn is_ancestor(&self, a: NodeId, d: NodeId) -> bool {
        match (self.first.get(&a), self.first.get(&d), self.last.get(&a)) {
            (Some(&fa), Some(&fd), Some(&la)) => fa <= fd && fd <= la,
            _ => false,
        }
    }

    pub fn contains(&self, n: NodeId) -> bool {
        self.first.contains_key(&n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Label;

    /// ((0,1),(2,(3,4)))
    fn build() -> (Arena, NodeId, Vec<NodeId>) {
        let mut a = Arena::new();
        let root = a.new_node(Label::Interior);
        let left = a.new_node(Label::Interior);
        let right = a.new_node(Label::Interior);
        let lower = a.new_node(Label::Interior);
        let leaves: Vec<_> = (0..5).map(|i| a.new_node(Label::Leaf(i))).collect();
        a.add_child(root, left);
        a.add_child(root, right);
        a.add_child(left, leaves[0]);
        a.add_child(left, leaves[1]);
        a.add_child(right, leaves[2]);
        a.add_child(right, lower);
        a.add_child(lower, leaves[3]);
        a.add_child(lower, leaves[4]);
        (a, root, leaves)
    }

    fn brute_lca(arena: &Arena, u: NodeId, v: NodeId) -> NodeId {
        let mut anc = std::collections::HashSet::new();
        let mut cur = Some(u);
        while let Some(n) = cur {
            anc.insert(n);
            cur = arena[n].parent;
        }
        let mut cur = v;
        loop {
            if anc.contains(&cur) {
                return cur;
            }
            cur = arena[cur].parent.expect("no common ancestor");
        }
    }

    #[test]
    fn matches_brute_force() {
        let (arena, root, leaves) = build();
        let lca = Lca::new(&arena, root);
        for &u in &leaves {
            for &v in &leaves {
                assert_eq!(lca.lca(u, v), brute_lca(&arena, u, v), "lca({u},{v})");
            }
        }
    }

    #[test]
    fn ancestor_intervals() {
        let (arena, root, leaves) = build();
        let lca = Lca::new(&arena, root);
        let right = arena[root].rchild.unwrap();
        assert!(lca.is_ancestor(root, leaves[4]));
        assert!(lca.is_ancestor(right, leaves[3]));
        assert!(!lca.is_ancestor(right, leaves[0]));
        assert!(lca.is_ancestor(leaves[2], leaves[2]));
    }

    #[test]
    fn single_node_component() {
        let mut arena = Arena::new();
        let lone = arena.new_node(Label::Leaf(7));
        let lca = Lca::new(&arena, lone);
        assert_eq!(lca.lca(lone, lone), lone);
        assert!(lca.contains(lone));
    }
}
