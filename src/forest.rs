//! Forests: ordered component lists over the shared node arena.
//!
//! A `Forest` owns nothing; it is a list of root handles plus the rho flag.
//! Component 0 is distinguished as the still-connected "main" part of the
//! tree and takes part in the rho bookkeeping: when the main components of
//! the two forests stop corresponding, a synthetic rho leaf is appended to
//! both sides to stand for the material pruned from above the root.

use std::collections::VecDeque;

use crate::node::{Arena, Label, NodeId};

#[derive(Clone, Debug, Default)]
pub struct Forest {
    pub components: Vec<NodeId>,
    pub rho: bool,
}

impl Forest {
    pub fn new(components: Vec<NodeId>) -> Self {
        Forest {
            components,
            rho: false,
        }
    }

    pub fn component(&self, i: usize) -> NodeId {
        self.components[i]
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn contains_rho(&self) -> bool {
        self.rho
    }

    pub fn contains_root(&self, n: NodeId) -> bool {
        self.components.contains(&n)
    }

    /// Lone-leaf components, in component order. The caller decides what to
    /// do about component 0 (the approximation skips it, the exact search
    /// turns it into a rho charge).
    pub fn find_singletons(&self, arena: &Arena) -> Vec<NodeId> {
        self.components
            .iter()
            .copied()
            .filter(|&c| arena.is_leaf(c))
            .collect()
    }

    /// All sibling pairs of the forest as a flat deque: each pair occupies
    /// two consecutive slots `[left, right]`, and consumers pop from the
    /// back, taking the right child first.
    pub fn find_sibling_pairs(&self, arena: &Arena) -> VecDeque<NodeId> {
        let mut pairs = VecDeque::new();
        for &c in &self.components {
            collect_sibling_pairs(arena, c, &mut pairs);
        }
        pairs
    }

    /// Drop every component handle. Used when a forest's components have
    /// been handed over to another forest.
    pub fn erase_components(&mut self) {
        self.components.clear();
    }

    /// Clear the twin links of interior nodes, leaving leaf (and folded
    /// pair) twins intact. Interior twins are a by-product of cluster
    /// detection and must not leak into the following search steps.
    pub fn unsync_interior(&self, arena: &mut Arena) {
        for &c in &self.components {
            let mut stack = vec![c];
            while let Some(n) = stack.pop() {
                if !arena.is_leaf(n) {
                    arena[n].twin = None;
                }
                if let Some(l) = arena[n].lchild {
                    stack.push(l);
                }
                if let Some(r) = arena[n].rchild {
                    stack.push(r);
                }
            }
        }
    }

    /// True if the first components of the two forests are twins of each
    /// other, i.e. the main parts still correspond.
    pub fn main_components_agree(arena: &Arena, f1: &Forest, f2: &Forest) -> bool {
        !f1.components.is_empty()
            && !f2.components.is_empty()
            && arena[f1.component(0)].twin == Some(f2.component(0))
    }
}

fn collect_sibling_pairs(arena: &Arena, n: NodeId, pairs: &mut VecDeque<NodeId>) {
    if let Some(l) = arena[n].lchild {
        collect_sibling_pairs(arena, l, pairs);
    }
    if let Some(r) = arena[n].rchild {
        collect_sibling_pairs(arena, r, pairs);
    }
    if arena.is_sibling_pair(n) {
        pairs.push_back(arena[n].lchild.unwrap());
        pairs.push_back(arena[n].rchild.unwrap());
    }
}

/// Append a rho placeholder component unless one is already present.
/// Returns whether a component was added.
pub fn add_rho_raw(arena: &mut Arena, forest: &mut Forest) -> bool {
    if forest.rho {
        return false;
    }
    let r = arena.new_node(Label::Rho);
    forest.components.push(r);
    forest.rho = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caterpillar() -> (Arena, Forest) {
        // (0,(1,(2,3)))
        let mut a = Arena::new();
        let root = a.new_node(Label::Interior);
        let n1 = a.new_node(Label::Interior);
        let n2 = a.new_node(Label::Interior);
        let leaves: Vec<_> = (0..4).map(|i| a.new_node(Label::Leaf(i))).collect();
        a.add_child(root, leaves[0]);
        a.add_child(root, n1);
        a.add_child(n1, leaves[1]);
        a.add_child(n1, n2);
        a.add_child(n2, leaves[2]);
        a.add_child(n2, leaves[3]);
        (a, Forest::new(vec![root]))
    }

    #[test]
    fn sibling_pairs_found() {
        let (a, f) = caterpillar();
        let pairs = f.find_sibling_pairs(&a);
        // exactly one pair: (2,3)
        assert_eq!(pairs.len(), 2);
        assert_eq!(a[pairs[0]].label, Label::Leaf(2));
        assert_eq!(a[pairs[1]].label, Label::Leaf(3));
    }

    #[test]
    fn singletons_are_leaf_components() {
        let (mut a, mut f) = caterpillar();
        let lone = a.new_node(Label::Leaf(9));
        f.components.push(lone);
        let singles = f.find_singletons(&a);
        assert_eq!(singles, vec![lone]);
    }

    #[test]
    fn rho_is_idempotent() {
        let (mut a, mut f) = caterpillar();
        assert!(add_rho_raw(&mut a, &mut f));
        assert!(!add_rho_raw(&mut a, &mut f));
        assert_eq!(f.num_components(), 2);
        assert!(f.contains_rho());
    }
}
