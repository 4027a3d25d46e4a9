//! Reversible edit log for in-place search.
//!
//! The branch-and-bound search explores one alternative destructively, then
//! rolls the forests back to the pre-branch checkpoint before trying the
//! next one. Every mutating primitive in this module records an [`Op`] that
//! carries exactly the data needed to invert itself; `undo_to(checkpoint)`
//! pops and inverts until the log shrinks back to the checkpoint, after
//! which the arena, both forests and the sibling-pair list are exactly as
//! they were. This replaces copy-on-branch: O(1) amortized per edit instead
//! of a deep forest copy per branch.
//!
//! Singleton work-lists are deliberately not tracked; the search clears
//! them at the points where their content becomes stale.

use std::collections::VecDeque;

use crate::forest::Forest;
use crate::node::{Arena, Label, NodeId, Slot};

/// Which of the two active forests an op touched. Ops are always undone
/// against the same (f1, f2) pair they were recorded against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    T1,
    T2,
}

/// One reversible edit record.
#[derive(Clone, Debug)]
pub enum Op {
    /// An edge `parent -> child` was cut.
    CutParent {
        child: NodeId,
        parent: NodeId,
        slot: Slot,
    },
    /// A degree-one node was spliced out, its child taking its slot.
    SpliceContract {
        node: NodeId,
        parent: NodeId,
        node_slot: Slot,
        child: NodeId,
        child_slot: Slot,
    },
    /// A degree-one root was replaced by its child in the component list.
    RootPromote {
        node: NodeId,
        child: NodeId,
        child_slot: Slot,
        side: Side,
        comp_idx: usize,
    },
    /// A component was appended to a forest.
    AddComponent { side: Side },
    /// A rho placeholder component was appended.
    AddRho { side: Side },
    /// A twin link was overwritten.
    SetTwin { node: NodeId, old: Option<NodeId> },
    /// A sibling pair was folded into its parent.
    FoldPair { node: NodeId },
    /// Two entries were pushed onto the back of the sibling-pair list.
    PushedPair,
    /// Two entries were pushed onto the front of the sibling-pair list.
    PushedPairFront,
    /// A pair `(a, c)` was popped from the back of the sibling-pair list.
    PoppedPair { a: NodeId, c: NodeId },
}

#[derive(Clone, Debug, Default)]
pub struct UndoMachine {
    ops: Vec<Op>,
}

impl UndoMachine {
    pub fn new() -> Self {
        UndoMachine { ops: Vec::new() }
    }

    pub fn add(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn num_events(&self) -> usize {
        self.ops.len()
    }

    /// Current log position, to roll back to later.
    pub fn checkpoint(&self) -> usize {
        self.ops.len()
    }

    /// Pop and invert ops until the log length equals `checkpoint`.
    pub fn undo_to(
        &mut self,
        checkpoint: usize,
        arena: &mut Arena,
        f1: &mut Forest,
        f2: &mut Forest,
        pairs: &mut VecDeque<NodeId>,
    ) {
        while self.ops.len() > checkpoint {
            let op = self.ops.pop().expect("undo stack underflow");
            invert(op, arena, f1, f2, pairs);
        }
    }

    pub fn undo_all(
        &mut self,
        arena: &mut Arena,
        f1: &mut Forest,
        f2: &mut Forest,
        pairs: &mut VecDeque<NodeId>,
    ) {
        self.undo_to(0, arena, f1, f2, pairs);
    }
}

fn side_mut<'a>(side: Side, f1: &'a mut Forest, f2: &'a mut Forest) -> &'a mut Forest {
    match side {
        Side::T1 => f1,
        Side::T2 => f2,
    }
}

fn invert(
    op: Op,
    arena: &mut Arena,
    f1: &mut Forest,
    f2: &mut Forest,
    pairs: &mut VecDeque<NodeId>,
) {
    match op {
        Op::CutParent {
            child,
            parent,
            slot,
        } => {
            arena.set_child(parent, slot, Some(child));
            arena[child].parent = Some(parent);
        }
        Op::SpliceContract {
            node,
            parent,
            node_slot,
            child,
            child_slot,
        } => {
            arena.set_child(parent, node_slot, Some(node));
            arena[node].parent = Some(parent);
            arena.set_child(node, child_slot, Some(child));
            arena[child].parent = Some(node);
        }
        Op::RootPromote {
            node,
            child,
            child_slot,
            side,
            comp_idx,
        } => {
            let forest = side_mut(side, f1, f2);
            forest.components[comp_idx] = node;
            arena.set_child(node, child_slot, Some(child));
            arena[child].parent = Some(node);
        }
        Op::AddComponent { side } => {
            side_mut(side, f1, f2).components.pop();
        }
        Op::AddRho { side } => {
            let forest = side_mut(side, f1, f2);
            let rho = forest.components.pop().expect("rho component missing");
            forest.rho = false;
            // the rho leaf is always the most recent allocation
            debug_assert_eq!(rho, arena.len() - 1);
            arena.pop_node();
        }
        Op::SetTwin { node, old } => {
            arena[node].twin = old;
        }
        Op::FoldPair { node } => {
            let (l, r) = arena[node].folded.take().expect("fold record missing");
            arena[node].lchild = Some(l);
            arena[node].rchild = Some(r);
            arena[l].parent = Some(node);
            arena[r].parent = Some(node);
        }
        Op::PushedPair => {
            pairs.pop_back();
            pairs.pop_back();
        }
        Op::PushedPairFront => {
            pairs.pop_front();
            pairs.pop_front();
        }
        Op::PoppedPair { a, c } => {
            pairs.push_back(c);
            pairs.push_back(a);
        }
    }
}

// Logged edit primitives. Each records its inverse before (or while)
// mutating. Construction and teardown paths that never roll back use the
// raw `Arena`/`Forest` operations instead, or discard a scratch machine.

/// Detach `n` from its parent, making it the root of a standalone subtree.
/// No-op on roots.
pub fn cut_parent(arena: &mut Arena, n: NodeId, um: &mut UndoMachine) {
    if let Some((parent, slot)) = arena.detach(n) {
        um.add(Op::CutParent {
            child: n,
            parent,
            slot,
        });
    }
}

/// Contract `n` out of its tree if it has at most one child.
///
/// - degree one with a parent: the child is spliced into `n`'s slot;
///   returns the parent, whose shape may have changed.
/// - degree one root: the child is promoted into `n`'s component slot;
///   returns `None`.
/// - childless with a parent: `n` is removed and the contraction cascades
///   to the parent.
///
/// `forest` must be the forest containing `n`'s component.
pub fn contract(
    arena: &mut Arena,
    forest: &mut Forest,
    side: Side,
    n: NodeId,
    um: &mut UndoMachine,
) -> Option<NodeId> {
    if arena.num_children(n) == 2 {
        return None;
    }
    match (arena[n].parent, arena.only_child(n)) {
        (Some(parent), Some((child, child_slot))) => {
            let node_slot = arena.slot_of(parent, n);
            um.add(Op::SpliceContract {
                node: n,
                parent,
                node_slot,
                child,
                child_slot,
            });
            arena.set_child(parent, node_slot, Some(child));
            arena[child].parent = Some(parent);
            arena[n].parent = None;
            arena.set_child(n, child_slot, None);
            Some(parent)
        }
        (None, Some((child, child_slot))) => {
            let comp_idx = forest
                .components
                .iter()
                .position(|&c| c == n)
                .expect("contracting a root that is not a component");
            um.add(Op::RootPromote {
                node: n,
                child,
                child_slot,
                side,
                comp_idx,
            });
            forest.components[comp_idx] = child;
            arena[child].parent = None;
            arena.set_child(n, child_slot, None);
            None
        }
        (Some(parent), None) => {
            cut_parent(arena, n, um);
            contract(arena, forest, side, parent, um)
        }
        (None, None) => None,
    }
}

/// Fold a resolved sibling pair: both children leave the active child
/// slots but stay reachable through `folded` for serialization.
pub fn contract_sibling_pair(arena: &mut Arena, n: NodeId, um: &mut UndoMachine) {
    let l = arena[n].lchild.expect("folding a node without children");
    let r = arena[n].rchild.expect("folding a node without children");
    debug_assert!(arena[n].folded.is_none());
    um.add(Op::FoldPair { node: n });
    arena[n].folded = Some((l, r));
    arena[n].lchild = None;
    arena[n].rchild = None;
}

pub fn set_twin(arena: &mut Arena, n: NodeId, twin: Option<NodeId>, um: &mut UndoMachine) {
    um.add(Op::SetTwin {
        node: n,
        old: arena[n].twin,
    });
    arena[n].twin = twin;
}

pub fn add_component(forest: &mut Forest, side: Side, n: NodeId, um: &mut UndoMachine) {
    um.add(Op::AddComponent { side });
    forest.components.push(n);
}

/// Append the rho placeholder, once. Returns false (and records nothing)
/// if the forest already carries it.
pub fn add_rho(
    arena: &mut Arena,
    forest: &mut Forest,
    side: Side,
    um: &mut UndoMachine,
) -> bool {
    if forest.rho {
        return false;
    }
    um.add(Op::AddRho { side });
    let r = arena.new_node(Label::Rho);
    forest.components.push(r);
    forest.rho = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Label;

    fn pair_tree(arena: &mut Arena) -> NodeId {
        // ((0,1),2)
        let root = arena.new_node(Label::Interior);
        let inner = arena.new_node(Label::Interior);
        let l0 = arena.new_node(Label::Leaf(0));
        let l1 = arena.new_node(Label::Leaf(1));
        let l2 = arena.new_node(Label::Leaf(2));
        arena.add_child(root, inner);
        arena.add_child(root, l2);
        arena.add_child(inner, l0);
        arena.add_child(inner, l1);
        root
    }

    fn shape(arena: &Arena, n: NodeId) -> String {
        match (arena[n].lchild, arena[n].rchild, arena[n].folded) {
            (Some(l), Some(r), _) => format!("({},{})", shape(arena, l), shape(arena, r)),
            (None, None, Some((a, b))) => {
                format!("[{},{}]", shape(arena, a), shape(arena, b))
            }
            (None, None, None) => match arena[n].label {
                Label::Leaf(id) => id.to_string(),
                Label::Rho => "p".to_string(),
                Label::Interior => "?".to_string(),
            },
            _ => "!".to_string(),
        }
    }

    fn forest_shape(arena: &Arena, f: &Forest) -> String {
        f.components
            .iter()
            .map(|&c| shape(arena, c))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn cut_and_contract_round_trip() {
        let mut arena = Arena::new();
        let root = pair_tree(&mut arena);
        let mut f1 = Forest::new(vec![root]);
        let mut f2 = Forest::new(vec![]);
        let mut pairs = VecDeque::new();
        let mut um = UndoMachine::new();

        let before = forest_shape(&arena, &f1);
        let inner = arena[root].lchild.unwrap();
        let l0 = arena[inner].lchild.unwrap();

        cut_parent(&mut arena, l0, &mut um);
        add_component(&mut f1, Side::T1, l0, &mut um);
        contract(&mut arena, &mut f1, Side::T1, inner, &mut um);
        assert_eq!(forest_shape(&arena, &f1), "(1,2) 0");

        um.undo_all(&mut arena, &mut f1, &mut f2, &mut pairs);
        assert_eq!(forest_shape(&arena, &f1), before);
    }

    #[test]
    fn root_promotion_round_trip() {
        let mut arena = Arena::new();
        let root = pair_tree(&mut arena);
        let mut f1 = Forest::new(vec![root]);
        let mut f2 = Forest::new(vec![]);
        let mut pairs = VecDeque::new();
        let mut um = UndoMachine::new();

        let before = forest_shape(&arena, &f1);
        let l2 = arena[root].rchild.unwrap();
        cut_parent(&mut arena, l2, &mut um);
        add_component(&mut f1, Side::T1, l2, &mut um);
        // root now has a single child; contracting promotes it
        assert_eq!(contract(&mut arena, &mut f1, Side::T1, root, &mut um), None);
        assert_eq!(forest_shape(&arena, &f1), "(0,1) 2");

        um.undo_all(&mut arena, &mut f1, &mut f2, &mut pairs);
        assert_eq!(forest_shape(&arena, &f1), before);
    }

    #[test]
    fn fold_and_rho_round_trip() {
        let mut arena = Arena::new();
        let root = pair_tree(&mut arena);
        let mut f1 = Forest::new(vec![root]);
        let mut f2 = Forest::new(vec![]);
        let mut pairs = VecDeque::new();
        let mut um = UndoMachine::new();

        let before = forest_shape(&arena, &f1);
        let nodes_before = arena.len();
        let inner = arena[root].lchild.unwrap();

        contract_sibling_pair(&mut arena, inner, &mut um);
        assert!(arena.is_leaf(inner));
        assert_eq!(forest_shape(&arena, &f1), "([0,1],2)");

        assert!(add_rho(&mut arena, &mut f1, Side::T1, &mut um));
        assert!(!add_rho(&mut arena, &mut f1, Side::T1, &mut um));
        assert!(f1.contains_rho());

        um.undo_all(&mut arena, &mut f1, &mut f2, &mut pairs);
        assert_eq!(forest_shape(&arena, &f1), before);
        assert!(!f1.contains_rho());
        assert_eq!(arena.len(), nodes_before);
    }

    #[test]
    fn checkpoint_rewinds_partially() {
        let mut arena = Arena::new();
        let root = pair_tree(&mut arena);
        let mut f1 = Forest::new(vec![root]);
        let mut f2 = Forest::new(vec![]);
        let mut pairs = VecDeque::new();
        let mut um = UndoMachine::new();

        let inner = arena[root].lchild.unwrap();
        let l0 = arena[inner].lchild.unwrap();
        let l1 = arena[inner].rchild.unwrap();

        cut_parent(&mut arena, l0, &mut um);
        add_component(&mut f1, Side::T1, l0, &mut um);
        let mid = um.checkpoint();
        let mid_shape = forest_shape(&arena, &f1);

        cut_parent(&mut arena, l1, &mut um);
        add_component(&mut f1, Side::T1, l1, &mut um);
        um.undo_to(mid, &mut arena, &mut f1, &mut f2, &mut pairs);

        assert_eq!(forest_shape(&arena, &f1), mid_shape);
        assert_eq!(um.num_events(), mid);
    }

    #[test]
    fn pair_list_ops_round_trip() {
        let mut arena = Arena::new();
        let root = pair_tree(&mut arena);
        let mut f1 = Forest::new(vec![root]);
        let mut f2 = Forest::new(vec![]);
        let mut um = UndoMachine::new();

        let inner = arena[root].lchild.unwrap();
        let l0 = arena[inner].lchild.unwrap();
        let l1 = arena[inner].rchild.unwrap();
        let mut pairs: VecDeque<NodeId> = VecDeque::from(vec![l0, l1]);

        let a = pairs.pop_back().unwrap();
        let c = pairs.pop_back().unwrap();
        um.add(Op::PoppedPair { a, c });
        assert!(pairs.is_empty());

        um.add(Op::PushedPair);
        pairs.push_back(l0);
        pairs.push_back(l1);

        um.undo_all(&mut arena, &mut f1, &mut f2, &mut pairs);
        assert_eq!(pairs, VecDeque::from(vec![l0, l1]));
    }
}
