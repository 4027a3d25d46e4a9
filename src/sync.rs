//! Cross-tree twin synchronization.
//!
//! `sync_twins` pairs the leaves of the two forests by leaf id, deleting
//! leaves unique to one side. `sync_interior_twins` pushes correspondence
//! up from the leaves of two whole trees via LCA queries. The forest-aware
//! variant `sync_interior_twins_real` handles the mid-search situation
//! where one side is fragmented into many components: each component is
//! numbered and synced against T1, and a bottom-up pass over T1 maintains
//! per-node lists of "active descendants" (twins of the leaves below),
//! merging adjacent entries from the same component into their LCA and
//! dropping components that finish inside the subtree. A T1 node whose
//! list converges to a single entry gains that entry as its twin. The
//! twin-of-twin fixed points produced here are what cluster detection
//! reads.
//!
//! All per-pass bookkeeping lives in a typed scratch indexed by node
//! handle; the active-descendant lists share one slab of doubly linked
//! entries so splicing is O(1) and recorded positions stay valid.

use crate::forest::Forest;
use crate::lca::Lca;
use crate::node::{Arena, NodeId};
use crate::undo::{self, Side, UndoMachine};

use std::collections::HashMap;

/// Pair up the leaves of both forests by leaf id and delete leaves present
/// on one side only (contracting the vacated parents). Rho placeholders
/// pair with each other when both sides carry one. Returns the number of
/// paired leaves.
pub fn sync_twins(arena: &mut Arena, f1: &mut Forest, f2: &mut Forest) -> usize {
    let (map1, rho1) = leaf_map(arena, f1);
    let (map2, rho2) = leaf_map(arena, f2);

    let mut shared = 0;
    for (&id, &l1) in &map1 {
        match map2.get(&id) {
            Some(&l2) => {
                arena[l1].twin = Some(l2);
                arena[l2].twin = Some(l1);
                shared += 1;
            }
            None => remove_leaf(arena, f1, l1),
        }
    }
    for (&id, &l2) in &map2 {
        if !map1.contains_key(&id) {
            remove_leaf(arena, f2, l2);
        }
    }
    match (rho1, rho2) {
        (Some(r1), Some(r2)) => {
            arena[r1].twin = Some(r2);
            arena[r2].twin = Some(r1);
        }
        (Some(r1), None) => {
            remove_leaf(arena, f1, r1);
            f1.rho = false;
        }
        (None, Some(r2)) => {
            remove_leaf(arena, f2, r2);
            f2.rho = false;
        }
        (None, None) => {}
    }
    shared
}

/// Algorithm-leaves of a forest keyed by minimum contained leaf id, plus
/// the rho component if present.
fn leaf_map(arena: &Arena, forest: &Forest) -> (HashMap<u32, NodeId>, Option<NodeId>) {
    let mut map = HashMap::new();
    let mut rho = None;
    for &c in &forest.components {
        for leaf in arena.leaves(c) {
            match arena.min_leaf_id(leaf) {
                Some(id) => {
                    map.insert(id, leaf);
                }
                None => rho = Some(leaf),
            }
        }
    }
    (map, rho)
}

fn remove_leaf(arena: &mut Arena, forest: &mut Forest, leaf: NodeId) {
    // scratch log, discarded: synchronization is never rolled back
    let mut scratch = UndoMachine::new();
    if let Some((parent, _)) = arena.detach(leaf) {
        undo::contract(arena, forest, Side::T1, parent, &mut scratch);
    } else {
        forest.components.retain(|&c| c != leaf);
    }
}

/// Interior twin synchronization for two whole trees: a node with one
/// child inherits that child's twin; a node with two children gets the LCA
/// (in the other tree) of its children's twins. Assumes `sync_twins` ran.
pub fn sync_interior_twins(arena: &mut Arena, f1: &Forest, f2: &Forest) {
    let root1 = f1.component(0);
    let root2 = f2.component(0);
    let lca1 = Lca::new(arena, root1);
    let lca2 = Lca::new(arena, root2);
    sync_interior(arena, root1, &lca2);
    sync_interior(arena, root2, &lca1);
}

fn sync_interior(arena: &mut Arena, n: NodeId, twin_lca: &Lca) {
    let (lc, rc) = (arena[n].lchild, arena[n].rchild);
    if let Some(l) = lc {
        sync_interior(arena, l, twin_lca);
    }
    if let Some(r) = rc {
        sync_interior(arena, r, twin_lca);
    }
    match (lc, rc) {
        (Some(c), None) | (None, Some(c)) => arena[n].twin = arena[c].twin,
        (Some(l), Some(r)) => {
            if let (Some(lt), Some(rt)) = (arena[l].twin, arena[r].twin) {
                arena[n].twin = Some(twin_lca.lca(lt, rt));
            }
        }
        (None, None) => {}
    }
}

/// Per-pass scratch surviving `sync_interior_twins_real`, consumed by
/// cluster reduction: the component number of every node of the fragmented
/// forest that took part in the pass.
pub struct SyncScratch {
    pub component: Vec<Option<usize>>,
}

impl SyncScratch {
    pub fn component_of(&self, n: NodeId) -> Option<usize> {
        self.component.get(n).copied().flatten()
    }
}

// Shared slab of doubly linked list entries. Positions are slab indices,
// stable across splices, so they can be recorded and acted on later.
#[derive(Default)]
struct Slab {
    val: Vec<NodeId>,
    prev: Vec<Option<u32>>,
    next: Vec<Option<u32>>,
    alive: Vec<bool>,
}

#[derive(Clone, Copy, Default)]
struct ListRef {
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl Slab {
    fn alloc(&mut self, v: NodeId) -> u32 {
        self.val.push(v);
        self.prev.push(None);
        self.next.push(None);
        self.alive.push(true);
        (self.val.len() - 1) as u32
    }

    fn push_back(&mut self, list: &mut ListRef, v: NodeId) -> u32 {
        let pos = self.alloc(v);
        self.prev[pos as usize] = list.tail;
        match list.tail {
            Some(t) => self.next[t as usize] = Some(pos),
            None => list.head = Some(pos),
        }
        list.tail = Some(pos);
        list.len += 1;
        pos
    }

    fn insert_before(&mut self, list: &mut ListRef, at: u32, v: NodeId) -> u32 {
        let pos = self.alloc(v);
        let before = self.prev[at as usize];
        self.prev[pos as usize] = before;
        self.next[pos as usize] = Some(at);
        self.prev[at as usize] = Some(pos);
        match before {
            Some(b) => self.next[b as usize] = Some(pos),
            None => list.head = Some(pos),
        }
        list.len += 1;
        pos
    }

    fn remove(&mut self, list: &mut ListRef, pos: u32) {
        if !self.alive[pos as usize] {
            return; // already merged away
        }
        self.alive[pos as usize] = false;
        let (p, n) = (self.prev[pos as usize], self.next[pos as usize]);
        match p {
            Some(p) => self.next[p as usize] = n,
            None => list.head = n,
        }
        match n {
            Some(n) => self.prev[n as usize] = p,
            None => list.tail = p,
        }
        list.len -= 1;
    }

    fn splice(&mut self, dst: &mut ListRef, src: ListRef) {
        if src.len == 0 {
            return;
        }
        match dst.tail {
            Some(t) => {
                self.next[t as usize] = src.head;
                self.prev[src.head.unwrap() as usize] = Some(t);
            }
            None => dst.head = src.head,
        }
        dst.tail = src.tail;
        dst.len += src.len;
    }
}

struct RealSync {
    slab: Slab,
    /// active-descendant list per T1 node
    lists: Vec<ListRef>,
    /// positions where each F2 node currently appears
    removable: Vec<Vec<u32>>,
    /// F2 component roots whose twin is this T1 node
    root_lcas: Vec<Vec<NodeId>>,
    component: Vec<Option<usize>>,
    lcas: Vec<Option<Lca>>,
}

/// Interior twin synchronization of T1's main component against a
/// fragmented F2. Assumes `sync_twins` ran. Returns the component
/// numbering scratch for cluster reduction.
pub fn sync_interior_twins_real(arena: &mut Arena, f1: &Forest, f2: &Forest) -> SyncScratch {
    let t1_root = f1.component(0);
    let t1_lca = Lca::new(arena, t1_root);
    let n = arena.len();
    let mut st = RealSync {
        slab: Slab::default(),
        lists: vec![ListRef::default(); n],
        removable: vec![Vec::new(); n],
        root_lcas: vec![Vec::new(); n],
        component: vec![None; n],
        lcas: Vec::new(),
    };

    for (i, &root) in f2.components.iter().enumerate() {
        st.lcas.push(None);
        match arena[root].twin {
            // finished component: its twin already owns a whole T1 component
            Some(t) if arena[t].parent.is_none() => continue,
            // untwinned leaf component (rho placeholder): nothing to sync
            None if arena.is_leaf(root) => continue,
            _ => {}
        }
        st.lcas[i] = Some(Lca::new(arena, root));
        mark_component(arena, root, i, &mut st.component);
        sync_interior(arena, root, &t1_lca);
        let twin = arena[root].twin.expect("component root did not sync");
        st.root_lcas[twin].push(root);
    }

    real_pass(arena, t1_root, &mut st);
    SyncScratch {
        component: st.component,
    }
}

fn mark_component(arena: &Arena, root: NodeId, number: usize, component: &mut [Option<usize>]) {
    let mut stack = vec![root];
    while let Some(x) = stack.pop() {
        component[x] = Some(number);
        if let Some(l) = arena[x].lchild {
            stack.push(l);
        }
        if let Some(r) = arena[x].rchild {
            stack.push(r);
        }
    }
}

fn real_pass(arena: &mut Arena, n: NodeId, st: &mut RealSync) {
    let (lc, rc) = (arena[n].lchild, arena[n].rchild);
    if let Some(l) = lc {
        real_pass(arena, l, st);
    }
    if let Some(r) = rc {
        real_pass(arena, r, st);
    }
    match (lc, rc) {
        (None, None) => {
            let twin = arena[n].twin.expect("unsynced leaf in interior sync");
            let mut list = st.lists[n];
            let pos = st.slab.push_back(&mut list, twin);
            st.lists[n] = list;
            st.removable[twin].push(pos);
        }
        (Some(c), None) | (None, Some(c)) => {
            arena[n].twin = arena[c].twin;
            let src = std::mem::take(&mut st.lists[c]);
            let mut list = st.lists[n];
            st.slab.splice(&mut list, src);
            st.lists[n] = list;
        }
        (Some(l), Some(r)) => {
            let l_list = std::mem::take(&mut st.lists[l]);
            let r_list = std::mem::take(&mut st.lists[r]);
            let both = l_list.len > 0 && r_list.len > 0;
            let mut list = ListRef::default();
            st.slab.splice(&mut list, l_list);
            let junction = list.tail;
            st.slab.splice(&mut list, r_list);
            if both {
                let p1 = junction.unwrap();
                if let Some(p2) = st.slab.next[p1 as usize] {
                    merge_junction(st, &mut list, p1, p2);
                }
            }
            // components that finish at n drop out of the frontier
            let roots = std::mem::take(&mut st.root_lcas[n]);
            if arena[n].parent.is_some() {
                for root in roots {
                    merge_out_component(st, &mut list, root);
                }
            }
            if list.len == 1 {
                let twin = st.slab.val[list.head.unwrap() as usize];
                arena[n].twin = Some(twin);
            }
            st.lists[n] = list;
        }
    }
}

/// Merge two adjacent entries into their LCA when they belong to the same
/// F2 component.
fn merge_junction(st: &mut RealSync, list: &mut ListRef, p1: u32, p2: u32) {
    if !st.slab.alive[p1 as usize] || !st.slab.alive[p2 as usize] {
        return;
    }
    let n1 = st.slab.val[p1 as usize];
    let n2 = st.slab.val[p2 as usize];
    let (Some(c1), Some(c2)) = (st.component[n1], st.component[n2]) else {
        return;
    };
    if c1 != c2 {
        return;
    }
    let lca = st.lcas[c1].as_ref().expect("missing component LCA").lca(n1, n2);
    let pos = st.slab.insert_before(list, p1, lca);
    st.removable[lca].push(pos);
    st.slab.remove(list, p1);
    st.removable[n1].pop();
    st.slab.remove(list, p2);
    st.removable[n2].pop();
}

/// Remove every recorded occurrence of a finished component's root from
/// the frontier, re-merging the neighbors it separated.
fn merge_out_component(st: &mut RealSync, list: &mut ListRef, root: NodeId) {
    let Some(comp) = st.component[root] else {
        return;
    };
    let positions = std::mem::take(&mut st.removable[root]);
    for pos in positions {
        if !st.slab.alive[pos as usize] {
            continue;
        }
        let at_edge = list.head == Some(pos) || list.tail == Some(pos);
        if at_edge {
            st.slab.remove(list, pos);
            continue;
        }
        let p1 = st.slab.prev[pos as usize].unwrap();
        let p2 = st.slab.next[pos as usize].unwrap();
        st.slab.remove(list, pos);
        let n1 = st.slab.val[p1 as usize];
        if st.component[n1] != Some(comp) {
            merge_junction(st, list, p1, p2);
        }
    }
}

/// Cluster points of T1's main component, in post-order: nodes in a stable
/// twin-of-twin correspondence whose children are not all stable, marking
/// the boundary of an independently solvable region.
pub fn find_cluster_points(arena: &Arena, f1: &Forest) -> Vec<NodeId> {
    let mut out = Vec::new();
    if !f1.components.is_empty() {
        collect_cluster_points(arena, f1.component(0), &mut out);
    }
    out
}

fn stable(arena: &Arena, n: NodeId) -> bool {
    arena[n]
        .twin
        .is_some_and(|t| arena[t].twin == Some(n))
}

fn collect_cluster_points(arena: &Arena, n: NodeId, out: &mut Vec<NodeId>) {
    let (lc, rc) = (arena[n].lchild, arena[n].rchild);
    if let Some(l) = lc {
        collect_cluster_points(arena, l, out);
    }
    if let Some(r) = rc {
        collect_cluster_points(arena, r, out);
    }
    if let (Some(l), Some(r)) = (lc, rc) {
        if stable(arena, n)
            && arena[n].parent.is_some()
            && (!stable(arena, l) || !stable(arena, r))
        {
            out.push(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::{LabelMap, forest_from_newick, forest_text, COMPONENT_SEP};

    fn pair(
        t1: &str,
        t2: &str,
    ) -> (Arena, Forest, Forest, LabelMap) {
        let mut arena = Arena::new();
        let mut labels = LabelMap::new();
        let f1 = forest_from_newick(&mut arena, t1, &mut labels).unwrap();
        let f2 = forest_from_newick(&mut arena, t2, &mut labels).unwrap();
        (arena, f1, f2, labels)
    }

    #[test]
    fn twins_are_symmetric() {
        let (mut arena, mut f1, mut f2, _) = pair("(A,(B,C));", "((C,A),B);");
        let shared = sync_twins(&mut arena, &mut f1, &mut f2);
        assert_eq!(shared, 3);
        for &c in f1.components.iter().chain(f2.components.iter()) {
            for leaf in arena.leaves(c) {
                let t = arena[leaf].twin.expect("leaf missing twin");
                assert_eq!(arena[t].twin, Some(leaf));
            }
        }
    }

    #[test]
    fn unique_leaves_are_removed() {
        let (mut arena, mut f1, mut f2, _) = pair("((A,D),(B,C));", "((C,A),(B,E));");
        let shared = sync_twins(&mut arena, &mut f1, &mut f2);
        assert_eq!(shared, 3);
        // D gone from T1, E gone from T2, parents contracted
        assert_eq!(forest_text(&arena, &f1, COMPONENT_SEP), "(0,(2,3))");
        assert_eq!(forest_text(&arena, &f2, COMPONENT_SEP), "((3,0),2)");
    }

    #[test]
    fn identical_trees_have_stable_interiors_and_no_clusters() {
        let (mut arena, mut f1, mut f2, _) = pair("((A,B),(C,D));", "((A,B),(C,D));");
        sync_twins(&mut arena, &mut f1, &mut f2);
        sync_interior_twins(&mut arena, &f1, &f2);
        let root1 = f1.component(0);
        let mut stack = vec![root1];
        while let Some(n) = stack.pop() {
            assert!(stable(&arena, n), "node {n} not stable");
            if let Some(l) = arena[n].lchild {
                stack.push(l);
            }
            if let Some(r) = arena[n].rchild {
                stack.push(r);
            }
        }
        assert!(find_cluster_points(&arena, &f1).is_empty());
    }

    #[test]
    fn cluster_point_detected_at_divergent_subtree() {
        // the {A,B,C} subtrees correspond but differ internally
        let (mut arena, mut f1, mut f2, _) = pair("(((A,B),C),D);", "(((B,C),A),D);");
        sync_twins(&mut arena, &mut f1, &mut f2);
        sync_interior_twins(&mut arena, &f1, &f2);
        let points = find_cluster_points(&arena, &f1);
        assert_eq!(points.len(), 1);
        let p = points[0];
        // the cluster point covers exactly {A,B,C}
        let ids: Vec<_> = arena
            .leaves(p)
            .iter()
            .map(|&l| arena.min_leaf_id(l).unwrap())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn fragmented_sync_converges_to_component_roots() {
        // T1 whole, F2 split into (A,B) and (C,D)
        let mut arena = Arena::new();
        let mut labels = LabelMap::new();
        let mut f1 =
            forest_from_newick(&mut arena, "((A,B),(C,D));", &mut labels).unwrap();
        let left = forest_from_newick(&mut arena, "(A,B);", &mut labels).unwrap();
        let right = forest_from_newick(&mut arena, "(C,D);", &mut labels).unwrap();
        let mut f2 = Forest::new(vec![left.component(0), right.component(0)]);

        sync_twins(&mut arena, &mut f1, &mut f2);
        let scratch = sync_interior_twins_real(&mut arena, &f1, &f2);

        // every F2 node is numbered with its component
        for (i, &root) in f2.components.iter().enumerate() {
            for leaf in arena.leaves(root) {
                assert_eq!(scratch.component_of(leaf), Some(i));
            }
        }
        // the F2 component roots sync to T1's two inner nodes
        let t1_root = f1.component(0);
        let t1_left = arena[t1_root].lchild.unwrap();
        assert_eq!(arena[left.component(0)].twin, Some(t1_left));
    }
}
