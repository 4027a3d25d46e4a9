//! Cluster decomposition: splitting a problem at independence points.
//!
//! A cluster point (see `sync::find_cluster_points`) bounds a region of T1
//! that corresponds to a well-defined region of F2 but is not yet in
//! agreement with it. Each such region is detached into its own pair of
//! forests, together with every F2 component whose root is twinned into
//! the detached T1 subtree, and solved as an independent instance against
//! the shared budget. Solved regions are grafted back at the recorded
//! attachment nodes; the non-decomposed remainder is always solved last.

use crate::forest::Forest;
use crate::node::{Arena, Label, NodeId};
use crate::sync::SyncScratch;
use crate::undo::{self, Side, UndoMachine};

/// One detached subproblem and where to put its solution back.
pub struct ClusterInstance {
    pub f1: Forest,
    pub f2: Forest,
    /// Node in the original T1 that lost the detached subtree.
    pub f1_attach: Option<NodeId>,
    /// Node in the original F2 that lost the twin subtree; `None` when the
    /// cluster captured a whole F2 component.
    pub f2_attach: Option<NodeId>,
    /// Whether the captured components include F2's main component.
    pub f2_has_component_zero: bool,
}

impl ClusterInstance {
    /// A cluster that owns a whole non-main F2 component has a free
    /// root on that side, so the subproblem must be allowed to spend
    /// root material: it is seeded with rho before solving.
    pub fn needs_rho(&self) -> bool {
        self.f2_attach.is_none() && !self.f2_has_component_zero
    }
}

/// Detach every cluster point (post-order, innermost first) into its own
/// instance and remove the captured components from `old_f2`. The
/// remaining `old_f1`/`old_f2` form the leftover "original" instance,
/// which the caller solves last.
pub fn cluster_reduction(
    arena: &mut Arena,
    old_f2: &mut Forest,
    cluster_points: &[NodeId],
    scratch: &SyncScratch,
) -> Vec<ClusterInstance> {
    // T1 keeps its component list; only subtrees are cut out of it
    let mut um = UndoMachine::new(); // reduction is permanent
    let mut keep = vec![true; old_f2.num_components()];
    let mut out = Vec::new();

    for &point in cluster_points {
        let f1_attach = arena[point].parent;
        undo::cut_parent(arena, point, &mut um);
        let f1 = Forest::new(vec![point]);

        let f2_root = arena[point].twin.expect("cluster point without twin");
        let f2_attach = arena[f2_root].parent;
        let cnumber = scratch.component_of(f2_root);
        let mut has_zero = false;
        if f2_attach.is_some() {
            undo::cut_parent(arena, f2_root, &mut um);
        } else if let Some(cn) = cnumber {
            keep[cn] = false;
            has_zero |= cn == 0;
        }

        // import every F2 component whose root is twinned into the
        // detached region, so the instance is self-contained
        let mut import = vec![false; old_f2.num_components()];
        for leaf in arena.leaves(point) {
            if let Some(twin) = arena[leaf].twin
                && let Some(cn) = scratch.component_of(twin)
                && Some(cn) != cnumber
            {
                import[cn] = true;
                keep[cn] = false;
                has_zero |= cn == 0;
            }
        }
        let mut components = vec![f2_root];
        for (i, &c) in old_f2.components.iter().enumerate() {
            if import[i] {
                components.push(c);
            }
        }

        out.push(ClusterInstance {
            f1,
            f2: Forest::new(components),
            f1_attach,
            f2_attach,
            f2_has_component_zero: has_zero,
        });
    }

    // drop the captured components; the rho flag is untouched since the
    // rho component is never captured
    let mut i = 0;
    old_f2.components.retain(|_| {
        let k = keep[i];
        i += 1;
        k
    });
    out
}

/// Graft a solved cluster back into the original forests. The solved main
/// component re-attaches at the recorded nodes (or the attachment node is
/// contracted away if the solution pruned the region's root material);
/// every other component joins the original forest's component list.
pub fn join_cluster(arena: &mut Arena, ci: &ClusterInstance, f1: &mut Forest, f2: &mut Forest) {
    let mut um = UndoMachine::new();

    let attach1 = ci.f1_attach.expect("joining an instance without attachment");
    let mut start = 0;
    if ci.f1.contains_rho() {
        undo::contract(arena, f1, Side::T1, attach1, &mut um);
    } else {
        arena.add_child(attach1, ci.f1.component(0));
        start = 1;
    }
    for &c in &ci.f1.components[start..] {
        if arena[c].label != Label::Rho {
            f1.components.push(c);
        }
    }

    let mut skip = None;
    if ci.f2.contains_rho() {
        if let Some(attach2) = ci.f2_attach {
            undo::contract(arena, f2, Side::T2, attach2, &mut um);
        }
    } else if let Some(attach2) = ci.f2_attach {
        let partner = partner_component(arena, ci);
        arena.add_child(attach2, partner);
        skip = Some(partner);
    }
    for &c in &ci.f2.components {
        if Some(c) != skip && arena[c].label != Label::Rho {
            f2.components.push(c);
        }
    }
}

/// The F2 component matching the solved cluster's main T1 component:
/// found through the twin of its first leaf, which the post-solve
/// synchronization is guaranteed to have set.
fn partner_component(arena: &Arena, ci: &ClusterInstance) -> NodeId {
    let leaf = *arena
        .leaves(ci.f1.component(0))
        .first()
        .expect("empty cluster component");
    let twin = arena[leaf].twin.expect("solved cluster is not synchronized");
    arena.find_root(twin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::{COMPONENT_SEP, LabelMap, forest_from_newick, forest_text};
    use crate::sync::{find_cluster_points, sync_interior_twins_real, sync_twins};

    fn setup() -> (Arena, Forest, Forest) {
        let mut arena = Arena::new();
        let mut labels = LabelMap::new();
        let mut f1 =
            forest_from_newick(&mut arena, "(((A,B),C),D);", &mut labels).unwrap();
        let mut f2 =
            forest_from_newick(&mut arena, "(((B,C),A),D);", &mut labels).unwrap();
        sync_twins(&mut arena, &mut f1, &mut f2);
        (arena, f1, f2)
    }

    #[test]
    fn reduction_extracts_the_divergent_region() {
        let (mut arena, f1, mut f2) = setup();
        let scratch = sync_interior_twins_real(&mut arena, &f1, &f2);
        let points = find_cluster_points(&arena, &f1);
        assert_eq!(points.len(), 1);

        let clusters = cluster_reduction(&mut arena, &mut f2, &points, &scratch);
        assert_eq!(clusters.len(), 1);
        let ci = &clusters[0];
        assert_eq!(forest_text(&arena, &ci.f1, COMPONENT_SEP), "((0,1),2)");
        assert_eq!(forest_text(&arena, &ci.f2, COMPONENT_SEP), "((1,2),0)");
        assert!(ci.f1_attach.is_some());
        assert!(ci.f2_attach.is_some());
        assert!(!ci.needs_rho());
        // the remainders hold the attachment stubs with D below them
        assert_eq!(f1.num_components(), 1);
        assert_eq!(f2.num_components(), 1);
    }

    #[test]
    fn join_restores_the_unsolved_cut_exactly() {
        let (mut arena, mut f1, mut f2) = setup();
        let before1 = forest_text(&arena, &f1, COMPONENT_SEP);
        let before2 = forest_text(&arena, &f2, COMPONENT_SEP);
        let scratch = sync_interior_twins_real(&mut arena, &f1, &f2);
        let points = find_cluster_points(&arena, &f1);
        let clusters = cluster_reduction(&mut arena, &mut f2, &points, &scratch);

        // joining the untouched instance puts both subtrees back
        for ci in &clusters {
            join_cluster(&mut arena, ci, &mut f1, &mut f2);
        }
        assert_eq!(forest_text(&arena, &f1, COMPONENT_SEP), before1);
        assert_eq!(forest_text(&arena, &f2, COMPONENT_SEP), before2);
    }
}
