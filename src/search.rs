//! Exact rSPR distance by budgeted branch-and-bound.
//!
//! The search runs the same singleton / sibling-pair state machine as the
//! approximation, but where the approximation cuts all three candidate
//! edges at once, the search branches into the three alternatives (cut a,
//! cut b, cut c), each consuming one unit of the budget `k`, rolling back
//! to the pre-branch checkpoint between alternatives. A branch is
//! abandoned early when `k` goes negative or when the 3-approximation of
//! the remaining instance exceeds `3k`. The iterative-deepening driver
//! starts at `approx/3` (a valid lower bound) and widens `k` until a
//! solution appears or the configured cap is hit.
//!
//! Cluster decomposition plugs in at the first branching point of the
//! outermost frame: when independent subproblems exist the shared budget
//! is spent on them one by one, each solved by re-entering the driver, and
//! solved regions are grafted back at their recorded attachment points.

use std::collections::{HashMap, VecDeque};
use std::io::Write;

use crate::Error;
use crate::approx::{approx, approx_hlpr};
use crate::cluster::{cluster_reduction, join_cluster};
use crate::forest::{Forest, add_rho_raw};
use crate::newick::{
    COMPONENT_SEP, LabelMap, build_finished_forest, canonical_key, forest_components_labeled,
    forest_from_newick, forest_text, normalize_forest,
};
use crate::node::{Arena, NodeId};
use crate::sync::{find_cluster_points, sync_interior_twins_real, sync_twins};
use crate::undo::{self, Op, Side, UndoMachine};

/// Hard cap on the iterative-deepening budget.
pub const MAX_SPR: usize = 1000;

/// Search configuration, threaded through one search session.
#[derive(Clone, Debug)]
pub struct Config {
    /// Prune branches whose 3-approximation already exceeds `3k`.
    pub bb_prune: bool,
    /// Make the approximation verify that case-3 endpoints share a
    /// component before cutting b.
    pub approx_check_component: bool,
    /// Only explore the cut-b branch when b sits between a and c.
    pub cut_one_b: bool,
    /// After cutting b, restrict the child branch to cut-b again.
    pub cut_all_b: bool,
    /// Skip the cut-c branch when b sits between a and c.
    pub cut_one_ab: bool,
    /// Skip the cut-b branch when a and c live in separate components.
    pub cut_ac_separate_components: bool,
    /// Split off independently solvable clusters before branching.
    pub cluster_reduction: bool,
    /// Cap on simultaneously open cluster decompositions.
    pub max_clusters: Option<usize>,
    /// Among equally good forests, prefer ones that used rho.
    pub prefer_rho: bool,
    /// Cache solved cluster instances by canonical text.
    pub memoize: bool,
    /// Collect every optimal agreement forest instead of the first.
    pub all_mafs: bool,
    /// Iterative-deepening cap; exceeding it yields the unknown sentinel.
    pub max_k: usize,
    /// Print each attempted budget as the deepening progresses.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bb_prune: true,
            approx_check_component: false,
            cut_one_b: false,
            cut_all_b: false,
            cut_one_ab: false,
            cut_ac_separate_components: false,
            cluster_reduction: false,
            max_clusters: None,
            prefer_rho: false,
            memoize: false,
            all_mafs: false,
            max_k: MAX_SPR,
            verbose: false,
        }
    }
}

/// One recorded agreement-forest pair, serialized in canonical form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AfPair {
    pub t1: String,
    pub t2: String,
    pub rho: bool,
}

struct MemoEntry {
    t1: String,
    t2: String,
    k: i32,
}

/// One search session: the arena shared by every forest in play, the
/// memoization cache and the cluster recursion bookkeeping. Strictly
/// sequential; never shared between searches.
pub struct Search<'a> {
    cfg: &'a Config,
    pub arena: Arena,
    memo: HashMap<String, MemoEntry>,
    open_clusters: usize,
    main_call: bool,
    /// Agreement forests recorded by the latest successful bounded search.
    pub found: Vec<AfPair>,
}

impl<'a> Search<'a> {
    pub fn new(cfg: &'a Config, arena: Arena) -> Self {
        Search {
            cfg,
            arena,
            memo: HashMap::new(),
            open_clusters: 0,
            main_call: true,
            found: Vec::new(),
        }
    }

    /// Exact distance of the two forests, or -1 if it exceeds `max_k`.
    /// On success the forests are left holding a maximum agreement forest.
    pub fn solve(&mut self, f1: &mut Forest, f2: &mut Forest) -> i32 {
        let end_k = self.cfg.max_k.min(i32::MAX as usize) as i32;
        self.branch_and_bound_range(f1, f2, end_k)
    }

    /// Driver for one (sub)instance: memo lookup, approximation-seeded
    /// lower bound, then iterative deepening up to `end_k`.
    fn branch_and_bound_range(&mut self, f1: &mut Forest, f2: &mut Forest, end_k: i32) -> i32 {
        let mut memo_key = None;
        if self.cfg.memoize {
            let key = format!(
                "{}:{}",
                canonical_key(&mut self.arena, f1),
                canonical_key(&mut self.arena, f2)
            );
            if let Some(entry) = self.memo.get(&key) {
                let (t1, t2, k) = (entry.t1.clone(), entry.t2.clone(), entry.k);
                *f1 = build_finished_forest(&mut self.arena, &t1).expect("corrupt memo entry");
                *f2 = build_finished_forest(&mut self.arena, &t2).expect("corrupt memo entry");
                sync_twins(&mut self.arena, f1, f2);
                return k;
            }
            memo_key = Some(key);
        }

        let approx_spr = {
            let mut arena = self.arena.clone();
            let mut c1 = f1.clone();
            let mut c2 = f2.clone();
            approx(
                &mut arena,
                &mut c1,
                &mut c2,
                self.cfg.approx_check_component,
                false,
            )
            .0
        };
        let exact = self.deepening(f1, f2, approx_spr / 3, end_k);

        if let Some(key) = memo_key
            && exact >= 0
        {
            normalize_forest(&mut self.arena, f1);
            normalize_forest(&mut self.arena, f2);
            self.memo.insert(
                key,
                MemoEntry {
                    t1: forest_text(&self.arena, f1, COMPONENT_SEP),
                    t2: forest_text(&self.arena, f2, COMPONENT_SEP),
                    k: exact,
                },
            );
        }
        exact
    }

    fn deepening(&mut self, f1: &mut Forest, f2: &mut Forest, start_k: i32, end_k: i32) -> i32 {
        let in_main = self.main_call;
        self.main_call = false;
        let mut k = start_k;
        while k <= end_k {
            if in_main && self.cfg.verbose {
                print!(" {k}");
                let _ = std::io::stdout().flush();
            }
            let saved = (self.arena.clone(), f1.clone(), f2.clone());
            let result = self.branch_and_bound(f1, f2, k);
            if result >= 0 {
                if in_main && self.cfg.verbose {
                    println!();
                }
                return result;
            }
            self.arena = saved.0;
            *f1 = saved.1;
            *f2 = saved.2;
            k += 1;
        }
        if in_main && self.cfg.verbose {
            println!();
        }
        -1
    }

    /// One bounded search. Returns the distance (≤ k) or a negative
    /// sentinel; on success the forests hold the first agreement forest
    /// found (or the joined cluster solution).
    fn branch_and_bound(&mut self, f1: &mut Forest, f2: &mut Forest, k: i32) -> i32 {
        sync_twins(&mut self.arena, f1, f2);
        let mut pairs = f1.find_sibling_pairs(&self.arena);
        let mut singletons = f2.find_singletons(&self.arena);
        let mut afs = Vec::new();
        let final_k = self.bb_hlpr(
            f1,
            f2,
            k,
            &mut pairs,
            &mut singletons,
            false,
            true,
            &mut afs,
        );
        if !afs.is_empty() {
            *f1 = build_finished_forest(&mut self.arena, &afs[0].t1)
                .expect("unparseable recorded forest");
            *f2 = build_finished_forest(&mut self.arena, &afs[0].t2)
                .expect("unparseable recorded forest");
            sync_twins(&mut self.arena, f1, f2);
        }
        self.found = afs;
        if final_k >= 0 { k - final_k } else { -1 }
    }

    /// Recursive core. Returns the remaining budget on success, negative
    /// on failure, and restores all tracked state before returning except
    /// on the cluster path, where the forests keep the joined solution.
    #[allow(clippy::too_many_arguments)]
    fn bb_hlpr(
        &mut self,
        f1: &mut Forest,
        f2: &mut Forest,
        mut k: i32,
        pairs: &mut VecDeque<NodeId>,
        singletons: &mut Vec<NodeId>,
        cut_b_only_in: bool,
        root_frame: bool,
        afs: &mut Vec<AfPair>,
    ) -> i32 {
        let mut cut_b_only = cut_b_only_in;
        let mut um = UndoMachine::new();

        while !singletons.is_empty() || !pairs.is_empty() {
            // Case 1: cut the twins of F2 singletons free in T1. If the
            // singleton is F2's own main component, the root material has
            // been pruned away: introduce rho at unit cost.
            while let Some(t2_a) = singletons.pop() {
                let t1_a = self.arena[t2_a].twin.expect("singleton without twin");
                let Some(t1_a_parent) = self.arena[t1_a].parent else {
                    continue;
                };
                let potential_new_pair = self.arena.is_sibling_pair(t1_a_parent);
                if t2_a == f2.component(0) && !f1.contains_rho() {
                    undo::add_rho(&mut self.arena, f1, Side::T1, &mut um);
                    undo::add_rho(&mut self.arena, f2, Side::T2, &mut um);
                    k -= 1;
                }
                undo::cut_parent(&mut self.arena, t1_a, &mut um);
                undo::add_component(f1, Side::T1, t1_a, &mut um);
                let node = undo::contract(&mut self.arena, f1, Side::T1, t1_a_parent, &mut um);
                if potential_new_pair
                    && let Some(nd) = node
                    && self.arena.is_sibling_pair(nd)
                {
                    um.add(Op::PushedPairFront);
                    pairs.push_front(self.arena[nd].rchild.unwrap());
                    pairs.push_front(self.arena[nd].lchild.unwrap());
                }
            }

            if pairs.is_empty() {
                continue;
            }
            let mut t1_a = pairs.pop_back().unwrap();
            let mut t1_c = pairs.pop_back().unwrap();
            um.add(Op::PoppedPair { a: t1_a, c: t1_c });
            if self.arena[t1_a].parent.is_none()
                || self.arena[t1_a].parent != self.arena[t1_c].parent
            {
                continue;
            }
            let t1_ac = self.arena[t1_a].parent.unwrap();
            let mut t2_a = self.arena[t1_a].twin.expect("paired leaf without twin");
            let mut t2_c = self.arena[t1_c].twin.expect("paired leaf without twin");

            if self.arena[t2_a].parent.is_some()
                && self.arena[t2_a].parent == self.arena[t2_c].parent
            {
                // Case 2: identical sibling pair, resolve without cost.
                let t2_ac = self.arena[t2_a].parent.unwrap();
                undo::contract_sibling_pair(&mut self.arena, t1_ac, &mut um);
                undo::contract_sibling_pair(&mut self.arena, t2_ac, &mut um);
                undo::set_twin(&mut self.arena, t1_ac, Some(t2_ac), &mut um);
                undo::set_twin(&mut self.arena, t2_ac, Some(t1_ac), &mut um);
                if self.arena.is_singleton(t2_ac)
                    && !self.arena.is_singleton(t1_ac)
                    && t2_ac != f2.component(0)
                {
                    singletons.push(t2_ac);
                }
                if let Some(gp) = self.arena[t1_ac].parent
                    && self.arena.is_sibling_pair(gp)
                {
                    um.add(Op::PushedPair);
                    pairs.push_back(self.arena[gp].lchild.unwrap());
                    pairs.push_back(self.arena[gp].rchild.unwrap());
                }
            } else {
                // Case 3: three-way branch, one budget unit each.
                if k <= 0
                    && ((self.arena[t2_c].parent.is_some() && self.arena[t2_a].parent.is_some())
                        || !f2.contains_rho())
                {
                    singletons.clear();
                    um.undo_all(&mut self.arena, f1, f2, pairs);
                    return k - 1;
                }

                let undo_state = um.checkpoint();

                // keep T2_a the deeper endpoint so its sibling b is fixed
                if (self.arena.depth(t2_a) < self.arena.depth(t2_c)
                    && self.arena[t2_c].parent.is_some())
                    || self.arena[t2_a].parent.is_none()
                {
                    std::mem::swap(&mut t1_a, &mut t1_c);
                    std::mem::swap(&mut t2_a, &mut t2_c);
                } else if self.arena.depth(t2_a) == self.arena.depth(t2_c)
                    && let (Some(pa), Some(pc)) =
                        (self.arena[t2_a].parent, self.arena[t2_c].parent)
                    && self.arena.depth(pa) < self.arena.depth(pc)
                {
                    std::mem::swap(&mut t1_a, &mut t1_c);
                    std::mem::swap(&mut t2_a, &mut t2_c);
                }

                let t2_ab = self.arena[t2_a].parent.expect("case-3 endpoint has no parent");
                let mut cut_ab_only = false;
                if self.arena[t2_c].parent.is_some()
                    && self.arena[t2_ab].parent == self.arena[t2_c].parent
                {
                    // b sits between a and c: the other branches are
                    // provably dominated
                    if self.cfg.cut_one_b {
                        cut_b_only = true;
                    }
                    if self.cfg.cut_one_ab {
                        cut_ab_only = true;
                    }
                }

                // admissibility: a 3-approximation of what remains cannot
                // exceed 3k if a solution within k exists
                if self.cfg.bb_prune {
                    um.add(Op::PushedPair);
                    pairs.push_back(t1_c);
                    pairs.push_back(t1_a);
                    let check = self.cfg.approx_check_component;
                    let (approx_spr, _) =
                        approx_hlpr(&mut self.arena, f1, f2, singletons, pairs, check, false);
                    if approx_spr > 3 * k {
                        um.undo_all(&mut self.arena, f1, f2, pairs);
                        return -1;
                    }
                    um.undo_to(undo_state, &mut self.arena, f1, f2, pairs);
                }

                // cluster decomposition, only from the outermost frame
                // where no ancestor holds an undo checkpoint
                if root_frame
                    && self.cfg.cluster_reduction
                    && self.cfg.max_clusters.is_none_or(|m| self.open_clusters < m)
                {
                    let scratch = sync_interior_twins_real(&mut self.arena, f1, f2);
                    let cluster_points = find_cluster_points(&self.arena, f1);
                    if !cluster_points.is_empty() {
                        self.open_clusters += 1;
                        pairs.clear();
                        let clusters =
                            cluster_reduction(&mut self.arena, f2, &cluster_points, &scratch);
                        f1.unsync_interior(&mut self.arena);
                        f2.unsync_interior(&mut self.arena);
                        for mut ci in clusters {
                            ci.f1.unsync_interior(&mut self.arena);
                            ci.f2.unsync_interior(&mut self.arena);
                            if k >= 0 {
                                if ci.needs_rho() {
                                    add_rho_raw(&mut self.arena, &mut ci.f1);
                                    add_rho_raw(&mut self.arena, &mut ci.f2);
                                }
                                let spr =
                                    self.branch_and_bound_range(&mut ci.f1, &mut ci.f2, k);
                                if spr >= 0 {
                                    k -= spr;
                                } else {
                                    k = -1;
                                }
                            }
                            if k > -1 {
                                join_cluster(&mut self.arena, &ci, f1, f2);
                            }
                        }
                        // whatever was not decomposed is solved last with
                        // the remaining budget
                        if k >= 0 {
                            let spr = self.branch_and_bound_range(f1, f2, k);
                            if spr >= 0 {
                                k -= spr;
                            } else {
                                k = -1;
                            }
                        }
                        self.open_clusters -= 1;
                        return k;
                    }
                    f1.unsync_interior(&mut self.arena);
                    f2.unsync_interior(&mut self.arena);
                }

                // branch (a): cut T2_a
                let mut answer_a = -1;
                if !cut_b_only {
                    let t2_ab = self.arena[t2_a].parent.expect("endpoint lost its parent");
                    undo::cut_parent(&mut self.arena, t2_a, &mut um);
                    let node = undo::contract(&mut self.arena, f2, Side::T2, t2_ab, &mut um);
                    if let Some(nd) = node
                        && self.arena.is_singleton(nd)
                        && nd != f2.component(0)
                    {
                        singletons.push(nd);
                    }
                    undo::add_component(f2, Side::T2, t2_a, &mut um);
                    singletons.push(t2_a);
                    answer_a = self.bb_hlpr(f1, f2, k - 1, pairs, singletons, false, false, afs);
                }
                let mut best_k = answer_a;
                um.undo_to(undo_state, &mut self.arena, f1, f2, pairs);

                // branch (b): cut T2_b, the sibling of T2_a
                let mut answer_b = -1;
                if !self.cfg.cut_ac_separate_components
                    || self.arena.find_root(t2_a) == self.arena.find_root(t2_c)
                {
                    let t2_ab = self.arena[t2_a].parent.expect("endpoint lost its parent");
                    let t2_b = self
                        .arena
                        .sibling_of(t2_ab, t2_a)
                        .expect("endpoint has no sibling");
                    undo::cut_parent(&mut self.arena, t2_b, &mut um);
                    let node = undo::contract(&mut self.arena, f2, Side::T2, t2_ab, &mut um);
                    if let Some(nd) = node
                        && self.arena.is_singleton(nd)
                        && nd != f2.component(0)
                    {
                        singletons.push(nd);
                    }
                    undo::add_component(f2, Side::T2, t2_b, &mut um);
                    if self.arena.is_leaf(t2_b) {
                        singletons.push(t2_b);
                    }
                    um.add(Op::PushedPair);
                    pairs.push_back(t1_a);
                    pairs.push_back(t1_c);
                    let again = self.cfg.cut_all_b;
                    answer_b = self.bb_hlpr(f1, f2, k - 1, pairs, singletons, again, false, afs);
                }
                if answer_b > best_k
                    || (answer_b == best_k && self.cfg.prefer_rho && f2.contains_rho())
                {
                    best_k = answer_b;
                }
                um.undo_to(undo_state, &mut self.arena, f1, f2, pairs);

                // branch (c): cut T2_c; if it is already a root no edge is
                // cut and the budget unit comes back
                if let Some(t2_c_parent) = self.arena[t2_c].parent {
                    undo::cut_parent(&mut self.arena, t2_c, &mut um);
                    let node =
                        undo::contract(&mut self.arena, f2, Side::T2, t2_c_parent, &mut um);
                    if let Some(nd) = node
                        && self.arena.is_singleton(nd)
                        && nd != f2.component(0)
                    {
                        singletons.push(nd);
                    }
                    undo::add_component(f2, Side::T2, t2_c, &mut um);
                } else {
                    k += 1;
                }
                if !cut_b_only && !cut_ab_only {
                    singletons.push(t2_c);
                    let answer_c =
                        self.bb_hlpr(f1, f2, k - 1, pairs, singletons, false, false, afs);
                    if answer_c > best_k
                        || (answer_c == best_k && self.cfg.prefer_rho && f2.contains_rho())
                    {
                        best_k = answer_c;
                    }
                }

                um.undo_all(&mut self.arena, f1, f2, pairs);
                singletons.clear();
                return best_k;
            }
            cut_b_only = false;
        }

        // terminal: both work lists drained; k >= 0 is a solution
        if k >= 0 {
            let snapshot = AfPair {
                t1: forest_text(&self.arena, f1, COMPONENT_SEP),
                t2: forest_text(&self.arena, f2, COMPONENT_SEP),
                rho: f1.contains_rho(),
            };
            if self.cfg.prefer_rho && !afs.is_empty() && !afs[0].rho && f1.contains_rho() {
                if !self.cfg.all_mafs {
                    afs.clear();
                }
                afs.insert(0, snapshot);
            } else if self.cfg.all_mafs || afs.is_empty() {
                afs.push(snapshot);
            }
        }
        um.undo_all(&mut self.arena, f1, f2, pairs);
        k
    }
}

/// Distance outcome at the public boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Distance {
    Exact(usize),
    /// The iterative deepening cap was reached without a solution.
    ExceedsMax,
}

/// Result of a solved instance: the distance and the witnessing maximum
/// agreement forest, reported as labeled component lists.
#[derive(Clone, Debug)]
pub struct Solution {
    pub distance: Distance,
    pub f1_components: Vec<String>,
    pub f2_components: Vec<String>,
    pub rho: bool,
    /// All optimal forests when `Config::all_mafs` was set.
    pub all_mafs: Vec<(Vec<String>, Vec<String>)>,
}

/// A parsed and synchronized instance: two trees over a shared label map,
/// ready to be approximated or solved any number of times.
#[derive(Debug)]
pub struct Problem {
    arena: Arena,
    f1: Forest,
    f2: Forest,
    labels: LabelMap,
    shared_leaves: usize,
}

impl Problem {
    /// Parse two Newick trees, intern their labels into one shared map and
    /// synchronize the leaf twins, deleting leaves unique to one side.
    pub fn from_newick(newick1: &str, newick2: &str) -> Result<Problem, Error> {
        let mut arena = Arena::new();
        let mut labels = LabelMap::new();
        let mut f1 = forest_from_newick(&mut arena, newick1, &mut labels)?;
        let mut f2 = forest_from_newick(&mut arena, newick2, &mut labels)?;
        let shared_leaves = sync_twins(&mut arena, &mut f1, &mut f2);
        if shared_leaves == 0 {
            return Err(Error::DisjointLeafSets);
        }
        Ok(Problem {
            arena,
            f1,
            f2,
            labels,
            shared_leaves,
        })
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn shared_leaves(&self) -> usize {
        self.shared_leaves
    }

    /// 3-approximation of the distance with the witnessing forest,
    /// reported as labeled components.
    pub fn approx(&self, check_component: bool) -> (usize, Vec<String>, Vec<String>) {
        let mut arena = self.arena.clone();
        let mut f1 = self.f1.clone();
        let mut f2 = self.f2.clone();
        let (count, saved) = approx(&mut arena, &mut f1, &mut f2, check_component, true);
        let (t1, t2) = saved.expect("approximation did not save forests");
        let mut out = Arena::new();
        let af1 = build_finished_forest(&mut out, &t1).expect("unparseable approximate forest");
        let af2 = build_finished_forest(&mut out, &t2).expect("unparseable approximate forest");
        normalize_forest(&mut out, &af1);
        normalize_forest(&mut out, &af2);
        (
            count as usize,
            forest_components_labeled(&out, &af1, &self.labels),
            forest_components_labeled(&out, &af2, &self.labels),
        )
    }

    /// Exact distance and maximum agreement forest under `cfg`.
    pub fn solve(&self, cfg: &Config) -> Solution {
        let mut search = Search::new(cfg, self.arena.clone());
        let mut f1 = self.f1.clone();
        let mut f2 = self.f2.clone();
        let distance = search.solve(&mut f1, &mut f2);
        if distance < 0 {
            return Solution {
                distance: Distance::ExceedsMax,
                f1_components: Vec::new(),
                f2_components: Vec::new(),
                rho: false,
                all_mafs: Vec::new(),
            };
        }
        normalize_forest(&mut search.arena, &f1);
        normalize_forest(&mut search.arena, &f2);
        let all_mafs = if cfg.all_mafs {
            let mut out = Vec::new();
            for af in &search.found {
                let mut tmp = Arena::new();
                let a1 = build_finished_forest(&mut tmp, &af.t1)
                    .expect("unparseable recorded forest");
                let a2 = build_finished_forest(&mut tmp, &af.t2)
                    .expect("unparseable recorded forest");
                normalize_forest(&mut tmp, &a1);
                normalize_forest(&mut tmp, &a2);
                let pair = (
                    forest_components_labeled(&tmp, &a1, &self.labels),
                    forest_components_labeled(&tmp, &a2, &self.labels),
                );
                if !out.contains(&pair) {
                    out.push(pair);
                }
            }
            out
        } else {
            Vec::new()
        };
        Solution {
            distance: Distance::Exact(distance as usize),
            f1_components: forest_components_labeled(&search.arena, &f1, &self.labels),
            f2_components: forest_components_labeled(&search.arena, &f2, &self.labels),
            rho: f1.contains_rho(),
            all_mafs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(t1: &str, t2: &str, cfg: &Config) -> Distance {
        Problem::from_newick(t1, t2).unwrap().solve(cfg).distance
    }

    #[test]
    fn identical_trees_have_distance_zero() {
        let cfg = Config::default();
        let sol = Problem::from_newick("(A,(B,C));", "(A,(B,C));")
            .unwrap()
            .solve(&cfg);
        assert_eq!(sol.distance, Distance::Exact(0));
        assert_eq!(sol.f1_components.len(), 1);
        assert_eq!(sol.f2_components.len(), 1);
        assert_eq!(sol.f1_components, sol.f2_components);
    }

    #[test]
    fn single_move_pair_has_distance_one() {
        let cfg = Config::default();
        assert_eq!(
            dist("((A,B),C);", "(A,(B,C));", &cfg),
            Distance::Exact(1)
        );
    }

    #[test]
    fn crossed_cherries_have_distance_two() {
        let cfg = Config::default();
        assert_eq!(
            dist("((A,B),(C,D));", "((A,C),(B,D));", &cfg),
            Distance::Exact(2)
        );
    }

    #[test]
    fn maf_size_matches_distance() {
        let cfg = Config::default();
        let sol = Problem::from_newick("((A,B),(C,D));", "((A,C),(B,D));")
            .unwrap()
            .solve(&cfg);
        // a MAF witnessing distance d always has d+1 components
        assert_eq!(sol.f1_components.len(), 3);
        assert_eq!(sol.f2_components.len(), 3);
    }

    #[test]
    fn cap_below_distance_reports_unknown() {
        let cfg = Config {
            max_k: 1,
            ..Config::default()
        };
        assert_eq!(
            dist("((A,B),(C,D));", "((A,C),(B,D));", &cfg),
            Distance::ExceedsMax
        );
    }

    #[test]
    fn approximation_brackets_exact_distance() {
        let pairs = [
            ("(A,(B,C));", "(A,(B,C));"),
            ("((A,B),C);", "(A,(B,C));"),
            ("((A,B),(C,D));", "((A,C),(B,D));"),
            ("(((A,B),C),D);", "(((B,C),A),D);"),
            ("((((A,B),C),D),E);", "((C,D),((A,B),E));"),
        ];
        let cfg = Config::default();
        for (t1, t2) in pairs {
            let problem = Problem::from_newick(t1, t2).unwrap();
            let (approx, _, _) = problem.approx(false);
            let Distance::Exact(exact) = problem.solve(&cfg).distance else {
                panic!("no exact distance for {t1} vs {t2}");
            };
            assert!(exact <= approx, "{t1} vs {t2}: exact {exact} approx {approx}");
            assert!(
                approx <= 3 * exact,
                "{t1} vs {t2}: exact {exact} approx {approx}"
            );
        }
    }

    #[test]
    fn cluster_reduction_agrees_with_plain_search() {
        let pairs = [
            ("(((A,B),C),D);", "(((B,C),A),D);"),
            ("((A,B),(C,D));", "((A,C),(B,D));"),
            ("((((A,B),C),D),E);", "((C,D),((A,B),E));"),
        ];
        let plain = Config::default();
        let clustered = Config {
            cluster_reduction: true,
            ..Config::default()
        };
        for (t1, t2) in pairs {
            assert_eq!(
                dist(t1, t2, &plain),
                dist(t1, t2, &clustered),
                "{t1} vs {t2}"
            );
        }
    }

    #[test]
    fn memoization_agrees_with_plain_search() {
        let memo = Config {
            cluster_reduction: true,
            memoize: true,
            ..Config::default()
        };
        let plain = Config::default();
        for (t1, t2) in [
            ("(((A,B),C),D);", "(((B,C),A),D);"),
            ("((A,B),(C,D));", "((A,C),(B,D));"),
        ] {
            assert_eq!(dist(t1, t2, &plain), dist(t1, t2, &memo), "{t1} vs {t2}");
        }
    }

    #[test]
    fn optimization_shortcuts_preserve_the_distance() {
        let variants = [
            Config {
                cut_one_b: true,
                ..Config::default()
            },
            Config {
                cut_one_ab: true,
                ..Config::default()
            },
            Config {
                cut_ac_separate_components: true,
                ..Config::default()
            },
            Config {
                bb_prune: false,
                ..Config::default()
            },
        ];
        for cfg in &variants {
            assert_eq!(dist("((A,B),C);", "(A,(B,C));", cfg), Distance::Exact(1));
            assert_eq!(
                dist("((A,B),(C,D));", "((A,C),(B,D));", cfg),
                Distance::Exact(2)
            );
        }
    }

    #[test]
    fn all_mafs_contains_the_first_maf() {
        let cfg = Config {
            all_mafs: true,
            ..Config::default()
        };
        let sol = Problem::from_newick("((A,B),C);", "(A,(B,C));")
            .unwrap()
            .solve(&cfg);
        assert_eq!(sol.distance, Distance::Exact(1));
        assert!(!sol.all_mafs.is_empty());
        for (c1, c2) in &sol.all_mafs {
            assert_eq!(c1.len(), c2.len());
        }
    }

    #[test]
    fn disjoint_leaf_sets_are_rejected() {
        let err = Problem::from_newick("(A,B);", "(C,D);").unwrap_err();
        assert!(matches!(err, Error::DisjointLeafSets));
    }

    #[test]
    fn partial_overlap_restricts_to_shared_leaves() {
        // only {A,B,C} are shared; the trees agree on them
        let cfg = Config::default();
        let problem = Problem::from_newick("((A,B),(C,X));", "((A,B),(C,Y));").unwrap();
        assert_eq!(problem.shared_leaves(), 3);
        assert_eq!(problem.solve(&cfg).distance, Distance::Exact(0));
    }
}
