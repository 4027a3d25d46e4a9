//! Canonical text form of trees and forests, and the label↔id mapping.
//!
//! User-facing Newick input is parsed by `phylotree` (see `io`) and
//! converted into the arena model here, with every leaf label interned into
//! a shared [`LabelMap`]; the core operates on integer ids only.
//!
//! The canonical form serializes a forest as parenthesized components
//! joined by a separator (default one space), leaves printed as their ids
//! and the rho placeholder as `p`. Folded sibling pairs print their full
//! preserved subtree. `build_finished_forest` parses that form back into
//! live components, which is how memoized solutions and recorded agreement
//! forests are brought back to life.

use std::collections::HashMap;

use phylotree::tree::Tree as PhyloTree;

use crate::Error;
use crate::forest::Forest;
use crate::node::{Arena, Label, NodeId};

/// Separator between serialized components.
pub const COMPONENT_SEP: &str = " ";

/// Bidirectional label↔id map, built once per run and shared by both
/// trees. Ids are assigned in order of first appearance.
#[derive(Clone, Debug, Default)]
pub struct LabelMap {
    to_id: HashMap<String, u32>,
    names: Vec<String>,
}

impl LabelMap {
    pub fn new() -> Self {
        LabelMap::default()
    }

    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.to_id.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.to_id.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub fn id(&self, name: &str) -> Option<u32> {
        self.to_id.get(name).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Parse one Newick tree through `phylotree` and convert it into a fresh
/// single-component forest over `arena`, interning leaf labels.
pub fn forest_from_newick(
    arena: &mut Arena,
    newick: &str,
    labels: &mut LabelMap,
) -> Result<Forest, Error> {
    let tree = PhyloTree::from_newick(newick).map_err(|e| Error::Parse(e.to_string()))?;
    let root_id = tree.get_root().map_err(|e| Error::Parse(e.to_string()))?;
    let root = convert(arena, &tree, root_id, labels)?;
    Ok(Forest::new(vec![root]))
}

fn convert(
    arena: &mut Arena,
    tree: &PhyloTree,
    id: usize,
    labels: &mut LabelMap,
) -> Result<NodeId, Error> {
    let node = tree.get(&id).map_err(|e| Error::Parse(e.to_string()))?;
    match node.children.len() {
        0 => {
            let name = node.name.clone().ok_or(Error::UnlabeledLeaf)?;
            Ok(arena.new_node(Label::Leaf(labels.intern(&name))))
        }
        2 => {
            let children = node.children.clone();
            let n = arena.new_node(Label::Interior);
            for child_id in children {
                let c = convert(arena, tree, child_id, labels)?;
                arena.add_child(n, c);
            }
            Ok(n)
        }
        d => Err(Error::NotBinary { degree: d }),
    }
}

/// Canonical text of one subtree (ids, rho as `p`, folded pairs expanded).
pub fn subtree_text(arena: &Arena, n: NodeId) -> String {
    let mut out = String::new();
    write_subtree(arena, n, None, &mut out);
    out
}

/// Like [`subtree_text`] but printing leaf names through the label map.
pub fn subtree_text_labeled(arena: &Arena, n: NodeId, labels: &LabelMap) -> String {
    let mut out = String::new();
    write_subtree(arena, n, Some(labels), &mut out);
    out
}

fn write_subtree(arena: &Arena, n: NodeId, labels: Option<&LabelMap>, out: &mut String) {
    if let Some((a, b)) = arena[n].folded {
        out.push('(');
        write_subtree(arena, a, labels, out);
        out.push(',');
        write_subtree(arena, b, labels, out);
        out.push(')');
        return;
    }
    match (arena[n].lchild, arena[n].rchild) {
        (Some(l), Some(r)) => {
            out.push('(');
            write_subtree(arena, l, labels, out);
            out.push(',');
            write_subtree(arena, r, labels, out);
            out.push(')');
        }
        (Some(c), None) | (None, Some(c)) => {
            // transient degree-one nodes print transparently
            write_subtree(arena, c, labels, out);
        }
        (None, None) => match arena[n].label {
            Label::Leaf(id) => match labels.and_then(|m| m.name(id)) {
                Some(name) => out.push_str(name),
                None => out.push_str(&id.to_string()),
            },
            Label::Rho => out.push('p'),
            Label::Interior => {}
        },
    }
}

/// Canonical text of a whole forest, components in list order.
pub fn forest_text(arena: &Arena, forest: &Forest, sep: &str) -> String {
    forest
        .components
        .iter()
        .map(|&c| subtree_text(arena, c))
        .collect::<Vec<_>>()
        .join(sep)
}

/// Per-component labeled texts for reporting results.
pub fn forest_components_labeled(
    arena: &Arena,
    forest: &Forest,
    labels: &LabelMap,
) -> Vec<String> {
    forest
        .components
        .iter()
        .map(|&c| subtree_text_labeled(arena, c, labels))
        .collect()
}

/// Normalize child order of every component.
pub fn normalize_forest(arena: &mut Arena, forest: &Forest) {
    for &c in &forest.components {
        arena.normalize_order(c);
    }
}

/// Deterministic memoization key: child order normalized, component 0
/// first, remaining component texts sorted.
pub fn canonical_key(arena: &mut Arena, forest: &Forest) -> String {
    normalize_forest(arena, forest);
    let mut texts: Vec<String> = forest
        .components
        .iter()
        .map(|&c| subtree_text(arena, c))
        .collect();
    if texts.len() > 1 {
        texts[1..].sort_unstable();
    }
    texts.join(COMPONENT_SEP)
}

/// Rebuild a forest from its canonical text. A bare `p` component restores
/// the rho flag.
pub fn build_finished_forest(arena: &mut Arena, text: &str) -> Result<Forest, Error> {
    let mut forest = Forest::new(Vec::new());
    for token in text.split_whitespace() {
        if token == "p" {
            let r = arena.new_node(Label::Rho);
            forest.components.push(r);
            forest.rho = true;
        } else {
            forest.components.push(parse_component(arena, token)?);
        }
    }
    Ok(forest)
}

fn parse_component(arena: &mut Arena, text: &str) -> Result<NodeId, Error> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    let n = parse_subtree(arena, bytes, &mut pos, text)?;
    if pos != bytes.len() {
        return Err(Error::Parse(format!(
            "trailing characters at {pos} in component '{text}'"
        )));
    }
    Ok(n)
}

fn parse_subtree(
    arena: &mut Arena,
    bytes: &[u8],
    pos: &mut usize,
    text: &str,
) -> Result<NodeId, Error> {
    match bytes.get(*pos) {
        Some(b'(') => {
            *pos += 1;
            let l = parse_subtree(arena, bytes, pos, text)?;
            expect(bytes, pos, b',', text)?;
            let r = parse_subtree(arena, bytes, pos, text)?;
            expect(bytes, pos, b')', text)?;
            let n = arena.new_node(Label::Interior);
            arena.add_child(n, l);
            arena.add_child(n, r);
            Ok(n)
        }
        Some(b'p') => {
            *pos += 1;
            Ok(arena.new_node(Label::Rho))
        }
        Some(c) if c.is_ascii_digit() => {
            let start = *pos;
            while bytes.get(*pos).is_some_and(|b| b.is_ascii_digit()) {
                *pos += 1;
            }
            let id: u32 = text[start..*pos]
                .parse()
                .map_err(|_| Error::Parse(format!("bad leaf id in '{text}'")))?;
            Ok(arena.new_node(Label::Leaf(id)))
        }
        _ => Err(Error::Parse(format!(
            "unexpected character at {pos} in component '{text}'"
        ))),
    }
}

fn expect(bytes: &[u8], pos: &mut usize, want: u8, text: &str) -> Result<(), Error> {
    if bytes.get(*pos) == Some(&want) {
        *pos += 1;
        Ok(())
    } else {
        Err(Error::Parse(format!(
            "expected '{}' at {} in component '{}'",
            want as char, pos, text
        )))
    }
}
