//! Tree merging.
//!
//! Keys are matched by case-insensitive name. When a name repeats, the k-th
//! occurrence in the source pairs with the k-th occurrence in the
//! destination. Existing destination order is kept and new keys are appended
//! in source order.
use std::collections::HashMap;

use crate::binary::MAX_DEPTH;
use crate::error::{Error, Result};
use crate::symbol::Symbol;
use crate::tree::{KvTree, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergePolicy {
    /// Same as `Update`.
    All,
    /// Replace matching values, recurse into matching blocks, add missing keys.
    Update,
    /// Remove one matching destination key per source key.
    Delete,
    /// Like `Update`, but keys missing from the destination are ignored and
    /// a source block never replaces a destination leaf.
    Borrow,
}

impl MergePolicy {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "borrow" => Some(Self::Borrow),
            _ => None,
        }
    }
}

fn child_info(tree: &KvTree, id: NodeId) -> Vec<(NodeId, Symbol)> {
    tree.node(id)
        .map(|n| {
            n.children()
                .filter_map(|c| Some((c.id(), c.name_symbol()?)))
                .collect()
        })
        .unwrap_or_default()
}

/// The `nth` child of `id` named `name`.
fn nth_named(tree: &KvTree, id: NodeId, name: Symbol, nth: usize) -> Option<NodeId> {
    child_info(tree, id)
        .into_iter()
        .filter(|&(_, s)| s == name)
        .nth(nth)
        .map(|(c, _)| c)
}

fn has_children(tree: &KvTree, id: NodeId) -> bool {
    tree.node(id).is_some_and(|n| n.has_children())
}

/// Makes `dest_id` hold a copy of `src_id`'s value and children, keeping its name.
fn overwrite(dest: &mut KvTree, dest_id: NodeId, src: &KvTree, src_id: NodeId) -> Result<()> {
    let value = src.node(src_id).map(|n| n.value().clone()).unwrap_or_default();
    dest.clear(dest_id)?;
    dest.set_value(dest_id, value)?;
    src.copy_subkeys(src_id, dest, dest_id)
}

fn check_level(level: usize) -> Result<()> {
    if level > MAX_DEPTH {
        return Err(Error::tree(format!("merge nested deeper than {MAX_DEPTH}")));
    }
    Ok(())
}

/// Merges the children of `src_id` into the children of `dest_id`.
pub fn merge(
    dest: &mut KvTree,
    dest_id: NodeId,
    src: &KvTree,
    src_id: NodeId,
    policy: MergePolicy,
) -> Result<()> {
    merge_at(dest, dest_id, src, src_id, policy, 0)
}

fn merge_at(
    dest: &mut KvTree,
    dest_id: NodeId,
    src: &KvTree,
    src_id: NodeId,
    policy: MergePolicy,
    level: usize,
) -> Result<()> {
    check_level(level)?;
    if policy == MergePolicy::Delete {
        for (_, name) in child_info(src, src_id) {
            if let Some(victim) = nth_named(dest, dest_id, name, 0) {
                dest.delete(victim)?;
            }
        }
        return Ok(());
    }

    let mut seen: HashMap<Symbol, usize> = HashMap::new();
    for (src_child, name) in child_info(src, src_id) {
        let nth = seen.entry(name).or_default();
        let target = nth_named(dest, dest_id, name, *nth);
        *nth += 1;
        match target {
            Some(d) if has_children(dest, d) && has_children(src, src_child) => {
                let value = src.node(src_child).map(|n| n.value().clone()).unwrap_or_default();
                if !value.is_none() {
                    dest.set_value(d, value)?;
                }
                merge_at(dest, d, src, src_child, policy, level + 1)?;
            }
            // borrowing a block into a leaf would add keys
            Some(_) if policy == MergePolicy::Borrow && has_children(src, src_child) => {}
            Some(d) => overwrite(dest, d, src, src_child)?,
            None if policy == MergePolicy::Borrow => {}
            None => {
                let copy = dest.copy_from(src, src_child)?;
                dest.add_sub_key(dest_id, copy)?;
            }
        }
    }
    Ok(())
}

/// Merges the roots of two trees.
pub fn merge_trees(dest: &mut KvTree, src: &KvTree, policy: MergePolicy) -> Result<()> {
    let root = dest.root();
    tracing::debug!(?policy, "merging trees");
    merge(dest, root, src, src.root(), policy)
}

/// Applies a sectioned patch: the patch's `update`, `delete` and `borrow`
/// blocks, in the order they appear, each with its own policy.
pub fn merge_sections(
    dest: &mut KvTree,
    dest_id: NodeId,
    patch: &KvTree,
    patch_id: NodeId,
) -> Result<()> {
    let sections: Vec<(NodeId, String)> = patch
        .node(patch_id)
        .map(|n| n.children().map(|c| (c.id(), c.name())).collect())
        .unwrap_or_default();
    for (section, name) in sections {
        match MergePolicy::from_name(&name) {
            Some(policy @ (MergePolicy::Update | MergePolicy::Delete | MergePolicy::Borrow)) => {
                merge(dest, dest_id, patch, section, policy)?;
            }
            _ => tracing::warn!(section = %name, "unknown merge section ignored"),
        }
    }
    Ok(())
}

/// Adds what `src_id` has and `dest_id` lacks. Existing destination values
/// always win; blocks present on both sides are filled recursively.
pub(crate) fn fill_missing(
    dest: &mut KvTree,
    dest_id: NodeId,
    src: &KvTree,
    src_id: NodeId,
) -> Result<()> {
    fill_missing_at(dest, dest_id, src, src_id, 0)
}

fn fill_missing_at(
    dest: &mut KvTree,
    dest_id: NodeId,
    src: &KvTree,
    src_id: NodeId,
    level: usize,
) -> Result<()> {
    check_level(level)?;
    let mut seen: HashMap<Symbol, usize> = HashMap::new();
    for (src_child, name) in child_info(src, src_id) {
        let nth = seen.entry(name).or_default();
        let target = nth_named(dest, dest_id, name, *nth);
        *nth += 1;
        match target {
            Some(d) => {
                if has_children(dest, d) && has_children(src, src_child) {
                    fill_missing_at(dest, d, src, src_child, level + 1)?;
                }
            }
            None => {
                let copy = dest.copy_from(src, src_child)?;
                dest.add_sub_key(dest_id, copy)?;
            }
        }
    }
    Ok(())
}
