//! Node arena.
//!
//! A [`KvTree`] owns every node it allocates. Parents hold an ordered list of
//! child handles; destroying a node frees its whole subtree. Handles carry a
//! generation so a handle to a freed slot never aliases a later node.
//!
//! Chains are weak: a [`ChainLink`] names a tree by its [`TreeId`] and a node
//! by its handle, and never keeps either alive. A link into the same tree
//! resolves directly. A link into another tree resolves only through a view
//! that was given that tree with [`NodeRef::with_linked`], and a deleted
//! target makes the lookup miss.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::node::NodeRef;
use crate::symbol::Symbol;
use crate::value::{Color, Value, atoi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`KvTree`]. Clones keep it, so a clone can stand in for its
/// original as a chain target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u64);

impl TreeId {
    fn fresh() -> Self {
        TreeId(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a lookup continues after missing locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub tree: TreeId,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) name: Symbol,
    pub(crate) name_exact: Symbol,
    pub(crate) value: Value,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) chain: Option<ChainLink>,
}

impl Node {
    fn named(name: &str) -> Self {
        Self::with_symbols(Symbol::intern(name), Symbol::intern_exact(name))
    }

    pub(crate) fn with_symbols(name: Symbol, name_exact: Symbol) -> Self {
        Self {
            name,
            name_exact,
            value: Value::None,
            children: Vec::new(),
            parent: None,
            chain: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// A tree of named, typed nodes.
///
/// Most files hold a single top-level block, exposed as [`KvTree::root`].
/// Extra top-level blocks are kept in order as peers of the root.
#[derive(Debug, Clone)]
pub struct KvTree {
    id: TreeId,
    slots: Vec<Slot>,
    free: Vec<u32>,
    top_level: Vec<NodeId>,
    escapes: bool,
}

impl KvTree {
    pub fn new(name: &str) -> Self {
        let mut tree = Self {
            id: TreeId::fresh(),
            slots: Vec::new(),
            free: Vec::new(),
            top_level: Vec::new(),
            escapes: false,
        };
        let root = tree.create_node(name);
        tree.top_level.push(root);
        tree
    }

    /// Tree with the given children already set, for quick setup.
    pub fn with_pairs(name: &str, pairs: &[(&str, Value)]) -> Self {
        let mut tree = Self::new(name);
        let root = tree.root();
        for (k, v) in pairs {
            let child = tree.alloc(Node::named(k));
            tree.attach(root, child);
            if let Some(n) = tree.get_mut(child) {
                n.value = v.clone();
            }
        }
        tree
    }

    pub fn tree_id(&self) -> TreeId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        self.top_level[0]
    }

    pub fn root_node(&self) -> NodeRef<'_> {
        NodeRef::new(self, self.root())
    }

    /// All top-level blocks in order; the first is the root.
    pub fn top_level(&self) -> &[NodeId] {
        &self.top_level
    }

    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.get(id).map(|_| NodeRef::new(self, id))
    }

    /// Levels below `id`: 0 when it has no children.
    pub fn depth_below(&self, id: NodeId) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(id, 0usize)];
        while let Some((cur, level)) = stack.pop() {
            deepest = deepest.max(level);
            if let Some(n) = self.get(cur) {
                stack.extend(n.children.iter().map(|&c| (c, level + 1)));
            }
        }
        deepest
    }

    /// Number of live nodes, detached ones included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether text written from this tree should use escape sequences.
    pub fn uses_escape_sequences(&self) -> bool {
        self.escapes
    }

    pub fn set_uses_escape_sequences(&mut self, state: bool) {
        self.escapes = state;
    }

    // ---- slots ----

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    fn live(&self, id: NodeId) -> Result<&Node> {
        self.get(id)
            .ok_or_else(|| Error::tree(format!("stale node handle {}:{}", id.index, id.generation)))
    }

    fn live_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.get_mut(id)
            .ok_or_else(|| Error::tree(format!("stale node handle {}:{}", id.index, id.generation)))
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    /// Frees `id` and everything below it. The caller unlinks it first.
    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.release(cur) {
                stack.extend(node.children);
            }
        }
    }

    /// Appends a detached child without checks.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.get_mut(parent) {
            p.children.push(child);
        }
    }

    pub(crate) fn push_top_level(&mut self, id: NodeId) {
        self.top_level.push(id);
    }

    fn is_detached(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.parent.is_none()) && !self.top_level.contains(&id)
    }

    fn require_detached(&self, id: NodeId) -> Result<()> {
        self.live(id)?;
        if self.is_detached(id) {
            Ok(())
        } else {
            Err(Error::tree("node already belongs to a parent"))
        }
    }

    fn position_in(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.get(parent)?.children.iter().position(|&c| c == child)
    }

    // ---- construction ----

    /// A new node that belongs to no parent yet.
    pub fn create_node(&mut self, name: &str) -> NodeId {
        self.alloc(Node::named(name))
    }

    /// Creates and appends a child named `name`.
    pub fn create_key(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.live(parent)?;
        let child = self.create_node(name);
        self.attach(parent, child);
        Ok(child)
    }

    /// Creates a child whose name is one above the highest integer-named child.
    pub fn create_new_key(&mut self, parent: NodeId) -> Result<NodeId> {
        let mut next = 1;
        for &c in &self.live(parent)?.children {
            if let Some(n) = self.get(c) {
                let v = atoi(&n.name.resolve());
                if next <= v {
                    next = v.saturating_add(1);
                }
            }
        }
        self.create_key(parent, &next.to_string())
    }

    /// Creates a sibling directly after `id`.
    pub fn create_peer_key(&mut self, id: NodeId, name: &str) -> Result<NodeId> {
        let parent = self.live(id)?.parent;
        match parent {
            Some(p) => {
                let pos = self.position_in(p, id).map_or(0, |i| i + 1);
                let peer = self.create_node(name);
                if let Some(pn) = self.get_mut(p) {
                    pn.children.insert(pos, peer);
                }
                if let Some(n) = self.get_mut(peer) {
                    n.parent = Some(p);
                }
                Ok(peer)
            }
            None => {
                let pos = self
                    .top_level
                    .iter()
                    .position(|&t| t == id)
                    .ok_or_else(|| Error::tree("detached node has no peers"))?;
                let peer = self.create_node(name);
                self.top_level.insert(pos + 1, peer);
                Ok(peer)
            }
        }
    }

    /// Finds the child path `path`, creating missing segments. Only local
    /// children are considered; chains are never written through.
    pub fn find_or_create(&mut self, id: NodeId, path: &str) -> Result<NodeId> {
        let mut cur = id;
        self.live(cur)?;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            let sym = Symbol::intern(seg);
            let found = self
                .live(cur)?
                .children
                .iter()
                .copied()
                .find(|&c| self.get(c).is_some_and(|n| n.name == sym));
            cur = match found {
                Some(c) => c,
                None => self.create_key(cur, seg)?,
            };
        }
        Ok(cur)
    }

    // ---- structural edits ----

    /// Appends a detached node as the last child of `parent`.
    pub fn add_sub_key(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.live(parent)?;
        self.require_detached(child)?;
        if parent == child {
            return Err(Error::tree("node cannot be its own child"));
        }
        self.attach(parent, child);
        Ok(())
    }

    /// Inserts a detached node before the `index`th child (appends when past the end).
    pub fn insert_sub_key(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.live(parent)?;
        self.require_detached(child)?;
        let p = self.live_mut(parent)?;
        let at = index.min(p.children.len());
        p.children.insert(at, child);
        self.live_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn contains_sub_key(&self, parent: NodeId, child: NodeId) -> bool {
        self.position_in(parent, child).is_some()
    }

    /// Unlinks `child` without destroying it. The caller now holds the only
    /// reference and may re-add it or [`KvTree::delete`] it.
    pub fn remove_sub_key(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(pos) = self.position_in(parent, child) else {
            return false;
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.remove(pos);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = None;
        }
        true
    }

    /// Puts detached `new` where `existing` was. `existing` becomes detached.
    pub fn swap_sub_key(&mut self, parent: NodeId, existing: NodeId, new: NodeId) -> Result<()> {
        self.require_detached(new)?;
        let pos = self
            .position_in(parent, existing)
            .ok_or_else(|| Error::tree("swap target is not a child"))?;
        self.live_mut(parent)?.children[pos] = new;
        self.live_mut(existing)?.parent = None;
        self.live_mut(new)?.parent = Some(parent);
        Ok(())
    }

    /// Removes `child` and splices its children into its place, in order.
    pub fn elide_sub_key(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let pos = self
            .position_in(parent, child)
            .ok_or_else(|| Error::tree("elided node is not a child"))?;
        let grandchildren = std::mem::take(&mut self.live_mut(child)?.children);
        for &g in &grandchildren {
            if let Some(n) = self.get_mut(g) {
                n.parent = Some(parent);
            }
        }
        self.live_mut(parent)?
            .children
            .splice(pos..=pos, grandchildren)
            .for_each(drop);
        self.release(child);
        Ok(())
    }

    /// Unlinks and frees `id` with its subtree. The only root cannot go.
    pub fn delete(&mut self, id: NodeId) -> Result<()> {
        let parent = self.live(id)?.parent;
        if let Some(p) = parent {
            self.remove_sub_key(p, id);
        } else if let Some(pos) = self.top_level.iter().position(|&t| t == id) {
            if self.top_level.len() == 1 {
                return Err(Error::tree("cannot delete the only root"));
            }
            self.top_level.remove(pos);
        }
        self.free_subtree(id);
        Ok(())
    }

    /// Drops all children and the node's own value.
    pub fn clear(&mut self, id: NodeId) -> Result<()> {
        let node = self.live_mut(id)?;
        let children = std::mem::take(&mut node.children);
        node.value = Value::None;
        for c in children {
            self.free_subtree(c);
        }
        Ok(())
    }

    /// Sets the fallback consulted when a lookup under `id` misses. `None` unchains.
    pub fn chain_key_values(&mut self, id: NodeId, chain: Option<NodeId>) -> Result<()> {
        let link = match chain {
            Some(c) => {
                self.live(c)?;
                Some(ChainLink {
                    tree: self.id,
                    node: c,
                })
            }
            None => None,
        };
        self.live_mut(id)?.chain = link;
        Ok(())
    }

    /// Chains `id` to node `target` of another tree. Nothing is copied: later
    /// edits to `other` show through any view linked to it.
    pub fn chain_to_tree(&mut self, id: NodeId, other: &KvTree, target: NodeId) -> Result<()> {
        other.live(target)?;
        self.live_mut(id)?.chain = Some(ChainLink {
            tree: other.id,
            node: target,
        });
        Ok(())
    }

    pub fn chain_link(&self, id: NodeId) -> Option<ChainLink> {
        self.get(id)?.chain
    }

    // ---- values ----

    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<()> {
        let (sym, exact) = (Symbol::intern(name), Symbol::intern_exact(name));
        let node = self.live_mut(id)?;
        node.name = sym;
        node.name_exact = exact;
        Ok(())
    }

    /// Replaces the node's own value.
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<()> {
        self.live_mut(id)?.value = value;
        Ok(())
    }

    pub fn set_string_value(&mut self, id: NodeId, value: &str) -> Result<()> {
        self.set_value(id, Value::String(value.to_string()))
    }

    fn set_keyed(&mut self, id: NodeId, key: &str, value: Value) -> Result<()> {
        let target = self.find_or_create(id, key)?;
        self.set_value(target, value)
    }

    /// Sets `key` (a `/` path below `id`, or `""` for `id` itself), creating it when absent.
    pub fn set_string(&mut self, id: NodeId, key: &str, value: &str) -> Result<()> {
        self.set_keyed(id, key, Value::String(value.to_string()))
    }

    pub fn set_wstring(&mut self, id: NodeId, key: &str, value: &str) -> Result<()> {
        self.set_keyed(id, key, Value::WString(value.to_string()))
    }

    pub fn set_int(&mut self, id: NodeId, key: &str, value: i32) -> Result<()> {
        self.set_keyed(id, key, Value::Int(value))
    }

    pub fn set_uint64(&mut self, id: NodeId, key: &str, value: u64) -> Result<()> {
        self.set_keyed(id, key, Value::Uint64(value))
    }

    pub fn set_float(&mut self, id: NodeId, key: &str, value: f32) -> Result<()> {
        self.set_keyed(id, key, Value::Float(value))
    }

    pub fn set_ptr(&mut self, id: NodeId, key: &str, value: usize) -> Result<()> {
        self.set_keyed(id, key, Value::Ptr(value))
    }

    pub fn set_color(&mut self, id: NodeId, key: &str, value: Color) -> Result<()> {
        self.set_keyed(id, key, Value::Color(value))
    }

    pub fn set_bool(&mut self, id: NodeId, key: &str, value: bool) -> Result<()> {
        self.set_int(id, key, i32::from(value))
    }

    // ---- copies ----

    /// Deep-copies node `src_id` of `src` into this arena as a detached node.
    /// Chain links are not copied.
    pub fn copy_from(&mut self, src: &KvTree, src_id: NodeId) -> Result<NodeId> {
        let n = src.live(src_id)?;
        let mut copy = Node::with_symbols(n.name, n.name_exact);
        copy.value = n.value.clone();
        let id = self.alloc(copy);
        let mut stack = vec![(src_id, id)];
        while let Some((from, to)) = stack.pop() {
            let Some(from_node) = src.get(from) else {
                continue;
            };
            for &c in &from_node.children {
                let Some(cn) = src.get(c) else {
                    continue;
                };
                let mut copy = Node::with_symbols(cn.name, cn.name_exact);
                copy.value = cn.value.clone();
                let new = self.alloc(copy);
                self.attach(to, new);
                stack.push((c, new));
            }
        }
        Ok(id)
    }

    /// Same-arena deep copy, detached.
    pub fn duplicate(&mut self, id: NodeId) -> Result<NodeId> {
        let snapshot = self.make_copy(id)?;
        self.copy_from(&snapshot, snapshot.root())
    }

    /// A new independent tree rooted at a copy of `id`.
    pub fn make_copy(&self, id: NodeId) -> Result<KvTree> {
        let n = self.live(id)?;
        let mut out = KvTree {
            id: TreeId::fresh(),
            slots: Vec::new(),
            free: Vec::new(),
            top_level: Vec::new(),
            escapes: self.escapes,
        };
        let mut root = Node::with_symbols(n.name, n.name_exact);
        root.value = n.value.clone();
        let root_id = out.alloc(root);
        out.top_level.push(root_id);
        for &c in &n.children {
            let copied = out.copy_from(self, c)?;
            out.attach(root_id, copied);
        }
        Ok(out)
    }

    /// Copies every child of `id` onto the end of `dest_parent` in `dest`.
    pub fn copy_subkeys(&self, id: NodeId, dest: &mut KvTree, dest_parent: NodeId) -> Result<()> {
        dest.live(dest_parent)?;
        for &c in &self.live(id)?.children {
            let copied = dest.copy_from(self, c)?;
            dest.attach(dest_parent, copied);
        }
        Ok(())
    }

    /// Structural equality: names (case-insensitive), values and child order.
    pub fn is_equal(&self, id: NodeId, other: &KvTree, other_id: NodeId) -> bool {
        let mut pending = vec![(id, other_id)];
        while let Some((x, y)) = pending.pop() {
            let (Some(a), Some(b)) = (self.get(x), other.get(y)) else {
                return false;
            };
            if a.name != b.name
                || !a.value.same_as(&b.value)
                || a.children.len() != b.children.len()
            {
                return false;
            }
            pending.extend(a.children.iter().copied().zip(b.children.iter().copied()));
        }
        true
    }

    /// Whole-tree equality over every top-level block.
    pub fn tree_eq(&self, other: &KvTree) -> bool {
        self.top_level.len() == other.top_level.len()
            && self
                .top_level
                .iter()
                .zip(&other.top_level)
                .all(|(&a, &b)| self.is_equal(a, other, b))
    }

    /// Resolution-specific overrides: a key named `<base><suffix>` (suffix
    /// compared case-insensitively) replaces its sibling `<base>`. Recurses
    /// into every child first.
    pub fn process_resolution_keys(&mut self, id: NodeId, suffix: &str) -> bool {
        if suffix.is_empty() {
            return false;
        }
        let Some(children) = self.get(id).map(|n| n.children.clone()) else {
            return false;
        };
        if children.is_empty() {
            return false;
        }
        let suffix_lower = suffix.to_ascii_lowercase();
        for kid in children {
            if !self.contains_sub_key(id, kid) {
                continue;
            }
            self.process_resolution_keys(kid, suffix);
            let Some(name) = self.get(kid).map(|n| n.name.resolve()) else {
                continue;
            };
            if name.len() <= suffix.len() || !name.to_ascii_lowercase().ends_with(&suffix_lower) {
                continue;
            }
            let Some(base) = name.get(..name.len() - suffix.len()) else {
                continue;
            };
            let base_sym = Symbol::intern(base);
            let original = self.get(id).and_then(|n| {
                n.children
                    .iter()
                    .copied()
                    .find(|&c| c != kid && self.get(c).is_some_and(|cn| cn.name == base_sym))
            });
            if let Some(orig) = original
                && let Err(e) = self.delete(orig)
            {
                tracing::warn!(key = %base, error = %e, "could not drop the overridden key");
                continue;
            }
            if let Err(e) = self.set_name(kid, base) {
                tracing::warn!(key = %name, error = %e, "could not rename resolution key");
            }
        }
        true
    }
}
