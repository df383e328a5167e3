//! Read-only node view: typed getters, navigation and lookup.
//!
//! Every getter is total. A missing key, a stale handle or a value of the
//! wrong kind yields the caller's default.
use std::borrow::Cow;
use std::fmt;

use crate::symbol::{self, Symbol};
use crate::tree::{KvTree, Node, NodeId};
use crate::value::{Color, DataType, Value};

/// Chains deeper than this are treated as cycles and stop the lookup.
const MAX_CHAIN_HOPS: usize = 64;

/// A node in a tree, plus the other trees its chains may lead into.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a KvTree,
    id: NodeId,
    linked: &'a [&'a KvTree],
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("value", self.value())
            .finish()
    }
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(tree: &'a KvTree, id: NodeId) -> Self {
        Self {
            tree,
            id,
            linked: &[],
        }
    }

    /// The same node, with chains into any of `trees` followed on lookup.
    /// Chains into trees not listed here are skipped.
    pub fn with_linked(self, trees: &'a [&'a KvTree]) -> Self {
        Self {
            linked: trees,
            ..self
        }
    }

    fn raw(&self) -> Option<&'a Node> {
        self.tree.get(self.id)
    }

    fn at(&self, id: NodeId) -> NodeRef<'a> {
        NodeRef {
            tree: self.tree,
            id,
            linked: self.linked,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a KvTree {
        self.tree
    }

    pub fn name(&self) -> String {
        self.raw().map(|n| n.name.resolve()).unwrap_or_default()
    }

    /// Name with the casing it was created with.
    pub fn exact_name(&self) -> String {
        self.raw().map(|n| n.name_exact.resolve()).unwrap_or_default()
    }

    pub fn name_symbol(&self) -> Option<Symbol> {
        self.raw().map(|n| n.name)
    }

    pub fn name_symbol_case_sensitive(&self) -> Option<Symbol> {
        self.raw().map(|n| n.name_exact)
    }

    pub fn value(&self) -> &'a Value {
        static NONE: Value = Value::None;
        self.raw().map_or(&NONE, |n| &n.value)
    }

    pub fn data_type(&self) -> DataType {
        self.value().data_type()
    }

    pub fn has_children(&self) -> bool {
        self.raw().is_some_and(|n| !n.children.is_empty())
    }

    pub fn is_interior(&self) -> bool {
        self.has_children()
    }

    pub fn is_leaf(&self) -> bool {
        !self.has_children()
    }

    /// No value and no children.
    pub fn is_empty_node(&self) -> bool {
        self.value().is_none() && !self.has_children()
    }

    // ---- navigation ----

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.raw()?.parent.map(|p| self.at(p))
    }

    /// The chained fallback node, when its tree is reachable from this view
    /// and the node still exists.
    pub fn chain(&self) -> Option<NodeRef<'a>> {
        let link = self.raw()?.chain?;
        let tree = if link.tree == self.tree.tree_id() {
            self.tree
        } else {
            self.linked
                .iter()
                .copied()
                .find(|t| t.tree_id() == link.tree)?
        };
        tree.get(link.node)?;
        Some(NodeRef {
            tree,
            id: link.node,
            linked: self.linked,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        let this = *self;
        self.raw()
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |&c| this.at(c))
    }

    pub fn child_count(&self) -> usize {
        self.raw().map_or(0, |n| n.children.len())
    }

    pub fn first_sub_key(&self) -> Option<NodeRef<'a>> {
        self.children().next()
    }

    pub fn find_last_sub_key(&self) -> Option<NodeRef<'a>> {
        self.children().last()
    }

    /// Next sibling under the same parent, or the next top-level block.
    pub fn next_key(&self) -> Option<NodeRef<'a>> {
        let siblings: &[NodeId] = match self.raw()?.parent {
            Some(p) => &self.tree.get(p)?.children,
            None => self.tree.top_level(),
        };
        let pos = siblings.iter().position(|&s| s == self.id)?;
        siblings.get(pos + 1).map(|&s| self.at(s))
    }

    fn next_matching(&self, pred: impl Fn(&NodeRef<'a>) -> bool) -> Option<NodeRef<'a>> {
        let mut cur = self.next_key();
        while let Some(n) = cur {
            if pred(&n) {
                return Some(n);
            }
            cur = n.next_key();
        }
        None
    }

    /// First child holding no value (a sub-block).
    pub fn first_true_sub_key(&self) -> Option<NodeRef<'a>> {
        self.children().find(|c| c.value().is_none())
    }

    pub fn next_true_sub_key(&self) -> Option<NodeRef<'a>> {
        self.next_matching(|n| n.value().is_none())
    }

    /// First child holding a value.
    pub fn first_value(&self) -> Option<NodeRef<'a>> {
        self.children().find(|c| !c.value().is_none())
    }

    pub fn next_value(&self) -> Option<NodeRef<'a>> {
        self.next_matching(|n| !n.value().is_none())
    }

    /// First child of the given kind.
    pub fn first_of_data_type(&self, kind: DataType) -> Option<NodeRef<'a>> {
        self.children().find(|c| c.data_type() == kind)
    }

    pub fn next_of_data_type(&self, kind: DataType) -> Option<NodeRef<'a>> {
        self.next_matching(|n| n.data_type() == kind)
    }

    // ---- lookup ----

    fn find_child(&self, matches: impl Fn(&Node) -> bool) -> Option<NodeRef<'a>> {
        let mut cur = *self;
        for _ in 0..MAX_CHAIN_HOPS {
            let node = cur.raw()?;
            let local = node
                .children
                .iter()
                .copied()
                .find(|&c| cur.tree.get(c).is_some_and(&matches));
            if let Some(c) = local {
                return Some(cur.at(c));
            }
            cur = cur.chain()?;
        }
        tracing::warn!(node = %self.name(), "chain lookup gave up; chain probably cycles");
        None
    }

    /// Looks up a `/`-separated path. `""` is this node. Each segment falls
    /// back to the chain when it misses locally.
    pub fn find_key(&self, path: &str) -> Option<NodeRef<'a>> {
        let mut cur = *self;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            let sym = symbol::global().find(seg)?;
            cur = cur.find_child(|n| n.name == sym)?;
        }
        Some(cur)
    }

    pub fn find_symbol(&self, sym: Symbol) -> Option<NodeRef<'a>> {
        self.find_child(|n| n.name == sym)
    }

    /// Single-segment lookup that respects casing.
    pub fn find_key_case_sensitive(&self, name: &str) -> Option<NodeRef<'a>> {
        let sym = symbol::global().find_exact(name)?;
        self.find_child(|n| n.name_exact == sym)
    }

    // ---- own value ----

    pub fn int(&self, default: i32) -> i32 {
        self.value().as_int().unwrap_or(default)
    }

    pub fn uint64(&self, default: u64) -> u64 {
        self.value().as_uint64().unwrap_or(default)
    }

    pub fn float(&self, default: f32) -> f32 {
        self.value().as_float().unwrap_or(default)
    }

    pub fn string<'d>(&self, default: &'d str) -> Cow<'d, str>
    where
        'a: 'd,
    {
        match self.value() {
            Value::String(s) | Value::WString(s) => Cow::Borrowed(s.as_str()),
            v => v.to_text().map_or(Cow::Borrowed(default), Cow::Owned),
        }
    }

    /// UTF-16 form of the string value.
    pub fn wstring(&self, default: &str) -> Vec<u16> {
        self.string(default).encode_utf16().collect()
    }

    pub fn ptr(&self, default: usize) -> usize {
        match self.value() {
            Value::Ptr(p) => *p,
            _ => default,
        }
    }

    pub fn color(&self, default: Color) -> Color {
        self.value().as_color().unwrap_or(default)
    }

    pub fn bool(&self, default: bool) -> bool {
        self.int(i32::from(default)) != 0
    }

    // ---- keyed getters ----

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.find_key(key).map_or(default, |n| n.int(default))
    }

    pub fn get_uint64(&self, key: &str, default: u64) -> u64 {
        self.find_key(key).map_or(default, |n| n.uint64(default))
    }

    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.find_key(key).map_or(default, |n| n.float(default))
    }

    pub fn get_string<'d>(&self, key: &str, default: &'d str) -> Cow<'d, str>
    where
        'a: 'd,
    {
        match self.find_key(key) {
            Some(n) => n.string(default),
            None => Cow::Borrowed(default),
        }
    }

    pub fn get_wstring(&self, key: &str, default: &str) -> Vec<u16> {
        self.get_string(key, default).encode_utf16().collect()
    }

    pub fn get_ptr(&self, key: &str, default: usize) -> usize {
        self.find_key(key).map_or(default, |n| n.ptr(default))
    }

    pub fn get_color(&self, key: &str, default: Color) -> Color {
        self.find_key(key).map_or(default, |n| n.color(default))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_int(key, i32::from(default)) != 0
    }

    /// True when `key` is absent or holds neither value nor children.
    pub fn is_empty(&self, key: &str) -> bool {
        self.find_key(key).is_none_or(|n| n.is_empty_node())
    }

    pub fn get_data_type(&self, key: &str) -> DataType {
        self.find_key(key).map_or(DataType::None, |n| n.data_type())
    }
}
