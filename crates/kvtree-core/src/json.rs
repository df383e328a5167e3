//! JSON bridge.
//!
//! A tree becomes an array of top-level node objects:
//!
//! ```json
//! [{ "$key": "root", "$children": [
//!     { "$key": "a", "$type": "int", "$value": 1 },
//!     { "$key": "tint", "$type": "color", "$value": [255, 0, 0, 255] }
//! ] }]
//! ```
//!
//! Arrays keep child order and repeated names, which a JSON object could not.
use serde_json::{Map, Value as J, json};

use crate::error::{Error, Result};
use crate::node::NodeRef;
use crate::tree::{KvTree, NodeId};
use crate::value::{Color, Value};

#[derive(Clone, Copy, Debug)]
pub struct JsonOpts {
    /// Blocks nested deeper than this are cut and marked `"$truncated"`.
    pub max_depth: usize,
}

impl Default for JsonOpts {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

fn node_json(node: NodeRef<'_>, depth: usize, opts: &JsonOpts) -> J {
    let mut obj = Map::new();
    obj.insert("$key".into(), J::String(node.exact_name()));
    let typed = match node.value() {
        Value::None => None,
        Value::String(s) => Some(("string", json!(s))),
        Value::WString(s) => Some(("wstring", json!(s))),
        Value::Int(v) => Some(("int", json!(v))),
        Value::Float(f) => Some(("float", json!(f))),
        Value::Uint64(v) => Some(("uint64", json!(v))),
        Value::Ptr(p) => Some(("ptr", json!(p))),
        Value::Color(c) => Some(("color", json!(c.to_bytes()))),
    };
    if let Some((kind, v)) = typed {
        obj.insert("$type".into(), J::String(kind.into()));
        obj.insert("$value".into(), v);
    }
    if node.has_children() {
        if depth >= opts.max_depth {
            obj.insert("$truncated".into(), json!(node.child_count()));
        } else {
            let kids: Vec<J> = node
                .children()
                .map(|c| node_json(c, depth + 1, opts))
                .collect();
            obj.insert("$children".into(), J::Array(kids));
        }
    }
    J::Object(obj)
}

pub fn to_json_value(tree: &KvTree, opts: JsonOpts) -> J {
    J::Array(
        tree.top_level()
            .iter()
            .filter_map(|&id| tree.node(id))
            .map(|n| node_json(n, 0, &opts))
            .collect(),
    )
}

pub fn to_json(tree: &KvTree, opts: JsonOpts) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json_value(tree, opts))?)
}

struct Reader<'s> {
    source_name: &'s str,
}

impl Reader<'_> {
    fn err(&self, msg: impl Into<String>) -> Error {
        Error::parse(self.source_name, 0, msg)
    }

    fn value(&self, key: &str, obj: &Map<String, J>) -> Result<Value> {
        let Some(kind) = obj.get("$type").and_then(J::as_str) else {
            return Ok(Value::None);
        };
        let v = obj.get("$value").unwrap_or(&J::Null);
        let bad = || self.err(format!("key {key:?}: bad {kind} value {v}"));
        Ok(match kind {
            "string" => Value::String(v.as_str().ok_or_else(bad)?.to_string()),
            "wstring" => Value::WString(v.as_str().ok_or_else(bad)?.to_string()),
            "int" => Value::Int(
                v.as_i64()
                    .and_then(|i| i32::try_from(i).ok())
                    .ok_or_else(bad)?,
            ),
            // non-finite floats are written as null
            "float" => Value::Float(if v.is_null() {
                f32::NAN
            } else {
                v.as_f64().ok_or_else(bad)? as f32
            }),
            "uint64" => Value::Uint64(v.as_u64().ok_or_else(bad)?),
            "ptr" => Value::Ptr(
                v.as_u64()
                    .and_then(|p| usize::try_from(p).ok())
                    .ok_or_else(bad)?,
            ),
            "color" => {
                let arr = v.as_array().filter(|a| a.len() == 4).ok_or_else(bad)?;
                let mut b = [0u8; 4];
                for (slot, ch) in b.iter_mut().zip(arr) {
                    *slot = ch
                        .as_u64()
                        .and_then(|c| u8::try_from(c).ok())
                        .ok_or_else(bad)?;
                }
                Value::Color(Color::from_bytes(b))
            }
            other => return Err(self.err(format!("key {key:?}: unknown type {other:?}"))),
        })
    }

    /// Fills `id` (already named) from `obj`.
    fn fill(&self, tree: &mut KvTree, id: NodeId, obj: &Map<String, J>, key: &str) -> Result<()> {
        tree.set_value(id, self.value(key, obj)?)?;
        let Some(kids) = obj.get("$children") else {
            return Ok(());
        };
        let kids = kids
            .as_array()
            .ok_or_else(|| self.err(format!("key {key:?}: $children must be an array")))?;
        for kid in kids {
            let (name, kobj) = self.entry(kid)?;
            let child = tree.create_key(id, name)?;
            self.fill(tree, child, kobj, name)?;
        }
        Ok(())
    }

    fn entry<'j>(&self, j: &'j J) -> Result<(&'j str, &'j Map<String, J>)> {
        let obj = j
            .as_object()
            .ok_or_else(|| self.err("node must be a JSON object"))?;
        let name = obj
            .get("$key")
            .and_then(J::as_str)
            .ok_or_else(|| self.err("node without a \"$key\" string"))?;
        Ok((name, obj))
    }
}

/// Rebuilds a tree from [`to_json_value`] output. A single node object is
/// accepted as well as an array of them.
pub fn from_json_value(source_name: &str, j: &J) -> Result<KvTree> {
    let r = Reader { source_name };
    let blocks: Vec<&J> = match j {
        J::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut tree = KvTree::new(source_name);
    for (i, block) in blocks.into_iter().enumerate() {
        let (name, obj) = r.entry(block)?;
        let id = if i == 0 {
            let root = tree.root();
            tree.set_name(root, name)?;
            root
        } else {
            let peer = tree.create_node(name);
            tree.push_top_level(peer);
            peer
        };
        r.fill(&mut tree, id, obj, name)?;
    }
    Ok(tree)
}

pub fn from_json(source_name: &str, text: &str) -> Result<KvTree> {
    let j: J = serde_json::from_str(text)?;
    from_json_value(source_name, &j)
}
