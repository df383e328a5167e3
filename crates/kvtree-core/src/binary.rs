//! Binary stream reader.
//!
//! A stream is a node list: per node a type byte, the name, then the payload.
//! `NONE` nodes are followed by their own child list. A node holding a value
//! and children is prefixed with [`VALUE_WITH_CHILDREN`] and its child list
//! follows the payload. Every list ends with a `NUM_TYPES` byte. Pooled
//! streams start with [`POOLED_SENTINEL`], a varint string count and that
//! many NUL-terminated strings; names and string values are then varint
//! indices into that pool.
//!
//! Payloads: `INT`/`FLOAT`/`COLOR` 4 bytes, `UINT64` 8, `PTR` native pointer
//! width (streams with pointers do not move between 32 and 64 bit hosts),
//! `STRING` NUL-terminated, `WSTRING` zero-terminated UTF-16LE. The compiled
//! int kinds carry 0 or 1 byte and are read back as `INT`.
use crate::buffer::ByteReader;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::node::NodeRef;
use crate::tree::{KvTree, NodeId};
use crate::value::{Color, DataType, Value};

/// First byte of a pooled stream. Never a valid type byte.
pub const POOLED_SENTINEL: u8 = 0xAA;

/// Deepest node level (top-level blocks are level 0) either codec accepts.
pub const MAX_DEPTH: usize = 100;

/// Marks a scalar node that also owns a child list.
pub const VALUE_WITH_CHILDREN: u8 = DataType::NUM_TYPES + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryFormat {
    /// Names and strings inline.
    #[default]
    Direct,
    /// Names and strings as indices into a leading string pool.
    Pooled,
}

pub fn is_pooled(data: &[u8]) -> bool {
    data.first() == Some(&POOLED_SENTINEL)
}

struct Decoder<'a> {
    r: ByteReader<'a>,
    pool: Option<Vec<&'a str>>,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let mut pool = None;
        if is_pooled(data) {
            r.read_u8()?;
            let count = r.read_7bit_len()?;
            let mut strings = Vec::with_capacity(count.min(r.remaining()));
            for _ in 0..count {
                strings.push(r.read_cstr()?);
            }
            pool = Some(strings);
        }
        Ok(Self { r, pool })
    }

    fn pooled(&mut self) -> Result<Option<&'a str>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };
        let at = self.r.pos();
        let idx = self.r.read_7bit_len()?;
        let len = pool.len();
        pool.get(idx)
            .copied()
            .map(Some)
            .ok_or_else(|| Error::decode(at, format!("string index {idx} outside pool of {len}")))
    }

    fn read_name(&mut self) -> Result<&'a str> {
        match self.pooled()? {
            Some(s) => Ok(s),
            None => self.r.read_lp_string(),
        }
    }

    fn read_string(&mut self) -> Result<&'a str> {
        match self.pooled()? {
            Some(s) => Ok(s),
            None => self.r.read_cstr(),
        }
    }

    fn read_value(&mut self, kind: DataType) -> Result<Value> {
        Ok(match kind {
            DataType::None => Value::None,
            DataType::String => Value::String(self.read_string()?.to_string()),
            DataType::WString => Value::WString(self.r.read_wstr()?),
            DataType::Int => Value::Int(self.r.read_i32()?),
            DataType::Float => Value::Float(self.r.read_f32()?),
            DataType::Uint64 => Value::Uint64(self.r.read_u64()?),
            DataType::Ptr => Value::Ptr(self.r.read_usize()?),
            DataType::Color => {
                let mut b = [0u8; 4];
                b.copy_from_slice(self.r.read_slice(4)?);
                Value::Color(Color::from_bytes(b))
            }
            DataType::CompiledIntByte => Value::Int(i32::from(self.r.read_i8()?)),
            DataType::CompiledInt0 => Value::Int(0),
            DataType::CompiledInt1 => Value::Int(1),
        })
    }

    /// Reads one node list. Top-level entries (`parent == None`) fill the
    /// root first and become peers after that.
    fn read_list(&mut self, tree: &mut KvTree, parent: Option<NodeId>, depth: usize) -> Result<()> {
        let mut root_free = parent.is_none();
        loop {
            let at = self.r.pos();
            let mut tag = self.r.read_u8()?;
            if tag == DataType::NUM_TYPES {
                return Ok(());
            }
            if depth > MAX_DEPTH {
                return Err(Error::decode(at, format!("nesting deeper than {MAX_DEPTH}")));
            }
            let with_children = tag == VALUE_WITH_CHILDREN;
            if with_children {
                tag = self.r.read_u8()?;
            }
            let kind = DataType::from_u8(tag)
                .ok_or_else(|| Error::decode(at, format!("unknown type byte {tag:#x}")))?;
            if with_children && kind == DataType::None {
                return Err(Error::decode(at, "child list marker on a NONE node"));
            }
            let name = self.read_name()?;
            let id = match parent {
                Some(p) => tree.create_key(p, name)?,
                None if root_free => {
                    root_free = false;
                    let root = tree.root();
                    tree.set_name(root, name)?;
                    root
                }
                None => {
                    let peer = tree.create_node(name);
                    tree.push_top_level(peer);
                    peer
                }
            };
            if kind == DataType::None {
                self.read_list(tree, Some(id), depth + 1)?;
            } else {
                let value = self.read_value(kind)?;
                tree.set_value(id, value)?;
                if with_children {
                    self.read_list(tree, Some(id), depth + 1)?;
                }
            }
        }
    }
}

/// Decodes a direct or pooled stream, picking the variant from the first byte.
pub fn decode(data: &[u8]) -> Result<KvTree> {
    let mut tree = KvTree::new("");
    if data.is_empty() {
        return Ok(tree);
    }
    let mut d = Decoder::new(data)?;
    d.read_list(&mut tree, None, 0)?;
    if d.r.remaining() > 0 {
        tracing::debug!(
            trailing = d.r.remaining(),
            "ignoring bytes after binary end marker"
        );
    }
    Ok(tree)
}

/// [`decode`], then drop every node below the top level that holds neither a
/// value nor a non-empty child.
pub fn decode_filtered(data: &[u8]) -> Result<KvTree> {
    let mut tree = decode(data)?;
    for id in tree.top_level().to_vec() {
        prune_hollow(&mut tree, id)?;
    }
    Ok(tree)
}

/// No value anywhere in the subtree.
pub(crate) fn is_hollow(node: NodeRef<'_>) -> bool {
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        if !n.value().is_none() {
            return false;
        }
        stack.extend(n.children());
    }
    true
}

fn prune_hollow(tree: &mut KvTree, id: NodeId) -> Result<()> {
    let kids: Vec<NodeId> = match tree.node(id) {
        Some(n) => n.children().map(|c| c.id()).collect(),
        None => return Ok(()),
    };
    for kid in kids {
        let hollow = tree.node(kid).is_some_and(is_hollow);
        if hollow {
            tree.delete(kid)?;
        } else {
            prune_hollow(tree, kid)?;
        }
    }
    Ok(())
}

pub fn load_binary(fs: &dyn FileSystem, name: &str) -> Result<KvTree> {
    decode(&fs.load(name)?)
}
