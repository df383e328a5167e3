use std::collections::HashMap;

use crate::binary::{BinaryFormat, MAX_DEPTH, POOLED_SENTINEL, VALUE_WITH_CHILDREN, is_hollow};
use crate::buffer::ByteWriter;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::node::NodeRef;
use crate::tree::KvTree;
use crate::value::{DataType, Value};

#[derive(Default)]
struct Pool {
    index: HashMap<String, usize>,
    strings: Vec<String>,
}

impl Pool {
    fn slot(&mut self, s: &str) -> usize {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len();
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }
}

struct Encoder {
    w: ByteWriter,
    pool: Option<Pool>,
    filtered: bool,
}

fn no_nul(s: &str, what: &str) -> Result<()> {
    if s.contains('\0') {
        return Err(Error::Unrepresentable(format!("{what} {s:?} contains NUL")));
    }
    Ok(())
}

impl Encoder {
    fn new(format: BinaryFormat, filtered: bool) -> Self {
        Self {
            w: ByteWriter::new(),
            pool: matches!(format, BinaryFormat::Pooled).then(Pool::default),
            filtered,
        }
    }

    fn write_name(&mut self, name: &str) -> Result<()> {
        match &mut self.pool {
            Some(pool) => {
                no_nul(name, "key name")?;
                let i = pool.slot(name);
                self.w.write_7(i);
            }
            None => self.w.write_lp_str(name),
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        no_nul(s, "string")?;
        match &mut self.pool {
            Some(pool) => {
                let i = pool.slot(s);
                self.w.write_7(i);
            }
            None => self.w.write_cstr(s),
        }
        Ok(())
    }

    fn write_node(&mut self, node: NodeRef<'_>, level: usize) -> Result<()> {
        let name = node.exact_name();
        if level > MAX_DEPTH {
            return Err(Error::Unrepresentable(format!(
                "key {name:?} is nested deeper than {MAX_DEPTH}"
            )));
        }
        let value = node.value();
        if value.is_none() {
            self.w.push(DataType::None as u8);
            self.write_name(&name)?;
            return self.write_list(node, level + 1);
        }
        if node.has_children() {
            self.w.push(VALUE_WITH_CHILDREN);
        }
        let kind = match value {
            Value::Int(0) => DataType::CompiledInt0,
            Value::Int(1) => DataType::CompiledInt1,
            Value::Int(v) if i8::try_from(*v).is_ok() => DataType::CompiledIntByte,
            v => v.data_type(),
        };
        self.w.push(kind as u8);
        self.write_name(&name)?;
        match value {
            Value::None | Value::Int(0 | 1) => {}
            Value::Int(v) if kind == DataType::CompiledIntByte => self.w.write_i8(*v as i8),
            Value::Int(v) => self.w.write_i32(*v),
            Value::Float(f) => self.w.write_f32(*f),
            Value::Uint64(v) => self.w.write_u64(*v),
            Value::Ptr(p) => self.w.write_usize(*p),
            Value::Color(c) => self.w.write_bytes(&c.to_bytes()),
            Value::String(s) => self.write_string(s)?,
            Value::WString(s) => {
                no_nul(s, "wide string")?;
                self.w.write_wstr(s);
            }
        }
        if node.has_children() {
            self.write_list(node, level + 1)?;
        }
        Ok(())
    }

    fn write_list(&mut self, parent: NodeRef<'_>, level: usize) -> Result<()> {
        for child in parent.children() {
            if self.filtered && is_hollow(child) {
                continue;
            }
            self.write_node(child, level)?;
        }
        self.w.push(DataType::NUM_TYPES);
        Ok(())
    }

    fn run(mut self, tree: &KvTree) -> Result<Vec<u8>> {
        for &id in tree.top_level() {
            if let Some(n) = tree.node(id) {
                self.write_node(n, 0)?;
            }
        }
        self.w.push(DataType::NUM_TYPES);

        let Some(pool) = self.pool else {
            return Ok(self.w.into_inner());
        };
        let mut head = ByteWriter::new();
        head.push(POOLED_SENTINEL);
        head.write_7(pool.strings.len());
        for s in &pool.strings {
            head.write_cstr(s);
        }
        head.write_bytes(self.w.as_slice());
        Ok(head.into_inner())
    }
}

/// Encodes every top-level block.
pub fn encode(tree: &KvTree, format: BinaryFormat) -> Result<Vec<u8>> {
    Encoder::new(format, false).run(tree)
}

/// Like [`encode`] but skips descendants that hold no value anywhere below
/// them. Meant for storage, not exact round trips.
pub fn encode_filtered(tree: &KvTree, format: BinaryFormat) -> Result<Vec<u8>> {
    Encoder::new(format, true).run(tree)
}

pub fn save_binary(
    tree: &KvTree,
    fs: &dyn FileSystem,
    name: &str,
    format: BinaryFormat,
) -> Result<()> {
    let data = encode(tree, format)?;
    fs.save(name, &data)
}
