//! Text writer.
//!
//! Strings and names are always quoted, numbers are written bare so that a
//! re-parse infers the same kinds. Colors and wide strings come back as plain
//! strings, and pointer values are skipped. A block that also holds a value
//! is written as `"name" value` followed by its `{ }` body.
use std::fmt::Write as _;

use crate::binary::MAX_DEPTH;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::node::NodeRef;
use crate::tree::KvTree;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indent {
    Tab,
    Spaces(usize),
}

#[derive(Debug, Clone)]
pub struct TextWriter {
    pub indent: Indent,
    /// Escape `\ " newline tab`. Without it a `"` inside a string cannot be written.
    pub escapes: bool,
    /// Write nodes with neither value nor children as `"name" { }`.
    pub write_empty_subkeys: bool,
}

impl Default for TextWriter {
    fn default() -> Self {
        Self {
            indent: Indent::Tab,
            escapes: false,
            write_empty_subkeys: true,
        }
    }
}

impl TextWriter {
    /// Default options with the escape mode the tree was read with.
    pub fn for_tree(tree: &KvTree) -> Self {
        Self {
            escapes: tree.uses_escape_sequences(),
            ..Self::default()
        }
    }

    /// Every top-level block, in order.
    pub fn write_tree(&self, tree: &KvTree) -> Result<String> {
        let mut out = String::new();
        for &id in tree.top_level() {
            if let Some(n) = tree.node(id) {
                self.write_block(&mut out, n, 0)?;
            }
        }
        Ok(out)
    }

    pub fn write_node(&self, node: NodeRef<'_>) -> Result<String> {
        let mut out = String::new();
        self.write_block(&mut out, node, 0)?;
        Ok(out)
    }

    pub fn save(&self, tree: &KvTree, fs: &dyn FileSystem, name: &str) -> Result<()> {
        let text = self.write_tree(tree)?;
        fs.save(name, text.as_bytes())
    }

    fn pad(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            match self.indent {
                Indent::Tab => out.push('\t'),
                Indent::Spaces(n) => out.extend(std::iter::repeat_n(' ', n)),
            }
        }
    }

    fn quote(&self, out: &mut String, s: &str) -> Result<()> {
        out.push('"');
        for c in s.chars() {
            match c {
                '"' if self.escapes => out.push_str("\\\""),
                '"' => {
                    return Err(Error::Unrepresentable(format!(
                        "{s:?} contains '\"' and escapes are off"
                    )));
                }
                '\\' if self.escapes => out.push_str("\\\\"),
                '\n' if self.escapes => out.push_str("\\n"),
                '\t' if self.escapes => out.push_str("\\t"),
                c => out.push(c),
            }
        }
        out.push('"');
        Ok(())
    }

    fn name(&self, out: &mut String, node: NodeRef<'_>) -> Result<()> {
        let name = node.exact_name();
        if name.is_empty() {
            return Err(Error::Unrepresentable("empty key name".into()));
        }
        if name.eq_ignore_ascii_case("#include") || name.eq_ignore_ascii_case("#base") {
            return Err(Error::Unrepresentable(format!("key named {name}")));
        }
        self.quote(out, &name)
    }

    fn check_depth(&self, node: NodeRef<'_>, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::Unrepresentable(format!(
                "key {:?} is nested deeper than {MAX_DEPTH}",
                node.exact_name()
            )));
        }
        Ok(())
    }

    /// The value as it appears after the name, or `None` when nothing is written.
    fn scalar(&self, node: NodeRef<'_>) -> Result<Option<String>> {
        let mut line = String::new();
        match node.value() {
            Value::None => return Ok(None),
            Value::Ptr(_) => {
                tracing::trace!(key = %node.name(), "pointer value not written to text");
                return Ok(None);
            }
            Value::String(s) | Value::WString(s) => self.quote(&mut line, s)?,
            Value::Color(c) => self.quote(&mut line, &c.to_string())?,
            Value::Int(v) => {
                let _ = write!(line, "{v}");
            }
            Value::Float(f) => {
                let _ = write!(line, "{f:?}");
            }
            Value::Uint64(v) => {
                let _ = write!(line, "0x{v:016X}");
            }
        }
        Ok(Some(line))
    }

    fn write_block(&self, out: &mut String, node: NodeRef<'_>, depth: usize) -> Result<()> {
        self.check_depth(node, depth)?;
        self.pad(out, depth);
        self.name(out, node)?;
        if let Some(value) = self.scalar(node)? {
            out.push_str("\t\t");
            out.push_str(&value);
        }
        out.push('\n');
        self.pad(out, depth);
        out.push_str("{\n");
        for child in node.children() {
            self.write_entry(out, child, depth + 1)?;
        }
        self.pad(out, depth);
        out.push_str("}\n");
        Ok(())
    }

    fn write_entry(&self, out: &mut String, node: NodeRef<'_>, depth: usize) -> Result<()> {
        if node.has_children() {
            return self.write_block(out, node, depth);
        }
        if node.value().is_none() {
            if self.write_empty_subkeys {
                return self.write_block(out, node, depth);
            }
            return Ok(());
        }
        let Some(value) = self.scalar(node)? else {
            return Ok(());
        };
        self.check_depth(node, depth)?;
        self.pad(out, depth);
        self.name(out, node)?;
        out.push_str("\t\t");
        out.push_str(&value);
        out.push('\n');
        Ok(())
    }
}

/// Serializes every block with the tree's own escape mode.
pub fn to_text(tree: &KvTree) -> Result<String> {
    TextWriter::for_tree(tree).write_tree(tree)
}

/// Writes `tree` as text to `name` on `fs`.
pub fn save_to_file(
    tree: &KvTree,
    fs: &dyn FileSystem,
    name: &str,
    write_empty_subkeys: bool,
) -> Result<()> {
    TextWriter {
        write_empty_subkeys,
        ..TextWriter::for_tree(tree)
    }
    .save(tree, fs, name)
}
