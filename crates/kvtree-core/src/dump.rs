//! Visitor walk for pretty-printers and loggers.
use std::fmt::Write as _;

use crate::binary::MAX_DEPTH;
use crate::error::{Error, Result};
use crate::node::NodeRef;
use crate::tree::KvTree;
use crate::value::Value;

/// Receives a tree walk. Returning an error stops the walk.
pub trait DumpContext {
    fn begin_key(&mut self, key: NodeRef<'_>, indent: usize) -> Result<()>;
    fn write_value(&mut self, value: NodeRef<'_>, indent: usize) -> Result<()>;
    fn end_key(&mut self, key: NodeRef<'_>, indent: usize) -> Result<()>;
}

/// Walks `node`: its valued children first, then its sub-blocks.
pub fn dump(node: NodeRef<'_>, ctx: &mut dyn DumpContext, indent: usize) -> Result<()> {
    walk(node, ctx, indent, 0)
}

fn walk(node: NodeRef<'_>, ctx: &mut dyn DumpContext, indent: usize, level: usize) -> Result<()> {
    if level > MAX_DEPTH {
        return Err(Error::Unrepresentable(format!(
            "key {:?} is nested deeper than {MAX_DEPTH}",
            node.exact_name()
        )));
    }
    ctx.begin_key(node, indent)?;
    let mut v = node.first_value();
    while let Some(n) = v {
        ctx.write_value(n, indent + 1)?;
        v = n.next_value();
    }
    let mut k = node.first_true_sub_key();
    while let Some(n) = k {
        walk(n, ctx, indent + 1, level + 1)?;
        k = n.next_true_sub_key();
    }
    ctx.end_key(node, indent)
}

/// Dumps every top-level block.
pub fn dump_tree(tree: &KvTree, ctx: &mut dyn DumpContext) -> Result<()> {
    for &id in tree.top_level() {
        if let Some(n) = tree.node(id) {
            dump(n, ctx, 0)?;
        }
    }
    Ok(())
}

fn value_line(node: NodeRef<'_>) -> String {
    let shown = match node.value() {
        Value::String(s) | Value::WString(s) => format!("\"{s}\""),
        Value::Color(c) => format!("color({c})"),
        Value::Ptr(p) => format!("ptr({p:#x})"),
        v => v.to_text().unwrap_or_default(),
    };
    format!("\"{}\" {shown}", node.exact_name())
}

/// Collects an indented text rendering.
#[derive(Debug, Default)]
pub struct TextDump {
    pub out: String,
}

impl TextDump {
    fn line(&mut self, indent: usize, text: &str) {
        let _ = writeln!(self.out, "{:width$}{text}", "", width = indent * 2);
    }
}

impl DumpContext for TextDump {
    fn begin_key(&mut self, key: NodeRef<'_>, indent: usize) -> Result<()> {
        self.line(indent, &format!("\"{}\"", key.exact_name()));
        self.line(indent, "{");
        Ok(())
    }

    fn write_value(&mut self, value: NodeRef<'_>, indent: usize) -> Result<()> {
        self.line(indent, &value_line(value));
        Ok(())
    }

    fn end_key(&mut self, _key: NodeRef<'_>, indent: usize) -> Result<()> {
        self.line(indent, "}");
        Ok(())
    }
}

/// Sends each dump line to `tracing` at info level.
#[derive(Debug, Default)]
pub struct LogDump {
    lines: usize,
}

impl LogDump {
    pub fn lines_written(&self) -> usize {
        self.lines
    }

    fn emit(&mut self, indent: usize, text: &str) {
        self.lines += 1;
        tracing::info!(target: "kvtree::dump", "{:width$}{text}", "", width = indent * 2);
    }
}

impl DumpContext for LogDump {
    fn begin_key(&mut self, key: NodeRef<'_>, indent: usize) -> Result<()> {
        self.emit(indent, &format!("\"{}\" {{", key.exact_name()));
        Ok(())
    }

    fn write_value(&mut self, value: NodeRef<'_>, indent: usize) -> Result<()> {
        self.emit(indent, &value_line(value));
        Ok(())
    }

    fn end_key(&mut self, _key: NodeRef<'_>, indent: usize) -> Result<()> {
        self.emit(indent, "}");
        Ok(())
    }
}
