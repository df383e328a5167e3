//! Text reader: tokenizer plus a block builder.
//!
//! ```text
//! "root"
//! {
//!     "name"    "value"
//!     count     3            // unquoted tokens get a numeric kind
//!     "windows" "1"  [$WIN]
//!     "nested"  { "k" "v" }
//!     "both"    "1" { "k" "v" }   // a block may carry a value too
//!     #include  "common.txt"
//!     #base     "defaults.txt"
//! }
//! ```
use crate::binary::MAX_DEPTH;
use crate::conditional::{self, Predicate};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, sibling_path};
use crate::merge;
use crate::tree::{KvTree, NodeId};
use crate::value::{Value, infer_scalar};

const MAX_INCLUDE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text { text: String, quoted: bool },
    Open,
    Close,
    Cond(String),
    Eof,
}

struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    line: usize,
    escapes: bool,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str, escapes: bool) -> Self {
        // in-memory sources are NUL-terminated; nothing after the first NUL is text
        let src = src.find('\0').map_or(src, |end| &src[..end]);
        Self {
            src,
            pos: 0,
            line: 1,
            escapes,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.src[self.pos..].starts_with("//") => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// Next token and the line it starts on.
    fn next(&mut self) -> std::result::Result<(Token, usize), (usize, String)> {
        self.skip_trivia();
        let line = self.line;
        let Some(c) = self.bump() else {
            return Ok((Token::Eof, line));
        };
        let tok = match c {
            '{' => Token::Open,
            '}' => Token::Close,
            '"' => Token::Text {
                text: self.quoted(line)?,
                quoted: true,
            },
            '[' => {
                let start = self.pos;
                loop {
                    match self.bump() {
                        Some(']') => break,
                        Some(_) => {}
                        None => return Err((line, "unterminated conditional".into())),
                    }
                }
                Token::Cond(self.src[start..self.pos - 1].trim().to_string())
            }
            _ => {
                let start = self.pos - c.len_utf8();
                while let Some(n) = self.peek_char() {
                    if n.is_whitespace() || matches!(n, '"' | '{' | '}' | '[') {
                        break;
                    }
                    self.bump();
                }
                Token::Text {
                    text: self.src[start..self.pos].to_string(),
                    quoted: false,
                }
            }
        };
        Ok((tok, line))
    }

    fn quoted(&mut self, line: usize) -> std::result::Result<String, (usize, String)> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err((line, "unterminated quoted string".into())),
                Some('"') => return Ok(out),
                Some('\\') if self.escapes => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err((line, "unterminated quoted string".into())),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Consumes a conditional if one comes next.
    fn take_cond(&mut self) -> std::result::Result<Option<(String, usize)>, (usize, String)> {
        let (pos, line) = (self.pos, self.line);
        match self.next()? {
            (Token::Cond(expr), l) => Ok(Some((expr, l))),
            _ => {
                self.pos = pos;
                self.line = line;
                Ok(None)
            }
        }
    }

    /// Consumes a `{` if one comes next.
    fn take_open(&mut self) -> std::result::Result<bool, (usize, String)> {
        let (pos, line) = (self.pos, self.line);
        match self.next()? {
            (Token::Open, _) => Ok(true),
            _ => {
                self.pos = pos;
                self.line = line;
                Ok(false)
            }
        }
    }
}

struct Frame {
    node: NodeId,
    discard: bool,
}

struct Deferred {
    target: NodeId,
    level: usize,
    path: String,
    line: usize,
}

/// Configurable text parser.
///
/// ```no_run
/// # use kvtree_core::text::TextReader;
/// let platform = |tok: &str| tok == "WIN";
/// let tree = TextReader::new("cfg.txt", "\"cfg\" { \"a\" \"1\" [$WIN] }")
///     .with_escapes(true)
///     .with_conditional(&platform)
///     .parse()?;
/// # Ok::<(), kvtree_core::Error>(())
/// ```
pub struct TextReader<'a> {
    source_name: String,
    src: &'a str,
    escapes: bool,
    predicate: Option<Predicate<'a>>,
    fs: Option<&'a dyn FileSystem>,
    depth: usize,
}

impl<'a> TextReader<'a> {
    pub fn new(source_name: &str, src: &'a str) -> Self {
        Self {
            source_name: source_name.to_string(),
            src,
            escapes: false,
            predicate: None,
            fs: None,
            depth: 0,
        }
    }

    /// Read `\n \t \\ \"` inside quotes as single characters.
    pub fn with_escapes(mut self, on: bool) -> Self {
        self.escapes = on;
        self
    }

    pub fn with_conditional(mut self, pred: Predicate<'a>) -> Self {
        self.predicate = Some(pred);
        self
    }

    /// Where `#include` and `#base` files come from. Paths are resolved
    /// relative to the including source.
    pub fn with_file_system(mut self, fs: &'a dyn FileSystem) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Parses `"name" { ... }` blocks. The first block becomes the root; any
    /// further top-level blocks are kept as its peers.
    pub fn parse(self) -> Result<KvTree> {
        self.parse_tracked().map(|(tree, _)| tree)
    }

    /// The tree, and whether any block filled its root.
    fn parse_tracked(self) -> Result<(KvTree, bool)> {
        let mut tree = KvTree::new(&self.source_name);
        tree.set_uses_escape_sequences(self.escapes);
        let filled = self.build(&mut tree, false)?;
        Ok((tree, filled))
    }

    /// Parses a bare `key value ...` body straight into a root named after the source.
    pub fn parse_body(self) -> Result<KvTree> {
        let mut tree = KvTree::new(&self.source_name);
        tree.set_uses_escape_sequences(self.escapes);
        self.build(&mut tree, true)?;
        Ok(tree)
    }

    fn err(&self, line: usize, msg: impl Into<String>) -> Error {
        Error::parse(self.source_name.clone(), line, msg)
    }

    fn lex_err(&self, (line, msg): (usize, String)) -> Error {
        self.err(line, msg)
    }

    fn keep(&self, expr: &str, line: usize) -> Result<bool> {
        let keep = conditional::evaluate(expr, self.predicate).map_err(|m| self.err(line, m))?;
        if !keep {
            tracing::trace!(
                source = %self.source_name,
                line,
                condition = %expr,
                "discarding conditional entry"
            );
        }
        Ok(keep)
    }

    fn check_nesting(&self, level: usize, line: usize) -> Result<()> {
        if level > MAX_DEPTH {
            return Err(self.err(line, format!("nesting deeper than {MAX_DEPTH}")));
        }
        Ok(())
    }

    /// Returns whether the root was filled by a block.
    fn build(&self, tree: &mut KvTree, body: bool) -> Result<bool> {
        let mut lx = Lexer::new(self.src, self.escapes);
        let root = tree.root();
        let floor = usize::from(body);
        let mut stack: Vec<Frame> = Vec::new();
        if body {
            stack.push(Frame {
                node: root,
                discard: false,
            });
        }
        let mut root_filled = body;
        let mut bases: Vec<Deferred> = Vec::new();

        loop {
            let (tok, line) = lx.next().map_err(|e| self.lex_err(e))?;
            let key = match tok {
                Token::Eof if stack.len() > floor => {
                    return Err(self.err(line, "unexpected end of input inside a block"));
                }
                Token::Eof => break,
                Token::Close => {
                    if stack.len() <= floor {
                        return Err(self.err(line, "unbalanced '}'"));
                    }
                    if let Some(frame) = stack.pop()
                        && frame.discard
                    {
                        tree.delete(frame.node)?;
                    }
                    continue;
                }
                Token::Open => return Err(self.err(line, "'{' without a key name")),
                Token::Cond(_) => return Err(self.err(line, "conditional without a key")),
                Token::Text { text, .. } => text,
            };

            let parent = stack.last().map(|f| f.node);
            let in_discard = stack.iter().any(|f| f.discard);

            let directive = if key.eq_ignore_ascii_case("#include") {
                Some(true)
            } else if key.eq_ignore_ascii_case("#base") {
                Some(false)
            } else {
                None
            };
            if let Some(is_include) = directive {
                let (path, pline) = match lx.next().map_err(|e| self.lex_err(e))? {
                    (Token::Text { text, .. }, l) => (text, l),
                    (_, l) => return Err(self.err(l, format!("{key} needs a file name"))),
                };
                let mut keep = true;
                if let Some((expr, l)) = lx.take_cond().map_err(|e| self.lex_err(e))? {
                    keep = self.keep(&expr, l)?;
                }
                if !keep || in_discard {
                    continue;
                }
                // level of the node the directive lands in
                let level = stack.len().saturating_sub(1);
                match (is_include, parent) {
                    (true, Some(p)) => {
                        let (included, _) = self.parse_nested(&path, pline)?;
                        self.check_nesting(level + included.depth_below(included.root()), pline)?;
                        included.copy_subkeys(included.root(), tree, p)?;
                    }
                    (true, None) => {
                        let (included, filled) = self.parse_nested(&path, pline)?;
                        if filled {
                            append_top_level(tree, &included, &mut root_filled)?;
                        }
                    }
                    (false, _) => bases.push(Deferred {
                        target: parent.unwrap_or(root),
                        level,
                        path,
                        line: pline,
                    }),
                }
                continue;
            }

            if key.is_empty() {
                return Err(self.err(line, "empty key name"));
            }

            let mut keep = true;
            let (mut tok, mut vline) = lx.next().map_err(|e| self.lex_err(e))?;
            if let Token::Cond(expr) = &tok {
                keep = self.keep(expr, vline)?;
                (tok, vline) = lx.next().map_err(|e| self.lex_err(e))?;
            }
            let value = match tok {
                Token::Open => None,
                Token::Text { text, quoted } => {
                    if let Some((expr, l)) = lx.take_cond().map_err(|e| self.lex_err(e))? {
                        keep &= self.keep(&expr, l)?;
                    }
                    let value = if quoted {
                        Value::String(text)
                    } else {
                        infer_scalar(&text)
                    };
                    if !lx.take_open().map_err(|e| self.lex_err(e))? {
                        let Some(p) = parent else {
                            let msg = format!("expected '{{' after top-level key '{key}'");
                            return Err(self.err(vline, msg));
                        };
                        self.check_nesting(stack.len(), line)?;
                        if keep {
                            let child = tree.create_key(p, &key)?;
                            tree.set_value(child, value)?;
                        }
                        continue;
                    }
                    Some(value)
                }
                Token::Cond(_) => return Err(self.err(vline, "two conditionals in a row")),
                Token::Close | Token::Eof => {
                    return Err(self.err(vline, format!("key '{key}' has no value")));
                }
            };

            self.check_nesting(stack.len(), line)?;
            let node = match parent {
                _ if !keep => tree.create_node(&key),
                Some(p) => tree.create_key(p, &key)?,
                None if !root_filled => {
                    root_filled = true;
                    tree.set_name(root, &key)?;
                    root
                }
                None => {
                    let peer = tree.create_node(&key);
                    tree.push_top_level(peer);
                    peer
                }
            };
            if let Some(value) = value {
                tree.set_value(node, value)?;
            }
            stack.push(Frame {
                node,
                discard: !keep,
            });
        }

        for base in bases {
            let (src, _) = self.parse_nested(&base.path, base.line)?;
            self.check_nesting(base.level + src.depth_below(src.root()), base.line)?;
            tracing::debug!(source = %self.source_name, base = %base.path, "applying #base");
            merge::fill_missing(tree, base.target, &src, src.root())?;
        }
        Ok(root_filled)
    }

    fn parse_nested(&self, path: &str, line: usize) -> Result<(KvTree, bool)> {
        let fs = self
            .fs
            .ok_or_else(|| self.err(line, format!("no file system to resolve '{path}'")))?;
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(self.err(line, format!("includes nested too deeply at '{path}'")));
        }
        let name = sibling_path(&self.source_name, path);
        let bytes = fs
            .load(&name)
            .map_err(|e| self.err(line, format!("cannot read '{name}': {e}")))?;
        let text = String::from_utf8_lossy(&bytes);
        tracing::debug!(source = %self.source_name, file = %name, "reading nested text source");
        TextReader {
            source_name: name,
            src: text.as_ref(),
            escapes: self.escapes,
            predicate: self.predicate,
            fs: self.fs,
            depth: self.depth + 1,
        }
        .parse_tracked()
    }
}

/// Adds the top-level blocks of `included` after the ones already read. The
/// first one fills the root when no block has yet.
fn append_top_level(tree: &mut KvTree, included: &KvTree, root_filled: &mut bool) -> Result<()> {
    for &top in included.top_level() {
        let Some(block) = included.node(top) else {
            continue;
        };
        if *root_filled {
            let copy = tree.copy_from(included, top)?;
            tree.push_top_level(copy);
        } else {
            *root_filled = true;
            let root = tree.root();
            tree.set_name(root, &block.exact_name())?;
            tree.set_value(root, block.value().clone())?;
            included.copy_subkeys(top, tree, root)?;
        }
    }
    Ok(())
}

/// Parses `text` with default options.
pub fn parse(source_name: &str, text: &str) -> Result<KvTree> {
    TextReader::new(source_name, text).parse()
}

/// Builds a tree named `name` from a bare `key value ...` body.
pub fn from_string(name: &str, text: &str) -> Result<KvTree> {
    TextReader::new(name, text).parse_body()
}

/// Loads and parses `name` from `fs`, resolving includes through the same file system.
pub fn load(fs: &dyn FileSystem, name: &str) -> Result<KvTree> {
    let bytes = fs.load(name)?;
    let text = String::from_utf8_lossy(&bytes);
    TextReader::new(name, &text).with_file_system(fs).parse()
}
