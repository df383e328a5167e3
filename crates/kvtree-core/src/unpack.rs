//! Declarative copy of tree values into a flat byte block.
//!
//! Fields are written in native byte order at the offsets the table gives,
//! so a `#[repr(C)]` struct viewed as bytes can be filled directly.
use crate::error::{Error, Result};
use crate::node::NodeRef;
use crate::value::{Color, atof, atoi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackKind {
    /// `f32`
    Float,
    /// `[f32; 3]` from `"x y z"`
    Vector,
    /// `[f32; 3]` from a color, channels scaled to `0..=1`
    VectorColor,
    /// NUL-terminated bytes in a field of `size` bytes
    String,
    /// `i32`
    Int,
    /// `[f32; 4]` from `"a b c d"`
    FourFloats,
    /// `[f32; 2]` from `"a b"`
    TwoFloats,
}

#[derive(Debug, Clone, Copy)]
pub struct UnpackField<'k> {
    /// `None` ends the table.
    pub key: Option<&'k str>,
    /// Used as if it were the value when `key` is absent.
    pub default: Option<&'k str>,
    pub kind: UnpackKind,
    pub offset: usize,
    /// Only read for [`UnpackKind::String`].
    pub size: usize,
}

impl<'k> UnpackField<'k> {
    pub const END: UnpackField<'static> = UnpackField {
        key: None,
        default: None,
        kind: UnpackKind::Float,
        offset: 0,
        size: 0,
    };

    pub const fn fixed(
        key: &'k str,
        default: Option<&'k str>,
        kind: UnpackKind,
        offset: usize,
    ) -> Self {
        Self {
            key: Some(key),
            default,
            kind,
            offset,
            size: 0,
        }
    }

    pub const fn variable(
        key: &'k str,
        default: Option<&'k str>,
        kind: UnpackKind,
        offset: usize,
        size: usize,
    ) -> Self {
        Self {
            key: Some(key),
            default,
            kind,
            offset,
            size,
        }
    }

    fn width(&self) -> usize {
        match self.kind {
            UnpackKind::Float | UnpackKind::Int => 4,
            UnpackKind::Vector | UnpackKind::VectorColor => 12,
            UnpackKind::FourFloats => 16,
            UnpackKind::TwoFloats => 8,
            UnpackKind::String => self.size,
        }
    }
}

enum Source<'a, 'k> {
    Node(NodeRef<'a>),
    Text(&'k str),
}

impl Source<'_, '_> {
    fn text(&self) -> String {
        match self {
            Source::Node(n) => n.string("").into_owned(),
            Source::Text(t) => (*t).to_string(),
        }
    }

    fn float(&self) -> f32 {
        match self {
            Source::Node(n) => n.float(0.0),
            Source::Text(t) => atof(t),
        }
    }

    fn int(&self) -> i32 {
        match self {
            Source::Node(n) => n.int(0),
            Source::Text(t) => atoi(t),
        }
    }

    fn color(&self) -> Color {
        match self {
            Source::Node(n) => n.color(Color::default()),
            Source::Text(t) => Color::parse(t).unwrap_or_default(),
        }
    }
}

/// Exactly `N` whitespace-separated floats, or all zeros.
fn floats<const N: usize>(text: &str) -> [f32; N] {
    let mut out = [0.0f32; N];
    let mut parts = text.split_whitespace();
    for slot in out.iter_mut() {
        match parts.next().and_then(|p| p.parse::<f32>().ok()) {
            Some(f) => *slot = f,
            None => return [0.0; N],
        }
    }
    out
}

fn put_floats(dest: &mut [u8], vals: &[f32]) {
    for (chunk, v) in dest.chunks_exact_mut(4).zip(vals) {
        chunk.copy_from_slice(&v.to_ne_bytes());
    }
}

/// Fills `dest` from the keys of `node` as described by `table`.
///
/// A field whose key is missing and that has no default is left untouched.
/// Every field is bounds-checked before anything is written.
pub fn unpack_into(node: NodeRef<'_>, table: &[UnpackField<'_>], dest: &mut [u8]) -> Result<()> {
    let fields: Vec<&UnpackField<'_>> = table.iter().take_while(|f| f.key.is_some()).collect();
    for f in &fields {
        let end = f.offset.checked_add(f.width());
        if end.is_none_or(|e| e > dest.len()) {
            return Err(Error::Unpack(format!(
                "field {:?} at {}+{} overruns a {}-byte block",
                f.key.unwrap_or_default(),
                f.offset,
                f.width(),
                dest.len()
            )));
        }
        if f.kind == UnpackKind::String && f.size == 0 {
            return Err(Error::Unpack(format!(
                "string field {:?} has no size",
                f.key.unwrap_or_default()
            )));
        }
    }

    for f in fields {
        let key = f.key.unwrap_or_default();
        let src = match (node.find_key(key), f.default) {
            (Some(n), _) => Source::Node(n),
            (None, Some(d)) => Source::Text(d),
            (None, None) => continue,
        };
        let slot = &mut dest[f.offset..f.offset + f.width()];
        match f.kind {
            UnpackKind::Float => slot.copy_from_slice(&src.float().to_ne_bytes()),
            UnpackKind::Int => slot.copy_from_slice(&src.int().to_ne_bytes()),
            UnpackKind::Vector => put_floats(slot, &floats::<3>(&src.text())),
            UnpackKind::FourFloats => put_floats(slot, &floats::<4>(&src.text())),
            UnpackKind::TwoFloats => put_floats(slot, &floats::<2>(&src.text())),
            UnpackKind::VectorColor => {
                let c = src.color();
                let rgb = [c.r, c.g, c.b].map(|ch| f32::from(ch) / 255.0);
                put_floats(slot, &rgb);
            }
            UnpackKind::String => {
                let text = src.text();
                let bytes = text.as_bytes();
                let n = bytes.len().min(slot.len() - 1);
                slot[..n].copy_from_slice(&bytes[..n]);
                slot[n..].fill(0);
            }
        }
    }
    Ok(())
}
