//! Typed node values.
use std::fmt;

/// Kind tag of a node value. The discriminants are the binary type bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    None = 0,
    String = 1,
    Int = 2,
    Float = 3,
    Ptr = 4,
    WString = 5,
    Color = 6,
    Uint64 = 7,
    // binary-only compactions of INT; never stored on a node
    CompiledIntByte = 8,
    CompiledInt0 = 9,
    CompiledInt1 = 10,
}

impl DataType {
    /// One past the last kind; doubles as the binary end-of-list marker.
    pub const NUM_TYPES: u8 = 11;

    pub fn from_u8(v: u8) -> Option<Self> {
        let t = match v {
            0 => Self::None,
            1 => Self::String,
            2 => Self::Int,
            3 => Self::Float,
            4 => Self::Ptr,
            5 => Self::WString,
            6 => Self::Color,
            7 => Self::Uint64,
            8 => Self::CompiledIntByte,
            9 => Self::CompiledInt0,
            10 => Self::CompiledInt1,
            _ => return None,
        };
        Some(t)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Ptr => "ptr",
            Self::WString => "wstring",
            Self::Color => "color",
            Self::Uint64 => "uint64",
            Self::CompiledIntByte => "compiled_int_byte",
            Self::CompiledInt0 => "compiled_int_0",
            Self::CompiledInt1 => "compiled_int_1",
        }
    }
}

/// RGBA color, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_bytes(b: [u8; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }

    /// Parses `"r g b a"`; missing trailing channels are zero. Components are
    /// read as floats and clamped to a byte.
    pub fn parse(s: &str) -> Option<Self> {
        let mut ch = [0u8; 4];
        let mut any = false;
        for (slot, part) in ch.iter_mut().zip(s.split_whitespace()) {
            let f: f32 = part.parse().ok()?;
            *slot = f.clamp(0.0, 255.0) as u8;
            any = true;
        }
        any.then(|| Self::from_bytes(ch))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.r, self.g, self.b, self.a)
    }
}

/// Scalar held by a node. Owned string buffers are freed whenever the value
/// is replaced or the node is destroyed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    String(String),
    /// Stored as UTF-8; encoded as UTF-16 in binary streams.
    WString(String),
    Int(i32),
    Float(f32),
    Uint64(u64),
    Color(Color),
    Ptr(usize),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::None => DataType::None,
            Value::String(_) => DataType::String,
            Value::WString(_) => DataType::WString,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Uint64(_) => DataType::Uint64,
            Value::Color(_) => DataType::Color,
            Value::Ptr(_) => DataType::Ptr,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Equality for round trips: floats compare by bit pattern, and any NaN
    /// equals any other NaN.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            _ => self == other,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        Some(match self {
            Value::Int(v) => *v,
            Value::String(s) | Value::WString(s) => atoi(s),
            Value::Float(f) => *f as i32,
            Value::Uint64(v) => *v as i32,
            Value::Ptr(p) => *p as i32,
            Value::None | Value::Color(_) => return None,
        })
    }

    pub fn as_float(&self) -> Option<f32> {
        Some(match self {
            Value::Float(f) => *f,
            Value::Int(v) => *v as f32,
            Value::String(s) | Value::WString(s) => atof(s),
            Value::Uint64(v) => *v as f32,
            Value::None | Value::Color(_) | Value::Ptr(_) => return None,
        })
    }

    pub fn as_uint64(&self) -> Option<u64> {
        Some(match self {
            Value::Uint64(v) => *v,
            Value::Int(v) => *v as u64,
            Value::Float(f) => *f as u64,
            Value::Ptr(p) => *p as u64,
            Value::String(s) | Value::WString(s) => parse_uint64(s).unwrap_or(0),
            Value::None | Value::Color(_) => return None,
        })
    }

    /// Textual form used by `get_string`.
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            Value::String(s) | Value::WString(s) => s.clone(),
            Value::Int(v) => v.to_string(),
            Value::Float(f) => format!("{f:.6}"),
            Value::Uint64(v) => v.to_string(),
            Value::Ptr(p) => format!("{p:#x}"),
            Value::Color(c) => c.to_string(),
            Value::None => return None,
        })
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            Value::Int(v) => Some(Color::from_bytes(v.to_le_bytes())),
            Value::String(s) | Value::WString(s) => Color::parse(s),
            _ => None,
        }
    }
}

/// Leading-integer parse with C `atoi` leniency: stops at the first
/// non-digit, yields 0 when nothing parses, saturates on overflow.
pub(crate) fn atoi(s: &str) -> i32 {
    let s = s.trim_start();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut acc: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        acc = (acc * 10 + i64::from(b - b'0')).min(i64::from(i32::MAX) + 1);
    }
    let v = if neg { -acc } else { acc };
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Longest-prefix float parse with C `atof` leniency.
pub(crate) fn atof(s: &str) -> f32 {
    let s = s.trim_start();
    let end = float_prefix_len(s);
    s[..end].parse().unwrap_or(0.0)
}

fn float_prefix_len(s: &str) -> usize {
    let b = s.as_bytes();
    let mut i = 0;
    if matches!(b.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let mut digits = 0;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < b.len() && b[i] == b'.' {
        i += 1;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return 0;
    }
    if i < b.len() && matches!(b[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < b.len() && matches!(b[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    i
}

/// Decimal or `0x`-prefixed hex.
pub(crate) fn parse_uint64(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Classifies an unquoted text token: integers become `Int`, `0x` followed by
/// exactly 16 hex digits becomes `Uint64`, float syntax becomes `Float`, the
/// rest stays a string. Integer-looking tokens that overflow stay strings.
pub(crate) fn infer_scalar(token: &str) -> Value {
    let b = token.as_bytes();
    if b.len() == 18
        && token.starts_with("0x")
        && let Ok(v) = u64::from_str_radix(&token[2..], 16)
    {
        return Value::Uint64(v);
    }
    // the writer's spelling of non-finite floats
    match token {
        "inf" | "+inf" => return Value::Float(f32::INFINITY),
        "-inf" => return Value::Float(f32::NEG_INFINITY),
        "NaN" => return Value::Float(f32::NAN),
        _ => {}
    }
    let unsigned = token.strip_prefix(['-', '+']).unwrap_or(token);
    if unsigned.is_empty() {
        return Value::String(token.to_string());
    }
    if unsigned.bytes().all(|c| c.is_ascii_digit()) {
        return match token.parse::<i32>() {
            Ok(v) => Value::Int(v),
            Err(_) => Value::String(token.to_string()),
        };
    }
    let starts_numeric = unsigned
        .as_bytes()
        .first()
        .is_some_and(|c| c.is_ascii_digit() || *c == b'.');
    if starts_numeric
        && float_prefix_len(token) == token.len()
        && let Ok(f) = token.parse::<f32>()
    {
        return Value::Float(f);
    }
    Value::String(token.to_string())
}
