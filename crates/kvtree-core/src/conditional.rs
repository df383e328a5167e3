//! `[$TOKEN]` conditional expressions.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr  := and ( "||" and )*
//! and   := unary ( "&&" unary )*
//! unary := "!" unary | "(" expr ")" | "$" NAME
//! ```
//!
//! The predicate receives `NAME` without the `$`.

/// Caller-supplied answer for a single conditional token.
pub type Predicate<'p> = &'p dyn Fn(&str) -> bool;

#[derive(Debug, Clone, PartialEq)]
enum Tok<'s> {
    Name(&'s str),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn lex(src: &str) -> Result<Vec<Tok<'_>>, String> {
    let b = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            c if c.is_ascii_whitespace() => i += 1,
            b'!' => {
                out.push(Tok::Not);
                i += 1;
            }
            b'(' => {
                out.push(Tok::Open);
                i += 1;
            }
            b')' => {
                out.push(Tok::Close);
                i += 1;
            }
            b'&' if b.get(i + 1) == Some(&b'&') => {
                out.push(Tok::And);
                i += 2;
            }
            b'|' if b.get(i + 1) == Some(&b'|') => {
                out.push(Tok::Or);
                i += 2;
            }
            b'$' => {
                let start = i + 1;
                let mut end = start;
                while end < b.len() && (b[end].is_ascii_alphanumeric() || b[end] == b'_') {
                    end += 1;
                }
                if end == start {
                    return Err(format!("empty conditional token in [{src}]"));
                }
                out.push(Tok::Name(&src[start..end]));
                i = end;
            }
            other => {
                return Err(format!(
                    "unexpected '{}' in conditional [{src}]",
                    other as char
                ));
            }
        }
    }
    Ok(out)
}

struct Eval<'s, 'p> {
    toks: Vec<Tok<'s>>,
    pos: usize,
    pred: Predicate<'p>,
}

impl<'s> Eval<'s, '_> {
    fn peek(&self) -> Option<&Tok<'s>> {
        self.toks.get(self.pos)
    }

    fn expr(&mut self) -> Result<bool, String> {
        let mut v = self.and()?;
        while self.peek() == Some(&Tok::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            v = v || rhs;
        }
        Ok(v)
    }

    fn and(&mut self) -> Result<bool, String> {
        let mut v = self.unary()?;
        while self.peek() == Some(&Tok::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            v = v && rhs;
        }
        Ok(v)
    }

    fn unary(&mut self) -> Result<bool, String> {
        let tok = self.peek().cloned();
        self.pos += 1;
        match tok {
            Some(Tok::Not) => Ok(!self.unary()?),
            Some(Tok::Open) => {
                let v = self.expr()?;
                if self.peek() != Some(&Tok::Close) {
                    return Err("missing ')' in conditional".into());
                }
                self.pos += 1;
                Ok(v)
            }
            Some(Tok::Name(name)) => Ok((self.pred)(name)),
            Some(t) => Err(format!("unexpected {t:?} in conditional")),
            None => Err("conditional ends early".into()),
        }
    }
}

/// Evaluates the text between `[` and `]`. Without a predicate every
/// well-formed condition keeps its entry.
pub fn evaluate(expr: &str, pred: Option<Predicate<'_>>) -> Result<bool, String> {
    let toks = lex(expr)?;
    let keep_all: Predicate<'_> = &|_| true;
    let mut ev = Eval {
        toks,
        pos: 0,
        pred: pred.unwrap_or(keep_all),
    };
    let v = ev.expr()?;
    if ev.pos != ev.toks.len() {
        return Err(format!("trailing tokens in conditional [{expr}]"));
    }
    Ok(pred.is_none() || v)
}

