//! Name interning.
//!
//! Every node name is stored as a [`Symbol`]: a small integer handle into a
//! process-wide table. The primary symbol of a name is case-insensitive
//! (`"Foo"` and `"foo"` share one id, resolving to whichever spelling was
//! interned first). A second, exact-case symbol is kept for lookups that must
//! respect casing.
//!
//! Two storage backends exist:
//! - [`Backend::Fixed`]: one bounded pool. Exhausting it is unrecoverable and
//!   [`Symbol::intern`] panics rather than hand out bogus ids.
//! - [`Backend::Growable`]: unbounded. Ids are only meaningful inside the
//!   current process; serialized trees carry names, never ids.
//!
//! The global backend is chosen once with [`select_backend`] before the first
//! name is interned. Touching the table first locks in the fixed default.
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use thiserror::Error;

/// Pool size of the fixed backend when nothing else is selected.
pub const DEFAULT_FIXED_CAPACITY: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("fixed symbol pool exhausted ({capacity} bytes)")]
    Exhausted { capacity: usize },
    #[error("symbol backend already selected or in use")]
    BackendLocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Fixed { capacity: usize },
    Growable,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Fixed {
            capacity: DEFAULT_FIXED_CAPACITY,
        }
    }
}

/// Interned name handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn id(self) -> u32 {
        self.0
    }

    /// Case-insensitive symbol for `name` in the global table.
    ///
    /// # Panics
    /// Panics when the fixed backend's pool is exhausted.
    pub fn intern(name: &str) -> Symbol {
        global().intern(name)
    }

    /// Exact-case symbol for `name` in the global table.
    ///
    /// # Panics
    /// Panics when the fixed backend's pool is exhausted.
    pub fn intern_exact(name: &str) -> Symbol {
        global().intern_exact(name)
    }

    /// Existing case-insensitive symbol, without creating one.
    pub fn lookup(name: &str) -> Option<Symbol> {
        global().find(name)
    }

    /// Name text of this symbol in the global table.
    pub fn resolve(self) -> String {
        global().resolve(self).unwrap_or_default()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        global()
            .with_resolved(*self, |s| f.write_str(s))
            .unwrap_or_else(|| write!(f, "#{}", self.0))
    }
}

trait SymbolStore: Send {
    fn insert(&mut self, text: &str) -> Result<u32, SymbolError>;
    fn get(&self, id: u32) -> Option<&str>;
    fn bytes_used(&self) -> usize;
}

/// One contiguous pool with a hard byte budget. Each entry is charged one
/// extra byte for its terminator so budgets match NUL-terminated layouts.
struct FixedStore {
    pool: String,
    spans: Vec<(u32, u32)>,
    capacity: usize,
}

impl FixedStore {
    fn new(capacity: usize) -> Self {
        Self {
            pool: String::new(),
            spans: Vec::new(),
            capacity,
        }
    }
}

impl SymbolStore for FixedStore {
    fn insert(&mut self, text: &str) -> Result<u32, SymbolError> {
        let charged = self.pool.len() + self.spans.len() + text.len() + 1;
        if charged > self.capacity {
            return Err(SymbolError::Exhausted {
                capacity: self.capacity,
            });
        }
        let start = self.pool.len() as u32;
        self.pool.push_str(text);
        self.spans.push((start, text.len() as u32));
        Ok((self.spans.len() - 1) as u32)
    }

    fn get(&self, id: u32) -> Option<&str> {
        let &(start, len) = self.spans.get(id as usize)?;
        self.pool.get(start as usize..(start + len) as usize)
    }

    fn bytes_used(&self) -> usize {
        self.pool.len() + self.spans.len()
    }
}

#[derive(Default)]
struct GrowableStore {
    names: Vec<Box<str>>,
    bytes: usize,
}

impl SymbolStore for GrowableStore {
    fn insert(&mut self, text: &str) -> Result<u32, SymbolError> {
        self.bytes += text.len() + 1;
        self.names.push(text.into());
        Ok((self.names.len() - 1) as u32)
    }

    fn get(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(|s| &**s)
    }

    fn bytes_used(&self) -> usize {
        self.bytes
    }
}

struct Inner {
    store: Box<dyn SymbolStore>,
    folded: HashMap<Box<str>, u32>,
    exact: HashMap<Box<str>, u32>,
}

impl Inner {
    fn folded(&mut self, name: &str, create: bool) -> Result<Option<u32>, SymbolError> {
        let key = name.to_ascii_lowercase();
        if let Some(&id) = self.folded.get(key.as_str()) {
            return Ok(Some(id));
        }
        if !create {
            return Ok(None);
        }
        let id = self.store.insert(name)?;
        self.folded.insert(key.into_boxed_str(), id);
        Ok(Some(id))
    }

    fn exact(&mut self, name: &str, create: bool) -> Result<Option<u32>, SymbolError> {
        if let Some(&id) = self.exact.get(name) {
            return Ok(Some(id));
        }
        // Reuse the primary entry when it was first spelled exactly like this.
        let primary = self.folded.get(name.to_ascii_lowercase().as_str()).copied();
        let id = match primary {
            Some(id) if self.store.get(id) == Some(name) => id,
            _ if !create => return Ok(None),
            _ => self.store.insert(name)?,
        };
        self.exact.insert(name.into(), id);
        Ok(Some(id))
    }
}

/// A symbol table with a fixed backend choice.
pub struct SymbolTable {
    backend: Backend,
    inner: Mutex<Inner>,
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("backend", &self.backend)
            .field("len", &self.len())
            .finish()
    }
}

impl SymbolTable {
    pub fn new(backend: Backend) -> Self {
        let store: Box<dyn SymbolStore> = match backend {
            Backend::Fixed { capacity } => Box::new(FixedStore::new(capacity)),
            Backend::Growable => Box::<GrowableStore>::default(),
        };
        Self {
            backend,
            inner: Mutex::new(Inner {
                store,
                folded: HashMap::new(),
                exact: HashMap::new(),
            }),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Case-insensitive symbol, created on first use.
    pub fn try_intern(&self, name: &str) -> Result<Symbol, SymbolError> {
        let mut inner = self.inner.lock();
        inner
            .folded(name, true)
            .map(|id| Symbol(id.unwrap_or_default()))
    }

    /// Exact-case symbol, created on first use.
    pub fn try_intern_exact(&self, name: &str) -> Result<Symbol, SymbolError> {
        let mut inner = self.inner.lock();
        inner
            .exact(name, true)
            .map(|id| Symbol(id.unwrap_or_default()))
    }

    /// # Panics
    /// Panics when the fixed pool is exhausted.
    pub fn intern(&self, name: &str) -> Symbol {
        self.try_intern(name).unwrap_or_else(|e| exhausted(e, name))
    }

    /// # Panics
    /// Panics when the fixed pool is exhausted.
    pub fn intern_exact(&self, name: &str) -> Symbol {
        self.try_intern_exact(name)
            .unwrap_or_else(|e| exhausted(e, name))
    }

    /// Case-insensitive lookup that never creates an entry.
    pub fn find(&self, name: &str) -> Option<Symbol> {
        let mut inner = self.inner.lock();
        inner.folded(name, false).ok().flatten().map(Symbol)
    }

    /// Exact-case lookup that never stores new text.
    pub fn find_exact(&self, name: &str) -> Option<Symbol> {
        let mut inner = self.inner.lock();
        inner.exact(name, false).ok().flatten().map(Symbol)
    }

    pub fn resolve(&self, sym: Symbol) -> Option<String> {
        self.with_resolved(sym, str::to_owned)
    }

    /// Runs `f` on the stored text while the table lock is held. `f` must not
    /// intern.
    pub(crate) fn with_resolved<R>(&self, sym: Symbol, f: impl FnOnce(&str) -> R) -> Option<R> {
        let inner = self.inner.lock();
        inner.store.get(sym.0).map(f)
    }

    /// Number of distinct stored strings.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        let mut ids: Vec<u32> = inner
            .folded
            .values()
            .chain(inner.exact.values())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes_used(&self) -> usize {
        self.inner.lock().store.bytes_used()
    }
}

fn exhausted(e: SymbolError, name: &str) -> ! {
    tracing::error!(error = %e, name, "symbol table cannot intern; refusing to continue");
    panic!("{e}");
}

static GLOBAL: OnceCell<SymbolTable> = OnceCell::new();

/// Chooses the global backend. Must run before any name is interned.
pub fn select_backend(backend: Backend) -> Result<(), SymbolError> {
    GLOBAL
        .set(SymbolTable::new(backend))
        .map_err(|_| SymbolError::BackendLocked)?;
    tracing::debug!(?backend, "symbol backend selected");
    Ok(())
}

/// The process-wide table, initialised with the fixed default on first use.
pub fn global() -> &'static SymbolTable {
    GLOBAL.get_or_init(|| SymbolTable::new(Backend::default()))
}
