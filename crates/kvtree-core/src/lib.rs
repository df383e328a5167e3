//! kvtree-core: hierarchical typed key-value trees
//!
//! This crate focuses on a small, well-factored surface:
//! - Interned key names with a fixed or growable backing store
//! - An arena of nodes with typed values, ordered children and fallback chains
//! - Text reader/writer with `#include`, `#base` and `[$COND]` entries
//! - Binary codec, direct and string-pooled
//! - Merging, struct unpacking, dump visitors and a JSON bridge
//! - File systems over a directory, memory or a zip archive
//!
pub mod archive;
pub mod binary;
pub mod binary_write;
pub mod buffer;
pub mod conditional;
pub mod dump;
pub mod error;
pub mod fs;
pub mod json;
pub mod merge;
pub mod node;
pub mod symbol;
pub mod text;
pub mod text_write;
pub mod tree;
pub mod unpack;
pub mod value;

pub use binary::{BinaryFormat, decode, decode_filtered};
pub use binary_write::{encode, encode_filtered};
pub use dump::{DumpContext, LogDump, TextDump, dump, dump_tree};
pub use error::{Error, Result};
pub use fs::{DirFileSystem, FileSystem, MemoryFileSystem};
pub use merge::{MergePolicy, merge, merge_sections, merge_trees};
pub use node::NodeRef;
pub use symbol::{Backend, Symbol, SymbolError, SymbolTable, select_backend};
pub use text::{TextReader, from_string};
pub use text_write::{Indent, TextWriter, to_text};
pub use tree::{ChainLink, KvTree, NodeId, TreeId};
pub use unpack::{UnpackField, UnpackKind, unpack_into};
pub use value::{Color, DataType, Value};
