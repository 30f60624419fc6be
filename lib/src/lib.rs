pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod models;
pub mod tree;
pub mod utils;

// Re-export the common entry points for convenience
pub use config::Config;
pub use convert::{convert, read_tree, write_tree, ConvertReport};
pub use error::{BmError, ErrorKind, Result};
pub use format::{Format, FormatAdapter};
pub use models::{Node, NodeId, NodeKind, NodeMeta};
pub use tree::{BookmarkTree, IdPolicy, NodeDraft};
