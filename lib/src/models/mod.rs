pub mod node;

pub use node::{Node, NodeId, NodeKind, NodeMeta};
