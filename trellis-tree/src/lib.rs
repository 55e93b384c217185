//! TRELLIS Tree - Structure Tree Mutation
//!
//! Pure, copy-on-write operations over the project structure tree: the
//! mutator applies id-qualified operation batches, the resolver turns the
//! name-based references a model emits into node ids beforehand.

pub mod mutator;
pub mod resolver;

pub use mutator::{apply_all, apply_one, contains_node, find_node};
pub use resolver::{name_index, resolve_operations};
