//! Read-only traversals over an attached runtime
//!
//! Pure logic over the [`ClrRuntime`](crate::runtime::ClrRuntime) trait,
//! separated from attachment and from output formatting.

pub mod filter;
pub mod heap_aggregator;
pub mod stack_walker;

pub use filter::SearchFilter;
pub use heap_aggregator::{aggregate, HeapStats, TypeAggregate};
pub use stack_walker::{walk, ThreadRecord};
