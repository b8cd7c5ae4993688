//! Heap statistics by runtime type.
//!
//! One full pass over the live managed heap, grouping objects by type
//! identity and summing their sizes.
//!
//! # Architecture
//!
//! - **`HeapStats`** - accumulates objects as the heap is enumerated
//! - **`aggregate()`** - runs the pass against a runtime and returns the
//!   sorted, filtered view
//!
//! ## Size accounting
//!
//! Each object's size is narrowed to 32 bits before it is added to its type's
//! 64-bit total. An object of 4 GiB or more is therefore undercounted. This
//! keeps totals identical to the established `heap` output format.

use log::debug;
use std::collections::HashMap;

use super::SearchFilter;
use crate::domain::{TypeId, WalkError};
use crate::runtime::{ClrRuntime, HeapObject};

// =============================================================================
// TYPE AGGREGATE (OUTPUT TYPE)
// =============================================================================

/// Live objects of one runtime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAggregate {
    pub type_id: TypeId,
    pub type_name: String,
    /// Sum of the 32-bit-narrowed sizes of every object of this type
    pub total_size: u64,
    pub count: u64,
}

// =============================================================================
// HEAP STATS (AGGREGATOR)
// =============================================================================

/// Per-type accumulator, in order of first appearance.
#[derive(Debug, Default)]
pub struct HeapStats {
    /// Type identity → position in `groups`
    index: HashMap<TypeId, usize>,
    groups: Vec<TypeAggregate>,
}

impl HeapStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one object to its type's totals.
    pub fn record(&mut self, object: &HeapObject) {
        let idx = *self.index.entry(object.type_id).or_insert_with(|| {
            self.groups.push(TypeAggregate {
                type_id: object.type_id,
                type_name: object.type_name.clone(),
                total_size: 0,
                count: 0,
            });
            self.groups.len() - 1
        });

        let group = &mut self.groups[idx];
        group.total_size += u64::from(narrowed_size(object.size));
        group.count += 1;
    }

    /// Number of distinct types seen so far
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.groups.len()
    }

    /// Ascending by total size, ties in first-seen order, then filtered by
    /// type name.
    #[must_use]
    pub fn into_sorted(self, filter: &SearchFilter) -> Vec<TypeAggregate> {
        let mut groups = self.groups;
        // Stable sort keeps discovery order among equal totals
        groups.sort_by_key(|g| g.total_size);
        groups.retain(|g| filter.matches(&g.type_name));
        groups
    }
}

#[allow(clippy::cast_possible_truncation)]
fn narrowed_size(size: u64) -> u32 {
    size as u32
}

/// Aggregate the live heap of `runtime` by type.
///
/// # Errors
/// Any failure during enumeration aborts the pass; no partial result is
/// returned.
pub fn aggregate(
    runtime: &dyn ClrRuntime,
    filter: &SearchFilter,
) -> Result<Vec<TypeAggregate>, WalkError> {
    let mut stats = HeapStats::new();
    let mut objects = 0u64;

    for object in runtime.heap_objects()? {
        stats.record(&object?);
        objects += 1;
    }

    debug!("Heap pass saw {objects} objects of {} types", stats.type_count());
    Ok(stats.into_sorted(filter))
}
