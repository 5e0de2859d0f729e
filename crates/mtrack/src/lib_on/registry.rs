//! The allocation table.
//!
//! Records are kept in first-seen order for reporting, with an address index
//! on the side. The index always points at the record that currently owns an
//! address, so at most one `Allocated` record is reachable per address. A
//! record that loses its address (the block was reallocated elsewhere, or a
//! moved block landed on a released slot) stays in the table as history.

use serde::{Serialize, Serializer};
use std::collections::HashMap;

use crate::site::CallSite;
use crate::output::format_address;

/// Table size of the fixed-capacity mode the tool historically shipped with.
pub const LEGACY_CAPACITY: usize = 2048;

/// How many records the table may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capacity {
    /// The table grows with the number of distinct blocks seen.
    #[default]
    Unbounded,
    /// The table holds at most this many records. Blocks allocated once it is
    /// full are returned to the caller but never tracked.
    Bounded(usize),
}

impl Capacity {
    pub const LEGACY: Capacity = Capacity::Bounded(LEGACY_CAPACITY);

    fn admits(&self, len: usize) -> bool {
        match self {
            Capacity::Unbounded => true,
            Capacity::Bounded(limit) => len < *limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Allocated,
    Freed,
}

/// Metadata for one block's current or most recent lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocationRecord {
    #[serde(serialize_with = "serialize_address")]
    pub address: usize,
    pub size: usize,
    pub status: Status,
    pub allocation_site: CallSite,
    pub release_site: Option<CallSite>,
}

impl AllocationRecord {
    fn allocated(address: usize, size: usize, site: CallSite) -> Self {
        Self {
            address,
            size,
            status: Status::Allocated,
            allocation_site: site,
            release_site: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == Status::Allocated
    }
}

pub(crate) fn serialize_address<S: Serializer>(
    address: &usize,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_address(*address))
}

/// Operation and outcome counts, plus cumulative byte totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub allocate_calls: u64,
    pub zero_allocate_calls: u64,
    pub resize_calls: u64,
    pub release_calls: u64,
    pub release_successes: u64,
    pub release_errors: u64,
    pub resize_errors: u64,
    pub total_allocated: u64,
    pub total_freed: u64,
}

impl Counters {
    /// Bytes allocated and not yet freed, according to the totals.
    pub fn outstanding_bytes(&self) -> u64 {
        self.total_allocated.saturating_sub(self.total_freed)
    }
}

/// Result of offering a freshly allocated block to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    Reused,
    AlreadyTracked,
    CapacityExceeded,
}

/// Result of releasing an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The record was live and is now `Freed`. Carries the record as it was
    /// before the release.
    Released(AllocationRecord),
    AlreadyFreed(AllocationRecord),
    Untracked,
}

#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<AllocationRecord>,
    index: HashMap<usize, usize>,
    capacity: Capacity,
    counters: Counters,
}

impl Registry {
    pub fn new(capacity: Capacity) -> Self {
        let records = match capacity {
            Capacity::Bounded(limit) => Vec::with_capacity(limit.min(LEGACY_CAPACITY)),
            Capacity::Unbounded => Vec::new(),
        };
        Self {
            records,
            index: HashMap::new(),
            capacity,
            counters: Counters::default(),
        }
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        !self.capacity.admits(self.records.len())
    }

    /// All records ever tracked, in first-seen order.
    pub fn records(&self) -> &[AllocationRecord] {
        &self.records
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    /// The record currently owning `address`, live or released.
    pub fn find_by_address(&self, address: usize) -> Option<&AllocationRecord> {
        self.index.get(&address).map(|&slot| &self.records[slot])
    }

    /// Registers a block the allocator just returned.
    ///
    /// A full table rejects the block before looking at it, even when a
    /// released record for the same address exists.
    pub fn insert_or_reuse(&mut self, address: usize, size: usize, site: CallSite) -> Insertion {
        if self.is_full() {
            return Insertion::CapacityExceeded;
        }

        let insertion = match self.index.get(&address) {
            Some(&slot) if self.records[slot].is_live() => return Insertion::AlreadyTracked,
            Some(&slot) => {
                self.records[slot] = AllocationRecord::allocated(address, size, site);
                Insertion::Reused
            }
            None => {
                self.index.insert(address, self.records.len());
                self.records
                    .push(AllocationRecord::allocated(address, size, site));
                Insertion::Inserted
            }
        };

        self.counters.total_allocated += size as u64;
        insertion
    }

    pub fn mark_released(&mut self, address: usize, site: CallSite) -> Release {
        let Some(&slot) = self.index.get(&address) else {
            return Release::Untracked;
        };

        let record = &mut self.records[slot];
        if !record.is_live() {
            return Release::AlreadyFreed(*record);
        }

        let before = *record;
        record.status = Status::Freed;
        record.release_site = Some(site);
        self.counters.total_freed += record.size as u64;
        Release::Released(before)
    }

    /// Moves the live record at `old_address` to `new_address` with a new size.
    /// Returns the previous size, or `None` when no live record owns
    /// `old_address`.
    pub fn relocate(
        &mut self,
        old_address: usize,
        new_address: usize,
        new_size: usize,
    ) -> Option<usize> {
        let slot = *self.index.get(&old_address)?;
        if !self.records[slot].is_live() {
            return None;
        }

        let record = &mut self.records[slot];
        let old_size = record.size;
        record.address = new_address;
        record.size = new_size;

        // Grow first so a shrink never dips below the freed total
        self.counters.total_allocated += new_size as u64;
        self.counters.total_allocated -= old_size as u64;

        if old_address != new_address {
            self.index.remove(&old_address);
            self.index.insert(new_address, slot);
        }

        Some(old_size)
    }

    /// Every record still `Allocated`, in first-seen order.
    pub fn snapshot_leaks(&self) -> Vec<AllocationRecord> {
        self.records
            .iter()
            .filter(|record| record.is_live())
            .copied()
            .collect()
    }

    /// Sum of sizes over live records.
    pub fn live_bytes(&self) -> u64 {
        self.records
            .iter()
            .filter(|record| record.is_live())
            .map(|record| record.size as u64)
            .sum()
    }
}
