use std::fmt;
use std::ptr::{self, NonNull};

use super::allocator::{LibcAllocator, RawAllocator};
use super::events::{Event, EventKind, EventSink, Outcome, StderrSink};
use super::registry::{AllocationRecord, Capacity, Counters, Insertion, Registry, Release};
use super::report::Report;
use crate::site::CallSite;

/// Tracks every block handed out by an underlying [`RawAllocator`].
///
/// Each call forwards to the allocator only when doing so is safe, updates the
/// [`Registry`] and sends one [`Event`] to the sink before returning. Misuse
/// (double free, foreign pointers, realloc of released blocks) is reported and
/// never forwarded.
///
/// ```rust
/// use mtrack::{site, Tracker};
///
/// let mut tracker = Tracker::new();
/// let block = tracker.allocate(site!(), 64).unwrap();
/// unsafe { tracker.release(site!(), block.as_ptr()) };
///
/// let report = tracker.finish();
/// assert!(report.leaks.is_empty());
/// ```
pub struct Tracker<A: RawAllocator = LibcAllocator> {
    allocator: A,
    registry: Registry,
    sink: Box<dyn EventSink>,
}

impl Tracker<LibcAllocator> {
    pub fn new() -> Self {
        Self::with_allocator(LibcAllocator)
    }
}

impl Default for Tracker<LibcAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAllocator> Tracker<A> {
    /// Unbounded table, events to stderr.
    pub fn with_allocator(allocator: A) -> Self {
        Self::with_config(allocator, Capacity::Unbounded, Box::new(StderrSink))
    }

    pub fn with_config(allocator: A, capacity: Capacity, sink: Box<dyn EventSink>) -> Self {
        Self {
            allocator,
            registry: Registry::new(capacity),
            sink,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn counters(&self) -> &Counters {
        self.registry.counters()
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Direct access to the underlying allocator. Blocks obtained through it
    /// are not tracked.
    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    pub fn allocate(&mut self, site: CallSite, size: usize) -> Option<NonNull<u8>> {
        self.registry.counters_mut().allocate_calls += 1;

        let block = self.allocator.allocate(size);
        let outcome = self.track_new_block(block, size, site);
        self.emit(Event {
            kind: EventKind::Allocate,
            site,
            address: block as usize,
            size,
            elements: None,
            outcome,
        });

        NonNull::new(block)
    }

    /// Allocates `count * element_size` zeroed bytes. A product that overflows
    /// `usize` fails without reaching the allocator.
    pub fn zero_allocate(
        &mut self,
        site: CallSite,
        count: usize,
        element_size: usize,
    ) -> Option<NonNull<u8>> {
        self.registry.counters_mut().zero_allocate_calls += 1;

        let (block, size) = match count.checked_mul(element_size) {
            Some(size) => (self.allocator.zero_allocate(count, element_size), size),
            None => (ptr::null_mut(), count.saturating_mul(element_size)),
        };
        let outcome = self.track_new_block(block, size, site);
        self.emit(Event {
            kind: EventKind::ZeroAllocate,
            site,
            address: block as usize,
            size,
            elements: Some((count, element_size)),
            outcome,
        });

        NonNull::new(block)
    }

    fn track_new_block(&mut self, block: *mut u8, size: usize, site: CallSite) -> Outcome {
        if block.is_null() {
            return Outcome::AllocationFailure;
        }

        match self.registry.insert_or_reuse(block as usize, size, site) {
            Insertion::Inserted => Outcome::Tracked,
            Insertion::Reused => Outcome::Reused,
            Insertion::AlreadyTracked => Outcome::AlreadyTracked,
            Insertion::CapacityExceeded => Outcome::CapacityExceeded,
        }
    }

    /// Resizes a tracked block.
    ///
    /// Returns `None` without touching the allocator when `ptr` is not a live
    /// tracked block. Returns `None` with the original block intact when the
    /// allocator cannot resize. A `new_size` of zero releases the block and
    /// returns `None`.
    ///
    /// # Safety
    ///
    /// If `ptr` is tracked as live, it must not have been freed or resized
    /// behind the tracker's back since it was allocated.
    pub unsafe fn resize(
        &mut self,
        site: CallSite,
        ptr: *mut u8,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        self.registry.counters_mut().resize_calls += 1;
        let address = ptr as usize;

        let record = match self.registry.find_by_address(address) {
            Some(record) if record.is_live() => *record,
            found => {
                let outcome = match found {
                    Some(_) => Outcome::ResizeOnFreed,
                    None => Outcome::InvalidResize,
                };
                self.registry.counters_mut().resize_errors += 1;
                self.emit(Event {
                    kind: EventKind::Resize,
                    site,
                    address,
                    size: new_size,
                    elements: None,
                    outcome,
                });
                return None;
            }
        };

        if new_size == 0 {
            unsafe { self.allocator.release(ptr) };
            self.registry.mark_released(address, site);
            self.emit(Event {
                kind: EventKind::Resize,
                site,
                address,
                size: record.size,
                elements: None,
                outcome: Outcome::Released,
            });
            self.check_cross_site(EventKind::Resize, site, &record);
            return None;
        }

        let resized = unsafe { self.allocator.resize(ptr, new_size) };
        let Some(block) = NonNull::new(resized) else {
            self.emit(Event {
                kind: EventKind::Resize,
                site,
                address,
                size: new_size,
                elements: None,
                outcome: Outcome::ResizeFailure,
            });
            return None;
        };

        let new_address = block.as_ptr() as usize;
        let old_size = self
            .registry
            .relocate(address, new_address, new_size)
            .unwrap_or(record.size);
        self.emit(Event {
            kind: EventKind::Resize,
            site,
            address,
            size: new_size,
            elements: None,
            outcome: Outcome::Resized {
                new_address,
                old_size,
            },
        });
        self.check_cross_site(EventKind::Resize, site, &record);

        Some(block)
    }

    /// Releases a tracked block. Null is a no-op. Double frees and pointers the
    /// tracker never handed out are reported and not forwarded.
    ///
    /// # Safety
    ///
    /// If `ptr` is tracked as live, it must not have been freed or resized
    /// behind the tracker's back since it was allocated.
    pub unsafe fn release(&mut self, site: CallSite, ptr: *mut u8) {
        self.registry.counters_mut().release_calls += 1;
        let address = ptr as usize;

        if ptr.is_null() {
            self.emit(Event {
                kind: EventKind::Release,
                site,
                address,
                size: 0,
                elements: None,
                outcome: Outcome::NullRelease,
            });
            return;
        }

        let (size, outcome) = match self.registry.mark_released(address, site) {
            Release::Released(record) => {
                unsafe { self.allocator.release(ptr) };
                self.registry.counters_mut().release_successes += 1;
                self.emit(Event {
                    kind: EventKind::Release,
                    site,
                    address,
                    size: record.size,
                    elements: None,
                    outcome: Outcome::Released,
                });
                self.check_cross_site(EventKind::Release, site, &record);
                return;
            }
            Release::AlreadyFreed(record) => (record.size, Outcome::DoubleRelease),
            Release::Untracked => (0, Outcome::InvalidRelease),
        };

        self.registry.counters_mut().release_errors += 1;
        self.emit(Event {
            kind: EventKind::Release,
            site,
            address,
            size,
            elements: None,
            outcome,
        });
    }

    /// Ends tracking and hands the final state to the caller.
    pub fn finish(self) -> Report {
        Report::from_registry(self.registry)
    }

    fn check_cross_site(&self, kind: EventKind, site: CallSite, record: &AllocationRecord) {
        if record.allocation_site.is_other_file(&site) {
            self.emit(Event {
                kind,
                site,
                address: record.address,
                size: record.size,
                elements: None,
                outcome: Outcome::CrossSiteMismatch {
                    allocation_file: record.allocation_site.file,
                },
            });
        }
    }

    fn emit(&self, event: Event) {
        self.sink.record(&event);
    }
}

impl<A: RawAllocator + fmt::Debug> fmt::Debug for Tracker<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("allocator", &self.allocator)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::allocator::testing::FakeAllocator;
    use super::super::events::MemorySink;
    use super::super::registry::Status;
    use super::*;

    const MAIN: CallSite = CallSite::new("src/main.rs", "app::main", 3);
    const OTHER: CallSite = CallSite::new("src/other.rs", "app::other::drop_it", 9);

    fn tracker() -> (Tracker<FakeAllocator>, MemorySink) {
        let sink = MemorySink::new();
        let tracker = Tracker::with_config(
            FakeAllocator::new(),
            Capacity::Unbounded,
            Box::new(sink.clone()),
        );
        (tracker, sink)
    }

    #[test]
    fn test_allocate_then_release() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 10).unwrap();
        unsafe { tracker.release(MAIN, block.as_ptr()) };

        assert_eq!(sink.outcomes(), vec![Outcome::Tracked, Outcome::Released]);
        assert_eq!(tracker.allocator().released, vec![block.as_ptr() as usize]);

        let counters = *tracker.counters();
        assert_eq!(counters.allocate_calls, 1);
        assert_eq!(counters.release_calls, 1);
        assert_eq!(counters.release_successes, 1);
        assert_eq!(counters.total_allocated, 10);
        assert_eq!(counters.total_freed, 10);
        assert!(tracker.finish().leaks.is_empty());
    }

    #[test]
    fn test_failed_allocation_is_counted_but_not_tracked() {
        let (mut tracker, sink) = tracker();
        tracker.allocator_mut().fail_next = true;

        assert!(tracker.allocate(MAIN, 10).is_none());
        assert_eq!(sink.outcomes(), vec![Outcome::AllocationFailure]);
        assert_eq!(tracker.counters().allocate_calls, 1);
        assert!(tracker.registry().is_empty());
    }

    #[test]
    fn test_zero_allocate_overflow_skips_allocator() {
        let (mut tracker, sink) = tracker();
        assert!(tracker.zero_allocate(MAIN, usize::MAX, 2).is_none());

        let events = sink.events();
        assert_eq!(events[0].outcome, Outcome::AllocationFailure);
        assert_eq!(events[0].size, usize::MAX);
        assert_eq!(events[0].elements, Some((usize::MAX, 2)));
        assert_eq!(tracker.counters().zero_allocate_calls, 1);
        assert_eq!(tracker.counters().total_allocated, 0);
    }

    #[test]
    fn test_zero_allocate_records_product() {
        let (mut tracker, _sink) = tracker();
        let block = tracker.zero_allocate(MAIN, 5, 4).unwrap();

        let record = tracker
            .registry()
            .find_by_address(block.as_ptr() as usize)
            .unwrap();
        assert_eq!(record.size, 20);
    }

    #[test]
    fn test_double_release_forwards_once() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 10).unwrap();
        unsafe {
            tracker.release(MAIN, block.as_ptr());
            tracker.release(MAIN, block.as_ptr());
        }

        assert_eq!(
            sink.outcomes(),
            vec![Outcome::Tracked, Outcome::Released, Outcome::DoubleRelease]
        );
        assert_eq!(tracker.allocator().released.len(), 1);
        assert_eq!(tracker.counters().release_successes, 1);
        assert_eq!(tracker.counters().release_errors, 1);
    }

    #[test]
    fn test_foreign_release_is_not_forwarded() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 20).unwrap();
        let offset = block.as_ptr().wrapping_add(5);
        unsafe { tracker.release(MAIN, offset) };

        assert_eq!(sink.outcomes()[1], Outcome::InvalidRelease);
        assert!(tracker.allocator().released.is_empty());
        assert_eq!(tracker.counters().release_errors, 1);
        assert_eq!(tracker.finish().leaks.len(), 1);
    }

    #[test]
    fn test_null_release_is_a_counted_noop() {
        let (mut tracker, sink) = tracker();
        unsafe { tracker.release(MAIN, ptr::null_mut()) };

        assert_eq!(sink.outcomes(), vec![Outcome::NullRelease]);
        assert_eq!(tracker.counters().release_calls, 1);
        assert_eq!(tracker.counters().release_errors, 0);
        assert!(tracker.allocator().released.is_empty());
    }

    #[test]
    fn test_resize_moves_record() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 10).unwrap();
        let moved = unsafe { tracker.resize(MAIN, block.as_ptr(), 20) }.unwrap();

        assert_ne!(block, moved);
        assert_eq!(
            sink.outcomes()[1],
            Outcome::Resized {
                new_address: moved.as_ptr() as usize,
                old_size: 10,
            }
        );
        assert_eq!(tracker.registry().len(), 1);
        assert!(tracker
            .registry()
            .find_by_address(block.as_ptr() as usize)
            .is_none());
        assert_eq!(tracker.counters().total_allocated, 20);
    }

    #[test]
    fn test_resize_failure_keeps_record() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 10).unwrap();
        tracker.allocator_mut().fail_next = true;

        assert!(unsafe { tracker.resize(MAIN, block.as_ptr(), 20) }.is_none());
        assert_eq!(sink.outcomes()[1], Outcome::ResizeFailure);
        let record = tracker
            .registry()
            .find_by_address(block.as_ptr() as usize)
            .unwrap();
        assert_eq!(record.size, 10);
        assert_eq!(tracker.counters().resize_errors, 0);
    }

    #[test]
    fn test_resize_of_released_or_unknown_is_refused() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 10).unwrap();
        unsafe {
            tracker.release(MAIN, block.as_ptr());
            assert!(tracker.resize(MAIN, block.as_ptr(), 20).is_none());
            assert!(tracker.resize(MAIN, 0x42 as *mut u8, 20).is_none());
        }

        let outcomes = sink.outcomes();
        assert_eq!(outcomes[2], Outcome::ResizeOnFreed);
        assert_eq!(outcomes[3], Outcome::InvalidResize);
        assert!(tracker.allocator().resized.is_empty());
        assert_eq!(tracker.counters().resize_calls, 2);
        assert_eq!(tracker.counters().resize_errors, 2);
        assert_eq!(
            tracker
                .registry()
                .find_by_address(block.as_ptr() as usize)
                .unwrap()
                .status,
            Status::Freed
        );
    }

    #[test]
    fn test_resize_to_zero_releases() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 10).unwrap();

        assert!(unsafe { tracker.resize(MAIN, block.as_ptr(), 0) }.is_none());
        assert_eq!(sink.outcomes()[1], Outcome::Released);
        assert_eq!(tracker.allocator().released, vec![block.as_ptr() as usize]);
        assert!(tracker.allocator().resized.is_empty());
        assert_eq!(tracker.counters().total_freed, 10);
        assert_eq!(tracker.counters().release_successes, 0);
        assert!(tracker.finish().leaks.is_empty());
    }

    #[test]
    fn test_cross_file_release_emits_notice() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 10).unwrap();
        unsafe { tracker.release(OTHER, block.as_ptr()) };

        assert_eq!(
            sink.outcomes(),
            vec![
                Outcome::Tracked,
                Outcome::Released,
                Outcome::CrossSiteMismatch {
                    allocation_file: "src/main.rs"
                }
            ]
        );
        assert_eq!(tracker.counters().release_errors, 0);
    }

    #[test]
    fn test_same_file_different_function_is_not_a_mismatch() {
        let (mut tracker, sink) = tracker();
        let block = tracker.allocate(MAIN, 10).unwrap();
        let elsewhere = CallSite::new("src/main.rs", "app::cleanup", 40);
        unsafe { tracker.release(elsewhere, block.as_ptr()) };

        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_reused_address_keeps_one_record() {
        let (mut tracker, sink) = tracker();
        tracker.allocator_mut().reuse_released = true;

        let first = tracker.allocate(MAIN, 10).unwrap();
        unsafe { tracker.release(MAIN, first.as_ptr()) };
        let second = tracker.allocate(OTHER, 30).unwrap();

        assert_eq!(first, second);
        assert_eq!(sink.outcomes()[2], Outcome::Reused);
        assert_eq!(tracker.registry().len(), 1);
        let record = tracker.registry().records()[0];
        assert_eq!(record.size, 30);
        assert_eq!(record.allocation_site, OTHER);
    }

    #[test]
    fn test_capacity_overflow_leaves_block_untracked() {
        let sink = MemorySink::new();
        let mut tracker = Tracker::with_config(
            FakeAllocator::new(),
            Capacity::Bounded(1),
            Box::new(sink.clone()),
        );
        tracker.allocate(MAIN, 8).unwrap();
        let untracked = tracker.allocate(MAIN, 8).unwrap();
        unsafe { tracker.release(MAIN, untracked.as_ptr()) };

        assert_eq!(
            sink.outcomes(),
            vec![
                Outcome::Tracked,
                Outcome::CapacityExceeded,
                Outcome::InvalidRelease
            ]
        );
        assert_eq!(tracker.counters().release_errors, 1);
        assert!(tracker.allocator().released.is_empty());
    }
}
