pub use mtrack_macros::main;

mod allocator;
mod events;
mod global;
mod guard;
mod registry;
mod report;
mod tracker;

pub use allocator::{LibcAllocator, RawAllocator};
pub use events::{
    Event, EventKind, EventSink, MemorySink, NullSink, Outcome, Severity, StderrSink, TracingSink,
};
pub use global::{calloc, free, malloc, realloc};
pub use guard::{AtExitError, GuardBuilder, Mtrack};
pub use registry::{
    AllocationRecord, Capacity, Counters, Insertion, Registry, Release, Status, LEGACY_CAPACITY,
};
pub use report::{Report, Reporter};
pub use tracker::Tracker;

/// Tracked `malloc(size)`, recording the calling file, function and line.
///
/// Returns `*mut u8`, null on failure.
///
/// ```rust
/// let _mtrack = mtrack::GuardBuilder::new("main").build();
///
/// let name = mtrack::malloc!(16);
/// assert!(!name.is_null());
/// unsafe { mtrack::free!(name) };
/// ```
#[macro_export]
macro_rules! malloc {
    ($size:expr) => {
        $crate::malloc($crate::site!(), $size)
    };
}

/// Tracked `calloc(count, size)`.
#[macro_export]
macro_rules! calloc {
    ($count:expr, $size:expr) => {
        $crate::calloc($crate::site!(), $count, $size)
    };
}

/// Tracked `realloc(ptr, size)`. Must be used inside `unsafe`, see
/// [`realloc`](fn@crate::realloc).
#[macro_export]
macro_rules! realloc {
    ($ptr:expr, $size:expr) => {
        $crate::realloc($crate::site!(), $ptr, $size)
    };
}

/// Tracked `free(ptr)`. Must be used inside `unsafe`, see
/// [`free`](fn@crate::free).
#[macro_export]
macro_rules! free {
    ($ptr:expr) => {
        $crate::free($crate::site!(), $ptr)
    };
}
