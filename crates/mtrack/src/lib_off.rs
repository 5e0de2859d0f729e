pub use mtrack_macros::main;

use crate::site::CallSite;

#[macro_export]
macro_rules! malloc {
    ($size:expr) => {
        $crate::malloc($crate::site!(), $size)
    };
}

#[macro_export]
macro_rules! calloc {
    ($count:expr, $size:expr) => {
        $crate::calloc($crate::site!(), $count, $size)
    };
}

#[macro_export]
macro_rules! realloc {
    ($ptr:expr, $size:expr) => {
        $crate::realloc($crate::site!(), $ptr, $size)
    };
}

#[macro_export]
macro_rules! free {
    ($ptr:expr) => {
        $crate::free($crate::site!(), $ptr)
    };
}

#[inline]
pub fn malloc(_site: CallSite, size: usize) -> *mut u8 {
    unsafe { libc::malloc(size).cast() }
}

#[inline]
pub fn calloc(_site: CallSite, count: usize, size: usize) -> *mut u8 {
    unsafe { libc::calloc(count, size).cast() }
}

/// # Safety
///
/// Same contract as libc `realloc`.
#[inline]
pub unsafe fn realloc<T>(_site: CallSite, ptr: *mut T, size: usize) -> *mut T {
    unsafe { libc::realloc(ptr.cast(), size).cast() }
}

/// # Safety
///
/// Same contract as libc `free`.
#[inline]
pub unsafe fn free<T>(_site: CallSite, ptr: *mut T) {
    unsafe { libc::free(ptr.cast()) }
}

pub use crate::Format;

pub const LEGACY_CAPACITY: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capacity {
    #[default]
    Unbounded,
    Bounded(usize),
}

impl Capacity {
    pub const LEGACY: Capacity = Capacity::Bounded(LEGACY_CAPACITY);
}

#[derive(Debug, Clone, Default)]
pub struct Report {}

impl Report {
    pub fn is_empty(&self) -> bool {
        true
    }

    pub fn leak_count(&self) -> usize {
        0
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>>;
}

#[derive(Debug, Clone, Copy)]
pub struct Event {}

pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl EventSink for StderrSink {
    fn record(&self, _event: &Event) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, _event: &Event) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &Event) {}
}

pub struct GuardBuilder {}

impl GuardBuilder {
    pub fn new(_caller_name: &'static str) -> Self {
        Self {}
    }

    pub fn capacity(self, _capacity: Capacity) -> Self {
        self
    }

    pub fn format(self, _format: Format) -> Self {
        self
    }

    pub fn reporter(self, _reporter: Box<dyn Reporter>) -> Self {
        self
    }

    pub fn sink(self, _sink: Box<dyn EventSink>) -> Self {
        self
    }

    pub fn build(self) -> Mtrack {
        Mtrack
    }

    pub fn install_at_exit(self) -> Result<(), AtExitError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtExitError;

impl std::fmt::Display for AtExitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failed to register the mtrack exit handler")
    }
}

impl std::error::Error for AtExitError {}

pub struct Mtrack;

impl Drop for Mtrack {
    fn drop(&mut self) {}
}
