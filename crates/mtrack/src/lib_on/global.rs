//! Process-wide tracker behind the [`malloc!`](crate::malloc),
//! [`calloc!`](crate::calloc), [`realloc!`](crate::realloc) and
//! [`free!`](crate::free) macros.

use std::ptr::{self, NonNull};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use super::allocator::{LibcAllocator, RawAllocator};
use super::tracker::Tracker;
use crate::site::CallSite;

/// `None` once the guard has finalized the session.
pub(crate) static MTRACK_STATE: OnceLock<Mutex<Option<Tracker<LibcAllocator>>>> =
    OnceLock::new();

pub(crate) fn lock_state() -> MutexGuard<'static, Option<Tracker<LibcAllocator>>> {
    MTRACK_STATE
        .get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn with_tracker<R>(f: impl FnOnce(Option<&mut Tracker<LibcAllocator>>) -> R) -> R {
    let Some(state) = MTRACK_STATE.get() else {
        panic!(
            "mtrack used without a guard. Add #[mtrack::main] to main or build one with mtrack::GuardBuilder."
        );
    };
    let mut tracker = state.lock().unwrap_or_else(PoisonError::into_inner);
    f(tracker.as_mut())
}

fn into_raw(block: Option<NonNull<u8>>) -> *mut u8 {
    block.map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// Tracked `malloc`. Prefer the [`malloc!`](crate::malloc) macro, which fills in
/// the call site.
///
/// After the guard has reported, allocations go straight to libc untracked.
///
/// # Panics
///
/// Panics if no guard was ever built.
pub fn malloc(site: CallSite, size: usize) -> *mut u8 {
    with_tracker(|tracker| match tracker {
        Some(tracker) => into_raw(tracker.allocate(site, size)),
        None => LibcAllocator.allocate(size),
    })
}

/// Tracked `calloc`. See [`malloc`].
pub fn calloc(site: CallSite, count: usize, size: usize) -> *mut u8 {
    with_tracker(|tracker| match tracker {
        Some(tracker) => into_raw(tracker.zero_allocate(site, count, size)),
        None => LibcAllocator.zero_allocate(count, size),
    })
}

/// Tracked `realloc`.
///
/// Returns null and leaves the block alone when `ptr` is not a live tracked
/// block, or once the guard has reported.
///
/// # Safety
///
/// `ptr` must not have been freed or reallocated outside of mtrack since it was
/// allocated.
///
/// # Panics
///
/// Panics if no guard was ever built.
pub unsafe fn realloc<T>(site: CallSite, ptr: *mut T, size: usize) -> *mut T {
    with_tracker(|tracker| match tracker {
        Some(tracker) => into_raw(unsafe { tracker.resize(site, ptr.cast(), size) }).cast(),
        None => ptr::null_mut(),
    })
}

/// Tracked `free`. Suppressed once the guard has reported.
///
/// # Safety
///
/// See [`realloc`].
///
/// # Panics
///
/// Panics if no guard was ever built.
pub unsafe fn free<T>(site: CallSite, ptr: *mut T) {
    with_tracker(|tracker| {
        if let Some(tracker) = tracker {
            unsafe { tracker.release(site, ptr.cast()) }
        }
    })
}
