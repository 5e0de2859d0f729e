/// The allocator being tracked.
///
/// Implementations return null on failure and keep no tracking state of their
/// own. The [`Tracker`](crate::Tracker) calls `resize` and `release` only with
/// pointers it knows to be live blocks produced by this allocator.
pub trait RawAllocator {
    fn allocate(&mut self, size: usize) -> *mut u8;

    fn zero_allocate(&mut self, count: usize, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be a live block returned by this allocator.
    unsafe fn resize(&mut self, ptr: *mut u8, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be a live block returned by this allocator.
    unsafe fn release(&mut self, ptr: *mut u8);
}

/// The C heap: `malloc`, `calloc`, `realloc` and `free` from libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcAllocator;

impl RawAllocator for LibcAllocator {
    fn allocate(&mut self, size: usize) -> *mut u8 {
        unsafe { libc::malloc(size).cast() }
    }

    fn zero_allocate(&mut self, count: usize, size: usize) -> *mut u8 {
        unsafe { libc::calloc(count, size).cast() }
    }

    unsafe fn resize(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        unsafe { libc::realloc(ptr.cast(), size).cast() }
    }

    unsafe fn release(&mut self, ptr: *mut u8) {
        unsafe { libc::free(ptr.cast()) }
    }
}
