//! A diagnostic allocation tracker for native memory.
//!
//! `mtrack` wraps the four primitive allocation calls (`malloc`, `calloc`,
//! `realloc`, `free`), records where every block was allocated and released, and
//! prints a leak report when tracking ends. Misuse is detected without touching
//! the underlying allocator: double frees, frees of foreign pointers and reallocs
//! of released blocks are reported and suppressed instead of being forwarded.
//!
//! Two ways to use it:
//!
//! * [`Tracker`] is an explicit context object over any [`RawAllocator`]. It is
//!   what tests and embedders use.
//! * `#[mtrack::main]` (or [`GuardBuilder`]) installs a process-wide tracker over
//!   libc, and the [`malloc!`], [`calloc!`], [`realloc!`] and [`free!`] macros route
//!   through it, capturing file, function and line of each call site.
//!
//! The tracker itself is single-threaded. The process-wide layer serializes
//! calls through a mutex, but hosts that allocate from several threads still
//! have to order their own alloc/free pairs.

#[cfg(not(feature = "mtrack-off"))]
#[doc(inline)]
pub use lib_on::*;
#[cfg(not(feature = "mtrack-off"))]
mod lib_on;

mod site;
pub use site::CallSite;

pub(crate) mod output;
pub use output::{format_address, format_bytes, shorten_function_name, Format};

#[cfg(not(feature = "mtrack-off"))]
pub(crate) mod output_on;

// With mtrack-off the macros expand to plain libc calls and the guard does nothing
#[cfg(feature = "mtrack-off")]
#[doc(inline)]
pub use lib_off::*;
#[cfg(feature = "mtrack-off")]
mod lib_off;

#[doc(hidden)]
pub use libc;
