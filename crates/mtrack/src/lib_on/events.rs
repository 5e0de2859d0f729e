use colored::*;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use super::registry::serialize_address;
use crate::output::format_address;
use crate::site::CallSite;

/// Which primitive an event was raised by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Allocate,
    ZeroAllocate,
    Resize,
    Release,
}

impl EventKind {
    /// The C name of the primitive.
    pub fn primitive(&self) -> &'static str {
        match self {
            EventKind::Allocate => "malloc",
            EventKind::ZeroAllocate => "calloc",
            EventKind::Resize => "realloc",
            EventKind::Release => "free",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primitive())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// What an intercepted call resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outcome {
    /// A new record was appended.
    Tracked,
    /// A released record at the same address was reinitialized.
    Reused,
    /// The address already had a live record. Nothing changed.
    AlreadyTracked,
    /// The table is full. The block was returned untracked.
    CapacityExceeded,
    /// The underlying allocator returned null, or the requested size
    /// overflowed.
    AllocationFailure,
    Resized {
        #[serde(serialize_with = "serialize_address")]
        new_address: usize,
        old_size: usize,
    },
    /// The underlying allocator could not resize. The original block is intact.
    ResizeFailure,
    Released,
    NullRelease,
    DoubleRelease,
    InvalidRelease,
    InvalidResize,
    ResizeOnFreed,
    /// The block is being resized or released from another source file than
    /// the one that allocated it.
    CrossSiteMismatch { allocation_file: &'static str },
}

impl Outcome {
    pub fn severity(&self) -> Severity {
        match self {
            Outcome::Tracked
            | Outcome::Reused
            | Outcome::AlreadyTracked
            | Outcome::Resized { .. }
            | Outcome::Released
            | Outcome::NullRelease => Severity::Info,
            Outcome::CapacityExceeded
            | Outcome::AllocationFailure
            | Outcome::ResizeFailure
            | Outcome::CrossSiteMismatch { .. } => Severity::Warning,
            Outcome::DoubleRelease
            | Outcome::InvalidRelease
            | Outcome::InvalidResize
            | Outcome::ResizeOnFreed => Severity::Error,
        }
    }

    /// Misuse by the caller. These are the outcomes that bump an error counter.
    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Tracked => "tracked",
            Outcome::Reused => "reused",
            Outcome::AlreadyTracked => "already-tracked",
            Outcome::CapacityExceeded => "capacity-exceeded",
            Outcome::AllocationFailure => "allocation-failure",
            Outcome::Resized { .. } => "resized",
            Outcome::ResizeFailure => "resize-failure",
            Outcome::Released => "released",
            Outcome::NullRelease => "null-release",
            Outcome::DoubleRelease => "double-release",
            Outcome::InvalidRelease => "invalid-release",
            Outcome::InvalidResize => "invalid-resize",
            Outcome::ResizeOnFreed => "resize-on-freed",
            Outcome::CrossSiteMismatch { .. } => "cross-site-mismatch",
        }
    }
}

/// One diagnostic record per intercepted call, plus one extra
/// [`Outcome::CrossSiteMismatch`] event when a block changes hands between
/// source files.
///
/// `address` is the pointer the call was about: the returned block for
/// allocations, the incoming pointer for resizes and releases. `size` is the
/// requested size, or the record's size for releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub site: CallSite,
    #[serde(serialize_with = "serialize_address")]
    pub address: usize,
    pub size: usize,
    /// Element count and element size of a zero-initialized allocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<(usize, usize)>,
    pub outcome: Outcome,
}

impl Event {
    pub fn severity(&self) -> Severity {
        self.outcome.severity()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[mtrack][{}] ", self.kind)?;
        let address = format_address(self.address);

        match self.outcome {
            Outcome::DoubleRelease => write!(
                f,
                "ERROR: double free by {} detected for pointer {}",
                self.site.qualified(),
                address
            ),
            Outcome::InvalidRelease => write!(
                f,
                "ERROR: free called by {} on untracked or invalid pointer {}",
                self.site.qualified(),
                address
            ),
            Outcome::ResizeOnFreed => write!(
                f,
                "ERROR: realloc called by {} on a freed pointer {}",
                self.site.qualified(),
                address
            ),
            Outcome::InvalidResize => write!(
                f,
                "ERROR: realloc called by {} on untracked or invalid pointer {}",
                self.site.qualified(),
                address
            ),
            Outcome::CrossSiteMismatch { allocation_file } => {
                let verb = match self.kind {
                    EventKind::Resize => "reallocated",
                    _ => "freed",
                };
                write!(
                    f,
                    "WARNING: memory block {} allocated by {} but {} by {}",
                    address, allocation_file, verb, self.site.file
                )
            }
            Outcome::Resized { new_address, .. } => write!(
                f,
                "from {} for ptr {} to size {} -> {}",
                self.site,
                address,
                self.size,
                format_address(new_address)
            ),
            Outcome::ResizeFailure => write!(
                f,
                "from {} for ptr {} to size {} -> (nil)",
                self.site, address, self.size
            ),
            Outcome::Released | Outcome::NullRelease if self.kind == EventKind::Resize => write!(
                f,
                "from {} for ptr {} to size 0 -> released",
                self.site, address
            ),
            Outcome::Released | Outcome::NullRelease => {
                write!(f, "from {} for pointer {}", self.site, address)
            }
            Outcome::Tracked
            | Outcome::Reused
            | Outcome::AlreadyTracked
            | Outcome::CapacityExceeded
            | Outcome::AllocationFailure => {
                match self.elements {
                    Some((count, element_size)) => write!(
                        f,
                        "from {} for {} x {} bytes (total {}) -> {}",
                        self.site, count, element_size, self.size, address
                    )?,
                    None => write!(f, "from {} for size {} -> {}", self.site, self.size, address)?,
                }
                if self.outcome == Outcome::CapacityExceeded {
                    f.write_str(" (table capacity reached, not tracked)")?;
                }
                Ok(())
            }
        }
    }
}

/// Receives one [`Event`] per intercepted call, synchronously.
///
/// Sinks run while the tracker is mid-operation. They must not call back into
/// the tracking macros.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Writes one line per event to stderr. Warnings are yellow and errors red.
/// Colors follow `NO_COLOR` and terminal detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl EventSink for StderrSink {
    fn record(&self, event: &Event) {
        let line = event.to_string();
        match event.severity() {
            Severity::Info => eprintln!("{}", line),
            Severity::Warning => eprintln!("{}", line.yellow()),
            Severity::Error => eprintln!("{}", line.red().bold()),
        }
    }
}

/// Forwards events to `tracing` under the `mtrack` target, at a level
/// matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

macro_rules! trace_event {
    ($level:ident, $event:expr) => {
        tracing::$level!(
            target: "mtrack",
            kind = $event.kind.primitive(),
            file = $event.site.file,
            function = $event.site.function,
            line = $event.site.line,
            address = %format_address($event.address),
            size = $event.size,
            outcome = $event.outcome.name(),
            "{}",
            $event
        )
    };
}

impl EventSink for TracingSink {
    fn record(&self, event: &Event) {
        match event.severity() {
            Severity::Info => trace_event!(info, event),
            Severity::Warning => trace_event!(warn, event),
            Severity::Error => trace_event!(error, event),
        }
    }
}

/// Keeps every event in memory. Clones share the same buffer, so a test can
/// hand one clone to the tracker and inspect the other.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.events().iter().map(|event| event.outcome).collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*event);
    }
}

/// Discards events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: CallSite = CallSite::new("src/main.rs", "app::main", 7);

    fn event(kind: EventKind, address: usize, size: usize, outcome: Outcome) -> Event {
        Event {
            kind,
            site: MAIN,
            address,
            size,
            elements: None,
            outcome,
        }
    }

    #[test]
    fn test_allocation_lines() {
        let tracked = event(EventKind::Allocate, 0x1000, 10, Outcome::Tracked);
        assert_eq!(
            tracked.to_string(),
            "[mtrack][malloc] from src/main.rs:7 for size 10 -> 0x1000"
        );

        let failed = event(EventKind::Allocate, 0, 10, Outcome::AllocationFailure);
        assert_eq!(
            failed.to_string(),
            "[mtrack][malloc] from src/main.rs:7 for size 10 -> (nil)"
        );

        let zeroed = Event {
            elements: Some((5, 4)),
            ..event(EventKind::ZeroAllocate, 0x2000, 20, Outcome::Tracked)
        };
        assert_eq!(
            zeroed.to_string(),
            "[mtrack][calloc] from src/main.rs:7 for 5 x 4 bytes (total 20) -> 0x2000"
        );

        let full = event(EventKind::Allocate, 0x3000, 8, Outcome::CapacityExceeded);
        assert!(full
            .to_string()
            .ends_with("-> 0x3000 (table capacity reached, not tracked)"));
    }

    #[test]
    fn test_error_lines_carry_qualified_site() {
        let double = event(EventKind::Release, 0x1000, 10, Outcome::DoubleRelease);
        assert_eq!(
            double.to_string(),
            "[mtrack][free] ERROR: double free by src/main.rs:app::main:7 detected for pointer 0x1000"
        );

        let invalid = event(EventKind::Resize, 0x1005, 40, Outcome::InvalidResize);
        assert_eq!(
            invalid.to_string(),
            "[mtrack][realloc] ERROR: realloc called by src/main.rs:app::main:7 on untracked or invalid pointer 0x1005"
        );
    }

    #[test]
    fn test_resize_and_cross_site_lines() {
        let resized = event(
            EventKind::Resize,
            0x1000,
            20,
            Outcome::Resized {
                new_address: 0x1100,
                old_size: 10,
            },
        );
        assert_eq!(
            resized.to_string(),
            "[mtrack][realloc] from src/main.rs:7 for ptr 0x1000 to size 20 -> 0x1100"
        );

        let mismatch = event(
            EventKind::Release,
            0x1000,
            10,
            Outcome::CrossSiteMismatch {
                allocation_file: "src/lib.rs",
            },
        );
        assert_eq!(
            mismatch.to_string(),
            "[mtrack][free] WARNING: memory block 0x1000 allocated by src/lib.rs but freed by src/main.rs"
        );
    }

    #[test]
    fn test_severity_classes() {
        assert_eq!(Outcome::Tracked.severity(), Severity::Info);
        assert_eq!(Outcome::CapacityExceeded.severity(), Severity::Warning);
        assert!(Outcome::DoubleRelease.is_error());
        assert!(Outcome::ResizeOnFreed.is_error());
        assert!(!Outcome::ResizeFailure.is_error());
        assert!(!Outcome::CrossSiteMismatch {
            allocation_file: "a.rs"
        }
        .is_error());
    }

    #[test]
    fn test_memory_sink_clones_share_buffer() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        sink.record(&event(EventKind::Release, 0, 0, Outcome::NullRelease));

        assert_eq!(handle.outcomes(), vec![Outcome::NullRelease]);
    }

    #[test]
    fn test_event_json_shape() {
        let resized = event(
            EventKind::Resize,
            0x1000,
            20,
            Outcome::Resized {
                new_address: 0x1100,
                old_size: 10,
            },
        );
        let json = serde_json::to_value(resized).unwrap();

        assert_eq!(json["kind"], "resize");
        assert_eq!(json["address"], "0x1000");
        assert_eq!(json["outcome"]["type"], "resized");
        assert_eq!(json["outcome"]["new_address"], "0x1100");
        assert_eq!(json["outcome"]["old_size"], 10);
        assert!(json.get("elements").is_none());
    }
}
