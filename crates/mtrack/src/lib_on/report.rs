use serde::Serialize;

use super::registry::{AllocationRecord, Counters, Registry};

/// Final state of a tracking session, produced once by
/// [`Tracker::finish`](crate::Tracker::finish).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<&'static str>,
    pub counters: Counters,
    pub leaked_bytes: u64,
    /// Records still allocated, in first-seen order.
    pub leaks: Vec<AllocationRecord>,
    /// Every record, in first-seen order.
    pub records: Vec<AllocationRecord>,
}

impl Report {
    pub(crate) fn from_registry(registry: Registry) -> Self {
        let leaks = registry.snapshot_leaks();
        let leaked_bytes = leaks.iter().map(|record| record.size as u64).sum();
        Self {
            caller_name: None,
            counters: *registry.counters(),
            leaked_bytes,
            leaks,
            records: registry.records().to_vec(),
        }
    }

    pub fn with_caller_name(mut self, caller_name: &'static str) -> Self {
        self.caller_name = Some(caller_name);
        self
    }

    /// Nothing was ever tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn leak_count(&self) -> usize {
        self.leaks.len()
    }
}

/// Trait for custom report output.
///
/// Reporters run once, when the guard is dropped. Errors are printed to stderr
/// and do not reach the host program.
///
/// ```rust
/// use mtrack::{GuardBuilder, Report, Reporter};
///
/// struct LeakCount;
///
/// impl Reporter for LeakCount {
///     fn report(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
///         eprintln!("{} leaks", report.leak_count());
///         Ok(())
///     }
/// }
///
/// let _mtrack = GuardBuilder::new("main")
///     .reporter(Box::new(LeakCount))
///     .build();
/// ```
pub trait Reporter: Send + Sync {
    fn report(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>>;
}
