use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

use super::allocator::LibcAllocator;
use super::events::{EventSink, NullSink, StderrSink};
use super::global::{lock_state, MTRACK_STATE};
use super::registry::Capacity;
use super::report::Reporter;
use super::tracker::Tracker;
use crate::output::Format;
use crate::output_on;

/// Builder for the process-wide tracking guard.
///
/// The guard installs a [`Tracker`] over libc that the [`malloc!`](crate::malloc)
/// family of macros routes through. The report is produced when the guard is
/// dropped.
///
/// # Examples
///
/// ```rust
/// use mtrack::{Capacity, Format, GuardBuilder};
///
/// let _mtrack = GuardBuilder::new("main")
///     .capacity(Capacity::LEGACY)
///     .format(Format::JsonPretty)
///     .build();
///
/// let buffer = mtrack::malloc!(32);
/// unsafe { mtrack::free!(buffer) };
/// ```
///
/// # Environment
///
/// Variables read by [`build`](Self::build) override the builder:
///
/// * `MTRACK_CAPACITY=<n>` - bounded table of `n` records
/// * `MTRACK_JSON=1` - compact JSON report on stdout
/// * `MTRACK_QUIET=1` - no per-call event lines
///
/// # Limitations
///
/// Only one guard can be alive at a time. Building a second one panics.
pub struct GuardBuilder {
    caller_name: &'static str,
    capacity: Capacity,
    reporter: ReporterConfig,
    sink: Option<Box<dyn EventSink>>,
}

enum ReporterConfig {
    Format(Format),
    Custom(Box<dyn Reporter>),
    None, // Will default to Format::Table
}

impl GuardBuilder {
    /// `caller_name` identifies the session in the report.
    pub fn new(caller_name: &'static str) -> Self {
        Self {
            caller_name,
            capacity: Capacity::Unbounded,
            reporter: ReporterConfig::None,
            sink: None,
        }
    }

    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.reporter = ReporterConfig::Format(format);
        self
    }

    /// Replaces the built-in report output. Takes precedence over
    /// [`format`](Self::format) unless `MTRACK_JSON` is set.
    pub fn reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = ReporterConfig::Custom(reporter);
        self
    }

    /// Where per-call events go. Defaults to [`StderrSink`].
    pub fn sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Installs the process-wide tracker and returns the guard that reports on
    /// drop.
    ///
    /// # Panics
    ///
    /// Panics if another guard is alive.
    pub fn build(self) -> Mtrack {
        let reporter: Box<dyn Reporter> = if env_flag("MTRACK_JSON") {
            Box::new(output_on::JsonReporter)
        } else {
            match self.reporter {
                ReporterConfig::Format(format) => match format {
                    Format::Table => Box::new(output_on::TableReporter),
                    Format::Json => Box::new(output_on::JsonReporter),
                    Format::JsonPretty => Box::new(output_on::JsonPrettyReporter),
                },
                ReporterConfig::Custom(reporter) => reporter,
                ReporterConfig::None => Box::new(output_on::TableReporter),
            }
        };

        let capacity = std::env::var("MTRACK_CAPACITY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|&limit| limit > 0)
            .map(Capacity::Bounded)
            .unwrap_or(self.capacity);

        let sink: Box<dyn EventSink> = if env_flag("MTRACK_QUIET") {
            Box::new(NullSink)
        } else {
            self.sink.unwrap_or_else(|| Box::new(StderrSink))
        };

        Mtrack::new(self.caller_name, capacity, sink, reporter)
    }

    /// Builds the guard and keeps it until the process exits, via `atexit`.
    ///
    /// Use this when `main` may end through [`std::process::exit`], which skips
    /// destructors.
    ///
    /// # Panics
    ///
    /// Panics if another guard is alive.
    pub fn install_at_exit(self) -> Result<(), AtExitError> {
        let registered = *AT_EXIT_REGISTERED
            .get_or_init(|| unsafe { libc::atexit(report_at_exit) } == 0);
        if !registered {
            return Err(AtExitError);
        }

        let guard = self.build();
        *EXIT_GUARD.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);
        Ok(())
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

static AT_EXIT_REGISTERED: OnceLock<bool> = OnceLock::new();
static EXIT_GUARD: Mutex<Option<Mtrack>> = Mutex::new(None);

extern "C" fn report_at_exit() {
    let guard = EXIT_GUARD
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    drop(guard);
}

/// `atexit` refused to register the report hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtExitError;

impl fmt::Display for AtExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to register the mtrack exit handler")
    }
}

impl std::error::Error for AtExitError {}

/// Guard for the process-wide tracker. Dropping it finalizes the session and
/// runs the reporter.
pub struct Mtrack {
    caller_name: &'static str,
    reporter: Box<dyn Reporter>,
}

impl Mtrack {
    pub fn new(
        caller_name: &'static str,
        capacity: Capacity,
        sink: Box<dyn EventSink>,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        let mut state = lock_state();
        if state.is_some() {
            drop(state);
            panic!("More than one _mtrack guard cannot be alive at the same time.");
        }
        *state = Some(Tracker::with_config(LibcAllocator, capacity, sink));

        Self {
            caller_name,
            reporter,
        }
    }
}

impl Drop for Mtrack {
    fn drop(&mut self) {
        let Some(state) = MTRACK_STATE.get() else {
            return;
        };
        let tracker = state.lock().unwrap_or_else(PoisonError::into_inner).take();

        if let Some(tracker) = tracker {
            let report = tracker.finish().with_caller_name(self.caller_name);
            match self.reporter.report(&report) {
                Ok(()) => (),
                Err(e) => eprintln!("Failed to report mtrack results: {}", e),
            }
        }
    }
}
