use mtrack::{Report, Reporter};
use tracing::{info, info_span, warn};

struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
        let span = info_span!("mtrack_report", caller = report.caller_name.unwrap_or("?"));
        let _enter = span.enter();

        info!(
            allocations = report.counters.allocate_calls,
            frees = report.counters.release_calls,
            errors = report.counters.release_errors,
            "session finished"
        );

        for leak in &report.leaks {
            warn!(
                address = %mtrack::format_address(leak.address),
                size = leak.size,
                site = %leak.allocation_site,
                "leak"
            );
        }

        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let _mtrack = mtrack::GuardBuilder::new("tracing_sink::main")
        .sink(Box::new(mtrack::TracingSink))
        .reporter(Box::new(TracingReporter))
        .build();

    let block = mtrack::malloc!(24);
    let _leaked = mtrack::malloc!(48);
    unsafe {
        mtrack::free!(block);
        mtrack::free!(block);
    }
}
