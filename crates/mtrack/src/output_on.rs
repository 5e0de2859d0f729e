use colored::*;
use prettytable::{Attr, Cell, Row, Table};
use std::io::{self, Write};

use crate::output::{format_address, format_bytes, shorten_function_name};
use crate::{AllocationRecord, Report, Reporter, Status};

const RULE: &str = "=========================================";

fn header_row(headers: &[&str]) -> Row {
    Row::new(
        headers
            .iter()
            .map(|header| Cell::new(header).with_style(Attr::Bold))
            .collect(),
    )
}

fn banner(out: &mut dyn Write, title: &str) -> io::Result<()> {
    writeln!(out, "\n{}", RULE.blue())?;
    writeln!(out, "{}", format!("{:^41}", title).blue().bold())?;
    writeln!(out, "{}", RULE.blue())
}

fn leak_table(leaks: &[AllocationRecord]) -> Table {
    let mut table = Table::new();
    table.add_row(header_row(&["Address", "Size", "Allocated at", "Function"]));

    for leak in leaks {
        table.add_row(Row::new(vec![
            Cell::new(&format_address(leak.address)),
            Cell::new(&format!("{} bytes", leak.size)),
            Cell::new(&leak.allocation_site.to_string()),
            Cell::new(&shorten_function_name(leak.allocation_site.function)),
        ]));
    }

    table
}

fn allocation_table(records: &[AllocationRecord]) -> Table {
    let mut table = Table::new();
    table.add_row(header_row(&[
        "#",
        "Address",
        "Size",
        "Status",
        "Allocated by",
        "Freed by",
    ]));

    for (index, record) in records.iter().enumerate() {
        let status = match record.status {
            Status::Allocated => "ALLOCATED",
            Status::Freed => "FREED",
        };
        let freed_by = record
            .release_site
            .map(|site| format!("{} ({})", site, shorten_function_name(site.function)))
            .unwrap_or_else(|| "-".to_string());

        table.add_row(Row::new(vec![
            Cell::new(&index.to_string()),
            Cell::new(&format_address(record.address)),
            Cell::new(&format_bytes(record.size as u64)),
            Cell::new(status),
            Cell::new(&format!(
                "{} ({})",
                record.allocation_site,
                shorten_function_name(record.allocation_site.function)
            )),
            Cell::new(&freed_by),
        ]));
    }

    table
}

/// Writes the human-readable report: summaries, leaks, then every record.
pub(crate) fn display_report(report: &Report, out: &mut dyn Write) -> io::Result<()> {
    if report.is_empty() {
        return display_nothing_tracked(report, out);
    }

    banner(out, "MTRACK REPORT")?;
    if let Some(caller_name) = report.caller_name {
        writeln!(out, "{} {}", "[mtrack]".blue().bold(), caller_name.yellow().bold())?;
    }

    let counters = &report.counters;
    writeln!(out, "\n{}", "[+] Allocation Summary:".cyan())?;
    writeln!(out, "  - Malloc calls: {}", counters.allocate_calls.to_string().yellow())?;
    writeln!(out, "  - Calloc calls: {}", counters.zero_allocate_calls.to_string().yellow())?;
    writeln!(out, "  - Realloc calls: {}", counters.resize_calls.to_string().yellow())?;
    writeln!(out, "  - Total allocated: {}", format_bytes(counters.total_allocated).yellow())?;

    writeln!(out, "\n{}", "[+] Free Summary:".cyan())?;
    writeln!(out, "  - Free calls: {}", counters.release_calls.to_string().yellow())?;
    writeln!(out, "  - Successful frees: {}", counters.release_successes.to_string().green())?;
    writeln!(out, "  - Free errors: {}", counters.release_errors.to_string().red())?;
    writeln!(out, "  - Realloc errors: {}", counters.resize_errors.to_string().red())?;
    writeln!(out, "  - Total freed: {}", format_bytes(counters.total_freed).yellow())?;

    banner(out, "Memory Leaks")?;
    if report.leaks.is_empty() {
        writeln!(out, "\n{}", "[SUCCESS] No memory leaks detected.".green())?;
    } else {
        leak_table(&report.leaks).print(out)?;
        let summary = format!(
            "[SUMMARY] Total leaks: {} allocations, {} bytes",
            report.leak_count(),
            report.leaked_bytes
        );
        writeln!(out, "\n{}", summary.red())?;
    }

    banner(out, "MTRACK Allocation Table")?;
    allocation_table(&report.records).print(out)?;

    writeln!(out, "\n{}", "--- END MTRACK REPORT ---".blue())
}

fn display_nothing_tracked(report: &Report, out: &mut dyn Write) -> io::Result<()> {
    writeln!(
        out,
        "\n{}",
        "--- MTRACK REPORT (No allocations tracked) ---".blue()
    )?;
    if let Some(caller_name) = report.caller_name {
        writeln!(
            out,
            "Use {} inside {} to track allocations.",
            "mtrack::malloc!".cyan().bold(),
            caller_name.yellow().bold()
        )?;
    }
    Ok(())
}

pub(crate) struct TableReporter;

impl Reporter for TableReporter {
    fn report(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
        let stderr = io::stderr();
        let mut out = stderr.lock();
        display_report(report, &mut out)?;
        Ok(())
    }
}

pub(crate) struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string(report)?);
        Ok(())
    }
}

pub(crate) struct JsonPrettyReporter;

impl Reporter for JsonPrettyReporter {
    fn report(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallSite, Capacity, MemorySink, RawAllocator, Tracker};

    fn render(report: &Report) -> String {
        colored::control::set_override(false);
        let mut out = Vec::new();
        display_report(report, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn tracker() -> Tracker {
        Tracker::with_config(
            crate::LibcAllocator,
            Capacity::Unbounded,
            Box::new(MemorySink::new()),
        )
    }

    #[test]
    fn test_empty_report_notice() {
        let report = tracker().finish().with_caller_name("app::main");
        let text = render(&report);

        assert!(text.contains("--- MTRACK REPORT (No allocations tracked) ---"));
        assert!(text.contains("app::main"));
        assert!(!text.contains("END MTRACK REPORT"));
    }

    #[test]
    fn test_clean_run_report() {
        let site = CallSite::new("src/main.rs", "app::main", 4);
        let mut tracker = tracker();
        let block = tracker.allocate(site, 10).unwrap();
        unsafe { tracker.release(site, block.as_ptr()) };
        let text = render(&tracker.finish());

        assert!(text.contains("MTRACK REPORT"));
        assert!(text.contains("  - Malloc calls: 1"));
        assert!(text.contains("  - Successful frees: 1"));
        assert!(text.contains("  - Free errors: 0"));
        assert!(text.contains("  - Total allocated: 10 B"));
        assert!(text.contains("[SUCCESS] No memory leaks detected."));
        assert!(text.contains("FREED"));
        assert!(text.contains("src/main.rs:4 (app::main)"));
        assert!(text.trim_end().ends_with("--- END MTRACK REPORT ---"));
    }

    #[test]
    fn test_leak_report_lists_leaks_in_order() {
        let site = CallSite::new("src/leaks.rs", "app::leaks::build", 12);
        let mut tracker = tracker();
        let first = tracker.allocate(site, 100).unwrap();
        let second = tracker.zero_allocate(site, 10, 4).unwrap();
        let text = render(&tracker.finish());

        assert!(text.contains("[SUMMARY] Total leaks: 2 allocations, 140 bytes"));
        assert!(text.contains("leaks::build"));
        assert!(text.contains("ALLOCATED"));
        let first_at = text.find(&format_address(first.as_ptr() as usize)).unwrap();
        let second_at = text.find(&format_address(second.as_ptr() as usize)).unwrap();
        assert!(first_at < second_at);

        unsafe {
            crate::LibcAllocator.release(first.as_ptr());
            crate::LibcAllocator.release(second.as_ptr());
        }
    }
}
