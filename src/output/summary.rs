use crate::output::report::RunReport;
use std::fmt::Write;

/// Formats a run report for the console
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    let _ = writeln!(out, "=== Harvest Run {} ===\n", report.run_id);
    if let Some(error) = &report.error {
        let _ = writeln!(out, "Run failed: {}\n", error);
    }

    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Sources: {}", summary.sources_total);
    let _ = writeln!(out, "  Ok: {}", summary.sources_ok);
    let _ = writeln!(out, "  Failed: {}", summary.sources_failed);
    if summary.sources_skipped > 0 {
        let _ = writeln!(out, "  Skipped: {}", summary.sources_skipped);
    }
    let _ = writeln!(out, "  Items kept: {}", summary.items_kept);
    let _ = writeln!(out, "  Items dropped: {}", summary.items_dropped);
    let duration = report.finished_at - report.started_at;
    let _ = writeln!(
        out,
        "  Duration: {:.1}s",
        duration.num_milliseconds() as f64 / 1000.0
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Sources:");
    for source in &report.sources {
        let status = if source.skipped {
            "SKIPPED"
        } else if source.cancelled {
            "CANCELLED"
        } else if source.ok {
            "OK"
        } else {
            "FAILED"
        };
        let _ = writeln!(
            out,
            "  [{}] {}: {} kept, {} dropped, {} page errors",
            status,
            source.source_id,
            source.stats.items_kept,
            source.stats.items_dropped,
            source.errors.len()
        );
        if let Some(error) = &source.fatal_error {
            let _ = writeln!(out, "      error: {}", error);
        }
        if !source.diagnosis.is_ok() {
            let _ = writeln!(
                out,
                "      diagnosis: {:?} -> {:?} ({})",
                source.diagnosis.label, source.diagnosis.next_step, source.diagnosis.reason
            );
        }
        if source.escalated {
            let _ = writeln!(out, "      escalated to rendering engine");
        }
    }

    let success_rate = if summary.sources_total > summary.sources_skipped {
        summary.sources_ok as f64 / (summary.sources_total - summary.sources_skipped) as f64
            * 100.0
    } else {
        0.0
    };
    let _ = writeln!(
        out,
        "\nSuccess Rate: {:.1}% ({} / {} sources)",
        success_rate,
        summary.sources_ok,
        summary.sources_total - summary.sources_skipped
    );
    out
}

/// Prints a run report summary to stderr
pub fn print_report(report: &RunReport) {
    eprint!("{}", format_report(report));
}
