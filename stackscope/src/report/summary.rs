//! Summary block: uptime, totals, failures and frame buffer usage

use std::io::{self, Write};

use super::snapshot::Snapshot;
use crate::domain::FailureReason;

pub(crate) fn write_summary(snapshot: &Snapshot, out: &mut dyn Write) -> io::Result<()> {
    let info = &snapshot.info;
    let units = info.event.units();

    writeln!(out, "--- Execution profile ---")?;
    writeln!(out, "{:<20}: {}", "Event", info.event)?;
    writeln!(out, "{:<20}: {} {units}", "Interval", info.interval)?;
    #[allow(clippy::cast_precision_loss)]
    let uptime = info.uptime_ms as f64 / 1000.0;
    writeln!(out, "{:<20}: {uptime:.3} s", "Uptime")?;
    writeln!(out, "{:<20}: {}", "Total samples", info.total_samples)?;
    writeln!(out, "{:<20}: {} {units}", "Total counter", info.total_counter)?;
    writeln!(out, "{:<20}: {}", "Distinct traces", snapshot.traces.len())?;

    for reason in FailureReason::ALL {
        let count = info.failure_count(reason);
        if count > 0 {
            writeln!(
                out,
                "{:<20}: {count} ({:.2}%)",
                reason.name(),
                percent(count, info.total_samples)
            )?;
        }
    }
    if info.dropped_methods > 0 {
        writeln!(out, "{:<20}: {}", "Flat profile drops", info.dropped_methods)?;
    }

    let buffer = &info.frame_buffer;
    writeln!(
        out,
        "{:<20}: {}/{} ({:.4}%)",
        "Frame buffer usage",
        buffer.used,
        buffer.capacity,
        percent(buffer.used, buffer.capacity)
    )?;
    if buffer.overflowed {
        writeln!(out, "Frame buffer overflowed! Consider increasing its size.")?;
    }
    writeln!(out)
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, FAILURE_TYPES};
    use crate::report::snapshot::{FrameBufferUsage, SessionInfo};

    fn snapshot(failures: [u64; FAILURE_TYPES], overflowed: bool) -> Snapshot {
        Snapshot {
            info: SessionInfo {
                generation: 1,
                event: EventKind::Alloc,
                interval: 524_288,
                uptime_ms: 2500,
                total_samples: 200,
                total_counter: 4096,
                failures,
                dropped_methods: 0,
                frame_buffer: FrameBufferUsage { used: 50, capacity: 1000, overflowed },
            },
            traces: Vec::new(),
            methods: Vec::new(),
        }
    }

    fn render(snapshot: &Snapshot) -> String {
        let mut out = Vec::new();
        write_summary(snapshot, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_summary_lists_only_nonzero_failures() {
        let mut failures = [0; FAILURE_TYPES];
        failures[FailureReason::GcActive.index()] = 10;
        let text = render(&snapshot(failures, false));

        assert!(text.starts_with("--- Execution profile ---\n"));
        assert!(text.contains("Total samples       : 200\n"));
        assert!(text.contains("Total counter       : 4096 bytes\n"));
        assert!(text.contains("Uptime              : 2.500 s\n"));
        assert!(text.contains("gc_active           : 10 (5.00%)\n"));
        assert!(!text.contains("safepoint"));
        assert!(text.contains("Frame buffer usage  : 50/1000 (5.0000%)\n"));
        assert!(!text.contains("overflowed"));
    }

    #[test]
    fn test_summary_warns_on_overflow() {
        let text = render(&snapshot([0; FAILURE_TYPES], true));
        assert!(text.contains("Frame buffer overflowed!"));
    }

    #[test]
    fn test_percent_of_zero_total() {
        assert!(percent(5, 0).abs() < f64::EPSILON);
    }
}
