//! Process statistics for the `stats` command.

use std::time::{Duration, Instant};

/// A point-in-time reading of the process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessStats {
    pub uptime: Duration,
    /// User + system CPU time consumed so far.
    pub cpu_time: Duration,
    /// Average CPU usage over the uptime, in percent of one core.
    pub cpu_percent: f64,
    /// Peak resident set size in MiB.
    pub memory_peak_mib: f64,
    /// Physical memory of the machine in MiB.
    pub memory_total_mib: f64,
}

impl ProcessStats {
    /// Peak resident set size as a share of physical memory.
    pub fn memory_percent(&self) -> f64 {
        if self.memory_total_mib > 0.0 {
            self.memory_peak_mib / self.memory_total_mib * 100.0
        } else {
            0.0
        }
    }
}

/// Read process statistics. `started` is when the bot came up.
#[cfg(unix)]
pub fn probe(started: Instant) -> ProcessStats {
    let uptime = started.elapsed();

    // SAFETY: getrusage only writes into the zeroed struct we hand it.
    let usage = unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
            Some(usage)
        } else {
            None
        }
    };
    let (cpu_time, max_rss_kib) = match usage {
        Some(u) => (
            timeval(u.ru_utime) + timeval(u.ru_stime),
            u.ru_maxrss.max(0) as f64,
        ),
        None => (Duration::ZERO, 0.0),
    };
    // Linux reports ru_maxrss in KiB, macOS in bytes.
    let memory_peak_mib = if cfg!(target_os = "macos") {
        max_rss_kib / (1024.0 * 1024.0)
    } else {
        max_rss_kib / 1024.0
    };

    // SAFETY: sysconf has no preconditions.
    let (pages, page_size) = unsafe {
        (
            libc::sysconf(libc::_SC_PHYS_PAGES),
            libc::sysconf(libc::_SC_PAGESIZE),
        )
    };
    let memory_total_mib = if pages > 0 && page_size > 0 {
        pages as f64 * page_size as f64 / (1024.0 * 1024.0)
    } else {
        0.0
    };

    ProcessStats {
        uptime,
        cpu_time,
        cpu_percent: cpu_percent(cpu_time, uptime),
        memory_peak_mib,
        memory_total_mib,
    }
}

#[cfg(not(unix))]
pub fn probe(started: Instant) -> ProcessStats {
    ProcessStats {
        uptime: started.elapsed(),
        cpu_time: Duration::ZERO,
        cpu_percent: 0.0,
        memory_peak_mib: 0.0,
        memory_total_mib: 0.0,
    }
}

#[cfg(unix)]
fn timeval(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}

fn cpu_percent(cpu_time: Duration, uptime: Duration) -> f64 {
    if uptime.is_zero() {
        0.0
    } else {
        cpu_time.as_secs_f64() / uptime.as_secs_f64() * 100.0
    }
}

/// `N day(s)\nN hour(s)\nN minute(s)\nN second(s)`, one unit per line.
pub fn format_span(span: Duration) -> Vec<String> {
    let secs = span.as_secs();
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    let seconds = secs % 60;
    vec![
        format!("{days} day(s)"),
        format!("{hours} hour(s)"),
        format!("{minutes} minute(s)"),
        format!("{seconds} second(s)"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_breakdown() {
        let span = Duration::from_secs(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5);
        assert_eq!(
            format_span(span),
            vec!["2 day(s)", "3 hour(s)", "4 minute(s)", "5 second(s)"]
        );
    }

    #[test]
    fn cpu_percent_of_zero_uptime() {
        assert_eq!(cpu_percent(Duration::from_secs(1), Duration::ZERO), 0.0);
        assert_eq!(
            cpu_percent(Duration::from_secs(1), Duration::from_secs(4)),
            25.0
        );
    }

    #[cfg(unix)]
    #[test]
    fn probe_reads_this_process() {
        let stats = probe(Instant::now() - Duration::from_secs(1));
        assert!(stats.uptime >= Duration::from_secs(1));
        assert!(stats.memory_peak_mib > 0.0);
        assert!(stats.memory_total_mib >= stats.memory_peak_mib);
        assert!(stats.memory_percent() > 0.0);
    }
}
