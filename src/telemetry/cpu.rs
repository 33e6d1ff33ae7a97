//! Host CPU and memory probing.
//!
//! The CPU model comes from `lscpu`, falling back to `/proc/cpuinfo`
//! when the tool is absent. Utilization is a two-read delta over
//! `/proc/stat`, memory in use comes from `/proc/meminfo`. Every probe
//! degrades to a placeholder value instead of failing: a partially
//! readable host still produces a usable sample.

use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;

use crate::command::CommandSpec;
use crate::telemetry::CpuSample;

const UNKNOWN_CPU: &str = "Unknown CPU";

/// Collect one CPU/memory sample, measuring utilization over
/// `sample_window`.
pub async fn sample_cpu(sample_window: Duration) -> CpuSample {
    let model_name = cpu_model_name().await;
    let (logical_cores, physical_cores) = core_counts();
    let utilization_pct = utilization_percent(sample_window).await;
    let memory_used_mb = memory_used_mb();

    CpuSample {
        model_name,
        logical_cores,
        physical_cores,
        utilization_pct,
        memory_used_mb,
    }
}

/// CPU model string: `lscpu` first, `/proc/cpuinfo` as fallback.
pub async fn cpu_model_name() -> String {
    match CommandSpec::new("lscpu").run_checked().await {
        Ok(stdout) => {
            if let Some(name) = parse_lscpu_model(&stdout) {
                return name;
            }
        }
        Err(_) => debug!("lscpu unavailable, falling back to /proc/cpuinfo"),
    }

    match std::fs::read_to_string("/proc/cpuinfo") {
        Ok(contents) => parse_cpuinfo_model(&contents).unwrap_or_else(|| UNKNOWN_CPU.to_string()),
        Err(e) => {
            debug!("could not read /proc/cpuinfo: {}", e);
            UNKNOWN_CPU.to_string()
        }
    }
}

fn parse_lscpu_model(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find(|line| line.starts_with("Model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_cpuinfo_model(contents: &str) -> Option<String> {
    contents
        .lines()
        .find(|line| line.to_lowercase().starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Logical and physical core counts from `/proc/cpuinfo`.
fn core_counts() -> (usize, usize) {
    match std::fs::read_to_string("/proc/cpuinfo") {
        Ok(contents) => parse_core_counts(&contents),
        Err(_) => (0, 0),
    }
}

fn parse_core_counts(contents: &str) -> (usize, usize) {
    let mut logical = 0usize;
    let mut physical: HashSet<(String, String)> = HashSet::new();
    let mut current_physical_id = String::new();

    for line in contents.lines() {
        if let Some((key, value)) = line.split_once(':') {
            match key.trim() {
                "processor" => logical += 1,
                "physical id" => current_physical_id = value.trim().to_string(),
                "core id" => {
                    physical.insert((current_physical_id.clone(), value.trim().to_string()));
                }
                _ => {}
            }
        }
    }

    // Single-socket machines without topology fields report every logical
    // processor as its own core.
    let physical_count = if physical.is_empty() {
        logical
    } else {
        physical.len()
    };
    (logical, physical_count)
}

/// Whole-machine CPU utilization over `window`, 0-100. Returns 0.0 when
/// `/proc/stat` cannot be read or the window saw no ticks.
async fn utilization_percent(window: Duration) -> f64 {
    let Some(before) = read_cpu_times() else {
        return 0.0;
    };
    tokio::time::sleep(window).await;
    let Some(after) = read_cpu_times() else {
        return 0.0;
    };
    utilization_from(&before, &after)
}

/// Utilization percentage between two counter readings. Every
/// subtraction saturates: kernel counters can glitch backwards, and a
/// probe that must never fail cannot afford an underflow panic.
fn utilization_from(before: &CpuTimes, after: &CpuTimes) -> f64 {
    let total = after.total.saturating_sub(before.total);
    let idle = after.idle.saturating_sub(before.idle);
    if total == 0 {
        return 0.0;
    }
    total.saturating_sub(idle) as f64 / total as f64 * 100.0
}

struct CpuTimes {
    total: u64,
    idle: u64,
}

fn read_cpu_times() -> Option<CpuTimes> {
    let contents = std::fs::read_to_string("/proc/stat").ok()?;
    parse_cpu_times(&contents)
}

fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    // First line: "cpu  user nice system idle iowait irq softirq steal ..."
    let line = stat.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
    if values.len() < 4 {
        return None;
    }
    // idle + iowait count as idle time
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    let total: u64 = values.iter().sum();
    Some(CpuTimes { total, idle })
}

/// Memory in use (total minus available) in MB, 0.0 when unreadable.
fn memory_used_mb() -> f64 {
    match std::fs::read_to_string("/proc/meminfo") {
        Ok(contents) => parse_memory_used_mb(&contents).unwrap_or(0.0),
        Err(_) => 0.0,
    }
}

fn parse_memory_used_mb(meminfo: &str) -> Option<f64> {
    let kb_value = |key: &str| -> Option<f64> {
        meminfo
            .lines()
            .find(|line| line.starts_with(key))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|v| v.parse::<f64>().ok())
    };
    let total = kb_value("MemTotal:")?;
    let available = kb_value("MemAvailable:")?;
    Some((total - available) / 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lscpu_model_line() {
        let stdout = "Architecture: x86_64\nModel name:   AMD EPYC 7763 64-Core Processor\n";
        assert_eq!(
            parse_lscpu_model(stdout).as_deref(),
            Some("AMD EPYC 7763 64-Core Processor")
        );
        assert_eq!(parse_lscpu_model("Architecture: x86_64\n"), None);
    }

    #[test]
    fn parses_cpuinfo_model_line() {
        let contents = "processor : 0\nmodel name : Intel(R) Xeon(R) CPU @ 2.20GHz\n";
        assert_eq!(
            parse_cpuinfo_model(contents).as_deref(),
            Some("Intel(R) Xeon(R) CPU @ 2.20GHz")
        );
    }

    #[test]
    fn counts_logical_and_physical_cores() {
        let contents = "\
processor : 0
physical id : 0
core id : 0

processor : 1
physical id : 0
core id : 0

processor : 2
physical id : 0
core id : 1

processor : 3
physical id : 0
core id : 1
";
        assert_eq!(parse_core_counts(contents), (4, 2));
    }

    #[test]
    fn core_counts_without_topology_fall_back_to_logical() {
        let contents = "processor : 0\n\nprocessor : 1\n";
        assert_eq!(parse_core_counts(contents), (2, 2));
    }

    #[test]
    fn parses_proc_stat_first_line() {
        let stat = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\n";
        let times = parse_cpu_times(stat).unwrap();
        assert_eq!(times.total, 1000);
        assert_eq!(times.idle, 850);
    }

    #[test]
    fn utilization_between_two_readings() {
        let before = CpuTimes { total: 0, idle: 0 };
        let after = CpuTimes {
            total: 1000,
            idle: 850,
        };
        assert!((utilization_from(&before, &after) - 15.0).abs() < 1e-9);
    }

    /// An idle counter jumping further than the total counter must clamp
    /// to zero utilization, not underflow.
    #[test]
    fn glitched_idle_counter_clamps_to_zero() {
        let before = CpuTimes {
            total: 1000,
            idle: 900,
        };
        let after = CpuTimes {
            total: 1010,
            idle: 1950,
        };
        assert_eq!(utilization_from(&before, &after), 0.0);
    }

    #[test]
    fn parses_meminfo_used_mb() {
        let meminfo = "MemTotal:       2048000 kB\nMemFree:         512000 kB\nMemAvailable:   1024000 kB\n";
        let used = parse_memory_used_mb(meminfo).unwrap();
        assert!((used - 1000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sample_cpu_never_fails() {
        // Even on a stripped-down host the probe must produce a sample.
        let sample = sample_cpu(Duration::from_millis(10)).await;
        assert!(!sample.model_name.is_empty());
        assert!(sample.utilization_pct >= 0.0);
    }
}
