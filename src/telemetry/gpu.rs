//! GPU statistics via the vendor query tool.
//!
//! The tool (nvidia-smi unless configured otherwise) is asked for a fixed
//! field set in `csv,noheader,nounits` form, one row per physical GPU.
//! A missing tool or a failing query is an expected condition (CPU-only
//! hosts), so both degrade to an empty GPU list.

use tracing::{debug, warn};

use crate::command::CommandSpec;

const QUERY_FIELDS: &str =
    "index,name,utilization.gpu,temperature.gpu,power.draw,power.limit,memory.used,memory.total";

/// One GPU's statistics for one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuSample {
    pub index: u32,
    pub name: String,
    /// GPU utilization, 0-100
    pub utilization_pct: f64,
    /// Core temperature, degrees Celsius
    pub temperature_c: f64,
    /// Power draw as a percentage of the power limit
    pub power_pct: f64,
    /// Memory used as a percentage of total memory
    pub vram_pct: f64,
}

/// Query all GPUs. Empty when the tool is absent, fails, or reports
/// nothing.
pub async fn query_gpus(tool: &str) -> Vec<GpuSample> {
    let output = match CommandSpec::new(tool)
        .arg(format!("--query-gpu={QUERY_FIELDS}"))
        .arg("--format=csv,noheader,nounits")
        .run()
        .await
    {
        Ok(output) if output.success() => output,
        Ok(output) => {
            debug!(tool, status = %output.status, "GPU query failed, assuming no GPU");
            return Vec::new();
        }
        Err(e) => {
            debug!(tool, error = %e, "GPU query tool unavailable, assuming no GPU");
            return Vec::new();
        }
    };

    output
        .stdout_trimmed()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_gpu_line(line);
            if parsed.is_none() {
                warn!(tool, line, "unparseable GPU query row, skipping");
            }
            parsed
        })
        .collect()
}

/// Highest compute capability across GPUs, used for the floating-point
/// mode probe. `None` when no GPU is visible.
pub async fn max_compute_capability(tool: &str) -> Option<f64> {
    let output = CommandSpec::new(tool)
        .arg("--query-gpu=compute_cap")
        .arg("--format=csv,noheader")
        .run()
        .await
        .ok()
        .filter(|o| o.success())?;

    output
        .stdout_trimmed()
        .lines()
        .filter_map(|line| line.trim().parse::<f64>().ok())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

/// Parse one `csv,noheader,nounits` row:
/// `index, name, util, temp, power.draw, power.limit, mem.used, mem.total`.
fn parse_gpu_line(line: &str) -> Option<GpuSample> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 8 {
        return None;
    }

    let index = fields[0].parse().ok()?;
    let name = fields[1].to_string();
    let utilization_pct = fields[2].parse().ok()?;
    let temperature_c = fields[3].parse().ok()?;
    let power_draw: f64 = fields[4].parse().ok()?;
    let power_limit: f64 = fields[5].parse().ok()?;
    let mem_used: f64 = fields[6].parse().ok()?;
    let mem_total: f64 = fields[7].parse().ok()?;

    if power_limit <= 0.0 || mem_total <= 0.0 {
        return None;
    }

    Some(GpuSample {
        index,
        name,
        utilization_pct,
        temperature_c,
        power_pct: round2(power_draw / power_limit * 100.0),
        vram_pct: round2(mem_used / mem_total * 100.0),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
