//! CPU accumulators as reported in one usage frame, and the percentage derived from two of them.

/// Cumulative CPU counters of a single usage frame.
///
/// Both totals are monotonically increasing accumulators (nanoseconds), so a single
/// frame carries no rate information on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuUsage {
    /// Total CPU time consumed by the container.
    pub total_usage: u64,
    /// Total CPU time of the host system.
    pub system_usage: u64,
    /// Number of CPUs available to the container.
    pub online_cpus: u32,
}

/// Computes the CPU utilisation between two frames as a percentage of one CPU.
///
/// Returns `0.0` whenever either the container or the system delta is not positive,
/// which covers the first sample of a stream and clock anomalies.
pub(super) fn cpu_percent(previous: &CpuUsage, current: &CpuUsage) -> f64 {
    let cpu_delta = current.total_usage as f64 - previous.total_usage as f64;
    let system_delta = current.system_usage as f64 - previous.system_usage as f64;

    if cpu_delta <= 0.0 || system_delta <= 0.0 {
        return 0.0;
    }

    (cpu_delta / system_delta) * f64::from(current.online_cpus) * 100.0
}
