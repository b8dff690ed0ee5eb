//! Normalisation of raw container usage frames.
//!
//! The daemon reports cumulative counters. A rate such as the CPU percentage can only
//! be derived from two consecutive frames, so [`compute`] always takes the previous and
//! the current [`RawUsageSnapshot`]. The function is pure: it depends on nothing but its
//! two arguments.
//!
//! # Example
//!
//! ```rust
//! use dockmon::stats::{compute, CpuUsage, MemoryUsage, RawUsageSnapshot};
//!
//! let previous = RawUsageSnapshot {
//!     cpu: CpuUsage { total_usage: 1_000, system_usage: 10_000, online_cpus: 2 },
//!     ..Default::default()
//! };
//! let current = RawUsageSnapshot {
//!     cpu: CpuUsage { total_usage: 2_000, system_usage: 20_000, online_cpus: 2 },
//!     memory: MemoryUsage { usage: 1_000, limit: 4_000, inactive_file: 200, cache: 0 },
//!     ..Default::default()
//! };
//!
//! let stats = compute(&previous, &current);
//! assert_eq!(stats.cpu_percent, 20.0);
//! assert_eq!(stats.memory_usage, 800);
//! assert_eq!(stats.memory_percent, 20.0);
//! ```

mod cpu;
mod memory;
mod net;

use std::collections::HashMap;

pub use cpu::CpuUsage;
pub use memory::MemoryUsage;
pub use net::NetworkUsage;

use crate::container::ContainerID;

/// One raw usage frame of a container.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawUsageSnapshot {
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    /// Counters keyed by interface name.
    pub networks: HashMap<String, NetworkUsage>,
}

/// Usage metrics derived from two consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct NormalizedStats {
    pub cpu_percent: f64,
    /// Usage in bytes with page cache excluded.
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    /// Bytes received, summed across all interfaces.
    pub network_rx: u64,
    /// Bytes transmitted, summed across all interfaces.
    pub network_tx: u64,
}

/// Normalized usage of one container, as carried in a `stats` message.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ContainerStats {
    pub id: ContainerID,
    pub name: String,
    #[serde(flatten)]
    pub stats: NormalizedStats,
}

/// Computes normalized metrics from two consecutive usage frames.
///
/// Memory and network values are taken from `current`; the CPU percentage is derived
/// from the counter deltas between both frames.
pub fn compute(previous: &RawUsageSnapshot, current: &RawUsageSnapshot) -> NormalizedStats {
    let memory_usage = current.memory.usage_without_cache();
    let memory_limit = current.memory.limit;
    let network = net::total(&current.networks);

    NormalizedStats {
        cpu_percent: cpu::cpu_percent(&previous.cpu, &current.cpu),
        memory_usage,
        memory_limit,
        memory_percent: memory::memory_percent(memory_usage, memory_limit),
        network_rx: network.rx_bytes,
        network_tx: network.tx_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total_usage: u64, system_usage: u64) -> RawUsageSnapshot {
        RawUsageSnapshot {
            cpu: CpuUsage {
                total_usage,
                system_usage,
                online_cpus: 4,
            },
            memory: MemoryUsage {
                usage: 2048,
                limit: 8192,
                cache: 0,
                inactive_file: 1024,
            },
            networks: HashMap::from([
                (
                    "eth0".to_owned(),
                    NetworkUsage {
                        rx_bytes: 5,
                        tx_bytes: 7,
                    },
                ),
                (
                    "eth1".to_owned(),
                    NetworkUsage {
                        rx_bytes: 11,
                        tx_bytes: 13,
                    },
                ),
            ]),
        }
    }

    #[test]
    fn test_compute_full_snapshot() {
        let stats = compute(&snapshot(1_000, 100_000), &snapshot(3_000, 110_000));

        assert!((stats.cpu_percent - 80.0).abs() < 1e-9);
        assert_eq!(stats.memory_usage, 1024);
        assert_eq!(stats.memory_limit, 8192);
        assert_eq!(stats.memory_percent, 12.5);
        assert_eq!(stats.network_rx, 16);
        assert_eq!(stats.network_tx, 20);
    }

    #[test]
    fn test_compute_identical_frames_yield_zero_cpu() {
        let frame = snapshot(1_000, 100_000);
        let stats = compute(&frame, &frame);
        assert_eq!(stats.cpu_percent, 0.0);
        assert_eq!(stats.memory_usage, 1024);
    }

    #[test]
    fn test_compute_unlimited_memory() {
        let mut current = snapshot(3_000, 110_000);
        current.memory.limit = 0;
        let stats = compute(&snapshot(1_000, 100_000), &current);
        assert_eq!(stats.memory_percent, 0.0);
    }

    #[test]
    fn test_container_stats_serializes_flat() {
        let stats = ContainerStats {
            id: ContainerID::new("abc123").unwrap(),
            name: "web".to_owned(),
            stats: NormalizedStats {
                memory_usage: 1,
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["id"], "abc123");
        assert_eq!(value["memory_usage"], 1);
    }
}
