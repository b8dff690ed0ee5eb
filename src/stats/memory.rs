//! Memory counters of a usage frame, covering both cgroup v1 and cgroup v2 hosts.

/// Memory counters as reported in one usage frame.
///
/// `cache` is only reported by cgroup v1 hosts and `inactive_file` only by cgroup v2
/// hosts; an unreported counter is `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    /// Raw usage in bytes, page cache included.
    pub usage: u64,
    /// Memory limit in bytes; `0` means unlimited or unset.
    pub limit: u64,
    /// Page cache in bytes (cgroup v1).
    pub cache: u64,
    /// Inactive file-backed memory in bytes (cgroup v2).
    pub inactive_file: u64,
}

impl MemoryUsage {
    /// Returns the usage with page cache excluded.
    ///
    /// The cgroup v2 `inactive_file` counter is preferred when it is present and smaller
    /// than the raw usage, then the cgroup v1 `cache` counter under the same condition,
    /// and the raw usage otherwise.
    pub fn usage_without_cache(&self) -> u64 {
        if self.inactive_file > 0 && self.usage > self.inactive_file {
            return self.usage - self.inactive_file;
        }
        if self.cache > 0 && self.usage > self.cache {
            return self.usage - self.cache;
        }
        self.usage
    }
}

/// Returns `usage / limit * 100`, or `0.0` for an unset limit.
pub(super) fn memory_percent(usage: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    usage as f64 / limit as f64 * 100.0
}
