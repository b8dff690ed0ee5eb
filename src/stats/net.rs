use std::collections::HashMap;

/// Byte counters of a single network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkUsage {
    /// Bytes received.
    pub rx_bytes: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
}

impl std::ops::AddAssign for NetworkUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.rx_bytes += rhs.rx_bytes;
        self.tx_bytes += rhs.tx_bytes;
    }
}

/// Sums the counters of every reported interface.
pub(super) fn total(networks: &HashMap<String, NetworkUsage>) -> NetworkUsage {
    let mut sum = NetworkUsage::default();
    for usage in networks.values() {
        sum += *usage;
    }
    sum
}
