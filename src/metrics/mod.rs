//! 资源采样模块：为遥测事件提供真实的主机资源读数。
//!
//! Resource sampling for telemetry.
//!
//! Every recorded telemetry event can carry a point-in-time resource reading.
//! The analysis pipeline must stay decoupled from how those numbers are
//! obtained, so sampling sits behind [`MetricsSource`]: production uses
//! [`SystemMetricsSource`] (real readings via `sysinfo`), tests pin values
//! with [`StaticMetricsSource`].

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// A point-in-time host resource reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
}

impl ResourceUsage {
    /// Fraction of memory in use, in `[0.0, 1.0]`.
    pub fn utilization(&self) -> f64 {
        if self.total_memory_bytes == 0 {
            return 0.0;
        }
        (self.used_memory_bytes as f64 / self.total_memory_bytes as f64).clamp(0.0, 1.0)
    }
}

/// Source of resource readings.
pub trait MetricsSource: Send + Sync {
    fn sample(&self) -> ResourceUsage;
}

/// Real readings from the host via `sysinfo`.
///
/// Refreshing requires `&mut System`, so the handle lives behind a mutex;
/// a memory-only refresh is cheap enough to run inline on the recording path.
pub struct SystemMetricsSource {
    system: Mutex<System>,
}

impl SystemMetricsSource {
    pub fn new() -> Self {
        let refresh = RefreshKind::new().with_memory(MemoryRefreshKind::everything());
        Self {
            system: Mutex::new(System::new_with_specifics(refresh)),
        }
    }
}

impl Default for SystemMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SystemMetricsSource {
    fn sample(&self) -> ResourceUsage {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_memory_specifics(MemoryRefreshKind::everything());
        ResourceUsage {
            total_memory_bytes: system.total_memory(),
            used_memory_bytes: system.used_memory(),
        }
    }
}

/// Fixed readings for tests and deterministic analysis runs.
#[derive(Debug, Clone)]
pub struct StaticMetricsSource {
    usage: ResourceUsage,
}

impl StaticMetricsSource {
    pub fn new(usage: ResourceUsage) -> Self {
        Self { usage }
    }

    /// A comfortable reading: 16 GiB total, 4 GiB used.
    pub fn low_load() -> Self {
        Self::new(ResourceUsage {
            total_memory_bytes: 16 * 1024 * 1024 * 1024,
            used_memory_bytes: 4 * 1024 * 1024 * 1024,
        })
    }

    /// A saturated reading: 16 GiB total, 15 GiB used.
    pub fn high_load() -> Self {
        Self::new(ResourceUsage {
            total_memory_bytes: 16 * 1024 * 1024 * 1024,
            used_memory_bytes: 15 * 1024 * 1024 * 1024,
        })
    }
}

impl MetricsSource for StaticMetricsSource {
    fn sample(&self) -> ResourceUsage {
        self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_bounds() {
        let zero = ResourceUsage {
            total_memory_bytes: 0,
            used_memory_bytes: 0,
        };
        assert_eq!(zero.utilization(), 0.0);

        let half = ResourceUsage {
            total_memory_bytes: 100,
            used_memory_bytes: 50,
        };
        assert!((half.utilization() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_static_source_is_stable() {
        let source = StaticMetricsSource::high_load();
        assert_eq!(source.sample(), source.sample());
        assert!(source.sample().utilization() > 0.9);
    }

    #[test]
    fn test_system_source_returns_sane_values() {
        let source = SystemMetricsSource::new();
        let usage = source.sample();
        assert!(usage.total_memory_bytes > 0);
        assert!(usage.used_memory_bytes <= usage.total_memory_bytes);
    }
}
