//! Driver capability registry
//!
//! Capabilities are resolved once per connection at setup time from a small
//! registry keyed by driver name, rather than probed at row-processing time.

use std::collections::HashMap;

use crate::connection::DatabaseDriver;

/// What a driver can do, as far as the transfer engine cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverCapabilities {
    /// Whether the driver honors a server-side fetch-size hint for streaming
    /// result sets (MySQL needs the hint to avoid buffering the full result)
    pub streaming_fetch: bool,
    /// Whether batch execution reports per-statement outcome counts on a
    /// partial failure (enables failing-row attribution)
    pub batch_outcome_counts: bool,
    /// Whether the driver supports explicit transaction control
    pub transactions: bool,
}

impl Default for DriverCapabilities {
    fn default() -> Self {
        // Conservative baseline for unregistered drivers
        Self {
            streaming_fetch: false,
            batch_outcome_counts: false,
            transactions: true,
        }
    }
}

/// Registry of driver capabilities, keyed by driver name
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    entries: HashMap<String, DriverCapabilities>,
}

impl CapabilityRegistry {
    /// Registry pre-populated with the known drivers
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            DatabaseDriver::Postgres.name().to_string(),
            DriverCapabilities {
                streaming_fetch: true,
                batch_outcome_counts: true,
                transactions: true,
            },
        );
        entries.insert(
            DatabaseDriver::MySql.name().to_string(),
            DriverCapabilities {
                streaming_fetch: true,
                batch_outcome_counts: true,
                transactions: true,
            },
        );
        entries.insert(
            DatabaseDriver::SqlServer.name().to_string(),
            DriverCapabilities {
                streaming_fetch: false,
                batch_outcome_counts: true,
                transactions: true,
            },
        );
        entries.insert(
            DatabaseDriver::Sqlite.name().to_string(),
            DriverCapabilities {
                streaming_fetch: false,
                batch_outcome_counts: false,
                transactions: true,
            },
        );
        entries.insert(
            DatabaseDriver::Memory.name().to_string(),
            DriverCapabilities {
                streaming_fetch: true,
                batch_outcome_counts: true,
                transactions: true,
            },
        );
        Self { entries }
    }

    /// Register or override capabilities for a driver name
    pub fn register(&mut self, name: impl Into<String>, caps: DriverCapabilities) {
        self.entries.insert(name.into(), caps);
    }

    /// Resolve capabilities for a driver, falling back to the conservative
    /// defaults when the driver is not registered
    pub fn resolve(&self, driver: DatabaseDriver) -> DriverCapabilities {
        self.resolve_name(driver.name())
    }

    /// Resolve capabilities by name
    pub fn resolve_name(&self, name: &str) -> DriverCapabilities {
        self.entries.get(name).copied().unwrap_or_default()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_drivers() {
        let registry = CapabilityRegistry::builtin();
        assert!(registry.resolve(DatabaseDriver::MySql).streaming_fetch);
        assert!(!registry.resolve(DatabaseDriver::Sqlite).batch_outcome_counts);
    }

    #[test]
    fn test_unknown_driver_is_conservative() {
        let registry = CapabilityRegistry::builtin();
        let caps = registry.resolve_name("exoticdb");
        assert!(!caps.streaming_fetch);
        assert!(!caps.batch_outcome_counts);
        assert!(caps.transactions);
    }

    #[test]
    fn test_register_override() {
        let mut registry = CapabilityRegistry::builtin();
        registry.register(
            "exoticdb",
            DriverCapabilities {
                streaming_fetch: true,
                batch_outcome_counts: false,
                transactions: false,
            },
        );
        assert!(registry.resolve_name("exoticdb").streaming_fetch);
    }
}
