use serde::{Deserialize, Serialize};

use switchyard_core::config::ResourceLimits;

/// Current usage counters, supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub concurrent_tasks: u64,
    #[serde(default)]
    pub daily_executions: u64,
    #[serde(default)]
    pub daily_external_calls: u64,
    #[serde(default)]
    pub storage_mb: u64,
}

/// Pass/fail per resource category. A category passes while usage is below its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceCheck {
    pub concurrent_tasks: bool,
    pub daily_executions: bool,
    pub daily_external_calls: bool,
    pub storage: bool,
}

impl ResourceCheck {
    pub fn passed(&self) -> bool {
        self.concurrent_tasks && self.daily_executions && self.daily_external_calls && self.storage
    }

    /// Names of the categories that failed.
    pub fn violations(&self) -> Vec<&'static str> {
        [
            ("concurrent_tasks", self.concurrent_tasks),
            ("daily_executions", self.daily_executions),
            ("daily_external_calls", self.daily_external_calls),
            ("storage", self.storage),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name)
        .collect()
    }
}

pub fn check_resources(usage: &ResourceUsage, limits: &ResourceLimits) -> ResourceCheck {
    ResourceCheck {
        concurrent_tasks: usage.concurrent_tasks < limits.max_concurrent_tasks,
        daily_executions: usage.daily_executions < limits.max_daily_executions,
        daily_external_calls: usage.daily_external_calls < limits.max_daily_external_calls,
        storage: usage.storage_mb < limits.max_storage_mb,
    }
}
