//! Process attribution models

use serde::{Deserialize, Serialize};

/// A running process as seen by the top-process sampler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Executable name
    pub name: String,
    /// CPU usage (%)
    pub cpu_percent: f64,
    /// Share of total memory (%)
    pub mem_percent: f64,
    /// Resident set size (MB)
    pub mem_rss_mb: u64,
}

/// Top processes by CPU and by memory, each sorted descending
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopProcesses {
    /// Highest CPU users first
    pub by_cpu: Vec<ProcessInfo>,
    /// Highest memory users first
    pub by_memory: Vec<ProcessInfo>,
}

impl ProcessInfo {
    /// Case-insensitive exact match against a list of process names
    pub fn is_listed_in(&self, names: &[String]) -> bool {
        names
            .iter()
            .any(|n| n.trim().eq_ignore_ascii_case(self.name.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelist_match_is_case_insensitive_and_exact() {
        let proc = ProcessInfo {
            name: "Java".to_string(),
            ..Default::default()
        };
        assert!(proc.is_listed_in(&["java".to_string()]));
        assert!(!proc.is_listed_in(&["javac".to_string()]));
        assert!(!proc.is_listed_in(&[]));
    }
}
