//! Host metrics via sysinfo

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};

use super::{DiskUsage, HostCollector, IoRate, MemoryUsage};
use crate::error::{Error, Result};
use crate::models::{ProcessInfo, TopProcesses};

/// Samples closer together than this report zero rates
pub const MIN_RATE_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between the two process refreshes used for per-process CPU usage
const PROCESS_SAMPLE_WINDOW: Duration = Duration::from_millis(300);

/// Processes below this share of CPU or memory are not ranked
const PROCESS_NOISE_FLOOR: f64 = 0.1;

const DISKSTATS_PATH: &str = "/proc/diskstats";
const PREFERRED_DISKS: [&str; 3] = ["sda", "nvme0n1", "vda"];
const SECTOR_SIZE: u64 = 512;

const MB: u64 = 1024 * 1024;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Turns monotonically increasing byte counters into KB/s rates
///
/// The first sample, and any sample taken less than [`MIN_RATE_INTERVAL`]
/// after the previous one, yields zero and only moves the baseline.
#[derive(Debug, Default)]
pub struct RateTracker {
    last: Option<(u64, u64, Instant)>,
}

impl RateTracker {
    /// Record counters observed at `now` and return the rate since the last sample
    pub fn sample_at(&mut self, inbound: u64, outbound: u64, now: Instant) -> IoRate {
        let rate = self.last.and_then(|(prev_in, prev_out, at)| {
            let elapsed = now.saturating_duration_since(at);
            if elapsed < MIN_RATE_INTERVAL {
                return None;
            }
            let secs = elapsed.as_secs_f64();
            Some(IoRate {
                inbound_kbps: inbound.saturating_sub(prev_in) as f64 / secs / 1024.0,
                outbound_kbps: outbound.saturating_sub(prev_out) as f64 / secs / 1024.0,
            })
        });
        self.last = Some((inbound, outbound, now));
        rate.unwrap_or_default()
    }
}

struct HostState {
    system: System,
    disks: Disks,
    networks: Networks,
    network_rate: RateTracker,
    disk_rate: RateTracker,
}

/// [`HostCollector`] backed by `sysinfo` and `/proc/diskstats`
pub struct SysinfoHostCollector {
    state: Mutex<HostState>,
    diskstats: PathBuf,
}

impl SysinfoHostCollector {
    /// Create a collector; rate baselines start empty
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();

        Self {
            state: Mutex::new(HostState {
                system,
                disks: Disks::new_with_refreshed_list(),
                networks: Networks::new_with_refreshed_list(),
                network_rate: RateTracker::default(),
                disk_rate: RateTracker::default(),
            }),
            diskstats: PathBuf::from(DISKSTATS_PATH),
        }
    }

    /// Read disk counters from another file
    #[must_use]
    pub fn with_diskstats(mut self, path: impl Into<PathBuf>) -> Self {
        self.diskstats = path.into();
        self
    }
}

impl Default for SysinfoHostCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostCollector for SysinfoHostCollector {
    async fn cpu_percent(&self) -> Result<f64> {
        let mut state = self.state.lock();
        state.system.refresh_cpu_usage();
        if state.system.cpus().is_empty() {
            return Err(Error::collector("no CPU information available"));
        }
        Ok(f64::from(state.system.global_cpu_usage()))
    }

    async fn memory_usage(&self) -> Result<MemoryUsage> {
        let mut state = self.state.lock();
        state.system.refresh_memory();
        let total = state.system.total_memory();
        if total == 0 {
            return Err(Error::collector("total memory reported as zero"));
        }
        let used = state.system.used_memory();
        Ok(MemoryUsage {
            percent: used as f64 / total as f64 * 100.0,
            used_mb: used / MB,
            total_mb: total / MB,
        })
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        let mut state = self.state.lock();
        state.disks.refresh();
        let root = state
            .disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .ok_or_else(|| Error::collector("root filesystem not found"))?;

        let total = root.total_space();
        if total == 0 {
            return Err(Error::collector("root filesystem reports zero size"));
        }
        let used = total.saturating_sub(root.available_space());
        Ok(DiskUsage {
            percent: used as f64 / total as f64 * 100.0,
            used_gb: used as f64 / GB,
            total_gb: total as f64 / GB,
        })
    }

    async fn disk_io_rate(&self) -> Result<IoRate> {
        let text = tokio::fs::read_to_string(&self.diskstats).await?;
        let (_, read, written) = parse_diskstats(&text)
            .ok_or_else(|| Error::collector("no block devices in diskstats"))?;

        let mut state = self.state.lock();
        Ok(state.disk_rate.sample_at(read, written, Instant::now()))
    }

    async fn network_rate(&self) -> Result<IoRate> {
        let mut state = self.state.lock();
        state.networks.refresh();
        if state.networks.iter().next().is_none() {
            return Err(Error::collector("no network interfaces"));
        }
        let (rx, tx) = state
            .networks
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (rx + data.total_received(), tx + data.total_transmitted())
            });
        Ok(state.network_rate.sample_at(rx, tx, Instant::now()))
    }

    async fn top_processes(&self, n: usize) -> Result<TopProcesses> {
        {
            let mut state = self.state.lock();
            state.system.refresh_processes(ProcessesToUpdate::All, true);
        }

        tokio::time::sleep(PROCESS_SAMPLE_WINDOW).await;

        let processes = {
            let mut state = self.state.lock();
            state.system.refresh_memory();
            state.system.refresh_processes(ProcessesToUpdate::All, true);
            let total = state.system.total_memory();

            state
                .system
                .processes()
                .values()
                .map(|p| ProcessInfo {
                    pid: p.pid().as_u32(),
                    name: p.name().to_string_lossy().into_owned(),
                    cpu_percent: f64::from(p.cpu_usage()),
                    mem_percent: if total > 0 {
                        p.memory() as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                    mem_rss_mb: p.memory() / MB,
                })
                .collect::<Vec<_>>()
        };

        if processes.is_empty() {
            return Err(Error::collector("process list is empty"));
        }
        Ok(rank_processes(processes, n))
    }
}

/// Keep the top `n` processes by CPU and by memory, ignoring idle ones
fn rank_processes(processes: Vec<ProcessInfo>, n: usize) -> TopProcesses {
    let mut by_cpu: Vec<_> = processes
        .iter()
        .filter(|p| p.cpu_percent > PROCESS_NOISE_FLOOR)
        .cloned()
        .collect();
    let mut by_memory: Vec<_> = processes
        .into_iter()
        .filter(|p| p.mem_percent > PROCESS_NOISE_FLOOR)
        .collect();

    by_cpu.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    by_memory.sort_by(|a, b| b.mem_percent.total_cmp(&a.mem_percent));
    by_cpu.truncate(n);
    by_memory.truncate(n);

    TopProcesses { by_cpu, by_memory }
}

/// Pick the system disk from `/proc/diskstats` and return its read/written bytes
fn parse_diskstats(text: &str) -> Option<(String, u64, u64)> {
    let devices: Vec<(String, u64, u64)> = text
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let sectors_read: u64 = fields[5].parse().ok()?;
            let sectors_written: u64 = fields[9].parse().ok()?;
            Some((
                fields[2].to_string(),
                sectors_read * SECTOR_SIZE,
                sectors_written * SECTOR_SIZE,
            ))
        })
        .collect();

    PREFERRED_DISKS
        .iter()
        .find_map(|want| devices.iter().find(|(name, _, _)| name == want))
        .or_else(|| {
            devices
                .iter()
                .find(|(name, _, _)| !name.starts_with("loop") && !name.starts_with("ram"))
        })
        .cloned()
}
