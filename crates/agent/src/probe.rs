//! OS resource probes.
//!
//! [`ResourceProbe`] is the synchronous data source the collector samples
//! on every monitor tick. [`SystemProbe`] reads CPU, memory and network
//! counters through `sysinfo` and disk usage through `statvfs(3)`.
//!
//! Calls may block (the CPU reading waits for a minimum refresh interval),
//! so the collector always runs them on the blocking pool.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use sysinfo::{Networks, System};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0} metrics are not supported on this platform")]
    Unsupported(&'static str),

    #[error("Probe I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Probe timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Probe task failed: {0}")]
    Task(String),
}

/// Memory usage in bytes plus utilisation (0-100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryReading {
    pub used: u64,
    pub available: u64,
    pub percent: f64,
}

/// Usage of one mounted filesystem in bytes plus utilisation (0-100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskReading {
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

/// Cumulative byte counters summed over all interfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkReading {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// A synchronous source of host resource readings.
pub trait ResourceProbe: Send + Sync {
    /// Host-wide CPU utilisation, 0-100.
    fn cpu_percent(&self) -> Result<f64, ProbeError>;
    fn memory(&self) -> Result<MemoryReading, ProbeError>;
    fn disk(&self) -> Result<DiskReading, ProbeError>;
    fn network(&self) -> Result<NetworkReading, ProbeError>;
}

struct CpuState {
    system: System,
    last_refresh: Instant,
}

/// [`ResourceProbe`] for the local host.
pub struct SystemProbe {
    cpu: Mutex<CpuState>,
    memory: Mutex<System>,
    networks: Mutex<Networks>,
    disk_path: PathBuf,
}

impl SystemProbe {
    /// Create a probe reporting disk usage for the filesystem at `disk_path`.
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        // CPU usage is a delta between two refreshes; take the baseline now.
        let mut system = System::new();
        system.refresh_cpu();

        Self {
            cpu: Mutex::new(CpuState {
                system,
                last_refresh: Instant::now(),
            }),
            memory: Mutex::new(System::new()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            disk_path: disk_path.into(),
        }
    }
}

impl ResourceProbe for SystemProbe {
    /// Average utilisation since the previous call (or since construction).
    fn cpu_percent(&self) -> Result<f64, ProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::Unsupported("cpu"));
        }
        let mut state = self.cpu.lock().unwrap_or_else(PoisonError::into_inner);

        let since = state.last_refresh.elapsed();
        if since < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
        state.system.refresh_cpu();
        state.last_refresh = Instant::now();

        Ok(f64::from(state.system.global_cpu_info().cpu_usage()))
    }

    fn memory(&self) -> Result<MemoryReading, ProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::Unsupported("memory"));
        }
        let mut system = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(ProbeError::Unsupported("memory"));
        }
        let available = system.available_memory();

        Ok(MemoryReading {
            used: system.used_memory(),
            available,
            percent: percent(total.saturating_sub(available), total),
        })
    }

    fn disk(&self) -> Result<DiskReading, ProbeError> {
        statvfs_usage(&self.disk_path)
    }

    fn network(&self) -> Result<NetworkReading, ProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::Unsupported("network"));
        }
        let mut networks = self.networks.lock().unwrap_or_else(PoisonError::into_inner);
        networks.refresh_list();

        let (bytes_sent, bytes_recv) = networks
            .iter()
            .fold((0u64, 0u64), |(sent, recv), (_name, data)| {
                (
                    sent.saturating_add(data.total_transmitted()),
                    recv.saturating_add(data.total_received()),
                )
            });

        Ok(NetworkReading {
            bytes_sent,
            bytes_recv,
        })
    }
}

/// `part / total` as a percentage; 0 when `total` is 0.
fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Read filesystem usage for `path` with `statvfs(3)`.
#[cfg(unix)]
fn statvfs_usage(path: &std::path::Path) -> Result<DiskReading, ProbeError> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "disk path contains a NUL byte")
    })?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    // Safety: `c_path` is a valid NUL-terminated string and `stat` points to
    // writable memory of the right size; it is only read after success.
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if ret != 0 {
        return Err(ProbeError::Io(std::io::Error::last_os_error()));
    }
    let stat = unsafe { stat.assume_init() };

    let block_size = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * block_size;
    let free_for_root = stat.f_bfree as u64 * block_size;
    let free = stat.f_bavail as u64 * block_size;
    let used = total.saturating_sub(free_for_root);

    Ok(DiskReading {
        used,
        free,
        percent: percent(used, used.saturating_add(free)),
    })
}

#[cfg(not(unix))]
fn statvfs_usage(_path: &std::path::Path) -> Result<DiskReading, ProbeError> {
    Err(ProbeError::Unsupported("disk"))
}
