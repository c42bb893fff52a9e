//! CPU topology probing and thread affinity.
//!
//! The pool selects which cores to bind from the per-CPU maximum frequency
//! table: on big.LITTLE machines the fast and slow clusters are told apart
//! purely by clock speed. Probing failures are reported to the caller, which
//! logs them and falls back to an unpinned pool.

use thiserror::Error;

/// Caller intent for mapping worker threads to CPU classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityPolicy {
    /// No pinning; the scheduler places threads freely.
    None,
    /// Only the cores sharing the highest maximum frequency.
    BigOnly,
    /// Only the cores sharing the lowest maximum frequency.
    LittleOnly,
    /// Fastest cores first, up to the requested thread count.
    HighPerformance,
    /// Slowest cores first, up to the requested thread count.
    PowerSave,
}

/// Failures crossing the platform boundary.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("cpu frequency table unavailable: {0}")]
    FreqProbe(String),
    #[error("failed to apply cpu affinity: {0}")]
    Affinity(String),
    #[error("cpu affinity is not supported on this platform")]
    AffinityUnsupported,
}

/// Maximum frequency per CPU, indexed by CPU id.
///
/// On Linux this reads `cpuinfo_max_freq` from sysfs, which reports the
/// design maximum even when a governor has clocked the core down. When sysfs
/// has no cpufreq data (VMs, containers) the current frequencies reported by
/// the OS probe are used instead; only the relative ordering matters here.
pub fn max_freq_per_cpu() -> Result<Vec<f32>, TopologyError> {
    #[cfg(target_os = "linux")]
    if let Some(freqs) = sysfs_max_freqs() {
        return Ok(freqs);
    }
    probed_freqs()
}

#[cfg(target_os = "linux")]
fn sysfs_max_freqs() -> Option<Vec<f32>> {
    let mut freqs = Vec::new();
    for cpu in 0.. {
        let path = format!("/sys/devices/system/cpu/cpu{cpu}/cpufreq/cpuinfo_max_freq");
        match std::fs::read_to_string(&path) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(khz) => freqs.push(khz as f32),
                Err(_) => return None,
            },
            Err(_) => break,
        }
    }
    if freqs.is_empty() {
        None
    } else {
        Some(freqs)
    }
}

fn probed_freqs() -> Result<Vec<f32>, TopologyError> {
    use sysinfo::{CpuRefreshKind, System};

    let mut system = System::new();
    system.refresh_cpu_specifics(CpuRefreshKind::everything());
    let freqs: Vec<f32> = system
        .cpus()
        .iter()
        .map(|cpu| cpu.frequency() as f32)
        .collect();
    if freqs.is_empty() {
        Err(TopologyError::FreqProbe("no cpus reported".into()))
    } else {
        Ok(freqs)
    }
}

/// Binds the calling thread to the given set of CPU ids.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn set_current_thread_affinity(cpu_ids: &[usize]) -> Result<(), TopologyError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpu_set = CpuSet::new();
    for &id in cpu_ids {
        cpu_set
            .set(id)
            .map_err(|err| TopologyError::Affinity(format!("cpu {id}: {err}")))?;
    }
    sched_setaffinity(Pid::from_raw(0), &cpu_set)
        .map_err(|err| TopologyError::Affinity(err.to_string()))
}

/// Binds the calling thread to the given set of CPU ids.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn set_current_thread_affinity(_cpu_ids: &[usize]) -> Result<(), TopologyError> {
    Err(TopologyError::AffinityUnsupported)
}

struct CpuFreq {
    core_id: usize,
    freq: f32,
}

/// Sorted CPU ids a pool should bind to under `policy`.
///
/// The big/little policies keep only the prefix of cores sharing the extreme
/// frequency; the performance/power policies take the first `thread_count`
/// cores of the sorted order. Ties keep the original CPU id order because
/// the sort is stable.
pub(crate) fn cores_for_policy(
    max_freqs: &[f32],
    policy: AffinityPolicy,
    thread_count: usize,
) -> Vec<usize> {
    if max_freqs.is_empty() || policy == AffinityPolicy::None {
        return Vec::new();
    }

    let mut by_freq: Vec<CpuFreq> = max_freqs
        .iter()
        .enumerate()
        .map(|(core_id, &freq)| CpuFreq { core_id, freq })
        .collect();
    match policy {
        AffinityPolicy::LittleOnly | AffinityPolicy::PowerSave => {
            by_freq.sort_by(|lhs, rhs| lhs.freq.total_cmp(&rhs.freq));
        }
        AffinityPolicy::BigOnly | AffinityPolicy::HighPerformance => {
            by_freq.sort_by(|lhs, rhs| rhs.freq.total_cmp(&lhs.freq));
        }
        AffinityPolicy::None => unreachable!(),
    }

    let cores_to_use = match policy {
        AffinityPolicy::BigOnly | AffinityPolicy::LittleOnly => by_freq
            .iter()
            .take_while(|cpu| cpu.freq == by_freq[0].freq)
            .count(),
        _ => thread_count,
    };
    assert!(cores_to_use > 0, "no cpu cores selected for affinity");

    by_freq
        .iter()
        .take(cores_to_use)
        .map(|cpu| cpu.core_id)
        .collect()
}

/// Whether the frequency table mixes core classes.
pub(crate) fn has_asymmetric_cores(max_freqs: &[f32]) -> bool {
    max_freqs.iter().any(|&freq| freq != max_freqs[0])
}

/// Target tile count for a pool of `thread_count` threads bound to
/// `cores_to_use`: one tile per worker on uniform machines, two on machines
/// mixing core classes so fast cores can steal the slack.
pub(crate) fn default_tile_count_for(
    max_freqs: &[f32],
    cores_to_use: &[usize],
    thread_count: usize,
) -> usize {
    if cores_to_use.len() >= 2 && has_asymmetric_cores(max_freqs) {
        thread_count * crate::TILES_PER_WORKER
    } else {
        thread_count
    }
}
