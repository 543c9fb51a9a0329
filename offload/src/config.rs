//! Runtime-configurable parameters for the offload drivers.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `OFFLOAD_`) or by constructing a custom `OffloadConfig`.

use crate::error::{OffloadError, Result};
use crate::plan::RemainderPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which compute runtime a session is opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Reference runtime executing kernels on the host CPU.
    Host,
    /// NVIDIA device through the CUDA driver API (feature `cuda`).
    Cuda,
}

impl FromStr for Backend {
    type Err = OffloadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "host" | "cpu" => Ok(Backend::Host),
            "cuda" | "gpu" => Ok(Backend::Cuda),
            _ => Err(OffloadError::Config {
                key: "OFFLOAD_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Tuning and environment parameters shared by every driver.
#[derive(Debug, Clone)]
pub struct OffloadConfig {
    /// Compute runtime used by `ComputeSession::open`.
    pub backend: Backend,

    /// Directory holding the kernel source files.
    pub kernel_dir: PathBuf,

    /// What the planner does with a domain that is not a multiple of the
    /// local size.
    pub remainder: RemainderPolicy,

    /// Workgroup capacity reported by the host runtime.
    pub host_max_work_group: usize,

    /// CUDA device ordinal.
    pub cuda_device: usize,

    /// Number of ranks started by the distributed driver.
    pub world_size: u32,

    /// Upper bound on a single collective send/recv. `None` blocks until the
    /// peer answers or disconnects.
    pub collective_timeout: Option<Duration>,

    /// Partial sets at least this long are reduced on the rayon pool.
    pub parallel_reduce_min: usize,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Host,
            kernel_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels")),
            remainder: RemainderPolicy::Pad,
            host_max_work_group: 256,
            cuda_device: 0,
            world_size: 4,
            collective_timeout: None,
            parallel_reduce_min: 4096,
        }
    }
}

impl OffloadConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `OFFLOAD_BACKEND` (`host` or `cuda`)
    /// - `OFFLOAD_KERNEL_DIR`
    /// - `OFFLOAD_REMAINDER` (`pad` or `truncate`)
    /// - `OFFLOAD_HOST_MAX_WORK_GROUP`
    /// - `OFFLOAD_CUDA_DEVICE`
    /// - `OFFLOAD_WORLD_SIZE`
    /// - `OFFLOAD_COLLECTIVE_TIMEOUT_SECS`
    /// - `OFFLOAD_PARALLEL_REDUCE_MIN`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("OFFLOAD_BACKEND") {
            match v.parse::<Backend>() {
                Ok(b) => cfg.backend = b,
                Err(e) => tracing::warn!("{e}; keeping {:?}", cfg.backend),
            }
        }
        if let Some(v) = lookup("OFFLOAD_KERNEL_DIR") {
            cfg.kernel_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OFFLOAD_REMAINDER") {
            match v.parse::<RemainderPolicy>() {
                Ok(p) => cfg.remainder = p,
                Err(e) => tracing::warn!("{e}; keeping {:?}", cfg.remainder),
            }
        }
        if let Some(v) = lookup("OFFLOAD_HOST_MAX_WORK_GROUP") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    cfg.host_max_work_group = n;
                }
            }
        }
        if let Some(v) = lookup("OFFLOAD_CUDA_DEVICE") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.cuda_device = n;
            }
        }
        if let Some(v) = lookup("OFFLOAD_WORLD_SIZE") {
            if let Ok(n) = v.parse::<u32>() {
                if n > 0 {
                    cfg.world_size = n;
                }
            }
        }
        if let Some(v) = lookup("OFFLOAD_COLLECTIVE_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.collective_timeout = Some(Duration::from_secs(s));
            }
        }
        if let Some(v) = lookup("OFFLOAD_PARALLEL_REDUCE_MIN") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.parallel_reduce_min = n;
            }
        }

        cfg
    }
}
