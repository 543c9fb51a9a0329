use offload::{ComputeSession, OffloadConfig, RemainderPolicy};

/// Config for a host device with the given workgroup capacity.
pub fn host_config(capacity: usize, remainder: RemainderPolicy) -> OffloadConfig {
    OffloadConfig {
        host_max_work_group: capacity,
        remainder,
        ..OffloadConfig::default()
    }
}

/// Host-backed session with the given workgroup capacity.
pub fn host_session(capacity: usize, remainder: RemainderPolicy) -> ComputeSession {
    ComputeSession::open(&host_config(capacity, remainder)).unwrap()
}
