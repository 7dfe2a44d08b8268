use serde::{Deserialize, Serialize};

/// Host facts worth printing next to a session's log.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os_name: String,
    pub arch: String,
    pub family: String,
    pub cpu_cores: usize,
    pub physical_cores: usize,
    pub opencv_enabled: bool,
}

impl PlatformInfo {
    pub fn detect() -> Self {
        Self {
            os_name: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            family: std::env::consts::FAMILY.to_string(),
            cpu_cores: core_count(),
            physical_cores: num_cpus::get_physical(),
            opencv_enabled: cfg!(feature = "opencv"),
        }
    }
}

/// Logical cores, at least one. Used to size decoder thread pools.
pub fn core_count() -> usize {
    num_cpus::get().max(1)
}
