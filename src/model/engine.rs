/// Engine identity and counters, as shown on a status dashboard.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineOverview {
    pub platform: String,
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
    pub operating_system: String,
    pub driver: String,
    pub containers: u64,
    pub containers_running: u64,
    pub containers_stopped: u64,
    pub images: u64,
    pub ncpu: u64,
    pub mem_total: u64,     // bytes
}
