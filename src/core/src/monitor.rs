pub mod live_monitor;
pub mod types;

pub use live_monitor::{export_key, store_export, LiveMonitor};
pub use types::{CaptureInterface, MonitorStatus, KNOWN_INTERFACES};
