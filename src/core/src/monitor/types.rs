use serde::Serialize;

/// A capture interface the console can listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureInterface {
    pub id: &'static str,
    pub name: &'static str,
    pub address: &'static str,
}

pub const KNOWN_INTERFACES: [CaptureInterface; 3] = [
    CaptureInterface {
        id: "wlan0",
        name: "Wi-Fi 6",
        address: "192.168.1.15",
    },
    CaptureInterface {
        id: "eth0",
        name: "Ethernet",
        address: "10.0.0.5",
    },
    CaptureInterface {
        id: "tun0",
        name: "VPN",
        address: "10.8.0.2",
    },
];

pub fn find_interface(id: &str) -> Option<CaptureInterface> {
    KNOWN_INTERFACES.iter().copied().find(|iface| iface.id == id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub paused: bool,
    pub interface: CaptureInterface,
    pub local_address: String,
    pub capacity: usize,
    pub buffered: usize,
    pub next_sequence: u64,
}
