use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const IPIFY_URL: &str = "https://api.ipify.org?format=json";
pub const FALLBACK_ADDRESS: &str = "196.1.200.1";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the console believes it sits on the internet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicIpInfo {
    pub ip: String,
    pub city: String,
    pub org: String,
}

impl PublicIpInfo {
    pub fn fallback() -> Self {
        Self {
            ip: FALLBACK_ADDRESS.to_string(),
            city: "Sudan".to_string(),
            org: "Telecom".to_string(),
        }
    }

    fn resolved(ip: String) -> Self {
        Self {
            ip,
            city: "Khartoum".to_string(),
            org: "Local ISP".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct IpifyResponse {
    ip: String,
}

/// Queries `url` (an ipify-style `{"ip": "..."}` endpoint). Never fails: any
/// transport, status or decoding problem yields [`PublicIpInfo::fallback`].
pub async fn lookup_public_ip(url: &str) -> PublicIpInfo {
    match fetch_ip(url).await {
        Ok(ip) => {
            info!("Public address resolved to {}", ip);
            PublicIpInfo::resolved(ip)
        }
        Err(e) => {
            warn!("Public address lookup failed ({}), using {}", e, FALLBACK_ADDRESS);
            PublicIpInfo::fallback()
        }
    }
}

async fn fetch_ip(url: &str) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
    let body: IpifyResponse = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(body.ip)
}
