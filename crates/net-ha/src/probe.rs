//! ICMP reachability check run before every peer call

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;
use tokio::time::timeout;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn reachable(&self, address: IpAddr) -> bool;
}

/// One echo request through the system `ping`
pub struct PingProbe {
    ping_path: String,
    wait_secs: u64,
}

impl PingProbe {
    pub fn new() -> Self {
        Self {
            ping_path: "/bin/ping".to_string(),
            wait_secs: 2,
        }
    }

    pub fn with_config(ping_path: String, wait_secs: u64) -> Self {
        Self {
            ping_path,
            wait_secs,
        }
    }

    pub fn args(&self, address: IpAddr) -> Vec<String> {
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            self.wait_secs.to_string(),
            address.to_string(),
        ]
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn reachable(&self, address: IpAddr) -> bool {
        let mut cmd = Command::new(&self.ping_path);
        cmd.args(self.args(address))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // ping enforces -W itself; the outer bound covers a hung process
        let limit = Duration::from_secs(self.wait_secs + 1);
        match timeout(limit, cmd.status()).await {
            Ok(Ok(status)) => {
                debug!("ping {} exited with {}", address, status);
                status.success()
            }
            Ok(Err(e)) => {
                warn!("Failed to run {}: {}", self.ping_path, e);
                false
            }
            Err(_) => {
                warn!("ping {} did not finish within {:?}", address, limit);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_echo_with_wait() {
        let probe = PingProbe::with_config("ping".to_string(), 3);
        assert_eq!(
            probe.args("172.16.0.2".parse().unwrap()),
            vec!["-c", "1", "-W", "3", "172.16.0.2"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_unreachable() {
        let probe = PingProbe::with_config("/nonexistent/ping".to_string(), 1);
        assert!(!probe.reachable("127.0.0.1".parse().unwrap()).await);
    }
}
