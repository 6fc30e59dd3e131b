//! Daemon restarts and reboots

use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::process::Command;
use tokio::time::timeout;

use appnet_core::error::KernelError;
use appnet_core::{NetworkError, Result};

/// Control over the failover/routing daemons and the host itself
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn restart(&self, service: &str) -> Result<()>;

    async fn reboot(&self) -> Result<()>;
}

/// systemd-managed services
pub struct SystemdServices {
    systemctl_path: String,
    operation_timeout: Duration,
}

impl SystemdServices {
    pub fn new() -> Self {
        Self {
            systemctl_path: "/bin/systemctl".to_string(),
            operation_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_config(systemctl_path: String, operation_timeout: Duration) -> Self {
        Self {
            systemctl_path,
            operation_timeout,
        }
    }

    async fn systemctl(&self, args: &[&str]) -> Result<()> {
        let command = format!("{} {}", self.systemctl_path, args.join(" "));
        let mut cmd = Command::new(&self.systemctl_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match timeout(self.operation_timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                warn!("{} failed: {}", command, stderr);
                Err(NetworkError::Kernel(KernelError::CommandFailed {
                    command,
                    exit_code: output.status.code(),
                    stderr,
                }))
            }
            Ok(Err(e)) => Err(NetworkError::Kernel(KernelError::Spawn {
                command,
                message: e.to_string(),
            })),
            Err(_) => Err(NetworkError::Kernel(KernelError::Timeout {
                command,
                timeout_secs: self.operation_timeout.as_secs(),
            })),
        }
    }
}

impl Default for SystemdServices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceControl for SystemdServices {
    async fn restart(&self, service: &str) -> Result<()> {
        info!("Restarting {}", service);
        self.systemctl(&["restart", service]).await
    }

    async fn reboot(&self) -> Result<()> {
        info!("Rebooting");
        self.systemctl(&["reboot"]).await
    }
}

/// Records requests instead of acting on them
#[derive(Default)]
pub struct RecordingServices {
    calls: Mutex<Vec<String>>,
}

impl RecordingServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// `restart <service>` or `reboot`, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ServiceControl for RecordingServices {
    async fn restart(&self, service: &str) -> Result<()> {
        self.record(format!("restart {}", service));
        Ok(())
    }

    async fn reboot(&self) -> Result<()> {
        self.record("reboot".to_string());
        Ok(())
    }
}
