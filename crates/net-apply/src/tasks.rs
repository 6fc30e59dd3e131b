//! Delayed fire-and-forget work and its failure journal

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use appnet_core::Result;

use crate::services::ServiceControl;

/// A background task that did not complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub id: Uuid,
    pub task: String,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

/// Spawns delayed tasks; failures are logged and journaled, never returned
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    journal: Arc<Mutex<Vec<TaskFailure>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, task: impl Into<String>, delay: Duration, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let task = task.into();
        let journal = self.journal.clone();
        info!("Scheduling {} in {:?}", task, delay);

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = work.await {
                error!("Background task {} failed: {}", task, e);
                let failure = TaskFailure {
                    id: Uuid::new_v4(),
                    task,
                    message: e.to_string(),
                    failed_at: Utc::now(),
                };
                if let Ok(mut journal) = journal.lock() {
                    journal.push(failure);
                }
            }
        })
    }

    pub fn schedule_restart(
        &self,
        services: Arc<dyn ServiceControl>,
        service: &str,
        delay: Duration,
    ) -> JoinHandle<()> {
        let name = service.to_string();
        self.schedule(format!("restart {}", service), delay, async move {
            services.restart(&name).await
        })
    }

    pub fn schedule_reboot(&self, services: Arc<dyn ServiceControl>, delay: Duration) -> JoinHandle<()> {
        self.schedule("reboot", delay, async move { services.reboot().await })
    }

    pub fn failures(&self) -> Vec<TaskFailure> {
        self.journal
            .lock()
            .map(|journal| journal.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockServiceControl;
    use appnet_core::error::KernelError;
    use appnet_core::NetworkError;

    #[tokio::test]
    async fn test_failures_are_journaled() {
        let tasks = BackgroundTasks::new();
        let mut services = MockServiceControl::new();
        services
            .expect_restart()
            .withf(|service| service == "keepalived")
            .times(1)
            .returning(|_| {
                Err(NetworkError::Kernel(KernelError::CommandFailed {
                    command: "systemctl restart keepalived".to_string(),
                    exit_code: Some(5),
                    stderr: "Unit keepalived.service not found.".to_string(),
                }))
            });

        tasks
            .schedule_restart(Arc::new(services), "keepalived", Duration::ZERO)
            .await
            .unwrap();

        let failures = tasks.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task, "restart keepalived");
        assert!(failures[0].message.contains("not found"));
    }

    #[tokio::test]
    async fn test_successful_task_leaves_no_entry() {
        let tasks = BackgroundTasks::new();
        let mut services = MockServiceControl::new();
        services.expect_reboot().times(1).returning(|| Ok(()));

        tasks
            .schedule_reboot(Arc::new(services), Duration::from_millis(5))
            .await
            .unwrap();
        assert!(tasks.failures().is_empty());
    }
}
