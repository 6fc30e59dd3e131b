//! Numbered HA requests

use serde::{Deserialize, Serialize};

use appnet_core::error::ValidationError;
use appnet_core::{NetworkError, Result};
use appnet_types::HaConfig;

pub const CREATE_HA: u8 = 1;
pub const DISABLE_HA: u8 = 2;
pub const SYNC_BACKUP: u8 = 3;

/// Wire form of an HA request; `config` accompanies type 1 only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaRequest {
    pub request_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HaConfig>,
    /// Type 2: also ask the peer to disable
    #[serde(default)]
    pub notify_peer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HaAction {
    Create(HaConfig),
    Disable { notify_peer: bool },
    SyncBackup,
}

impl HaRequest {
    pub fn create(config: HaConfig) -> Self {
        Self {
            request_type: CREATE_HA,
            config: Some(config),
            notify_peer: false,
        }
    }

    pub fn disable(notify_peer: bool) -> Self {
        Self {
            request_type: DISABLE_HA,
            config: None,
            notify_peer,
        }
    }

    pub fn sync_backup() -> Self {
        Self {
            request_type: SYNC_BACKUP,
            config: None,
            notify_peer: false,
        }
    }

    pub fn into_action(self) -> Result<HaAction> {
        match self.request_type {
            CREATE_HA => self.config.map(HaAction::Create).ok_or_else(|| {
                NetworkError::Validation(ValidationError::MissingField {
                    field: "config".to_string(),
                })
            }),
            DISABLE_HA => Ok(HaAction::Disable {
                notify_peer: self.notify_peer,
            }),
            SYNC_BACKUP => Ok(HaAction::SyncBackup),
            other => Err(NetworkError::Validation(
                ValidationError::UnsupportedRequest(other),
            )),
        }
    }
}
