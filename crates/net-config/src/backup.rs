//! Checksummed snapshots of the persisted documents

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use appnet_core::error::KernelError;
use appnet_core::{NetworkError, Result};

use crate::store::{ConfigStore, DOCUMENTS};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One document copied into a backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFile {
    pub name: String,
    pub checksum: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<BackupFile>,
}

impl ConfigStore {
    /// Copy every existing document into a fresh timestamped directory
    /// under `dir` and record a checksum manifest next to them.
    pub async fn backup(&self, dir: &Path) -> Result<(PathBuf, BackupManifest)> {
        let created_at = Utc::now();
        let id = created_at.format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let target = dir.join(&id);
        fs::create_dir_all(&target).await?;

        let mut files = Vec::new();
        for document in DOCUMENTS {
            let source = self.document_path(document);
            let content = match fs::read(&source).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            fs::write(target.join(document), &content).await?;
            files.push(BackupFile {
                name: document.to_string(),
                checksum: format!("{:x}", md5::compute(&content)),
                size: content.len() as u64,
            });
            debug!("Backed up {:?}", source);
        }

        let manifest = BackupManifest {
            id,
            created_at,
            files,
        };
        fs::write(
            target.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        info!(
            "Created configuration backup {} with {} documents",
            manifest.id,
            manifest.files.len()
        );
        Ok((target, manifest))
    }
}

/// Check every file listed in a backup's manifest against its checksum
pub async fn verify_backup(backup_dir: &Path) -> Result<BackupManifest> {
    let manifest: BackupManifest =
        serde_json::from_slice(&fs::read(backup_dir.join(MANIFEST_FILE)).await?)?;

    for file in &manifest.files {
        let content = fs::read(backup_dir.join(&file.name)).await?;
        let checksum = format!("{:x}", md5::compute(&content));
        if checksum != file.checksum {
            return Err(NetworkError::Kernel(KernelError::Parse {
                message: format!("backup file {} checksum mismatch", file.name),
            }));
        }
    }

    Ok(manifest)
}
