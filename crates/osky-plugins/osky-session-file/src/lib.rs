//! # osky-session-file
//!
//! Local filesystem implementation of `SessionStore`.
//! The session blob is a single JSON file, written via a temp file and a
//! rename so a crash never leaves half a session behind.

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use osky_core::{Session, SessionStore};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const SESSION_FILE: &str = "atp-session.json";

pub struct FileSessionStore {
    /// Full path of the session blob (e.g. "./.oldsky/atp-session.json")
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Stores the blob as `atp-session.json` inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir.into().join(SESSION_FILE))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> anyhow::Result<Option<Session>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        let session = serde_json::from_slice(&data)
            .with_context(|| format!("parsing session blob {}", self.path.display()))?;
        debug!(path = %self.path.display(), "session blob loaded");
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let data = serde_json::to_vec_pretty(session)?;
        let tmp = self.temp_path();
        // A leftover temp file would keep its old mode.
        match fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("removing stale {}", tmp.display())),
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        // Tokens grant full account access; the file is never readable by others.
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options
            .open(&tmp)
            .await
            .with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(&data)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!(path = %self.path.display(), "session blob saved");
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}
