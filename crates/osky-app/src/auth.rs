//! # Auth
//!
//! Session lifecycle on top of the protocol client: login, resume from the
//! persisted blob, logout. Only the session blob is ever stored.

use std::sync::Arc;

use osky_core::richtext::detect_facets;
use osky_core::{AppError, NewPost, Profile, ProtocolClient, Result, Session, SessionStore, StrongRef};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct Auth {
    client: Arc<dyn ProtocolClient>,
    store: Arc<dyn SessionStore>,
    session: RwLock<Option<Session>>,
}

impl Auth {
    pub fn new(client: Arc<dyn ProtocolClient>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            client,
            store,
            session: RwLock::new(None),
        }
    }

    /// Creates a session and persists it. A rejected login leaves any
    /// previous session in place.
    pub async fn login(&self, identifier: &str, password: &SecretString) -> Result<Session> {
        let session = self
            .client
            .login(identifier, password.expose_secret())
            .await
            .map_err(|e| {
                warn!(%identifier, error = %e, "login rejected");
                AppError::Auth(e.to_string())
            })?;

        if let Err(e) = self.store.save(&session).await {
            // Still signed in for this run.
            warn!(error = %e, "failed to persist session");
        }
        info!(handle = %session.handle, "signed in");
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Resumes the persisted session. Returns `false` when there is none or
    /// the service refused it; a refused blob is cleared.
    pub async fn resume(&self) -> Result<bool> {
        let stored = match self.store.load().await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!(error = %e, "unreadable session blob");
                self.clear_store().await;
                return Ok(false);
            }
        };

        match self.client.resume_session(stored).await {
            Ok(session) => {
                if let Err(e) = self.store.save(&session).await {
                    warn!(error = %e, "failed to persist refreshed session");
                }
                info!(handle = %session.handle, "session resumed");
                *self.session.write().await = Some(session);
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "stored session rejected");
                self.clear_store().await;
                *self.session.write().await = None;
                Ok(false)
            }
        }
    }

    pub async fn logout(&self) {
        if self.session.read().await.is_some() {
            if let Err(e) = self.client.delete_session().await {
                warn!(error = %e, "failed to delete upstream session");
            }
        }
        self.clear_store().await;
        *self.session.write().await = None;
        info!("signed out");
    }

    /// Publishes a top-level post with detected mentions and links.
    pub async fn create_post(&self, text: &str) -> Result<StrongRef> {
        self.require().await?;
        if text.trim().is_empty() {
            return Err(AppError::Validation("post is empty".to_string()));
        }
        let post = NewPost {
            text: text.to_string(),
            reply: None,
            facets: detect_facets(self.client.as_ref(), text).await,
        };
        self.client
            .create_post(post)
            .await
            .map_err(|e| AppError::Mutation(e.to_string()))
    }

    /// Profile of the signed-in account.
    pub async fn profile(&self) -> Result<Profile> {
        let did = self
            .session
            .read()
            .await
            .as_ref()
            .map(|session| session.did.clone())
            .ok_or(AppError::Unauthenticated)?;
        self.client.get_profile(&did).await.map_err(|e| {
            warn!(%did, error = %e, "failed to load profile");
            AppError::Profile(e.to_string())
        })
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Fails with `Unauthenticated` unless signed in.
    pub async fn require(&self) -> Result<()> {
        if self.is_authenticated().await {
            Ok(())
        } else {
            Err(AppError::Unauthenticated)
        }
    }

    async fn clear_store(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear session blob");
        }
    }
}
