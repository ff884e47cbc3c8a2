// SPDX-License-Identifier: MIT
//! Host-permission acquisition for brokered fetch origins.
//!
//! Before the broker may fetch from a new origin, the user has to grant that
//! origin. The daemon mirrors the browser model: a per-request
//! [`OriginPattern`] is derived from the target URL, checked against the
//! granted set, and — when missing — put to the user via a prompt the
//! connected shell renders. `request` blocks until a decision arrives; there
//! is deliberately no timeout, so an ignored prompt parks its fetch until the
//! requesting connection goes away.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::ipc::event::EventBroadcaster;

/// The one host whose declared scheme lets us skip the wildcard.
pub const TRUSTED_HOST: &str = "www.nytimes.com";

// ─── Origin patterns ──────────────────────────────────────────────────────────

/// A scheme + hostname permission pattern, derived per request and never
/// persisted in this form (the granted set stores the rendered string).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginPattern {
    scheme: &'static str,
    hostname: String,
}

impl OriginPattern {
    /// Derive the pattern for `url`, or `None` when the URL has no host
    /// (e.g. `data:` and `mailto:` URLs).
    ///
    /// Some sites link an http URL that redirects to https; the prompt is our
    /// only chance to ask, so everything but the trusted host gets a wildcard
    /// scheme. The trusted host is declared https-only, and pinning it avoids
    /// prompting for a permission the user effectively already gave.
    pub fn from_url(url: &Url) -> Option<Self> {
        let hostname = url.host_str()?.to_string();
        let scheme = if hostname == TRUSTED_HOST { "https" } else { "*" };
        Some(Self { scheme, hostname })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl fmt::Display for OriginPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/", self.scheme, self.hostname)
    }
}

// ─── PermissionStore seam ─────────────────────────────────────────────────────

/// The host permission API the broker runs against.
///
/// Production uses [`HostPermissionStore`]; tests substitute canned stores.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Whether `origin` is already granted.
    async fn contains(&self, origin: &OriginPattern) -> bool;

    /// Ask the user to grant `origin`. May suspend indefinitely awaiting the
    /// decision. Returns `true` only on an explicit grant.
    async fn request(&self, origin: &OriginPattern) -> bool;
}

// ─── Prompt router ────────────────────────────────────────────────────────────

/// Current status of a pending permission prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    Pending,
    Granted,
    Denied,
}

/// A permission prompt awaiting the user's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPrompt {
    /// Stable unique ID, echoed back in the `permissiondecision` message.
    pub id: String,
    /// Origin patterns being requested (a single pattern today).
    pub origins: Vec<String>,
    /// When the prompt was opened.
    pub requested_at: DateTime<Utc>,
    /// Current status.
    pub status: PromptStatus,
}

/// Tracks in-flight permission prompts and wakes waiters on decisions.
pub struct PromptRouter {
    prompts: Mutex<HashMap<String, PermissionPrompt>>,
    /// Every decision sends the prompt id.
    tx: broadcast::Sender<String>,
}

impl Default for PromptRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRouter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            prompts: Mutex::new(HashMap::new()),
            tx,
        }
    }

    /// Open a prompt for `origin` and return it (status `Pending`).
    pub async fn open(&self, origin: &OriginPattern) -> PermissionPrompt {
        let prompt = PermissionPrompt {
            id: Uuid::new_v4().to_string(),
            origins: vec![origin.to_string()],
            requested_at: Utc::now(),
            status: PromptStatus::Pending,
        };
        self.prompts
            .lock()
            .await
            .insert(prompt.id.clone(), prompt.clone());
        prompt
    }

    /// Resolve a prompt. Errors if the id is unknown or already decided.
    pub async fn decide(&self, prompt_id: &str, allow: bool) -> Result<()> {
        let mut prompts = self.prompts.lock().await;
        let prompt = prompts
            .get_mut(prompt_id)
            .with_context(|| format!("prompt '{prompt_id}' not found"))?;
        if prompt.status != PromptStatus::Pending {
            anyhow::bail!("prompt '{}' is already {:?}", prompt_id, prompt.status);
        }
        prompt.status = if allow {
            PromptStatus::Granted
        } else {
            PromptStatus::Denied
        };
        // Ignore errors — no waiter means the requester went away.
        let _ = self.tx.send(prompt_id.to_string());
        Ok(())
    }

    /// Block until the prompt is decided; returns `true` on grant.
    ///
    /// The decided entry is removed before returning. An unknown id counts
    /// as denied.
    pub async fn wait(&self, prompt_id: &str) -> bool {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let mut prompts = self.prompts.lock().await;
                match prompts.get(prompt_id).map(|p| p.status.clone()) {
                    Some(PromptStatus::Granted) => {
                        prompts.remove(prompt_id);
                        return true;
                    }
                    Some(PromptStatus::Denied) => {
                        prompts.remove(prompt_id);
                        return false;
                    }
                    Some(PromptStatus::Pending) => {}
                    None => return false,
                }
            }
            loop {
                match rx.recv().await {
                    Ok(id) if id == prompt_id => break,
                    Ok(_) => continue,
                    // Missed decisions — re-check the table.
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        }
    }

    /// Prompts still awaiting a decision.
    pub async fn pending(&self) -> Vec<PermissionPrompt> {
        self.prompts
            .lock()
            .await
            .values()
            .filter(|p| p.status == PromptStatus::Pending)
            .cloned()
            .collect()
    }
}

// ─── Production store ─────────────────────────────────────────────────────────

/// Granted-origin set persisted under the data dir, with prompts forwarded to
/// the connected shell as `permission.prompt` notifications.
pub struct HostPermissionStore {
    granted: Mutex<HashSet<String>>,
    path: PathBuf,
    router: Arc<PromptRouter>,
    broadcaster: Arc<EventBroadcaster>,
}

impl HostPermissionStore {
    /// Load the granted set from `{data_dir}/permissions.json`, or start
    /// empty when the file is missing or unreadable.
    pub fn load(
        data_dir: &Path,
        router: Arc<PromptRouter>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        let path = data_dir.join("permissions.json");
        let granted: HashSet<String> = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(set) => set,
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "unparseable permissions file — starting empty");
                    HashSet::new()
                }
            },
            Err(_) => HashSet::new(),
        };
        if !granted.is_empty() {
            info!(count = granted.len(), "loaded granted origins");
        }
        Self {
            granted: Mutex::new(granted),
            path,
            router,
            broadcaster,
        }
    }

    fn persist(&self, granted: &HashSet<String>) {
        let mut origins: Vec<&String> = granted.iter().collect();
        origins.sort();
        let json = serde_json::to_string_pretty(&origins).unwrap_or_default();
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), err = %e, "failed to persist granted origins");
        }
    }
}

#[async_trait]
impl PermissionStore for HostPermissionStore {
    async fn contains(&self, origin: &OriginPattern) -> bool {
        self.granted.lock().await.contains(&origin.to_string())
    }

    async fn request(&self, origin: &OriginPattern) -> bool {
        let prompt = self.router.open(origin).await;
        info!(origin = %origin, prompt = %prompt.id, "requesting origin permission");
        self.broadcaster.broadcast(
            "permission.prompt",
            serde_json::json!({ "id": prompt.id, "origins": prompt.origins }),
        );

        let granted = self.router.wait(&prompt.id).await;
        if granted {
            let mut set = self.granted.lock().await;
            set.insert(origin.to_string());
            self.persist(&set);
            info!(origin = %origin, "origin granted");
        } else {
            debug!(origin = %origin, "origin denied");
        }
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_host_pattern_pins_https() {
        let url = Url::parse("http://www.nytimes.com/crosswords/x").unwrap();
        let pattern = OriginPattern::from_url(&url).unwrap();
        assert_eq!(pattern.to_string(), "https://www.nytimes.com/");
    }

    #[test]
    fn other_hosts_get_wildcard_scheme() {
        let url = Url::parse("http://beq.example.com/puzzle?id=3").unwrap();
        let pattern = OriginPattern::from_url(&url).unwrap();
        assert_eq!(pattern.to_string(), "*://beq.example.com/");
        assert_eq!(pattern.hostname(), "beq.example.com");
    }

    #[test]
    fn hostless_urls_have_no_pattern() {
        let url = Url::parse("data:text/plain,hello").unwrap();
        assert!(OriginPattern::from_url(&url).is_none());
    }

    #[tokio::test]
    async fn decision_wakes_waiter() {
        let router = Arc::new(PromptRouter::new());
        let origin = OriginPattern::from_url(&Url::parse("https://example.com/").unwrap()).unwrap();
        let prompt = router.open(&origin).await;

        let waiter = {
            let router = Arc::clone(&router);
            let id = prompt.id.clone();
            tokio::spawn(async move { router.wait(&id).await })
        };

        router.decide(&prompt.id, true).await.unwrap();
        assert!(waiter.await.unwrap());
        // Entry is consumed along with the decision.
        assert!(router.pending().await.is_empty());
    }

    #[tokio::test]
    async fn denied_decision_resolves_false() {
        let router = Arc::new(PromptRouter::new());
        let origin = OriginPattern::from_url(&Url::parse("https://example.com/").unwrap()).unwrap();
        let prompt = router.open(&origin).await;
        router.decide(&prompt.id, false).await.unwrap();
        assert!(!router.wait(&prompt.id).await);
    }

    #[tokio::test]
    async fn double_decision_is_rejected() {
        let router = PromptRouter::new();
        let origin = OriginPattern::from_url(&Url::parse("https://example.com/").unwrap()).unwrap();
        let prompt = router.open(&origin).await;
        router.decide(&prompt.id, true).await.unwrap();
        assert!(router.decide(&prompt.id, false).await.is_err());
    }

    #[tokio::test]
    async fn unknown_prompt_is_an_error() {
        let router = PromptRouter::new();
        assert!(router.decide("nope", true).await.is_err());
    }
}
