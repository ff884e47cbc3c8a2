// SPDX-License-Identifier: MIT
//! Context-menu contributions and click handling.
//!
//! Two entries: a link-context entry for arbitrary puzzle links, and a
//! frame-context entry shown only inside amuselabs puzzle frames. Visibility
//! tracks the persisted `ctxmenu` preference. A click records the resolved
//! URL with the interaction gate and produces a [`TabRequest`] pointing at
//! the companion site, which carries the original URL and the referring page
//! as query parameters and takes the flow from there.
//!
//! The menu surface itself belongs to the host shell; this module only talks
//! to it through the [`MenuRegistry`] seam, so the controller is fully
//! exercisable in tests.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::gate::InteractionGate;
use crate::ipc::event::EventBroadcaster;
use crate::storage::Prefs;

pub const LINK_MENU_ID: &str = "openinsquares";
pub const FRAME_MENU_ID: &str = "openinsquaresfrm";

/// Frame entry only appears inside amuselabs-hosted puzzle documents.
const AMUSELABS_FRAME_PATTERN: &str = "*://*.amuselabs.com/*";

// ─── Menu surface ─────────────────────────────────────────────────────────────

/// A context-menu contribution, in the shape the shell materializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuEntry {
    pub id: String,
    pub title: String,
    pub contexts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url_patterns: Option<Vec<String>>,
}

/// The host menu API. Removing an entry that does not exist is not an error
/// — shells ignore it, mirroring double-remove on preference flaps.
#[async_trait]
pub trait MenuRegistry: Send + Sync {
    async fn create(&self, entry: MenuEntry);
    async fn remove(&self, id: &str);
}

/// Production registry: forwards menu mutations to connected shells.
pub struct ShellMenuRegistry {
    broadcaster: Arc<EventBroadcaster>,
}

impl ShellMenuRegistry {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl MenuRegistry for ShellMenuRegistry {
    async fn create(&self, entry: MenuEntry) {
        self.broadcaster
            .broadcast("menu.create", serde_json::json!(entry));
    }

    async fn remove(&self, id: &str) {
        self.broadcaster
            .broadcast("menu.remove", serde_json::json!({ "id": id }));
    }
}

// ─── Click events ─────────────────────────────────────────────────────────────

/// The tab a click originated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: Option<i64>,
    pub index: i64,
    pub window_id: i64,
    /// The referring page, forwarded to the companion site.
    pub url: String,
}

/// A context-menu click as delivered by the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuClick {
    pub menu_item_id: String,
    pub link_url: Option<String>,
    pub frame_url: Option<String>,
    pub tab: TabInfo,
}

/// Instruction to open a companion tab adjacent to the clicked one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRequest {
    pub url: String,
    pub window_id: i64,
    pub index: i64,
    pub active: bool,
    pub opener_tab_id: Option<i64>,
}

// ─── Controller ───────────────────────────────────────────────────────────────

/// Keeps the menu contributions in sync with the `ctxmenu` preference and
/// turns clicks into recorded interactions plus companion-tab requests.
pub struct MenuController {
    gate: Arc<InteractionGate>,
    registry: Arc<dyn MenuRegistry>,
    companion: Url,
}

impl MenuController {
    pub fn new(
        gate: Arc<InteractionGate>,
        registry: Arc<dyn MenuRegistry>,
        companion_url: &str,
    ) -> Result<Self> {
        let companion = Url::parse(companion_url)
            .with_context(|| format!("invalid companion URL '{companion_url}'"))?;
        Ok(Self {
            gate,
            registry,
            companion,
        })
    }

    pub fn link_entry() -> MenuEntry {
        MenuEntry {
            id: LINK_MENU_ID.to_string(),
            title: "Open link in squares.io".to_string(),
            contexts: vec!["link".to_string()],
            document_url_patterns: None,
        }
    }

    pub fn frame_entry() -> MenuEntry {
        MenuEntry {
            id: FRAME_MENU_ID.to_string(),
            title: "Open this puzzle in squares.io".to_string(),
            contexts: vec!["frame".to_string()],
            document_url_patterns: Some(vec![AMUSELABS_FRAME_PATTERN.to_string()]),
        }
    }

    /// Create or remove both entries.
    pub async fn set_menu_visible(&self, show: bool) {
        if show {
            self.registry.create(Self::link_entry()).await;
            self.registry.create(Self::frame_entry()).await;
        } else {
            self.registry.remove(LINK_MENU_ID).await;
            self.registry.remove(FRAME_MENU_ID).await;
        }
    }

    /// Handle a click: resolve the URL for whichever entry was hit, record
    /// the interaction, and build the companion-tab request.
    ///
    /// Returns `None` for unknown entries and clicks that carry no URL —
    /// nothing is recorded in that case.
    pub async fn on_click(&self, click: &MenuClick) -> Option<TabRequest> {
        let url = match click.menu_item_id.as_str() {
            LINK_MENU_ID => click.link_url.as_deref(),
            FRAME_MENU_ID => click.frame_url.as_deref(),
            _ => None,
        }?;

        // Tell the fetch gate to expect this URL.
        self.gate.record_interaction(url).await;

        let mut nav = self.companion.clone();
        nav.set_path("/fetch/url");
        nav.query_pairs_mut()
            .append_pair("url", url)
            .append_pair("from", &click.tab.url);

        info!(url = %url, "context-menu click — opening companion tab");
        Some(TabRequest {
            url: nav.to_string(),
            window_id: click.tab.window_id,
            index: click.tab.index + 1,
            active: true,
            opener_tab_id: click.tab.id,
        })
    }

    /// Apply the current preference and keep applying changes until the
    /// store goes away.
    pub fn spawn_sync(self: Arc<Self>, mut prefs: watch::Receiver<Prefs>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while prefs.changed().await.is_ok() {
                let show = prefs.borrow_and_update().ctxmenu;
                debug!(show, "syncing context-menu visibility");
                self.set_menu_visible(show).await;
            }
        })
    }
}
