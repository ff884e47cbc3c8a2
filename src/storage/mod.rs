//! Persisted user preferences.
//!
//! A single JSON document at `{data_dir}/prefs.json`, written through
//! [`PrefStore`] and fanned out to in-process subscribers over a watch
//! channel so the menu controller tracks external toggles (the options
//! surface writes the same key).

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

const PREFS_FILE: &str = "prefs.json";

fn default_ctxmenu() -> bool {
    true
}

/// User-tunable preferences. Unknown keys in the file are ignored; missing
/// keys take their defaults, so the document can be edited by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefs {
    /// Show the context-menu entries. Default: true.
    #[serde(default = "default_ctxmenu")]
    pub ctxmenu: bool,
}

impl Default for Prefs {
    fn default() -> Self {
        Self { ctxmenu: true }
    }
}

/// File-backed preference store with change notification.
pub struct PrefStore {
    path: PathBuf,
    tx: watch::Sender<Prefs>,
}

impl PrefStore {
    /// Load preferences from `{data_dir}/prefs.json`, falling back to
    /// defaults when the file is missing or unparseable.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(PREFS_FILE);
        let prefs = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(prefs) => prefs,
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "unparseable prefs file — using defaults");
                    Prefs::default()
                }
            },
            Err(_) => Prefs::default(),
        };
        let (tx, _) = watch::channel(prefs);
        Self { path, tx }
    }

    /// Current preference snapshot.
    pub fn get(&self) -> Prefs {
        *self.tx.borrow()
    }

    /// Subscribe to preference changes. The receiver starts marked changed,
    /// so a subscriber task applies the current state first.
    pub fn subscribe(&self) -> watch::Receiver<Prefs> {
        let mut rx = self.tx.subscribe();
        rx.mark_changed();
        rx
    }

    /// Toggle the context-menu preference, persist, and notify subscribers.
    pub fn set_ctxmenu(&self, on: bool) -> Result<()> {
        let mut prefs = self.get();
        if prefs.ctxmenu == on {
            return Ok(());
        }
        prefs.ctxmenu = on;
        let json = serde_json::to_string_pretty(&prefs)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        info!(ctxmenu = on, "preference updated");
        // Ignore errors — no subscribers is fine.
        let _ = self.tx.send(prefs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ctxmenu_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrefStore::load(dir.path());
        assert!(store.get().ctxmenu);
    }

    #[test]
    fn toggle_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrefStore::load(dir.path());
        store.set_ctxmenu(false).unwrap();
        assert!(!store.get().ctxmenu);

        let reopened = PrefStore::load(dir.path());
        assert!(!reopened.get().ctxmenu);
    }

    #[test]
    fn missing_key_takes_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PREFS_FILE), "{}").unwrap();
        let store = PrefStore::load(dir.path());
        assert!(store.get().ctxmenu);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrefStore::load(dir.path());
        let mut rx = store.subscribe();

        // Initial state is immediately visible.
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().ctxmenu);

        store.set_ctxmenu(false).unwrap();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().ctxmenu);
    }

    #[test]
    fn redundant_toggle_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrefStore::load(dir.path());
        store.set_ctxmenu(true).unwrap();
        // No file is written for a no-op toggle.
        assert!(!dir.path().join(PREFS_FILE).exists());
    }
}
