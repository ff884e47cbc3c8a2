// SPDX-License-Identifier: MIT
//! Interaction gate — decides whether a brokered fetch is authorized.
//!
//! Host permissions for new origins can only be requested off the back of a
//! genuine user interaction. A context-menu click counts; the clicked URL is
//! recorded here so that the fetch request arriving from the companion page
//! shortly after is recognized as user-initiated.
//!
//! The check is deliberately loose: rewrite rules on the companion site may
//! change the URL between the click and the fetch (e.g. a preview page
//! rewritten to a direct download), so any pending interaction authorizes the
//! next fetch regardless of whether the URLs match. This is a temporal
//! correlation heuristic, not a security boundary.

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::debug;

/// Trusted-host fallback: NYT crossword endpoints are fetchable without a
/// recorded interaction, but require the user's cookies to succeed.
static NYT_CROSSWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://www\.nytimes\.com/(svc/)?crosswords/.*").expect("regex: nyt allow-list")
});

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub allowed: bool,
    /// Attach the user's cookies to the fetch (trusted-host path only).
    pub needs_credentials: bool,
}

impl Authorization {
    const DENIED: Self = Self {
        allowed: false,
        needs_credentials: false,
    };
}

/// Records context-menu interactions and answers authorization queries.
///
/// Pending entries are consumed most-recent-first, at most once each. Entries
/// that never see a matching fetch are not expired — the list grows until the
/// daemon restarts. Accepted limitation, carried over from the original
/// extension.
#[derive(Default)]
pub struct InteractionGate {
    pending: Mutex<Vec<String>>,
}

impl InteractionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the user clicked the context menu for `url`.
    pub async fn record_interaction(&self, url: impl Into<String>) {
        let url = url.into();
        debug!(url = %url, "interaction recorded");
        self.pending.lock().await.push(url);
    }

    /// Decide whether a fetch of `url` is authorized.
    ///
    /// A pending interaction — any pending interaction — authorizes one fetch
    /// without credentials and is consumed by it. With nothing pending, the
    /// trusted-host allow-list authorizes with credentials. Everything else
    /// is denied.
    pub async fn authorize(&self, url: &str) -> Authorization {
        if let Some(recorded) = self.pending.lock().await.pop() {
            debug!(url = %url, recorded = %recorded, "authorized by pending interaction");
            return Authorization {
                allowed: true,
                needs_credentials: false,
            };
        }
        if NYT_CROSSWORDS.is_match(url) {
            debug!(url = %url, "authorized by trusted-host allow-list");
            return Authorization {
                allowed: true,
                needs_credentials: true,
            };
        }
        debug!(url = %url, "denied");
        Authorization::DENIED
    }

    /// Number of recorded interactions not yet consumed by a fetch.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
