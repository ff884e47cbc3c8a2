// SPDX-License-Identifier: MIT
//! Fetch broker — the `fetchurl` operation.
//!
//! Every request walks the same line: interaction-gate authorization, origin
//! permission (prompting the user when the origin is new), one GET, one
//! status check, one body read. The body comes back base64-encoded together
//! with the response's `Content-Disposition` header, which downstream uses
//! to recover the puzzle filename. All failures are terminal — no retry, no
//! partial result.

use std::sync::Arc;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::gate::InteractionGate;
use crate::permissions::{OriginPattern, PermissionStore};

/// Terminal failure of a brokered fetch. `code()` is the stable
/// machine-readable category carried on the wire; the display text is the
/// human-readable half.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The interaction gate denied the request.
    #[error("URL is not allowed")]
    NotAllowed,
    /// The user declined the origin-permission prompt.
    #[error("Permission request was denied by the user")]
    PermissionDenied,
    /// Network failure, non-200 status, or body-read failure.
    #[error("{0}")]
    Fetch(String),
}

impl BrokerError {
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::NotAllowed => "allow",
            BrokerError::PermissionDenied => "perms",
            BrokerError::Fetch(_) => "fetch",
        }
    }
}

/// A successfully brokered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPuzzle {
    /// Response body, standard base64.
    pub puz64: String,
    /// `Content-Disposition` header value, if the server sent one.
    pub cdhdr: Option<String>,
}

/// Brokers cross-origin fetches on behalf of the companion site.
pub struct FetchBroker {
    gate: Arc<InteractionGate>,
    permissions: Arc<dyn PermissionStore>,
    /// Cookie-jar client for trusted-host requests (`credentials: include`).
    with_credentials: reqwest::Client,
    /// Plain client for everything else (`credentials: omit`).
    anonymous: reqwest::Client,
}

impl FetchBroker {
    pub fn new(gate: Arc<InteractionGate>, permissions: Arc<dyn PermissionStore>) -> Result<Self> {
        let with_credentials = reqwest::Client::builder().cookie_store(true).build()?;
        let anonymous = reqwest::Client::builder().build()?;
        Ok(Self {
            gate,
            permissions,
            with_credentials,
            anonymous,
        })
    }

    /// Fetch `raw` and encode the body, enforcing the gate and the origin
    /// permission along the way.
    pub async fn fetch_url(&self, raw: &str) -> Result<FetchedPuzzle, BrokerError> {
        let auth = self.gate.authorize(raw).await;
        if !auth.allowed {
            return Err(BrokerError::NotAllowed);
        }

        let url =
            Url::parse(raw).map_err(|e| BrokerError::Fetch(format!("Fetch error: {e}")))?;
        let origin = OriginPattern::from_url(&url)
            .ok_or_else(|| BrokerError::Fetch("Fetch error: URL has no host".to_string()))?;

        if !self.permissions.contains(&origin).await && !self.permissions.request(&origin).await {
            return Err(BrokerError::PermissionDenied);
        }

        let client = if auth.needs_credentials {
            &self.with_credentials
        } else {
            &self.anonymous
        };
        debug!(url = %url, credentials = auth.needs_credentials, "fetching");

        let res = client
            .get(url)
            .send()
            .await
            .map_err(|e| BrokerError::Fetch(format!("Fetch error: {e}")))?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(BrokerError::Fetch(format!(
                "HTTP error: {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status")
            )));
        }

        // Header first — reading the body consumes the response.
        let cdhdr = res
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = res
            .bytes()
            .await
            .map_err(|e| BrokerError::Fetch(format!("Read error: {e}")))?;

        info!(bytes = body.len(), cdhdr = cdhdr.is_some(), "fetch complete");
        Ok(FetchedPuzzle {
            puz64: BASE64.encode(&body),
            cdhdr,
        })
    }
}
