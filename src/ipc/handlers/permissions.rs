use crate::AppContext;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionDecision {
    pub id: String,
    pub allow: bool,
}

/// The user's answer to a `permission.prompt` notification.
pub async fn decision(decision: PermissionDecision, ctx: &AppContext) -> Value {
    match ctx.prompts.decide(&decision.id, decision.allow).await {
        Ok(()) => json!({ "ok": true }),
        Err(e) => json!({ "error": true, "code": "prompt", "text": e.to_string() }),
    }
}
