use crate::AppContext;
use serde_json::{json, Value};

pub async fn status(ctx: &AppContext) -> Value {
    let uptime = ctx.started_at.elapsed().as_secs();
    let pending_interactions = ctx.gate.pending_count().await;
    let open_prompts = ctx.prompts.pending().await.len();
    json!({
        "status": {
            "version": env!("CARGO_PKG_VERSION"),
            "uptime": uptime,
            "port": ctx.config.port,
            "pendingInteractions": pending_interactions,
            "openPrompts": open_prompts,
            "ctxmenu": ctx.prefs.get().ctxmenu,
        }
    })
}
