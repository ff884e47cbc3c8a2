use crate::AppContext;
use serde::Deserialize;
use serde_json::{json, Value};

/// Fields the options surface may set. All optional so the shape can grow.
#[derive(Debug, Clone, Deserialize)]
pub struct PrefPatch {
    pub ctxmenu: Option<bool>,
}

pub async fn get(ctx: &AppContext) -> Value {
    let prefs = ctx.prefs.get();
    json!({ "prefs": { "ctxmenu": prefs.ctxmenu } })
}

/// Persist a preference change. The menu controller reacts through the watch
/// channel; connected shells hear about it via `prefs.changed`.
pub async fn set(patch: PrefPatch, ctx: &AppContext) -> Value {
    if let Some(on) = patch.ctxmenu {
        if let Err(e) = ctx.prefs.set_ctxmenu(on) {
            return json!({ "error": true, "code": "prefs", "text": e.to_string() });
        }
        ctx.broadcaster
            .broadcast("prefs.changed", json!({ "ctxmenu": on }));
    }
    json!({ "ok": true })
}
