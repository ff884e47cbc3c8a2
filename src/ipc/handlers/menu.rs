use crate::menu::MenuClick;
use crate::AppContext;
use serde_json::{json, Value};
use tracing::warn;

/// A context-menu click forwarded by the shell. The reply instructs the
/// sender to open the companion tab.
pub async fn click(click: MenuClick, ctx: &AppContext) -> Value {
    match ctx.menu.on_click(&click).await {
        Some(tab) => json!({ "navigate": tab }),
        None => {
            warn!(menu_item_id = %click.menu_item_id, "click carried no usable URL");
            json!({ "error": true, "code": "menu", "text": "click carried no usable URL" })
        }
    }
}
