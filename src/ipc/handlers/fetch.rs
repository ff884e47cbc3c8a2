use crate::AppContext;
use serde_json::{json, Value};
use tracing::debug;

/// The `fetchurl` operation. Success carries the base64 body and the
/// `Content-Disposition` header (or null); failure carries the stable error
/// code plus human-readable text.
pub async fn fetch_url(url: &str, ctx: &AppContext) -> Value {
    match ctx.broker.fetch_url(url).await {
        Ok(puzzle) => json!({ "puz64": puzzle.puz64, "cdhdr": puzzle.cdhdr }),
        Err(e) => {
            debug!(url = %url, code = e.code(), "fetch refused: {e}");
            json!({ "error": true, "code": e.code(), "text": e.to_string() })
        }
    }
}
