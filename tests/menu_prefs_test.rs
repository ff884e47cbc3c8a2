//! Context-menu and preference behavior through the message surface:
//! clicks turn into companion-tab requests, and the `ctxmenu` preference
//! drives menu create/remove notifications.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use squaresd::{config::DaemonConfig, ipc, AppContext};

fn test_ctx(data_dir: &std::path::Path) -> Arc<AppContext> {
    let config = DaemonConfig::new(Some(0), Some(data_dir.to_path_buf()), None, None, None);
    Arc::new(AppContext::new(config).expect("context"))
}

async fn reply_json(ctx: &AppContext, msg: &str) -> Value {
    let reply = ipc::dispatch(msg, ctx).await.expect("reply expected");
    serde_json::from_str(&reply).expect("reply is JSON")
}

/// Receive broadcast notifications until `want` of the named events arrived,
/// or time out.
async fn collect_events(
    rx: &mut tokio::sync::broadcast::Receiver<String>,
    event: &str,
    want: usize,
) -> Vec<Value> {
    let mut got = Vec::new();
    while got.len() < want {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for notifications")
            .expect("broadcast closed");
        let value: Value = serde_json::from_str(&frame).expect("notification is JSON");
        if value["event"] == event {
            got.push(value);
        }
    }
    got
}

#[tokio::test]
async fn menu_click_replies_with_a_companion_tab() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_ctx(dir.path());

    let reply = reply_json(
        &ctx,
        r#"{"menuclick": {
            "menuItemId": "openinsquares",
            "linkUrl": "https://beq.example.com/puz?id=1",
            "tab": {"id": 4, "index": 0, "windowId": 2, "url": "https://blog.example.com/post"}
        }}"#,
    )
    .await;

    let nav = &reply["navigate"];
    let url = nav["url"].as_str().expect("navigate url");
    assert!(url.starts_with("https://squares.io/fetch/url?"));
    assert!(url.contains("url=https%3A%2F%2Fbeq.example.com%2Fpuz%3Fid%3D1"));
    assert!(url.contains("from=https%3A%2F%2Fblog.example.com%2Fpost"));
    assert_eq!(nav["windowId"], 2);
    assert_eq!(nav["index"], 1);
    assert_eq!(nav["active"], true);
    assert_eq!(nav["openerTabId"], 4);

    // The click armed the gate for the follow-up fetch.
    assert_eq!(ctx.gate.pending_count().await, 1);
}

#[tokio::test]
async fn frame_click_resolves_the_frame_url() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_ctx(dir.path());

    let reply = reply_json(
        &ctx,
        r#"{"menuclick": {
            "menuItemId": "openinsquaresfrm",
            "frameUrl": "https://cdn.amuselabs.com/pmm/crossword?id=abc",
            "tab": {"id": null, "index": 5, "windowId": 1, "url": "https://paper.example.com/games"}
        }}"#,
    )
    .await;

    let url = reply["navigate"]["url"].as_str().expect("navigate url");
    assert!(url.contains("amuselabs.com"));
    assert!(reply["navigate"]["openerTabId"].is_null());
}

#[tokio::test]
async fn url_less_click_is_a_menu_error() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_ctx(dir.path());

    let reply = reply_json(
        &ctx,
        r#"{"menuclick": {
            "menuItemId": "openinsquares",
            "tab": {"id": 1, "index": 0, "windowId": 1, "url": "https://x.example/"}
        }}"#,
    )
    .await;
    assert_eq!(reply["error"], true);
    assert_eq!(reply["code"], "menu");
    assert_eq!(ctx.gate.pending_count().await, 0);
}

#[tokio::test]
async fn preference_toggle_drives_menu_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_ctx(dir.path());

    let mut rx = ctx.broadcaster.subscribe();
    let sync = Arc::clone(&ctx.menu).spawn_sync(ctx.prefs.subscribe());

    // Initial state: ctxmenu defaults to true — both entries are created.
    let created = collect_events(&mut rx, "menu.create", 2).await;
    assert_eq!(created[0]["params"]["id"], "openinsquares");
    assert_eq!(created[0]["params"]["title"], "Open link in squares.io");
    assert_eq!(created[0]["params"]["contexts"][0], "link");
    assert_eq!(created[1]["params"]["id"], "openinsquaresfrm");
    assert_eq!(
        created[1]["params"]["documentUrlPatterns"][0],
        "*://*.amuselabs.com/*"
    );

    // Toggle off through the options surface: both entries are removed.
    let reply = reply_json(&ctx, r#"{"setpref": {"ctxmenu": false}}"#).await;
    assert_eq!(reply["ok"], true);
    let removed = collect_events(&mut rx, "menu.remove", 2).await;
    assert_eq!(removed[0]["params"]["id"], "openinsquares");
    assert_eq!(removed[1]["params"]["id"], "openinsquaresfrm");

    // And back on: recreated.
    reply_json(&ctx, r#"{"setpref": {"ctxmenu": true}}"#).await;
    let recreated = collect_events(&mut rx, "menu.create", 2).await;
    assert_eq!(recreated[0]["params"]["id"], "openinsquares");

    sync.abort();
}

#[tokio::test]
async fn prefs_roundtrip_through_the_options_surface() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_ctx(dir.path());

    let reply = reply_json(&ctx, r#"{"getprefs": true}"#).await;
    assert_eq!(reply["prefs"]["ctxmenu"], true);

    reply_json(&ctx, r#"{"setpref": {"ctxmenu": false}}"#).await;
    let reply = reply_json(&ctx, r#"{"getprefs": true}"#).await;
    assert_eq!(reply["prefs"]["ctxmenu"], false);

    // Persisted: a fresh context on the same data dir sees the toggle.
    let ctx = test_ctx(dir.path());
    let reply = reply_json(&ctx, r#"{"getprefs": true}"#).await;
    assert_eq!(reply["prefs"]["ctxmenu"], false);
}

#[tokio::test]
async fn status_reports_daemon_vitals() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_ctx(dir.path());
    ctx.gate.record_interaction("https://example.com/a.puz").await;

    let reply = reply_json(&ctx, r#"{"status": true}"#).await;
    assert_eq!(reply["status"]["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(reply["status"]["pendingInteractions"], 1);
    assert_eq!(reply["status"]["ctxmenu"], true);
}

#[tokio::test]
async fn stale_permission_decisions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_ctx(dir.path());

    let reply = reply_json(
        &ctx,
        r#"{"permissiondecision": {"id": "no-such-prompt", "allow": true}}"#,
    )
    .await;
    assert_eq!(reply["error"], true);
    assert_eq!(reply["code"], "prompt");
}
