pub mod config;
pub mod fetch;
pub mod gate;
pub mod ipc;
pub mod menu;
pub mod permissions;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

use config::DaemonConfig;
use fetch::FetchBroker;
use gate::InteractionGate;
use ipc::event::EventBroadcaster;
use menu::{MenuController, ShellMenuRegistry};
use permissions::{HostPermissionStore, PermissionStore, PromptRouter};
use storage::PrefStore;

/// Shared application state passed to every message handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub prefs: Arc<PrefStore>,
    pub gate: Arc<InteractionGate>,
    /// Permission prompt bookkeeping — `permissiondecision` messages resolve here.
    pub prompts: Arc<PromptRouter>,
    pub broker: Arc<FetchBroker>,
    pub menu: Arc<MenuController>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire up the full production context for `config`.
    ///
    /// The menu controller is returned inside the context but not yet
    /// synced — the caller spawns `menu.spawn_sync(prefs.subscribe())` once
    /// the runtime is up.
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let prompts = Arc::new(PromptRouter::new());
        let gate = Arc::new(InteractionGate::new());
        let prefs = Arc::new(PrefStore::load(&config.data_dir));

        let permissions: Arc<dyn PermissionStore> = Arc::new(HostPermissionStore::load(
            &config.data_dir,
            Arc::clone(&prompts),
            Arc::clone(&broadcaster),
        ));
        let broker = Arc::new(FetchBroker::new(Arc::clone(&gate), permissions)?);

        let registry = Arc::new(ShellMenuRegistry::new(Arc::clone(&broadcaster)));
        let menu = Arc::new(MenuController::new(
            Arc::clone(&gate),
            registry,
            &config.companion_url,
        )?);

        Ok(Self {
            config: Arc::new(config),
            prefs,
            gate,
            prompts,
            broker,
            menu,
            broadcaster,
            started_at: std::time::Instant::now(),
        })
    }
}
