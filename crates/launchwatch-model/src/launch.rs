//! Launch configurations: one external launch with its tabs and server.
//!
//! A launch owns its children strongly; children point back through `Weak`
//! handles. The launch lock may be held while reading a tab's state (pruning
//! needs a consistent view), never the other way round.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use launchwatch_core::prelude::*;
use launchwatch_core::AttentionLevel;

use crate::browser_tab::{BrowserTab, BrowserTabInfo};
use crate::events::{ListenerSet, ModelEvent};
use crate::ids::{IdIssuer, NodeId};
use crate::log::ModuleHandle;
use crate::node::ModelNode;
use crate::server::Server;

/// The external launch a configuration mirrors
pub trait LaunchHandle: Send + Sync + std::fmt::Debug {
    /// Stable key identifying the launch to its owner
    fn launch_key(&self) -> String;

    /// Ask the launch to restart its web server. Blocks until it finishes.
    fn restart_web_server(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct LaunchState {
    tabs: Vec<Arc<BrowserTab>>,
    server: Option<Arc<Server>>,
    terminated: bool,
    server_reloading: bool,
    /// `None` while the launch is still coming up
    launch_urls: Option<Vec<String>>,
    supports_restart_web_server: bool,
}

/// One external launch and everything connected to it
pub struct LaunchConfiguration {
    id: NodeId,
    name: String,
    handle: Arc<dyn LaunchHandle>,
    ids: IdIssuer,
    listeners: Arc<ListenerSet>,
    termination_seq: AtomicU64,
    state: Mutex<LaunchState>,
    me: Weak<LaunchConfiguration>,
}

impl std::fmt::Debug for LaunchConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LaunchConfiguration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("tabs", &state.tabs.len())
            .field("has_server", &state.server.is_some())
            .field("terminated", &state.terminated)
            .field("server_reloading", &state.server_reloading)
            .finish()
    }
}

impl LaunchConfiguration {
    pub(crate) fn new(
        id: NodeId,
        name: String,
        handle: Arc<dyn LaunchHandle>,
        ids: IdIssuer,
        listeners: Arc<ListenerSet>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id,
            name,
            handle,
            ids,
            listeners,
            termination_seq: AtomicU64::new(0),
            state: Mutex::new(LaunchState::default()),
            me: me.clone(),
        })
    }

    // ─────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &Arc<dyn LaunchHandle> {
        &self.handle
    }

    pub fn launch_key(&self) -> String {
        self.handle.launch_key()
    }

    /// Snapshot of the tabs, in creation order
    pub fn browser_tabs(&self) -> Vec<Arc<BrowserTab>> {
        self.state.lock().tabs.clone()
    }

    pub fn browser_tab(&self, id: NodeId) -> Option<Arc<BrowserTab>> {
        self.state
            .lock()
            .tabs
            .iter()
            .find(|tab| tab.id() == id)
            .cloned()
    }

    pub fn server(&self) -> Option<Arc<Server>> {
        self.state.lock().server.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    pub fn is_server_reloading(&self) -> bool {
        self.state.lock().server_reloading
    }

    pub fn launch_urls(&self) -> Option<Vec<String>> {
        self.state.lock().launch_urls.clone()
    }

    pub fn supports_restart_web_server(&self) -> bool {
        self.state.lock().supports_restart_web_server
    }

    /// Highest attention level over the server and every tab
    pub fn needs_attention_level(&self) -> Option<AttentionLevel> {
        let (server, tabs) = {
            let state = self.state.lock();
            (state.server.clone(), state.tabs.clone())
        };
        AttentionLevel::max_of(
            server
                .iter()
                .map(|s| s.needs_attention_level())
                .chain(tabs.iter().map(|t| t.needs_attention_level())),
        )
    }

    pub(crate) fn next_termination_seq(&self) -> u64 {
        self.termination_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ─────────────────────────────────────────────────────────
    // Browser Tabs
    // ─────────────────────────────────────────────────────────

    /// Create a tab for a freshly connected browser.
    ///
    /// Refused with `None` when the launch has already terminated.
    pub fn add_browser_tab(
        &self,
        info: BrowserTabInfo,
        initial_module: ModuleHandle,
    ) -> Option<Arc<BrowserTab>> {
        let tab = {
            let mut state = self.state.lock();
            if state.terminated {
                warn!(
                    "Ignoring browser tab {} for terminated launch {} ({})",
                    info.display_name(),
                    self.id,
                    self.name
                );
                return None;
            }
            let tab = BrowserTab::new(
                self.ids.next_id(),
                info,
                initial_module,
                self.id,
                self.me.clone(),
                Arc::clone(&self.listeners),
            );
            state.tabs.push(Arc::clone(&tab));
            tab
        };

        debug!(
            "Browser tab {} ({}) created in launch {}",
            tab.id(),
            tab.name(),
            self.id
        );
        self.listeners
            .publish(ModelEvent::BrowserTabCreated(Arc::clone(&tab)));
        self.prune_terminated_duplicates(tab.name());
        Some(tab)
    }

    /// Reattach a reconnecting browser to its existing tab, or create a new one.
    ///
    /// The module is attached with the launch state still locked, so a
    /// concurrent `set_terminated` either sees the reattached tab in its cascade
    /// or wins first and the reconnect is refused.
    pub fn find_or_add_browser_tab(
        &self,
        info: BrowserTabInfo,
        module: ModuleHandle,
    ) -> Option<Arc<BrowserTab>> {
        let module = {
            let state = self.state.lock();
            if state.terminated {
                warn!(
                    "Ignoring reconnect of {} to terminated launch {} ({})",
                    info.display_name(),
                    self.id,
                    self.name
                );
                return None;
            }
            let existing = state
                .tabs
                .iter()
                .rev()
                .find(|tab| tab.info().is_same_tab(&info));
            match existing {
                Some(tab) => {
                    tab.attach_module(module);
                    return Some(Arc::clone(tab));
                }
                None => module,
            }
        };

        self.add_browser_tab(info, module)
    }

    /// Keep only the most recently terminated tab named `name`.
    ///
    /// Active tabs are never touched. Fires `browser_tab_removed` for each tab
    /// dropped.
    pub fn prune_terminated_duplicates(&self, name: &str) -> usize {
        let removed: Vec<Arc<BrowserTab>> = {
            let mut state = self.state.lock();
            let keep = state
                .tabs
                .iter()
                .filter(|tab| tab.name() == name)
                .filter_map(|tab| tab.terminated_seq().map(|seq| (seq, tab.id())))
                .max_by_key(|(seq, _)| *seq)
                .map(|(_, id)| id);
            let Some(keep) = keep else {
                return 0;
            };

            let (removed, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut state.tabs).into_iter().partition(|tab| {
                    tab.name() == name && tab.id() != keep && tab.terminated_seq().is_some()
                });
            state.tabs = kept;
            removed
        };

        for tab in &removed {
            debug!(
                "Pruned terminated browser tab {} ({}) from launch {}",
                tab.id(),
                tab.name(),
                self.id
            );
            self.listeners
                .publish(ModelEvent::BrowserTabRemoved(Arc::clone(tab)));
        }
        removed.len()
    }

    // ─────────────────────────────────────────────────────────
    // Server
    // ─────────────────────────────────────────────────────────

    /// Attach the launch's server. Succeeds at most once per launch.
    ///
    /// A second call fails with [`Error::ServerAlreadySet`] and leaves the
    /// existing server in place. A terminated launch refuses with `Ok(None)`.
    pub fn set_server(&self, name: impl Into<String>) -> Result<Option<Arc<Server>>> {
        let name = name.into();
        let server = {
            let mut state = self.state.lock();
            if state.server.is_some() {
                return Err(Error::server_already_set(self.name.clone()));
            }
            if state.terminated {
                warn!(
                    "Ignoring server {} for terminated launch {} ({})",
                    name, self.id, self.name
                );
                return Ok(None);
            }
            let server = Server::new(
                self.ids.next_id(),
                name,
                self.id,
                self.me.clone(),
                Arc::clone(&self.listeners),
            );
            state.server = Some(Arc::clone(&server));
            server
        };

        debug!("Server {} created in launch {}", server.id(), self.id);
        self.listeners
            .publish(ModelEvent::ServerCreated(Arc::clone(&server)));
        Ok(Some(server))
    }

    // ─────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────

    /// Terminate the launch and every child.
    ///
    /// Children terminate first, then `launch_configuration_terminated` fires.
    /// Returns `false` (and does nothing) if the launch was already terminated.
    pub fn set_terminated(&self) -> bool {
        let (tabs, server) = {
            let mut state = self.state.lock();
            if state.terminated {
                return false;
            }
            state.terminated = true;
            (state.tabs.clone(), state.server.clone())
        };

        for tab in &tabs {
            tab.set_terminated();
        }
        if let Some(server) = &server {
            server.set_terminated();
        }

        info!("Launch {} ({}) terminated", self.id, self.name);
        self.publish(ModelEvent::LaunchConfigurationTerminated);
        true
    }

    /// Record the URLs the launch serves; `None` means still loading
    pub fn set_launch_urls(&self, urls: Option<Vec<String>>) -> bool {
        let changed = {
            let mut state = self.state.lock();
            if state.launch_urls == urls {
                false
            } else {
                state.launch_urls = urls;
                true
            }
        };
        if changed {
            self.publish(ModelEvent::LaunchUrlsChanged);
        }
        changed
    }

    pub fn set_supports_restart_web_server(&self, supported: bool) -> bool {
        let changed = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.supports_restart_web_server, supported) != supported
        };
        if changed {
            self.publish(ModelEvent::RestartWebServerStatusChanged);
        }
        changed
    }

    pub fn set_server_reloading(&self, reloading: bool) -> bool {
        let changed = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.server_reloading, reloading) != reloading
        };
        if changed {
            debug!("Launch {} server reloading: {}", self.id, reloading);
            self.publish(ModelEvent::RestartWebServerStatusChanged);
        }
        changed
    }

    /// Restart the web server on a background thread.
    ///
    /// Returns `Ok(None)` without doing anything when restarting is unsupported,
    /// already in progress, or the launch has terminated. The reloading flag is
    /// cleared when the restart finishes, successfully or not.
    pub fn restart_web_server(&self) -> Result<Option<JoinHandle<()>>> {
        {
            let mut state = self.state.lock();
            if state.terminated || !state.supports_restart_web_server || state.server_reloading {
                debug!(
                    "Launch {} cannot restart its web server right now",
                    self.id
                );
                return Ok(None);
            }
            state.server_reloading = true;
        }
        self.publish(ModelEvent::RestartWebServerStatusChanged);

        let Some(me) = self.me.upgrade() else {
            return Ok(None);
        };
        let spawned = std::thread::Builder::new()
            .name(format!("restart-web-server-{}", self.id.get()))
            .spawn(move || {
                if let Err(e) = me.handle.restart_web_server() {
                    warn!("Restarting web server for launch {} failed: {}", me.id, e);
                }
                me.set_server_reloading(false);
            });

        match spawned {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                self.set_server_reloading(false);
                Err(e.into())
            }
        }
    }

    fn publish(&self, event: fn(Arc<LaunchConfiguration>) -> ModelEvent) {
        if let Some(me) = self.me.upgrade() {
            self.listeners.publish(event(me));
        }
    }
}

impl ModelNode for LaunchConfiguration {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent_id(&self) -> Option<NodeId> {
        None
    }

    fn child_ids(&self) -> Vec<NodeId> {
        let state = self.state.lock();
        state
            .server
            .iter()
            .map(|s| s.id())
            .chain(state.tabs.iter().map(|t| t.id()))
            .collect()
    }

    fn needs_attention_level(&self) -> Option<AttentionLevel> {
        LaunchConfiguration::needs_attention_level(self)
    }

    fn is_terminated(&self) -> bool {
        LaunchConfiguration::is_terminated(self)
    }
}
