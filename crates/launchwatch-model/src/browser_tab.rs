//! Browser tabs connected to a launch.
//!
//! A tab is created on its first module-load report and terminated when its last
//! module unloads. A reload that reuses the same tab brings a terminated record
//! back to life through [`BrowserTab::add_module`]; a reload that opens a fresh
//! record leaves the old one behind, and the launch prunes such same-name
//! leftovers down to the most recently terminated one.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use launchwatch_core::prelude::*;
use launchwatch_core::AttentionLevel;

use crate::events::{ListenerSet, ModelEvent};
use crate::ids::NodeId;
use crate::launch::LaunchConfiguration;
use crate::log::{Log, LogOwner, ModuleHandle};
use crate::node::ModelNode;

/// Connection details reported when a tab first connects. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserTabInfo {
    /// Browser-assigned key that survives reloads, when the browser offers one
    #[serde(default)]
    pub tab_key: Option<String>,
    pub user_agent_tag: String,
    pub url: String,
    pub remote_host: String,
    pub initial_session_key: String,
    #[serde(default)]
    pub icon: Option<Vec<u8>>,
}

impl BrowserTabInfo {
    /// Name shown for the tab; reloads of the same page share it
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.user_agent_tag, self.url)
    }

    /// Whether `other` describes the same physical tab reconnecting
    pub fn is_same_tab(&self, other: &BrowserTabInfo) -> bool {
        matches!((&self.tab_key, &other.tab_key), (Some(a), Some(b)) if a == b)
            && self.user_agent_tag == other.user_agent_tag
            && self.remote_host == other.remote_host
    }
}

#[derive(Debug, Default)]
struct TabState {
    modules: Vec<ModuleHandle>,
    terminated: bool,
    /// Launch-scoped ordering of terminations; set while terminated
    terminated_seq: Option<u64>,
    needs_attention_level: Option<AttentionLevel>,
}

/// One browser tab running the application
pub struct BrowserTab {
    id: NodeId,
    name: String,
    info: BrowserTabInfo,
    launch_id: NodeId,
    launch: Weak<LaunchConfiguration>,
    listeners: Arc<ListenerSet>,
    log: Log,
    state: Mutex<TabState>,
    me: Weak<BrowserTab>,
}

impl std::fmt::Debug for BrowserTab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BrowserTab")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("launch_id", &self.launch_id)
            .field("modules", &state.modules.len())
            .field("terminated", &state.terminated)
            .field("needs_attention_level", &state.needs_attention_level)
            .finish()
    }
}

impl BrowserTab {
    pub(crate) fn new(
        id: NodeId,
        info: BrowserTabInfo,
        initial_module: ModuleHandle,
        launch_id: NodeId,
        launch: Weak<LaunchConfiguration>,
        listeners: Arc<ListenerSet>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<BrowserTab>| {
            let owner: Weak<dyn LogOwner> = me.clone();
            Self {
                id,
                name: info.display_name(),
                info,
                launch_id,
                launch,
                listeners,
                log: Log::new(id, owner),
                state: Mutex::new(TabState {
                    modules: vec![initial_module],
                    ..TabState::default()
                }),
                me: me.clone(),
            }
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> &BrowserTabInfo {
        &self.info
    }

    pub fn launch_id(&self) -> NodeId {
        self.launch_id
    }

    /// The owning launch, if it is still alive
    pub fn launch(&self) -> Option<Arc<LaunchConfiguration>> {
        self.launch.upgrade()
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn modules(&self) -> Vec<ModuleHandle> {
        self.state.lock().modules.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    pub fn needs_attention_level(&self) -> Option<AttentionLevel> {
        self.state.lock().needs_attention_level
    }

    pub(crate) fn terminated_seq(&self) -> Option<u64> {
        self.state.lock().terminated_seq
    }

    // ─────────────────────────────────────────────────────────
    // State Machine
    // ─────────────────────────────────────────────────────────

    /// Record a newly loaded module. Always leaves the tab active.
    pub fn add_module(
        &self,
        name: impl Into<String>,
        session_key: impl Into<String>,
    ) -> ModuleHandle {
        let handle = ModuleHandle::new(name, session_key);
        self.attach_module(handle.clone());
        handle
    }

    pub(crate) fn attach_module(&self, handle: ModuleHandle) {
        let reactivated = {
            let mut state = self.state.lock();
            state.modules.push(handle);
            let was_terminated = state.terminated;
            state.terminated = false;
            state.terminated_seq = None;
            was_terminated
        };
        if reactivated {
            debug!("Browser tab {} ({}) reactivated", self.id, self.name);
        }
    }

    /// Forget one loaded module.
    ///
    /// Removing the last module terminates the tab, clears its attention level
    /// and prunes same-name terminated siblings. Returns `false` if the module
    /// was not loaded in this tab.
    pub fn remove_module(&self, handle: &ModuleHandle) -> bool {
        let terminated_now = {
            let mut state = self.state.lock();
            let Some(pos) = state.modules.iter().position(|m| m == handle) else {
                return false;
            };
            state.modules.remove(pos);
            if state.modules.is_empty() && !state.terminated {
                state.terminated = true;
                state.needs_attention_level = None;
                state.terminated_seq = Some(self.next_termination_seq());
                true
            } else {
                false
            }
        };

        if terminated_now {
            debug!("Browser tab {} ({}) terminated", self.id, self.name);
            self.publish(ModelEvent::BrowserTabTerminated);
            if let Some(launch) = self.launch() {
                launch.prune_terminated_duplicates(&self.name);
            }
        }
        true
    }

    /// Terminate regardless of loaded modules. Returns `false` if already terminated.
    pub fn set_terminated(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.terminated {
                return false;
            }
            state.terminated = true;
            state.needs_attention_level = None;
            state.terminated_seq = Some(self.next_termination_seq());
        }
        debug!("Browser tab {} ({}) terminated", self.id, self.name);
        self.publish(ModelEvent::BrowserTabTerminated);
        true
    }

    /// Raise the tab's attention level.
    ///
    /// Accepted only when `level` outranks the current one, and never raises a
    /// terminated tab. Returns whether the level changed.
    pub fn set_needs_attention_level(&self, level: Option<AttentionLevel>) -> bool {
        let changed = {
            let mut state = self.state.lock();
            if !AttentionLevel::is_more_important(state.needs_attention_level, level)
                || (state.terminated && level.is_some())
            {
                false
            } else {
                state.needs_attention_level = level;
                true
            }
        };
        if changed {
            self.publish(ModelEvent::BrowserTabNeedsAttention);
        }
        changed
    }

    /// Hide every log entry and drop the tab's attention level
    pub fn clear_log(&self) {
        self.log.undisclose_all();
        let cleared = self.state.lock().needs_attention_level.take().is_some();
        if cleared {
            self.publish(ModelEvent::BrowserTabNeedsAttention);
        }
    }

    fn next_termination_seq(&self) -> u64 {
        self.launch()
            .map(|launch| launch.next_termination_seq())
            .unwrap_or_default()
    }

    fn publish(&self, event: fn(Arc<BrowserTab>) -> ModelEvent) {
        if let Some(me) = self.me.upgrade() {
            self.listeners.publish(event(me));
        }
    }
}

impl LogOwner for BrowserTab {
    fn owner_id(&self) -> NodeId {
        self.id
    }

    fn on_log_attention(&self, level: AttentionLevel) {
        self.set_needs_attention_level(Some(level));
    }
}

impl ModelNode for BrowserTab {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent_id(&self) -> Option<NodeId> {
        Some(self.launch_id)
    }

    fn child_ids(&self) -> Vec<NodeId> {
        Vec::new()
    }

    fn needs_attention_level(&self) -> Option<AttentionLevel> {
        BrowserTab::needs_attention_level(self)
    }

    fn is_terminated(&self) -> bool {
        BrowserTab::is_terminated(self)
    }
}
