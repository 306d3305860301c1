//! The development server behind a launch.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use launchwatch_core::prelude::*;
use launchwatch_core::AttentionLevel;

use crate::events::{ListenerSet, ModelEvent};
use crate::ids::NodeId;
use crate::launch::LaunchConfiguration;
use crate::log::{Log, LogOwner};
use crate::node::ModelNode;

#[derive(Debug, Default)]
struct ServerState {
    terminated: bool,
    needs_attention_level: Option<AttentionLevel>,
}

/// Server process owned by one launch.
///
/// Unlike a browser tab, a terminated server never comes back.
pub struct Server {
    id: NodeId,
    name: String,
    launch_id: NodeId,
    launch: Weak<LaunchConfiguration>,
    listeners: Arc<ListenerSet>,
    log: Log,
    state: Mutex<ServerState>,
    me: Weak<Server>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("launch_id", &self.launch_id)
            .field("terminated", &state.terminated)
            .field("needs_attention_level", &state.needs_attention_level)
            .finish()
    }
}

impl Server {
    pub(crate) fn new(
        id: NodeId,
        name: String,
        launch_id: NodeId,
        launch: Weak<LaunchConfiguration>,
        listeners: Arc<ListenerSet>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Server>| {
            let owner: Weak<dyn LogOwner> = me.clone();
            Self {
                id,
                name,
                launch_id,
                launch,
                listeners,
                log: Log::new(id, owner),
                state: Mutex::new(ServerState::default()),
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

    pub fn launch_id(&self) -> NodeId {
        self.launch_id
    }

    pub fn launch(&self) -> Option<Arc<LaunchConfiguration>> {
        self.launch.upgrade()
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    pub fn needs_attention_level(&self) -> Option<AttentionLevel> {
        self.state.lock().needs_attention_level
    }

    /// Mark the server stopped. Returns `false` if it already was.
    pub fn set_terminated(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.terminated {
                return false;
            }
            state.terminated = true;
            state.needs_attention_level = None;
        }
        debug!("Server {} ({}) terminated", self.id, self.name);
        self.publish(ModelEvent::ServerTerminated);
        true
    }

    /// Raise the attention level; same acceptance rule as for browser tabs
    pub fn set_needs_attention_level(&self, level: Option<AttentionLevel>) -> bool {
        let changed = {
            let mut state = self.state.lock();
            let accepted = AttentionLevel::is_more_important(state.needs_attention_level, level)
                && !(state.terminated && level.is_some());
            if accepted {
                state.needs_attention_level = level;
            }
            accepted
        };
        if changed {
            self.publish(ModelEvent::ServerNeedsAttention);
        }
        changed
    }

    pub fn clear_log(&self) {
        self.log.undisclose_all();
        let cleared = self.state.lock().needs_attention_level.take().is_some();
        if cleared {
            self.publish(ModelEvent::ServerNeedsAttention);
        }
    }

    fn publish(&self, event: fn(Arc<Server>) -> ModelEvent) {
        if let Some(me) = self.me.upgrade() {
            self.listeners.publish(event(me));
        }
    }
}

impl LogOwner for Server {
    fn owner_id(&self) -> NodeId {
        self.id
    }

    fn on_log_attention(&self, level: AttentionLevel) {
        self.set_needs_attention_level(Some(level));
    }
}

impl ModelNode for Server {
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
        Server::needs_attention_level(self)
    }

    fn is_terminated(&self) -> bool {
        Server::is_terminated(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{entry, RecordingListener, StubLaunch};
    use crate::Registry;

    fn server_with_recorder() -> (Registry, Arc<Server>, Arc<RecordingListener>) {
        let registry = Registry::new();
        let recorder = Arc::new(RecordingListener::default());
        registry.add_listener(recorder.clone());
        let launch =
            registry.create_launch_configuration(Arc::new(StubLaunch::new("app")), "app");
        let server = launch
            .set_server("dev server")
            .expect("first set_server succeeds")
            .expect("launch is active");
        (registry, server, recorder)
    }

    #[test]
    fn test_terminate_is_one_directional() {
        let (_registry, server, recorder) = server_with_recorder();

        assert!(server.set_terminated());
        assert!(!server.set_terminated());
        assert!(server.is_terminated());
        assert_eq!(recorder.count("server_terminated"), 1);
    }

    #[test]
    fn test_log_attention_raises_server_level() {
        let (_registry, server, recorder) = server_with_recorder();

        let module = crate::log::ModuleHandle::new("main", "s1");
        server
            .log()
            .append(
                server.log().root(),
                entry("boom", "WARN").needing_attention(),
                1,
                module,
            )
            .unwrap();

        assert_eq!(server.needs_attention_level(), Some(AttentionLevel::Warn));
        assert_eq!(recorder.count("server_needs_attention"), 1);
    }

    #[test]
    fn test_terminated_server_ignores_attention() {
        let (_registry, server, _recorder) = server_with_recorder();
        server.set_terminated();

        assert!(!server.set_needs_attention_level(Some(AttentionLevel::Error)));
        assert_eq!(server.needs_attention_level(), None);
    }

    #[test]
    fn test_clear_log_resets_level() {
        let (_registry, server, recorder) = server_with_recorder();
        server.set_needs_attention_level(Some(AttentionLevel::Info));

        server.clear_log();

        assert_eq!(server.needs_attention_level(), None);
        assert_eq!(recorder.count("server_needs_attention"), 2);
    }
}
