//! Model-wide notifications and listener dispatch.
//!
//! Every mutation on a launch, tab or server produces a [`ModelEvent`] while
//! its own lock is held; the event is published through a [`ListenerSet`]
//! after that lock is released. Listeners may therefore call straight back
//! into the model.
//!
//! Consumers that prefer a queue over callbacks can register a
//! [`ChannelForwarder`] and drain events on their own task.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use launchwatch_core::prelude::*;

use crate::browser_tab::BrowserTab;
use crate::ids::NodeId;
use crate::launch::LaunchConfiguration;
use crate::log::{LogEvent, LogListener};
use crate::node::ModelNode;
use crate::server::Server;

// ─────────────────────────────────────────────────────────────────
// Listener Contract
// ─────────────────────────────────────────────────────────────────

/// Observer of launch, tab and server lifecycle changes.
///
/// All callbacks default to no-ops so implementors only override what they need.
pub trait ModelListener: Send + Sync {
    fn launch_configuration_launched(&self, _launch: &Arc<LaunchConfiguration>) {}
    fn launch_configuration_terminated(&self, _launch: &Arc<LaunchConfiguration>) {}
    fn launch_configuration_launch_urls_changed(&self, _launch: &Arc<LaunchConfiguration>) {}
    fn launch_configuration_restart_web_server_status_changed(
        &self,
        _launch: &Arc<LaunchConfiguration>,
    ) {
    }
    fn launch_configuration_removed(&self, _launch: &Arc<LaunchConfiguration>) {}

    fn browser_tab_created(&self, _tab: &Arc<BrowserTab>) {}
    fn browser_tab_removed(&self, _tab: &Arc<BrowserTab>) {}
    fn browser_tab_terminated(&self, _tab: &Arc<BrowserTab>) {}
    fn browser_tab_needs_attention(&self, _tab: &Arc<BrowserTab>) {}

    fn server_created(&self, _server: &Arc<Server>) {}
    fn server_terminated(&self, _server: &Arc<Server>) {}
    fn server_needs_attention(&self, _server: &Arc<Server>) {}

    /// Entry point used by [`ListenerSet`]; routes to the callbacks above by default.
    fn on_model_event(&self, event: &ModelEvent) {
        event.dispatch(self);
    }
}

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

/// A change to the launch/tab/server model
#[derive(Debug, Clone)]
pub enum ModelEvent {
    LaunchConfigurationLaunched(Arc<LaunchConfiguration>),
    LaunchConfigurationTerminated(Arc<LaunchConfiguration>),
    LaunchUrlsChanged(Arc<LaunchConfiguration>),
    RestartWebServerStatusChanged(Arc<LaunchConfiguration>),
    LaunchConfigurationRemoved(Arc<LaunchConfiguration>),

    BrowserTabCreated(Arc<BrowserTab>),
    BrowserTabRemoved(Arc<BrowserTab>),
    BrowserTabTerminated(Arc<BrowserTab>),
    BrowserTabNeedsAttention(Arc<BrowserTab>),

    ServerCreated(Arc<Server>),
    ServerTerminated(Arc<Server>),
    ServerNeedsAttention(Arc<Server>),
}

impl ModelEvent {
    /// Returns a short string label for this event type (for logging/output).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LaunchConfigurationLaunched(_) => "launch_configuration_launched",
            Self::LaunchConfigurationTerminated(_) => "launch_configuration_terminated",
            Self::LaunchUrlsChanged(_) => "launch_urls_changed",
            Self::RestartWebServerStatusChanged(_) => "restart_web_server_status_changed",
            Self::LaunchConfigurationRemoved(_) => "launch_configuration_removed",
            Self::BrowserTabCreated(_) => "browser_tab_created",
            Self::BrowserTabRemoved(_) => "browser_tab_removed",
            Self::BrowserTabTerminated(_) => "browser_tab_terminated",
            Self::BrowserTabNeedsAttention(_) => "browser_tab_needs_attention",
            Self::ServerCreated(_) => "server_created",
            Self::ServerTerminated(_) => "server_terminated",
            Self::ServerNeedsAttention(_) => "server_needs_attention",
        }
    }

    /// The node the event is about
    pub fn node(&self) -> &dyn ModelNode {
        match self {
            Self::LaunchConfigurationLaunched(l)
            | Self::LaunchConfigurationTerminated(l)
            | Self::LaunchUrlsChanged(l)
            | Self::RestartWebServerStatusChanged(l)
            | Self::LaunchConfigurationRemoved(l) => &**l,
            Self::BrowserTabCreated(t)
            | Self::BrowserTabRemoved(t)
            | Self::BrowserTabTerminated(t)
            | Self::BrowserTabNeedsAttention(t) => &**t,
            Self::ServerCreated(s) | Self::ServerTerminated(s) | Self::ServerNeedsAttention(s) => {
                &**s
            }
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node().id()
    }

    pub fn dispatch<L: ModelListener + ?Sized>(&self, listener: &L) {
        match self {
            Self::LaunchConfigurationLaunched(l) => listener.launch_configuration_launched(l),
            Self::LaunchConfigurationTerminated(l) => listener.launch_configuration_terminated(l),
            Self::LaunchUrlsChanged(l) => listener.launch_configuration_launch_urls_changed(l),
            Self::RestartWebServerStatusChanged(l) => {
                listener.launch_configuration_restart_web_server_status_changed(l)
            }
            Self::LaunchConfigurationRemoved(l) => listener.launch_configuration_removed(l),
            Self::BrowserTabCreated(t) => listener.browser_tab_created(t),
            Self::BrowserTabRemoved(t) => listener.browser_tab_removed(t),
            Self::BrowserTabTerminated(t) => listener.browser_tab_terminated(t),
            Self::BrowserTabNeedsAttention(t) => listener.browser_tab_needs_attention(t),
            Self::ServerCreated(s) => listener.server_created(s),
            Self::ServerTerminated(s) => listener.server_terminated(s),
            Self::ServerNeedsAttention(s) => listener.server_needs_attention(s),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Listener Registry
// ─────────────────────────────────────────────────────────────────

/// Global listener list shared by the registry and every node it creates
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn ModelListener>>>,
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl ListenerSet {
    pub fn add(&self, listener: Arc<dyn ModelListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn remove(&self, listener: &Arc<dyn ModelListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to a snapshot of the current listeners.
    ///
    /// Must not be called while holding any model lock. Listeners added during
    /// the dispatch only see later events.
    pub fn publish(&self, event: ModelEvent) {
        let snapshot: Vec<Arc<dyn ModelListener>> = self.listeners.lock().clone();
        trace!(
            "Publishing {} for {} to {} listeners",
            event.event_type(),
            event.node_id(),
            snapshot.len()
        );
        for listener in snapshot {
            listener.on_model_event(&event);
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Channel Forwarding
// ─────────────────────────────────────────────────────────────────

/// Anything a [`ChannelForwarder`] can put on its queue
#[derive(Debug, Clone)]
pub enum ForwardedEvent {
    Model(ModelEvent),
    Log(LogEvent),
}

/// Listener that turns callbacks into queued events.
///
/// Register it with the registry for model events and with individual logs
/// for their entries; sends never block.
#[derive(Debug, Clone)]
pub struct ChannelForwarder {
    tx: mpsc::UnboundedSender<ForwardedEvent>,
}

impl ChannelForwarder {
    pub fn new(tx: mpsc::UnboundedSender<ForwardedEvent>) -> Self {
        Self { tx }
    }

    /// Create a forwarder together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ForwardedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn forward(&self, event: ForwardedEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event receiver dropped; discarding event");
        }
    }
}

impl ModelListener for ChannelForwarder {
    fn on_model_event(&self, event: &ModelEvent) {
        self.forward(ForwardedEvent::Model(event.clone()));
    }
}

impl LogListener for ChannelForwarder {
    fn on_log_event(&self, event: &LogEvent) {
        self.forward(ForwardedEvent::Log(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::ModuleHandle;
    use crate::test_utils::{entry, tab_info, RecordingListener, StubLaunch};
    use crate::Registry;

    /// Calls back into the model from every callback it receives
    #[derive(Default)]
    struct ReentrantListener {
        seen: Mutex<Vec<(String, bool, usize)>>,
    }

    impl ModelListener for ReentrantListener {
        fn browser_tab_terminated(&self, tab: &Arc<BrowserTab>) {
            let siblings = tab.launch().map(|l| l.browser_tabs().len()).unwrap_or(0);
            self.seen
                .lock()
                .push((tab.name().to_string(), tab.is_terminated(), siblings));
        }

        fn launch_configuration_terminated(&self, launch: &Arc<LaunchConfiguration>) {
            let terminated = launch.is_terminated();
            let children = launch.browser_tabs().len();
            self.seen
                .lock()
                .push((launch.name().to_string(), terminated, children));
        }
    }

    /// Registers another listener while an event is being delivered
    struct LateRegistrar {
        registry: Arc<Registry>,
        late: Arc<RecordingListener>,
        done: Mutex<bool>,
    }

    impl ModelListener for LateRegistrar {
        fn launch_configuration_launched(&self, _launch: &Arc<LaunchConfiguration>) {
            let mut done = self.done.lock();
            if !*done {
                *done = true;
                self.registry.add_listener(self.late.clone());
            }
        }
    }

    #[test]
    fn test_listener_may_call_back_into_model() {
        let registry = Registry::new();
        let listener = Arc::new(ReentrantListener::default());
        registry.add_listener(listener.clone());
        let launch = registry.create_launch_configuration(Arc::new(StubLaunch::new("app")), "app");
        let module = ModuleHandle::new("main", "s1");
        let tab = launch
            .add_browser_tab(tab_info("Chrome", "http://localhost/"), module.clone())
            .unwrap();

        tab.remove_module(&module);
        launch.set_terminated();

        assert_eq!(
            listener.seen.lock().clone(),
            vec![
                ("Chrome (http://localhost/)".to_string(), true, 1),
                ("app".to_string(), true, 1),
            ]
        );
    }

    #[test]
    fn test_listener_added_mid_dispatch_misses_in_flight_event() {
        let registry = Arc::new(Registry::new());
        let late = Arc::new(RecordingListener::default());
        registry.add_listener(Arc::new(LateRegistrar {
            registry: Arc::clone(&registry),
            late: Arc::clone(&late),
            done: Mutex::new(false),
        }));

        registry.create_launch_configuration(Arc::new(StubLaunch::new("a")), "a");
        assert!(late.events().is_empty());

        let second = registry.create_launch_configuration(Arc::new(StubLaunch::new("b")), "b");
        assert_eq!(late.events(), vec![("launch_configuration_launched", second.id())]);
    }

    #[test]
    fn test_listener_set_remove() {
        let set = ListenerSet::default();
        let recorder: Arc<dyn ModelListener> = Arc::new(RecordingListener::default());
        set.add(Arc::clone(&recorder));
        assert_eq!(set.len(), 1);

        assert!(set.remove(&recorder));
        assert!(!set.remove(&recorder));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_channel_forwarder_queues_model_and_log_events() {
        let registry = Registry::new();
        let (forwarder, mut rx) = ChannelForwarder::channel();
        let forwarder = Arc::new(forwarder);
        registry.add_listener(forwarder.clone());

        let launch = registry.create_launch_configuration(Arc::new(StubLaunch::new("app")), "app");
        let server = launch.set_server("dev").unwrap().unwrap();
        server.log().add_listener(forwarder.clone());
        server
            .log()
            .append(server.log().root(), entry("hello", "INFO"), 1, ModuleHandle::new("main", "s1"))
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                ForwardedEvent::Model(e) => e.event_type(),
                ForwardedEvent::Log(e) => e.event_type(),
            });
        }
        assert_eq!(
            kinds,
            vec!["launch_configuration_launched", "server_created", "new_log_entry"]
        );
    }

    #[test]
    fn test_forwarder_tolerates_dropped_receiver() {
        let registry = Registry::new();
        let (forwarder, rx) = ChannelForwarder::channel();
        drop(rx);
        registry.add_listener(Arc::new(forwarder));

        let launch = registry.create_launch_configuration(Arc::new(StubLaunch::new("app")), "app");
        assert!(launch.set_terminated());
    }
}
