//! Headless replay runner - applies delivery calls and reports events
//!
//! Each call is applied synchronously to the model. A [`ChannelForwarder`]
//! registered with the registry and with every tab and server log queues the
//! resulting events; they are drained and written after each call, so output
//! order equals the model's publication order.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use launchwatch_core::prelude::*;
use launchwatch_model::{
    BrowserTab, BrowserTabInfo, ChannelForwarder, EntryId, ForwardedEvent, LaunchConfiguration,
    LaunchHandle, Log, LogEntryData, LogEvent, ModelEvent, ModelNode, ModelSettings, ModuleHandle,
    NodeId, Registry, Server,
};

use super::{DeliveryCall, HeadlessEvent};

// ─────────────────────────────────────────────────────────────────
// Scripted Launch Handle
// ─────────────────────────────────────────────────────────────────

/// Stand-in for an external launch driven by the script
#[derive(Debug)]
struct ScriptedLaunch {
    key: String,
    restart_fails: bool,
}

impl LaunchHandle for ScriptedLaunch {
    fn launch_key(&self) -> String {
        self.key.clone()
    }

    fn restart_web_server(&self) -> Result<()> {
        if self.restart_fails {
            return Err(Error::launch(format!(
                "web server of {} failed to restart",
                self.key
            )));
        }
        debug!("Web server of {} restarted", self.key);
        Ok(())
    }
}

/// A launch, tab or server looked up by alias
enum NodeRef {
    Launch(Arc<LaunchConfiguration>),
    Tab(Arc<BrowserTab>),
    Server(Arc<Server>),
}

/// Totals reported once the script is exhausted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub calls: usize,
    pub errors: usize,
}

// ─────────────────────────────────────────────────────────────────
// Replay State
// ─────────────────────────────────────────────────────────────────

/// A registry plus the alias tables a script addresses it through
pub struct Replay {
    registry: Registry,
    forwarder: Arc<ChannelForwarder>,
    events_rx: mpsc::UnboundedReceiver<ForwardedEvent>,
    launches: HashMap<String, Arc<LaunchConfiguration>>,
    tabs: HashMap<String, Arc<BrowserTab>>,
    servers: HashMap<String, Arc<Server>>,
    entries: HashMap<String, (NodeId, EntryId)>,
    node_names: HashMap<NodeId, String>,
    entry_names: HashMap<(NodeId, EntryId), String>,
    watched_logs: HashSet<NodeId>,
    current_line: usize,
}

impl Replay {
    pub fn new(settings: ModelSettings) -> Self {
        let registry = Registry::with_settings(settings);
        let (forwarder, events_rx) = ChannelForwarder::channel();
        let forwarder = Arc::new(forwarder);
        registry.add_listener(forwarder.clone());

        Self {
            registry,
            forwarder,
            events_rx,
            launches: HashMap::new(),
            tabs: HashMap::new(),
            servers: HashMap::new(),
            entries: HashMap::new(),
            node_names: HashMap::new(),
            entry_names: HashMap::new(),
            watched_logs: HashSet::new(),
            current_line: 0,
        }
    }

    /// Apply one call. `line` is only used for error reporting.
    pub async fn apply(&mut self, line: usize, call: DeliveryCall) -> Result<Vec<HeadlessEvent>> {
        self.current_line = line;
        let mut extra = Vec::new();

        match call {
            DeliveryCall::CreateLaunch {
                launch,
                name,
                key,
                supports_restart,
                restart_fails,
            } => {
                let handle = ScriptedLaunch {
                    key: key.unwrap_or_else(|| launch.clone()),
                    restart_fails,
                };
                let config = self
                    .registry
                    .create_launch_configuration(Arc::new(handle), name);
                self.name_node(config.id(), &launch);
                config.set_supports_restart_web_server(supports_restart);
                self.launches.insert(launch, config);
            }

            DeliveryCall::AddBrowserTab {
                launch,
                tab,
                user_agent,
                url,
                remote_host,
                tab_key,
                module,
                session,
            } => {
                let config = self.launch(&launch)?;
                let info = BrowserTabInfo {
                    tab_key,
                    user_agent_tag: user_agent,
                    url,
                    remote_host,
                    initial_session_key: session.clone(),
                    icon: None,
                };
                match config.find_or_add_browser_tab(info, ModuleHandle::new(module, session)) {
                    Some(created) => {
                        self.name_node(created.id(), &tab);
                        self.watch_log(created.id(), created.log());
                        self.tabs.insert(tab, created);
                    }
                    None => warn!("Launch {} refused browser tab {}", launch, tab),
                }
            }

            DeliveryCall::AddModule {
                tab,
                module,
                session,
            } => {
                self.tab(&tab)?.add_module(module, session);
            }

            DeliveryCall::RemoveModule {
                tab,
                module,
                session,
            } => {
                let handle = ModuleHandle::new(module, session);
                if !self.tab(&tab)?.remove_module(&handle) {
                    return Err(self.error(format!(
                        "module {} is not loaded in tab {}",
                        handle.name, tab
                    )));
                }
            }

            DeliveryCall::SetServer {
                launch,
                server,
                name,
            } => {
                let config = self.launch(&launch)?;
                if let Some(created) = config.set_server(name)? {
                    self.name_node(created.id(), &server);
                    self.watch_log(created.id(), created.log());
                    self.servers.insert(server, created);
                }
            }

            DeliveryCall::AppendLog {
                node,
                entry,
                parent,
                label,
                level,
                details,
                needs_attention,
                index,
                module,
                session,
            } => {
                let target = self.node(&node)?;
                let log = log_of(&target)
                    .ok_or_else(|| self.error(format!("{} has no log", node)))?;
                let parent_id = match parent {
                    Some(alias) => self.entry(&alias, log.owner_id())?,
                    None => log.root(),
                };

                let mut data = LogEntryData::new(label, level);
                if let Some(details) = details {
                    data = data.with_details(details);
                }
                if needs_attention {
                    data = data.needing_attention();
                }

                // Name the entry before its event is drained
                let appended =
                    log.append(parent_id, data, index, ModuleHandle::new(module, session))?;
                if let (Some(id), Some(alias)) = (appended, entry) {
                    self.entries.insert(alias.clone(), (log.owner_id(), id));
                    self.entry_names.insert((log.owner_id(), id), alias);
                }
            }

            DeliveryCall::SetLaunchUrls { launch, urls } => {
                self.launch(&launch)?.set_launch_urls(urls);
            }

            DeliveryCall::SetSupportsRestart { launch, supported } => {
                self.launch(&launch)?
                    .set_supports_restart_web_server(supported);
            }

            DeliveryCall::RestartWebServer { launch } => {
                if let Some(handle) = self.launch(&launch)?.restart_web_server()? {
                    tokio::task::spawn_blocking(move || handle.join())
                        .await
                        .map_err(|e| self.error(format!("restart task failed: {}", e)))?
                        .map_err(|_| self.error("restart thread panicked"))?;
                }
            }

            DeliveryCall::Terminate { node } => match self.node(&node)? {
                NodeRef::Launch(l) => {
                    l.set_terminated();
                }
                NodeRef::Tab(t) => {
                    t.set_terminated();
                }
                NodeRef::Server(s) => {
                    s.set_terminated();
                }
            },

            DeliveryCall::ClearLog { node } => match self.node(&node)? {
                NodeRef::Tab(t) => t.clear_log(),
                NodeRef::Server(s) => s.clear_log(),
                NodeRef::Launch(_) => {
                    return Err(self.error(format!("{} has no log", node)));
                }
            },

            DeliveryCall::Focus { node } => {
                let target = self.node(&node)?;
                let log = log_of(&target)
                    .ok_or_else(|| self.error(format!("{} has no log", node)))?;
                let focus = log.first_deeply_nested_child_with_max_attention();
                extra.push(HeadlessEvent::Focus {
                    node,
                    entry: focus
                        .as_ref()
                        .and_then(|v| self.entry_names.get(&(v.owner, v.id)).cloned()),
                    label: focus.as_ref().map(|v| v.label().to_string()),
                    attention: focus.as_ref().and_then(|v| v.attention_level),
                    source: focus.as_ref().is_some_and(|v| v.is_attention_source()),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                });
            }

            DeliveryCall::RemoveTerminatedLaunches => {
                let removed = self.registry.remove_terminated_launches();
                debug!("Script removed {} terminated launches", removed);
            }
        }

        let mut events = self.drain();
        events.extend(extra);
        Ok(events)
    }

    /// Convert every queued model and log event to output events
    pub fn drain(&mut self) -> Vec<HeadlessEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            out.push(match event {
                ForwardedEvent::Model(event) => self.describe_model(&event),
                ForwardedEvent::Log(event) => self.describe_log(&event),
            });
        }
        out
    }

    fn describe_model(&self, event: &ModelEvent) -> HeadlessEvent {
        let node = event.node();
        HeadlessEvent::node(
            event.event_type(),
            self.node_name(node.id()),
            node.id().get(),
            node.name(),
            node.is_terminated(),
            node.needs_attention_level(),
        )
    }

    fn describe_log(&self, event: &LogEvent) -> HeadlessEvent {
        let timestamp = chrono::Utc::now().timestamp_millis();
        match event {
            LogEvent::NewEntry {
                insertion_index,
                entry,
                needs_attention,
                parents_changed,
            } => HeadlessEvent::LogEntry {
                node: self.node_name(entry.owner),
                entry: self.entry_names.get(&(entry.owner, entry.id)).cloned(),
                label: entry.label().to_string(),
                level: entry
                    .data
                    .as_ref()
                    .map(|d| d.log_level.clone())
                    .unwrap_or_default(),
                index: entry.index,
                insertion_index: *insertion_index,
                needs_attention: *needs_attention,
                parents_changed: *parents_changed,
                attention: entry.attention_level,
                timestamp,
            },
            LogEvent::EntriesRemoved { owner, entries } => HeadlessEvent::LogEntriesRemoved {
                node: self.node_name(*owner),
                count: entries.len(),
                labels: entries.iter().map(|e| e.label().to_string()).collect(),
                timestamp,
            },
        }
    }

    // ─────────────────────────────────────────────────────────
    // Alias Tables
    // ─────────────────────────────────────────────────────────

    fn name_node(&mut self, id: NodeId, alias: &str) {
        self.node_names
            .entry(id)
            .or_insert_with(|| alias.to_string());
    }

    fn node_name(&self, id: NodeId) -> String {
        self.node_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn watch_log(&mut self, id: NodeId, log: &Log) {
        if self.watched_logs.insert(id) {
            log.add_listener(self.forwarder.clone());
        }
    }

    fn launch(&self, alias: &str) -> Result<Arc<LaunchConfiguration>> {
        self.launches
            .get(alias)
            .cloned()
            .ok_or_else(|| self.error(format!("unknown launch: {}", alias)))
    }

    fn tab(&self, alias: &str) -> Result<Arc<BrowserTab>> {
        self.tabs
            .get(alias)
            .cloned()
            .ok_or_else(|| self.error(format!("unknown tab: {}", alias)))
    }

    fn node(&self, alias: &str) -> Result<NodeRef> {
        if let Some(tab) = self.tabs.get(alias) {
            return Ok(NodeRef::Tab(Arc::clone(tab)));
        }
        if let Some(server) = self.servers.get(alias) {
            return Ok(NodeRef::Server(Arc::clone(server)));
        }
        if let Some(launch) = self.launches.get(alias) {
            return Ok(NodeRef::Launch(Arc::clone(launch)));
        }
        Err(self.error(format!("unknown node: {}", alias)))
    }

    fn entry(&self, alias: &str, owner: NodeId) -> Result<EntryId> {
        match self.entries.get(alias) {
            Some((entry_owner, id)) if *entry_owner == owner => Ok(*id),
            Some(_) => Err(self.error(format!("entry {} belongs to another log", alias))),
            None => Err(self.error(format!("unknown entry: {}", alias))),
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::replay(self.current_line, message)
    }
}

fn log_of(node: &NodeRef) -> Option<&Log> {
    match node {
        NodeRef::Tab(t) => Some(t.log()),
        NodeRef::Server(s) => Some(s.log()),
        NodeRef::Launch(_) => None,
    }
}

// ─────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────

/// Replay a script read from `reader`, writing NDJSON events to `out`.
///
/// Malformed lines and failed calls produce an `error` event; the replay then
/// moves on to the next line. Only I/O failures abort it.
pub async fn run_replay<R, W>(reader: R, out: &mut W, settings: ModelSettings) -> Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    info!("Starting headless replay");
    let mut replay = Replay::new(settings);
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        stats.calls += 1;

        let result = match DeliveryCall::parse(trimmed) {
            Ok(call) => replay.apply(line_no, call).await,
            Err(e) => Err(Error::replay(line_no, e.to_string())),
        };

        match result {
            Ok(events) => {
                for event in events {
                    trace!("Replay line {} produced {}", line_no, event.kind());
                    event.write_to(out).context("writing replay event")?;
                }
            }
            Err(e) => {
                stats.errors += 1;
                if e.is_recoverable() {
                    warn!("Replay line {} failed: {}", line_no, e);
                } else {
                    error!("Replay line {} broke a model invariant: {}", line_no, e);
                }
                // Events published before the failure still go out
                for event in replay.drain() {
                    event.write_to(out).context("writing replay event")?;
                }
                HeadlessEvent::error(e.to_string(), e.is_fatal(), Some(line_no))
                    .write_to(out)
                    .context("writing replay error")?;
            }
        }
    }

    HeadlessEvent::replay_finished(stats.calls, stats.errors)
        .write_to(out)
        .context("writing replay summary")?;
    info!(
        "Headless replay finished: {} calls, {} errors",
        stats.calls, stats.errors
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn replay_lines(script: &str) -> (ReplayStats, Vec<serde_json::Value>) {
        let mut out = Vec::new();
        let stats = run_replay(script.as_bytes(), &mut out, ModelSettings::default())
            .await
            .unwrap();
        let values = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (stats, values)
    }

    fn kinds(values: &[serde_json::Value]) -> Vec<String> {
        values
            .iter()
            .map(|v| {
                v["kind"]
                    .as_str()
                    .or_else(|| v["event"].as_str())
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_launch_and_tab_events_use_aliases() {
        let script = r#"
{"call":"create_launch","launch":"web","name":"my app"}
{"call":"add_browser_tab","launch":"web","tab":"t1","user_agent":"Chrome","url":"http://localhost/","module":"main","session":"s1"}
"#;
        let (stats, values) = replay_lines(script).await;

        assert_eq!(stats, ReplayStats { calls: 2, errors: 0 });
        assert_eq!(
            kinds(&values),
            vec![
                "launch_configuration_launched",
                "browser_tab_created",
                "replay_finished"
            ]
        );
        assert_eq!(values[0]["node"], "web");
        assert_eq!(values[1]["node"], "t1");
        assert_eq!(values[1]["node_id"], 2);
        assert_eq!(values[1]["name"], "Chrome (http://localhost/)");
    }

    #[tokio::test]
    async fn test_log_entries_and_attention() {
        let script = r#"
{"call":"create_launch","launch":"web","name":"app"}
{"call":"add_browser_tab","launch":"web","tab":"t1","user_agent":"Chrome","url":"http://localhost/","module":"main","session":"s1"}
{"call":"append_log","node":"t1","entry":"boot","label":"Booting","level":"INFO","index":1,"module":"main","session":"s1"}
{"call":"append_log","node":"t1","parent":"boot","entry":"oops","label":"Oops","level":"ERROR","needs_attention":true,"index":1,"module":"main","session":"s1"}
{"call":"focus","node":"t1"}
"#;
        let (stats, values) = replay_lines(script).await;

        assert_eq!(stats.errors, 0);
        assert_eq!(
            kinds(&values),
            vec![
                "launch_configuration_launched",
                "browser_tab_created",
                "log_entry",
                "log_entry",
                "browser_tab_needs_attention",
                "focus",
                "replay_finished"
            ]
        );
        assert_eq!(values[2]["node"], "t1");
        assert_eq!(values[3]["needs_attention"], true);
        assert_eq!(values[4]["attention"], "ERROR");
        assert_eq!(values[5]["label"], "Oops");
        assert_eq!(values[5]["entry"], "oops");
        assert_eq!(values[5]["source"], true);
    }

    #[tokio::test]
    async fn test_bad_lines_report_and_continue() {
        let script = r#"
not json
{"call":"add_module","tab":"ghost","module":"main","session":"s1"}
{"call":"create_launch","launch":"web","name":"app"}
"#;
        let (stats, values) = replay_lines(script).await;

        assert_eq!(stats, ReplayStats { calls: 3, errors: 2 });
        assert_eq!(values[0]["event"], "error");
        assert_eq!(values[0]["line"], 2);
        assert_eq!(values[1]["event"], "error");
        assert!(values[1]["message"]
            .as_str()
            .unwrap()
            .contains("unknown tab: ghost"));
        assert_eq!(values[2]["kind"], "launch_configuration_launched");
    }

    #[tokio::test]
    async fn test_set_server_twice_is_reported() {
        let script = r#"
{"call":"create_launch","launch":"web","name":"app"}
{"call":"set_server","launch":"web","server":"srv","name":"dev"}
{"call":"set_server","launch":"web","server":"srv2","name":"dev"}
"#;
        let (stats, values) = replay_lines(script).await;

        assert_eq!(stats.errors, 1);
        let error = values.iter().find(|v| v["event"] == "error").unwrap();
        assert_eq!(error["fatal"], true);
        assert_eq!(error["line"], 4);
    }

    #[tokio::test]
    async fn test_restart_web_server_round_trip() {
        let script = r#"
{"call":"create_launch","launch":"web","name":"app","supports_restart":true,"restart_fails":true}
{"call":"restart_web_server","launch":"web"}
"#;
        let (stats, values) = replay_lines(script).await;

        assert_eq!(stats.errors, 0);
        let restarts = kinds(&values)
            .into_iter()
            .filter(|k| k == "restart_web_server_status_changed")
            .count();
        // supported, reloading, reloaded
        assert_eq!(restarts, 3);
    }

    #[tokio::test]
    async fn test_terminate_and_purge() {
        let script = r#"
{"call":"create_launch","launch":"web","name":"app"}
{"call":"set_server","launch":"web","server":"srv","name":"dev"}
{"call":"terminate","node":"web"}
{"call":"remove_terminated_launches"}
"#;
        let (_stats, values) = replay_lines(script).await;

        let kinds = kinds(&values);
        let tail: Vec<&str> = kinds.iter().rev().take(4).rev().map(|s| s.as_str()).collect();
        assert_eq!(
            tail,
            vec![
                "server_terminated",
                "launch_configuration_terminated",
                "launch_configuration_removed",
                "replay_finished"
            ]
        );
    }
}
