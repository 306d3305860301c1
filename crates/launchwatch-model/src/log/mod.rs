//! Per-entity hierarchical logs.
//!
//! A [`Log`] owns one entry tree plus its listener list behind a single mutex.
//! Every mutation queues the event it produces while the mutex is held; the
//! queue is drained with the mutex released, so a listener may freely call back
//! into the log (or anything else in the model). One thread drains at a time,
//! which keeps delivery in commit order, and each drain ends at the event its
//! caller committed; later events are handed to the threads that committed them.

mod entry;
mod tree;


use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use launchwatch_core::prelude::*;
use launchwatch_core::AttentionLevel;

use crate::ids::NodeId;

pub use entry::{EntryId, HelpInfo, LogEntryData, LogEntryView, ModuleHandle};
use tree::LogTree;

// ─────────────────────────────────────────────────────────────────
// Owner & Listener Contracts
// ─────────────────────────────────────────────────────────────────

/// The entity a log belongs to.
///
/// Logs hold their owner weakly; the owner alone decides the log's lifetime.
pub trait LogOwner: Send + Sync {
    fn owner_id(&self) -> NodeId;

    /// Called after an attention-worthy entry has been published
    fn on_log_attention(&self, level: AttentionLevel);
}

/// Observer of one log's entries
pub trait LogListener: Send + Sync {
    fn new_log_entry(
        &self,
        _insertion_index: usize,
        _entry: &LogEntryView,
        _needs_attention: bool,
        _parents_changed: bool,
    ) {
    }

    fn log_entries_removed(&self, _removed: &[LogEntryView]) {}

    /// Entry point used by [`Log`]; routes to the specific callbacks by default.
    fn on_log_event(&self, event: &LogEvent) {
        event.dispatch(self);
    }
}

/// Notification produced by a log mutation
#[derive(Debug, Clone)]
pub enum LogEvent {
    NewEntry {
        insertion_index: usize,
        entry: LogEntryView,
        needs_attention: bool,
        parents_changed: bool,
    },
    EntriesRemoved {
        owner: NodeId,
        entries: Vec<LogEntryView>,
    },
}

impl LogEvent {
    /// Entity whose log produced this event
    pub fn owner(&self) -> NodeId {
        match self {
            Self::NewEntry { entry, .. } => entry.owner,
            Self::EntriesRemoved { owner, .. } => *owner,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewEntry { .. } => "new_log_entry",
            Self::EntriesRemoved { .. } => "log_entries_removed",
        }
    }

    pub fn dispatch<L: LogListener + ?Sized>(&self, listener: &L) {
        match self {
            Self::NewEntry {
                insertion_index,
                entry,
                needs_attention,
                parents_changed,
            } => listener.new_log_entry(
                *insertion_index,
                entry,
                *needs_attention,
                *parents_changed,
            ),
            Self::EntriesRemoved { entries, .. } => listener.log_entries_removed(entries),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Log
// ─────────────────────────────────────────────────────────────────

/// An event waiting for delivery, with the listeners registered at commit time
struct Pending {
    seq: u64,
    event: LogEvent,
    listeners: Vec<Arc<dyn LogListener>>,
}

struct LogInner {
    tree: LogTree,
    listeners: Vec<Arc<dyn LogListener>>,
    pending: VecDeque<Pending>,
    /// Sequence number of the last committed event
    committed: u64,
    /// Sequence number of the last event taken off the queue
    taken: u64,
    /// The active delivery stops after this event
    deliver_through: u64,
    dispatching: bool,
}

impl LogInner {
    fn commit(&mut self, event: LogEvent) -> u64 {
        self.committed += 1;
        let listeners = self.listeners.clone();
        self.pending.push_back(Pending {
            seq: self.committed,
            event,
            listeners,
        });
        self.committed
    }

    /// Take the next event if the active delivery still covers it, otherwise end
    /// the delivery.
    fn take_next(&mut self) -> Option<Pending> {
        match self.pending.pop_front() {
            Some(next) if next.seq <= self.deliver_through => {
                self.taken = next.seq;
                Some(next)
            }
            other => {
                if let Some(next) = other {
                    self.pending.push_front(next);
                }
                self.dispatching = false;
                None
            }
        }
    }
}

thread_local! {
    /// Number of logs this thread is delivering events for right now
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as delivering for `log` until dropped.
///
/// If a listener panics, the log is handed back so later events still go out.
struct DeliveryGuard<'a> {
    log: &'a Log,
}

impl<'a> DeliveryGuard<'a> {
    fn enter(log: &'a Log) -> Self {
        DELIVERING.with(|depth| depth.set(depth.get() + 1));
        Self { log }
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        DELIVERING.with(|depth| depth.set(depth.get() - 1));
        if std::thread::panicking() {
            let mut inner = self.log.inner.lock();
            inner.dispatching = false;
            warn!(
                "Log {} listener panicked; {} events still queued",
                self.log.owner_id,
                inner.pending.len()
            );
            drop(inner);
            self.log.handoff.notify_all();
        }
    }
}

/// Hierarchical log of one browser tab or server
pub struct Log {
    owner_id: NodeId,
    owner: Weak<dyn LogOwner>,
    inner: Mutex<LogInner>,
    handoff: Condvar,
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Log")
            .field("owner", &self.owner_id)
            .field("entries", &inner.tree.len())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl Log {
    pub(crate) fn new(owner_id: NodeId, owner: Weak<dyn LogOwner>) -> Self {
        Self {
            owner_id,
            owner,
            inner: Mutex::new(LogInner {
                tree: LogTree::new(owner_id),
                listeners: Vec::new(),
                pending: VecDeque::new(),
                committed: 0,
                taken: 0,
                deliver_through: 0,
                dispatching: false,
            }),
            handoff: Condvar::new(),
        }
    }

    pub fn owner_id(&self) -> NodeId {
        self.owner_id
    }

    /// The sentinel root entry
    pub fn root(&self) -> EntryId {
        EntryId::ROOT
    }

    pub fn add_listener(&self, listener: Arc<dyn LogListener>) {
        self.inner.lock().listeners.push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn LogListener>) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        inner.listeners.len() != before
    }

    /// Append an entry reported by a connected process.
    ///
    /// Returns the new entry's id, or `None` when `(module, index)` was already
    /// delivered under `parent` (redelivery is tolerated silently).
    pub fn append(
        &self,
        parent: EntryId,
        data: LogEntryData,
        index: u64,
        module: ModuleHandle,
    ) -> Result<Option<EntryId>> {
        let (attention, entry, seq) = {
            let mut inner = self.inner.lock();
            let needs_attention = data.needs_attention;
            let Some(insertion) = inner.tree.insert(parent, data, index, module)? else {
                trace!(
                    "Duplicate log entry {} under {:?} in log {}",
                    index,
                    parent,
                    self.owner_id
                );
                return Ok(None);
            };
            let event = LogEvent::NewEntry {
                insertion_index: insertion.position,
                entry: inner.tree.view(insertion.entry)?,
                needs_attention,
                parents_changed: insertion.parents_changed,
            };
            let seq = inner.commit(event);
            (insertion.attention, insertion.entry, seq)
        };

        self.deliver_through(seq);

        if let Some(level) = attention {
            if let Some(owner) = self.owner.upgrade() {
                owner.on_log_attention(level);
            }
        }

        Ok(Some(entry))
    }

    /// Snapshot of one entry
    pub fn entry(&self, id: EntryId) -> Result<LogEntryView> {
        self.inner.lock().tree.view(id)
    }

    /// Snapshot of every child of `parent`, disclosed or not
    pub fn all_children(&self, parent: EntryId) -> Result<Vec<LogEntryView>> {
        self.inner.lock().tree.children(parent)
    }

    /// Snapshot of the currently disclosed children of `parent`
    pub fn disclosed_children(&self, parent: EntryId) -> Result<Vec<LogEntryView>> {
        self.inner.lock().tree.disclosed_children(parent)
    }

    /// Highest level propagated to the root
    pub fn attention_level(&self) -> Option<AttentionLevel> {
        self.inner
            .lock()
            .tree
            .attention_level(EntryId::ROOT)
            .ok()
            .flatten()
    }

    /// Number of entries ever appended (hidden ones included)
    pub fn len(&self) -> usize {
        self.inner.lock().tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hide every disclosed entry and clear derived attention.
    ///
    /// Fires a single `log_entries_removed` carrying everything hidden; nothing
    /// is fired when no entry was disclosed. Returns the number hidden.
    pub fn undisclose_all(&self) -> usize {
        let (count, seq) = {
            let mut inner = self.inner.lock();
            let removed = inner.tree.undisclose_all();
            let count = removed.len();
            if count == 0 {
                return 0;
            }
            let seq = inner.commit(LogEvent::EntriesRemoved {
                owner: self.owner_id,
                entries: removed,
            });
            (count, seq)
        };

        debug!("Log {} hid {} entries", self.owner_id, count);
        self.deliver_through(seq);
        count
    }

    /// Deepest disclosed entry that should receive focus
    pub fn first_deeply_nested_child_with_max_attention(&self) -> Option<LogEntryView> {
        let inner = self.inner.lock();
        let id = inner
            .tree
            .first_deeply_nested_with_max_attention(EntryId::ROOT)
            .ok()
            .flatten()?;
        inner.tree.view(id).ok()
    }

    /// Make sure every event up to `seq` is delivered, in commit order.
    ///
    /// Only one thread delivers at a time, and it stops after the last event it
    /// was asked for. A caller whose event is still queued behind another
    /// thread's delivery waits for its turn. A caller that is already delivering
    /// (a listener re-entering this log, or delivering for another log further
    /// up its stack) never waits: it extends the active delivery instead.
    fn deliver_through(&self, seq: u64) {
        let mut inner = self.inner.lock();
        loop {
            if inner.taken >= seq {
                return;
            }
            if !inner.dispatching {
                break;
            }
            if DELIVERING.with(Cell::get) > 0 {
                inner.deliver_through = inner.deliver_through.max(seq);
                return;
            }
            self.handoff.wait(&mut inner);
        }
        inner.dispatching = true;
        inner.deliver_through = inner.deliver_through.max(seq);
        drop(inner);

        let _guard = DeliveryGuard::enter(self);
        loop {
            let Some(next) = self.inner.lock().take_next() else {
                break;
            };
            for listener in &next.listeners {
                listener.on_log_event(&next.event);
            }
        }
        self.handoff.notify_all();
    }
}
