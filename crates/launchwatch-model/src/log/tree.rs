//! Arena-backed log entry tree.
//!
//! `LogTree` holds no locks of its own; [`Log`](super::Log) wraps it in a mutex and
//! publishes whatever an operation reports once that mutex is released.
//!
//! Ordering rules:
//! - children of a non-root entry come from one module stream and are kept
//!   sorted by index
//! - children of the root interleave several module streams in arrival order,
//!   while each module's own subsequence stays sorted by index

use launchwatch_core::prelude::*;
use launchwatch_core::AttentionLevel;

use crate::ids::NodeId;

use super::entry::{EntryId, LogEntryData, LogEntryView, ModuleHandle};

#[derive(Debug)]
struct EntryNode {
    parent: Option<EntryId>,
    children: Vec<EntryId>,
    data: Option<LogEntryData>,
    index: u64,
    module: Option<ModuleHandle>,
    disclosed: bool,
    attention: Option<AttentionLevel>,
}

impl EntryNode {
    fn root() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data: None,
            index: 0,
            module: None,
            disclosed: false,
            attention: None,
        }
    }
}

/// Result of a successful insertion, captured while the tree is still locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Insertion {
    pub entry: EntryId,
    /// Position among the parent's children
    pub position: usize,
    /// Whether any ancestor had to be disclosed
    pub parents_changed: bool,
    /// Level propagated to the ancestors, if the entry asked for attention
    pub attention: Option<AttentionLevel>,
}

#[derive(Debug)]
pub(crate) struct LogTree {
    owner: NodeId,
    nodes: Vec<EntryNode>,
}

impl LogTree {
    pub fn new(owner: NodeId) -> Self {
        Self {
            owner,
            nodes: vec![EntryNode::root()],
        }
    }

    /// Number of entries, excluding the root
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    fn node(&self, id: EntryId) -> Result<&EntryNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::unknown_log_entry(id.0))
    }

    /// Attach a fresh entry under `parent`.
    ///
    /// Returns `Ok(None)` when the parent already has a child with the same
    /// module and index.
    pub fn insert(
        &mut self,
        parent: EntryId,
        data: LogEntryData,
        index: u64,
        module: ModuleHandle,
    ) -> Result<Option<Insertion>> {
        self.node(parent)?;

        let position = if parent.is_root() {
            self.root_insertion_point(index, &module)
        } else {
            self.sorted_insertion_point(parent, index, &module)
        };
        let Some(position) = position else {
            return Ok(None);
        };

        let entry = EntryId(self.nodes.len());
        let attention = data.attention_signal();
        self.nodes.push(EntryNode {
            parent: Some(parent),
            children: Vec::new(),
            data: Some(data),
            index,
            module: Some(module),
            disclosed: true,
            attention,
        });
        self.nodes[parent.0].children.insert(position, entry);

        let parents_changed = self.disclose_ancestors(parent);
        if let Some(level) = attention {
            self.raise_ancestors(parent, level);
        }

        Ok(Some(Insertion {
            entry,
            position,
            parents_changed,
            attention,
        }))
    }

    /// Root children: right after the last same-module child with a smaller
    /// index, before the module's first child if all of them are larger, or at
    /// the end when the module has not logged at the root yet.
    fn root_insertion_point(&self, index: u64, module: &ModuleHandle) -> Option<usize> {
        let children = &self.nodes[EntryId::ROOT.0].children;
        let mut after_smaller = None;
        let mut first_same_module = None;

        for (pos, child) in children.iter().enumerate() {
            let child = &self.nodes[child.0];
            if child.module.as_ref() != Some(module) {
                continue;
            }
            if child.index == index {
                return None;
            }
            first_same_module.get_or_insert(pos);
            if child.index < index {
                after_smaller = Some(pos + 1);
            }
        }

        Some(
            after_smaller
                .or(first_same_module)
                .unwrap_or(children.len()),
        )
    }

    fn sorted_insertion_point(
        &self,
        parent: EntryId,
        index: u64,
        module: &ModuleHandle,
    ) -> Option<usize> {
        let parent_node = &self.nodes[parent.0];
        if parent_node.module.as_ref() != Some(module) {
            warn!(
                "Entry {} of log {} mixes module streams ({:?} under {:?})",
                parent.0, self.owner, module, parent_node.module
            );
        }
        parent_node
            .children
            .binary_search_by_key(&index, |child| self.nodes[child.0].index)
            .err()
    }

    /// Disclose every undisclosed ancestor from `from` up to (not including) the root.
    fn disclose_ancestors(&mut self, from: EntryId) -> bool {
        let mut changed = false;
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if id.is_root() {
                break;
            }
            let node = &mut self.nodes[id.0];
            if !node.disclosed {
                node.disclosed = true;
                changed = true;
            }
            cursor = node.parent;
        }
        changed
    }

    /// Raise every ancestor, root included, whose level is unset or lower.
    fn raise_ancestors(&mut self, from: EntryId, level: AttentionLevel) {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let node = &mut self.nodes[id.0];
            if AttentionLevel::is_more_important(node.attention, Some(level)) {
                node.attention = Some(level);
            }
            cursor = node.parent;
        }
    }

    pub fn view(&self, id: EntryId) -> Result<LogEntryView> {
        let node = self.node(id)?;
        Ok(LogEntryView {
            id,
            owner: self.owner,
            parent: node.parent,
            data: node.data.clone(),
            index: node.index,
            module: node.module.clone(),
            disclosed: node.disclosed,
            attention_level: node.attention,
            child_count: node.children.len(),
        })
    }

    pub fn attention_level(&self, id: EntryId) -> Result<Option<AttentionLevel>> {
        Ok(self.node(id)?.attention)
    }

    pub fn children(&self, parent: EntryId) -> Result<Vec<LogEntryView>> {
        self.node(parent)?
            .children
            .iter()
            .map(|&child| self.view(child))
            .collect()
    }

    pub fn disclosed_children(&self, parent: EntryId) -> Result<Vec<LogEntryView>> {
        self.node(parent)?
            .children
            .iter()
            .filter(|child| self.nodes[child.0].disclosed)
            .map(|&child| self.view(child))
            .collect()
    }

    /// Hide every disclosed entry and clear all derived attention.
    ///
    /// Returns the hidden entries in post-order (children before parents).
    pub fn undisclose_all(&mut self) -> Vec<LogEntryView> {
        let order = self.post_order();
        let mut removed = Vec::new();
        for id in order {
            let node = &mut self.nodes[id.0];
            node.attention = None;
            if id.is_root() || !node.disclosed {
                continue;
            }
            node.disclosed = false;
            if let Ok(view) = self.view(id) {
                removed.push(view);
            }
        }
        removed
    }

    fn post_order(&self) -> Vec<EntryId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(EntryId::ROOT, false)];
        while let Some((id, visited)) = stack.pop() {
            if visited {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id.0].children.iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    /// Deepest disclosed entry that should receive focus, starting below `from`.
    ///
    /// Among siblings: highest level wins, then an entry that raised the signal
    /// itself beats one that only inherited it, then the first in order.
    pub fn first_deeply_nested_with_max_attention(
        &self,
        from: EntryId,
    ) -> Result<Option<EntryId>> {
        self.node(from)?;
        Ok(self.max_attention_descendant(from))
    }

    fn max_attention_descendant(&self, from: EntryId) -> Option<EntryId> {
        let mut best: Option<(EntryId, AttentionLevel, bool)> = None;

        for &child in &self.nodes[from.0].children {
            let node = &self.nodes[child.0];
            if !node.disclosed {
                continue;
            }
            let Some(level) = node.attention else {
                continue;
            };
            let is_source = node.data.as_ref().is_some_and(|d| d.needs_attention);
            let better = match best {
                None => true,
                Some((_, best_level, best_is_source)) => {
                    level.outranks(best_level)
                        || (level == best_level && is_source && !best_is_source)
                }
            };
            if better {
                best = Some((child, level, is_source));
            }
        }

        let (winner, _, _) = best?;
        Some(self.max_attention_descendant(winner).unwrap_or(winner))
    }
}
