//! Capability shared by launches, browser tabs and servers.

use launchwatch_core::AttentionLevel;

use crate::ids::NodeId;

/// A node in the "what is running" tree
pub trait ModelNode: Send + Sync {
    fn id(&self) -> NodeId;

    fn name(&self) -> &str;

    /// Parent node, `None` for launches
    fn parent_id(&self) -> Option<NodeId>;

    /// Current children, in display order
    fn child_ids(&self) -> Vec<NodeId>;

    fn needs_attention_level(&self) -> Option<AttentionLevel>;

    fn is_terminated(&self) -> bool;
}
