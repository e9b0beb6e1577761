//! The node kinds the engine schedules, and the state common to all of them.
//!
//! Per the diamond-inheritance redesign note, bindings are not modeled as a class
//! hierarchy: every node kind shares one [`NodeRecord`], and behavior differences live
//! entirely in each kind's own update routine in `engine.rs`. [`NodeKind`] is only a
//! tag, used for dispatch and for the scheduler's deterministic tie-break order.

use crate::property::PropertyHandle;
use logic_graph::schedule::OrderKey;
use logic_graph::NodeId;

/// Tag identifying which per-kind side table in the engine owns a node's extra data.
/// Declaration order here *is* the scheduler's kind-rank tie-break, matching the order
/// the binary format lists node kinds in (§6's `ApiObjects` table).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Script,
    NodeBinding,
    AppearanceBinding,
    CameraBinding,
    DataArray,
    AnimationNode,
    TimerNode,
}

impl NodeKind {
    pub fn order_rank(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Script => "Script",
            NodeKind::NodeBinding => "NodeBinding",
            NodeKind::AppearanceBinding => "AppearanceBinding",
            NodeKind::CameraBinding => "CameraBinding",
            NodeKind::DataArray => "DataArray",
            NodeKind::AnimationNode => "AnimationNode",
            NodeKind::TimerNode => "TimerNode",
        }
    }

    /// True for kinds the scheduler and link registry never touch: a `DataArray`
    /// cannot be linked and has no `IN`/`OUT` trees, so it never participates in the
    /// dependency graph (spec §4.6).
    pub fn is_schedulable(self) -> bool {
        !matches!(self, NodeKind::DataArray)
    }
}

/// State common to every node kind: name, id, its two property-tree roots. The dirty
/// flag itself lives in the engine's single [`logic_graph::DirtySet`], not here.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub name: String,
    pub id: NodeId,
    pub kind: NodeKind,
    /// `None` for binding/timer/animation-progress-less kinds that have no inputs, and
    /// for `DataArray`, which has neither tree.
    pub in_root: Option<PropertyHandle>,
    /// `None` for binding and data-array nodes, which have no outputs.
    pub out_root: Option<PropertyHandle>,
    /// Monotonically increasing per engine, assigned at creation; the second half of
    /// the scheduler's deterministic tie-break key.
    pub creation_id: u64,
}

impl NodeRecord {
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            kind_rank: self.kind.order_rank(),
            creation_id: self.creation_id,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_rank_matches_declaration_order() {
        assert!(NodeKind::Script.order_rank() < NodeKind::NodeBinding.order_rank());
        assert!(NodeKind::NodeBinding.order_rank() < NodeKind::AppearanceBinding.order_rank());
        assert!(NodeKind::CameraBinding.order_rank() < NodeKind::DataArray.order_rank());
        assert!(NodeKind::AnimationNode.order_rank() < NodeKind::TimerNode.order_rank());
    }

    #[test]
    fn data_array_is_not_schedulable() {
        assert!(!NodeKind::DataArray.is_schedulable());
        assert!(NodeKind::Script.is_schedulable());
    }
}
