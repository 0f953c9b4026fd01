//! 树级共享状态：折叠覆盖、唯一编辑槽、拖拽源
//!
//! 以显式上下文对象传入每个子树，而不是全局单例，便于测试时创建独立实例。

use serde::Serialize;

use crate::model::path::NodePath;

/// 按路径强制折叠/展开的一次性覆盖
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseOverride {
    pub path: NodePath,
    pub collapsed: bool,
    /// 每次写入递增，节点据此只采纳一次
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditTarget {
    Value,
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditingSlot {
    pub path: NodePath,
    pub target: EditTarget,
}

impl EditingSlot {
    /// 字符串形式：值编辑为路径串，键编辑为 `key_` + 路径串
    pub fn key(&self) -> String {
        match self.target {
            EditTarget::Value => self.path.to_path_string(),
            EditTarget::Key => format!("key_{}", self.path.to_path_string()),
        }
    }
}

#[derive(Debug, Default)]
pub struct TreeState {
    collapse_override: Option<CollapseOverride>,
    override_seq: u64,
    editing: Option<EditingSlot>,
    drag_source: Option<NodePath>,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入新的覆盖（整体替换，不合并）
    pub fn set_collapse_override(&mut self, path: NodePath, collapsed: bool) -> u64 {
        self.override_seq += 1;
        self.collapse_override = Some(CollapseOverride {
            path,
            collapsed,
            seq: self.override_seq,
        });
        self.override_seq
    }

    pub fn clear_collapse_override(&mut self) {
        self.collapse_override = None;
    }

    /// 供指定路径的节点采纳的覆盖（尚未被该节点消费过的）
    pub fn pending_override_for(&self, path: &NodePath, last_seen: u64) -> Option<&CollapseOverride> {
        self.collapse_override
            .as_ref()
            .filter(|o| o.seq > last_seen && &o.path == path)
    }

    pub fn editing(&self) -> Option<&EditingSlot> {
        self.editing.as_ref()
    }

    pub fn is_editing_free(&self) -> bool {
        self.editing.is_none()
    }

    /// 占用编辑槽；已被占用时返回 false，不驱逐已有会话
    pub fn try_begin_edit(&mut self, path: &NodePath, target: EditTarget) -> bool {
        if self.editing.is_some() {
            return false;
        }
        self.editing = Some(EditingSlot {
            path: path.clone(),
            target,
        });
        true
    }

    /// 只释放自己持有的槽
    pub fn end_edit(&mut self, path: &NodePath) {
        if self.editing.as_ref().is_some_and(|slot| &slot.path == path) {
            self.editing = None;
        }
    }

    pub fn clear_editing(&mut self) {
        self.editing = None;
    }

    pub fn is_editing(&self, path: &NodePath, target: EditTarget) -> bool {
        self.editing
            .as_ref()
            .is_some_and(|slot| &slot.path == path && slot.target == target)
    }

    /// 恰好编辑该节点本行（值或键）
    pub fn is_editing_exact(&self, path: &NodePath) -> bool {
        self.editing.as_ref().is_some_and(|slot| &slot.path == path)
    }

    /// 该节点自身或其后代正在编辑：此时不允许折叠把编辑内容藏起来
    pub fn are_children_being_edited(&self, path: &NodePath) -> bool {
        self.editing
            .as_ref()
            .is_some_and(|slot| slot.path.starts_with(path))
    }

    pub fn drag_source(&self) -> Option<&NodePath> {
        self.drag_source.as_ref()
    }

    pub fn set_drag_source(&mut self, path: Option<NodePath>) {
        self.drag_source = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_single_edit_slot_is_not_evicted() {
        let mut state = TreeState::new();
        assert!(state.try_begin_edit(&p("a"), EditTarget::Value));
        assert!(!state.try_begin_edit(&p("b"), EditTarget::Value), "已有编辑会话时不能再进入");
        assert!(state.is_editing(&p("a"), EditTarget::Value));

        state.end_edit(&p("b"));
        assert!(state.is_editing_exact(&p("a")), "其他节点不能释放别人的槽");
        state.end_edit(&p("a"));
        assert!(state.is_editing_free());
    }

    #[test]
    fn test_slot_key_format() {
        let mut state = TreeState::new();
        state.try_begin_edit(&p("a.b[1]"), EditTarget::Key);
        assert_eq!(state.editing().unwrap().key(), "key_a.b.1");
        state.clear_editing();
        state.try_begin_edit(&p("a"), EditTarget::Value);
        assert_eq!(state.editing().unwrap().key(), "a");
    }

    #[test]
    fn test_children_being_edited_covers_ancestors_only() {
        let mut state = TreeState::new();
        state.try_begin_edit(&p("a.b"), EditTarget::Value);
        assert!(state.are_children_being_edited(&NodePath::root()));
        assert!(state.are_children_being_edited(&p("a")));
        assert!(state.are_children_being_edited(&p("a.b")));
        assert!(!state.are_children_being_edited(&p("a.b.c")));
        assert!(!state.are_children_being_edited(&p("c")));
        assert!(!state.is_editing_exact(&p("a")));
    }

    #[test]
    fn test_override_is_offered_once_per_write() {
        let mut state = TreeState::new();
        let seq = state.set_collapse_override(p("a"), true);
        assert!(state.pending_override_for(&p("a"), 0).is_some());
        assert!(state.pending_override_for(&p("b"), 0).is_none(), "只匹配完全相同的路径");
        assert!(state.pending_override_for(&p("a"), seq).is_none(), "已消费的覆盖不再提供");

        let next = state.set_collapse_override(p("a"), false);
        assert!(next > seq);
        assert_eq!(state.pending_override_for(&p("a"), seq).map(|o| o.collapsed), Some(false));
        state.clear_collapse_override();
        assert!(state.pending_override_for(&p("a"), 0).is_none());
    }
}
