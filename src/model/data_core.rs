//! TreeEditor：树编辑引擎的核心状态与全部节点动作
//!
//! 引擎不持有根值。每次渲染与每个动作都由调用方传入当前根值的引用，
//! 变更以请求形式交给宿主，宿主接受后由调用方在下一次渲染时传入新值。
//! 逐节点的本地状态（折叠、编辑缓冲、错误、忙碌标记）按 `NodePath` 保存，
//! 某次渲染未访问到的节点视为卸载，其状态与计时器随之清除。

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::collapse::{CollapseFilter, CollapseState, CollapseView};
use crate::model::config::EditorConfig;
use crate::model::drag::{drop_destination, DropPosition};
use crate::model::edit_session::{interpret_gesture, EditBuffer, EditMode, GestureAction, KeyGesture};
use crate::model::mutation::{ErrorCode, MutationKind, NodeError, Outcome, PendingMutation, TransientError};
use crate::model::path::{value_at, NodePath, PathSegment};
use crate::model::search::{SearchDebounce, SearchFilter};
use crate::model::shadow_tree::{preview_of, NodeData, NodeKind};
use crate::model::sort::KeySort;
use crate::model::tree_state::{EditTarget, TreeState};
use crate::vm::bridge::{ErrorEvent, TreeHost};

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("路径语法错误: {0}")]
    Path(String),
    #[error("JSONPath错误: {0}")]
    JsonPath(String),
    #[error("剪贴板错误: {0}")]
    Clipboard(String),
    #[error("状态错误: {0}")]
    State(String),
}

/// 节点当前可用的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Affordances {
    pub edit: bool,
    pub add: bool,
    pub delete: bool,
    pub drag: bool,
    pub key_edit: bool,
    pub drop_target: bool,
    pub copy: bool,
}

/// 一次渲染派生出的节点视图
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedNode {
    pub key: PathSegment,
    pub path: NodePath,
    pub level: usize,
    pub index: usize,
    pub size: usize,
    pub kind: NodeKind,
    /// 数组元素在关闭索引显示时隐藏键
    pub show_key: bool,
    pub preview: String,
    pub mode: EditMode,
    pub buffer: Option<EditBuffer>,
    /// 标量为 None
    pub collapse: Option<CollapseView>,
    pub max_extent: Option<f32>,
    pub clip_overflow: bool,
    /// None 表示子节点尚未派生（从未展开过，或正以文本形式编辑）
    pub children: Option<Vec<RenderedNode>>,
    pub error: Option<NodeError>,
    pub busy: bool,
    pub affordances: Affordances,
}

impl RenderedNode {
    /// 深度优先查找
    pub fn find(&self, path: &NodePath) -> Option<&RenderedNode> {
        if &self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children.as_ref()?.iter().find_map(|child| child.find(path))
    }

    /// 已派生的节点总数（含自身）
    pub fn count(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(RenderedNode::count).sum())
    }
}

#[derive(Debug, Clone, Default)]
struct NodeState {
    collapse: Option<CollapseState>,
    /// 已采纳的最后一次折叠覆盖
    override_seen: u64,
    collapse_generation: u64,
    buffer: Option<EditBuffer>,
    key_buffer: Option<String>,
    error: Option<TransientError>,
    busy: bool,
}

impl NodeState {
    fn new(collapse_generation: u64) -> Self {
        Self {
            collapse_generation,
            ..Self::default()
        }
    }
}

struct RenderPass {
    sort: KeySort,
    filter: SearchFilter,
    search_text: String,
    now: Instant,
    visited: HashSet<NodePath>,
}

pub struct TreeEditor<H: TreeHost> {
    config: EditorConfig,
    host: H,
    tree_state: TreeState,
    nodes: HashMap<NodePath, NodeState>,
    search: SearchDebounce,
    pending: Vec<PendingMutation>,
    /// 折叠谓词每次替换时递增，挂载中的节点据此重新判定
    collapse_generation: u64,
}

impl<H: TreeHost> TreeEditor<H> {
    pub fn new(config: EditorConfig, host: H) -> Self {
        let search = SearchDebounce::new(config.search_debounce_time);
        Self {
            config,
            host,
            tree_state: TreeState::new(),
            nodes: HashMap::new(),
            search,
            pending: Vec::new(),
            collapse_generation: 0,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn tree_state(&self) -> &TreeState {
        &self.tree_state
    }

    /// 当前生效（防抖后）的搜索文本
    pub fn search_text(&self) -> &str {
        self.search.applied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_busy(&self, path: &NodePath) -> bool {
        self.state(path).is_some_and(|s| s.busy)
    }

    pub fn node_error(&self, path: &NodePath) -> Option<&NodeError> {
        self.state(path).and_then(|s| s.error.as_ref()).map(|e| &e.error)
    }

    pub fn buffer(&self, path: &NodePath) -> Option<&EditBuffer> {
        self.state(path).and_then(|s| s.buffer.as_ref())
    }

    pub fn key_buffer(&self, path: &NodePath) -> Option<&str> {
        self.state(path).and_then(|s| s.key_buffer.as_deref())
    }

    pub fn edit_mode(&self, path: &NodePath) -> EditMode {
        EditMode::from(
            self.tree_state
                .editing()
                .filter(|slot| &slot.path == path)
                .map(|slot| slot.target),
        )
    }

    fn state(&self, path: &NodePath) -> Option<&NodeState> {
        self.nodes.get(path)
    }

    fn locate<'a>(&self, root: &'a Value, path: &NodePath) -> Option<NodeData<'a>> {
        NodeData::locate(root, path, &self.config.root_name, &self.config.key_sort)
    }

    // ---------------------------------------------------------------
    // 渲染
    // ---------------------------------------------------------------

    /// 执行一次遍历，派生可见节点树。根节点永远可见
    pub fn render(&mut self, root: &Value, now: Instant) -> RenderedNode {
        let started = Instant::now();
        let mut pass = RenderPass {
            sort: self.config.key_sort.clone(),
            filter: self.config.search_filter.clone(),
            search_text: self.search.applied().to_string(),
            now,
            visited: HashSet::new(),
        };
        let node = NodeData::root(root, &self.config.root_name);
        let (rendered, _) = self.render_node(&node, &mut pass);

        let before = self.nodes.len();
        self.nodes.retain(|key, _| pass.visited.contains(key));
        let torn_down = before - self.nodes.len();
        tracing::debug!(
            "渲染完成: {} 个节点, 卸载 {} 个, 耗时 {}us",
            pass.visited.len(),
            torn_down,
            started.elapsed().as_micros()
        );
        rendered
    }

    fn render_node(&mut self, node: &NodeData<'_>, pass: &mut RenderPass) -> (RenderedNode, f32) {
        pass.visited.insert(node.path.clone());

        let mode = self.edit_mode(&node.path);
        let editing_value = mode == EditMode::EditingValue;
        let unconstrained = node.is_collection() && self.tree_state.are_children_being_edited(&node.path);
        let materialize = self.prepare_node(node, editing_value, unconstrained, pass.now);

        let mut natural = 0.0;
        let children = if materialize {
            let mut rendered = Vec::new();
            for child in node.children(&pass.sort) {
                if !pass.filter.is_visible(&child, &pass.search_text) {
                    continue;
                }
                let (child_view, rows) = self.render_node(&child, pass);
                natural += rows;
                rendered.push(child_view);
            }
            Some(rendered)
        } else {
            None
        };

        let affordances = self.affordances(node);
        let now = pass.now;
        let state = self.nodes.entry(node.path.clone()).or_default();
        let (collapse, max_extent, clip_overflow) = match state.collapse.as_mut() {
            Some(c) => {
                c.set_natural_extent(natural);
                if unconstrained {
                    (Some(CollapseView::Expanded), None, false)
                } else {
                    (Some(c.view(now)), c.max_extent(now), c.clip_overflow(now))
                }
            }
            None => (None, None, false),
        };
        let rows = 1.0 + if collapse.is_some() { max_extent.unwrap_or(natural) } else { 0.0 };

        let busy = state.busy;
        let rendered = RenderedNode {
            key: node.key.clone(),
            path: node.path.clone(),
            level: node.level,
            index: node.index,
            size: node.size,
            kind: node.kind(),
            show_key: node.path.is_root() || !node.in_array() || self.config.show_array_indices,
            preview: preview_of(
                node.value,
                self.config.string_truncate,
                self.config.show_count.shows(collapse == Some(CollapseView::Collapsed)),
            ),
            mode,
            buffer: if mode == EditMode::Viewing { None } else { state.buffer.clone() },
            collapse,
            max_extent,
            clip_overflow,
            children,
            error: state.error.as_ref().map(|e| e.error.clone()),
            busy,
            affordances: Affordances {
                edit: affordances.edit && !busy,
                delete: affordances.delete && !busy,
                key_edit: affordances.key_edit && !busy,
                ..affordances
            },
        };
        (rendered, rows)
    }

    /// 挂载或更新节点状态，返回是否需要派生子节点
    fn prepare_node(
        &mut self,
        node: &NodeData<'_>,
        editing_value: bool,
        unconstrained: bool,
        now: Instant,
    ) -> bool {
        let duration = self.config.collapse_animation_time;
        let generation = self.collapse_generation;
        // 折叠谓词替换后重新判定，正在编辑的节点不折叠
        let reevaluated = self
            .nodes
            .get(&node.path)
            .is_some_and(|s| s.collapse.is_some() && s.collapse_generation != generation)
            .then(|| self.config.collapse.evaluate(node) && !self.tree_state.is_editing_exact(&node.path));

        self.ensure_state(node);
        let Some(state) = self.nodes.get_mut(&node.path) else {
            return false;
        };
        if state.error.as_ref().is_some_and(|e| now >= e.expires_at) {
            state.error = None;
        }
        if editing_value && state.buffer.is_none() {
            state.buffer = Some(EditBuffer::seed(node.value, |v| self.host.serialize(v)));
        }
        let Some(collapse) = state.collapse.as_mut() else {
            return false;
        };
        if let Some(should_collapse) = reevaluated {
            collapse.animate(should_collapse, now, duration);
            collapse.reset_opened(!should_collapse);
            state.collapse_generation = generation;
        }
        if let Some(o) = self.tree_state.pending_override_for(&node.path, state.override_seen) {
            tracing::debug!("节点 {} 采纳折叠覆盖: collapsed={}", node.path, o.collapsed);
            collapse.animate(o.collapsed, now, duration);
            state.override_seen = o.seq;
        }
        collapse.tick(now);
        if unconstrained {
            collapse.mark_opened();
        }
        collapse.has_been_opened() && !editing_value
    }

    /// 取得节点状态；集合节点首次出现时按覆盖或折叠谓词初始化
    fn ensure_state(&mut self, node: &NodeData<'_>) -> &mut NodeState {
        let needs_collapse = node.is_collection() && self.nodes.get(&node.path).map_or(true, |s| s.collapse.is_none());
        let initial = needs_collapse.then(|| self.initial_collapse(node));
        let generation = self.collapse_generation;
        let state = self
            .nodes
            .entry(node.path.clone())
            .or_insert_with(|| NodeState::new(generation));
        if let Some((collapse, seq)) = initial {
            state.collapse = Some(collapse);
            state.override_seen = state.override_seen.max(seq);
            state.collapse_generation = generation;
        }
        state
    }

    fn initial_collapse(&self, node: &NodeData<'_>) -> (CollapseState, u64) {
        match self.tree_state.pending_override_for(&node.path, 0) {
            Some(o) => (CollapseState::new(o.collapsed), o.seq),
            None => {
                let collapsed =
                    self.config.collapse.evaluate(node) && !self.tree_state.is_editing_exact(&node.path);
                (CollapseState::new(collapsed), 0)
            }
        }
    }

    fn affordances(&self, node: &NodeData<'_>) -> Affordances {
        let permissions = &self.config.permissions;
        let is_root = node.path.is_root();
        Affordances {
            edit: permissions.edit.allows(node),
            add: node.is_collection() && permissions.add.allows(node),
            delete: !is_root && permissions.delete.allows(node),
            drag: !is_root && permissions.drag.allows(node),
            key_edit: !is_root && !node.in_array() && permissions.key_edit.allows(node),
            drop_target: node.is_collection() && permissions.drop_target.allows(node),
            copy: self.config.enable_clipboard,
        }
    }

    // ---------------------------------------------------------------
    // 计时与清理
    // ---------------------------------------------------------------

    /// 推进时间：应用到期的搜索文本、结束动画、清除过期错误、轮询挂起请求。
    /// 返回是否有需要重新渲染的变化
    pub fn tick(&mut self, root: &Value, now: Instant) -> bool {
        let mut changed = false;
        if self.search.tick(now) {
            tracing::info!("搜索文本生效: {:?}", self.search.applied());
            changed = true;
        }
        for state in self.nodes.values_mut() {
            if let Some(collapse) = state.collapse.as_mut() {
                changed |= collapse.tick(now);
            }
            if state.error.as_ref().is_some_and(|e| now >= e.expires_at) {
                state.error = None;
                changed = true;
            }
        }
        changed |= !self.poll_pending(root, now).is_empty();
        changed
    }

    /// 轮询所有挂起的宿主请求，返回本次结算的 (发起节点, 结果)
    pub fn poll_pending(&mut self, root: &Value, now: Instant) -> Vec<(NodePath, Outcome)> {
        let mut settled = Vec::new();
        for mut pending in std::mem::take(&mut self.pending) {
            match pending.poll() {
                Some(result) => {
                    let origin = pending.origin.clone();
                    settled.push((origin, self.settle(root, pending, result, now)));
                }
                None => self.pending.push(pending),
            }
        }
        settled
    }

    /// 卸载整棵树：清除全部节点状态、计时器与挂起请求
    pub fn teardown(&mut self) {
        self.nodes.clear();
        self.search.cancel();
        self.tree_state.clear_editing();
        self.tree_state.set_drag_source(None);
        if !self.pending.is_empty() {
            tracing::warn!("卸载时丢弃 {} 个未结算的请求", self.pending.len());
        }
        self.pending.clear();
    }

    // ---------------------------------------------------------------
    // 折叠/展开
    // ---------------------------------------------------------------

    /// 切换折叠。带修饰键时写入路径覆盖，由该路径的节点在下次渲染时采纳
    pub fn toggle_collapse(&mut self, root: &Value, path: &NodePath, modifier: bool, now: Instant) -> Outcome {
        let Some(node) = self.locate(root, path) else {
            tracing::warn!("折叠切换的路径不存在: {}", path);
            return Outcome::NotPermitted;
        };
        if !node.is_collection() {
            return Outcome::NotPermitted;
        }
        if self.tree_state.is_editing_exact(path) {
            tracing::debug!("节点 {} 正在编辑，忽略折叠切换", path);
            return Outcome::NotPermitted;
        }
        let duration = self.config.collapse_animation_time;
        self.ensure_state(&node);
        let Some(collapse) = self.nodes.get_mut(path).and_then(|s| s.collapse.as_mut()) else {
            return Outcome::NotPermitted;
        };
        let target = !collapse.is_collapsed();
        if modifier {
            let seq = self.tree_state.set_collapse_override(path.clone(), target);
            tracing::info!("写入折叠覆盖 #{}: {} collapsed={}", seq, path, target);
        } else {
            collapse.animate(target, now, duration);
            self.tree_state.clear_collapse_override();
            tracing::debug!("切换折叠: {} collapsed={}", path, target);
        }
        Outcome::Applied
    }

    /// 替换折叠谓词，所有挂载中的节点在下次渲染时重新判定
    pub fn set_collapse_filter(&mut self, filter: CollapseFilter) {
        tracing::info!("折叠策略变更: {:?}", filter);
        self.config.collapse = filter;
        self.collapse_generation += 1;
    }

    pub fn expand_all(&mut self) {
        self.set_collapse_filter(CollapseFilter::Bool(false));
    }

    pub fn collapse_all(&mut self) {
        self.set_collapse_filter(CollapseFilter::Bool(true));
    }

    // ---------------------------------------------------------------
    // 搜索与排序
    // ---------------------------------------------------------------

    /// 输入搜索文本；返回是否立即生效（防抖时长为 0）
    pub fn set_search_text(&mut self, text: &str, now: Instant) -> bool {
        let applied = self.search.input(text, now);
        if applied {
            tracing::info!("搜索文本生效: {:?}", text);
        }
        applied
    }

    /// 修改防抖时长；已挂起的输入仍按原到期时间生效
    pub fn set_search_debounce_time(&mut self, delay: Duration) {
        self.config.search_debounce_time = delay;
        self.search.set_delay(delay);
    }

    pub fn set_search_filter(&mut self, filter: SearchFilter) {
        self.config.search_filter = filter;
    }

    pub fn set_key_sort(&mut self, sort: KeySort) {
        self.config.key_sort = sort;
    }

    /// 通过当前搜索条件的节点路径（不受折叠影响）
    pub fn matching_paths(&self, root: &Value) -> Vec<NodePath> {
        fn walk(node: &NodeData<'_>, filter: &SearchFilter, sort: &KeySort, text: &str, out: &mut Vec<NodePath>) {
            if !filter.is_visible(node, text) {
                return;
            }
            if !text.is_empty() && node.level > 0 {
                out.push(node.path.clone());
            }
            for child in node.children(sort) {
                walk(&child, filter, sort, text, out);
            }
        }
        let mut out = Vec::new();
        let node = NodeData::root(root, &self.config.root_name);
        walk(
            &node,
            &self.config.search_filter,
            &self.config.key_sort,
            self.search.applied(),
            &mut out,
        );
        out
    }

    // ---------------------------------------------------------------
    // 值编辑
    // ---------------------------------------------------------------

    pub fn start_edit(&mut self, root: &Value, path: &NodePath) -> Outcome {
        let Some(node) = self.locate(root, path) else {
            return Outcome::NotPermitted;
        };
        if self.is_busy(path) {
            return Outcome::Busy;
        }
        if self.tree_state.is_editing(path, EditTarget::Value) {
            return Outcome::Unchanged;
        }
        if !self.config.permissions.edit.allows(&node) {
            tracing::debug!("节点 {} 不允许编辑", path);
            return Outcome::NotPermitted;
        }
        if !self.tree_state.try_begin_edit(path, EditTarget::Value) {
            tracing::debug!("编辑槽已被占用，拒绝进入编辑: {}", path);
            return Outcome::NotPermitted;
        }
        let buffer = EditBuffer::seed(node.value, |v| self.host.serialize(v));
        let state = self.ensure_state(&node);
        state.buffer = Some(buffer);
        state.error = None;
        if let Some(collapse) = state.collapse.as_mut() {
            collapse.mark_opened();
        }
        tracing::info!("开始编辑: {}", path);
        Outcome::Applied
    }

    /// 更新编辑中的文本（值编辑写入值缓冲，键编辑写入键缓冲）
    pub fn set_buffer_text(&mut self, path: &NodePath, text: &str) -> Outcome {
        let target = match self.edit_mode(path) {
            EditMode::Viewing => return Outcome::NotPermitted,
            EditMode::EditingValue => EditTarget::Value,
            EditMode::EditingKey => EditTarget::Key,
        };
        let state = self.nodes.entry(path.clone()).or_default();
        match target {
            EditTarget::Value => match state.buffer.as_mut() {
                Some(buffer) => buffer.set_text(text),
                None => return Outcome::NotPermitted,
            },
            EditTarget::Key => state.key_buffer = Some(text.to_string()),
        }
        Outcome::Applied
    }

    /// 整体替换值缓冲，可用于切换编辑中的值类型
    pub fn set_buffer(&mut self, path: &NodePath, buffer: EditBuffer) -> Outcome {
        if !self.tree_state.is_editing(path, EditTarget::Value) {
            return Outcome::NotPermitted;
        }
        self.nodes.entry(path.clone()).or_default().buffer = Some(buffer);
        Outcome::Applied
    }

    pub fn step_number(&mut self, path: &NodePath, delta: f64) -> Outcome {
        if !self.tree_state.is_editing(path, EditTarget::Value) {
            return Outcome::NotPermitted;
        }
        let stepped = self
            .nodes
            .get_mut(path)
            .and_then(|s| s.buffer.as_mut())
            .is_some_and(|b| b.step_number(delta));
        if stepped {
            Outcome::Applied
        } else {
            Outcome::Unchanged
        }
    }

    /// 提交值编辑：解析失败留在编辑中；值未变直接退出；否则向宿主发起编辑请求
    pub fn commit_edit(&mut self, root: &Value, path: &NodePath, now: Instant) -> Outcome {
        if !self.tree_state.is_editing(path, EditTarget::Value) {
            return Outcome::NotPermitted;
        }
        if self.is_busy(path) {
            return Outcome::Busy;
        }
        let Some(buffer) = self.buffer(path).cloned() else {
            return Outcome::NotPermitted;
        };
        let candidate = match buffer.to_value(|text| self.host.parse(text)) {
            Ok(value) => value,
            Err(message) => {
                tracing::warn!("提交 {} 失败，内容无法解析: {}", path, message);
                return self.local_error(path, NodeError::new(ErrorCode::InvalidJson, message), now);
            }
        };
        if value_at(root, path) == Some(&candidate) {
            tracing::debug!("值未变化，不发起请求: {}", path);
            self.finish_edit(path);
            return Outcome::Unchanged;
        }
        let future = self.host.on_edit(candidate.clone(), path);
        let pending =
            PendingMutation::new(MutationKind::Edit, path.clone(), path.clone(), candidate, future).finishing_edit();
        self.submit(root, pending, now)
    }

    /// 取消编辑，一步完成且不会失败
    pub fn cancel_edit(&mut self, path: &NodePath) -> Outcome {
        if !self.tree_state.is_editing_exact(path) {
            return Outcome::Unchanged;
        }
        self.finish_edit(path);
        if let Some(state) = self.nodes.get_mut(path) {
            state.error = None;
        }
        tracing::info!("取消编辑: {}", path);
        Outcome::Applied
    }

    fn finish_edit(&mut self, path: &NodePath) {
        self.tree_state.end_edit(path);
        if let Some(state) = self.nodes.get_mut(path) {
            state.buffer = None;
            state.key_buffer = None;
        }
    }

    /// 把抽象手势映射为提交或取消
    pub fn handle_gesture(&mut self, root: &Value, path: &NodePath, gesture: KeyGesture, now: Instant) -> Outcome {
        let mode = self.edit_mode(path);
        let multiline = mode == EditMode::EditingValue && self.buffer(path).is_some_and(EditBuffer::is_multiline);
        match (interpret_gesture(gesture, multiline), mode) {
            (_, EditMode::Viewing) | (GestureAction::None, _) => Outcome::Unchanged,
            (GestureAction::Cancel, _) => self.cancel_edit(path),
            (GestureAction::InsertNewline, EditMode::EditingValue) => {
                let inserted = self
                    .nodes
                    .get_mut(path)
                    .and_then(|s| s.buffer.as_mut())
                    .is_some_and(EditBuffer::insert_newline);
                if inserted {
                    Outcome::Applied
                } else {
                    Outcome::Unchanged
                }
            }
            (GestureAction::InsertNewline, EditMode::EditingKey) => Outcome::Unchanged,
            (GestureAction::Commit, EditMode::EditingValue) => self.commit_edit(root, path, now),
            (GestureAction::Commit, EditMode::EditingKey) => {
                let new_key = self.key_buffer(path).unwrap_or_default().to_string();
                self.commit_key_edit(root, path, &new_key, now)
            }
        }
    }

    // ---------------------------------------------------------------
    // 键编辑（改名）
    // ---------------------------------------------------------------

    pub fn start_key_edit(&mut self, root: &Value, path: &NodePath) -> Outcome {
        let Some(node) = self.locate(root, path) else {
            return Outcome::NotPermitted;
        };
        let Some(current) = node.key.as_key().filter(|_| !path.is_root() && !node.in_array()) else {
            return Outcome::NotPermitted;
        };
        let current = current.to_string();
        if self.is_busy(path) {
            return Outcome::Busy;
        }
        if !self.config.permissions.key_edit.allows(&node) {
            return Outcome::NotPermitted;
        }
        if !self.tree_state.try_begin_edit(path, EditTarget::Key) {
            tracing::debug!("编辑槽已被占用，拒绝改名: {}", path);
            return Outcome::NotPermitted;
        }
        self.ensure_state(&node).key_buffer = Some(current);
        tracing::info!("开始改名: {}", path);
        Outcome::Applied
    }

    /// 提交改名：对父对象发起一次编辑，旧键移除、新键追加到末尾
    pub fn commit_key_edit(&mut self, root: &Value, path: &NodePath, new_key: &str, now: Instant) -> Outcome {
        if !self.tree_state.is_editing(path, EditTarget::Key) {
            return Outcome::NotPermitted;
        }
        let (Some(parent), Some(PathSegment::Key(old_key))) = (path.parent(), path.last()) else {
            return Outcome::NotPermitted;
        };
        if old_key == new_key {
            self.finish_edit(path);
            return Outcome::Unchanged;
        }
        let Some(Value::Object(map)) = value_at(root, &parent) else {
            self.finish_edit(path);
            return Outcome::NotPermitted;
        };
        if map.contains_key(new_key) {
            self.finish_edit(path);
            tracing::warn!("改名失败，键已存在: {} -> {}", path, new_key);
            return self.local_error(path, NodeError::new(ErrorCode::KeyExists, format!("键已存在: {new_key}")), now);
        }
        let mut renamed = map.clone();
        let Some(moved) = renamed.shift_remove(old_key.as_str()) else {
            self.finish_edit(path);
            return Outcome::NotPermitted;
        };
        renamed.insert(new_key.to_string(), moved);
        let renamed = Value::Object(renamed);
        self.finish_edit(path);
        tracing::info!("改名: {} -> {}", path, new_key);
        let future = self.host.on_edit(renamed.clone(), &parent);
        self.submit(root, PendingMutation::new(MutationKind::Edit, path.clone(), parent, renamed, future), now)
    }

    // ---------------------------------------------------------------
    // 结构变更
    // ---------------------------------------------------------------

    /// 直接替换某路径的值（不经过编辑会话）
    pub fn request_edit(&mut self, root: &Value, path: &NodePath, value: Value, now: Instant) -> Outcome {
        if value_at(root, path) == Some(&value) {
            return Outcome::Unchanged;
        }
        if self.is_busy(path) {
            return Outcome::Busy;
        }
        let future = self.host.on_edit(value.clone(), path);
        self.submit(root, PendingMutation::new(MutationKind::Edit, path.clone(), path.clone(), value, future), now)
    }

    /// 新增：数组目标索引必须等于当前长度，对象目标键不能已存在
    pub fn request_add(&mut self, root: &Value, path: &NodePath, value: Value, now: Instant) -> Outcome {
        let (Some(parent), Some(last)) = (path.parent(), path.last()) else {
            return Outcome::NotPermitted;
        };
        let check = match (value_at(root, &parent), last) {
            (Some(Value::Array(items)), PathSegment::Index(index)) if *index == items.len() => Ok(()),
            (Some(Value::Array(items)), _) => Err(NodeError::new(
                ErrorCode::AddError,
                format!("数组新增位置必须是 {}，实际为 {}", items.len(), last),
            )),
            (Some(Value::Object(map)), PathSegment::Key(key)) if map.contains_key(key) => {
                Err(NodeError::new(ErrorCode::KeyExists, format!("键已存在: {key}")))
            }
            (Some(Value::Object(_)), PathSegment::Key(_)) => Ok(()),
            _ => Err(NodeError::new(ErrorCode::AddError, format!("无效的新增位置: {path}"))),
        };
        if let Err(error) = check {
            tracing::warn!("新增被本地拒绝: {}", error);
            return self.local_error(&parent, error, now);
        }
        if self.is_busy(&parent) {
            return Outcome::Busy;
        }
        // 新增前强制展开目标集合
        if let Some(node) = self.locate(root, &parent) {
            let duration = self.config.collapse_animation_time;
            if let Some(collapse) = self.ensure_state(&node).collapse.as_mut() {
                collapse.animate(false, now, duration);
            }
        }
        let future = self.host.on_add(value.clone(), path);
        self.submit(root, PendingMutation::new(MutationKind::Add, parent, path.clone(), value, future), now)
    }

    /// 向集合追加子节点，初始值来自宿主的 default_value。对象需要提供键名
    pub fn add_child(&mut self, root: &Value, collection: &NodePath, key: Option<&str>, now: Instant) -> Outcome {
        let Some(node) = self.locate(root, collection) else {
            return Outcome::NotPermitted;
        };
        if !node.is_collection() || !self.config.permissions.add.allows(&node) {
            return Outcome::NotPermitted;
        }
        let target = match (node.value, key) {
            (Value::Array(items), _) => collection.child(items.len()),
            (Value::Object(_), Some(key)) => collection.child(key),
            _ => {
                return self.local_error(collection, NodeError::new(ErrorCode::AddError, "缺少新增的键名"), now);
            }
        };
        let value = self.host.default_value(&node);
        self.request_add(root, &target, value, now)
    }

    /// 删除节点；根节点永远不能删除
    pub fn delete(&mut self, root: &Value, path: &NodePath, now: Instant) -> Outcome {
        if path.is_root() {
            return Outcome::NotPermitted;
        }
        let Some(node) = self.locate(root, path) else {
            return Outcome::NotPermitted;
        };
        if !self.config.permissions.delete.allows(&node) {
            return Outcome::NotPermitted;
        }
        if self.is_busy(path) {
            return Outcome::Busy;
        }
        let attempted = node.value.clone();
        let future = self.host.on_delete(path);
        self.submit(root, PendingMutation::new(MutationKind::Delete, path.clone(), path.clone(), attempted, future), now)
    }

    /// 单个原子移动请求
    pub fn move_node(&mut self, root: &Value, source: &NodePath, destination: &NodePath, now: Instant) -> Outcome {
        if source.is_root() {
            return Outcome::NotPermitted;
        }
        if destination == source {
            return Outcome::Unchanged;
        }
        if destination.is_descendant_of(source) {
            return self.local_error(source, NodeError::new(ErrorCode::MoveError, "不能把节点移动到它自己的内部"), now);
        }
        let Some(attempted) = value_at(root, source).cloned() else {
            return self.local_error(source, NodeError::new(ErrorCode::MoveError, format!("源节点不存在: {source}")), now);
        };
        if self.is_busy(source) {
            return Outcome::Busy;
        }
        tracing::info!("移动: {} -> {}", source, destination);
        let future = self.host.on_move(source, destination);
        self.submit(root, PendingMutation::new(MutationKind::Move, source.clone(), source.clone(), attempted, future), now)
    }

    // ---------------------------------------------------------------
    // 拖拽
    // ---------------------------------------------------------------

    pub fn start_drag(&mut self, root: &Value, path: &NodePath) -> Outcome {
        if path.is_root() {
            return Outcome::NotPermitted;
        }
        let Some(node) = self.locate(root, path) else {
            return Outcome::NotPermitted;
        };
        if !self.config.permissions.drag.allows(&node) {
            return Outcome::NotPermitted;
        }
        self.tree_state.set_drag_source(Some(path.clone()));
        tracing::debug!("开始拖拽: {}", path);
        Outcome::Applied
    }

    pub fn cancel_drag(&mut self) {
        self.tree_state.set_drag_source(None);
    }

    /// 放下拖拽源：计算目标路径并发起移动请求
    pub fn drop_on(&mut self, root: &Value, target: &NodePath, position: DropPosition, now: Instant) -> Outcome {
        let Some(source) = self.tree_state.drag_source().cloned() else {
            return Outcome::NotPermitted;
        };
        self.tree_state.set_drag_source(None);

        let receiving = match (position, target.parent()) {
            (DropPosition::Onto, _) | (_, None) => target.clone(),
            (_, Some(parent)) => parent,
        };
        let allowed = self
            .locate(root, &receiving)
            .is_some_and(|node| !node.is_collection() || self.config.permissions.drop_target.allows(&node));
        if !allowed {
            tracing::debug!("{} 不接受拖放", receiving);
            return Outcome::NotPermitted;
        }
        match drop_destination(root, &source, target, position) {
            Ok(None) => Outcome::Unchanged,
            Ok(Some(destination)) => {
                tracing::info!("拖放: {} -> {} ({:?} {})", source, destination, position, target);
                self.move_node(root, &source, &destination, now)
            }
            Err(error) => {
                tracing::warn!("拖放被本地拒绝: {}", error);
                self.local_error(&source, error, now)
            }
        }
    }

    // ---------------------------------------------------------------
    // 剪贴板
    // ---------------------------------------------------------------

    /// 序列化节点值并交给宿主复制，返回复制的文本
    pub fn copy_node(&mut self, root: &Value, path: &NodePath) -> Result<String, EditorError> {
        if !self.config.enable_clipboard {
            return Err(EditorError::State("剪贴板功能未启用".into()));
        }
        let value = value_at(root, path).ok_or_else(|| EditorError::Path(format!("路径不存在: {path}")))?;
        let text = self.host.serialize(value);
        self.host.copy(&text).map_err(EditorError::Clipboard)?;
        tracing::info!("已复制节点 {} ({} 字符)", path, text.chars().count());
        Ok(text)
    }

    // ---------------------------------------------------------------
    // 请求结算
    // ---------------------------------------------------------------

    fn submit(&mut self, root: &Value, mut pending: PendingMutation, now: Instant) -> Outcome {
        tracing::info!("发起 {:?} 请求: {}", pending.kind, pending.path);
        self.nodes.entry(pending.origin.clone()).or_default().busy = true;
        match pending.poll() {
            Some(result) => self.settle(root, pending, result, now),
            None => {
                self.pending.push(pending);
                Outcome::Pending
            }
        }
    }

    fn settle(&mut self, root: &Value, pending: PendingMutation, result: Result<(), String>, now: Instant) -> Outcome {
        if let Some(state) = self.nodes.get_mut(&pending.origin) {
            state.busy = false;
        }
        match result {
            Ok(()) => {
                tracing::info!("{:?} 请求已接受: {}", pending.kind, pending.path);
                if pending.finish_edit && self.tree_state.is_editing(&pending.origin, EditTarget::Value) {
                    self.finish_edit(&pending.origin);
                }
                Outcome::Accepted
            }
            Err(message) => {
                let error = NodeError::new(pending.kind.error_code(), message);
                tracing::error!("{:?} 请求被拒绝: {} ({})", pending.kind, pending.path, error);
                let event = ErrorEvent {
                    code: error.code,
                    message: error.message.clone(),
                    path: pending.path,
                    attempted_value: pending.attempted,
                    current_full_value: root.clone(),
                };
                self.host.on_error(&event);
                self.show_error(&pending.origin, error.clone(), now);
                Outcome::Rejected(error)
            }
        }
    }

    /// 本地错误：只显示在发起节点，不交给宿主
    fn local_error(&mut self, path: &NodePath, error: NodeError, now: Instant) -> Outcome {
        self.show_error(path, error.clone(), now);
        Outcome::Rejected(error)
    }

    fn show_error(&mut self, path: &NodePath, error: NodeError, now: Instant) {
        let expires_at = now + self.config.error_display_time;
        self.nodes.entry(path.clone()).or_default().error = Some(TransientError { error, expires_at });
    }
}
