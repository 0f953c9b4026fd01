//! 折叠/展开：初始折叠判定、逐节点的折叠状态与过渡动画
//!
//! 动画以"内容高度"建模：开始时记录当前高度，在配置的时长内线性插值到
//! 目标高度（折叠为 0，展开为自然高度），结束后清除动画标记。

use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::model::shadow_tree::NodeData;

pub type FilterMethod = Rc<dyn Fn(&NodeData<'_>) -> bool>;

/// 初始折叠判定：布尔、层级阈值或自定义谓词
#[derive(Clone)]
pub enum CollapseFilter {
    Bool(bool),
    /// `level >= n` 的节点折叠
    Level(usize),
    Custom(FilterMethod),
}

impl CollapseFilter {
    pub fn custom(filter: impl Fn(&NodeData<'_>) -> bool + 'static) -> Self {
        Self::Custom(Rc::new(filter))
    }

    pub fn evaluate(&self, node: &NodeData<'_>) -> bool {
        match self {
            Self::Bool(collapsed) => *collapsed,
            Self::Level(threshold) => node.level >= *threshold,
            Self::Custom(filter) => filter(node),
        }
    }
}

impl Default for CollapseFilter {
    fn default() -> Self {
        Self::Bool(false)
    }
}

impl fmt::Debug for CollapseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Level(n) => write!(f, "Level({n})"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Collapsing,
    Expanding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollapseView {
    Expanded,
    Collapsed,
    Animating(Direction),
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: f32,
    direction: Direction,
    started_at: Instant,
    duration: Duration,
}

impl Transition {
    fn progress(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.duration
    }
}

/// 单个集合节点的折叠状态
#[derive(Debug, Clone)]
pub struct CollapseState {
    collapsed: bool,
    /// 单向锁存：一旦展开过，子节点在之后每次遍历都会派生
    has_been_opened: bool,
    natural_extent: f32,
    transition: Option<Transition>,
}

impl CollapseState {
    pub fn new(start_collapsed: bool) -> Self {
        Self {
            collapsed: start_collapsed,
            has_been_opened: !start_collapsed,
            natural_extent: 0.0,
            transition: None,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn has_been_opened(&self) -> bool {
        self.has_been_opened
    }

    pub fn mark_opened(&mut self) {
        self.has_been_opened = true;
    }

    /// 重新套用折叠谓词时使用：锁存按新结果重置
    pub fn reset_opened(&mut self, opened: bool) {
        self.has_been_opened = opened;
    }

    pub fn natural_extent(&self) -> f32 {
        self.natural_extent
    }

    pub fn set_natural_extent(&mut self, extent: f32) {
        self.natural_extent = extent;
    }

    pub fn is_animating(&self, now: Instant) -> bool {
        self.transition.is_some_and(|t| !t.is_finished(now))
    }

    /// 切换到目标折叠状态；时长为 0 时直接落到终态
    pub fn animate(&mut self, collapse: bool, now: Instant, duration: Duration) {
        if !collapse {
            self.has_been_opened = true;
        }
        if duration.is_zero() {
            self.collapsed = collapse;
            self.transition = None;
            return;
        }
        if collapse == self.collapsed && self.transition.is_none() {
            return;
        }
        // 动画途中再次触发：从当前插值高度出发
        let from = self.current_extent(now);
        self.collapsed = collapse;
        self.transition = Some(Transition {
            from,
            direction: if collapse {
                Direction::Collapsing
            } else {
                Direction::Expanding
            },
            started_at: now,
            duration,
        });
    }

    fn target_extent(&self) -> f32 {
        if self.collapsed {
            0.0
        } else {
            self.natural_extent
        }
    }

    pub fn current_extent(&self, now: Instant) -> f32 {
        match self.transition {
            Some(t) => {
                let p = t.progress(now);
                t.from + (self.target_extent() - t.from) * p
            }
            None => self.target_extent(),
        }
    }

    /// 清除已结束的动画；返回是否有动画在本次结束
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.transition {
            Some(t) if t.is_finished(now) => {
                self.transition = None;
                true
            }
            _ => false,
        }
    }

    pub fn view(&self, now: Instant) -> CollapseView {
        match self.transition {
            Some(t) if !t.is_finished(now) => CollapseView::Animating(t.direction),
            _ if self.collapsed => CollapseView::Collapsed,
            _ => CollapseView::Expanded,
        }
    }

    /// 内容高度上限；完全展开时不设上限
    pub fn max_extent(&self, now: Instant) -> Option<f32> {
        if self.is_animating(now) || self.collapsed {
            Some(self.current_extent(now))
        } else {
            None
        }
    }

    /// 只有折叠或动画中才裁剪溢出内容
    pub fn clip_overflow(&self, now: Instant) -> bool {
        self.collapsed || self.is_animating(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shadow_tree::NodeData;
    use serde_json::json;

    const MS_300: Duration = Duration::from_millis(300);

    #[test]
    fn test_filter_variants() {
        let data = json!({"a": {"b": 1}});
        let root = NodeData::root(&data, "root");
        let children = root.children(&Default::default());
        let child = &children[0];

        assert!(CollapseFilter::Bool(true).evaluate(&root));
        assert!(!CollapseFilter::default().evaluate(child));
        assert!(!CollapseFilter::Level(1).evaluate(&root));
        assert!(CollapseFilter::Level(1).evaluate(child));
        let by_key = CollapseFilter::custom(|n| n.key.as_key() == Some("a"));
        assert!(by_key.evaluate(child));
        assert!(!by_key.evaluate(&root));
    }

    #[test]
    fn test_initial_state_latches_opened() {
        let open = CollapseState::new(false);
        assert!(open.has_been_opened());
        let closed = CollapseState::new(true);
        assert!(!closed.has_been_opened());
        assert!(closed.is_collapsed());
    }

    #[test]
    fn test_collapse_animation_interpolates_and_finishes() {
        let t0 = Instant::now();
        let mut state = CollapseState::new(false);
        state.set_natural_extent(10.0);
        assert_eq!(state.max_extent(t0), None, "完全展开时不限制高度");
        assert!(!state.clip_overflow(t0));

        state.animate(true, t0, MS_300);
        assert_eq!(state.view(t0), CollapseView::Animating(Direction::Collapsing));
        let mid = state.current_extent(t0 + Duration::from_millis(150));
        assert!((mid - 5.0).abs() < 0.01, "中点高度应为一半: {mid}");
        assert!(state.clip_overflow(t0 + Duration::from_millis(150)));

        let end = t0 + MS_300;
        assert!(state.tick(end));
        assert_eq!(state.view(end), CollapseView::Collapsed);
        assert_eq!(state.max_extent(end), Some(0.0));
        assert!(state.clip_overflow(end), "折叠后仍需裁剪");
    }

    #[test]
    fn test_retrigger_mid_animation_reaches_terminal_state() {
        let t0 = Instant::now();
        let mut state = CollapseState::new(false);
        state.set_natural_extent(8.0);
        state.animate(true, t0, MS_300);
        let t1 = t0 + Duration::from_millis(75);
        state.animate(false, t1, MS_300);
        assert!((state.current_extent(t1) - 6.0).abs() < 0.01, "应从当前插值高度出发");
        assert_eq!(state.view(t1), CollapseView::Animating(Direction::Expanding));

        let end = t1 + MS_300;
        state.tick(end);
        assert_eq!(state.view(end), CollapseView::Expanded);
        assert!(!state.is_animating(end));
        assert_eq!(state.max_extent(end), None);
    }

    #[test]
    fn test_zero_duration_applies_immediately() {
        let t0 = Instant::now();
        let mut state = CollapseState::new(true);
        state.animate(false, t0, Duration::ZERO);
        assert_eq!(state.view(t0), CollapseView::Expanded);
        assert!(state.has_been_opened(), "展开即锁存");
        assert!(!state.tick(t0), "不产生中间帧");
    }

    #[test]
    fn test_same_target_is_noop() {
        let t0 = Instant::now();
        let mut state = CollapseState::new(true);
        state.animate(true, t0, MS_300);
        assert_eq!(state.view(t0), CollapseView::Collapsed);
        assert!(!state.has_been_opened());
    }
}
