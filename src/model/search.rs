//! 搜索过滤：节点可见性谓词与输入防抖

use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::model::path::PathSegment;
use crate::model::shadow_tree::NodeData;

pub type SearchFilterMethod = Rc<dyn Fn(&NodeData<'_>, &str) -> bool>;

#[derive(Clone, Default)]
pub enum SearchFilter {
    /// 匹配值
    #[default]
    Value,
    /// 匹配键名（数组索引按数字文本匹配）
    Key,
    /// 键或值任一匹配
    All,
    Custom(SearchFilterMethod),
}

impl SearchFilter {
    pub fn custom(filter: impl Fn(&NodeData<'_>, &str) -> bool + 'static) -> Self {
        Self::Custom(Rc::new(filter))
    }

    /// 空查询时全部可见
    pub fn matches(&self, node: &NodeData<'_>, search_text: &str) -> bool {
        if search_text.is_empty() {
            return true;
        }
        match self {
            Self::Value => match_node(node, search_text),
            Self::Key => match_node_key(node, search_text),
            Self::All => match_node(node, search_text) || match_node_key(node, search_text),
            Self::Custom(filter) => filter(node, search_text),
        }
    }

    /// 节点是否应当渲染：根节点永不隐藏，其余未通过即排除
    pub fn is_visible(&self, node: &NodeData<'_>, search_text: &str) -> bool {
        node.level == 0 || self.matches(node, search_text)
    }
}

impl fmt::Debug for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("Value"),
            Self::Key => f.write_str("Key"),
            Self::All => f.write_str("All"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// 值匹配：字符串忽略大小写包含；数字与布尔按文本；`null` 匹配其子串
pub fn match_node(node: &NodeData<'_>, search_text: &str) -> bool {
    let needle = search_text.to_lowercase();
    match node.value {
        Value::Null => "null".contains(&needle),
        Value::String(s) => s.to_lowercase().contains(&needle),
        Value::Number(n) => n.to_string().contains(&needle),
        Value::Bool(b) => b.to_string().contains(&needle),
        Value::Object(_) | Value::Array(_) => false,
    }
}

pub fn match_node_key(node: &NodeData<'_>, search_text: &str) -> bool {
    let needle = search_text.to_lowercase();
    match &node.key {
        PathSegment::Key(key) => key.to_lowercase().contains(&needle),
        PathSegment::Index(index) => index.to_string().contains(&needle),
    }
}

/// 搜索输入防抖：谓词只观察到防抖后的文本
#[derive(Debug, Clone)]
pub struct SearchDebounce {
    delay: Duration,
    applied: String,
    pending: Option<(String, Instant)>,
}

impl SearchDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            applied: String::new(),
            pending: None,
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// 当前生效的查询文本
    pub fn applied(&self) -> &str {
        &self.applied
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// 新输入重启计时；延迟为 0 时立即生效。返回生效文本是否变化
    pub fn input(&mut self, text: &str, now: Instant) -> bool {
        if self.delay.is_zero() {
            self.pending = None;
            return self.apply(text.to_string());
        }
        self.pending = Some((text.to_string(), now + self.delay));
        false
    }

    /// 到期则应用挂起的文本；返回生效文本是否变化
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.pending.take() {
            Some((text, deadline)) if now >= deadline => self.apply(text),
            other => {
                self.pending = other;
                false
            }
        }
    }

    /// 取消挂起的计时
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    fn apply(&mut self, text: String) -> bool {
        if self.applied == text {
            return false;
        }
        self.applied = text;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::path::NodePath;
    use crate::model::sort::KeySort;
    use serde_json::json;

    fn visible_keys(filter: &SearchFilter, data: &Value, text: &str) -> Vec<String> {
        fn walk(node: &NodeData<'_>, filter: &SearchFilter, text: &str, out: &mut Vec<String>) {
            if !filter.is_visible(node, text) {
                return;
            }
            out.push(node.path.to_path_string());
            for child in node.children(&KeySort::Off) {
                walk(&child, filter, text, out);
            }
        }
        let mut out = Vec::new();
        walk(&NodeData::root(data, "root"), filter, text, &mut out);
        out
    }

    #[test]
    fn test_key_search_excludes_non_matching_subtrees() {
        let data = json!({"a": {"b": 1}, "c": 2});
        let shown = visible_keys(&SearchFilter::Key, &data, "c");
        assert_eq!(shown, vec!["".to_string(), "c".to_string()], "只保留根与 c");
    }

    #[test]
    fn test_no_ancestor_preservation() {
        let data = json!({"outer": {"needle": 1}});
        let shown = visible_keys(&SearchFilter::Key, &data, "needle");
        assert_eq!(shown, vec!["".to_string()], "祖先未匹配时后代不会被遍历");
    }

    #[test]
    fn test_value_search_modes() {
        let data = json!({"name": "Alice", "age": 30, "ok": true, "none": null});
        assert_eq!(visible_keys(&SearchFilter::Value, &data, "alice"), vec!["", "name"]);
        assert_eq!(visible_keys(&SearchFilter::Value, &data, "3"), vec!["", "age"]);
        assert_eq!(visible_keys(&SearchFilter::Value, &data, "tru"), vec!["", "ok"]);
        assert_eq!(visible_keys(&SearchFilter::Value, &data, "nul"), vec!["", "none"]);
        assert_eq!(visible_keys(&SearchFilter::All, &data, "a"), vec!["", "name", "age"]);
    }

    #[test]
    fn test_empty_query_shows_everything() {
        let data = json!({"a": {"b": 1}, "c": [1, 2]});
        assert_eq!(visible_keys(&SearchFilter::Key, &data, "").len(), 6);
    }

    #[test]
    fn test_array_index_key_match_and_custom_filter() {
        let data = json!({"list": ["x", "y"]});
        let path = NodePath::parse("list[1]").unwrap();
        let node = NodeData::locate(&data, &path, "root", &KeySort::Off).unwrap();
        assert!(match_node_key(&node, "1"));
        assert!(!match_node_key(&node, "0"));

        let deep = SearchFilter::custom(|n, _| n.level <= 1);
        assert_eq!(visible_keys(&deep, &data, "whatever"), vec!["", "list"]);
    }

    #[test]
    fn test_debounce_applies_after_delay_and_restarts() {
        let t0 = Instant::now();
        let mut debounce = SearchDebounce::new(Duration::from_millis(350));
        assert!(!debounce.input("ab", t0));
        assert_eq!(debounce.applied(), "", "防抖期间不生效");

        // 重新输入会重启计时
        debounce.input("abc", t0 + Duration::from_millis(300));
        assert!(!debounce.tick(t0 + Duration::from_millis(400)));
        assert!(debounce.tick(t0 + Duration::from_millis(650)));
        assert_eq!(debounce.applied(), "abc");
        assert!(!debounce.is_pending());
    }

    #[test]
    fn test_debounce_cancel_and_zero_delay() {
        let t0 = Instant::now();
        let mut debounce = SearchDebounce::new(Duration::from_millis(100));
        debounce.input("x", t0);
        debounce.cancel();
        assert!(!debounce.tick(t0 + Duration::from_secs(1)));
        assert_eq!(debounce.applied(), "");

        let mut immediate = SearchDebounce::new(Duration::ZERO);
        assert!(immediate.input("now", t0));
        assert_eq!(immediate.applied(), "now");
    }
}
