//! 影子树（Shadow Tree）：每次遍历重新派生的节点描述，只借用原始值，不复制

use serde::Serialize;
use serde_json::Value;

use crate::model::path::{NodePath, PathSegment};
use crate::model::sort::KeySort;

/// 节点类型（与 UI 展示解耦）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
    /// 路径无法解析到值
    Invalid,
}

impl NodeKind {
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(_)) => Self::Object,
            Some(Value::Array(_)) => Self::Array,
            Some(Value::String(_)) => Self::String,
            Some(Value::Number(_)) => Self::Number,
            Some(Value::Bool(_)) => Self::Boolean,
            Some(Value::Null) => Self::Null,
            None => Self::Invalid,
        }
    }

    pub fn is_collection(self) -> bool {
        matches!(self, Self::Object | Self::Array)
    }
}

/// 子元素数量；标量与无效值记为 1
pub fn size_of(value: &Value) -> usize {
    match value {
        Value::Object(m) => m.len(),
        Value::Array(a) => a.len(),
        _ => 1,
    }
}

#[derive(Debug, Clone)]
pub struct NodeData<'a> {
    /// 在父级中的键名或索引；根节点使用配置的根名
    pub key: PathSegment,
    pub value: &'a Value,
    pub path: NodePath,
    pub level: usize,
    /// 在父级展示顺序中的位置
    pub index: usize,
    pub size: usize,
    /// 直接父集合的原始值（非拥有）
    pub parent_data: Option<&'a Value>,
    /// 根值（非拥有）
    pub full_data: &'a Value,
}

impl<'a> NodeData<'a> {
    pub fn root(data: &'a Value, root_name: &str) -> Self {
        Self {
            key: PathSegment::Key(root_name.to_string()),
            value: data,
            path: NodePath::root(),
            level: 0,
            index: 0,
            size: size_of(data),
            parent_data: None,
            full_data: data,
        }
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::of(Some(self.value))
    }

    pub fn is_collection(&self) -> bool {
        self.kind().is_collection()
    }

    /// 父级是否为数组（决定键是否可改名、是否显示索引）
    pub fn in_array(&self) -> bool {
        matches!(self.key, PathSegment::Index(_)) && !self.path.is_root()
    }

    fn child(&self, key: PathSegment, value: &'a Value, index: usize) -> NodeData<'a> {
        NodeData {
            path: self.path.child(key.clone()),
            key,
            value,
            level: self.level + 1,
            index,
            size: size_of(value),
            parent_data: Some(self.value),
            full_data: self.full_data,
        }
    }

    /// 按展示顺序派生子节点描述
    pub fn children(&self, sort: &KeySort) -> Vec<NodeData<'a>> {
        match self.value {
            Value::Object(map) => sort
                .ordered(map)
                .into_iter()
                .enumerate()
                .map(|(index, (key, value))| self.child(PathSegment::Key(key.to_string()), value, index))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, value)| self.child(PathSegment::Index(index), value, index))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 沿路径从根派生出目标节点的描述
    pub fn locate(full_data: &'a Value, path: &NodePath, root_name: &str, sort: &KeySort) -> Option<Self> {
        let mut current = Self::root(full_data, root_name);
        for segment in path.segments() {
            current = current
                .children(sort)
                .into_iter()
                .find(|child| &child.key == segment)?;
        }
        Some(current)
    }
}

/// 截断字符串，超长时以 `...` 结尾
pub fn truncate(s: &str, length: usize) -> String {
    if s.chars().count() < length {
        return s.to_string();
    }
    let kept: String = s.chars().take(length.saturating_sub(2)).collect();
    format!("{}...", kept.trim())
}

/// 轻量预览（字符串截断、数字/布尔/空的简短描述）。`with_count` 控制集合是否附带元素数量
pub fn preview_of(v: &Value, string_truncate: usize, with_count: bool) -> String {
    match v {
        Value::Object(_) | Value::Array(_) if !with_count => collection_brackets(v).to_string(),
        Value::String(s) => format!("\"{}\"", truncate(s, string_truncate)),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Object(m) => format!("{{..}} ({} keys)", m.len()),
        Value::Array(a) => format!("[..] ({} items)", a.len()),
    }
}

fn collection_brackets(v: &Value) -> &'static str {
    if v.is_array() {
        "[..]"
    } else {
        "{..}"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect_all<'a>(node: &NodeData<'a>, out: &mut Vec<NodeData<'a>>) {
        out.push(node.clone());
        for child in node.children(&KeySort::Off) {
            collect_all(&child, out);
        }
    }

    #[test]
    fn test_path_length_equals_level_everywhere() {
        let json = json!({
            "user": {"profile": {"name": "张三", "tags": ["a", "b"]}},
            "items": [1, {"id": 2}, [3]]
        });
        let mut all = Vec::new();
        collect_all(&NodeData::root(&json, "root"), &mut all);

        assert_eq!(all.len(), 13);
        for node in &all {
            assert_eq!(node.path.len(), node.level, "路径长度应该等于层级: {}", node.path);
            if node.level > 0 {
                assert_eq!(node.path.last(), Some(&node.key), "非根节点的路径末段应该等于键");
                assert!(std::ptr::eq(node.full_data, &json), "fullData 应该指向根值");
            }
        }
    }

    #[test]
    fn test_child_descriptor_fields() {
        let json = json!({"list": ["x", {"k": 1}]});
        let root = NodeData::root(&json, "root");
        assert_eq!(root.size, 1);
        assert_eq!(root.key, PathSegment::Key("root".into()));
        assert!(root.parent_data.is_none());

        let top = root.children(&KeySort::Off);
        let list = &top[0];
        let items = list.children(&KeySort::Off);
        assert_eq!(items[1].key, PathSegment::Index(1));
        assert_eq!(items[1].index, 1);
        assert_eq!(items[1].size, 1, "单键对象的 size 为 1");
        assert_eq!(items[0].size, 1, "标量的 size 为 1");
        assert!(std::ptr::eq(items[1].parent_data.unwrap(), list.value));
        assert!(items[1].in_array());
        assert!(!list.in_array());
    }

    #[test]
    fn test_children_follow_sort_but_arrays_do_not() {
        let json = json!({"b": ["z", "y"], "a": 1});
        let root = NodeData::root(&json, "root");
        let sorted: Vec<PathSegment> = root
            .children(&KeySort::Lexicographic)
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(sorted, vec![PathSegment::Key("a".into()), PathSegment::Key("b".into())]);

        let b = root
            .children(&KeySort::Lexicographic)
            .into_iter()
            .find(|c| c.key == PathSegment::Key("b".into()))
            .unwrap();
        let values: Vec<&Value> = b.children(&KeySort::Lexicographic).iter().map(|c| c.value).collect();
        assert_eq!(values, vec![&json!("z"), &json!("y")], "数组保持原始顺序");
    }

    #[test]
    fn test_locate_matches_traversal() {
        let json = json!({"a": {"b": [true, null]}});
        let path = NodePath::new(vec!["a".into(), "b".into(), 1.into()]);
        let node = NodeData::locate(&json, &path, "root", &KeySort::Off).expect("路径应该存在");
        assert_eq!(node.level, 3);
        assert_eq!(node.kind(), NodeKind::Null);
        assert_eq!(node.index, 1);
        assert!(NodeData::locate(&json, &NodePath::new(vec!["x".into()]), "root", &KeySort::Off).is_none());
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(NodeKind::of(Some(&json!({}))), NodeKind::Object);
        assert_eq!(NodeKind::of(Some(&json!([]))), NodeKind::Array);
        assert_eq!(NodeKind::of(Some(&json!("s"))), NodeKind::String);
        assert_eq!(NodeKind::of(Some(&json!(1.5))), NodeKind::Number);
        assert_eq!(NodeKind::of(Some(&json!(false))), NodeKind::Boolean);
        assert_eq!(NodeKind::of(Some(&Value::Null)), NodeKind::Null);
        assert_eq!(NodeKind::of(None), NodeKind::Invalid);
        assert!(NodeKind::Array.is_collection());
        assert!(!NodeKind::Invalid.is_collection());
    }

    #[test]
    fn test_node_preview_generation() {
        let long = "这是一个非常长的字符串，应该被截断以便在预览中显示，不应该显示完整内容";
        assert_eq!(preview_of(&json!("短文本"), 250, true), "\"短文本\"");
        assert!(preview_of(&json!(long), 10, true).ends_with("...\""));
        assert_eq!(preview_of(&json!(42), 250, false), "42");
        assert_eq!(preview_of(&json!(true), 250, true), "true");
        assert_eq!(preview_of(&Value::Null, 250, true), "null");
        assert_eq!(preview_of(&json!({"nested": "value"}), 250, true), "{..} (1 keys)");
        assert_eq!(preview_of(&json!([1, 2, 3, 4, 5]), 250, true), "[..] (5 items)");
        assert_eq!(preview_of(&json!({"nested": "value"}), 250, false), "{..}");
        assert_eq!(preview_of(&json!([1]), 250, false), "[..]");
    }
}
