//! 节点路径：从根到节点的键序列，是节点跨渲染的唯一稳定身份
//!
//! 对象成员用字符串键，数组元素用整数索引。值本身的地址不可信，
//! 每次渲染都按路径重新定位。

use std::fmt;

use jsonpath_rust::JsonPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::data_core::EditorError;

/// 路径中的一段
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key.as_str()),
            Self::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Key(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        Self::Key(value.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        Self::Key(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath {
    segments: Vec<PathSegment>,
}

impl NodePath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// 根路径 `[]`
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        self.segments.as_slice()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment.into());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self::new(self.segments[..self.segments.len() - 1].to_vec()))
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// 前缀判断（自身也算）
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// 严格后代判断
    pub fn is_descendant_of(&self, ancestor: &NodePath) -> bool {
        self.segments.len() > ancestor.segments.len() && self.starts_with(ancestor)
    }

    /// 以 `.` 连接的路径字符串，用作节点状态的键。
    /// 空字符串键替换为 `\u{0}`，否则拼接后会"消失"。
    pub fn to_path_string(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                PathSegment::Key(key) if key.is_empty() => '\u{0}'.to_string(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// RFC 9535 JSONPath 形式（`$`、`$.a`、`$['a b']`、`$.a[0]`）
    pub fn to_json_path(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => {
                    if is_identifier(key) {
                        out.push('.');
                        out.push_str(key);
                    } else {
                        out.push_str("['");
                        out.push_str(&key.replace('\\', "\\\\").replace('\'', "\\'"));
                        out.push_str("']");
                    }
                }
                PathSegment::Index(index) => {
                    out.push_str(&format!("[{index}]"));
                }
            }
        }
        out
    }

    /// 解析 `$.a.b[0]`、`a['b c'][2]` 等写法，`$` 前缀可省略
    pub fn parse(input: &str) -> Result<Self, EditorError> {
        let raw = input.trim();
        let raw = raw.strip_prefix('$').unwrap_or(raw);
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let chars: Vec<char> = raw.chars().collect();
        let mut idx = 0usize;
        let mut out = Vec::<PathSegment>::new();

        while idx < chars.len() {
            match chars[idx] {
                '.' => {
                    idx += 1;
                    out.push(PathSegment::Key(parse_key(&chars, &mut idx)?));
                }
                '[' => out.push(parse_bracket_segment(&chars, &mut idx)?),
                _ if out.is_empty() => out.push(PathSegment::Key(parse_key(&chars, &mut idx)?)),
                ch => {
                    return Err(EditorError::Path(format!(
                        "位置 {idx} 出现意外字符 '{ch}'"
                    )))
                }
            }
        }

        Ok(Self::new(out))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_path())
    }
}

impl From<Vec<PathSegment>> for NodePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self::new(segments)
    }
}

fn parse_key(chars: &[char], idx: &mut usize) -> Result<String, EditorError> {
    let start = *idx;
    while *idx < chars.len() && !matches!(chars[*idx], '.' | '[' | ']') {
        *idx += 1;
    }
    if *idx == start {
        return Err(EditorError::Path(format!("位置 {start} 缺少键名")));
    }
    Ok(chars[start..*idx].iter().collect())
}

fn parse_bracket_segment(chars: &[char], idx: &mut usize) -> Result<PathSegment, EditorError> {
    // 跳过 '['
    *idx += 1;
    let Some(&first) = chars.get(*idx) else {
        return Err(EditorError::Path("未闭合的 '['".into()));
    };

    if first == '"' || first == '\'' {
        *idx += 1;
        let mut key = String::new();
        let mut closed = false;
        while *idx < chars.len() {
            let c = chars[*idx];
            *idx += 1;
            if c == '\\' {
                let Some(&next) = chars.get(*idx) else {
                    return Err(EditorError::Path("引号键中的转义未结束".into()));
                };
                key.push(next);
                *idx += 1;
                continue;
            }
            if c == first {
                closed = true;
                break;
            }
            key.push(c);
        }
        if !closed || chars.get(*idx).copied() != Some(']') {
            return Err(EditorError::Path("引号键缺少结尾 ']'".into()));
        }
        *idx += 1;
        return Ok(PathSegment::Key(key));
    }

    let start = *idx;
    while *idx < chars.len() && chars[*idx] != ']' {
        *idx += 1;
    }
    if *idx >= chars.len() {
        return Err(EditorError::Path("未闭合的 '['".into()));
    }
    let raw: String = chars[start..*idx].iter().collect();
    *idx += 1;
    raw.trim()
        .parse::<usize>()
        .map(PathSegment::Index)
        .map_err(|_| EditorError::Path(format!("非法的数组索引: {raw}")))
}

fn is_identifier(input: &str) -> bool {
    let mut chars = input.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// 按路径定位值；键只匹配对象，索引只匹配数组
pub fn value_at<'a>(root: &'a Value, path: &NodePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key),
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        })
}

pub fn value_at_mut<'a>(root: &'a mut Value, path: &NodePath) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// 执行 JSONPath 查询，返回命中节点在树中的路径（按文档顺序）
pub fn select(root: &Value, query: &str) -> Result<Vec<NodePath>, EditorError> {
    let hits: Vec<&Value> = root
        .query(query)
        .map_err(|e| EditorError::JsonPath(e.to_string()))?;
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    fn walk(v: &Value, path: &NodePath, hits: &[&Value], out: &mut Vec<NodePath>) {
        if hits.iter().any(|hit| std::ptr::eq(*hit, v)) {
            out.push(path.clone());
        }
        match v {
            Value::Object(map) => {
                for (key, child) in map {
                    walk(child, &path.child(key.as_str()), hits, out);
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    walk(child, &path.child(index), hits, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(root, &NodePath::root(), &hits, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: Vec<PathSegment>) -> NodePath {
        NodePath::new(segments)
    }

    #[test]
    fn test_parse_dotted_and_bracket_path() {
        let parsed = NodePath::parse("$.users[0]['full name']").expect("路径应该可以解析");
        assert_eq!(
            parsed.segments(),
            &[
                PathSegment::Key("users".into()),
                PathSegment::Index(0),
                PathSegment::Key("full name".into()),
            ]
        );

        let bare = NodePath::parse("a.b[2]").expect("省略 $ 也应该可以解析");
        assert_eq!(bare.len(), 3);
        assert!(NodePath::parse("$").unwrap().is_root());
    }

    #[test]
    fn test_parse_rejects_malformed_path() {
        assert!(NodePath::parse("a[").is_err(), "未闭合的括号应该报错");
        assert!(NodePath::parse("a[x]").is_err(), "非数字索引应该报错");
        assert!(NodePath::parse("a..b").is_err(), "空键应该报错");
    }

    #[test]
    fn test_json_path_formatting_matches_parse() {
        let p = path(vec!["user".into(), "key with spaces".into(), 3.into(), "it's".into()]);
        assert_eq!(p.to_json_path(), "$.user['key with spaces'][3]['it\\'s']");
        assert_eq!(NodePath::parse(&p.to_json_path()).unwrap(), p);
        assert_eq!(NodePath::root().to_json_path(), "$");
    }

    #[test]
    fn test_path_string_keeps_empty_keys_visible() {
        let p = path(vec!["a".into(), "".into(), 1.into()]);
        assert_eq!(p.to_path_string(), "a.\u{0}.1");
        assert_eq!(NodePath::root().to_path_string(), "");
    }

    #[test]
    fn test_prefix_and_descendant_checks() {
        let a = path(vec!["a".into()]);
        let ab = a.child("b");
        assert!(ab.starts_with(&a));
        assert!(a.starts_with(&a));
        assert!(ab.is_descendant_of(&a));
        assert!(!a.is_descendant_of(&a));
        // "ab" 不是 "a" 的后代，即使字符串前缀相同
        assert!(!path(vec!["ab".into()]).starts_with(&a));
        assert_eq!(ab.parent(), Some(a));
        assert_eq!(NodePath::root().parent(), None);
    }

    #[test]
    fn test_value_at_respects_collection_kind() {
        let data = json!({"items": [10, {"id": 7}], "0": "zero"});
        assert_eq!(value_at(&data, &path(vec!["items".into(), 1.into(), "id".into()])), Some(&json!(7)));
        assert_eq!(value_at(&data, &path(vec!["0".into()])), Some(&json!("zero")));
        assert_eq!(value_at(&data, &path(vec![0.into()])), None, "对象不能按索引访问");
        assert_eq!(value_at(&data, &path(vec!["items".into(), "0".into()])), None);
        assert_eq!(value_at(&data, &NodePath::root()), Some(&data));
    }

    #[test]
    fn test_value_at_mut_replaces_in_place() {
        let mut data = json!({"a": [1, 2]});
        *value_at_mut(&mut data, &path(vec!["a".into(), 1.into()])).unwrap() = json!(5);
        assert_eq!(data, json!({"a": [1, 5]}));
    }

    #[test]
    fn test_select_returns_paths_of_matches() {
        let data = json!({"users": [{"name": "张三"}, {"name": "李四"}], "name": "root"});
        let found = select(&data, "$.users[*].name").expect("查询应该成功");
        assert_eq!(
            found,
            vec![
                path(vec!["users".into(), 0.into(), "name".into()]),
                path(vec!["users".into(), 1.into(), "name".into()]),
            ]
        );
        assert!(select(&data, "$.missing").unwrap().is_empty());
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let p = path(vec!["a".into(), 2.into()]);
        assert_eq!(serde_json::to_value(&p).unwrap(), json!(["a", 2]));
        let back: NodePath = serde_json::from_value(json!(["a", 2])).unwrap();
        assert_eq!(back, p);
    }
}
