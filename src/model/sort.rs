//! 键排序：只改变对象成员的展示顺序，不改动值本身

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

pub type CompareMethod = Rc<dyn Fn(&str, &str) -> Ordering>;

#[derive(Clone, Default)]
pub enum KeySort {
    /// 保持插入顺序
    #[default]
    Off,
    /// 按字典序
    Lexicographic,
    Custom(CompareMethod),
}

impl KeySort {
    pub fn custom(compare: impl Fn(&str, &str) -> Ordering + 'static) -> Self {
        Self::Custom(Rc::new(compare))
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Off)
    }

    /// 按策略列出对象的键值对。只接受对象：数组顺序有语义，永不重排
    pub fn ordered<'a>(&self, map: &'a Map<String, Value>) -> Vec<(&'a str, &'a Value)> {
        let mut entries: Vec<(&str, &Value)> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
        match self {
            Self::Off => {}
            Self::Lexicographic => entries.sort_by(|a, b| a.0.cmp(b.0)),
            Self::Custom(compare) => entries.sort_by(|a, b| compare(a.0, b.0)),
        }
        entries
    }
}

impl fmt::Debug for KeySort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("Off"),
            Self::Lexicographic => f.write_str("Lexicographic"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<bool> for KeySort {
    fn from(value: bool) -> Self {
        if value {
            Self::Lexicographic
        } else {
            Self::Off
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(sort: &KeySort, data: &Value) -> Vec<String> {
        sort.ordered(data.as_object().unwrap())
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect()
    }

    #[test]
    fn test_off_keeps_insertion_order() {
        let data = json!({"b": 1, "a": 2, "c": 3});
        assert_eq!(keys(&KeySort::Off, &data), vec!["b", "a", "c"]);
        assert!(!KeySort::Off.is_active());
    }

    #[test]
    fn test_lexicographic_and_custom_order() {
        let data = json!({"b": 1, "a": 2, "c": 3});
        assert_eq!(keys(&KeySort::from(true), &data), vec!["a", "b", "c"]);
        let reverse = KeySort::custom(|a, b| b.cmp(a));
        assert_eq!(keys(&reverse, &data), vec!["c", "b", "a"]);
        // 原值不受影响
        assert_eq!(data.as_object().unwrap().keys().next().map(String::as_str), Some("b"));
    }
}
