//! 拖拽重排：落点判定与目标路径计算
//!
//! 数组目标索引以"移除源节点之后"的数组为准，宿主按先删后插执行即可。

use serde::Serialize;
use serde_json::Value;

use crate::model::mutation::{ErrorCode, NodeError};
use crate::model::path::{value_at, NodePath, PathSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPosition {
    Above,
    Below,
    /// 放入集合内部（追加到末尾）
    Onto,
}

/// 按指针在行内的相对位置判定落点：集合行上下各留四分之一，标量行对半分
pub fn resolve_drop_position(offset: f32, row_extent: f32, is_collection: bool) -> DropPosition {
    if row_extent <= 0.0 {
        return if is_collection {
            DropPosition::Onto
        } else {
            DropPosition::Below
        };
    }
    let ratio = (offset / row_extent).clamp(0.0, 1.0);
    if is_collection {
        if ratio < 0.25 {
            DropPosition::Above
        } else if ratio > 0.75 {
            DropPosition::Below
        } else {
            DropPosition::Onto
        }
    } else if ratio < 0.5 {
        DropPosition::Above
    } else {
        DropPosition::Below
    }
}

/// 计算移动的目标路径。`Ok(None)` 表示落回原处，不发请求
pub fn drop_destination(
    root: &Value,
    source: &NodePath,
    target: &NodePath,
    position: DropPosition,
) -> Result<Option<NodePath>, NodeError> {
    if source.is_root() {
        return Err(NodeError::new(ErrorCode::MoveError, "根节点不能移动"));
    }
    if target == source {
        return Ok(None);
    }
    if target.is_descendant_of(source) {
        return Err(NodeError::new(ErrorCode::MoveError, "不能把节点移动到它自己的内部"));
    }
    let Some(source_key) = source.last() else {
        return Err(NodeError::new(ErrorCode::MoveError, "根节点不能移动"));
    };
    if value_at(root, source).is_none() {
        return Err(NodeError::new(ErrorCode::MoveError, format!("源节点不存在: {source}")));
    }
    let target_value = value_at(root, target)
        .ok_or_else(|| NodeError::new(ErrorCode::MoveError, format!("目标节点不存在: {target}")))?;

    let position = match (position, target_value) {
        (DropPosition::Onto, Value::Object(_) | Value::Array(_)) => DropPosition::Onto,
        // 标量或根不能作为兄弟落点，降级处理
        (DropPosition::Onto, _) => DropPosition::Below,
        (_, Value::Object(_) | Value::Array(_)) if target.is_root() => DropPosition::Onto,
        (p, _) => p,
    };

    if position == DropPosition::Onto {
        return into_collection(source, source_key, target, target_value);
    }

    let (Some(parent), Some(target_key)) = (target.parent(), target.last()) else {
        return Err(NodeError::new(ErrorCode::MoveError, "无效的落点"));
    };
    let parent_value = value_at(root, &parent)
        .ok_or_else(|| NodeError::new(ErrorCode::MoveError, format!("目标父节点不存在: {parent}")))?;

    match (parent_value, target_key) {
        (Value::Array(_), PathSegment::Index(target_index)) => {
            let mut index = match position {
                DropPosition::Above => *target_index,
                _ => target_index + 1,
            };
            // 同一数组内源在前：移除源后目标整体前移一位
            if source.parent().as_ref() == Some(&parent) {
                if let Some(source_index) = source_key.as_index() {
                    if source_index < index {
                        index -= 1;
                    }
                }
            }
            let destination = parent.child(index);
            Ok((&destination != source).then_some(destination))
        }
        (Value::Object(map), _) => {
            let key = object_key(source_key);
            let destination = parent.child(key.clone());
            if &destination == source {
                return Ok(None);
            }
            if map.contains_key(&key) {
                return Err(key_exists(&key));
            }
            Ok(Some(destination))
        }
        _ => Err(NodeError::new(ErrorCode::MoveError, "无效的落点")),
    }
}

fn into_collection(
    source: &NodePath,
    source_key: &PathSegment,
    target: &NodePath,
    target_value: &Value,
) -> Result<Option<NodePath>, NodeError> {
    let same_parent = source.parent().as_ref() == Some(target);
    match target_value {
        Value::Array(items) => {
            let len = if same_parent {
                items.len().saturating_sub(1)
            } else {
                items.len()
            };
            let destination = target.child(len);
            Ok((&destination != source).then_some(destination))
        }
        Value::Object(map) => {
            if same_parent {
                return Ok(None);
            }
            let key = object_key(source_key);
            if map.contains_key(&key) {
                return Err(key_exists(&key));
            }
            Ok(Some(target.child(key)))
        }
        _ => Err(NodeError::new(ErrorCode::MoveError, "目标不是集合")),
    }
}

/// 移入对象时使用的键名：数组元素以索引文本作为键
fn object_key(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Key(key) => key.clone(),
        PathSegment::Index(index) => index.to_string(),
    }
}

fn key_exists(key: &str) -> NodeError {
    NodeError::new(ErrorCode::KeyExists, format!("键已存在: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_drop_position_thresholds() {
        assert_eq!(resolve_drop_position(2.0, 20.0, true), DropPosition::Above);
        assert_eq!(resolve_drop_position(10.0, 20.0, true), DropPosition::Onto);
        assert_eq!(resolve_drop_position(18.0, 20.0, true), DropPosition::Below);
        assert_eq!(resolve_drop_position(9.0, 20.0, false), DropPosition::Above);
        assert_eq!(resolve_drop_position(11.0, 20.0, false), DropPosition::Below);
        assert_eq!(resolve_drop_position(5.0, 0.0, true), DropPosition::Onto);
    }

    #[test]
    fn test_self_and_descendant_drops() {
        let data = json!({"a": {"b": {"c": 1}}, "d": []});
        assert_eq!(drop_destination(&data, &p("a"), &p("a"), DropPosition::Onto), Ok(None), "落回自身不发请求");
        let err = drop_destination(&data, &p("a"), &p("a.b"), DropPosition::Onto).unwrap_err();
        assert_eq!(err.code, ErrorCode::MoveError, "不能移入自己的后代");
        assert!(drop_destination(&data, &p("a"), &p("a.b.c"), DropPosition::Below).is_err());
    }

    #[test]
    fn test_onto_array_appends_and_onto_object_keeps_key() {
        let data = json!({"list": [1, 2], "obj": {"x": 0}, "k": true});
        assert_eq!(
            drop_destination(&data, &p("k"), &p("list"), DropPosition::Onto),
            Ok(Some(p("list[2]")))
        );
        assert_eq!(
            drop_destination(&data, &p("k"), &p("obj"), DropPosition::Onto),
            Ok(Some(p("obj.k")))
        );
        assert_eq!(
            drop_destination(&data, &p("list[0]"), &p("obj"), DropPosition::Onto),
            Ok(Some(p("obj['0']"))),
            "数组元素移入对象时以索引文本为键"
        );
        // 同一数组内放到末尾
        assert_eq!(
            drop_destination(&data, &p("list[0]"), &p("list"), DropPosition::Onto),
            Ok(Some(p("list[1]")))
        );
    }

    #[test]
    fn test_sibling_drop_in_array_adjusts_index() {
        let data = json!({"list": ["a", "b", "c", "d"], "other": ["x"]});
        // 源在目标之前：移除后索引前移
        assert_eq!(
            drop_destination(&data, &p("list[0]"), &p("list[2]"), DropPosition::Below),
            Ok(Some(p("list[2]")))
        );
        assert_eq!(
            drop_destination(&data, &p("list[0]"), &p("list[2]"), DropPosition::Above),
            Ok(Some(p("list[1]")))
        );
        // 源在目标之后：不调整
        assert_eq!(
            drop_destination(&data, &p("list[3]"), &p("list[1]"), DropPosition::Above),
            Ok(Some(p("list[1]")))
        );
        // 放回原位
        assert_eq!(drop_destination(&data, &p("list[1]"), &p("list[0]"), DropPosition::Below), Ok(None));
        // 跨数组
        assert_eq!(
            drop_destination(&data, &p("other[0]"), &p("list[0]"), DropPosition::Above),
            Ok(Some(p("list[0]")))
        );
    }

    #[test]
    fn test_sibling_drop_in_object_and_key_collision() {
        let data = json!({"a": {"name": 1}, "b": {"name": 2, "z": 3}});
        assert_eq!(
            drop_destination(&data, &p("a.name"), &p("b.z"), DropPosition::Above).unwrap_err().code,
            ErrorCode::KeyExists
        );
        assert_eq!(
            drop_destination(&data, &p("b.z"), &p("a.name"), DropPosition::Below),
            Ok(Some(p("a.z")))
        );
        assert_eq!(drop_destination(&data, &p("b.z"), &p("b.name"), DropPosition::Above), Ok(None));
    }

    #[test]
    fn test_root_and_missing_nodes() {
        let data = json!({"a": 1});
        assert!(drop_destination(&data, &NodePath::root(), &p("a"), DropPosition::Below).is_err());
        assert!(drop_destination(&data, &p("missing"), &NodePath::root(), DropPosition::Onto).is_err());
        assert_eq!(
            drop_destination(&json!({"a": 1, "b": {}}), &p("a"), &NodePath::root(), DropPosition::Above),
            Ok(None),
            "放到根上等同于放入根，已在根中"
        );
    }
}
