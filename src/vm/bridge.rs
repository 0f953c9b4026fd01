//! 宿主桥接层：引擎与数据拥有者之间的接口
//!
//! 引擎从不持有根值，所有变更都以请求的形式交给宿主，由宿主决定接受或拒绝。

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::model::mutation::{ErrorCode, MutationKind};
use crate::model::path::{value_at_mut, NodePath, PathSegment};
use crate::model::shadow_tree::NodeData;
use crate::utils::clipboard::copy_to_clipboard;

// === 常量定义（消除魔法值） ===
pub const STATUS_LOADED: &str = "文件加载完成";
pub const STATUS_COPIED: &str = "已复制到剪贴板";
pub const STATUS_WRITE_BACK_SUCCESS: &str = "回写成功";
pub const STATUS_ERROR_PREFIX: &str = "错误: ";

pub const MSG_PATH_NOT_FOUND: &str = "路径不存在: ";
pub const MSG_ROOT_NOT_ALLOWED: &str = "根节点不支持该操作";
pub const MSG_INVALID_TARGET: &str = "无效的目标位置: ";

/// 宿主对变更请求的答复：接受，或带消息的拒绝
pub type MutationFuture = LocalBoxFuture<'static, Result<(), String>>;

/// 变更被拒绝时交给宿主的错误事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub code: ErrorCode,
    pub message: String,
    pub path: NodePath,
    pub attempted_value: Value,
    pub current_full_value: Value,
}

pub trait TreeHost {
    fn on_edit(&mut self, value: Value, path: &NodePath) -> MutationFuture;

    fn on_add(&mut self, value: Value, path: &NodePath) -> MutationFuture;

    fn on_delete(&mut self, path: &NodePath) -> MutationFuture;

    /// 单个原子请求：目标数组索引以移除源之后的数组为准
    fn on_move(&mut self, source: &NodePath, destination: &NodePath) -> MutationFuture;

    /// 集合进入编辑时的文本形式
    fn serialize(&self, value: &Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    }

    fn parse(&self, text: &str) -> Result<Value, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }

    /// 新增子节点的初始值
    fn default_value(&self, _node: &NodeData<'_>) -> Value {
        Value::Null
    }

    fn on_error(&mut self, _event: &ErrorEvent) {}

    fn copy(&mut self, text: &str) -> Result<(), String> {
        copy_to_clipboard(text).map_err(|e| e.to_string())
    }
}

pub type RejectHook = Box<dyn Fn(MutationKind, &NodePath) -> Option<String>>;

/// 参考宿主：自己持有文档，同步地应用被接受的变更
pub struct InMemoryHost {
    data: Value,
    reject: Option<RejectHook>,
    errors: Vec<ErrorEvent>,
    copied: Vec<String>,
    system_clipboard: bool,
    applied: usize,
}

impl InMemoryHost {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            reject: None,
            errors: Vec::new(),
            copied: Vec::new(),
            system_clipboard: false,
            applied: 0,
        }
    }

    /// 钩子返回 `Some(message)` 时拒绝该请求
    pub fn with_reject(mut self, hook: impl Fn(MutationKind, &NodePath) -> Option<String> + 'static) -> Self {
        self.reject = Some(Box::new(hook));
        self
    }

    pub fn with_system_clipboard(mut self, enabled: bool) -> Self {
        self.system_clipboard = enabled;
        self
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn into_data(self) -> Value {
        self.data
    }

    pub fn errors(&self) -> &[ErrorEvent] {
        &self.errors
    }

    pub fn copied(&self) -> &[String] {
        &self.copied
    }

    /// 已接受并应用的请求数
    pub fn applied_count(&self) -> usize {
        self.applied
    }

    fn respond(
        &mut self,
        kind: MutationKind,
        path: &NodePath,
        apply: impl FnOnce(&mut Value) -> Result<(), String>,
    ) -> MutationFuture {
        let result = match self.reject.as_ref().and_then(|hook| hook(kind, path)) {
            Some(message) => Err(message),
            None => apply(&mut self.data),
        };
        if result.is_ok() {
            self.applied += 1;
        }
        future::ready(result).boxed_local()
    }
}

impl TreeHost for InMemoryHost {
    fn on_edit(&mut self, value: Value, path: &NodePath) -> MutationFuture {
        self.respond(MutationKind::Edit, path, |data| replace_at(data, path, value))
    }

    fn on_add(&mut self, value: Value, path: &NodePath) -> MutationFuture {
        self.respond(MutationKind::Add, path, |data| insert_at(data, path, value))
    }

    fn on_delete(&mut self, path: &NodePath) -> MutationFuture {
        self.respond(MutationKind::Delete, path, |data| remove_at(data, path).map(|_| ()))
    }

    fn on_move(&mut self, source: &NodePath, destination: &NodePath) -> MutationFuture {
        self.respond(MutationKind::Move, source, |data| {
            // 在副本上操作，失败时原文档保持不变
            let mut next = data.clone();
            let moved = remove_at(&mut next, source)?;
            insert_at(&mut next, destination, moved)?;
            *data = next;
            Ok(())
        })
    }

    fn on_error(&mut self, event: &ErrorEvent) {
        self.errors.push(event.clone());
    }

    fn copy(&mut self, text: &str) -> Result<(), String> {
        if self.system_clipboard {
            copy_to_clipboard(text).map_err(|e| e.to_string())?;
        }
        self.copied.push(text.to_string());
        Ok(())
    }
}

fn replace_at(data: &mut Value, path: &NodePath, value: Value) -> Result<(), String> {
    let slot = value_at_mut(data, path).ok_or_else(|| format!("{MSG_PATH_NOT_FOUND}{path}"))?;
    *slot = value;
    Ok(())
}

fn insert_at(data: &mut Value, path: &NodePath, value: Value) -> Result<(), String> {
    let (Some(parent), Some(last)) = (path.parent(), path.last()) else {
        return Err(MSG_ROOT_NOT_ALLOWED.to_string());
    };
    match (value_at_mut(data, &parent), last) {
        (Some(Value::Array(items)), PathSegment::Index(index)) if *index <= items.len() => {
            items.insert(*index, value);
            Ok(())
        }
        (Some(Value::Object(map)), PathSegment::Key(key)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        _ => Err(format!("{MSG_INVALID_TARGET}{path}")),
    }
}

fn remove_at(data: &mut Value, path: &NodePath) -> Result<Value, String> {
    let (Some(parent), Some(last)) = (path.parent(), path.last()) else {
        return Err(MSG_ROOT_NOT_ALLOWED.to_string());
    };
    let removed = match (value_at_mut(data, &parent), last) {
        (Some(Value::Array(items)), PathSegment::Index(index)) if *index < items.len() => Some(items.remove(*index)),
        (Some(Value::Object(map)), PathSegment::Key(key)) => map.shift_remove(key),
        _ => None,
    };
    removed.ok_or_else(|| format!("{MSG_PATH_NOT_FOUND}{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn settle(future: MutationFuture) -> Result<(), String> {
        futures::executor::block_on(future)
    }

    #[test]
    fn test_in_memory_host_applies_mutations() {
        let mut host = InMemoryHost::new(json!({"a": 1, "list": ["x", "z"], "obj": {}}));
        assert!(settle(host.on_edit(json!(2), &p("a"))).is_ok());
        assert!(settle(host.on_add(json!("y"), &p("list[1]"))).is_ok());
        assert!(settle(host.on_add(json!(true), &p("obj.flag"))).is_ok());
        assert!(settle(host.on_delete(&p("a"))).is_ok());
        assert_eq!(host.data(), &json!({"list": ["x", "y", "z"], "obj": {"flag": true}}));
        assert_eq!(host.applied_count(), 4);
    }

    #[test]
    fn test_move_is_atomic() {
        let mut host = InMemoryHost::new(json!({"list": [1, 2, 3], "obj": {"k": 0}}));
        assert!(settle(host.on_move(&p("list[0]"), &p("list[2]"))).is_ok());
        assert_eq!(host.data()["list"], json!([2, 3, 1]));

        let before = host.data().clone();
        let result = settle(host.on_move(&p("list[0]"), &p("missing.deep")));
        assert!(result.is_err(), "无效目标应该失败");
        assert_eq!(host.data(), &before, "失败的移动不能留下半成品");
    }

    #[test]
    fn test_delete_preserves_key_order() {
        let mut host = InMemoryHost::new(json!({"a": 1, "b": 2, "c": 3}));
        settle(host.on_delete(&p("a"))).unwrap();
        let keys: Vec<&String> = host.data().as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert!(settle(host.on_delete(&NodePath::root())).is_err(), "根节点不能删除");
    }

    #[test]
    fn test_reject_hook_and_local_clipboard() {
        let mut host = InMemoryHost::new(json!({"a": 1})).with_reject(|kind, path| {
            (kind == MutationKind::Delete).then(|| format!("禁止删除 {path}"))
        });
        assert_eq!(settle(host.on_delete(&p("a"))), Err("禁止删除 $.a".to_string()));
        assert_eq!(host.data(), &json!({"a": 1}));
        assert_eq!(host.applied_count(), 0);

        host.copy("{\"a\": 1}").unwrap();
        assert_eq!(host.copied(), &["{\"a\": 1}".to_string()]);
    }

    #[test]
    fn test_default_serialize_parse() {
        let host = InMemoryHost::new(Value::Null);
        let text = host.serialize(&json!({"k": [1, 2]}));
        assert_eq!(host.parse(&text).unwrap(), json!({"k": [1, 2]}));
        assert!(host.parse("{oops").is_err());
    }
}
