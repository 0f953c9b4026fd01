//! 变更协议：错误分类、操作结果与挂起中的宿主请求

use std::fmt;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::task::noop_waker_ref;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::model::path::NodePath;
use crate::vm::bridge::MutationFuture;

/// 错误分类（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 本地解析失败，不会到达宿主
    InvalidJson,
    UpdateError,
    AddError,
    DeleteError,
    MoveError,
    /// 本地预检：键已存在
    KeyExists,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "INVALID_JSON",
            Self::UpdateError => "UPDATE_ERROR",
            Self::AddError => "ADD_ERROR",
            Self::DeleteError => "DELETE_ERROR",
            Self::MoveError => "MOVE_ERROR",
            Self::KeyExists => "KEY_EXISTS",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeError {
    pub code: ErrorCode,
    pub message: String,
}

impl NodeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// 节点上显示的临时错误，到期自动清除
#[derive(Debug, Clone, PartialEq)]
pub struct TransientError {
    pub error: NodeError,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Edit,
    Add,
    Delete,
    Move,
}

impl MutationKind {
    /// 宿主拒绝时对应的错误码
    pub fn error_code(self) -> ErrorCode {
        match self {
            Self::Edit => ErrorCode::UpdateError,
            Self::Add => ErrorCode::AddError,
            Self::Delete => ErrorCode::DeleteError,
            Self::Move => ErrorCode::MoveError,
        }
    }
}

/// 节点动作的结果：要么是状态切换，要么是被捕获的错误
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 本地状态已切换，无需宿主参与
    Applied,
    /// 无变化，未发出请求
    Unchanged,
    /// 请求已发出，宿主尚未答复
    Pending,
    /// 宿主已接受
    Accepted,
    /// 本地校验失败或宿主拒绝
    Rejected(NodeError),
    /// 权限或当前状态不允许
    NotPermitted,
    /// 该节点有进行中的请求
    Busy,
}

impl Outcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected(e) => Some(e.code),
            _ => None,
        }
    }
}

/// 已发往宿主、等待答复的请求
pub struct PendingMutation {
    pub kind: MutationKind,
    /// 发起动作的节点，错误显示在这里
    pub origin: NodePath,
    /// 请求的目标路径（移动时为源路径）
    pub path: NodePath,
    pub attempted: Value,
    /// 成功后结束发起节点的值编辑会话
    pub finish_edit: bool,
    future: MutationFuture,
}

impl PendingMutation {
    pub fn new(
        kind: MutationKind,
        origin: NodePath,
        path: NodePath,
        attempted: Value,
        future: MutationFuture,
    ) -> Self {
        Self {
            kind,
            origin,
            path,
            attempted,
            finish_edit: false,
            future,
        }
    }

    pub fn finishing_edit(mut self) -> Self {
        self.finish_edit = true;
        self
    }

    /// 非阻塞地轮询一次；同步完成的请求在第一次轮询就会就绪
    pub fn poll(&mut self) -> Option<Result<(), String>> {
        let mut cx = Context::from_waker(noop_waker_ref());
        match self.future.poll_unpin(&mut cx) {
            Poll::Ready(result) => Some(result),
            Poll::Pending => None,
        }
    }
}

impl fmt::Debug for PendingMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingMutation")
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .field("path", &self.path)
            .field("finish_edit", &self.finish_edit)
            .finish_non_exhaustive()
    }
}
