//! JSON 树编辑引擎
//!
//! 提供可编辑 JSON 树的无界面核心：路径寻址、惰性派生的折叠/展开、
//! 编辑会话、交给宿主裁决的异步结构变更、搜索过滤、拖拽重排与键排序。
//! 渲染技术由调用方决定，引擎只输出派生的渲染树。

pub mod model;
pub mod utils;
pub mod vm;

// 重新导出主要类型
pub use model::collapse::{CollapseFilter, CollapseView, Direction};
pub use model::config::{EditorConfig, Permission, Permissions, ShowCount};
pub use model::data_core::{Affordances, EditorError, RenderedNode, TreeEditor};
pub use model::drag::{resolve_drop_position, DropPosition};
pub use model::edit_session::{EditBuffer, EditMode, KeyGesture};
pub use model::mutation::{ErrorCode, MutationKind, NodeError, Outcome};
pub use model::path::{select, value_at, NodePath, PathSegment};
pub use model::search::SearchFilter;
pub use model::shadow_tree::{NodeData, NodeKind};
pub use model::sort::KeySort;
pub use vm::bridge::{ErrorEvent, InMemoryHost, MutationFuture, TreeHost};
