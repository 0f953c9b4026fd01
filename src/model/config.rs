//! 编辑器配置：折叠/搜索/排序策略、计时参数与逐节点权限

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::model::collapse::CollapseFilter;
use crate::model::search::SearchFilter;
use crate::model::shadow_tree::NodeData;
use crate::model::sort::KeySort;

// === 默认值 ===
pub const DEFAULT_ROOT_NAME: &str = "root";
pub const DEFAULT_COLLAPSE_ANIMATION_MS: u64 = 300;
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 350;
pub const DEFAULT_ERROR_DISPLAY_MS: u64 = 2500;
pub const DEFAULT_STRING_TRUNCATE: usize = 250;

pub type PermissionMethod = Rc<dyn Fn(&NodeData<'_>) -> bool>;

/// 单项权限：恒允许、恒禁止或按节点判定
#[derive(Clone, Default)]
pub enum Permission {
    #[default]
    Always,
    Never,
    When(PermissionMethod),
}

impl Permission {
    pub fn when(predicate: impl Fn(&NodeData<'_>) -> bool + 'static) -> Self {
        Self::When(Rc::new(predicate))
    }

    pub fn allows(&self, node: &NodeData<'_>) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::When(predicate) => predicate(node),
        }
    }
}

impl From<bool> for Permission {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::Always
        } else {
            Self::Never
        }
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Permissions {
    pub edit: Permission,
    pub add: Permission,
    pub delete: Permission,
    pub drag: Permission,
    /// 对象成员改名
    pub key_edit: Permission,
    /// 集合能否作为拖放目标
    pub drop_target: Permission,
}

impl Permissions {
    /// 全部禁止（只读查看）
    pub fn read_only() -> Self {
        Self {
            edit: Permission::Never,
            add: Permission::Never,
            delete: Permission::Never,
            drag: Permission::Never,
            key_edit: Permission::Never,
            drop_target: Permission::Never,
        }
    }
}

/// 集合预览中元素数量的显示时机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowCount {
    #[default]
    Always,
    Never,
    /// 只在折叠时显示
    WhenClosed,
}

impl ShowCount {
    pub fn shows(self, collapsed: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::WhenClosed => collapsed,
        }
    }
}

impl From<bool> for ShowCount {
    fn from(show: bool) -> Self {
        if show {
            Self::Always
        } else {
            Self::Never
        }
    }
}

#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub root_name: String,
    pub collapse: CollapseFilter,
    pub collapse_animation_time: Duration,
    pub search_filter: SearchFilter,
    pub search_debounce_time: Duration,
    pub error_display_time: Duration,
    pub key_sort: KeySort,
    pub show_array_indices: bool,
    pub string_truncate: usize,
    pub show_count: ShowCount,
    pub enable_clipboard: bool,
    pub permissions: Permissions,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            root_name: DEFAULT_ROOT_NAME.to_string(),
            collapse: CollapseFilter::default(),
            collapse_animation_time: Duration::from_millis(DEFAULT_COLLAPSE_ANIMATION_MS),
            search_filter: SearchFilter::default(),
            search_debounce_time: Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
            error_display_time: Duration::from_millis(DEFAULT_ERROR_DISPLAY_MS),
            key_sort: KeySort::default(),
            show_array_indices: true,
            string_truncate: DEFAULT_STRING_TRUNCATE,
            show_count: ShowCount::default(),
            enable_clipboard: true,
            permissions: Permissions::default(),
        }
    }
}

impl EditorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    pub fn with_collapse(mut self, collapse: CollapseFilter) -> Self {
        self.collapse = collapse;
        self
    }

    pub fn with_collapse_animation_time(mut self, duration: Duration) -> Self {
        self.collapse_animation_time = duration;
        self
    }

    pub fn with_search_filter(mut self, filter: SearchFilter) -> Self {
        self.search_filter = filter;
        self
    }

    pub fn with_search_debounce_time(mut self, duration: Duration) -> Self {
        self.search_debounce_time = duration;
        self
    }

    pub fn with_error_display_time(mut self, duration: Duration) -> Self {
        self.error_display_time = duration;
        self
    }

    pub fn with_key_sort(mut self, sort: KeySort) -> Self {
        self.key_sort = sort;
        self
    }

    pub fn with_show_array_indices(mut self, show: bool) -> Self {
        self.show_array_indices = show;
        self
    }

    pub fn with_string_truncate(mut self, length: usize) -> Self {
        self.string_truncate = length;
        self
    }

    pub fn with_show_count(mut self, show: ShowCount) -> Self {
        self.show_count = show;
        self
    }

    pub fn with_clipboard(mut self, enabled: bool) -> Self {
        self.enable_clipboard = enabled;
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}
