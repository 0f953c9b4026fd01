//! 剪贴板：节点复制使用的系统剪贴板封装

use copypasta::{ClipboardContext, ClipboardProvider};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("剪贴板不可用: {0}")]
    Unavailable(String),
    #[error("写入剪贴板失败: {0}")]
    Write(String),
}

/// 将文本复制到系统剪贴板
pub fn copy_to_clipboard(text: &str) -> Result<(), ClipboardError> {
    let mut ctx = ClipboardContext::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
    ctx.set_contents(text.to_string())
        .map_err(|e| ClipboardError::Write(e.to_string()))?;
    tracing::debug!("已写入剪贴板: {} 字符", text.chars().count());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ClipboardError::Unavailable("no display".into());
        assert_eq!(err.to_string(), "剪贴板不可用: no display");
        let err = ClipboardError::Write("denied".into());
        assert!(err.to_string().starts_with("写入剪贴板失败"));
    }
}
