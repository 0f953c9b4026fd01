//! IO helper: JSON 文档的读取与保存

use std::{fs::File, io::BufReader, io::BufWriter, path::Path};

use serde_json::Value;

use crate::model::data_core::EditorError;

/// 从文件读取JSON数据
pub fn read_json_file(p: &Path) -> Result<Value, EditorError> {
    let reader = BufReader::new(File::open(p)?);
    let value = serde_json::from_reader(reader)?;
    tracing::debug!("已读取 {}", p.display());
    Ok(value)
}

/// 将JSON数据保存到文件（格式化输出）
pub fn write_json_file(p: &Path, value: &Value) -> Result<(), EditorError> {
    let writer = BufWriter::new(File::create(p)?);
    serde_json::to_writer_pretty(writer, value)?;
    tracing::debug!("已写入 {}", p.display());
    Ok(())
}
