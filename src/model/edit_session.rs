//! 编辑会话：编辑模式、可编辑缓冲区与键盘手势约定

use serde::Serialize;
use serde_json::{Number, Value};

use crate::model::tree_state::EditTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    Viewing,
    EditingValue,
    EditingKey,
}

impl From<Option<EditTarget>> for EditMode {
    fn from(target: Option<EditTarget>) -> Self {
        match target {
            None => Self::Viewing,
            Some(EditTarget::Value) => Self::EditingValue,
            Some(EditTarget::Key) => Self::EditingKey,
        }
    }
}

/// 编辑缓冲区：集合为结构化文本，标量为带类型的缓冲
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EditBuffer {
    /// 集合序列化后的文本
    Text(String),
    String(String),
    /// 数字以文本保存，提交时再解析
    Number(String),
    Boolean(bool),
    Null,
}

impl EditBuffer {
    pub fn seed(value: &Value, serialize: impl Fn(&Value) -> String) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Self::Text(serialize(value)),
            Value::String(s) => Self::String(s.clone()),
            Value::Number(n) => Self::Number(n.to_string()),
            Value::Bool(b) => Self::Boolean(*b),
            Value::Null => Self::Null,
        }
    }

    /// 多行缓冲需要带修饰键的确认手势
    pub fn is_multiline(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// 以文本更新缓冲；数字只保留数字相关字符，布尔接受 true/false
    pub fn set_text(&mut self, text: &str) {
        match self {
            Self::Text(buf) | Self::String(buf) => *buf = text.to_string(),
            Self::Number(buf) => *buf = validate_number(text),
            Self::Boolean(b) => {
                if let Ok(parsed) = text.trim().parse::<bool>() {
                    *b = parsed;
                }
            }
            Self::Null => {}
        }
    }

    /// 在字符串缓冲末尾换行；其他类型不接受换行
    pub fn insert_newline(&mut self) -> bool {
        match self {
            Self::String(buf) | Self::Text(buf) => {
                buf.push('\n');
                true
            }
            _ => false,
        }
    }

    /// 数字缓冲按步长增减（方向键），其他类型忽略
    pub fn step_number(&mut self, delta: f64) -> bool {
        let Self::Number(buf) = self else {
            return false;
        };
        let current = buf.trim().parse::<f64>().unwrap_or(0.0);
        let next = current + delta;
        *buf = if next.fract() == 0.0 && next.abs() < 1e15 {
            format!("{}", next as i64)
        } else {
            next.to_string()
        };
        true
    }

    /// 把缓冲转换为候选值；文本缓冲经由宿主的 parse
    pub fn to_value(&self, parse: impl Fn(&str) -> Result<Value, String>) -> Result<Value, String> {
        match self {
            Self::Text(text) => parse(text),
            Self::String(s) => Ok(Value::String(s.clone())),
            Self::Number(raw) => parse_number(raw),
            Self::Boolean(b) => Ok(Value::Bool(*b)),
            Self::Null => Ok(Value::Null),
        }
    }
}

fn validate_number(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        .collect()
}

/// 先按 JSON 数字解析（整数保持 i64/u64 精度），再退回 f64 接受 `+1`、`.5` 之类的输入
fn parse_number(raw: &str) -> Result<Value, String> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<Number>() {
        return Ok(Value::Number(n));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("无法解析的数字: {raw}"))
}

/// 抽象化的键盘手势
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGesture {
    /// 回车
    Confirm,
    /// 带修饰键的回车
    ConfirmMultiline,
    Cancel,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureAction {
    Commit,
    Cancel,
    InsertNewline,
    None,
}

/// 多行字段只在带修饰键时提交，单行字段回车即提交、带修饰键的回车换行
pub fn interpret_gesture(gesture: KeyGesture, multiline: bool) -> GestureAction {
    match (gesture, multiline) {
        (KeyGesture::Cancel, _) => GestureAction::Cancel,
        (KeyGesture::ConfirmMultiline, true) | (KeyGesture::Confirm, false) => GestureAction::Commit,
        (KeyGesture::ConfirmMultiline, false) => GestureAction::InsertNewline,
        _ => GestureAction::None,
    }
}
