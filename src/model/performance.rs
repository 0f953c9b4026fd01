//! 性能测量：大型文档生成、渲染遍历与路径查询耗时
//!
//! 主要用于观察惰性派生的效果：折叠的集合在首次展开前不派生子节点，
//! 同一文档在不同折叠层级下的渲染规模差异很大。

use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::model::collapse::CollapseFilter;
use crate::model::config::EditorConfig;
use crate::model::data_core::TreeEditor;
use crate::model::path::select;
use crate::vm::bridge::InMemoryHost;

#[derive(Debug, Clone)]
pub struct PerformanceResult {
    pub operation: String,
    pub duration_ms: u128,
    pub success: bool,
    pub details: String,
}

impl PerformanceResult {
    pub fn new(operation: &str, duration_ms: u128, success: bool, details: &str) -> Self {
        Self {
            operation: operation.to_string(),
            duration_ms,
            success,
            details: details.to_string(),
        }
    }
}

/// 生成指定深度与宽度的嵌套文档，附带一个较长的记录数组
pub fn generate_large_json(depth: usize, width: usize) -> Value {
    fn branch(level: usize, depth: usize, width: usize) -> Value {
        if level >= depth {
            return json!(format!("叶子_{level}"));
        }
        let mut obj = Map::new();
        for i in 0..width.max(1) {
            let value = match i % 4 {
                0 => json!(format!("文本_{i}")),
                1 => json!(i),
                2 => json!([i, i % 2 == 0, null]),
                _ => branch(level + 1, depth, width / 2),
            };
            obj.insert(format!("field_{i}"), value);
        }
        Value::Object(obj)
    }

    let records: Vec<Value> = (0..width * 10)
        .map(|i| json!({"id": i, "label": format!("记录_{i}"), "enabled": i % 3 == 0}))
        .collect();
    json!({
        "meta": {"depth": depth, "width": width},
        "tree": branch(0, depth, width),
        "records": records,
    })
}

/// 以给定折叠策略渲染一次，记录派生的节点数
pub fn benchmark_render(data: &Value, collapse: CollapseFilter) -> PerformanceResult {
    let label = format!("渲染遍历({collapse:?})");
    let config = EditorConfig::default().with_collapse(collapse);
    let mut editor = TreeEditor::new(config, InMemoryHost::new(Value::Null));
    let start = Instant::now();
    let tree = editor.render(data, start);
    let duration = start.elapsed();
    PerformanceResult::new(&label, duration.as_millis(), true, &format!("派生了 {} 个节点", tree.count()))
}

pub fn benchmark_json_parsing(json_str: &str) -> PerformanceResult {
    let start = Instant::now();
    let parsed = serde_json::from_str::<Value>(json_str);
    let duration = start.elapsed().as_millis();
    match parsed {
        Ok(_) => PerformanceResult::new("JSON解析", duration, true, &format!("解析了 {} 字节", json_str.len())),
        Err(e) => PerformanceResult::new("JSON解析", duration, false, &format!("解析失败: {e}")),
    }
}

/// JSONPath 查询并映射回节点路径
pub fn benchmark_selection(data: &Value, queries: &[&str]) -> Vec<PerformanceResult> {
    queries
        .iter()
        .map(|query| {
            let start = Instant::now();
            let result = select(data, query);
            let duration = start.elapsed().as_millis();
            let operation = format!("路径查询: {query}");
            match result {
                Ok(paths) => PerformanceResult::new(&operation, duration, true, &format!("命中 {} 个节点", paths.len())),
                Err(e) => PerformanceResult::new(&operation, duration, false, &e.to_string()),
            }
        })
        .collect()
}

pub fn run_performance_suite() -> Vec<PerformanceResult> {
    let mut results = Vec::new();
    for (depth, width) in [(3, 10), (4, 20), (5, 30)] {
        tracing::info!("性能测试规模：深度{}，宽度{}", depth, width);
        let start = Instant::now();
        let data = generate_large_json(depth, width);
        results.push(PerformanceResult::new(
            &format!("数据生成({depth}x{width})"),
            start.elapsed().as_millis(),
            true,
            "",
        ));

        match serde_json::to_string(&data) {
            Ok(text) => results.push(benchmark_json_parsing(&text)),
            Err(e) => results.push(PerformanceResult::new("JSON序列化", 0, false, &e.to_string())),
        }
        results.push(benchmark_render(&data, CollapseFilter::Bool(false)));
        results.push(benchmark_render(&data, CollapseFilter::Level(1)));
        results.extend(benchmark_selection(&data, &["$.meta", "$.records[0]", "$..id"]));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_large_json() {
        let json = generate_large_json(2, 3);
        let obj = json.as_object().expect("应该生成对象");
        assert!(obj.contains_key("meta"));
        assert!(obj.contains_key("tree"));
        assert_eq!(obj["records"].as_array().map(Vec::len), Some(30));
    }

    #[test]
    fn test_lazy_render_is_much_smaller() {
        let json = generate_large_json(3, 8);
        let full = benchmark_render(&json, CollapseFilter::Bool(false));
        let collapsed = benchmark_render(&json, CollapseFilter::Level(1));
        assert!(full.success && collapsed.success);
        assert_eq!(collapsed.details, "派生了 4 个节点", "只派生根与顶层三个集合");
        assert!(full.details != collapsed.details);
    }

    #[test]
    fn test_parse_and_selection_benchmarks() {
        let json = generate_large_json(2, 5);
        let text = serde_json::to_string(&json).unwrap();
        assert!(benchmark_json_parsing(&text).success);
        assert!(!benchmark_json_parsing("{").success);

        let results = benchmark_selection(&json, &["$.records[*]", "$[bad"]);
        assert!(results[0].success);
        assert_eq!(results[0].details, "命中 50 个节点");
        assert!(!results[1].success, "非法查询应该失败");
    }
}
