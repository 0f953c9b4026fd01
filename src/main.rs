//! 程序入口：命令行 JSON 树查看/编辑器
//!
//! 加载文件，按参数驱动引擎（折叠层级、搜索、排序、编辑），打印可见树，
//! 可选地把编辑后的文档写回磁盘。

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::fmt::SubscriberBuilder;

use json_tree_editor::model::collapse::CollapseView;
use json_tree_editor::model::performance::run_performance_suite;
use json_tree_editor::utils::fs::{read_json_file, write_json_file};
use json_tree_editor::vm::bridge::{STATUS_COPIED, STATUS_ERROR_PREFIX, STATUS_LOADED, STATUS_WRITE_BACK_SUCCESS};
use json_tree_editor::{
    select, CollapseFilter, EditorConfig, InMemoryHost, KeySort, NodePath, Outcome, RenderedNode, SearchFilter,
    ShowCount, TreeEditor,
};

#[derive(Parser)]
#[command(name = "json_tree_editor")]
#[command(about = "View and edit a JSON document as a collapsible tree", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON 文件
    #[arg(required_unless_present = "bench")]
    file: Option<PathBuf>,

    /// 层级不小于该值的集合初始折叠
    #[arg(long)]
    collapse_level: Option<usize>,

    #[arg(long)]
    search: Option<String>,

    #[arg(long, value_parser = ["value", "key", "all"], default_value = "value")]
    search_mode: String,

    /// 对象键按字典序展示
    #[arg(long)]
    sort: bool,

    /// 集合预览中的元素数量
    #[arg(long, value_parser = ["always", "never", "when-closed"], default_value = "always")]
    show_count: String,

    #[arg(long, default_value = "root")]
    root_name: String,

    /// 只列出 JSONPath 查询命中的节点路径
    #[arg(long)]
    select: Option<String>,

    /// 替换节点值，格式 PATH=JSON，可重复
    #[arg(long = "edit")]
    edits: Vec<String>,

    /// 节点改名，格式 PATH=NEW_KEY，可重复
    #[arg(long = "rename")]
    renames: Vec<String>,

    /// 删除节点，可重复
    #[arg(long = "delete")]
    deletes: Vec<String>,

    /// 复制节点到系统剪贴板
    #[arg(long)]
    copy: Option<String>,

    /// 保存到指定文件
    #[arg(long)]
    save: Option<PathBuf>,

    /// 写回原文件
    #[arg(long)]
    write: bool,

    /// 以 JSON 输出渲染树
    #[arg(long)]
    json: bool,

    /// 运行内置的性能测试并输出结果
    #[arg(long)]
    bench: bool,

    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // 初始化日志输出，写到 stderr 以免混入树输出
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = SubscriberBuilder::default()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(e) = run(cli) {
        tracing::error!("{}{:#}", STATUS_ERROR_PREFIX, e);
        eprintln!("{STATUS_ERROR_PREFIX}{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.bench {
        for result in run_performance_suite() {
            let status = if result.success { "成功" } else { "失败" };
            println!("{} [{}] {}ms {}", result.operation, status, result.duration_ms, result.details);
        }
        return Ok(());
    }
    let Some(file) = cli.file.clone() else {
        bail!("缺少 JSON 文件参数");
    };

    let started = Instant::now();
    let data = read_json_file(&file).with_context(|| format!("无法加载 {}", file.display()))?;
    tracing::info!("{}: {}，耗时: {:.1}ms", STATUS_LOADED, file.display(), started.elapsed().as_secs_f64() * 1000.0);

    if let Some(query) = &cli.select {
        for path in select(&data, query)? {
            println!("{path}");
        }
        return Ok(());
    }

    let mut editor = TreeEditor::new(build_config(&cli)?, InMemoryHost::new(data).with_system_clipboard(true));
    let now = Instant::now();

    for spec in &cli.edits {
        let (path, raw) = split_assignment(spec)?;
        let value: Value = serde_json::from_str(raw).with_context(|| format!("--edit {spec} 的值不是合法 JSON"))?;
        let root = editor.host().data().clone();
        expect_accepted(editor.request_edit(&root, &path, value, now), spec)?;
    }
    for spec in &cli.renames {
        let (path, new_key) = split_assignment(spec)?;
        let root = editor.host().data().clone();
        expect_accepted(editor.start_key_edit(&root, &path), spec)?;
        expect_accepted(editor.commit_key_edit(&root, &path, new_key, now), spec)?;
    }
    for raw in &cli.deletes {
        let path = NodePath::parse(raw)?;
        let root = editor.host().data().clone();
        expect_accepted(editor.delete(&root, &path, now), raw)?;
    }

    let root = editor.host().data().clone();
    if let Some(raw) = &cli.copy {
        let text = editor.copy_node(&root, &NodePath::parse(raw)?)?;
        tracing::info!("{}: {} 字符", STATUS_COPIED, text.chars().count());
    }
    if let Some(text) = &cli.search {
        editor.set_search_text(text, now);
    }

    let tree = editor.render(&root, now);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        let mut out = String::new();
        print_tree(&tree, &mut out);
        print!("{out}");
    }

    let target = match (&cli.save, cli.write) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(file),
        (None, false) => None,
    };
    if let Some(path) = target {
        write_json_file(&path, editor.host().data())?;
        tracing::info!("{}: {}", STATUS_WRITE_BACK_SUCCESS, path.display());
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<EditorConfig> {
    let search_filter = match cli.search_mode.as_str() {
        "value" => SearchFilter::Value,
        "key" => SearchFilter::Key,
        "all" => SearchFilter::All,
        other => bail!("未知的搜索模式: {other}"),
    };
    let show_count = match cli.show_count.as_str() {
        "always" => ShowCount::Always,
        "never" => ShowCount::Never,
        "when-closed" => ShowCount::WhenClosed,
        other => bail!("未知的计数显示方式: {other}"),
    };
    let collapse = cli.collapse_level.map_or(CollapseFilter::Bool(false), CollapseFilter::Level);
    // 命令行一次性渲染，不需要动画与防抖
    Ok(EditorConfig::default()
        .with_root_name(cli.root_name.clone())
        .with_collapse(collapse)
        .with_collapse_animation_time(std::time::Duration::ZERO)
        .with_search_debounce_time(std::time::Duration::ZERO)
        .with_search_filter(search_filter)
        .with_show_count(show_count)
        .with_key_sort(KeySort::from(cli.sort)))
}

fn split_assignment(spec: &str) -> Result<(NodePath, &str)> {
    let (path, rest) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("参数应为 PATH=VALUE 形式: {spec}"))?;
    Ok((NodePath::parse(path)?, rest))
}

fn expect_accepted(outcome: Outcome, what: &str) -> Result<()> {
    match outcome {
        Outcome::Accepted | Outcome::Applied | Outcome::Unchanged => Ok(()),
        Outcome::Rejected(error) => bail!("{what}: {error}"),
        other => bail!("{what}: {other:?}"),
    }
}

fn print_tree(node: &RenderedNode, out: &mut String) {
    let indent = "  ".repeat(node.level);
    let marker = match node.collapse {
        Some(CollapseView::Collapsed) => "▸ ",
        Some(_) => "▾ ",
        None => "  ",
    };
    let key = if node.show_key { format!("{}: ", node.key) } else { String::new() };
    out.push_str(&format!("{indent}{marker}{key}{}\n", node.preview));
    if node.collapse == Some(CollapseView::Collapsed) {
        return;
    }
    for child in node.children.iter().flatten() {
        print_tree(child, out);
    }
}
