//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ARIA__*` 覆盖（双下划线表示嵌套，如 `ARIA__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// [app] 段：应用名、用户时区、上下文轮数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// IANA 时区名，日历时间段解析以此为准
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// 提供给分类器的最近会话轮数
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            timezone: default_timezone(),
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_max_context_turns() -> usize {
    5
}

/// [llm] 段：后端与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次 oracle 调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 是否用 LLM 对冗长工具输出做摘要（默认走确定性模板）
    #[serde(default)]
    pub summarize_responses: bool,
}

fn default_model() -> String {
    "gpt-4-turbo-preview".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// [tools] 段：文件搜索范围、工具超时、日历/邮件/应用启动设置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub file_search: FileSearchSection,
    #[serde(default)]
    pub calendar: CalendarSection,
    #[serde(default)]
    pub app_launch: AppLaunchSection,
}

fn default_tool_timeout_secs() -> u64 {
    15
}

/// [tools.file_search] 段：搜索根目录、返回上限、时间预算
#[derive(Debug, Clone, Deserialize)]
pub struct FileSearchSection {
    /// 搜索的根目录；未设置时用 ~/Documents、~/Downloads、~/Desktop
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_budget_secs")]
    pub budget_secs: u64,
}

impl Default for FileSearchSection {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            max_results: default_max_results(),
            budget_secs: default_search_budget_secs(),
        }
    }
}

fn default_max_results() -> usize {
    5
}

fn default_search_budget_secs() -> u64 {
    5
}

/// [tools.calendar] 段：默认事件时长
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarSection {
    #[serde(default = "default_event_minutes")]
    pub default_event_minutes: i64,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            default_event_minutes: default_event_minutes(),
        }
    }
}

fn default_event_minutes() -> i64 {
    60
}

/// [tools.app_launch] 段：允许启动的应用名
#[derive(Debug, Clone, Deserialize)]
pub struct AppLaunchSection {
    #[serde(default = "default_allowed_apps")]
    pub allowed_apps: Vec<String>,
}

impl Default for AppLaunchSection {
    fn default() -> Self {
        Self {
            allowed_apps: default_allowed_apps(),
        }
    }
}

fn default_allowed_apps() -> Vec<String> {
    vec![
        "calculator".into(),
        "notes".into(),
        "calendar".into(),
        "mail".into(),
        "browser".into(),
        "terminal".into(),
    ]
}

/// [server] 段：HTTP/WebSocket 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            tools: ToolsSection::default(),
            server: ServerSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ARIA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ARIA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ARIA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.timezone, "America/New_York");
        assert_eq!(cfg.app.max_context_turns, 5);
        assert_eq!(cfg.tools.file_search.max_results, 5);
        assert!(cfg.tools.app_launch.allowed_apps.contains(&"notes".to_string()));
    }
}
