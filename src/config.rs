//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ORCHESTRIA__*` 覆盖（双下划线表示嵌套，如 `ORCHESTRIA__LLM__PROVIDER=mock`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub store: StoreSection,
    pub tools: ToolsSection,
}

/// [app] 段：名称、上下文快照条数上限、欢迎语
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 上下文快照中任务 / 日程各自最多列出的条数
    #[serde(default = "default_max_context_entries")]
    pub max_context_entries: usize,
    /// 消息日志的第一条助手消息；设为空字符串则不显示
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_entries: default_max_context_entries(),
            welcome_message: default_welcome_message(),
        }
    }
}

fn default_max_context_entries() -> usize {
    50
}

fn default_welcome_message() -> String {
    "Hello. I'm OrchestrIA. I can help manage your tasks and schedule. What do you need?"
        .to_string()
}

/// [llm] 段：后端选择、生成参数与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读环境变量（OPENAI_API_KEY / DEEPSEEK_API_KEY）
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.95
}

fn default_max_tokens() -> u32 {
    2048
}

/// [llm.timeouts] 段（秒）：request 限制建立一次流，stream 限制等待下一个片段
#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
            stream: default_stream_timeout(),
        }
    }
}

impl LlmTimeoutsSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream)
    }
}

fn default_request_timeout() -> u64 {
    60
}

fn default_stream_timeout() -> u64 {
    120
}

/// [store] 段：设置 api_url 时使用 REST 存储，否则使用内置示例数据
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreSection {
    pub api_url: Option<String>,
}

/// [tools] 段：工具超时与 createTask 默认预估时长
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_estimated_minutes")]
    pub default_estimated_minutes: u32,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            default_estimated_minutes: default_estimated_minutes(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_estimated_minutes() -> u32 {
    30
}

/// 从 config 目录加载配置，环境变量 ORCHESTRIA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ORCHESTRIA__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("ORCHESTRIA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
