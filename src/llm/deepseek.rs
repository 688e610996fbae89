//! DeepSeek 后端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat（支持 function calling）

use crate::config::LlmSection;
use crate::llm::OpenAiBackend;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// DeepSeek 优先读 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`
pub const DEEPSEEK_KEY_VARS: &[&str] = &["DEEPSEEK_API_KEY", "OPENAI_API_KEY"];

/// 创建 DeepSeek 后端：未配置 base_url 时使用官方端点；模型名沿用配置
pub fn create_deepseek_backend(settings: &LlmSection) -> OpenAiBackend {
    let mut settings = settings.clone();
    if settings.base_url.is_none() {
        settings.base_url = Some(DEEPSEEK_BASE_URL.to_string());
    }
    if settings.model.trim().is_empty() {
        settings.model = DEEPSEEK_CHAT.to_string();
    }
    OpenAiBackend::new(settings).with_key_vars(DEEPSEEK_KEY_VARS)
}
