//! LLM 层：对话后端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod prompt;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use deepseek::{create_deepseek_backend, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use mock::{word_fragments, MockBackend, ScriptedBackend};
pub use openai::OpenAiBackend;
pub use prompt::system_instruction;
pub use traits::{ChatBackend, Conversation, FragmentStream, LlmError};
pub use types::{Fragment, ToolInvocationRequest, ToolPayload, ToolResult, TurnInput};

use crate::config::AppConfig;

/// 根据配置选择后端（openai / deepseek / mock）；凭据在建立会话时才解析
pub fn create_backend_from_config(cfg: &AppConfig) -> Arc<dyn ChatBackend> {
    match cfg.llm.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::warn!("Using Mock backend, no remote model involved");
            Arc::new(MockBackend)
        }
        "deepseek" => {
            tracing::info!("Using DeepSeek backend ({})", cfg.llm.model);
            Arc::new(create_deepseek_backend(&cfg.llm))
        }
        other => {
            if other != "openai" {
                tracing::warn!("Unknown provider '{}', falling back to OpenAI-compatible", other);
            }
            tracing::info!("Using OpenAI-compatible backend ({})", cfg.llm.model);
            Arc::new(OpenAiBackend::new(cfg.llm.clone()))
        }
    }
}
