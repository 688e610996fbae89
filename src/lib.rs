//! OrchestrIA - 任务与日程助手的工具增强流式对话引擎
//!
//! 模块划分：
//! - **chat**: 会话管理、上下文快照、流式回合协调、晨间简报
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 引擎错误、回合阶段、会话监管（取消）
//! - **llm**: 对话后端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 界面消息日志
//! - **observability**: 日志初始化
//! - **store**: 任务 / 日程 / 项目的领域存储（内存 / REST）
//! - **tools**: 工具调用解析、注册表与执行器

pub mod chat;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod store;
pub mod tools;

pub use chat::{MessageUpdate, MessageUpdates, SessionManager};
