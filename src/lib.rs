//! Fanyi - 连载小说翻译流水线
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context**: 按章节文本挑选相关术语与人物关系
//! - **core**: 单章状态机、恢复策略、作品发现、主控循环与运行报告
//! - **gateway**: 与对话 Agent 的交互（OpenAI 兼容实现 / 脚本化实现）、身份轮换
//! - **model**: 术语库数据模型与占位值规则
//! - **observability**: 日志初始化
//! - **prompt**: 初始化 / 翻译 / 修补 prompt 模板
//! - **protocol**: Agent 回复的分段协议解析与残留汉字处理
//! - **store**: 每部作品一个 SQLite 术语库

pub mod config;
pub mod context;
pub mod core;
pub mod gateway;
pub mod model;
pub mod observability;
pub mod prompt;
pub mod protocol;
pub mod store;

pub use crate::core::{Controller, RunReport};
pub use store::KnowledgeStore;
