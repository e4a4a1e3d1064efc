//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FANYI__*` 覆盖（双下划线表示嵌套，如 `FANYI__PIPELINE__MAX_ATTEMPTS=5`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::gateway::Identity;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub gateway: GatewaySection,
}

/// [app] 段：作品根目录与目录布局
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 作品根目录，每个子目录是一部作品
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    #[serde(default = "default_input_dir")]
    pub input_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_store_file")]
    pub store_file: String,
    /// System prompt 文件；不存在时不设置 system 消息
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            store_file: default_store_file(),
            system_prompt_path: None,
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("truyen")
}

fn default_input_dir() -> String {
    "goc".to_string()
}

fn default_output_dir() -> String {
    "dich".to_string()
}

fn default_store_file() -> String {
    "story_data.sqlite".to_string()
}

impl AppSection {
    /// 读取 system prompt；未配置、文件不存在或为空时返回 None
    pub fn load_system_prompt(&self) -> Option<String> {
        let path = self.system_prompt_path.as_ref()?;
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read system prompt: {}", e);
                None
            }
        }
    }
}

/// [pipeline] 段：重试、残留阈值、延迟
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// 每章（及初始化）最多尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 初始化使用的前几章
    #[serde(default = "default_init_chapters")]
    pub init_chapters: usize,
    /// 译文残留汉字超过该数量时换新会话重译一次
    #[serde(default = "default_residue_threshold")]
    pub residue_threshold: usize,
    #[serde(default = "default_repair_rounds")]
    pub repair_rounds: u32,
    /// 与外部交互之间的固定间隔
    #[serde(default)]
    pub action_delay_ms: u64,
    /// 章节之间的间隔
    #[serde(default)]
    pub chapter_delay_ms: u64,
    /// 每部作品开始时执行完整维护（去重 + 孤立关系），否则只清理占位值
    #[serde(default)]
    pub maintenance_on_start: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            init_chapters: default_init_chapters(),
            residue_threshold: default_residue_threshold(),
            repair_rounds: default_repair_rounds(),
            action_delay_ms: 0,
            chapter_delay_ms: 0,
            maintenance_on_start: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_init_chapters() -> usize {
    3
}

fn default_residue_threshold() -> usize {
    30
}

fn default_repair_rounds() -> u32 {
    3
}

/// [gateway] 段：OpenAI 兼容端点与身份轮换
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 对话历史保留轮数
    #[serde(default = "default_max_session_turns")]
    pub max_session_turns: usize,
    #[serde(default)]
    pub identities: Vec<Identity>,
    /// 连续限流轮换上限；未设置时等于身份数
    pub max_consecutive_rotations: Option<usize>,
    #[serde(default = "default_rotation_backoff_ms")]
    pub rotation_backoff_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_model(),
            request_timeout_secs: default_request_timeout(),
            max_session_turns: default_max_session_turns(),
            identities: Vec::new(),
            max_consecutive_rotations: None,
            rotation_backoff_ms: default_rotation_backoff_ms(),
        }
    }
}

impl GatewaySection {
    /// 已配置的身份；为空时使用读取 OPENAI_API_KEY 的默认身份
    pub fn identities(&self) -> Vec<Identity> {
        if self.identities.is_empty() {
            vec![Identity::new("default", "OPENAI_API_KEY")]
        } else {
            self.identities.clone()
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_session_turns() -> usize {
    8
}

fn default_rotation_backoff_ms() -> u64 {
    2000
}

/// 从 config 目录加载配置，环境变量 FANYI__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FANYI__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FANYI")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
