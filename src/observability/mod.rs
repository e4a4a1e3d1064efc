//! 可观测性：tracing 日志初始化
//!
//! 默认级别由调用方给出（`info`，`-v` 时为 `debug`），`RUST_LOG` 优先。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
