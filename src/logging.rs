//! ログ出力の初期化

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 指定レベルでログ出力を初期化する
///
/// 環境変数 `RUST_LOG` が設定されている場合はそちらを優先する
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("ログの初期化に失敗しました: {}", e))?;

    Ok(())
}
