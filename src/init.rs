use env_logger::{Builder, Env};

/// 初始化日誌，預設等級 info，可用 `RUST_LOG` 覆寫
///
/// 日誌輸出到 stderr，stdout 保留給結果 JSON。
pub fn init() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
