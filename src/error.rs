use std::path::PathBuf;
use thiserror::Error;

pub type PreviewResultOf<T> = Result<T, PreviewError>;

/// 預覽片段生成的致命錯誤
///
/// 單一時間點取樣失敗、單一片段擷取失敗、動圖產生失敗都不在此列，
/// 它們以資料形式記錄在結果中。
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("無法讀取影片: {path}: {reason}")]
    UnreadableMedia { path: PathBuf, reason: String },

    #[error("外部工具無法使用: {tool}: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("影片內容不足，無法產生候選時間點: {0}")]
    InsufficientContent(String),

    #[error("所有片段擷取皆失敗（共 {attempted} 個）")]
    NoUsableClips { attempted: usize },

    #[error("片段串接失敗: {0}")]
    AssemblyFailed(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("檔案操作失敗: {0}")]
    Io(#[from] std::io::Error),
}

impl PreviewError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnreadableMedia {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn tool_unavailable(tool: &str, reason: impl ToString) -> Self {
        Self::ToolUnavailable {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }

    /// 給呼叫端分支用的固定代碼
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnreadableMedia { .. } => "unreadable_media",
            Self::ToolUnavailable { .. } => "tool_unavailable",
            Self::InsufficientContent(_) => "insufficient_content",
            Self::NoUsableClips { .. } => "no_usable_clips",
            Self::AssemblyFailed(_) => "assembly_failed",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
        }
    }
}
