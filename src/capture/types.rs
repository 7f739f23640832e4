//! 捕获 API 请求/响应类型

use serde::Serialize;

use super::model::Entry;
use super::service::CaptureStats;

/// 全部历史响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryListResponse {
    pub total: usize,
    pub entries: Vec<Entry>,
}

/// 最近记录响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentResponse {
    pub total: usize,
    pub capacity: usize,
    pub entries: Vec<Entry>,
}

/// 操作成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// 健康检查响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub stats: CaptureStats,
}

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    /// 已进入内存缓冲但未能持久化的记录 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                error_type: error_type.into(),
                message: message.into(),
                entry_id: None,
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::new("storage_error", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    pub fn with_entry_id(mut self, id: impl Into<String>) -> Self {
        self.error.entry_id = Some(id.into());
        self
    }
}
