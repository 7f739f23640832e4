//! 捕获记录数据模型

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 请求头（名称 -> 值），按收到的形式保存
pub type Headers = BTreeMap<String, String>;

/// 请求参数（名称 -> 有序多值列表）
pub type Params = BTreeMap<String, Vec<String>>;

/// 一条捕获到的入站请求
///
/// 由 `CaptureService::capture` 构造，之后不再修改。
/// 解码时忽略未知字段，可选字段缺失时取默认值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// 捕获 ID（UUID v4）
    #[serde(default)]
    pub id: String,
    /// 捕获时间（UTC）
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// HTTP 方法
    pub method: String,
    /// 请求路径
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    /// GET 为 query 参数，表单 POST 为表单参数
    #[serde(default, rename = "data", deserialize_with = "deserialize_params")]
    pub body_or_query: Params,
    /// 非表单请求体原文（如 JSON webhook）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Entry {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>, request: CaptureRequest) -> Self {
        Self {
            id: id.into(),
            timestamp,
            method: request.method,
            path: request.path,
            headers: request.headers,
            body_or_query: request.params,
            body: request.body,
        }
    }

    /// 获取某个参数的全部值
    pub fn param(&self, name: &str) -> Option<&[String]> {
        self.body_or_query.get(name).map(Vec::as_slice)
    }

    /// 按名称查找请求头（忽略大小写）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 待捕获的请求内容（时间戳和 ID 由服务分配）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub params: Params,
    pub body: Option<String>,
}

impl CaptureRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: default_path(),
            headers: Headers::new(),
            params: Params::new(),
            body: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// 追加一个参数值（同名参数保留全部值）
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

fn default_path() -> String {
    "/".to_string()
}

/// 解析时间戳
///
/// 支持 RFC3339，以及不带时区的 ISO-8601（旧记录格式，按 UTC 处理）
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("无法解析时间戳: {}", raw)))
}

/// 旧记录中参数值可能是单个字符串
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredParamValue {
    Many(Vec<String>),
    One(String),
}

fn deserialize_params<'de, D>(deserializer: D) -> Result<Params, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, StoredParamValue> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| {
            let values = match value {
                StoredParamValue::Many(values) => values,
                StoredParamValue::One(value) => vec![value],
            };
            (name, values)
        })
        .collect())
}
