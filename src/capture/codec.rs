//! 记录编解码：每条 Entry 对应一行 JSON

use super::error::CodecError;
use super::model::Entry;

/// 将记录编码为一行 JSON（以换行结尾）
///
/// serde_json 会转义字符串中的换行，因此输出中只有结尾一个换行符
pub fn encode(entry: &Entry) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(entry).map_err(CodecError::Encode)?;
    line.push('\n');
    Ok(line)
}

/// 解码单行记录
pub fn decode(record: &str) -> Result<Entry, CodecError> {
    let line = record.trim_end_matches(['\r', '\n']);
    serde_json::from_str(line).map_err(|e| CodecError::corrupt(e.to_string()))
}
