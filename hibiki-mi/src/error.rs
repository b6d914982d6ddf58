//! MI層のエラー型

use thiserror::Error;

/// 行がMIの文法に従っていない
///
/// セッションにとって致命的ではなく、ログ行として扱われる
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed MI payload at byte {offset}: {message}")]
pub struct ProtocolError {
    pub offset: usize,
    pub message: String,
}

impl ProtocolError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// アダプタが結果ペイロードを解釈できなかった
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// デバッガが `^error` を返した
    #[error("debugger reported an error: {message}")]
    ErrorResult {
        message: String,
        code: Option<String>,
    },

    /// ペイロードに必要なフィールドがない
    #[error("unexpected {command} payload: missing '{field}'")]
    MalformedPayload {
        command: &'static str,
        field: &'static str,
    },

    /// 結果レコードのペイロードがMIの文法に従っていない
    #[error("unparseable result payload: {0}")]
    Protocol(#[from] ProtocolError),

    /// 対応するアダプタがない
    #[error("no protocol adapter for debugger '{0}'")]
    UnsupportedDebugger(String),
}

impl AdapterError {
    pub(crate) fn missing(command: &'static str, field: &'static str) -> Self {
        AdapterError::MalformedPayload { command, field }
    }
}
