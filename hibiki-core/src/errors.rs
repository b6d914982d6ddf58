//! デバッグセッションのエラー型

use crate::SessionState;
use hibiki_mi::{AdapterError, ProtocolError, Token};
use hibiki_target::ChannelError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DebugError {
    /// デバッガを起動できない
    #[error("failed to launch debugger: {0}")]
    Launch(#[source] ChannelError),

    /// チャネルの読み書きに失敗した（セッションは終了する）
    #[error("debugger channel failed: {0}")]
    Io(#[source] ChannelError),

    /// MIの文法違反
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// 応答が時間内に届かなかった
    #[error("no response from debugger within {0:?}")]
    ResponseTimeout(Duration),

    /// 同じトークンに応答待ちが既にある（セッションは終了する）
    #[error("token {0:06} already has a pending response")]
    DuplicateToken(Token),

    /// デバッガがエラー結果を返した、または結果を解釈できなかった
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// セッションが実行中ではない
    #[error("debug session is not running")]
    NotRunning,

    /// 現在の状態では実行できない操作
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// 出力読み取りスレッドからのブロッキング呼び出し
    #[error("blocking call '{0}' issued from the debugger output reader")]
    ReaderContext(&'static str),

    #[error("invalid MI record pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl From<ChannelError> for DebugError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Launch { .. } => DebugError::Launch(e),
            ChannelError::NotRunning => DebugError::NotRunning,
            other => DebugError::Io(other),
        }
    }
}
