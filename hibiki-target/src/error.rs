//! チャネルのエラー型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// 実行ファイルが見つからない、または起動できない
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 標準入出力の読み書きに失敗した
    #[error("debugger channel I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// シグナルの送信に失敗した
    #[error("failed to signal debugger process: {0}")]
    Signal(#[from] nix::Error),

    /// プロセスが起動していない
    #[error("debugger process is not running")]
    NotRunning,
}
