//! Hibiki デバッガプロセスのチャネル
//!
//! このクレートは、外部デバッガを子プロセスとして起動し、標準入出力を通じて通信するための機能を提供します。
//! コマンド行の書き込み、出力の行分割、プロセスのライフサイクルイベントの通知を行います。

pub mod error;
pub mod line_buffer;
pub mod process;

pub use error::ChannelError;
pub use line_buffer::LineBuffer;
pub use process::{ChannelEvent, EventSink, Launcher, ProcessChannel, ProcessLauncher, Transport};

/// チャネル操作の結果型
pub type Result<T> = std::result::Result<T, ChannelError>;
