//! Hibiki デバッガ統合のコア機能
//!
//! このクレートは、外部デバッガをMIプロトコルで駆動するセッションを提供します。
//! トークンによる要求と応答の対応付け、非同期応答を同期的に待つためのブリッジ、
//! セッションの状態遷移と上位層へのイベント通知を統合します。

pub mod config;
pub mod correlation;
pub mod errors;
pub mod event;
pub mod session;
pub mod sync_bridge;
pub mod token;

pub use config::SessionConfig;
pub use correlation::{CorrelationTable, Response, ResponseAction, ResponseHandler};
pub use errors::DebugError;
pub use event::{EventBus, SessionEvent};
pub use session::{DebugSession, SessionState};
pub use sync_bridge::SyncBridge;
pub use token::{format_command_line, TokenIssuer, TOKEN_MODULUS};

// 他のクレートから使用するために再エクスポート
pub use hibiki_mi::{
    Adapter, Breakpoint, BreakpointId, GdbMiAdapter, SourceFile, StackFrame, StopInfo, Thread,
    ThreadId, ThreadState, Token, Variable, VariableScope,
};
pub use hibiki_target::{ChannelEvent, EventSink, Launcher, Transport};

/// デバッガの結果型
pub type Result<T> = std::result::Result<T, DebugError>;
