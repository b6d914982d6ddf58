//! セッション設定

use std::time::Duration;

/// 応答待ちの既定タイムアウト
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// 起動待ちの既定タイムアウト
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// デバッグセッションの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// ブロッキング操作が応答を待つ上限
    pub response_timeout: Duration,
    /// `execute` がプロセス起動イベントを待つ上限
    pub startup_timeout: Duration,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }
}
