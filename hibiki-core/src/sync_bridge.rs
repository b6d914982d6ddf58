//! 非同期応答を同期的に待つための待機/発火プリミティブ

use crate::errors::DebugError;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// 待機/発火ブリッジ
///
/// `fire` で値をセットし、`wait` はセットされるまで待機します。
/// 値はフラグとして保持されるため、`wait` より先に `fire` されても取りこぼしません。
pub struct SyncBridge<T = ()> {
    slot: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T> SyncBridge<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// 値をセットして待機中の呼び出し元を起こす
    pub fn fire(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(value);
        self.cond.notify_all();
    }

    /// 値がセットされるまで最大 `timeout` だけ待機し、値を取り出す
    pub fn wait(&self, timeout: Duration) -> Result<T, DebugError> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let (mut slot, _) = self
            .cond
            .wait_timeout_while(slot, timeout, |slot| slot.is_none())
            .unwrap_or_else(|e| e.into_inner());
        slot.take().ok_or(DebugError::ResponseTimeout(timeout))
    }
}

impl<T> Default for SyncBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}
