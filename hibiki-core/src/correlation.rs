//! 応答の対応付け
//!
//! 発行したトークンと応答ハンドラを対応付け、一致する結果レコードが届いたときにハンドラを呼び出します。

use crate::errors::DebugError;
use hibiki_mi::{AdapterError, MiValue, Token};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// ハンドラに渡される応答（エラー結果は失敗として渡る）
pub type Response<'a> = Result<&'a MiValue, AdapterError>;

/// 応答ハンドラ
pub type ResponseHandler = Box<dyn FnMut(Response<'_>) + Send>;

/// ハンドラ呼び出し後のエントリの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    /// 1回呼び出したら削除する
    OneShot,
    /// 同じトークンで応答が続くコマンド用に残す
    Persistent,
}

/// 応答待ちエントリ
pub struct ResponseEntry {
    pub action: ResponseAction,
    pub handler: ResponseHandler,
}

/// トークン → 応答待ちエントリの表
#[derive(Default)]
pub struct CorrelationTable {
    entries: HashMap<Token, ResponseEntry>,
    /// `clear` のたびに進む世代番号
    generation: u64,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// エントリを登録する
    ///
    /// 同じトークンに応答待ちがある場合は不変条件違反として `DuplicateToken` を返す。
    /// 循環幅（1,000,000）に対して同時に応答待ちになる数は十分小さいため、検出のみ行う。
    pub fn register(
        &mut self,
        token: Token,
        handler: ResponseHandler,
        action: ResponseAction,
    ) -> Result<(), DebugError> {
        if self.entries.contains_key(&token) {
            return Err(DebugError::DuplicateToken(token));
        }
        self.entries.insert(token, ResponseEntry { action, handler });
        Ok(())
    }

    /// エントリを取り出す（現在の世代と一緒に返す）
    pub fn take(&mut self, token: Token) -> Option<(ResponseEntry, u64)> {
        self.entries
            .remove(&token)
            .map(|entry| (entry, self.generation))
    }

    /// 呼び出し後の `Persistent` エントリを戻す
    ///
    /// 取り出した後に表が破棄された、または同じトークンが再登録された場合は戻さない。
    pub fn restore(&mut self, token: Token, entry: ResponseEntry, generation: u64) {
        if generation == self.generation && !self.entries.contains_key(&token) {
            self.entries.insert(token, entry);
        }
    }

    pub fn contains(&self, token: Token) -> bool {
        self.entries.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全てのエントリを呼び出さずに破棄する
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }
}

/// 結果レコードを対応するハンドラへ届ける
///
/// ハンドラはロックを外した状態で呼び出される。
/// 対応するエントリがない場合はログに残して破棄し、`false` を返す。
pub fn dispatch_response(table: &Mutex<CorrelationTable>, token: Token, response: Response<'_>) -> bool {
    let taken = table
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take(token);

    let (mut entry, generation) = match taken {
        Some(taken) => taken,
        None => {
            debug!("Discarding result for unexpected token {:06}", token);
            return false;
        }
    };

    (entry.handler)(response);

    if entry.action == ResponseAction::Persistent {
        table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .restore(token, entry, generation);
    }
    true
}
