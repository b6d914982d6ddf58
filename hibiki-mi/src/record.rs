//! MI出力レコード

use crate::error::ProtocolError;
use crate::MiValue;

/// トークン（コマンド行の先頭6桁）
pub type Token = u32;

/// 結果レコードのクラス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Exit,
    Error,
}

impl ResultClass {
    /// クラス名をパースする
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "done" => Some(ResultClass::Done),
            "running" => Some(ResultClass::Running),
            "connected" => Some(ResultClass::Connected),
            "exit" => Some(ResultClass::Exit),
            "error" => Some(ResultClass::Error),
            _ => None,
        }
    }

    /// 成功系のクラスかどうか
    pub fn is_success(&self) -> bool {
        !matches!(self, ResultClass::Error)
    }
}

/// 非同期レコードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    /// `*` 実行状態の変化
    Exec,
    /// `+` 進捗ステータス
    Status,
    /// `=` 帯域外通知
    Notify,
}

/// ストリームレコードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `~` コンソール出力
    Console,
    /// `@` ターゲット出力
    Target,
    /// `&` デバッガ内部ログ
    Log,
}

/// 1行分のMI出力レコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiRecord {
    /// `<token>^<class>,<results>`
    Result {
        token: Option<Token>,
        class: ResultClass,
        payload: MiValue,
    },
    /// `*`, `+`, `=` で始まる非同期レコード（トークンは持たない）
    AsyncNotify {
        kind: AsyncKind,
        class: String,
        payload: MiValue,
    },
    /// `~`, `@`, `&` で始まるストリームレコード
    Stream { kind: StreamKind, text: String },
    /// `(gdb)` プロンプト
    Prompt,
    /// 結果レコードの形をしているがペイロードが壊れている行
    ///
    /// トークンとクラスは保持し、応答待ちの呼び出し元にエラーとして届ける
    MalformedResult {
        token: Option<Token>,
        class: ResultClass,
        raw: String,
        error: ProtocolError,
    },
    /// どの形式にも当てはまらない行
    Unparseable { raw: String },
}

impl MiRecord {
    /// ログにそのまま流すべきテキストを取得する
    pub fn log_text(&self) -> Option<&str> {
        match self {
            MiRecord::Stream { text, .. } => Some(text),
            MiRecord::MalformedResult { raw, .. } | MiRecord::Unparseable { raw } => Some(raw),
            _ => None,
        }
    }
}
