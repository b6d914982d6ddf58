//! 上位層へのセッションイベント

use hibiki_mi::{StopInfo, ThreadId};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// セッションイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// ログ行（ストリームレコード、送信コマンド、解釈できない行）
    Log(String),
    /// ブレークポイント表が変化した
    BreakpointsChanged,
    /// ターゲットが停止した
    Stopped(StopInfo),
    /// ターゲットが実行を再開した
    Running { thread_id: Option<ThreadId> },
    /// スレッド一覧が変化した
    ThreadsChanged,
    /// セッションが終了した
    Terminated { exit_code: Option<i32> },
}

/// イベントの購読者一覧
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 購読を開始する
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// 全ての購読者へ送信する（切断された購読者は取り除く）
    pub fn emit(&self, event: SessionEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
