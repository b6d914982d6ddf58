//! デバッグ状態のキャッシュ
//!
//! ブレークポイント表と各種スナップショット（フレーム・スレッド・変数）を保持します。
//! リスト系の解釈はスナップショットを丸ごと置き換えます。

use crate::model::{Breakpoint, BreakpointId, SourceFile, StackFrame, Thread, ThreadId, Variable};
use std::collections::BTreeMap;

/// ブレークポイント表
///
/// デバッガが割り当てたIDをキーとして保持します。
#[derive(Debug, Default, Clone)]
pub struct BreakpointTable {
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
}

impl BreakpointTable {
    /// 新しいブレークポイント表を作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// ブレークポイントを追加する（同じIDは上書き）
    pub fn insert(&mut self, bp: Breakpoint) {
        self.breakpoints.insert(bp.id, bp);
    }

    /// IDを指定してブレークポイントを削除する
    pub fn remove(&mut self, id: BreakpointId) -> Option<Breakpoint> {
        self.breakpoints.remove(&id)
    }

    /// 全てのブレークポイントを削除する
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// ブレークポイントを取得する
    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    /// 全てのブレークポイントを取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// 指定したファイルのブレークポイントIDを取得する
    pub fn ids_in_file(&self, path: &str) -> Vec<BreakpointId> {
        self.breakpoints
            .values()
            .filter(|bp| bp.is_in_file(path))
            .map(|bp| bp.id)
            .collect()
    }

    /// ブレークポイントの数を取得する
    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

/// セッションが保持するデバッグ状態
#[derive(Debug, Default, Clone)]
pub struct DebugState {
    pub breakpoints: BreakpointTable,
    pub frames: Vec<StackFrame>,
    pub threads: Vec<Thread>,
    pub current_thread: Option<ThreadId>,
    pub variables: Vec<Variable>,
    pub source_files: Vec<SourceFile>,
}

impl DebugState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全てのキャッシュを破棄する
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
