//! プロトコルアダプタ
//!
//! デバッガの方言ごとに、コマンド文字列の生成と結果ペイロードの解釈を担当します。
//! セッションはこのトレイトだけに依存するため、新しい方言は実装を追加するだけで済みます。

mod gdb;

pub use gdb::GdbMiAdapter;

use crate::error::AdapterError;
use crate::model::{BreakpointId, StackFrame, ThreadId};
use crate::record::AsyncKind;
use crate::state::DebugState;
use crate::MiValue;
use std::path::Path;
use std::sync::Arc;

/// 停止イベントの情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopInfo {
    /// 停止理由（`breakpoint-hit`, `end-stepping-range`, `exited` など）
    pub reason: String,
    pub thread_id: Option<ThreadId>,
    pub frame: Option<StackFrame>,
}

/// 非同期レコードを解釈した結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncEffect {
    Stopped(StopInfo),
    /// `None` は全スレッド
    Running { thread_id: Option<ThreadId> },
    BreakpointsChanged,
    ThreadsChanged,
}

/// デバッガ方言のアダプタ
///
/// コマンド生成メソッドはトークンを含まないコマンド本体を返します。
/// 解釈メソッドは成功クラスの結果に対してのみ呼ばれ、
/// ペイロードが不正な場合は状態を変更せずにエラーを返します。
pub trait Adapter: Send + Sync {
    /// アダプタ名
    fn name(&self) -> &str;

    /// デバッガ起動時に引数の先頭へ追加する引数
    fn pre_arguments(&self) -> Vec<String>;

    fn launch_command(&self) -> String;
    fn quit(&self) -> String;
    fn kill(&self) -> String;
    /// `path` または `path:line`
    fn break_insert(&self, location: &str) -> String;
    fn break_remove(&self, id: BreakpointId) -> String;
    fn break_remove_all(&self) -> String;
    fn stack_list_frames(&self) -> String;
    fn stack_list_variables(&self) -> String;
    fn thread_info(&self) -> String;
    fn thread_select(&self, id: ThreadId) -> String;
    fn continue_(&self) -> String;
    /// ステップオーバー
    fn next(&self) -> String;
    /// ステップイン
    fn step(&self) -> String;
    /// ステップアウト
    fn finish(&self) -> String;
    fn pause(&self) -> String;
    fn list_source_files(&self) -> String;

    /// エラー結果のペイロードを失敗に変換する
    fn error_from_payload(&self, payload: &MiValue) -> AdapterError;

    fn interpret_break_insert(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<BreakpointId, AdapterError>;

    fn interpret_break_remove(
        &self,
        id: BreakpointId,
        _payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError> {
        state.breakpoints.remove(id);
        Ok(())
    }

    fn interpret_break_remove_all(
        &self,
        _payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError> {
        state.breakpoints.clear();
        Ok(())
    }

    fn interpret_stack_frames(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError>;

    fn interpret_variables(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError>;

    fn interpret_thread_info(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError>;

    fn interpret_thread_select(
        &self,
        id: ThreadId,
        _payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError> {
        state.current_thread = Some(id);
        Ok(())
    }

    fn interpret_source_files(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError>;

    /// 非同期レコードを解釈する（関心のないレコードは `None`）
    fn interpret_async(
        &self,
        kind: AsyncKind,
        class: &str,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Option<AsyncEffect>;
}

/// デバッガのパスからアダプタを選択する
pub fn select_adapter(program: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
    let file_name = Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program);

    if file_name.contains("gdb") {
        Ok(Arc::new(GdbMiAdapter::new()))
    } else {
        Err(AdapterError::UnsupportedDebugger(program.to_string()))
    }
}
