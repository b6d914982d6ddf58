//! GDB/MI アダプタ

use super::{Adapter, AsyncEffect, StopInfo};
use crate::error::AdapterError;
use crate::model::{
    Breakpoint, BreakpointId, SourceFile, StackFrame, Thread, ThreadId, ThreadState, Variable,
    VariableScope,
};
use crate::record::AsyncKind;
use crate::state::DebugState;
use crate::MiValue;
use tracing::debug;

/// GDB/MI アダプタ
#[derive(Debug, Default, Clone)]
pub struct GdbMiAdapter;

impl GdbMiAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// 空白や引用符を含む引数をMIの文字列定数として引用する
fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// マングルされたままのRustシンボルをデマングルする
fn demangle_function(name: &str) -> String {
    if name.starts_with("_ZN") || name.starts_with("_R") {
        if let Ok(demangled) = rustc_demangle::try_demangle(name) {
            return format!("{:#}", demangled);
        }
    }
    name.to_string()
}

fn parse_breakpoint(bkpt: &MiValue) -> Result<Breakpoint, AdapterError> {
    let id = bkpt
        .get_u32("number")
        .ok_or_else(|| AdapterError::missing("break-insert", "number"))?;
    Ok(Breakpoint {
        id,
        file: bkpt.get_str("file").map(str::to_string),
        fullname: bkpt.get_str("fullname").map(str::to_string),
        line: bkpt.get_u32("line"),
        enabled: bkpt.get_str("enabled").map_or(true, |e| e == "y"),
    })
}

/// 複数ロケーションのブレークポイントの最初のロケーション
///
/// mi3 では `bkpt.locations`、mi2 では `bkpt` の後に続くキーなしのタプル
fn first_location<'a>(payload: &'a MiValue, bkpt: &'a MiValue) -> Option<&'a MiValue> {
    if let Some(location) = bkpt.get_list("locations").and_then(|l| l.first()) {
        return Some(location);
    }
    match payload {
        MiValue::Tuple(entries) => entries
            .iter()
            .filter(|(key, _)| key == "bkpt")
            .map(|(_, value)| value)
            .nth(1),
        _ => None,
    }
}

fn parse_frame(frame: &MiValue) -> StackFrame {
    StackFrame {
        index: frame.get_u32("level").unwrap_or(0),
        function: frame.get_str("func").map(demangle_function),
        file: frame.get_str("file").map(str::to_string),
        line: frame.get_u32("line"),
        address: frame.get_address("addr"),
    }
}

fn parse_thread_id(value: Option<&str>) -> Option<ThreadId> {
    value.and_then(|s| s.parse().ok())
}

impl Adapter for GdbMiAdapter {
    fn name(&self) -> &str {
        "gdb-mi"
    }

    fn pre_arguments(&self) -> Vec<String> {
        vec![
            "-q".to_string(),
            "-interpreter=mi2".to_string(),
            "--args".to_string(),
        ]
    }

    fn launch_command(&self) -> String {
        "-exec-run".to_string()
    }

    fn quit(&self) -> String {
        "-gdb-exit".to_string()
    }

    fn kill(&self) -> String {
        "kill".to_string()
    }

    fn break_insert(&self, location: &str) -> String {
        format!("-break-insert {}", quote_argument(location))
    }

    fn break_remove(&self, id: BreakpointId) -> String {
        format!("-break-delete {}", id)
    }

    fn break_remove_all(&self) -> String {
        "-break-delete".to_string()
    }

    fn stack_list_frames(&self) -> String {
        "-stack-list-frames".to_string()
    }

    fn stack_list_variables(&self) -> String {
        "-stack-list-variables --simple-values".to_string()
    }

    fn thread_info(&self) -> String {
        "-thread-info".to_string()
    }

    fn thread_select(&self, id: ThreadId) -> String {
        format!("-thread-select {}", id)
    }

    fn continue_(&self) -> String {
        "-exec-continue".to_string()
    }

    fn next(&self) -> String {
        "-exec-next".to_string()
    }

    fn step(&self) -> String {
        "-exec-step".to_string()
    }

    fn finish(&self) -> String {
        "-exec-finish".to_string()
    }

    fn pause(&self) -> String {
        "-exec-interrupt".to_string()
    }

    fn list_source_files(&self) -> String {
        "-file-list-exec-source-files".to_string()
    }

    fn error_from_payload(&self, payload: &MiValue) -> AdapterError {
        AdapterError::ErrorResult {
            message: payload
                .get_str("msg")
                .unwrap_or("unknown error")
                .to_string(),
            code: payload.get_str("code").map(str::to_string),
        }
    }

    fn interpret_break_insert(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<BreakpointId, AdapterError> {
        let bkpt = payload
            .get("bkpt")
            .ok_or_else(|| AdapterError::missing("break-insert", "bkpt"))?;
        let mut bp = parse_breakpoint(bkpt)?;
        if bp.file.is_none() {
            if let Some(location) = first_location(payload, bkpt) {
                bp.file = location.get_str("file").map(str::to_string);
                bp.fullname = location.get_str("fullname").map(str::to_string);
                bp.line = location.get_u32("line");
            }
        }
        let id = bp.id;
        state.breakpoints.insert(bp);
        Ok(id)
    }

    fn interpret_stack_frames(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError> {
        let stack = payload
            .get_list("stack")
            .ok_or_else(|| AdapterError::missing("stack-list-frames", "stack"))?;
        state.frames = stack.iter().map(parse_frame).collect();
        Ok(())
    }

    fn interpret_variables(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError> {
        let list = payload
            .get_list("variables")
            .ok_or_else(|| AdapterError::missing("stack-list-variables", "variables"))?;

        let variables = list
            .iter()
            .map(|var| {
                let name = var
                    .get_str("name")
                    .ok_or_else(|| AdapterError::missing("stack-list-variables", "name"))?;
                let scope = match var.get_str("arg") {
                    Some("1") => VariableScope::Argument,
                    _ => VariableScope::Local,
                };
                Ok(Variable {
                    name: name.to_string(),
                    value: var.get_str("value").map(str::to_string),
                    type_name: var.get_str("type").map(str::to_string),
                    scope,
                })
            })
            .collect::<Result<Vec<_>, AdapterError>>()?;

        state.variables = variables;
        Ok(())
    }

    fn interpret_thread_info(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError> {
        let list = payload
            .get_list("threads")
            .ok_or_else(|| AdapterError::missing("thread-info", "threads"))?;

        let threads = list
            .iter()
            .map(|t| {
                let id = t
                    .get_u32("id")
                    .ok_or_else(|| AdapterError::missing("thread-info", "id"))?;
                let name = t
                    .get_str("name")
                    .or_else(|| t.get_str("target-id"))
                    .unwrap_or_default();
                Ok(Thread {
                    id,
                    name: name.to_string(),
                    state: ThreadState::parse(t.get_str("state").unwrap_or_default()),
                })
            })
            .collect::<Result<Vec<_>, AdapterError>>()?;

        state.threads = threads;
        if let Some(current) = parse_thread_id(payload.get_str("current-thread-id")) {
            state.current_thread = Some(current);
        }
        Ok(())
    }

    fn interpret_source_files(
        &self,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Result<(), AdapterError> {
        let list = payload
            .get_list("files")
            .ok_or_else(|| AdapterError::missing("file-list-exec-source-files", "files"))?;

        let mut files: Vec<SourceFile> = list
            .iter()
            .filter_map(|f| {
                Some(SourceFile {
                    file: f.get_str("file")?.to_string(),
                    fullname: f.get_str("fullname").map(str::to_string),
                })
            })
            .collect();
        files.dedup();

        state.source_files = files;
        Ok(())
    }

    fn interpret_async(
        &self,
        kind: AsyncKind,
        class: &str,
        payload: &MiValue,
        state: &mut DebugState,
    ) -> Option<AsyncEffect> {
        match (kind, class) {
            (AsyncKind::Exec, "stopped") => {
                let thread_id = parse_thread_id(payload.get_str("thread-id"));
                if thread_id.is_some() {
                    state.current_thread = thread_id;
                }
                for thread in state.threads.iter_mut() {
                    thread.state = ThreadState::Stopped;
                }
                Some(AsyncEffect::Stopped(StopInfo {
                    reason: payload.get_str("reason").unwrap_or("unknown").to_string(),
                    thread_id,
                    frame: payload.get("frame").map(parse_frame),
                }))
            }
            (AsyncKind::Exec, "running") => {
                let thread_id = parse_thread_id(payload.get_str("thread-id"));
                for thread in state.threads.iter_mut() {
                    if thread_id.map_or(true, |id| id == thread.id) {
                        thread.state = ThreadState::Running;
                    }
                }
                Some(AsyncEffect::Running { thread_id })
            }
            (AsyncKind::Notify, "breakpoint-created") | (AsyncKind::Notify, "breakpoint-modified") => {
                let bp = payload.get("bkpt").map(parse_breakpoint)?.ok()?;
                state.breakpoints.insert(bp);
                Some(AsyncEffect::BreakpointsChanged)
            }
            (AsyncKind::Notify, "breakpoint-deleted") => {
                let id = payload.get_u32("id")?;
                state.breakpoints.remove(id)?;
                Some(AsyncEffect::BreakpointsChanged)
            }
            (AsyncKind::Notify, "thread-created") => {
                let id = payload.get_u32("id")?;
                if !state.threads.iter().any(|t| t.id == id) {
                    state.threads.push(Thread {
                        id,
                        name: String::new(),
                        state: ThreadState::Running,
                    });
                }
                Some(AsyncEffect::ThreadsChanged)
            }
            (AsyncKind::Notify, "thread-exited") => {
                let id = payload.get_u32("id")?;
                state.threads.retain(|t| t.id != id);
                if state.current_thread == Some(id) {
                    state.current_thread = None;
                }
                Some(AsyncEffect::ThreadsChanged)
            }
            (AsyncKind::Notify, "thread-selected") => {
                state.current_thread = parse_thread_id(payload.get_str("id"));
                Some(AsyncEffect::ThreadsChanged)
            }
            _ => {
                debug!("Ignoring async record: {:?} {}", kind, class);
                None
            }
        }
    }
}
