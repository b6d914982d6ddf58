//! デバッグセッションマネージャ
//!
//! プロセスチャネル、MIパーサー、プロトコルアダプタ、応答対応表、待機ブリッジを束ね、
//! 上位層に対してブレークポイント・フレーム・スレッド・変数の正規化されたビューを提供します。
//!
//! 状態遷移:
//! `NotRunning --initialize--> Configured --execute--> Starting --(起動イベント)--> Running`、
//! `Running --(quit | kill | クラッシュ | 終了)--> NotRunning`

use crate::config::SessionConfig;
use crate::correlation::{dispatch_response, CorrelationTable, ResponseAction, ResponseHandler};
use crate::errors::DebugError;
use crate::event::{EventBus, SessionEvent};
use crate::sync_bridge::SyncBridge;
use crate::token::{format_command_line, TokenIssuer};
use crate::Result;
use hibiki_mi::{
    select_adapter, Adapter, AdapterError, AsyncEffect, Breakpoint, BreakpointId, DebugState,
    MiParser, MiRecord, MiValue, SourceFile, StackFrame, Thread, ThreadId, Token, Variable,
};
use hibiki_target::{ChannelError, ChannelEvent, EventSink, Launcher, ProcessLauncher, Transport};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

thread_local! {
    /// 現在のスレッドが出力読み取りのイベント処理中かどうか
    static IN_READER: Cell<bool> = Cell::new(false);
}

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotRunning,
    Configured,
    Starting,
    Running,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => write!(f, "not running"),
            Self::Configured => write!(f, "configured"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// 状態遷移・トークン・書き込み口
///
/// このロックがチャネルへの書き込みロックを兼ねる
struct Control {
    state: SessionState,
    program: Option<String>,
    args: Vec<String>,
    tokens: TokenIssuer,
    transport: Option<Box<dyn Transport>>,
    /// `execute` が待つ起動イベント（起動成功で `true`）
    started: Option<Arc<SyncBridge<bool>>>,
}

struct Shared {
    config: SessionConfig,
    parser: MiParser,
    launcher: Arc<dyn Launcher>,
    control: Mutex<Control>,
    adapter: Mutex<Option<Arc<dyn Adapter>>>,
    table: Mutex<CorrelationTable>,
    cache: Arc<Mutex<DebugState>>,
    events: Arc<EventBus>,
    /// 起動ごとに進む番号（前のプロセスからの遅れたイベントを捨てる）
    epoch: AtomicU64,
}

/// デバッグセッション
///
/// 1つのインスタンスが1つのデバッガプロセスを管理します。
/// クローンは同じセッションを共有し、複数の呼び出し元スレッドから使用できます。
#[derive(Clone)]
pub struct DebugSession {
    shared: Arc<Shared>,
}

impl DebugSession {
    /// 子プロセスとしてデバッガを起動するセッションを作成する
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_launcher(config, Arc::new(ProcessLauncher))
    }

    /// 起動方法を指定してセッションを作成する
    pub fn with_launcher(config: SessionConfig, launcher: Arc<dyn Launcher>) -> Result<Self> {
        let shared = Shared {
            config,
            parser: MiParser::new()?,
            launcher,
            control: Mutex::new(Control {
                state: SessionState::NotRunning,
                program: None,
                args: Vec::new(),
                tokens: TokenIssuer::new(),
                transport: None,
                started: None,
            }),
            adapter: Mutex::new(None),
            table: Mutex::new(CorrelationTable::new()),
            cache: Arc::new(Mutex::new(DebugState::new())),
            events: Arc::new(EventBus::new()),
            epoch: AtomicU64::new(0),
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// 現在の状態
    pub fn state(&self) -> SessionState {
        lock(&self.shared.control).state
    }

    /// デバッガプロセスが起動中または実行中かどうか
    pub fn is_executing(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Starting | SessionState::Running
        )
    }

    /// デバッガプロセスのPID
    pub fn process_id(&self) -> Option<u32> {
        lock(&self.shared.control)
            .transport
            .as_ref()
            .and_then(|t| t.process_id())
    }

    /// イベントの購読を開始する
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// 応答待ちのエントリ数
    pub fn pending_responses(&self) -> usize {
        lock(&self.shared.table).len()
    }

    /// 選択されているアダプタの名前
    pub fn adapter_name(&self) -> Option<String> {
        lock(&self.shared.adapter)
            .as_ref()
            .map(|a| a.name().to_string())
    }

    /// デバッガのパスからアダプタを選択し、引数を保存する
    pub fn initialize(&self, program: &str, args: &[String]) -> Result<()> {
        let adapter = select_adapter(program)?;
        self.initialize_with_adapter(program, args, adapter)
    }

    /// アダプタを明示してセッションを設定する
    pub fn initialize_with_adapter(
        &self,
        program: &str,
        args: &[String],
        adapter: Arc<dyn Adapter>,
    ) -> Result<()> {
        let mut control = lock(&self.shared.control);
        if matches!(control.state, SessionState::Starting | SessionState::Running) {
            return Err(DebugError::InvalidState {
                operation: "initialize",
                state: control.state,
            });
        }

        info!("Configured debugger '{}' with adapter '{}'", program, adapter.name());
        control.program = Some(program.to_string());
        control.args = args.to_vec();
        control.state = SessionState::Configured;
        *lock(&self.shared.adapter) = Some(adapter);
        Ok(())
    }

    /// デバッガプロセスを起動し、起動イベントが届くまで待機する
    pub fn execute(&self) -> Result<()> {
        ensure_not_reader("execute")?;
        let bridge = Arc::new(SyncBridge::new());
        {
            let mut control = lock(&self.shared.control);
            if control.state != SessionState::Configured {
                return Err(DebugError::InvalidState {
                    operation: "execute",
                    state: control.state,
                });
            }
            let adapter = self.adapter()?;
            let program = control.program.clone().ok_or(DebugError::InvalidState {
                operation: "execute",
                state: control.state,
            })?;

            let mut args = adapter.pre_arguments();
            args.extend(control.args.iter().cloned());

            let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            control.started = Some(Arc::clone(&bridge));
            control.state = SessionState::Starting;

            let sink = Shared::sink(&self.shared, epoch);
            match self.shared.launcher.launch(&program, &args, sink) {
                Ok(transport) => control.transport = Some(transport),
                Err(e) => {
                    error!("Failed to launch {}: {}", program, e);
                    control.started = None;
                    control.state = SessionState::Configured;
                    return Err(e.into());
                }
            }
        }

        match bridge.wait(self.shared.config.startup_timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(DebugError::NotRunning),
            Err(e) => {
                warn!("Debugger did not start in time");
                let mut control = lock(&self.shared.control);
                self.shared.terminate_locked(&mut control, None);
                Err(e)
            }
        }
    }

    /// コマンドを送信する（結果は失敗時のみログに残す）
    pub fn command(&self, text: &str) -> Result<Token> {
        let events = Arc::clone(&self.shared.events);
        let command = text.to_string();
        let handler: ResponseHandler = Box::new(move |response| {
            if let Err(e) = response {
                warn!("Command '{}' failed: {}", command, e);
                events.emit(SessionEvent::Log(format!("{}: {}", command, e)));
            }
        });
        self.command_and_response(text, handler, ResponseAction::OneShot)
    }

    /// ハンドラを登録してからコマンドを送信する
    pub fn command_and_response(
        &self,
        text: &str,
        handler: ResponseHandler,
        action: ResponseAction,
    ) -> Result<Token> {
        let mut control = lock(&self.shared.control);
        self.shared.send_locked(&mut control, text, handler, action)
    }

    /// ターゲットプログラムを起動する
    pub fn launch_local(&self) -> Result<Token> {
        let text = self.adapter()?.launch_command();
        self.command(&text)
    }

    /// デバッガを終了する
    pub fn quit(&self) -> Result<Token> {
        let text = self.adapter()?.quit();
        self.command(&text)
    }

    /// ターゲットプログラムを強制終了する
    pub fn kill(&self) -> Result<Token> {
        let text = self.adapter()?.kill();
        self.command(&text)
    }

    /// 実行継続
    pub fn continue_(&self) -> Result<Token> {
        let text = self.adapter()?.continue_();
        self.command(&text)
    }

    /// ステップオーバー
    pub fn next(&self) -> Result<Token> {
        let text = self.adapter()?.next();
        self.command(&text)
    }

    /// ステップイン
    pub fn step(&self) -> Result<Token> {
        let text = self.adapter()?.step();
        self.command(&text)
    }

    /// ステップアウト
    pub fn finish(&self) -> Result<Token> {
        let text = self.adapter()?.finish();
        self.command(&text)
    }

    /// 実行中のターゲットを一時停止する
    pub fn pause(&self) -> Result<Token> {
        let text = self.adapter()?.pause();
        self.command(&text)
    }

    /// デバッガプロセスにSIGINTを送る
    pub fn interrupt(&self) -> Result<()> {
        let control = lock(&self.shared.control);
        if control.state != SessionState::Running {
            return Err(DebugError::NotRunning);
        }
        let transport = control.transport.as_ref().ok_or(DebugError::NotRunning)?;
        transport.interrupt()?;
        Ok(())
    }

    /// ブレークポイントを設定する（`path` または `path:line`）
    pub fn break_insert(&self, location: &str) -> Result<BreakpointId> {
        self.call_blocking(
            "break_insert",
            |a| a.break_insert(location),
            |a, payload, state| a.interpret_break_insert(payload, state),
            Some(SessionEvent::BreakpointsChanged),
        )
    }

    /// ファイルと行を指定してブレークポイントを設定する
    pub fn break_insert_at(&self, file: &str, line: u32) -> Result<BreakpointId> {
        self.break_insert(&format!("{}:{}", file, line))
    }

    /// デバッガが割り当てたIDでブレークポイントを削除する
    pub fn break_remove(&self, id: BreakpointId) -> Result<()> {
        self.call_blocking(
            "break_remove",
            |a| a.break_remove(id),
            move |a, payload, state| a.interpret_break_remove(id, payload, state),
            Some(SessionEvent::BreakpointsChanged),
        )
    }

    /// 全てのブレークポイントを削除する
    pub fn break_remove_all(&self) -> Result<()> {
        self.call_blocking(
            "break_remove_all",
            |a| a.break_remove_all(),
            |a, payload, state| a.interpret_break_remove_all(payload, state),
            Some(SessionEvent::BreakpointsChanged),
        )
    }

    /// 指定したファイルのブレークポイントを全て削除し、削除した数を返す
    pub fn remove_breakpoints_in_file(&self, path: &str) -> Result<usize> {
        let ids = lock(&self.shared.cache).breakpoints.ids_in_file(path);
        for id in &ids {
            self.break_remove(*id)?;
        }
        Ok(ids.len())
    }

    /// スタックフレームを取得し、更新後のスナップショットを返す
    pub fn stack_list_frames(&self) -> Result<Vec<StackFrame>> {
        self.call_blocking(
            "stack_list_frames",
            |a| a.stack_list_frames(),
            |a, payload, state| a.interpret_stack_frames(payload, state),
            None,
        )?;
        Ok(self.stack_frames())
    }

    /// 現在のフレームの変数を取得し、更新後のスナップショットを返す
    pub fn stack_list_variables(&self) -> Result<Vec<Variable>> {
        self.call_blocking(
            "stack_list_variables",
            |a| a.stack_list_variables(),
            |a, payload, state| a.interpret_variables(payload, state),
            None,
        )?;
        Ok(self.variables())
    }

    /// スレッド一覧を取得し、更新後のスナップショットを返す
    pub fn thread_info(&self) -> Result<Vec<Thread>> {
        self.call_blocking(
            "thread_info",
            |a| a.thread_info(),
            |a, payload, state| a.interpret_thread_info(payload, state),
            Some(SessionEvent::ThreadsChanged),
        )?;
        Ok(self.threads())
    }

    /// スレッドを選択する
    pub fn thread_select(&self, id: ThreadId) -> Result<()> {
        self.call_blocking(
            "thread_select",
            |a| a.thread_select(id),
            move |a, payload, state| a.interpret_thread_select(id, payload, state),
            Some(SessionEvent::ThreadsChanged),
        )
    }

    /// ソースファイル一覧を取得し、更新後のスナップショットを返す
    pub fn list_source_files(&self) -> Result<Vec<SourceFile>> {
        self.call_blocking(
            "list_source_files",
            |a| a.list_source_files(),
            |a, payload, state| a.interpret_source_files(payload, state),
            None,
        )?;
        Ok(self.source_files())
    }

    /// 現在のブレークポイント表
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        lock(&self.shared.cache).breakpoints.all().cloned().collect()
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Option<Breakpoint> {
        lock(&self.shared.cache).breakpoints.get(id).cloned()
    }

    /// 最後に取得したスタックフレーム
    pub fn stack_frames(&self) -> Vec<StackFrame> {
        lock(&self.shared.cache).frames.clone()
    }

    /// 最後に取得したスレッド一覧
    pub fn threads(&self) -> Vec<Thread> {
        lock(&self.shared.cache).threads.clone()
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        lock(&self.shared.cache).current_thread
    }

    /// 最後に取得した変数一覧
    pub fn variables(&self) -> Vec<Variable> {
        lock(&self.shared.cache).variables.clone()
    }

    /// 最後に取得したソースファイル一覧
    pub fn source_files(&self) -> Vec<SourceFile> {
        lock(&self.shared.cache).source_files.clone()
    }

    fn adapter(&self) -> Result<Arc<dyn Adapter>> {
        lock(&self.shared.adapter)
            .clone()
            .ok_or(DebugError::NotRunning)
    }

    /// 応答が反映されるまで待つコマンド
    ///
    /// 解釈はハンドラ内で行われ、結果は待機ブリッジ経由で呼び出し元に返る。
    /// エラー結果はタイムアウトではなく `DebugError::Adapter` になる。
    fn call_blocking<T, F>(
        &self,
        operation: &'static str,
        text: impl FnOnce(&dyn Adapter) -> String,
        interpret: F,
        changed: Option<SessionEvent>,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Adapter, &MiValue, &mut DebugState) -> std::result::Result<T, AdapterError>
            + Send
            + 'static,
    {
        ensure_not_reader(operation)?;
        let adapter = self.adapter()?;
        let text = text(adapter.as_ref());

        let bridge = Arc::new(SyncBridge::new());
        let fire = Arc::clone(&bridge);
        let cache = Arc::clone(&self.shared.cache);
        let events = Arc::clone(&self.shared.events);
        let mut interpret = Some(interpret);

        let handler: ResponseHandler = Box::new(move |response| {
            let interpret = match interpret.take() {
                Some(interpret) => interpret,
                None => return,
            };
            let outcome = response.and_then(|payload| {
                interpret(adapter.as_ref(), payload, &mut lock(&cache))
            });
            if outcome.is_ok() {
                if let Some(event) = changed.clone() {
                    events.emit(event);
                }
            }
            fire.fire(outcome);
        });

        let token = self.command_and_response(&text, handler, ResponseAction::OneShot)?;
        debug!("Waiting for {} (token {:06})", operation, token);
        match bridge.wait(self.shared.config.response_timeout) {
            Ok(outcome) => Ok(outcome?),
            Err(e) => {
                // 遅れて届いた応答でキャッシュが書き換わらないようにエントリを捨てる
                lock(&self.shared.table).take(token);
                warn!("{} (token {:06}) timed out", operation, token);
                Err(e)
            }
        }
    }
}

impl Shared {
    /// 起動ごとのイベント受け取り口を作る
    fn sink(shared: &Arc<Self>, epoch: u64) -> EventSink {
        let weak = Arc::downgrade(shared);
        Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(epoch, event);
            }
        })
    }

    fn send_locked(
        &self,
        control: &mut Control,
        text: &str,
        handler: ResponseHandler,
        action: ResponseAction,
    ) -> Result<Token> {
        if control.state != SessionState::Running {
            return Err(DebugError::NotRunning);
        }

        let token = control.tokens.issue();
        let registered = lock(&self.table).register(token, handler, action);
        if let Err(e) = registered {
            error!("{}", e);
            self.terminate_locked(control, None);
            return Err(e);
        }

        let line = format_command_line(token, text);
        debug!("Command: {}", line.trim_end());
        let written = match control.transport.as_mut() {
            Some(transport) => transport.write_line(&line),
            None => Err(ChannelError::NotRunning),
        };
        if let Err(e) = written {
            error!("Failed to write command {:06}: {}", token, e);
            self.terminate_locked(control, None);
            return Err(DebugError::Io(e));
        }

        self.events
            .emit(SessionEvent::Log(format!("Command: {}", line.trim_end())));
        Ok(token)
    }

    /// セッションを終了状態にする
    ///
    /// 応答待ちのエントリは呼び出さずに破棄し、終了イベントを1回だけ送る。
    fn terminate_locked(&self, control: &mut Control, exit_code: Option<i32>) -> bool {
        if !matches!(control.state, SessionState::Starting | SessionState::Running) {
            return false;
        }
        control.state = SessionState::NotRunning;

        if let Some(mut transport) = control.transport.take() {
            transport.terminate();
        }
        if let Some(started) = control.started.take() {
            started.fire(false);
        }

        let discarded = {
            let mut table = lock(&self.table);
            let pending = table.len();
            table.clear();
            pending
        };
        lock(&self.cache).clear();

        info!(
            "Debug session terminated (exit code {:?}, {} pending responses discarded)",
            exit_code, discarded
        );
        self.events.emit(SessionEvent::Terminated { exit_code });
        true
    }

    fn handle_event(&self, epoch: u64, event: ChannelEvent) {
        if epoch != self.epoch.load(Ordering::SeqCst) {
            debug!("Ignoring event from a previous debugger process: {:?}", event);
            return;
        }

        let was_reader = IN_READER.with(|flag| flag.replace(true));
        match event {
            ChannelEvent::Started { pid } => self.on_started(pid),
            ChannelEvent::Line(line) => self.handle_line(&line),
            ChannelEvent::Stderr(line) => {
                debug!(target: "hibiki::mi", "stderr: {}", line);
                self.events.emit(SessionEvent::Log(line));
            }
            ChannelEvent::Finished { exit_code } => {
                let mut control = lock(&self.control);
                self.terminate_locked(&mut control, exit_code);
            }
        }
        IN_READER.with(|flag| flag.set(was_reader));
    }

    fn on_started(&self, pid: u32) {
        let mut control = lock(&self.control);
        if control.state != SessionState::Starting {
            return;
        }
        control.tokens.reset();
        lock(&self.table).clear();
        control.state = SessionState::Running;
        info!("Debugger process started (pid {})", pid);
        if let Some(started) = control.started.take() {
            started.fire(true);
        }
    }

    fn handle_line(&self, line: &str) {
        let adapter = lock(&self.adapter).clone();
        let record = self.parser.parse_line(line);

        if let Some(text) = record.log_text() {
            debug!(target: "hibiki::mi", "{}", text.trim_end());
            self.events.emit(SessionEvent::Log(text.to_string()));
        }

        match record {
            MiRecord::Result {
                token: Some(token),
                class,
                payload,
            } => {
                let response = if class.is_success() {
                    Ok(&payload)
                } else {
                    Err(match &adapter {
                        Some(adapter) => adapter.error_from_payload(&payload),
                        None => AdapterError::ErrorResult {
                            message: payload.get_str("msg").unwrap_or("unknown error").to_string(),
                            code: None,
                        },
                    })
                };
                dispatch_response(&self.table, token, response);
            }
            MiRecord::Result { token: None, class, .. } => {
                debug!("Result record without token: {:?}", class);
            }
            MiRecord::MalformedResult {
                token: Some(token),
                error,
                ..
            } => {
                warn!("Malformed result for token {:06}: {}", token, error);
                dispatch_response(&self.table, token, Err(AdapterError::Protocol(error)));
            }
            MiRecord::AsyncNotify {
                kind,
                class,
                payload,
            } => {
                let Some(adapter) = adapter else {
                    return;
                };
                let effect = adapter.interpret_async(kind, &class, &payload, &mut lock(&self.cache));
                let event = match effect {
                    Some(AsyncEffect::Stopped(info)) => SessionEvent::Stopped(info),
                    Some(AsyncEffect::Running { thread_id }) => SessionEvent::Running { thread_id },
                    Some(AsyncEffect::BreakpointsChanged) => SessionEvent::BreakpointsChanged,
                    Some(AsyncEffect::ThreadsChanged) => SessionEvent::ThreadsChanged,
                    None => return,
                };
                self.events.emit(event);
            }
            // ストリームと解釈できない行はログとして転送済み
            MiRecord::MalformedResult { token: None, .. }
            | MiRecord::Stream { .. }
            | MiRecord::Prompt
            | MiRecord::Unparseable { .. } => {}
        }
    }
}

/// 出力読み取りのイベント処理中にブロッキング呼び出しをしていないか確認する
fn ensure_not_reader(operation: &'static str) -> Result<()> {
    if IN_READER.with(|flag| flag.get()) {
        return Err(DebugError::ReaderContext(operation));
    }
    Ok(())
}
