//! セッション全体のテスト
//!
//! 実際のデバッガの代わりに、書き込まれた行を記録し出力行を注入できるランチャを使う。

use hibiki_core::{
    ChannelEvent, DebugError, DebugSession, EventSink, GdbMiAdapter, Launcher, ResponseAction,
    SessionConfig, SessionEvent, SessionState, Token, Transport,
};
use hibiki_mi::AdapterError;
use hibiki_target::ChannelError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Harness {
    written: Mutex<Vec<String>>,
    written_cond: Condvar,
    sink: Mutex<Option<EventSink>>,
    args: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
    terminated: AtomicUsize,
}

impl Harness {
    fn sink(&self) -> EventSink {
        self.sink.lock().unwrap().clone().expect("not launched")
    }

    fn emit(&self, event: ChannelEvent) {
        let sink = self.sink();
        sink(event);
    }

    fn line(&self, line: &str) {
        self.emit(ChannelEvent::Line(line.to_string()));
    }

    fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    /// `count` 行書き込まれるまで待つ
    fn wait_for_lines(&self, count: usize) -> Vec<String> {
        let deadline = Instant::now() + WAIT;
        let mut written = self.written.lock().unwrap();
        while written.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            assert!(!remaining.is_zero(), "timed out waiting for {} lines", count);
            written = self.written_cond.wait_timeout(written, remaining).unwrap().0;
        }
        written.clone()
    }

    /// `index` 番目の行が書き込まれたら、そのトークンで応答する
    fn respond_to(
        self: &Arc<Self>,
        index: usize,
        reply: impl FnOnce(Token) -> String + Send + 'static,
    ) -> thread::JoinHandle<()> {
        let harness = Arc::clone(self);
        thread::spawn(move || {
            let lines = harness.wait_for_lines(index + 1);
            let token: Token = lines[index][..6].parse().unwrap();
            harness.line(&reply(token));
        })
    }
}

struct FakeLauncher(Arc<Harness>);

impl Launcher for FakeLauncher {
    fn launch(
        &self,
        _program: &str,
        args: &[String],
        sink: EventSink,
    ) -> hibiki_target::Result<Box<dyn Transport>> {
        *self.0.args.lock().unwrap() = args.to_vec();
        self.0.written.lock().unwrap().clear();
        *self.0.sink.lock().unwrap() = Some(Arc::clone(&sink));
        thread::spawn(move || sink(ChannelEvent::Started { pid: 4242 }));
        Ok(Box::new(FakeTransport(Arc::clone(&self.0))))
    }
}

struct FakeTransport(Arc<Harness>);

impl Transport for FakeTransport {
    fn write_line(&mut self, line: &str) -> hibiki_target::Result<()> {
        if self.0.fail_writes.load(Ordering::SeqCst) {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        self.0.written.lock().unwrap().push(line.to_string());
        self.0.written_cond.notify_all();
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        Some(4242)
    }

    fn interrupt(&self) -> hibiki_target::Result<()> {
        Ok(())
    }

    fn terminate(&mut self) {
        self.0.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

fn start_session(config: SessionConfig) -> (DebugSession, Arc<Harness>, Receiver<SessionEvent>) {
    let harness = Arc::new(Harness::default());
    let session =
        DebugSession::with_launcher(config, Arc::new(FakeLauncher(Arc::clone(&harness)))).unwrap();
    let events = session.subscribe();
    session
        .initialize("gdb", &["./a.out".to_string()])
        .unwrap();
    session.execute().unwrap();
    (session, harness, events)
}

fn running_session() -> (DebugSession, Arc<Harness>, Receiver<SessionEvent>) {
    start_session(SessionConfig::default())
}

fn drain(events: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
    events.try_iter().collect()
}

#[test]
fn test_execute_prepends_adapter_arguments() {
    let (session, harness, _events) = running_session();
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.is_executing());
    assert_eq!(session.process_id(), Some(4242));
    assert_eq!(
        *harness.args.lock().unwrap(),
        vec!["-q", "-interpreter=mi2", "--args", "./a.out"]
    );
}

#[test]
fn test_token_sequence_and_line_format() {
    let (session, harness, _events) = running_session();

    assert_eq!(session.launch_local().unwrap(), 0);
    assert_eq!(session.command("-gdb-version").unwrap(), 1);
    let responder = harness.respond_to(2, |token| format!("{:06}^done,files=[]", token));
    assert!(session.list_source_files().unwrap().is_empty());
    responder.join().unwrap();

    let written = harness.written();
    assert_eq!(written[0], "000000-exec-run\n");
    assert_eq!(written[1], "000001-gdb-version\n");
    assert_eq!(written[2], "000002-file-list-exec-source-files\n");
}

#[test]
fn test_list_source_files_waits_for_its_own_response() {
    let (session, harness, _events) = running_session();
    session.continue_().unwrap();

    // 先に発行したコマンドの応答が割り込んでも、自分の応答まで待つ
    let replier = Arc::clone(&harness);
    let responder = thread::spawn(move || {
        replier.wait_for_lines(2);
        replier.line("000000^running");
        thread::sleep(Duration::from_millis(20));
        replier.line(
            "000001^done,files=[{file=\"main.c\",fullname=\"/src/main.c\"},{file=\"util.c\"}]",
        );
    });
    let files = session.list_source_files().unwrap();
    responder.join().unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(files[0].fullname.as_deref(), Some("/src/main.c"));
    assert_eq!(session.source_files(), files);
    assert_eq!(session.pending_responses(), 0);
}

#[test]
fn test_break_insert_response_for_token_five() {
    let (session, harness, events) = running_session();
    for _ in 0..5 {
        session.continue_().unwrap();
    }
    assert_eq!(session.pending_responses(), 5);

    let responder = harness.respond_to(5, |token| {
        assert_eq!(token, 5);
        "000005^done,bkpt={number=\"1\",file=\"main.c\",line=\"10\"}".to_string()
    });
    let id = session.break_insert("main.c:10").unwrap();
    responder.join().unwrap();

    assert_eq!(id, 1);
    assert_eq!(harness.written()[5], "000005-break-insert main.c:10\n");
    let breakpoints = session.breakpoints();
    assert_eq!(breakpoints.len(), 1);
    assert_eq!(breakpoints[0].file.as_deref(), Some("main.c"));
    assert_eq!(breakpoints[0].line, Some(10));
    // トークン5のエントリだけが消える
    assert_eq!(session.pending_responses(), 5);
    assert!(drain(&events).contains(&SessionEvent::BreakpointsChanged));
}

#[test]
fn test_break_remove_and_remove_all() {
    let (session, harness, _events) = running_session();

    for (i, line) in [10u32, 20, 30].into_iter().enumerate() {
        let number = i + 1;
        let responder = harness.respond_to(i, move |token| {
            format!(
                "{:06}^done,bkpt={{number=\"{}\",file=\"main.c\",line=\"{}\"}}",
                token, number, line
            )
        });
        session.break_insert_at("main.c", line).unwrap();
        responder.join().unwrap();
    }
    assert_eq!(session.breakpoints().len(), 3);

    let responder = harness.respond_to(3, |token| format!("{:06}^done", token));
    session.break_remove(2).unwrap();
    responder.join().unwrap();
    assert_eq!(harness.written()[3], "000003-break-delete 2\n");
    let ids: Vec<_> = session.breakpoints().iter().map(|bp| bp.id).collect();
    assert_eq!(ids, vec![1, 3]);

    let responder = harness.respond_to(4, |token| format!("{:06}^done", token));
    session.break_remove_all().unwrap();
    responder.join().unwrap();
    assert!(session.breakpoints().is_empty());
}

#[test]
fn test_remove_breakpoints_in_file() {
    let (session, harness, _events) = running_session();
    harness.line("=breakpoint-created,bkpt={number=\"1\",file=\"a.c\",line=\"1\"}");
    harness.line("=breakpoint-created,bkpt={number=\"2\",file=\"b.c\",line=\"1\"}");
    harness.line("=breakpoint-created,bkpt={number=\"3\",file=\"a.c\",line=\"9\"}");
    assert_eq!(session.breakpoints().len(), 3);

    let first = harness.respond_to(0, |token| format!("{:06}^done", token));
    let second = harness.respond_to(1, |token| format!("{:06}^done", token));
    assert_eq!(session.remove_breakpoints_in_file("a.c").unwrap(), 2);
    first.join().unwrap();
    second.join().unwrap();

    let remaining: Vec<_> = session.breakpoints().iter().map(|bp| bp.id).collect();
    assert_eq!(remaining, vec![2]);
}

#[test]
fn test_error_result_surfaces_as_failure() {
    let (session, harness, _events) = running_session();
    let responder = harness.respond_to(0, |token| {
        format!(
            "{:06}^error,msg=\"No source file named nope.c.\"",
            token
        )
    });
    let err = session.break_insert("nope.c:1").unwrap_err();
    responder.join().unwrap();

    match err {
        DebugError::Adapter(AdapterError::ErrorResult { message, .. }) => {
            assert_eq!(message, "No source file named nope.c.");
        }
        other => panic!("Expected adapter error, got {:?}", other),
    }
    assert!(session.breakpoints().is_empty());
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn test_stack_list_frames_returns_applied_snapshot() {
    let (session, harness, _events) = running_session();
    let responder = harness.respond_to(0, |token| {
        thread::sleep(Duration::from_millis(50));
        format!(
            "{:06}^done,stack=[frame={{level=\"0\",addr=\"0x1139\",func=\"main\",file=\"main.c\",line=\"10\"}},\
             frame={{level=\"1\",addr=\"0x2000\",func=\"_start\"}}]",
            token
        )
    });
    let frames = session.stack_list_frames().unwrap();
    responder.join().unwrap();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].function.as_deref(), Some("main"));
    assert_eq!(frames[0].address, Some(0x1139));
    assert_eq!(session.stack_frames(), frames);
}

#[test]
fn test_variables_and_threads() {
    let (session, harness, _events) = running_session();

    let responder = harness.respond_to(0, |token| {
        format!(
            "{:06}^done,variables=[{{name=\"argc\",arg=\"1\",type=\"int\",value=\"1\"}}]",
            token
        )
    });
    let variables = session.stack_list_variables().unwrap();
    responder.join().unwrap();
    assert_eq!(variables[0].name, "argc");

    let responder = harness.respond_to(1, |token| {
        format!(
            "{:06}^done,threads=[{{id=\"1\",name=\"a.out\",state=\"stopped\"}},{{id=\"2\",name=\"worker\",state=\"stopped\"}}],current-thread-id=\"1\"",
            token
        )
    });
    assert_eq!(session.thread_info().unwrap().len(), 2);
    responder.join().unwrap();

    let responder = harness.respond_to(2, |token| format!("{:06}^done,new-thread-id=\"2\"", token));
    session.thread_select(2).unwrap();
    responder.join().unwrap();
    assert_eq!(session.current_thread(), Some(2));
    assert_eq!(harness.written()[2], "000002-thread-select 2\n");
}

#[test]
fn test_response_timeout() {
    let config = SessionConfig::default().with_response_timeout(Duration::from_millis(50));
    let (session, harness, _events) = start_session(config);
    let err = session.stack_list_frames().unwrap_err();
    assert!(matches!(err, DebugError::ResponseTimeout(_)));
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.pending_responses(), 0);

    // 諦めた後に届いた応答はキャッシュを変えない
    harness.line("000000^done,stack=[frame={level=\"0\",func=\"late\"}]");
    assert!(session.stack_frames().is_empty());
}

#[test]
fn test_malformed_result_fails_pending_call() {
    let (session, harness, events) = running_session();
    let responder = harness.respond_to(0, |token| format!("{:06}^done,bkpt={{number=\"1\"", token));
    let err = session.break_insert("main.c:10").unwrap_err();
    responder.join().unwrap();

    assert!(matches!(err, DebugError::Adapter(AdapterError::Protocol(_))));
    assert_eq!(session.pending_responses(), 0);
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.breakpoints().is_empty());
    assert!(drain(&events).contains(&SessionEvent::Log("000000^done,bkpt={number=\"1\"".to_string())));
}

#[test]
fn test_break_insert_with_multiple_locations() {
    let (session, harness, _events) = running_session();
    let responder = harness.respond_to(0, |token| {
        format!(
            "{:06}^done,bkpt={{number=\"1\",type=\"breakpoint\",disp=\"keep\",enabled=\"y\",addr=\"<MULTIPLE>\",times=\"0\"}},\
             {{number=\"1.1\",enabled=\"y\",addr=\"0x1139\",func=\"add<int>\",file=\"add.h\",fullname=\"/src/add.h\",line=\"3\"}},\
             {{number=\"1.2\",enabled=\"y\",addr=\"0x1150\",func=\"add<long>\",file=\"add.h\",fullname=\"/src/add.h\",line=\"3\"}}",
            token
        )
    });
    let id = session.break_insert("add").unwrap();
    responder.join().unwrap();

    assert_eq!(id, 1);
    let bp = session.breakpoint(1).unwrap();
    assert_eq!(bp.file.as_deref(), Some("add.h"));
    assert_eq!(bp.line, Some(3));
    assert_eq!(session.pending_responses(), 0);
}

#[test]
fn test_unregistered_token_is_ignored() {
    let (session, harness, _events) = running_session();
    session.next().unwrap();
    harness.line("000777^done");
    assert_eq!(session.pending_responses(), 1);
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn test_persistent_handler_is_retained() {
    let (session, harness, _events) = running_session();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let token = session
        .command_and_response(
            "-exec-run",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            ResponseAction::Persistent,
        )
        .unwrap();

    harness.line(&format!("{:06}^running", token));
    harness.line(&format!("{:06}^done", token));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.pending_responses(), 1);
}

#[test]
fn test_blocking_call_from_reader_is_rejected() {
    let (session, harness, _events) = running_session();
    let result = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&result);
    let inner = session.clone();
    let token = session
        .command_and_response(
            "-exec-next",
            Box::new(move |_| {
                *slot.lock().unwrap() = Some(inner.stack_list_frames());
            }),
            ResponseAction::OneShot,
        )
        .unwrap();

    harness.line(&format!("{:06}^done", token));
    let outcome = result.lock().unwrap().take().unwrap();
    assert!(matches!(outcome, Err(DebugError::ReaderContext("stack_list_frames"))));
}

#[test]
fn test_async_records_and_streams() {
    let (session, harness, events) = running_session();
    harness.line("~\"Reading symbols from ./a.out...\\n\"");
    harness.line("*running,thread-id=\"all\"");
    harness.line(
        "*stopped,reason=\"breakpoint-hit\",bkptno=\"1\",frame={addr=\"0x1139\",func=\"main\",file=\"main.c\",line=\"10\"},thread-id=\"1\"",
    );
    harness.line("(gdb)");
    harness.line("garbage from the inferior");

    let events = drain(&events);
    assert!(events.contains(&SessionEvent::Log("Reading symbols from ./a.out...\n".to_string())));
    assert!(events.contains(&SessionEvent::Running { thread_id: None }));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Stopped(info) if info.reason == "breakpoint-hit" && info.thread_id == Some(1)
    )));
    assert!(events.contains(&SessionEvent::Log("garbage from the inferior".to_string())));
    assert_eq!(session.current_thread(), Some(1));
}

#[test]
fn test_unexpected_exit_discards_pending() {
    let (session, harness, events) = running_session();
    session.continue_().unwrap();
    session.step().unwrap();
    assert_eq!(session.pending_responses(), 2);

    harness.emit(ChannelEvent::Finished { exit_code: Some(139) });
    harness.emit(ChannelEvent::Finished { exit_code: Some(139) });

    assert_eq!(session.state(), SessionState::NotRunning);
    assert_eq!(session.pending_responses(), 0);
    let terminations: Vec<_> = drain(&events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Terminated { .. }))
        .collect();
    assert_eq!(terminations, vec![SessionEvent::Terminated { exit_code: Some(139) }]);
    assert!(matches!(session.next(), Err(DebugError::NotRunning)));
}

#[test]
fn test_caches_cleared_on_termination() {
    let (session, harness, _events) = running_session();
    harness.line("=breakpoint-created,bkpt={number=\"1\",file=\"a.c\",line=\"1\"}");
    assert_eq!(session.breakpoints().len(), 1);
    harness.emit(ChannelEvent::Finished { exit_code: Some(0) });
    assert!(session.breakpoints().is_empty());
}

#[test]
fn test_write_failure_tears_down_session() {
    let (session, harness, events) = running_session();
    harness.fail_writes.store(true, Ordering::SeqCst);

    assert!(matches!(session.finish(), Err(DebugError::Io(_))));
    assert_eq!(session.state(), SessionState::NotRunning);
    assert_eq!(session.pending_responses(), 0);
    assert_eq!(harness.terminated.load(Ordering::SeqCst), 1);
    assert!(drain(&events).contains(&SessionEvent::Terminated { exit_code: None }));
}

#[test]
fn test_restart_resets_tokens_and_ignores_stale_events() {
    let (session, harness, _events) = running_session();
    session.continue_().unwrap();
    session.continue_().unwrap();
    let old_sink = harness.sink();
    harness.emit(ChannelEvent::Finished { exit_code: Some(0) });

    assert!(matches!(
        session.execute(),
        Err(DebugError::InvalidState { operation: "execute", .. })
    ));
    session
        .initialize_with_adapter("gdb", &[], Arc::new(GdbMiAdapter::new()))
        .unwrap();
    session.execute().unwrap();
    assert_eq!(session.pause().unwrap(), 0);
    assert_eq!(harness.written(), vec!["000000-exec-interrupt\n".to_string()]);

    // 前のプロセスからの遅れた終了イベントは無視される
    old_sink(ChannelEvent::Finished { exit_code: Some(1) });
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.pending_responses(), 1);
}

#[test]
fn test_quit_then_exit() {
    let (session, harness, _events) = running_session();
    let token = session.quit().unwrap();
    assert_eq!(harness.written()[0], "000000-gdb-exit\n");
    harness.line(&format!("{:06}^exit", token));
    harness.emit(ChannelEvent::Finished { exit_code: Some(0) });
    assert_eq!(session.state(), SessionState::NotRunning);
    assert!(!session.is_executing());
}
