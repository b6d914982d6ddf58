//! デバッガプロセスの制御

use crate::{ChannelError, LineBuffer, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// チャネルのライフサイクルイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// プロセスが起動した
    Started { pid: u32 },
    /// 標準出力の1行（行末は含まない）
    Line(String),
    /// 標準エラー出力の1行
    Stderr(String),
    /// プロセスが終了した（シグナルによる終了は `None`）
    Finished { exit_code: Option<i32> },
}

/// イベントの受け取り口
///
/// 出力読み取りスレッドから呼ばれます。
pub type EventSink = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// 起動済みのデバッガプロセスへの書き込み口
pub trait Transport: Send {
    /// 1行を書き込み、フラッシュが完了するまでブロックする
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// OS上のプロセスID
    fn process_id(&self) -> Option<u32>;

    /// SIGINTを送信する
    fn interrupt(&self) -> Result<()>;

    /// プロセスを強制終了する
    fn terminate(&mut self);
}

/// デバッガプロセスの起動方法
///
/// `launch` はイベントを同期的に通知してはならず、
/// `Started` を含む全てのイベントは別スレッドから `sink` に届けます。
pub trait Launcher: Send + Sync {
    fn launch(&self, program: &str, args: &[String], sink: EventSink) -> Result<Box<dyn Transport>>;
}

/// `std::process` による既定のランチャ
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, program: &str, args: &[String], sink: EventSink) -> Result<Box<dyn Transport>> {
        Ok(Box::new(ProcessChannel::spawn(program, args, sink)?))
    }
}

/// 終了待ちのポーリング間隔
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 子プロセスとして起動したデバッガ
pub struct ProcessChannel {
    pid: Pid,
    stdin: Option<ChildStdin>,
    /// 子プロセスが回収済みかどうか
    ///
    /// 回収後のPIDは再利用され得るため、シグナル送信はこのロックの下で行う
    reaped: Arc<Mutex<bool>>,
}

impl ProcessChannel {
    /// デバッガを起動し、出力読み取りスレッドを開始する
    ///
    /// 標準出力は行単位で `ChannelEvent::Line` として通知され、
    /// 出力が閉じられるとプロセスの終了を待って `ChannelEvent::Finished` を通知します。
    pub fn spawn(program: &str, args: &[String], sink: EventSink) -> Result<Self> {
        info!("Starting debugger: {} {:?}", program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ChannelError::Launch {
                program: program.to_string(),
                source,
            })?;

        let raw_pid = child.id();
        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take().ok_or(ChannelError::NotRunning)?;
        let stderr = child.stderr.take().ok_or(ChannelError::NotRunning)?;

        let stderr_sink = Arc::clone(&sink);
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => {
                        debug!("debugger stderr: {}", line);
                        stderr_sink(ChannelEvent::Stderr(line));
                    }
                    Err(e) => {
                        warn!("Error reading debugger stderr: {}", e);
                        break;
                    }
                }
            }
        });

        let reaped = Arc::new(Mutex::new(false));
        let reader_reaped = Arc::clone(&reaped);
        thread::spawn(move || {
            sink(ChannelEvent::Started { pid: raw_pid });

            let mut buffer = LineBuffer::new();
            let mut chunk = [0u8; 4096];
            loop {
                match stdout.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        for line in buffer.push(&chunk[..n]) {
                            sink(ChannelEvent::Line(line));
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        error!("Error reading debugger output: {}", e);
                        break;
                    }
                }
            }
            if let Some(line) = buffer.take_partial() {
                sink(ChannelEvent::Line(line));
            }

            let exit_code = loop {
                let mut reaped = reader_reaped.lock().unwrap_or_else(|e| e.into_inner());
                match child.try_wait() {
                    Ok(Some(status)) => {
                        *reaped = true;
                        break status.code();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Failed to wait for debugger process: {}", e);
                        *reaped = true;
                        break None;
                    }
                }
                drop(reaped);
                thread::sleep(REAP_POLL_INTERVAL);
            };
            info!("Debugger process finished: {:?}", exit_code);
            sink(ChannelEvent::Finished { exit_code });
        });

        Ok(Self {
            pid: Pid::from_raw(raw_pid as i32),
            stdin,
            reaped,
        })
    }

    fn is_reaped(&self) -> bool {
        *self.reaped.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send_signal(&self, sig: Signal) -> Result<()> {
        let reaped = self.reaped.lock().unwrap_or_else(|e| e.into_inner());
        if *reaped {
            return Err(ChannelError::NotRunning);
        }
        signal::kill(self.pid, sig)?;
        Ok(())
    }
}

impl Transport for ProcessChannel {
    fn write_line(&mut self, line: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(ChannelError::NotRunning)?;
        stdin.write_all(line.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        if self.is_reaped() {
            None
        } else {
            Some(self.pid.as_raw() as u32)
        }
    }

    fn interrupt(&self) -> Result<()> {
        self.send_signal(Signal::SIGINT)
    }

    fn terminate(&mut self) {
        // 標準入力を閉じてからKILLする
        self.stdin = None;
        if let Err(e) = self.send_signal(Signal::SIGKILL) {
            debug!("Debugger process already gone: {}", e);
        }
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn collecting_sink() -> (EventSink, mpsc::Receiver<ChannelEvent>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let sink: EventSink = Arc::new(move |event| {
            let _ = tx.lock().unwrap().send(event);
        });
        (sink, rx)
    }

    #[test]
    fn test_spawn_missing_program() {
        let (sink, _rx) = collecting_sink();
        let result = ProcessChannel::spawn("/nonexistent/hibiki-debugger", &[], sink);
        assert!(matches!(result, Err(ChannelError::Launch { .. })));
    }

    #[test]
    fn test_lines_and_exit_status() {
        let (sink, rx) = collecting_sink();
        let args = vec!["-c".to_string(), "printf 'one\\r\\ntwo\\npartial'; exit 3".to_string()];
        let _channel = ProcessChannel::spawn("sh", &args, sink).unwrap();

        let mut stdout_events = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                ChannelEvent::Stderr(_) => {}
                ChannelEvent::Finished { exit_code } => {
                    assert_eq!(exit_code, Some(3));
                    break;
                }
                event => stdout_events.push(event),
            }
        }

        assert!(matches!(stdout_events[0], ChannelEvent::Started { .. }));
        assert_eq!(
            &stdout_events[1..],
            &[
                ChannelEvent::Line("one".to_string()),
                ChannelEvent::Line("two".to_string()),
                ChannelEvent::Line("partial".to_string()),
            ]
        );
    }

    #[test]
    fn test_write_line_reaches_child() {
        let (sink, rx) = collecting_sink();
        let args = vec!["-c".to_string(), "read line; echo \"got $line\"".to_string()];
        let mut channel = ProcessChannel::spawn("sh", &args, sink).unwrap();
        channel.write_line("000000-gdb-version\n").unwrap();

        let got = rx
            .iter()
            .find_map(|event| match event {
                ChannelEvent::Line(line) => Some(line),
                _ => None,
            })
            .unwrap();
        assert_eq!(got, "got 000000-gdb-version");
    }
}
