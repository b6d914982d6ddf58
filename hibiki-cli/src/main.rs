//! Hibiki CLI - コマンドラインインターフェース
//!
//! MIデバッガを子プロセスとして駆動するREPL

mod command;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use command::Command;
use hibiki_core::{DebugSession, SessionConfig, SessionEvent, StackFrame};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Hibiki - MI debugger front end
#[derive(Parser)]
#[command(name = "hibiki")]
#[command(version = "0.1.0")]
#[command(about = "Drive a machine-interface debugger from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: DebugCommand,
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Launch a program under the debugger
    Run {
        /// Debugger executable
        #[arg(short, long, default_value = "gdb")]
        debugger: String,

        /// Response timeout for blocking commands in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Echo every command sent to the debugger
        #[arg(short, long)]
        verbose: bool,

        /// Path to the program to debug
        program: String,

        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        DebugCommand::Run {
            debugger,
            timeout_ms,
            verbose,
            program,
            args,
        } => {
            let mut config = SessionConfig::default();
            if let Some(ms) = timeout_ms {
                config = config.with_response_timeout(Duration::from_millis(ms));
            }

            let session = DebugSession::new(config)?;
            spawn_event_printer(session.subscribe(), verbose);

            let mut debugger_args = vec![program.clone()];
            debugger_args.extend(args);
            session
                .initialize(&debugger, &debugger_args)
                .with_context(|| format!("Cannot use debugger '{}'", debugger))?;
            session
                .execute()
                .with_context(|| format!("Failed to start {}", debugger))?;

            println!("Hibiki - MI debugger front end");
            println!("Debugging {} with {}", program, debugger);
            println!();
            run_repl(&session)?;
        }
    }

    Ok(())
}

/// `HIBIKI_LOG`、なければ `RUST_LOG` からフィルタを読む（既定は warn）
fn init_tracing() {
    let filter = EnvFilter::try_from_env("HIBIKI_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// セッションイベントを表示するスレッドを起動する
fn spawn_event_printer(events: Receiver<SessionEvent>, verbose: bool) {
    thread::spawn(move || {
        for event in events {
            match event {
                SessionEvent::Log(text) => {
                    if verbose || !text.starts_with("Command: ") {
                        print!("{}", text);
                        if !text.ends_with('\n') {
                            println!();
                        }
                    }
                }
                SessionEvent::Stopped(info) => {
                    println!();
                    print!("Stopped ({})", info.reason);
                    if let Some(id) = info.thread_id {
                        print!(" in thread {}", id);
                    }
                    println!();
                    if let Some(frame) = info.frame {
                        println!("  {}", describe_frame(&frame));
                    }
                }
                SessionEvent::Running { thread_id } => match thread_id {
                    Some(id) => println!("Thread {} running", id),
                    None => println!("Running"),
                },
                SessionEvent::Terminated { exit_code } => {
                    match exit_code {
                        Some(code) => println!("Debugger exited with code {}", code),
                        None => println!("Debugger terminated"),
                    }
                    break;
                }
                SessionEvent::BreakpointsChanged | SessionEvent::ThreadsChanged => {}
            }
        }
    });
}

fn describe_frame(frame: &StackFrame) -> String {
    let function = frame.function.as_deref().unwrap_or("??");
    let mut text = match frame.address {
        Some(addr) => format!("#{} 0x{:016x} in {}", frame.index, addr, function),
        None => format!("#{} {}", frame.index, function),
    };
    if let (Some(file), Some(line)) = (&frame.file, frame.line) {
        text.push_str(&format!(" at {}:{}", file, line));
    }
    text
}

/// REPLループを実行する
fn run_repl(session: &DebugSession) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(hibiki) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match Command::parse(line) {
                    Some(Command::Quit) => {
                        handle_quit(session);
                        break;
                    }
                    Some(command) => {
                        if let Err(e) = handle_command(session, command) {
                            eprintln!("Error: {:#}", e);
                        }
                    }
                    None => {
                        println!("Unknown command: {}", line);
                        println!("Type 'help' for available commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // 実行中のターゲットを止める
                if session.is_executing() {
                    if let Err(e) = session.interrupt() {
                        eprintln!("Error: {}", e);
                    }
                    continue;
                }
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                handle_quit(session);
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(session: &DebugSession, command: Command) -> Result<()> {
    match command {
        Command::Run => {
            session.launch_local()?;
        }
        Command::Break(location) => handle_break(session, &location)?,
        Command::Delete(Some(id)) => {
            session.break_remove(id)?;
            println!("Deleted breakpoint {}", id);
        }
        Command::Delete(None) => {
            session.break_remove_all()?;
            println!("Deleted all breakpoints");
        }
        Command::Clear(file) => {
            let removed = session.remove_breakpoints_in_file(&file)?;
            println!("Deleted {} breakpoint(s) in {}", removed, file);
        }
        Command::Breakpoints => print_breakpoints(session),
        Command::Continue => {
            session.continue_()?;
        }
        Command::Step => {
            session.step()?;
        }
        Command::Next => {
            session.next()?;
        }
        Command::Finish => {
            session.finish()?;
        }
        Command::Backtrace => {
            let frames = session.stack_list_frames()?;
            if frames.is_empty() {
                println!("No stack.");
            }
            for frame in &frames {
                println!("{}", describe_frame(frame));
            }
        }
        Command::Locals => {
            let variables = session.stack_list_variables()?;
            if variables.is_empty() {
                println!("No locals.");
            }
            for var in &variables {
                let type_name = var.type_name.as_deref().unwrap_or("?");
                match &var.value {
                    Some(value) => println!("  {}: {} = {}", var.name, type_name, value),
                    None => println!("  {}: {}", var.name, type_name),
                }
            }
        }
        Command::Threads => {
            let threads = session.thread_info()?;
            let current = session.current_thread();
            for thread in &threads {
                let marker = if Some(thread.id) == current { "*" } else { " " };
                println!("{} {} {} ({:?})", marker, thread.id, thread.name, thread.state);
            }
        }
        Command::Thread(id) => {
            session.thread_select(id)?;
            println!("Switched to thread {}", id);
        }
        Command::Files => handle_files(session)?,
        Command::Pause => {
            session.pause()?;
        }
        Command::Interrupt => session.interrupt()?,
        Command::Kill => {
            session.kill()?;
        }
        Command::Raw(text) => {
            let token = session.command(&text)?;
            info!("Sent raw command {:06}", token);
        }
        Command::Help => print_help(),
        Command::Quit => handle_quit(session),
    }

    Ok(())
}

/// Breakコマンドを処理する
fn handle_break(session: &DebugSession, location: &str) -> Result<()> {
    let id = session.break_insert(location)?;
    match session.breakpoint(id) {
        Some(bp) => match (bp.file.as_deref(), bp.line) {
            (Some(file), Some(line)) => println!("Breakpoint {} at {}:{}", id, file, line),
            _ => println!("Breakpoint {} at {}", id, location),
        },
        None => println!("Breakpoint {} at {}", id, location),
    }
    Ok(())
}

fn print_breakpoints(session: &DebugSession) {
    let breakpoints = session.breakpoints();
    if breakpoints.is_empty() {
        println!("No breakpoints.");
        return;
    }
    for bp in &breakpoints {
        let location = match (bp.file.as_deref(), bp.line) {
            (Some(file), Some(line)) => format!("{}:{}", file, line),
            (Some(file), None) => file.to_string(),
            _ => "<pending>".to_string(),
        };
        let state = if bp.enabled { "enabled" } else { "disabled" };
        println!("  {}. {} ({})", bp.id, location, state);
    }
}

/// ソースファイル一覧を表示する
fn handle_files(session: &DebugSession) -> Result<()> {
    let files = session.list_source_files()?;
    if files.is_empty() {
        println!("No source files.");
    }
    for file in &files {
        println!("  {}", file.fullname.as_deref().unwrap_or(&file.file));
    }
    Ok(())
}

/// Quitコマンドを処理する
fn handle_quit(session: &DebugSession) {
    if session.is_executing() {
        if let Err(e) = session.quit() {
            eprintln!("Error: {}", e);
        }
    }
    println!("Goodbye!");
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help             - Show this help message");
    println!("  quit/exit/q      - Exit the debugger");
    println!();
    println!("Execution:");
    println!("  run (r)          - Start the program");
    println!("  continue (c)     - Continue execution");
    println!("  next (n)         - Step over");
    println!("  step (s)         - Step into");
    println!("  finish (f)       - Run until the current function returns");
    println!("  pause            - Pause the running program");
    println!("  interrupt        - Send SIGINT to the debugger");
    println!("  kill (k)         - Kill the program");
    println!();
    println!("Breakpoints:");
    println!("  break <loc>      - Set breakpoint at file:line or function");
    println!("  delete [id]      - Delete one breakpoint, or all of them");
    println!("  clear <file>     - Delete every breakpoint in a file");
    println!("  info break       - List breakpoints");
    println!();
    println!("Inspection:");
    println!("  bt               - Show the call stack");
    println!("  locals (l)       - Show variables of the current frame");
    println!("  threads          - List threads");
    println!("  thread <id>      - Select a thread");
    println!("  files            - List source files");
    println!("  mi <command>     - Send a raw MI command");
    println!();
    println!("Examples:");
    println!("  break main.c:10");
    println!("  mi -gdb-version");
}
