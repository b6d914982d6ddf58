//! REPLコマンド

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ターゲットプログラムを起動
    Run,
    /// ブレークポイントを設定
    Break(String),
    /// ブレークポイントを削除（IDなしで全削除）
    Delete(Option<u32>),
    /// ファイル内のブレークポイントを全て削除
    Clear(String),
    /// ブレークポイント一覧表示
    Breakpoints,
    /// 実行継続
    Continue,
    /// ステップ実行
    Step,
    /// 次の行へ
    Next,
    /// 現在の関数から抜けるまで実行
    Finish,
    /// バックトレース表示
    Backtrace,
    /// ローカル変数表示
    Locals,
    /// スレッド一覧表示
    Threads,
    /// スレッドを選択
    Thread(u32),
    /// ソースファイル一覧
    Files,
    /// 実行中のターゲットを一時停止
    Pause,
    /// デバッガにSIGINTを送る
    Interrupt,
    /// ターゲットを強制終了
    Kill,
    /// MIコマンドをそのまま送信
    Raw(String),
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match parts[0] {
            "run" | "r" => Some(Command::Run),
            "break" | "b" => {
                if parts.len() > 1 {
                    Some(Command::Break(parts[1..].join(" ")))
                } else {
                    None
                }
            }
            "delete" | "d" => match parts.get(1) {
                Some(id) => id.parse().ok().map(|id| Command::Delete(Some(id))),
                None => Some(Command::Delete(None)),
            },
            "clear" => parts.get(1).map(|file| Command::Clear(file.to_string())),
            "breakpoints" | "info" if parts[0] == "breakpoints" || parts.get(1) == Some(&"break") => {
                Some(Command::Breakpoints)
            }
            "continue" | "c" => Some(Command::Continue),
            "step" | "s" => Some(Command::Step),
            "next" | "n" => Some(Command::Next),
            "finish" | "f" => Some(Command::Finish),
            "backtrace" | "bt" => Some(Command::Backtrace),
            "locals" | "l" => Some(Command::Locals),
            "threads" => Some(Command::Threads),
            "thread" => parts.get(1)?.parse().ok().map(Command::Thread),
            "files" => Some(Command::Files),
            "pause" => Some(Command::Pause),
            "interrupt" => Some(Command::Interrupt),
            "kill" | "k" => Some(Command::Kill),
            "mi" => {
                let rest = input.trim_start()[2..].trim();
                if rest.is_empty() {
                    None
                } else {
                    Some(Command::Raw(rest.to_string()))
                }
            }
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("continue"), Some(Command::Continue));
        assert_eq!(Command::parse("c"), Some(Command::Continue));
        assert_eq!(Command::parse("step"), Some(Command::Step));
        assert_eq!(Command::parse("bt"), Some(Command::Backtrace));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse("   "), None);
        assert_eq!(Command::parse("frobnicate"), None);
    }

    #[test]
    fn test_parse_breakpoint_commands() {
        assert_eq!(
            Command::parse("b main.c:10"),
            Some(Command::Break("main.c:10".to_string()))
        );
        assert_eq!(Command::parse("break"), None);
        assert_eq!(Command::parse("delete 3"), Some(Command::Delete(Some(3))));
        assert_eq!(Command::parse("delete"), Some(Command::Delete(None)));
        assert_eq!(Command::parse("delete x"), None);
        assert_eq!(
            Command::parse("clear src/main.c"),
            Some(Command::Clear("src/main.c".to_string()))
        );
        assert_eq!(Command::parse("info break"), Some(Command::Breakpoints));
        assert_eq!(Command::parse("info"), None);
    }

    #[test]
    fn test_parse_thread_and_raw() {
        assert_eq!(Command::parse("thread 2"), Some(Command::Thread(2)));
        assert_eq!(Command::parse("thread"), None);
        assert_eq!(
            Command::parse("  mi -gdb-version"),
            Some(Command::Raw("-gdb-version".to_string()))
        );
        assert_eq!(Command::parse("mi"), None);
    }
}
