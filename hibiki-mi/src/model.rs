//! 正規化されたデバッグ情報のデータモデル

/// ブレークポイントID（デバッガが割り当てる）
pub type BreakpointId = u32;

/// スレッドID
pub type ThreadId = u32;

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub file: Option<String>,
    /// 絶対パス（デバッガが解決できた場合）
    pub fullname: Option<String>,
    pub line: Option<u32>,
    pub enabled: bool,
}

impl Breakpoint {
    /// 指定したファイルに属するかどうか
    pub fn is_in_file(&self, path: &str) -> bool {
        self.file.as_deref() == Some(path) || self.fullname.as_deref() == Some(path)
    }
}

/// スタックフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub index: u32,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub address: Option<u64>,
}

/// スレッドの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Stopped,
    Unknown(String),
}

impl ThreadState {
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => ThreadState::Running,
            "stopped" => ThreadState::Stopped,
            other => ThreadState::Unknown(other.to_string()),
        }
    }
}

/// スレッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
}

/// 変数のスコープ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    Local,
    Argument,
}

/// 変数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    /// 複合型は値が返らないことがある
    pub value: Option<String>,
    pub type_name: Option<String>,
    pub scope: VariableScope,
}

/// ソースファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub file: String,
    pub fullname: Option<String>,
}
