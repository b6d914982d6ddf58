//! Hibiki MI プロトコル層
//!
//! このクレートは、デバッガのMachine Interface (MI) 出力行のパース、
//! 汎用値型、正規化されたデータモデル、およびデバッガ方言ごとのプロトコルアダプタを提供します。

pub mod adapter;
pub mod error;
pub mod model;
pub mod parser;
pub mod record;
pub mod state;
pub mod value;

pub use adapter::{select_adapter, Adapter, AsyncEffect, GdbMiAdapter, StopInfo};
pub use error::{AdapterError, ProtocolError};
pub use model::{
    Breakpoint, BreakpointId, SourceFile, StackFrame, Thread, ThreadId, ThreadState, Variable,
    VariableScope,
};
pub use parser::{parse_payload, MiParser};
pub use record::{AsyncKind, MiRecord, ResultClass, StreamKind, Token};
pub use state::{BreakpointTable, DebugState};
pub use value::MiValue;
