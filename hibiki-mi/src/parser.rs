//! MIレコードパーサー
//!
//! 1行を先頭文字で分類し、結果・非同期・ストリームのいずれかのレコードに変換します。
//! 文法違反の行は `Unparseable` としてログに回し、エラーにはしません。

use crate::error::ProtocolError;
use crate::record::{AsyncKind, MiRecord, ResultClass, StreamKind, Token};
use crate::MiValue;
use regex::Regex;
use tracing::debug;

/// `(gdb)` プロンプト
const PROMPT: &str = "(gdb)";

/// MI出力行のパーサー
pub struct MiParser {
    /// `<token><tag><rest>` のパターン
    record_pattern: Regex,
}

impl MiParser {
    /// パーサーを作成する
    pub fn new() -> Result<Self, regex::Error> {
        let record_pattern = Regex::new(r"^(\d*)([\^*+=~@&])(.*)$")?;
        Ok(Self { record_pattern })
    }

    /// 1行をレコードに分類する
    ///
    /// 行末の CR/LF は無視します。
    pub fn parse_line(&self, line: &str) -> MiRecord {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim_end() == PROMPT {
            return MiRecord::Prompt;
        }

        match self.classify(line) {
            Ok(Some(record)) => record,
            Ok(None) => MiRecord::Unparseable {
                raw: line.to_string(),
            },
            Err(e) => {
                debug!("Unparseable MI line ({}): {}", e, line);
                MiRecord::Unparseable {
                    raw: line.to_string(),
                }
            }
        }
    }

    fn classify(&self, line: &str) -> Result<Option<MiRecord>, ProtocolError> {
        let caps = match self.record_pattern.captures(line) {
            Some(caps) => caps,
            None => return Ok(None),
        };

        let token_str = caps.get(1).map_or("", |m| m.as_str());
        let tag = caps.get(2).map_or("", |m| m.as_str());
        let rest = caps.get(3).map_or("", |m| m.as_str());
        let body_offset = token_str.len() + tag.len();

        let token: Option<Token> = if token_str.is_empty() {
            None
        } else {
            Some(
                token_str
                    .parse()
                    .map_err(|_| ProtocolError::new(0, "token out of range"))?,
            )
        };

        let record = match tag {
            "^" => {
                let class_name = rest.split_once(',').map_or(rest, |(name, _)| name);
                let class = match ResultClass::parse(class_name) {
                    Some(class) => class,
                    None => return Ok(None),
                };
                match split_class(rest, body_offset) {
                    Ok((_, payload)) => MiRecord::Result {
                        token,
                        class,
                        payload,
                    },
                    Err(error) => {
                        debug!("Malformed result payload ({}): {}", error, line);
                        MiRecord::MalformedResult {
                            token,
                            class,
                            raw: line.to_string(),
                            error,
                        }
                    }
                }
            }
            "*" | "+" | "=" => {
                let kind = match tag {
                    "*" => AsyncKind::Exec,
                    "+" => AsyncKind::Status,
                    _ => AsyncKind::Notify,
                };
                let (class, payload) = split_class(rest, body_offset)?;
                if class.is_empty() {
                    return Ok(None);
                }
                MiRecord::AsyncNotify {
                    kind,
                    class: class.to_string(),
                    payload,
                }
            }
            _ => {
                // ストリームレコードにトークンは付かない
                if token.is_some() {
                    return Ok(None);
                }
                let kind = match tag {
                    "~" => StreamKind::Console,
                    "@" => StreamKind::Target,
                    _ => StreamKind::Log,
                };
                let text = match rest.starts_with('"') {
                    true => {
                        let mut cursor = Cursor::new(rest, body_offset);
                        let text = cursor.c_string()?;
                        cursor.expect_end()?;
                        text
                    }
                    false => rest.to_string(),
                };
                MiRecord::Stream { kind, text }
            }
        };

        Ok(Some(record))
    }
}

/// `class[,results]` をクラス名とペイロードに分割する
fn split_class(rest: &str, offset: usize) -> Result<(&str, MiValue), ProtocolError> {
    match rest.find(',') {
        Some(pos) => {
            let payload = parse_results(&rest[pos + 1..], offset + pos + 1)?;
            Ok((&rest[..pos], payload))
        }
        None => Ok((rest, MiValue::empty_tuple())),
    }
}

/// `key=value,...` の列をタプルとしてパースする
pub fn parse_payload(text: &str) -> Result<MiValue, ProtocolError> {
    parse_results(text, 0)
}

fn parse_results(text: &str, offset: usize) -> Result<MiValue, ProtocolError> {
    let mut cursor = Cursor::new(text, offset);
    let mut entries: Vec<(String, MiValue)> = Vec::new();
    if !cursor.at_end() {
        loop {
            // mi2 の複数ロケーションのブレークポイントは `bkpt={...},{...}` のように
            // キーのない値が続くので、直前のキーで登録する
            let continued = match (cursor.peek(), entries.last()) {
                (Some(b'{' | b'[' | b'"'), Some((key, _))) => Some(key.clone()),
                _ => None,
            };
            let entry = match continued {
                Some(key) => (key, cursor.value()?),
                None => cursor.result()?,
            };
            entries.push(entry);
            if !cursor.eat(b',') {
                break;
            }
        }
    }
    cursor.expect_end()?;
    Ok(MiValue::Tuple(entries))
}

/// ペイロード文法の再帰下降パーサー
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, offset: usize) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            offset,
        }
    }

    fn error(&self, message: &str) -> ProtocolError {
        ProtocolError::new(self.offset + self.pos, message)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), ProtocolError> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", b as char)))
        }
    }

    fn expect_end(&self) -> Result<(), ProtocolError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    /// result := variable "=" value
    fn result(&mut self) -> Result<(String, MiValue), ProtocolError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'=' || b == b',' || b == b'{' || b == b'[' || b == b'"' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected variable name"));
        }
        let key = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        self.expect(b'=')?;
        let value = self.value()?;
        Ok((key, value))
    }

    /// value := const | tuple | list
    fn value(&mut self) -> Result<MiValue, ProtocolError> {
        match self.peek() {
            Some(b'"') => Ok(MiValue::Const(self.c_string()?)),
            Some(b'{') => self.tuple(),
            Some(b'[') => self.list(),
            _ => Err(self.error("expected value")),
        }
    }

    fn tuple(&mut self) -> Result<MiValue, ProtocolError> {
        self.expect(b'{')?;
        let mut entries = Vec::new();
        if self.eat(b'}') {
            return Ok(MiValue::Tuple(entries));
        }
        loop {
            entries.push(self.result()?);
            if self.eat(b'}') {
                return Ok(MiValue::Tuple(entries));
            }
            self.expect(b',')?;
        }
    }

    /// list := "[]" | "[" value ("," value)* "]" | "[" result ("," result)* "]"
    fn list(&mut self) -> Result<MiValue, ProtocolError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        if self.eat(b']') {
            return Ok(MiValue::List(items));
        }
        loop {
            let item = match self.peek() {
                Some(b'"') | Some(b'{') | Some(b'[') => self.value()?,
                _ => self.result()?.1,
            };
            items.push(item);
            if self.eat(b']') {
                return Ok(MiValue::List(items));
            }
            self.expect(b',')?;
        }
    }

    /// C形式のエスケープを含む文字列定数
    fn c_string(&mut self) -> Result<String, ProtocolError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            let b = self.peek().ok_or_else(|| self.error("unterminated string"))?;
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self.peek().ok_or_else(|| self.error("unterminated escape"))?;
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'e' => out.push(0x1b),
                        b'0'..=b'7' => {
                            let mut value = u32::from(esc - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xff) as u8);
                        }
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
