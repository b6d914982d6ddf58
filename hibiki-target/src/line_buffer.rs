//! 出力の行分割

/// 生の出力バイト列を行単位にまとめるバッファ
///
/// CR または LF で行を区切ります。終端のない部分行は次の読み込みまで保持され、
/// 長さの上限はありません。空行は転送しません。
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// バイト列を追加し、完成した行を返す
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            match b {
                b'\r' | b'\n' => {
                    if !self.pending.is_empty() {
                        lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                        self.pending.clear();
                    }
                }
                _ => self.pending.push(b),
            }
        }
        lines
    }

    /// 終端のない残りの部分行を取り出す
    pub fn take_partial(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}
