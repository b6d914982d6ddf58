//! MIの汎用値型
//!
//! MIのペイロードは `const | tuple | list` の再帰構造です。
//! コマンドごとに固定スキーマを持たず、この型で全てのペイロードを表現します。

/// MIの値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiValue {
    /// 文字列定数: `"main.c"`
    Const(String),
    /// 順序付きリスト: `[...]`
    ///
    /// `[frame={...},frame={...}]` のような結果リストはキーを捨てて値だけを保持する
    List(Vec<MiValue>),
    /// キー順序を保持したタプル: `{key=value,...}`
    Tuple(Vec<(String, MiValue)>),
}

impl MiValue {
    /// 空のタプルを作成する
    pub fn empty_tuple() -> Self {
        MiValue::Tuple(Vec::new())
    }

    /// タプルからキーで値を取得する（重複キーは最初のものを返す）
    pub fn get(&self, key: &str) -> Option<&MiValue> {
        match self {
            MiValue::Tuple(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// 文字列定数として取得する
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MiValue::Const(s) => Some(s),
            _ => None,
        }
    }

    /// リストとして取得する
    pub fn as_list(&self) -> Option<&[MiValue]> {
        match self {
            MiValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// キーに対応する文字列定数を取得する
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MiValue::as_str)
    }

    /// キーに対応する値を数値として取得する
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_str(key).and_then(|s| s.parse().ok())
    }

    /// キーに対応する値をアドレス（16進数）として取得する
    pub fn get_address(&self, key: &str) -> Option<u64> {
        let s = self.get_str(key)?;
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
        u64::from_str_radix(digits, 16).ok()
    }

    /// キーに対応するリストを取得する
    pub fn get_list(&self, key: &str) -> Option<&[MiValue]> {
        self.get(key).and_then(MiValue::as_list)
    }
}
