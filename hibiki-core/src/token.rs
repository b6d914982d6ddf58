//! トークンの発行とコマンド行の組み立て

use hibiki_mi::Token;

/// トークン空間の大きさ（`[0, 1_000_000)` で循環する）
pub const TOKEN_MODULUS: Token = 1_000_000;

/// トークン発行器
#[derive(Debug, Default)]
pub struct TokenIssuer {
    next: Token,
}

impl TokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在の値を返し、1進める
    pub fn issue(&mut self) -> Token {
        let token = self.next;
        self.next = (token + 1) % TOKEN_MODULUS;
        token
    }

    /// カウンタを0に戻す
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// `<6桁ゼロ埋めトークン><コマンド本体>\n` を組み立てる
pub fn format_command_line(token: Token, text: &str) -> String {
    format!("{:06}{}\n", token, text)
}
