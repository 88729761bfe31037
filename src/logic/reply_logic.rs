//! 返信メッセージ組み立てのビジネスロジック
//!
//! RFC 822形式のヘッダーブロック + 空行 + 本文を構築し、プロバイダの
//! raw送信フィールドが要求するbase64url（パディングなし）へエンコードする。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// 返信対象メッセージから読み取ったヘッダー値
#[derive(Debug, Clone, Default)]
pub struct ReplySource {
    /// 返信先（元メッセージの From）
    pub from: String,
    /// 元メッセージの Subject
    pub subject: String,
    /// 元メッセージの Message-ID
    pub message_id: String,
    /// 元メッセージの References（無い場合は空文字列）
    pub references: String,
}

/// 返信メッセージのテキストを構築する
///
/// ヘッダーは To / Subject("Re: "付与) / Content-Type / MIME-Version /
/// In-Reply-To / References。References は元メッセージに存在すればその値、
/// 無ければ Message-ID を使う。各行をCRLFで連結し、末尾の空白を除去する。
pub fn compose_reply_text(source: &ReplySource, body: &str) -> String {
    let references = if source.references.is_empty() {
        source.message_id.as_str()
    } else {
        source.references.as_str()
    };

    let lines = [
        format!("To: {}", source.from),
        format!("Subject: Re: {}", source.subject),
        "Content-Type: text/plain; charset=\"UTF-8\"".to_string(),
        "MIME-Version: 1.0".to_string(),
        format!("In-Reply-To: {}", source.message_id),
        format!("References: {references}"),
        String::new(),
        body.to_string(),
    ];

    lines.join("\r\n").trim().to_string()
}

/// メッセージ全体をbase64url（パディングなし）へエンコードする
///
/// 出力は `+` `/` `=` を含まない。
pub fn encode_raw_message(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> ReplySource {
        ReplySource {
            from: "a@x.com".to_string(),
            subject: "Hello".to_string(),
            message_id: "<m1>".to_string(),
            references: String::new(),
        }
    }

    #[test]
    fn test_compose_reply_text_headers() {
        let text = compose_reply_text(&source(), "ok");

        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines[0], "To: a@x.com");
        assert_eq!(lines[1], "Subject: Re: Hello");
        assert_eq!(lines[2], "Content-Type: text/plain; charset=\"UTF-8\"");
        assert_eq!(lines[3], "MIME-Version: 1.0");
        assert_eq!(lines[4], "In-Reply-To: <m1>");
        assert_eq!(lines[5], "References: <m1>");
        assert_eq!(lines[6], "");
        assert_eq!(lines[7], "ok");
    }

    #[test]
    fn test_compose_reply_text_keeps_existing_references() {
        let mut src = source();
        src.references = "<m0> <m1>".to_string();

        let text = compose_reply_text(&src, "ok");
        assert!(text.contains("References: <m0> <m1>"));
        assert!(text.contains("In-Reply-To: <m1>"));
    }

    #[test]
    fn test_compose_reply_text_trims_trailing_whitespace() {
        let text = compose_reply_text(&source(), "ok\n\n  ");
        assert!(!text.ends_with(char::is_whitespace));
        assert!(text.ends_with("ok"));
    }

    #[test]
    fn test_encode_raw_message_is_base64url_without_padding() {
        // '+' '/' '=' が出やすいバイト列を含める
        let text = compose_reply_text(&source(), "body with ~ and ?? characters");
        let encoded = encode_raw_message(&text);

        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_encode_raw_message_round_trip() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let text = compose_reply_text(&source(), "round trip body");
        let encoded = encode_raw_message(&text);
        let decoded = URL_SAFE_NO_PAD.decode(encoded.as_bytes()).unwrap();

        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }
}
