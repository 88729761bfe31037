//! スレッド組み立てのビジネスロジック
//!
//! 生のスレッドレスポンス（MIMEパートツリー）からドメイン型への変換を行う。
//! メールボックスAPIやDBへのアクセスといった外部依存を持たないため
//! テストが容易ですが、ログ出力などの副作用は発生する場合があります。
//!
//! # セキュリティガイドライン
//! 本文・件名・アドレスをログに出力しないこと。ログはメッセージID・件数のみ。

use crate::mailbox::client::{MessagePart, MessagePartHeader, RawMessage, RawThread};
use crate::mailbox::{EmailMessage, EmailThread};
use chrono::{DateTime, Utc};

/// base64url（パディングなし）のデータをテキストへデコードする
///
/// プロバイダはパート本文をbase64url形式で返す。デコード失敗時は
/// 空文字列を返す（メッセージ全体を落とさない）。
pub fn decode_base64(data: &str) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    match URL_SAFE_NO_PAD.decode(data) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(_) => {
            log::warn!("Failed to decode base64 body data, returning empty string");
            String::new()
        }
    }
}

/// MIMEパートツリーを再帰的にデコードする
///
/// - リーフ（インラインデータあり）: base64デコードしたテキスト
/// - コンテナ（子パートあり）: 各子パートのデコード結果を改行で連結
///   （先頭・末尾に区切りは付かない）
/// - どちらもないリーフ: 空文字列
pub fn decode_part(part: &MessagePart) -> String {
    if let Some(body) = &part.body {
        if let Some(data) = &body.data {
            if !data.is_empty() {
                return decode_base64(data);
            }
        }
    }

    if let Some(parts) = &part.parts {
        return parts
            .iter()
            .map(decode_part)
            .collect::<Vec<_>>()
            .join("\n");
    }

    String::new()
}

/// ヘッダーを名前で検索する（大文字小文字を区別しない完全一致）
///
/// 存在しないヘッダーは空文字列として扱う。
pub fn get_header(headers: &[MessagePartHeader], name: &str) -> String {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
        .unwrap_or_default()
}

/// In-Reply-To または References ヘッダーを持つメッセージは返信とみなす
pub fn is_reply(headers: &[MessagePartHeader]) -> bool {
    headers.iter().any(|h| {
        h.name.eq_ignore_ascii_case("in-reply-to") || h.name.eq_ignore_ascii_case("references")
    })
}

/// Dateヘッダーの値をパースする
///
/// RFC 2822（"Tue, 2 Jan 2024 15:04:05 +0900" 形式）を優先し、末尾の
/// コメント（"(JST)" 等）を除去した再試行、RFC 3339 の順でフォールバック。
/// いずれでもパースできない場合はNone
pub fn parse_message_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // "Tue, 2 Jan 2024 06:04:05 +0000 (UTC)" のような末尾コメントを除去して再試行
    if let Some(idx) = trimmed.rfind('(') {
        let without_comment = trimmed[..idx].trim_end();
        if let Ok(dt) = DateTime::parse_from_rfc2822(without_comment) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// 生メッセージをドメイン型へ変換する
///
/// ペイロードが無い、またはDateヘッダーがパースできないメッセージは
/// 不正とみなしてNoneを返す（スレッド全体は落とさない）。
pub fn build_message(raw: &RawMessage) -> Option<EmailMessage> {
    let payload = match &raw.payload {
        Some(p) => p,
        None => {
            log::warn!("Message {} has no payload, skipping", raw.id);
            return None;
        }
    };

    let headers: &[MessagePartHeader] = payload.headers.as_deref().unwrap_or(&[]);

    let date_value = get_header(headers, "Date");
    let date = match parse_message_date(&date_value) {
        Some(d) => d,
        None => {
            log::warn!("Message {} has unparseable Date header, skipping", raw.id);
            return None;
        }
    };

    Some(EmailMessage {
        id: raw.id.clone(),
        from: get_header(headers, "From"),
        to: get_header(headers, "To"),
        subject: get_header(headers, "Subject"),
        body: decode_part(payload),
        date,
        is_reply: is_reply(headers),
    })
}

/// 生スレッドをドメイン型へ変換する
///
/// メッセージはパース後の日時で降順（最新が先頭）に整列し、スレッドの
/// 件名と最終日時は先頭メッセージから取る。有効なメッセージが1件も
/// 残らないスレッドはNone（一覧から除外）。
pub fn build_thread(raw: &RawThread) -> Option<EmailThread> {
    let raw_messages: &[RawMessage] = raw.messages.as_deref().unwrap_or(&[]);

    let mut messages: Vec<EmailMessage> = raw_messages.iter().filter_map(build_message).collect();
    if messages.is_empty() {
        log::debug!("Thread {} has no parseable messages, skipping", raw.id);
        return None;
    }

    messages.sort_by(|a, b| b.date.cmp(&a.date));

    Some(EmailThread {
        id: raw.id.clone(),
        subject: messages[0].subject.clone(),
        last_message_date: messages[0].date,
        messages,
    })
}

/// スレッド一覧を最終メッセージ日時の降順に整列する
pub fn sort_threads(threads: &mut [EmailThread]) {
    threads.sort_by(|a, b| b.last_message_date.cmp(&a.last_message_date));
}
