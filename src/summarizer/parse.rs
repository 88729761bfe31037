//! AIレスポンスの防御的パース
//!
//! モデルの出力は自由テキストであり構造は保証されない。緊急度と推奨
//! アクションはラベル行（"Urgency: High" / "Suggested Action: Reply"）から
//! 抽出し、見つからない・解釈できない場合は設定されたデフォルトへ
//! フォールバックする。パース自体は決して失敗しない。

use crate::repository::{SuggestedAction, Urgency};
use once_cell::sync::Lazy;
use regex::Regex;

static URGENCY_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)urgency\s*:").expect("urgency label regex"));
static ACTION_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)action\s*:").expect("action label regex"));

/// パース不能時のフォールバック値
///
/// 既定は緊急度 Low / アクション Read Later。より厳格な運用をしたい
/// 呼び出し側はここを差し替える。
#[derive(Debug, Clone, Copy)]
pub struct SummaryDefaults {
    pub urgency: Urgency,
    pub suggested_action: SuggestedAction,
}

impl Default for SummaryDefaults {
    fn default() -> Self {
        Self {
            urgency: Urgency::Low,
            suggested_action: SuggestedAction::ReadLater,
        }
    }
}

/// パース結果
#[derive(Debug, Clone)]
pub struct ParsedSummary {
    pub summary: String,
    pub urgency: Urgency,
    pub suggested_action: SuggestedAction,
}

/// ラベル行の最初のコロン以降（2つ目のコロンの手前まで）を取り出す
fn label_value(line: &str) -> Option<&str> {
    line.split(':').nth(1).map(str::trim)
}

/// モデルの自由テキスト出力から要約・緊急度・推奨アクションを抽出する
///
/// - 要約: ラベル行（urgency/action）を除いた行をスペースで連結
/// - 緊急度/アクション: 最初に見つかったラベル行の値をパース。
///   未検出・未知の値は `defaults` の値
pub fn parse_summary_response(text: &str, defaults: &SummaryDefaults) -> ParsedSummary {
    let lines: Vec<&str> = text.lines().collect();

    let summary = lines
        .iter()
        .filter(|line| !URGENCY_LABEL.is_match(line) && !ACTION_LABEL.is_match(line))
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let urgency = lines
        .iter()
        .find(|line| URGENCY_LABEL.is_match(line))
        .and_then(|line| label_value(line))
        .and_then(Urgency::parse)
        .unwrap_or_else(|| {
            log::debug!("No parseable urgency in summarizer response, using default");
            defaults.urgency
        });

    let suggested_action = lines
        .iter()
        .find(|line| ACTION_LABEL.is_match(line))
        .and_then(|line| label_value(line))
        .and_then(SuggestedAction::parse)
        .unwrap_or_else(|| {
            log::debug!("No parseable action in summarizer response, using default");
            defaults.suggested_action
        });

    ParsedSummary {
        summary,
        urgency,
        suggested_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_response() {
        let text = "The sender is asking about the Q3 report deadline.\n\
                    They need an answer before Friday.\n\
                    Urgency: High\n\
                    Suggested Action: Reply";

        let parsed = parse_summary_response(text, &SummaryDefaults::default());
        assert_eq!(
            parsed.summary,
            "The sender is asking about the Q3 report deadline. They need an answer before Friday."
        );
        assert_eq!(parsed.urgency, Urgency::High);
        assert_eq!(parsed.suggested_action, SuggestedAction::Reply);
    }

    #[test]
    fn test_parse_numbered_label_lines() {
        let text = "1. A short summary.\n2. Urgency: Medium\n3. Action: Follow Up";

        let parsed = parse_summary_response(text, &SummaryDefaults::default());
        assert_eq!(parsed.summary, "1. A short summary.");
        assert_eq!(parsed.urgency, Urgency::Medium);
        assert_eq!(parsed.suggested_action, SuggestedAction::FollowUp);
    }

    #[test]
    fn test_parse_missing_labels_falls_back_to_defaults() {
        let text = "Just a summary with no labels at all.";

        let parsed = parse_summary_response(text, &SummaryDefaults::default());
        assert_eq!(parsed.summary, "Just a summary with no labels at all.");
        assert_eq!(parsed.urgency, Urgency::Low);
        assert_eq!(parsed.suggested_action, SuggestedAction::ReadLater);
    }

    #[test]
    fn test_parse_unknown_values_fall_back_to_defaults() {
        let text = "Summary.\nUrgency: catastrophic\nAction: panic";

        let parsed = parse_summary_response(text, &SummaryDefaults::default());
        assert_eq!(parsed.urgency, Urgency::Low);
        assert_eq!(parsed.suggested_action, SuggestedAction::ReadLater);
    }

    #[test]
    fn test_parse_respects_configured_defaults() {
        let defaults = SummaryDefaults {
            urgency: Urgency::Medium,
            suggested_action: SuggestedAction::Archive,
        };

        let parsed = parse_summary_response("no labels here", &defaults);
        assert_eq!(parsed.urgency, Urgency::Medium);
        assert_eq!(parsed.suggested_action, SuggestedAction::Archive);
    }

    #[test]
    fn test_parse_case_insensitive_labels() {
        let text = "Summary.\nURGENCY: high\nsuggested action: reply";

        let parsed = parse_summary_response(text, &SummaryDefaults::default());
        assert_eq!(parsed.urgency, Urgency::High);
        assert_eq!(parsed.suggested_action, SuggestedAction::Reply);
    }

    #[test]
    fn test_parse_empty_response() {
        let parsed = parse_summary_response("", &SummaryDefaults::default());
        assert_eq!(parsed.summary, "");
        assert_eq!(parsed.urgency, Urgency::Low);
        assert_eq!(parsed.suggested_action, SuggestedAction::ReadLater);
    }

    #[test]
    fn test_label_value_stops_at_second_colon() {
        assert_eq!(label_value("Urgency: High: really"), Some("High"));
        assert_eq!(label_value("no colon"), None);
    }
}
