//! ダイジェスト選別のビジネスロジック
//!
//! ユーザーのサマリー一覧から配信対象を選び、緊急度ごとのグループへ
//! 整形する。返信済み（Replied）は対象外。

use crate::repository::{SuggestedAction, ThreadSummary, Urgency};

/// 1回のダイジェストに含める最大件数
pub const DIGEST_MAX_ITEMS: usize = 10;

/// 緊急度ごとのサマリーグループ（High → Low の順で保持）
#[derive(Debug, Clone)]
pub struct DigestGroup {
    pub urgency: Urgency,
    pub summaries: Vec<ThreadSummary>,
}

/// 返信済みのサマリーを除外する
pub fn filter_unreplied(summaries: Vec<ThreadSummary>) -> Vec<ThreadSummary> {
    summaries
        .into_iter()
        .filter(|s| s.suggested_action != SuggestedAction::Replied)
        .collect()
}

/// 緊急度の高い順（High → Medium → Low）に整列し、上位のみ残す
pub fn select_top_urgent(mut summaries: Vec<ThreadSummary>) -> Vec<ThreadSummary> {
    summaries.sort_by_key(|s| s.urgency.rank());
    summaries.truncate(DIGEST_MAX_ITEMS);
    summaries
}

/// サマリーを緊急度ごとにグループ化する（空グループは含めない）
pub fn group_by_urgency(summaries: Vec<ThreadSummary>) -> Vec<DigestGroup> {
    let mut groups: Vec<DigestGroup> = Vec::new();

    for urgency in [Urgency::High, Urgency::Medium, Urgency::Low] {
        let bucket: Vec<ThreadSummary> = summaries
            .iter()
            .filter(|s| s.urgency == urgency)
            .cloned()
            .collect();
        if !bucket.is_empty() {
            groups.push(DigestGroup {
                urgency,
                summaries: bucket,
            });
        }
    }

    groups
}

/// ダイジェスト配信の内容を組み立てる
///
/// # Returns
/// 未返信サマリーが1件もない場合はNone（配信スキップ）。それ以外は
/// 緊急度降順・上位10件を緊急度ごとにグループ化したリスト
pub fn prepare_digest(summaries: Vec<ThreadSummary>) -> Option<Vec<DigestGroup>> {
    let unreplied = filter_unreplied(summaries);
    if unreplied.is_empty() {
        return None;
    }

    Some(group_by_urgency(select_top_urgent(unreplied)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(thread_id: &str, urgency: Urgency, action: SuggestedAction) -> ThreadSummary {
        ThreadSummary {
            id: format!("id-{thread_id}"),
            thread_id: thread_id.to_string(),
            user_id: "user-1".to_string(),
            subject: format!("Subject {thread_id}"),
            summary: "summary text".to_string(),
            urgency,
            suggested_action: action,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    // ==================== filter_unreplied Tests ====================

    #[test]
    fn test_filter_unreplied_excludes_replied_only() {
        let summaries = vec![
            summary("t1", Urgency::Low, SuggestedAction::Reply),
            summary("t2", Urgency::Low, SuggestedAction::Replied),
            summary("t3", Urgency::Low, SuggestedAction::Archive),
        ];

        let filtered = filter_unreplied(summaries);
        let ids: Vec<&str> = filtered.iter().map(|s| s.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
    }

    // ==================== select_top_urgent Tests ====================

    #[test]
    fn test_select_top_urgent_orders_high_to_low() {
        let summaries = vec![
            summary("low", Urgency::Low, SuggestedAction::ReadLater),
            summary("high", Urgency::High, SuggestedAction::Reply),
            summary("medium", Urgency::Medium, SuggestedAction::FollowUp),
        ];

        let sorted = select_top_urgent(summaries);
        let ids: Vec<&str> = sorted.iter().map(|s| s.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "medium", "low"]);
    }

    #[test]
    fn test_select_top_urgent_truncates_to_ten() {
        let mut summaries: Vec<ThreadSummary> = (0..15)
            .map(|i| summary(&format!("t{i}"), Urgency::Low, SuggestedAction::Reply))
            .collect();
        summaries.push(summary("urgent", Urgency::High, SuggestedAction::Reply));

        let selected = select_top_urgent(summaries);
        assert_eq!(selected.len(), DIGEST_MAX_ITEMS);
        // Highが先頭に来る
        assert_eq!(selected[0].thread_id, "urgent");
    }

    // ==================== group_by_urgency / prepare_digest Tests ====================

    #[test]
    fn test_group_by_urgency_skips_empty_groups() {
        let summaries = vec![
            summary("h1", Urgency::High, SuggestedAction::Reply),
            summary("l1", Urgency::Low, SuggestedAction::ReadLater),
            summary("h2", Urgency::High, SuggestedAction::FollowUp),
        ];

        let groups = group_by_urgency(summaries);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].urgency, Urgency::High);
        assert_eq!(groups[0].summaries.len(), 2);
        assert_eq!(groups[1].urgency, Urgency::Low);
        assert_eq!(groups[1].summaries.len(), 1);
    }

    #[test]
    fn test_prepare_digest_none_when_all_replied() {
        let summaries = vec![
            summary("t1", Urgency::High, SuggestedAction::Replied),
            summary("t2", Urgency::Low, SuggestedAction::Replied),
        ];
        assert!(prepare_digest(summaries).is_none());
    }

    #[test]
    fn test_prepare_digest_none_when_empty() {
        assert!(prepare_digest(Vec::new()).is_none());
    }

    #[test]
    fn test_prepare_digest_groups_unreplied() {
        let summaries = vec![
            summary("t1", Urgency::Medium, SuggestedAction::Reply),
            summary("t2", Urgency::High, SuggestedAction::Replied),
            summary("t3", Urgency::High, SuggestedAction::FollowUp),
        ];

        let groups = prepare_digest(summaries).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].urgency, Urgency::High);
        assert_eq!(groups[0].summaries[0].thread_id, "t3");
        assert_eq!(groups[1].urgency, Urgency::Medium);
    }
}
