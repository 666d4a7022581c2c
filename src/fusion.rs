//! Reciprocal Rank Fusion of N ranked lists (spec §4.5).

use std::collections::HashMap;

use crate::models::SearchResult;

/// Fuses `lists` via RRF and returns the top `top_k` merged results.
///
/// For each list and each result at zero-based rank `r`, accumulates score
/// `1 / (k + r + 1)` keyed by [`SearchResult::dedup_key`]. For each merged
/// entry, metadata is carried forward from the *highest-original-score*
/// occurrence across all lists.
pub fn reciprocal_rank_fusion(
    lists: &[Vec<SearchResult>],
    k: usize,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut best: HashMap<String, &SearchResult> = HashMap::new();

    for list in lists {
        for (rank, result) in list.iter().enumerate() {
            let key = result.dedup_key();
            *scores.entry(key.clone()).or_insert(0.0) += 1.0 / (k as f32 + rank as f32 + 1.0);
            best.entry(key)
                .and_modify(|existing| {
                    if result.score > existing.score {
                        *existing = result;
                    }
                })
                .or_insert(result);
        }
    }

    let mut merged: Vec<(String, f32)> = scores.into_iter().collect();
    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    merged.truncate(top_k);

    merged
        .into_iter()
        .map(|(key, score)| {
            let mut result = best.get(key.as_str()).unwrap().clone();
            result.score = score;
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultMetadata;

    fn r(file: &str, text: &str, score: f32) -> SearchResult {
        SearchResult {
            text: text.to_string(),
            score,
            metadata: ResultMetadata {
                file_path: file.to_string(),
                category: "c".to_string(),
                topic: "t".to_string(),
                title: "T".to_string(),
                has_code: false,
            },
        }
    }

    /// Scenario S4: lists `[A, B, C]` and `[B, C, D]`, k=60, top_k=4.
    #[test]
    fn s4_rrf_scores_match_spec() {
        let a = r("A", "a text", 0.9);
        let b = r("B", "b text", 0.8);
        let c = r("C", "c text", 0.7);
        let d = r("D", "d text", 0.6);

        let list1 = vec![a.clone(), b.clone(), c.clone()];
        let list2 = vec![b.clone(), c.clone(), d.clone()];

        let merged = reciprocal_rank_fusion(&[list1, list2], 60, 4);

        assert_eq!(merged.len(), 4);
        assert_eq!(merged[0].metadata.file_path, "B");
        assert_eq!(merged[1].metadata.file_path, "C");

        let b_score = merged.iter().find(|x| x.metadata.file_path == "B").unwrap().score;
        let c_score = merged.iter().find(|x| x.metadata.file_path == "C").unwrap().score;
        let a_score = merged.iter().find(|x| x.metadata.file_path == "A").unwrap().score;

        assert!((b_score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-6);
        assert!((c_score - (1.0 / 62.0 + 1.0 / 63.0)).abs() < 1e-6);
        assert!((a_score - (1.0 / 61.0)).abs() < 1e-6);
    }

    #[test]
    fn output_length_bounded_by_top_k_and_total_candidates() {
        let list = vec![r("A", "a", 1.0), r("B", "b", 0.5)];
        let merged = reciprocal_rank_fusion(&[list], 60, 10);
        assert!(merged.len() <= 2);
    }

    #[test]
    fn scores_are_monotonically_non_increasing() {
        let list1 = vec![r("A", "a", 1.0), r("B", "b", 0.9), r("C", "c", 0.8)];
        let list2 = vec![r("C", "c", 0.8), r("A", "a", 1.0)];
        let merged = reciprocal_rank_fusion(&[list1, list2], 60, 10);
        for w in merged.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[test]
    fn dedup_collapses_same_file_and_prefix_across_lists() {
        let list1 = vec![r("A", "same text", 1.0)];
        let list2 = vec![r("A", "same text", 0.5)];
        let merged = reciprocal_rank_fusion(&[list1, list2], 60, 10);
        assert_eq!(merged.len(), 1);
    }
}
