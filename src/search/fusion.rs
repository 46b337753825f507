//! Rank fusion
//!
//! Weighted Reciprocal Rank Fusion: each named list contributes
//! `weight / (k + rank)` for every id it holds, rank counted from 1, and
//! the sums are sorted descending. Rank-based fusion needs no score
//! normalization across engines, and rank >= 1 keeps the division safe.

use std::collections::HashMap;

use crate::core::note::NoteIdRank;

/// One ranked list entering fusion
pub struct RankedList<'a> {
    /// Engine name, for tracing only
    pub name: &'a str,
    pub weight: f32,
    /// Best first; position defines the rank
    pub ranks: &'a [NoteIdRank],
}

/// Fuse named ranked lists into one ordering.
///
/// Ids absent from a list receive no contribution from it. Ids with equal
/// fused scores keep a stable order (first list, then rank).
pub fn fuse_weighted(lists: &[RankedList<'_>], k: f32) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();

    for list in lists {
        for (position, entry) in list.ranks.iter().enumerate() {
            let rank = (position + 1) as f32;
            let contribution = list.weight / (k + rank);
            match scores.get_mut(&entry.id) {
                Some(score) => *score += contribution,
                None => {
                    scores.insert(entry.id.clone(), contribution);
                    first_seen.push(entry.id.clone());
                }
            }
        }
    }

    let mut fused: Vec<(String, f32)> = first_seen
        .into_iter()
        .map(|id| {
            let score = scores[&id];
            (id, score)
        })
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::Engine;

    fn ranks(ids: &[&str], engine: Engine) -> Vec<NoteIdRank> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| NoteIdRank {
                id: id.to_string(),
                score: 1.0 / (i + 1) as f32,
                engine,
            })
            .collect()
    }

    #[test]
    fn test_agreement_beats_any_single_list() {
        // A and B appear near the top of both lists; C trails in both
        let l1 = ranks(&["A", "B", "C"], Engine::Lexical);
        let l2 = ranks(&["B", "A", "C"], Engine::Semantic);

        for k in [1.0, 10.0, 60.0, 1000.0] {
            let fused = fuse_weighted(
                &[
                    RankedList { name: "lexical", weight: 1.0, ranks: &l1 },
                    RankedList { name: "semantic", weight: 1.0, ranks: &l2 },
                ],
                k,
            );
            let pos = |id: &str| fused.iter().position(|(i, _)| i == id).unwrap();
            assert!(pos("A") < pos("C"), "A should beat C at k={k}");
            assert!(pos("B") < pos("C"), "B should beat C at k={k}");
        }
    }

    #[test]
    fn test_doubling_weight_lifts_unique_ids() {
        let l1 = ranks(&["shared", "only1"], Engine::Lexical);
        let l2 = ranks(&["shared", "only2"], Engine::Semantic);

        let score_of = |fused: &[(String, f32)], id: &str| {
            fused.iter().find(|(i, _)| i == id).unwrap().1
        };

        let equal = fuse_weighted(
            &[
                RankedList { name: "l1", weight: 1.0, ranks: &l1 },
                RankedList { name: "l2", weight: 1.0, ranks: &l2 },
            ],
            60.0,
        );
        let boosted = fuse_weighted(
            &[
                RankedList { name: "l1", weight: 2.0, ranks: &l1 },
                RankedList { name: "l2", weight: 1.0, ranks: &l2 },
            ],
            60.0,
        );

        let margin_equal = score_of(&equal, "only1") - score_of(&equal, "only2");
        let margin_boosted = score_of(&boosted, "only1") - score_of(&boosted, "only2");
        assert!(margin_boosted > margin_equal);
    }

    #[test]
    fn test_absent_list_contributes_nothing() {
        let l1 = ranks(&["A"], Engine::Lexical);
        let fused = fuse_weighted(
            &[
                RankedList { name: "l1", weight: 1.0, ranks: &l1 },
                RankedList { name: "empty", weight: 5.0, ranks: &[] },
            ],
            60.0,
        );
        assert_eq!(fused.len(), 1);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        assert!(fuse_weighted(&[], 60.0).is_empty());
    }
}
