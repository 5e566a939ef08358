use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{KeywordHit, RetrievedChunk, Source, VectorHit};

/// RRF damping constant.
pub const RRF_K: f64 = 60.0;

/// Contribution of the item at zero-based `rank` in one list.
pub fn rrf_contribution(rank: usize) -> f64 {
    1.0 / (RRF_K + rank as f64 + 1.0)
}

/// Fuses two ranked lists by Reciprocal Rank Fusion.
///
/// Ids present in both lists sum their contributions and are tagged
/// [`Source::Both`]. Within one list the first occurrence of an id wins.
/// Empty texts are dropped; ties keep vector-first insertion order.
#[must_use]
pub fn fuse(vector: &[VectorHit], keyword: &[KeywordHit]) -> Vec<RetrievedChunk> {
    let mut fused: Vec<RetrievedChunk> = Vec::with_capacity(vector.len() + keyword.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (rank, hit) in vector.iter().enumerate() {
        let id = hit
            .metadata
            .id
            .clone()
            .unwrap_or_else(|| format!("vector-{rank}"));
        if positions.contains_key(&id) {
            debug!(id = %id, rank, "Duplicate id in vector results");
            continue;
        }
        positions.insert(id.clone(), fused.len());
        fused.push(RetrievedChunk {
            id,
            text: hit.text.clone(),
            file_path: hit.metadata.file_path.clone(),
            function_name: hit.metadata.function_name.clone(),
            start_line: hit.metadata.start_line,
            end_line: hit.metadata.end_line,
            source: Source::Vector,
            score: rrf_contribution(rank),
        });
    }

    let mut keyword_seen = HashSet::new();
    for (rank, hit) in keyword.iter().enumerate() {
        if !keyword_seen.insert(hit.id.as_str()) {
            debug!(id = %hit.id, rank, "Duplicate id in keyword results");
            continue;
        }
        let contribution = rrf_contribution(rank);

        match positions.get(&hit.id).copied() {
            Some(idx) => {
                let existing = &mut fused[idx];
                existing.score += contribution;
                existing.source = Source::Both;
                if existing.text.is_empty() {
                    existing.text = hit.text.clone();
                }
                if existing.file_path.is_none() {
                    existing.file_path = hit.metadata.file_path.clone();
                }
                if existing.function_name.is_none() {
                    existing.function_name = hit.metadata.function_name.clone();
                }
                if existing.start_line.is_none() {
                    existing.start_line = hit.metadata.start_line;
                    existing.end_line = hit.metadata.end_line;
                }
            }
            None => {
                positions.insert(hit.id.clone(), fused.len());
                fused.push(RetrievedChunk {
                    id: hit.id.clone(),
                    text: hit.text.clone(),
                    file_path: hit.metadata.file_path.clone(),
                    function_name: hit.metadata.function_name.clone(),
                    start_line: hit.metadata.start_line,
                    end_line: hit.metadata.end_line,
                    source: Source::Keyword,
                    score: contribution,
                });
            }
        }
    }

    fused.retain(|chunk| !chunk.text.is_empty());
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::HitMetadata;

    fn vhit(id: Option<&str>, text: &str) -> VectorHit {
        VectorHit {
            text: text.to_string(),
            metadata: HitMetadata {
                id: id.map(str::to_string),
                ..HitMetadata::default()
            },
        }
    }

    fn khit(id: &str, text: &str) -> KeywordHit {
        KeywordHit {
            id: id.to_string(),
            text: text.to_string(),
            metadata: HitMetadata {
                id: Some(id.to_string()),
                file_path: Some(format!("{id}.ts")),
                function_name: Some(id.to_string()),
                start_line: Some(1),
                end_line: Some(4),
            },
            score: 1.0,
        }
    }

    fn find<'a>(fused: &'a [RetrievedChunk], id: &str) -> &'a RetrievedChunk {
        fused.iter().find(|c| c.id == id).unwrap()
    }

    #[test]
    fn test_rrf_arithmetic() {
        let vector = vec![vhit(Some("v0"), "a"), vhit(Some("v1"), "b"), vhit(Some("x"), "x")];
        let keyword = vec![
            khit("x", "x"),
            khit("k1", "k1"),
            khit("k2", "k2"),
            khit("k3", "k3"),
            khit("y", "y"),
        ];
        let fused = fuse(&vector, &keyword);

        let x = find(&fused, "x");
        assert_eq!(x.source, Source::Both);
        assert!((x.score - (1.0 / 63.0 + 1.0 / 61.0)).abs() < 1e-12);

        let y = find(&fused, "y");
        assert_eq!(y.source, Source::Keyword);
        assert!((y.score - 1.0 / 65.0).abs() < 1e-12);

        assert_eq!(find(&fused, "v1").source, Source::Vector);
        assert_eq!(fused[0].id, "x");
        assert_eq!(fused.len(), 7);
    }

    #[test]
    fn test_sorted_descending_and_stable_on_ties() {
        let fused = fuse(&[vhit(Some("v"), "v")], &[khit("k", "k")]);
        assert_eq!(fused[0].id, "v");
        assert_eq!(fused[1].id, "k");
        assert_eq!(fused[0].score, fused[1].score);

        let fused = fuse(
            &[vhit(Some("a"), "a"), vhit(Some("b"), "b")],
            &[khit("b", "b")],
        );
        let ids: Vec<_> = fused.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        for pair in fused.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_missing_vector_id_uses_rank() {
        let fused = fuse(&[vhit(Some("a"), "a"), vhit(None, "anon")], &[]);
        assert_eq!(fused[1].id, "vector-1");
        assert!(fused[1].file_path.is_none());
    }

    #[test]
    fn test_empty_text_dropped() {
        let fused = fuse(&[vhit(Some("a"), "")], &[khit("b", "")]);
        assert!(fused.is_empty());
    }

    #[test]
    fn test_both_fills_missing_fields_from_keyword() {
        let fused = fuse(&[vhit(Some("x"), "")], &[khit("x", "from keyword")]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].text, "from keyword");
        assert_eq!(fused[0].file_path.as_deref(), Some("x.ts"));
        assert_eq!(fused[0].start_line, Some(1));
    }

    #[test]
    fn test_duplicate_ids_within_list_first_wins() {
        let fused = fuse(
            &[vhit(Some("a"), "first"), vhit(Some("a"), "second")],
            &[khit("k", "k"), khit("k", "again")],
        );
        assert_eq!(fused.len(), 2);
        let a = find(&fused, "a");
        assert_eq!(a.text, "first");
        assert!((a.score - rrf_contribution(0)).abs() < 1e-12);
        assert_eq!(find(&fused, "k").text, "k");
    }
}
