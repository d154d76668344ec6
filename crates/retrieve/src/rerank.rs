//! Reranker: dot-product dense scoring over a BM25 candidate set, with
//! independent normalisation of each score stream and a choice of fusion.

use std::collections::HashMap;

use crate::embed::EmbeddingStore;
use crate::error::{RetrieveError, RetrieveResult};
use crate::runio::RunRow;
use crate::simd::dot;

/// How each score stream is rescaled before fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalisation {
    None,
    MinMax,
    ZScore,
}

const EPSILON: f64 = 1e-9;

/// Rescale `scores` by `method`. Pure: takes a map, returns a new one, never
/// mutates its input. Empty input yields empty output under every method.
pub fn normalise(scores: &HashMap<String, f64>, method: Normalisation) -> HashMap<String, f64> {
    if scores.is_empty() || method == Normalisation::None {
        return scores.clone();
    }
    match method {
        Normalisation::None => unreachable!(),
        Normalisation::MinMax => {
            let min = scores.values().cloned().fold(f64::INFINITY, f64::min);
            let max = scores.values().cloned().fold(f64::NEG_INFINITY, f64::max);
            let range = (max - min).max(EPSILON);
            scores.iter().map(|(k, v)| (k.clone(), (v - min) / range)).collect()
        }
        Normalisation::ZScore => {
            let n = scores.len() as f64;
            let mean = scores.values().sum::<f64>() / n;
            let var = scores.values().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let stdev = var.sqrt().max(EPSILON);
            scores.iter().map(|(k, v)| (k.clone(), (v - mean) / stdev)).collect()
        }
    }
}

/// How the normalised dense and BM25 streams combine into a final score.
#[derive(Debug, Clone, Copy)]
pub enum Fusion {
    /// Dense score only; BM25 is discarded.
    Dense,
    /// `alpha * dense + (1 - alpha) * bm25`, missing BM25 entries default to 0.
    Linear { alpha: f64 },
}

/// Rerank `topk_in`-bounded candidates for a single query already filtered
/// from a BM25 run: `candidates` is `(pid, bm25_score)`.
pub fn rerank_query(
    qid: &str,
    query_vec: &[f32],
    candidates: &[(String, f64)],
    passages: &EmbeddingStore,
    fusion: Fusion,
    norm_dense: Normalisation,
    norm_bm25: Normalisation,
    topk_out: usize,
    tag: &str,
) -> RetrieveResult<Vec<RunRow>> {
    if topk_out == 0 {
        return Err(RetrieveError::InvalidParameter("topk_out must be >= 1".into()));
    }

    let mut dense_raw: HashMap<String, f64> = HashMap::new();
    let mut bm25_raw: HashMap<String, f64> = HashMap::new();
    for (pid, bm25_score) in candidates {
        let Some(row) = pid.parse::<i64>().ok().and_then(|id| passages.find(id)) else {
            continue;
        };
        let pvec = passages.row(row);
        if pvec.len() != query_vec.len() {
            return Err(RetrieveError::DimensionMismatch {
                query_dim: query_vec.len(),
                doc_dim: pvec.len(),
            });
        }
        dense_raw.insert(pid.clone(), dot(query_vec, pvec) as f64);
        bm25_raw.insert(pid.clone(), *bm25_score);
    }

    if dense_raw.is_empty() {
        return Ok(Vec::new());
    }

    let dense_norm = normalise(&dense_raw, norm_dense);
    let bm25_norm = normalise(&bm25_raw, norm_bm25);

    let mut fused: Vec<(String, f64)> = dense_norm
        .iter()
        .map(|(pid, &dense)| {
            let score = match fusion {
                Fusion::Dense => dense,
                Fusion::Linear { alpha } => {
                    let bm25 = bm25_norm.get(pid).copied().unwrap_or(0.0);
                    alpha * dense + (1.0 - alpha) * bm25
                }
            };
            (pid.clone(), score)
        })
        .collect();

    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused.truncate(topk_out);

    Ok(fused
        .into_iter()
        .enumerate()
        .map(|(i, (pid, score))| RunRow {
            qid: qid.to_string(),
            docid: pid,
            rank: (i + 1) as u32,
            score,
            tag: tag.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(rows: &[(i64, Vec<f32>)]) -> (tempfile::TempDir, EmbeddingStore) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store.bin");
        EmbeddingStore::write(&path, rows).unwrap();
        let store = EmbeddingStore::open(&path).unwrap();
        (tmp, store)
    }

    #[test]
    fn dense_fusion_ranking_equals_sort_by_dot_product() {
        let (_tmp, passages) = store(&[
            (0, vec![0.0, 1.0]),
            (1, vec![1.0, 0.0]),
            (2, vec![0.5, 0.5]),
        ]);
        let candidates = vec![
            ("0".to_string(), 3.0),
            ("1".to_string(), 2.0),
            ("2".to_string(), 1.0),
        ];
        let rows = rerank_query(
            "q1",
            &[1.0, 0.0],
            &candidates,
            &passages,
            Fusion::Dense,
            Normalisation::None,
            Normalisation::None,
            3,
            "rerank",
        )
        .unwrap();
        let docids: Vec<&str> = rows.iter().map(|r| r.docid.as_str()).collect();
        assert_eq!(docids, vec!["1", "2", "0"]);
    }

    #[test]
    fn linear_fusion_averages_minmax_normalised_streams() {
        let (_tmp, passages) = store(&[
            (0, vec![0.0, 1.0]),
            (1, vec![1.0, 0.0]),
            (2, vec![0.5, 0.5]),
        ]);
        let candidates = vec![
            ("0".to_string(), 3.0),
            ("1".to_string(), 2.0),
            ("2".to_string(), 1.0),
        ];
        let rows = rerank_query(
            "q1",
            &[1.0, 0.0],
            &candidates,
            &passages,
            Fusion::Linear { alpha: 0.5 },
            Normalisation::MinMax,
            Normalisation::MinMax,
            3,
            "rerank",
        )
        .unwrap();
        let docids: Vec<&str> = rows.iter().map(|r| r.docid.as_str()).collect();
        // dense minmax: 0->0, 1->1, 2->0.5; bm25 minmax: 0->1, 1->0.5, 2->0
        // fused: 0->0.5, 1->0.75, 2->0.25
        assert_eq!(docids, vec!["1", "0", "2"]);
    }

    #[test]
    fn normalise_is_pure_and_handles_empty() {
        let empty: HashMap<String, f64> = HashMap::new();
        assert!(normalise(&empty, Normalisation::MinMax).is_empty());

        let mut scores = HashMap::new();
        scores.insert("a".to_string(), 1.0);
        scores.insert("b".to_string(), 3.0);
        let before = scores.clone();
        let _ = normalise(&scores, Normalisation::ZScore);
        assert_eq!(scores, before);
    }

    #[test]
    fn minmax_bounds_are_0_to_1() {
        let mut scores = HashMap::new();
        scores.insert("a".to_string(), 5.0);
        scores.insert("b".to_string(), -2.0);
        scores.insert("c".to_string(), 10.0);
        let normed = normalise(&scores, Normalisation::MinMax);
        for v in normed.values() {
            assert!(*v >= 0.0 && *v <= 1.0);
        }
    }

    #[test]
    fn zscore_mean_is_approximately_zero() {
        let mut scores = HashMap::new();
        scores.insert("a".to_string(), 1.0);
        scores.insert("b".to_string(), 2.0);
        scores.insert("c".to_string(), 3.0);
        let normed = normalise(&scores, Normalisation::ZScore);
        let mean: f64 = normed.values().sum::<f64>() / normed.len() as f64;
        assert!(mean.abs() < 1e-6);
    }

    #[test]
    fn passages_missing_from_store_are_skipped() {
        let (_tmp, passages) = store(&[(0, vec![1.0, 0.0])]);
        let candidates = vec![("0".to_string(), 1.0), ("missing".to_string(), 5.0)];
        let rows = rerank_query(
            "q1",
            &[1.0, 0.0],
            &candidates,
            &passages,
            Fusion::Dense,
            Normalisation::None,
            Normalisation::None,
            10,
            "rerank",
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].docid, "0");
    }
}
