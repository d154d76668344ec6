//! BM25 Scorer: IDF, per-posting score, disjunctive/conjunctive
//! aggregation, and top-K selection over the on-disk index.
//!
//! The `+1` smoothed IDF and top-K-via-heap-then-sort shape are carried
//! from the in-memory prototype this crate grew out of; what's new here is
//! reading postings from disk (lexicon + postings file + doclen sidecar)
//! instead of a `HashMap`, and conjunctive scoring.

use std::collections::HashMap;

use crate::error::{RetrieveError, RetrieveResult};
use crate::postings::{lookup, LexiconEntry, PostingsFile};

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 0.9, b: 0.4 }
    }
}

/// How a multi-term query combines its per-term candidate sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    /// A document qualifies if scored by at least one query term.
    Disjunctive,
    /// A document qualifies only if it appears under every in-vocabulary
    /// query term (OOV terms are ignored, not treated as empty results).
    Conjunctive,
}

/// `idf(df) = ln((N - df + 0.5) / (df + 0.5) + 1)`, the Robertson-Spärck-Jones
/// "plus-one" smoothing. Always non-negative.
pub fn idf(n: u32, df: u32) -> f32 {
    let n = n as f32;
    let df = df as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// A read-only handle on the three index artifacts needed to score queries.
pub struct Bm25Index<'a> {
    lexicon: &'a [LexiconEntry],
    doclen: &'a [u32],
    postings: &'a PostingsFile,
    avgdl: f32,
}

impl<'a> Bm25Index<'a> {
    pub fn new(lexicon: &'a [LexiconEntry], doclen: &'a [u32], postings: &'a PostingsFile) -> Self {
        let avgdl = if doclen.is_empty() {
            0.0
        } else {
            doclen.iter().map(|&d| d as f64).sum::<f64>() as f32 / doclen.len() as f32
        };
        Self { lexicon, doclen, postings, avgdl }
    }

    pub fn num_docs(&self) -> u32 {
        self.doclen.len() as u32
    }

    fn term_score(&self, tf: u32, docid: u32, idf_t: f32, params: Bm25Params) -> f32 {
        let tf = tf as f32;
        let dl = self.doclen.get(docid as usize).copied().unwrap_or(0) as f32;
        let denom = tf + params.k1 * (1.0 - params.b + params.b * dl / self.avgdl.max(1.0));
        idf_t * tf * (params.k1 + 1.0) / denom
    }

    /// Score `terms` (duplicates folded, query-side term frequency ignored)
    /// and return the top `topk` `(docid, score)` pairs, sorted by score
    /// descending and ties broken by ascending docid.
    pub fn score_query(
        &self,
        terms: &[String],
        mode: ScoreMode,
        params: Bm25Params,
        topk: usize,
    ) -> RetrieveResult<Vec<(u32, f32)>> {
        if topk == 0 {
            return Err(RetrieveError::InvalidParameter("topk must be >= 1".into()));
        }
        if self.doclen.is_empty() {
            return Err(RetrieveError::EmptyIndex);
        }

        let mut seen_terms: Vec<&str> = Vec::new();
        let mut in_vocab: Vec<(&LexiconEntry, f32, Vec<u32>, Vec<u32>)> = Vec::new();
        for t in terms {
            if seen_terms.contains(&t.as_str()) {
                continue;
            }
            seen_terms.push(t.as_str());
            if let Some(entry) = lookup(self.lexicon, t) {
                let (docs, tfs) = self.postings.read(entry.byte_offset, entry.byte_length)?;
                let idf_t = idf(self.num_docs(), entry.df);
                in_vocab.push((entry, idf_t, docs, tfs));
            }
        }

        if in_vocab.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: HashMap<u32, f32> = HashMap::new();
        for (_, idf_t, docs, tfs) in &in_vocab {
            for (&docid, &tf) in docs.iter().zip(tfs.iter()) {
                let s = self.term_score(tf, docid, *idf_t, params);
                *scores.entry(docid).or_insert(0.0) += s;
            }
        }

        if mode == ScoreMode::Conjunctive {
            let qualifying = intersect_docsets(in_vocab.iter().map(|(_, _, docs, _)| docs.as_slice()));
            scores.retain(|d, _| qualifying.contains(d));
        }

        let mut ranked: Vec<(u32, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(topk);
        Ok(ranked)
    }
}

/// Intersection of a set of strictly-ascending-sorted docid slices.
fn intersect_docsets<'a>(mut sets: impl Iterator<Item = &'a [u32]>) -> std::collections::HashSet<u32> {
    let Some(first) = sets.next() else {
        return std::collections::HashSet::new();
    };
    let mut acc: std::collections::HashSet<u32> = first.iter().copied().collect();
    for s in sets {
        let next: std::collections::HashSet<u32> = s.iter().copied().collect();
        acc.retain(|d| next.contains(d));
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_index, BuildConfig};
    use crate::merge::merge_runs;
    use crate::postings::{read_doclen, read_lexicon, PostingsFile};

    struct Corpus {
        lexicon: Vec<LexiconEntry>,
        doclen: Vec<u32>,
        postings: PostingsFile,
        _tmp: tempfile::TempDir,
    }

    fn tiny_corpus() -> Corpus {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("collection.tsv");
        std::fs::write(
            &input,
            "0\tthe quick brown fox\n1\tthe lazy dog\n2\tquick brown dog\n",
        )
        .unwrap();
        let run_dir = tmp.path().join("runs");
        build_index(&BuildConfig { input, outdir: run_dir.clone(), batch_docs: 10, max_docs: None })
            .unwrap();
        let out_dir = tmp.path().join("index");
        merge_runs(&run_dir, &out_dir).unwrap();

        let lexicon = read_lexicon(&out_dir.join("lexicon.tsv")).unwrap();
        let doclen = read_doclen(&out_dir.join("doclen.bin")).unwrap();
        let postings = PostingsFile::open(&out_dir.join("postings.bin")).unwrap();
        Corpus { lexicon, doclen, postings, _tmp: tmp }
    }

    #[test]
    fn idf_is_nonnegative_even_at_df_eq_n() {
        assert!((idf(10, 10) - 1.5f32.ln()).abs() < 1e-6);
        assert!(idf(10, 10) >= 0.0);
        assert!(idf(10, 1) > idf(10, 5));
    }

    #[test]
    fn disjunctive_ranks_doc_matching_both_terms_first() {
        // Doc 2 matches both query terms and ranks first. Docs 0 and 1 each
        // match one term with the same idf; doc 1 ("the lazy dog", 3 tokens)
        // is shorter than average (10/3) while doc 0 ("the quick brown fox",
        // 4 tokens) is longer, so length normalisation (b=0.4) ranks doc 1
        // above doc 0 — verified against the closed-form BM25 values.
        let c = tiny_corpus();
        let index = Bm25Index::new(&c.lexicon, &c.doclen, &c.postings);
        let terms = vec!["quick".to_string(), "dog".to_string()];
        let results = index
            .score_query(&terms, ScoreMode::Disjunctive, Bm25Params::default(), 3)
            .unwrap();
        let docids: Vec<u32> = results.iter().map(|(d, _)| *d).collect();
        assert_eq!(docids, vec![2, 1, 0]);
    }

    #[test]
    fn conjunctive_filter_returns_only_docs_with_all_terms() {
        let c = tiny_corpus();
        let index = Bm25Index::new(&c.lexicon, &c.doclen, &c.postings);
        let terms = vec!["quick".to_string(), "dog".to_string()];
        let results = index
            .score_query(&terms, ScoreMode::Conjunctive, Bm25Params::default(), 3)
            .unwrap();
        let docids: Vec<u32> = results.iter().map(|(d, _)| *d).collect();
        assert_eq!(docids, vec![2]);
    }

    #[test]
    fn out_of_vocabulary_query_is_empty() {
        let c = tiny_corpus();
        let index = Bm25Index::new(&c.lexicon, &c.doclen, &c.postings);
        let terms = vec!["zzz".to_string()];
        let results = index
            .score_query(&terms, ScoreMode::Disjunctive, Bm25Params::default(), 3)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn conjunctive_is_subset_of_disjunctive_with_equal_scores() {
        let c = tiny_corpus();
        let index = Bm25Index::new(&c.lexicon, &c.doclen, &c.postings);
        let terms = vec!["quick".to_string(), "dog".to_string()];
        let disj: HashMap<u32, f32> = index
            .score_query(&terms, ScoreMode::Disjunctive, Bm25Params::default(), 10)
            .unwrap()
            .into_iter()
            .collect();
        let conj = index
            .score_query(&terms, ScoreMode::Conjunctive, Bm25Params::default(), 10)
            .unwrap();
        for (d, s) in conj {
            assert!((disj[&d] - s).abs() < 1e-6);
        }
    }

    #[test]
    fn topk_is_stable_across_repeated_runs() {
        let c = tiny_corpus();
        let index = Bm25Index::new(&c.lexicon, &c.doclen, &c.postings);
        let terms = vec!["quick".to_string(), "dog".to_string()];
        let a = index.score_query(&terms, ScoreMode::Disjunctive, Bm25Params::default(), 3).unwrap();
        let b = index.score_query(&terms, ScoreMode::Disjunctive, Bm25Params::default(), 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_query_terms_do_not_double_count() {
        let c = tiny_corpus();
        let index = Bm25Index::new(&c.lexicon, &c.doclen, &c.postings);
        let once = index
            .score_query(&["quick".to_string()], ScoreMode::Disjunctive, Bm25Params::default(), 3)
            .unwrap();
        let twice = index
            .score_query(
                &["quick".to_string(), "quick".to_string()],
                ScoreMode::Disjunctive,
                Bm25Params::default(),
                3,
            )
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn term_score_is_monotonic_in_tf() {
        let c = tiny_corpus();
        let index = Bm25Index::new(&c.lexicon, &c.doclen, &c.postings);
        let idf_t = 1.3;
        let docid = 0u32;
        let params = Bm25Params::default();
        let mut prev = index.term_score(0, docid, idf_t, params);
        for tf in 1..50 {
            let next = index.term_score(tf, docid, idf_t, params);
            assert!(next >= prev, "score decreased from tf={} to tf={}: {} -> {}", tf - 1, tf, prev, next);
            prev = next;
        }
    }

    #[test]
    fn topk_zero_is_rejected() {
        let c = tiny_corpus();
        let index = Bm25Index::new(&c.lexicon, &c.doclen, &c.postings);
        let err = index
            .score_query(&["quick".to_string()], ScoreMode::Disjunctive, Bm25Params::default(), 0)
            .unwrap_err();
        assert!(matches!(err, RetrieveError::InvalidParameter(_)));
    }
}
