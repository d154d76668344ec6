//! Query Driver: parse a query file, invoke the BM25 scorer for every
//! query (in parallel), and emit a TREC run file.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rayon::prelude::*;

use crate::bm25::{Bm25Index, Bm25Params, ScoreMode};
use crate::error::{RetrieveError, RetrieveResult};
use crate::runio::{write_run, RunRow};
use crate::token::tokenize;

/// Cap on `[WARN]` lines emitted for malformed query rows, so a badly
/// formed file doesn't flood the log.
const MAX_WARNINGS: usize = 5;

/// One parsed row of a query file.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub qid: String,
    pub text: String,
}

/// Parse `qid<TAB>text` or `qid<SPACE>text` rows. Blank lines are skipped
/// silently; rows with no whitespace separator (or an empty qid) are
/// skipped with a capped `[WARN]`.
pub fn read_queries(path: &Path) -> RetrieveResult<Vec<Query>> {
    let file = std::fs::File::open(path).map_err(|e| RetrieveError::MissingFile {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let reader = BufReader::new(file);
    let mut queries = Vec::new();
    let mut warned = 0usize;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(idx) = line.find(|c: char| c == '\t' || c == ' ') else {
            if warned < MAX_WARNINGS {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping malformed query row: no qid/text separator"
                );
                warned += 1;
            }
            continue;
        };
        let (qid, rest) = line.split_at(idx);
        let qid = qid.trim();
        let text = rest[1..].trim();
        if qid.is_empty() {
            if warned < MAX_WARNINGS {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping malformed query row: empty qid"
                );
                warned += 1;
            }
            continue;
        }
        queries.push(Query { qid: qid.to_string(), text: text.to_string() });
    }
    Ok(queries)
}

/// Page table: internal docid -> external passage id. Advisory: callers
/// fall back to the internal id when a docid is absent.
pub fn read_page_table(path: &Path) -> RetrieveResult<HashMap<u32, String>> {
    let text = std::fs::read_to_string(path).map_err(|e| RetrieveError::MissingFile {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut map = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != 2 {
            return Err(RetrieveError::MalformedRow {
                path: path.to_path_buf(),
                line: lineno + 1,
                detail: "expected internal_docid, external_id".into(),
            });
        }
        let docid: u32 = cols[0].parse().map_err(|_| RetrieveError::MalformedRow {
            path: path.to_path_buf(),
            line: lineno + 1,
            detail: "non-integer internal docid".into(),
        })?;
        map.insert(docid, cols[1].to_string());
    }
    Ok(map)
}

fn external_id(docid: u32, page_table: Option<&HashMap<u32, String>>) -> String {
    page_table
        .and_then(|t| t.get(&docid))
        .cloned()
        .unwrap_or_else(|| docid.to_string())
}

/// Scoring parameters for a query batch.
#[derive(Debug, Clone, Copy)]
pub struct QueryDriverConfig {
    pub mode: ScoreMode,
    pub params: Bm25Params,
    pub topk: usize,
}

/// Summary counts for the `[OK]` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryStats {
    pub queries_read: usize,
    pub queries_with_results: usize,
}

/// Score every query in `queries` against `index`, in parallel (queries are
/// embarrassingly parallel; each worker only reads shared state). Queries
/// with zero in-vocabulary terms or an empty top-K are omitted from the
/// output rather than erroring.
pub fn run_queries(
    index: &Bm25Index<'_>,
    queries: &[Query],
    config: &QueryDriverConfig,
    page_table: Option<&HashMap<u32, String>>,
) -> RetrieveResult<(Vec<RunRow>, QueryStats)> {
    let per_query: Vec<RetrieveResult<Vec<RunRow>>> = queries
        .par_iter()
        .map(|q| {
            let terms = tokenize(&q.text);
            if terms.is_empty() {
                return Ok(Vec::new());
            }
            let ranked = index.score_query(&terms, config.mode, config.params, config.topk)?;
            Ok(ranked
                .into_iter()
                .enumerate()
                .map(|(i, (docid, score))| RunRow {
                    qid: q.qid.clone(),
                    docid: external_id(docid, page_table),
                    rank: (i + 1) as u32,
                    score: score as f64,
                    tag: "BM25".to_string(),
                })
                .collect())
        })
        .collect();

    let mut rows = Vec::new();
    let mut stats = QueryStats { queries_read: queries.len(), queries_with_results: 0 };
    for result in per_query {
        let query_rows = result?;
        if !query_rows.is_empty() {
            stats.queries_with_results += 1;
        }
        rows.extend(query_rows);
    }
    Ok((rows, stats))
}

/// Read `queries_path`, score every query against `index`, and write a
/// TREC run file (BM25 scores formatted to four decimal places) to
/// `out_path`.
pub fn search_to_run(
    index: &Bm25Index<'_>,
    queries_path: &Path,
    out_path: &Path,
    config: &QueryDriverConfig,
    page_table: Option<&HashMap<u32, String>>,
) -> RetrieveResult<QueryStats> {
    let queries = read_queries(queries_path)?;
    let (rows, stats) = run_queries(index, &queries, config, page_table)?;
    write_run(out_path, &rows, 4)?;
    tracing::info!(
        queries_read = stats.queries_read,
        queries_with_results = stats.queries_with_results,
        "[OK] search complete"
    );
    Ok(stats)
}
