//! Orchestration glue for the four pipeline entry points: `index_build`,
//! `index_merge`, `search`, `rerank`. This crate wires
//! [`passage_retrieve`] functions together and handles CLI-facing concerns
//! (argument parsing, `[OK]`/`[WARN]`/`[ERR]` reporting, exit codes); the
//! retrieval algorithms themselves live in the library crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use passage_retrieve::bm25::{Bm25Index, Bm25Params, ScoreMode};
use passage_retrieve::build::{build_index, list_runs, BuildConfig};
use passage_retrieve::embed::EmbeddingStore;
use passage_retrieve::merge::merge_runs;
use passage_retrieve::postings::{read_doclen, read_lexicon, PostingsFile};
use passage_retrieve::query::{read_page_table, search_to_run, QueryDriverConfig};
use passage_retrieve::rerank::{rerank_query, Fusion, Normalisation};
use passage_retrieve::runio::{read_run, write_run, RunRow};

/// Arguments for `index_build`.
pub struct IndexBuildArgs {
    pub input: PathBuf,
    pub outdir: PathBuf,
    pub batch_docs: usize,
}

pub fn run_index_build(args: IndexBuildArgs) -> Result<()> {
    let stats = build_index(&BuildConfig {
        input: args.input,
        outdir: args.outdir,
        batch_docs: args.batch_docs,
        max_docs: None,
    })
    .context("index_build failed")?;
    println!(
        "[OK] documents={} runs_written={}",
        stats.documents, stats.runs_written
    );
    Ok(())
}

/// Arguments for `index_merge`.
pub struct IndexMergeArgs {
    pub run_dir: PathBuf,
    pub out_dir: PathBuf,
}

pub fn run_index_merge(args: IndexMergeArgs) -> Result<()> {
    let stats = merge_runs(&args.run_dir, &args.out_dir).context("index_merge failed")?;

    // Intermediate runs are deleted once the merge they fed into has
    // committed successfully.
    for run_path in list_runs(&args.run_dir).context("listing runs to delete")? {
        let _ = std::fs::remove_file(run_path);
    }
    let _ = std::fs::remove_file(args.run_dir.join("doclen.bin"));

    println!(
        "[OK] runs_merged={} terms_written={} postings_written={}",
        stats.runs_merged, stats.terms_written, stats.postings_written
    );
    Ok(())
}

/// Arguments for `search`.
pub struct SearchArgs {
    pub index_dir: PathBuf,
    pub queries: PathBuf,
    pub run_out: PathBuf,
    pub k1: f32,
    pub b: f32,
    pub mode: ScoreMode,
    pub topk: usize,
    pub page_table: Option<PathBuf>,
}

pub fn run_search(args: SearchArgs) -> Result<()> {
    let lexicon = read_lexicon(&args.index_dir.join("lexicon.tsv")).context("reading lexicon")?;
    let doclen = read_doclen(&args.index_dir.join("doclen.bin")).context("reading doclen")?;
    let postings =
        PostingsFile::open(&args.index_dir.join("postings.bin")).context("opening postings")?;
    let index = Bm25Index::new(&lexicon, &doclen, &postings);

    let page_table = args
        .page_table
        .as_deref()
        .map(read_page_table)
        .transpose()
        .context("reading page table")?;

    let config = QueryDriverConfig {
        mode: args.mode,
        params: Bm25Params { k1: args.k1, b: args.b },
        topk: args.topk,
    };
    let stats = search_to_run(&index, &args.queries, &args.run_out, &config, page_table.as_ref())
        .context("search failed")?;
    println!(
        "[OK] queries_read={} queries_with_results={}",
        stats.queries_read, stats.queries_with_results
    );
    Ok(())
}

/// Arguments for `rerank`.
pub struct RerankArgs {
    pub bm25_run: PathBuf,
    pub query_h5: PathBuf,
    pub passage_h5: PathBuf,
    pub qid_list: Option<PathBuf>,
    pub topk_in: usize,
    pub topk_out: usize,
    pub fusion: Fusion,
    pub norm_dense: Normalisation,
    pub norm_bm25: Normalisation,
    pub run_out: PathBuf,
    pub tag: String,
}

fn read_qid_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading qid list {}", path.display()))?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

/// Group a BM25 run's rows by qid, each truncated to its first `topk_in`
/// rows in rank order (or file order, for 3-column compact input).
fn group_candidates(rows: &[RunRow], topk_in: usize) -> HashMap<String, Vec<(String, f64)>> {
    let mut by_qid: HashMap<String, Vec<&RunRow>> = HashMap::new();
    for row in rows {
        by_qid.entry(row.qid.clone()).or_default().push(row);
    }
    by_qid
        .into_iter()
        .map(|(qid, mut qrows)| {
            qrows.sort_by_key(|r| r.rank);
            qrows.truncate(topk_in);
            (qid, qrows.into_iter().map(|r| (r.docid.clone(), r.score)).collect())
        })
        .collect()
}

pub fn run_rerank(args: RerankArgs) -> Result<()> {
    let queries = EmbeddingStore::open(&args.query_h5).context("opening query embeddings")?;
    let passages = EmbeddingStore::open(&args.passage_h5).context("opening passage embeddings")?;
    if queries.dim() != passages.dim() {
        bail!(
            "dimension mismatch: query embeddings have {} dims, passage embeddings have {}",
            queries.dim(),
            passages.dim()
        );
    }

    let bm25_rows = read_run(&args.bm25_run).context("reading BM25 run")?;
    let candidates_by_qid = group_candidates(&bm25_rows, args.topk_in);

    let wanted_qids: Vec<String> = match &args.qid_list {
        Some(path) => read_qid_list(path)?,
        None => candidates_by_qid.keys().cloned().collect(),
    };

    let mut out_rows = Vec::new();
    for qid in &wanted_qids {
        let Some(candidates) = candidates_by_qid.get(qid) else {
            continue;
        };
        let Some(qrow) = qid.parse::<i64>().ok().and_then(|id| queries.find(id)) else {
            continue;
        };
        let query_vec = queries.row(qrow);
        let rows = rerank_query(
            qid,
            query_vec,
            candidates,
            &passages,
            args.fusion,
            args.norm_dense,
            args.norm_bm25,
            args.topk_out,
            &args.tag,
        )
        .context("rerank failed")?;
        out_rows.extend(rows);
    }

    write_run(&args.run_out, &out_rows, 6).context("writing rerank run")?;
    println!(
        "[OK] queries_considered={} queries_with_results={}",
        wanted_qids.len(),
        out_rows.iter().map(|r| r.qid.clone()).collect::<std::collections::HashSet<_>>().len()
    );
    Ok(())
}
