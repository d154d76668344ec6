//! Run-Builder: stream the collection, accumulate `(term, docid, tf)`, and
//! spill sorted batches to disk as intermediate run files.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{RetrieveError, RetrieveResult};
use crate::persistence::directory::{Directory, FsDirectory};
use crate::token::term_frequencies;

/// Parameters for `build_index`.
pub struct BuildConfig {
    pub input: PathBuf,
    pub outdir: PathBuf,
    pub batch_docs: usize,
    /// Stop after this many input documents (smoke-test cap).
    pub max_docs: Option<usize>,
}

/// Summary counts reported in the `[OK]` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStats {
    pub documents: usize,
    pub runs_written: usize,
}

/// Stream `config.input`, tokenise each row, and spill `(term, docid, tf)`
/// triples to sorted run files of at most `config.batch_docs` documents
/// each, plus the `doclen.bin` sidecar (written strictly in docid order).
pub fn build_index(config: &BuildConfig) -> RetrieveResult<BuildStats> {
    if config.batch_docs == 0 {
        return Err(RetrieveError::InvalidParameter("batch_docs must be >= 1".into()));
    }

    let dir = FsDirectory::new(&config.outdir)?;
    let file = std::fs::File::open(&config.input).map_err(|e| RetrieveError::MissingFile {
        path: config.input.clone(),
        detail: e.to_string(),
    })?;
    let reader = BufReader::new(file);

    let mut stats = BuildStats::default();
    let mut batch: Vec<(u32, String)> = Vec::with_capacity(config.batch_docs);

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let Some(tab) = line.find('\t') else {
            return Err(RetrieveError::MalformedRow {
                path: config.input.clone(),
                line: lineno + 1,
                detail: "missing tab separator".into(),
            });
        };
        let (docid_str, text) = line.split_at(tab);
        let docid: u32 = docid_str.parse().map_err(|_| RetrieveError::MalformedRow {
            path: config.input.clone(),
            line: lineno + 1,
            detail: format!("non-integer docid {docid_str:?}"),
        })?;
        let text = &text[1..]; // skip the tab

        batch.push((docid, text.to_string()));
        stats.documents += 1;

        if let Some(max_docs) = config.max_docs {
            if stats.documents >= max_docs {
                flush_batch(&dir, &mut batch, &mut stats)?;
                return Ok(stats);
            }
        }

        if batch.len() >= config.batch_docs {
            flush_batch(&dir, &mut batch, &mut stats)?;
        }
    }
    if !batch.is_empty() {
        flush_batch(&dir, &mut batch, &mut stats)?;
    }
    Ok(stats)
}

fn flush_batch(
    dir: &FsDirectory,
    batch: &mut Vec<(u32, String)>,
    stats: &mut BuildStats,
) -> RetrieveResult<()> {
    // Tokenise in parallel; `par_iter().map().collect()` on a slice preserves
    // input order, so doclens below stay in docid order without resorting.
    let per_doc: Vec<(u32, u32, Vec<(String, u32)>)> = batch
        .par_iter()
        .map(|(docid, text)| {
            let tf = term_frequencies(text);
            let doclen: u32 = tf.iter().map(|(_, c)| c).sum();
            (*docid, doclen, tf)
        })
        .collect();

    let mut postings: Vec<(String, u32, u32)> = Vec::new();
    let mut doclen_bytes = Vec::with_capacity(per_doc.len() * 4);
    for (docid, doclen, tf) in &per_doc {
        doclen_bytes.extend_from_slice(&doclen.to_le_bytes());
        for (term, count) in tf {
            postings.push((term.clone(), *docid, *count));
        }
    }
    postings.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut run_text = String::new();
    for (term, docid, tf) in &postings {
        run_text.push_str(term);
        run_text.push('\t');
        run_text.push_str(&docid.to_string());
        run_text.push('\t');
        run_text.push_str(&tf.to_string());
        run_text.push('\n');
    }
    let run_name = format!("run_{:06}.tsv", stats.runs_written);
    dir.atomic_write(&run_name, run_text.as_bytes())?;
    stats.runs_written += 1;

    let mut doclen_writer = dir.append_file("doclen.bin")?;
    doclen_writer.write_all(&doclen_bytes)?;
    doclen_writer.flush()?;

    batch.clear();
    Ok(())
}

/// List the run files written by `build_index`, in spill order.
pub fn list_runs(run_dir: &Path) -> RetrieveResult<Vec<PathBuf>> {
    let mut names: Vec<String> = std::fs::read_dir(run_dir)
        .map_err(|e| RetrieveError::MissingFile {
            path: run_dir.to_path_buf(),
            detail: e.to_string(),
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("run_") && n.ends_with(".tsv"))
        .collect();
    names.sort();
    Ok(names.into_iter().map(|n| run_dir.join(n)).collect())
}
