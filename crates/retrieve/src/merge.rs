//! Run-Merger: k-way merge of sorted run files into the final postings
//! file, lexicon, and doclen sidecar.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use byteorder::WriteBytesExt;

use crate::build::list_runs;
use crate::error::{RetrieveError, RetrieveResult};
use crate::persistence::directory::{Directory, FsDirectory};

/// Summary counts reported in the `[OK]` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeStats {
    pub runs_merged: usize,
    pub terms_written: usize,
    pub postings_written: u64,
}

struct RunCursor {
    lines: std::io::Lines<BufReader<File>>,
    current: Option<(String, u32, u32)>,
}

impl RunCursor {
    fn open(path: &Path) -> RetrieveResult<Self> {
        let file = File::open(path).map_err(|e| RetrieveError::MissingFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let mut lines = BufReader::new(file).lines();
        let current = Self::parse_next(&mut lines, path)?;
        Ok(Self { lines, current })
    }

    fn parse_next(
        lines: &mut std::io::Lines<BufReader<File>>,
        path: &Path,
    ) -> RetrieveResult<Option<(String, u32, u32)>> {
        for (lineno, line) in lines.enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() != 3 {
                return Err(RetrieveError::MalformedRow {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    detail: "expected term, docid, tf".into(),
                });
            }
            let docid: u32 = cols[1].parse().map_err(|_| RetrieveError::MalformedRow {
                path: path.to_path_buf(),
                line: lineno + 1,
                detail: "non-integer docid".into(),
            })?;
            let tf: u32 = cols[2].parse().map_err(|_| RetrieveError::MalformedRow {
                path: path.to_path_buf(),
                line: lineno + 1,
                detail: "non-integer tf".into(),
            })?;
            return Ok(Some((cols[0].to_string(), docid, tf)));
        }
        Ok(None)
    }

    fn advance(&mut self, path: &Path) -> RetrieveResult<()> {
        self.current = Self::parse_next(&mut self.lines, path)?;
        Ok(())
    }
}

#[derive(Eq, PartialEq)]
struct HeapKey {
    term: String,
    docid: u32,
    run_idx: usize,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.term.cmp(&other.term).then(self.docid.cmp(&other.docid))
    }
}
impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Merge every run file in `run_dir` into `out_dir/postings.bin` and
/// `out_dir/lexicon.tsv`, then copy `run_dir/doclen.bin` alongside them.
pub fn merge_runs(run_dir: &Path, out_dir: &Path) -> RetrieveResult<MergeStats> {
    let run_paths = list_runs(run_dir)?;
    let mut cursors: Vec<RunCursor> = run_paths
        .iter()
        .map(|p| RunCursor::open(p))
        .collect::<RetrieveResult<_>>()?;

    let mut heap: BinaryHeap<Reverse<HeapKey>> = BinaryHeap::new();
    for (i, c) in cursors.iter().enumerate() {
        if let Some((term, docid, _)) = &c.current {
            heap.push(Reverse(HeapKey {
                term: term.clone(),
                docid: *docid,
                run_idx: i,
            }));
        }
    }

    let out = FsDirectory::new(out_dir)?;
    let mut postings_bytes: Vec<u8> = Vec::new();
    let mut lexicon_text = String::new();
    let mut stats = MergeStats {
        runs_merged: run_paths.len(),
        ..Default::default()
    };

    let mut cur_term: Option<String> = None;
    let mut cur_docs: Vec<u32> = Vec::new();
    let mut cur_tfs: Vec<u32> = Vec::new();
    let mut byte_offset: u64 = 0;

    let flush_term =
        |term: &str,
         docs: &mut Vec<u32>,
         tfs: &mut Vec<u32>,
         postings_bytes: &mut Vec<u8>,
         lexicon_text: &mut String,
         byte_offset: &mut u64,
         stats: &mut MergeStats| {
            if docs.is_empty() {
                return;
            }
            let df = docs.len() as u32;
            for d in docs.iter() {
                postings_bytes.write_u32::<byteorder::LittleEndian>(*d).unwrap();
            }
            for t in tfs.iter() {
                postings_bytes.write_u32::<byteorder::LittleEndian>(*t).unwrap();
            }
            let byte_length = 8u64 * df as u64;
            lexicon_text.push_str(&format!("{term}\t{byte_offset}\t{byte_length}\t{df}\n"));
            *byte_offset += byte_length;
            stats.terms_written += 1;
            stats.postings_written += df as u64;
            docs.clear();
            tfs.clear();
        };

    while let Some(Reverse(key)) = heap.pop() {
        let HeapKey { term, docid, run_idx } = key;
        let tf = cursors[run_idx].current.as_ref().map(|(_, _, tf)| *tf).unwrap_or(0);
        cursors[run_idx].advance(&run_paths[run_idx])?;
        if let Some((next_term, next_docid, _)) = &cursors[run_idx].current {
            heap.push(Reverse(HeapKey {
                term: next_term.clone(),
                docid: *next_docid,
                run_idx,
            }));
        }

        if cur_term.as_deref() != Some(term.as_str()) {
            if let Some(prev) = &cur_term {
                flush_term(
                    prev,
                    &mut cur_docs,
                    &mut cur_tfs,
                    &mut postings_bytes,
                    &mut lexicon_text,
                    &mut byte_offset,
                    &mut stats,
                );
            }
            cur_term = Some(term.clone());
        }

        if cur_docs.last() == Some(&docid) {
            // Same (term, docid) appearing again across runs: sum tf.
            *cur_tfs.last_mut().unwrap() += tf;
        } else {
            cur_docs.push(docid);
            cur_tfs.push(tf);
        }
    }
    if let Some(prev) = &cur_term {
        flush_term(
            prev,
            &mut cur_docs,
            &mut cur_tfs,
            &mut postings_bytes,
            &mut lexicon_text,
            &mut byte_offset,
            &mut stats,
        );
    }

    out.atomic_write("postings.bin", &postings_bytes)?;
    out.atomic_write("lexicon.tsv", lexicon_text.as_bytes())?;

    let doclen_src = run_dir.join("doclen.bin");
    let doclen_bytes = std::fs::read(&doclen_src).map_err(|e| RetrieveError::MissingFile {
        path: doclen_src.clone(),
        detail: e.to_string(),
    })?;
    out.atomic_write("doclen.bin", &doclen_bytes)?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_index, BuildConfig};
    use crate::postings::{read_doclen, read_lexicon, PostingsFile};

    #[test]
    fn merges_two_runs_with_overlapping_term() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("collection.tsv");
        std::fs::write(
            &input,
            "0\tthe quick brown fox\n1\tthe lazy dog\n2\tquick brown dog\n",
        )
        .unwrap();
        let run_dir = tmp.path().join("runs");
        build_index(&BuildConfig {
            input,
            outdir: run_dir.clone(),
            batch_docs: 1,
            max_docs: None,
        })
        .unwrap();

        let out_dir = tmp.path().join("index");
        let stats = merge_runs(&run_dir, &out_dir).unwrap();
        assert_eq!(stats.runs_merged, 3);

        let lexicon = read_lexicon(&out_dir.join("lexicon.tsv")).unwrap();
        // Ascending term order.
        let terms: Vec<&str> = lexicon.iter().map(|e| e.term.as_str()).collect();
        let mut sorted = terms.clone();
        sorted.sort();
        assert_eq!(terms, sorted);

        let dog_entry = lexicon.iter().find(|e| e.term == "dog").unwrap();
        assert_eq!(dog_entry.df, 2);

        let pf = PostingsFile::open(&out_dir.join("postings.bin")).unwrap();
        let (docs, tfs) = pf.read(dog_entry.byte_offset, dog_entry.byte_length).unwrap();
        assert_eq!(docs, vec![1, 2]);
        assert_eq!(tfs, vec![1, 1]);

        let doclen = read_doclen(&out_dir.join("doclen.bin")).unwrap();
        assert_eq!(doclen, vec![4, 3, 3]);

        let sum_doclen: u64 = doclen.iter().map(|&d| d as u64).sum();
        let sum_tf: u64 = lexicon
            .iter()
            .map(|e| {
                let (_, tfs) = pf.read(e.byte_offset, e.byte_length).unwrap();
                tfs.iter().map(|&t| t as u64).sum::<u64>()
            })
            .sum();
        assert_eq!(sum_doclen, sum_tf);
    }
}
