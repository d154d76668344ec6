//! Run I/O: read/write TREC run records.
//!
//! Read is lenient (6-column or 3-column compact, tab or space separated);
//! write always emits 6 space-separated columns.

use std::io::Write;
use std::path::Path;

use crate::error::{RetrieveError, RetrieveResult};

/// One row of a TREC run: `qid Q0 docid rank score tag`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub qid: String,
    pub docid: String,
    pub rank: u32,
    pub score: f64,
    pub tag: String,
}

/// Read a TREC run file leniently: accepts 6-column
/// (`qid Q0 docid rank score tag`) or 3-column compact (`qid docid score`)
/// rows, tab- or space-separated.
pub fn read_run(path: &Path) -> RetrieveResult<Vec<RunRow>> {
    let text = std::fs::read_to_string(path).map_err(|e| RetrieveError::MissingFile {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        let row = match cols.len() {
            6 => RunRow {
                qid: cols[0].to_string(),
                docid: cols[2].to_string(),
                rank: cols[3].parse().map_err(|_| RetrieveError::MalformedRow {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    detail: "non-integer rank".into(),
                })?,
                score: cols[4].parse().map_err(|_| RetrieveError::MalformedRow {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    detail: "non-numeric score".into(),
                })?,
                tag: cols[5].to_string(),
            },
            3 => RunRow {
                qid: cols[0].to_string(),
                docid: cols[1].to_string(),
                rank: 0,
                score: cols[2].parse().map_err(|_| RetrieveError::MalformedRow {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    detail: "non-numeric score".into(),
                })?,
                tag: String::new(),
            },
            n => {
                return Err(RetrieveError::MalformedRow {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    detail: format!("expected 3 or 6 columns, got {n}"),
                });
            }
        };
        rows.push(row);
    }
    Ok(rows)
}

/// Write `rows` as a strict 6-column TREC run file.
///
/// `decimals` controls score formatting: 4 for BM25 output, 6 elsewhere.
pub fn write_run(path: &Path, rows: &[RunRow], decimals: usize) -> RetrieveResult<()> {
    let mut f = std::fs::File::create(path)?;
    for row in rows {
        writeln!(
            f,
            "{} Q0 {} {} {:.*} {}",
            row.qid, row.docid, row.rank, decimals, row.score, row.tag
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_6_column_and_3_column_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.tsv");
        std::fs::write(
            &path,
            "q1 Q0 d1 1 3.1400 BM25\nq1\td2\t2.0000\n\nq2 Q0 d3 1 1.0 BM25\n",
        )
        .unwrap();

        let rows = read_run(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].docid, "d1");
        assert_eq!(rows[1].docid, "d2");
        assert_eq!(rows[1].rank, 0);
    }

    #[test]
    fn writes_strict_6_columns_with_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        let rows = vec![RunRow {
            qid: "q1".into(),
            docid: "d1".into(),
            rank: 1,
            score: 3.14159,
            tag: "BM25".into(),
        }];
        write_run(&path, &rows, 4).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "q1 Q0 d1 1 3.1416 BM25\n");
    }
}
