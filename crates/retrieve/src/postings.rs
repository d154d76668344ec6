//! Posting Reader: decode a term's postings from the final postings file.
//!
//! The on-disk encoding is the conforming baseline from the postings file
//! contract: two concatenated little-endian `u32` arrays (docids, then
//! term frequencies), each of length `df`; a lexicon entry's `byte_length`
//! equals `8 * df`.

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use crate::error::{RetrieveError, RetrieveResult};

/// Read-only memory-mapped handle on `postings.bin`.
///
/// Safe to open multiple independent handles and use them concurrently
/// from different threads; a single handle is not required to be `Sync`
/// across callers that need exclusive access, but in practice the
/// underlying `Mmap` is immutable after construction so sharing is fine.
pub struct PostingsFile {
    mmap: Mmap,
}

impl PostingsFile {
    /// Memory-map `path` for reading.
    pub fn open(path: &Path) -> RetrieveResult<Self> {
        let file = File::open(path).map_err(|e| RetrieveError::MissingFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        // SAFETY: the file is treated as read-only for the lifetime of this
        // handle; the index is built once and never mutated in place.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    /// Decode the block at `(offset, length)` into `(docs, tfs)`, both of
    /// length `df = length / 8`.
    pub fn read(&self, offset: u64, length: u64) -> RetrieveResult<(Vec<u32>, Vec<u32>)> {
        let start = offset as usize;
        let end = start + length as usize;
        if end > self.mmap.len() || length % 8 != 0 {
            return Err(RetrieveError::CorruptIndex(format!(
                "posting block offset={offset} length={length} out of range (file len={})",
                self.mmap.len()
            )));
        }
        let df = (length / 8) as usize;
        let block = &self.mmap[start..end];
        let mut cursor = Cursor::new(block);

        let mut docs = Vec::with_capacity(df);
        for _ in 0..df {
            docs.push(cursor.read_u32::<LittleEndian>()?);
        }
        let mut tfs = Vec::with_capacity(df);
        for _ in 0..df {
            tfs.push(cursor.read_u32::<LittleEndian>()?);
        }

        let mut prev: Option<u32> = None;
        for &d in &docs {
            if let Some(p) = prev {
                if d <= p {
                    return Err(RetrieveError::CorruptIndex(format!(
                        "posting docids not strictly ascending at offset={offset}"
                    )));
                }
            }
            prev = Some(d);
        }
        Ok((docs, tfs))
    }
}

/// Load the doclen sidecar (`doclen.bin`) in full: one `u32` per internal
/// docid, in docid order.
pub fn read_doclen(path: &Path) -> RetrieveResult<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|e| RetrieveError::MissingFile {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if bytes.len() % 4 != 0 {
        return Err(RetrieveError::CorruptIndex(
            "doclen.bin length not a multiple of 4".into(),
        ));
    }
    let mut cursor = Cursor::new(bytes);
    let mut out = Vec::with_capacity(cursor.get_ref().len() / 4);
    while (cursor.position() as usize) < cursor.get_ref().len() {
        out.push(cursor.read_u32::<LittleEndian>()?);
    }
    Ok(out)
}

/// One row of `lexicon.tsv`: `term, byte_offset, byte_length, df`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconEntry {
    pub term: String,
    pub byte_offset: u64,
    pub byte_length: u64,
    pub df: u32,
}

/// Load the full lexicon into memory, keeping it term-sorted (the
/// Run-Merger guarantees ascending term order on write).
pub fn read_lexicon(path: &Path) -> RetrieveResult<Vec<LexiconEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| RetrieveError::MissingFile {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != 4 {
            return Err(RetrieveError::MalformedRow {
                path: path.to_path_buf(),
                line: lineno + 1,
                detail: format!("expected 4 tab-separated columns, got {}", cols.len()),
            });
        }
        let byte_offset: u64 = cols[1].parse().map_err(|_| RetrieveError::MalformedRow {
            path: path.to_path_buf(),
            line: lineno + 1,
            detail: "non-integer byte_offset".into(),
        })?;
        let byte_length: u64 = cols[2].parse().map_err(|_| RetrieveError::MalformedRow {
            path: path.to_path_buf(),
            line: lineno + 1,
            detail: "non-integer byte_length".into(),
        })?;
        let df: u32 = cols[3].parse().map_err(|_| RetrieveError::MalformedRow {
            path: path.to_path_buf(),
            line: lineno + 1,
            detail: "non-integer df".into(),
        })?;
        out.push(LexiconEntry {
            term: cols[0].to_string(),
            byte_offset,
            byte_length,
            df,
        });
    }
    Ok(out)
}

/// Binary search the term-sorted lexicon for `term`.
pub fn lookup<'a>(lexicon: &'a [LexiconEntry], term: &str) -> Option<&'a LexiconEntry> {
    lexicon
        .binary_search_by(|e| e.term.as_str().cmp(term))
        .ok()
        .map(|i| &lexicon[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn lexicon_roundtrip_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.tsv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "brown\t0\t8\t1").unwrap();
        writeln!(f, "dog\t8\t16\t2").unwrap();
        writeln!(f, "quick\t24\t16\t2").unwrap();
        drop(f);

        let lex = read_lexicon(&path).unwrap();
        assert_eq!(lex.len(), 3);
        assert_eq!(lookup(&lex, "dog").unwrap().df, 2);
        assert!(lookup(&lex, "zzz").is_none());
    }

    #[test]
    fn postings_decode_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        let mut f = File::create(&path).unwrap();
        use byteorder::WriteBytesExt;
        for d in [0u32, 2, 5] {
            f.write_u32::<LittleEndian>(d).unwrap();
        }
        for t in [1u32, 3, 2] {
            f.write_u32::<LittleEndian>(t).unwrap();
        }
        drop(f);

        let pf = PostingsFile::open(&path).unwrap();
        let (docs, tfs) = pf.read(0, 24).unwrap();
        assert_eq!(docs, vec![0, 2, 5]);
        assert_eq!(tfs, vec![1, 3, 2]);
    }

    #[test]
    fn postings_reject_non_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        let mut f = File::create(&path).unwrap();
        use byteorder::WriteBytesExt;
        for d in [0u32, 0] {
            f.write_u32::<LittleEndian>(d).unwrap();
        }
        for t in [1u32, 1] {
            f.write_u32::<LittleEndian>(t).unwrap();
        }
        drop(f);

        let pf = PostingsFile::open(&path).unwrap();
        assert!(pf.read(0, 16).is_err());
    }
}
