//! Embedding Store: a columnar id/vector table, memory-mapped for
//! random-access row reads.
//!
//! This is the Rust-native stand-in for the HDF5 store the original
//! pipeline used: no `hdf5` crate exists in our dependency stack, so rows
//! are packed into a flat binary layout (`PREM` magic, LE scalars,
//! row-major `f32` vectors) and read back with `memmap2` + `byteorder`.

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use crate::error::{RetrieveError, RetrieveResult};

const MAGIC: &[u8; 4] = b"PREM";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 1;

/// A memory-mapped id/vector table: row `i` is `(ids[i], vecs[i*dim..(i+1)*dim])`.
pub struct EmbeddingStore {
    mmap: Mmap,
    n: usize,
    dim: usize,
}

impl EmbeddingStore {
    pub fn open(path: &std::path::Path) -> RetrieveResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| RetrieveError::MissingFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < HEADER_LEN || &mmap[0..4] != MAGIC {
            return Err(RetrieveError::CorruptIndex(format!(
                "{}: missing PREM magic",
                path.display()
            )));
        }
        let version = LittleEndian::read_u32(&mmap[4..8]);
        if version != VERSION {
            return Err(RetrieveError::CorruptIndex(format!(
                "{}: unsupported embedding store version {version}",
                path.display()
            )));
        }
        let n = LittleEndian::read_u32(&mmap[8..12]) as usize;
        let dim = LittleEndian::read_u32(&mmap[12..16]) as usize;
        let expected = HEADER_LEN + n * 8 + n * dim * 4;
        if mmap.len() != expected {
            return Err(RetrieveError::CorruptIndex(format!(
                "{}: expected {expected} bytes, found {}",
                path.display(),
                mmap.len()
            )));
        }
        tracing::debug!(
            path = %path.display(),
            rows = n,
            dim,
            "opened embedding store"
        );
        Ok(Self { mmap, n, dim })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn ids_bytes(&self) -> &[u8] {
        &self.mmap[HEADER_LEN..HEADER_LEN + self.n * 8]
    }

    fn vecs_bytes(&self) -> &[u8] {
        &self.mmap[HEADER_LEN + self.n * 8..]
    }

    pub fn id(&self, row: usize) -> i64 {
        LittleEndian::read_i64(&self.ids_bytes()[row * 8..row * 8 + 8])
    }

    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.dim * 4;
        let bytes = &self.vecs_bytes()[start..start + self.dim * 4];
        bytemuck::cast_slice(bytes)
    }

    /// Find the row holding external id `id`, scanning linearly. Embedding
    /// tables in this pipeline are small enough (one row per query, or a
    /// retrieved top-K passage set) that a sorted index isn't worth it.
    pub fn find(&self, id: i64) -> Option<usize> {
        (0..self.n).find(|&r| self.id(r) == id)
    }

    /// Write a `PREM` table to `path`. `rows` is `(id, vector)` pairs; all
    /// vectors must share the same dimension.
    pub fn write(path: &std::path::Path, rows: &[(i64, Vec<f32>)]) -> RetrieveResult<()> {
        let n = rows.len() as u32;
        let dim = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
        for (_, v) in rows {
            if v.len() != dim {
                return Err(RetrieveError::DimensionMismatch {
                    query_dim: dim,
                    doc_dim: v.len(),
                });
            }
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + rows.len() * 8 + rows.len() * dim * 4);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&n.to_le_bytes());
        buf.extend_from_slice(&(dim as u32).to_le_bytes());
        buf.push(0u8); // id_dtype: i64
        for (id, _) in rows {
            buf.extend_from_slice(&id.to_le_bytes());
        }
        for (_, v) in rows {
            for x in v {
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
        std::fs::write(path, &buf)?;
        Ok(())
    }
}
