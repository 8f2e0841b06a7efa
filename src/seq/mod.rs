//! Cached access to indexed FASTA files.

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bio::io::fasta;
use indexmap::IndexMap;
use lru::LruCache;

/// Error type for sequence access.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open indexed FASTA {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("missing sequence: {0}")]
    MissingSequence(String),
    #[error("could not read sequence {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("sequence cache capacity must be positive")]
    InvalidCapacity,
}

/// Byte-wise DNA complement; `A<->T`, `C<->G`, `N` maps to `N` and any other
/// byte maps to `N` as well.  Lower case input yields lower case output.
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'a' => b't',
        b't' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        b'n' => b'n',
        _ => b'N',
    }
}

/// Reverse complement of a DNA sequence, ambiguity codes included.
pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    bio::alphabets::dna::revcomp(seq)
}

/// LRU-cached reader over an indexed FASTA file.
///
/// Whole sequences are fetched on first access and shared as `Arc` slices; the
/// cache holds at most `capacity` sequences and evicts the least recently used
/// one.  The cache is internally synchronized and can be shared across
/// per-chromosome tasks.
pub struct SequenceCache {
    lengths: IndexMap<String, u64>,
    inner: Mutex<Inner>,
}

struct Inner {
    reader: fasta::IndexedReader<File>,
    cache: LruCache<String, Arc<Vec<u8>>>,
}

impl SequenceCache {
    /// Open `path` (with companion `.fai` index) with the given cache
    /// capacity.
    pub fn new<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self, Error> {
        let capacity = NonZeroUsize::new(capacity).ok_or(Error::InvalidCapacity)?;
        let reader = fasta::IndexedReader::from_file(&path.as_ref()).map_err(|e| Error::Open {
            path: path.as_ref().to_owned(),
            source: e.into(),
        })?;
        let lengths = reader
            .index
            .sequences()
            .into_iter()
            .map(|seq| (seq.name, seq.len))
            .collect();

        Ok(Self {
            lengths,
            inner: Mutex::new(Inner {
                reader,
                cache: LruCache::new(capacity),
            }),
        })
    }

    /// Fetch the full sequence named `name`.
    pub fn fetch(&self, name: &str) -> Result<Arc<Vec<u8>>, Error> {
        if !self.lengths.contains_key(name) {
            return Err(Error::MissingSequence(name.to_string()));
        }

        let mut inner = self.inner.lock().expect("sequence cache lock poisoned");
        if let Some(seq) = inner.cache.get(name) {
            return Ok(seq.clone());
        }

        inner.reader.fetch_all(name).map_err(|e| Error::Fetch {
            name: name.to_string(),
            source: e.into(),
        })?;
        let mut seq = Vec::new();
        inner.reader.read(&mut seq).map_err(|e| Error::Fetch {
            name: name.to_string(),
            source: e.into(),
        })?;

        let seq = Arc::new(seq);
        inner.cache.put(name.to_string(), seq.clone());
        Ok(seq)
    }

    /// Length of the sequence named `name`.
    pub fn len_of(&self, name: &str) -> Result<u64, Error> {
        self.lengths
            .get(name)
            .copied()
            .ok_or_else(|| Error::MissingSequence(name.to_string()))
    }

    /// Table of sequence name to length, in index order.
    pub fn sequence_lengths(&self) -> IndexMap<String, u64> {
        self.lengths.clone()
    }
}

/// Write a FASTA file plus `.fai` index for tests (single-line sequences).
#[cfg(test)]
pub(crate) fn write_test_fasta(
    dir: &Path,
    file_name: &str,
    seqs: &[(&str, &str)],
) -> Result<PathBuf, anyhow::Error> {
    use std::io::Write as _;

    let fa_path = dir.join(file_name);
    let mut fa = File::create(&fa_path)?;
    let mut fai = File::create(dir.join(format!("{}.fai", file_name)))?;
    let mut offset = 0usize;
    for (name, seq) in seqs {
        let header = format!(">{}\n", name);
        fa.write_all(header.as_bytes())?;
        fa.write_all(seq.as_bytes())?;
        fa.write_all(b"\n")?;
        writeln!(
            fai,
            "{}\t{}\t{}\t{}\t{}",
            name,
            seq.len(),
            offset + header.len(),
            seq.len(),
            seq.len() + 1
        )?;
        offset += header.len() + seq.len() + 1;
    }
    Ok(fa_path)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn complement_maps_bases_and_ambiguity() {
        assert_eq!(complement(b'A'), b'T');
        assert_eq!(complement(b'g'), b'c');
        assert_eq!(complement(b'N'), b'N');
        assert_eq!(complement(b'R'), b'N');
    }

    #[test]
    fn revcomp_small_sequence() {
        assert_eq!(revcomp(b"ACGTN"), b"NACGT".to_vec());
    }

    #[test]
    fn fetch_returns_sequences_and_lengths() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let path = write_test_fasta(
            tmp.path(),
            "ref.fa",
            &[("chr1", "ACGTACGTAC"), ("chr2", "TTTT")],
        )?;

        let cache = SequenceCache::new(&path, 2)?;
        assert_eq!(cache.len_of("chr1")?, 10);
        assert_eq!(cache.fetch("chr2")?.as_slice(), b"TTTT");
        assert_eq!(cache.fetch("chr1")?.as_slice(), b"ACGTACGTAC");

        let lengths = cache.sequence_lengths();
        assert_eq!(lengths.get("chr1"), Some(&10));
        assert_eq!(lengths.get("chr2"), Some(&4));

        Ok(())
    }

    #[test]
    fn fetch_missing_sequence_fails() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let path = write_test_fasta(tmp.path(), "ref.fa", &[("chr1", "ACGT")])?;

        let cache = SequenceCache::new(&path, 1)?;
        assert!(matches!(
            cache.fetch("chrX"),
            Err(Error::MissingSequence(name)) if name == "chrX"
        ));

        Ok(())
    }

    #[test]
    fn eviction_keeps_results_consistent() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let path = write_test_fasta(
            tmp.path(),
            "qry.fa",
            &[("q1", "AAAA"), ("q2", "CCCC"), ("q3", "GGGG")],
        )?;

        // Capacity 1 forces an eviction on every switch.
        let cache = SequenceCache::new(&path, 1)?;
        assert_eq!(cache.fetch("q1")?.as_slice(), b"AAAA");
        assert_eq!(cache.fetch("q2")?.as_slice(), b"CCCC");
        assert_eq!(cache.fetch("q1")?.as_slice(), b"AAAA");
        assert_eq!(cache.fetch("q3")?.as_slice(), b"GGGG");

        Ok(())
    }
}
