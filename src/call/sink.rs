//! Chromosome partitions and the spill-to-disk strategy.

use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow2::array::Array;
use arrow2::chunk::Chunk;
use arrow2::datatypes::{Field, Schema};
use arrow2::io::parquet::read as parquet_read;
use arrow2::io::parquet::write::{
    transverse, CompressionOptions, Encoding, FileWriter, RowGroupIterator, Version, WriteOptions,
};
use arrow2_convert::deserialize::TryIntoCollection;
use arrow2_convert::field::ArrowField;
use arrow2_convert::serialize::TryIntoArrow;

use super::schema::VariantRecord;
use super::Error;

/// The two spillable table kinds produced per chromosome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Snv,
    InsDel,
}

impl TableKind {
    /// File name prefix of spill files of this kind.
    fn prefix(self) -> &'static str {
        match self {
            TableKind::Snv => "snv",
            TableKind::InsDel => "insdel",
        }
    }
}

/// Strategy for storing finished chromosome partitions.
///
/// The in-memory sink retains sorted rows; the spill sink writes each
/// partition to a columnar file in the scratch directory and releases the
/// buffer, bounding peak memory by the largest chromosome.
#[derive(Debug, Clone)]
pub enum PartitionSink {
    /// Retain partitions in memory.
    Memory,
    /// Write partitions to `<dir>/<kind>_<chrom>.parquet`.
    Spill { dir: PathBuf },
}

impl PartitionSink {
    /// Store the sorted rows of one chromosome.
    pub fn store(
        &self,
        kind: TableKind,
        chrom: &str,
        rows: Vec<VariantRecord>,
    ) -> Result<ChromPartition, Error> {
        let data = match self {
            PartitionSink::Memory => PartitionData::Memory(rows),
            PartitionSink::Spill { dir } => {
                let path = dir.join(format!("{}_{}.parquet", kind.prefix(), chrom));
                if let Err(err) = write_parquet(&path, &rows) {
                    // Do not leave a truncated file behind.
                    let _ = std::fs::remove_file(&path);
                    return Err(err);
                }
                PartitionData::Spilled(path)
            }
        };
        Ok(ChromPartition {
            chrom: chrom.to_string(),
            data,
        })
    }
}

#[derive(Debug, Clone)]
enum PartitionData {
    Memory(Vec<VariantRecord>),
    Spilled(PathBuf),
}

/// The finished variant rows of one chromosome.
#[derive(Debug, Clone)]
pub struct ChromPartition {
    chrom: String,
    data: PartitionData,
}

impl ChromPartition {
    /// The chromosome this partition belongs to.
    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    /// Load the partition rows, reading the spill file if necessary.
    pub fn load(&self) -> Result<Cow<'_, [VariantRecord]>, Error> {
        match &self.data {
            PartitionData::Memory(rows) => Ok(Cow::Borrowed(rows)),
            PartitionData::Spilled(path) => Ok(Cow::Owned(read_parquet(path)?)),
        }
    }
}

/// A variant table as the ordered concatenation of chromosome partitions.
#[derive(Debug, Clone, Default)]
pub struct VariantTable {
    partitions: Vec<ChromPartition>,
}

impl VariantTable {
    /// Assemble a table from partitions already in chromosome order.
    pub fn new(partitions: Vec<ChromPartition>) -> Self {
        Self { partitions }
    }

    /// The chromosome partitions in output order.
    pub fn partitions(&self) -> &[ChromPartition] {
        &self.partitions
    }

    /// Concatenate all partitions into one in-memory row vector.
    pub fn collect(&self) -> Result<Vec<VariantRecord>, Error> {
        let mut rows = Vec::new();
        for partition in &self.partitions {
            rows.extend(partition.load()?.into_owned());
        }
        Ok(rows)
    }
}

/// Write rows to a self-describing Parquet file (overwriting any previous
/// file of the same name).
fn write_parquet(path: &Path, rows: &[VariantRecord]) -> Result<(), Error> {
    let spill_write = |source| Error::SpillWrite {
        path: path.to_owned(),
        source,
    };

    let array: Box<dyn Array> = rows.try_into_arrow().map_err(spill_write)?;
    let schema = Schema::from(vec![Field::new(
        "variant",
        <VariantRecord as ArrowField>::data_type(),
        false,
    )]);
    let options = WriteOptions {
        write_statistics: true,
        compression: CompressionOptions::Snappy,
        version: Version::V2,
        data_pagesize_limit: None,
    };
    let encodings = schema
        .fields
        .iter()
        .map(|field| transverse(&field.data_type, |_| Encoding::Plain))
        .collect::<Vec<_>>();
    let chunk = Chunk::new(vec![array]);
    let row_groups = RowGroupIterator::try_new([Ok(chunk)].into_iter(), &schema, options, encodings)
        .map_err(spill_write)?;

    let file = File::create(path).map_err(|source| Error::SpillIo {
        path: path.to_owned(),
        source,
    })?;
    let mut writer = FileWriter::try_new(file, schema, options).map_err(spill_write)?;
    for group in row_groups {
        writer.write(group.map_err(spill_write)?).map_err(spill_write)?;
    }
    writer.end(None).map_err(spill_write)?;
    Ok(())
}

/// Read rows back from a spill file written by [`write_parquet`].
fn read_parquet(path: &Path) -> Result<Vec<VariantRecord>, Error> {
    let spill_read = |source| Error::SpillRead {
        path: path.to_owned(),
        source,
    };

    let mut file = File::open(path).map_err(|source| Error::SpillIo {
        path: path.to_owned(),
        source,
    })?;
    let metadata = parquet_read::read_metadata(&mut file).map_err(spill_read)?;
    let schema = parquet_read::infer_schema(&metadata).map_err(spill_read)?;
    let reader = parquet_read::FileReader::new(file, metadata.row_groups, schema, None, None, None);

    let mut rows = Vec::new();
    for maybe_chunk in reader {
        let chunk = maybe_chunk.map_err(spill_read)?;
        for array in chunk.into_arrays() {
            let mut part: Vec<VariantRecord> = array.try_into_collection().map_err(spill_read)?;
            rows.append(&mut part);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::call::schema::test_snv_row;

    #[test]
    fn memory_sink_keeps_rows() -> Result<(), anyhow::Error> {
        let rows = vec![
            test_snv_row("chr1", 10, "C", "q1", 3),
            test_snv_row("chr1", 20, "T", "q1", 13),
        ];

        let partition = PartitionSink::Memory.store(TableKind::Snv, "chr1", rows.clone())?;
        assert_eq!(partition.chrom(), "chr1");
        assert_eq!(partition.load()?.as_ref(), rows.as_slice());

        Ok(())
    }

    #[test]
    fn spill_sink_round_trips_rows() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let rows = vec![
            test_snv_row("chr1", 10, "C", "q1", 3),
            test_snv_row("chr1", 20, "T", "q2", 13),
        ];

        let sink = PartitionSink::Spill {
            dir: tmp.path().to_owned(),
        };
        let partition = sink.store(TableKind::Snv, "chr1", rows.clone())?;

        assert!(tmp.path().join("snv_chr1.parquet").exists());
        assert_eq!(partition.load()?.as_ref(), rows.as_slice());
        // Loading is repeatable.
        assert_eq!(partition.load()?.as_ref(), rows.as_slice());

        Ok(())
    }

    #[test]
    fn spill_sink_handles_empty_partitions() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;

        let sink = PartitionSink::Spill {
            dir: tmp.path().to_owned(),
        };
        let partition = sink.store(TableKind::InsDel, "chrY", Vec::new())?;

        assert!(tmp.path().join("insdel_chrY.parquet").exists());
        assert_eq!(partition.load()?.len(), 0);

        Ok(())
    }

    #[test]
    fn table_concatenates_partitions_in_order() -> Result<(), anyhow::Error> {
        let p1 = PartitionSink::Memory.store(
            TableKind::Snv,
            "chr1",
            vec![test_snv_row("chr1", 10, "C", "q1", 3)],
        )?;
        let p2 = PartitionSink::Memory.store(
            TableKind::Snv,
            "chr2",
            vec![test_snv_row("chr2", 5, "G", "q2", 0)],
        )?;

        let table = VariantTable::new(vec![p1, p2]);
        let rows = table.collect()?;

        assert_eq!(
            rows.iter().map(|row| row.chrom.clone()).collect::<Vec<_>>(),
            vec!["chr1".to_string(), "chr2".to_string()]
        );

        Ok(())
    }
}
