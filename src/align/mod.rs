//! Alignment records and their operation streams.

pub mod lift;
pub mod score;

use serde::{Deserialize, Serialize};

/// Error type for alignment records.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("invalid alignment operation code: {0}")]
    InvalidOpCode(char),
    #[error("invalid alignment operation length in: {0}")]
    InvalidOpLength(String),
    #[error(
        "inconsistent operations for alignment {align_index}: {axis} span is {span} \
         but operations advance by {advance}"
    )]
    InconsistentOps {
        align_index: u64,
        axis: &'static str,
        span: u64,
        advance: u64,
    },
    #[error("alignment {align_index} exceeds query {qry_id} of length {qry_len}")]
    QueryOverflow {
        align_index: u64,
        qry_id: String,
        qry_len: u64,
    },
    #[error("alignment {align_index} exceeds reference {chrom} of length {ref_len}")]
    ReferenceOverflow {
        align_index: u64,
        chrom: String,
        ref_len: u64,
    },
}

/// Alignment operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    /// Sequence match (`=`).
    #[serde(rename = "=")]
    Match,
    /// Sequence mismatch (`X`).
    #[serde(rename = "X")]
    Mismatch,
    /// Insertion to the reference (`I`).
    #[serde(rename = "I")]
    Ins,
    /// Deletion from the reference (`D`).
    #[serde(rename = "D")]
    Del,
    /// Soft clip (`S`).
    #[serde(rename = "S")]
    SoftClip,
    /// Hard clip (`H`).
    #[serde(rename = "H")]
    HardClip,
    /// Reference skip (`N`).
    #[serde(rename = "N")]
    Skip,
}

impl OpCode {
    /// Whether the operation advances the reference coordinate.
    pub fn advances_ref(self) -> bool {
        matches!(
            self,
            OpCode::Match | OpCode::Mismatch | OpCode::Del | OpCode::Skip
        )
    }

    /// Whether the operation advances the query coordinate.
    pub fn advances_qry(self) -> bool {
        matches!(
            self,
            OpCode::Match | OpCode::Mismatch | OpCode::Ins | OpCode::SoftClip
        )
    }

    /// The single-character code.
    pub fn as_char(self) -> char {
        match self {
            OpCode::Match => '=',
            OpCode::Mismatch => 'X',
            OpCode::Ins => 'I',
            OpCode::Del => 'D',
            OpCode::SoftClip => 'S',
            OpCode::HardClip => 'H',
            OpCode::Skip => 'N',
        }
    }
}

impl TryFrom<char> for OpCode {
    type Error = Error;

    fn try_from(c: char) -> Result<Self, Error> {
        match c {
            '=' => Ok(OpCode::Match),
            'X' => Ok(OpCode::Mismatch),
            'I' => Ok(OpCode::Ins),
            'D' => Ok(OpCode::Del),
            'S' => Ok(OpCode::SoftClip),
            'H' => Ok(OpCode::HardClip),
            'N' => Ok(OpCode::Skip),
            _ => Err(Error::InvalidOpCode(c)),
        }
    }
}

/// One alignment operation with its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignOp {
    /// Operation code.
    pub code: OpCode,
    /// Operation length in bases.
    pub len: u64,
}

impl AlignOp {
    pub fn new(code: OpCode, len: u64) -> Self {
        Self { code, len }
    }
}

/// Parse an operation stream from CIGAR-like text, e.g. `10=1X4I`.
pub fn parse_ops(text: &str) -> Result<Vec<AlignOp>, Error> {
    let mut ops = Vec::new();
    let mut len_start = 0usize;
    for (i, c) in text.char_indices() {
        if c.is_ascii_digit() {
            continue;
        }
        let len = text[len_start..i]
            .parse::<u64>()
            .map_err(|_| Error::InvalidOpLength(text.to_string()))?;
        ops.push(AlignOp::new(OpCode::try_from(c)?, len));
        len_start = i + c.len_utf8();
    }
    if len_start != text.len() {
        return Err(Error::InvalidOpLength(text.to_string()));
    }
    Ok(ops)
}

/// One record of the assembly-to-reference alignment table.
///
/// Coordinates are 0-based half-open.  `qry_pos`/`qry_end` are given on the
/// aligned strand; for reverse-complemented records the expansion in
/// [`expand_ops`] remaps per-operation query coordinates to the original
/// contig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    /// Stable identifier assigned on ingest (row index of the input table).
    pub align_index: u64,
    /// Reference sequence name.
    pub chrom: String,
    /// Reference start.
    pub pos: u64,
    /// Reference end.
    pub end: u64,
    /// Query sequence name.
    pub qry_id: String,
    /// Query start on the aligned strand.
    pub qry_pos: u64,
    /// Query end on the aligned strand.
    pub qry_end: u64,
    /// Whether the query was reverse-complemented in the alignment.
    pub is_rev: bool,
    /// Alignment score.
    pub score: f64,
    /// Pass/fail tag, passed through to variant calls unchanged.
    pub filter: String,
    /// Alignment operation stream.
    pub ops: Vec<AlignOp>,
}

impl AlignmentRecord {
    /// Check that the operation stream is consistent with the record spans
    /// and that the record fits inside the reference sequence of length
    /// `ref_len` and the query contig of length `qry_len`.
    pub fn validate(&self, ref_len: u64, qry_len: u64) -> Result<(), Error> {
        let ref_advance = self
            .ops
            .iter()
            .filter(|op| op.code.advances_ref())
            .map(|op| op.len)
            .sum::<u64>();
        if ref_advance != self.end - self.pos {
            return Err(Error::InconsistentOps {
                align_index: self.align_index,
                axis: "reference",
                span: self.end - self.pos,
                advance: ref_advance,
            });
        }

        let qry_advance = self
            .ops
            .iter()
            .filter(|op| op.code.advances_qry())
            .map(|op| op.len)
            .sum::<u64>();
        if qry_advance != self.qry_end - self.qry_pos {
            return Err(Error::InconsistentOps {
                align_index: self.align_index,
                axis: "query",
                span: self.qry_end - self.qry_pos,
                advance: qry_advance,
            });
        }

        if self.end > ref_len {
            return Err(Error::ReferenceOverflow {
                align_index: self.align_index,
                chrom: self.chrom.clone(),
                ref_len,
            });
        }
        if self.qry_end > qry_len {
            return Err(Error::QueryOverflow {
                align_index: self.align_index,
                qry_id: self.qry_id.clone(),
                qry_len,
            });
        }

        Ok(())
    }
}

/// One operation annotated with its coordinate spans.
///
/// `pos..end` is the reference span; `qry_pos..qry_end` is the query span in
/// original-contig coordinates (already remapped for reverse records).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpan {
    pub code: OpCode,
    pub len: u64,
    pub pos: u64,
    pub end: u64,
    pub qry_pos: u64,
    pub qry_end: u64,
}

/// Expand a record's operation stream into per-operation coordinate spans.
///
/// Reference coordinates run from the record's `pos`, query coordinates from
/// the record's `qry_pos` on the aligned strand.  For reverse records the
/// query span of every operation is remapped to the original contig via
/// `qry_len`, so downstream emission works on original-contig coordinates
/// throughout.
pub fn expand_ops(record: &AlignmentRecord, qry_len: u64) -> Vec<OpSpan> {
    let mut spans = Vec::with_capacity(record.ops.len());
    let mut ref_c = record.pos;
    let mut qry_c = record.qry_pos;
    for op in &record.ops {
        let ref_adv = if op.code.advances_ref() { op.len } else { 0 };
        let qry_adv = if op.code.advances_qry() { op.len } else { 0 };
        let (pos, end) = (ref_c, ref_c + ref_adv);
        let (qry_pos, qry_end) = (qry_c, qry_c + qry_adv);
        ref_c = end;
        qry_c = qry_end;

        let (qry_pos, qry_end) = if record.is_rev {
            (qry_len - qry_end, qry_len - qry_pos)
        } else {
            (qry_pos, qry_end)
        };
        spans.push(OpSpan {
            code: op.code,
            len: op.len,
            pos,
            end,
            qry_pos,
            qry_end,
        });
    }
    spans
}

/// Build a consistent record from CIGAR-like text for tests.
#[cfg(test)]
pub(crate) fn test_record(
    align_index: u64,
    chrom: &str,
    pos: u64,
    qry_id: &str,
    qry_pos: u64,
    is_rev: bool,
    cigar: &str,
) -> AlignmentRecord {
    let ops = parse_ops(cigar).expect("valid operation text");
    let ref_span = ops
        .iter()
        .filter(|op| op.code.advances_ref())
        .map(|op| op.len)
        .sum::<u64>();
    let qry_span = ops
        .iter()
        .filter(|op| op.code.advances_qry())
        .map(|op| op.len)
        .sum::<u64>();
    AlignmentRecord {
        align_index,
        chrom: chrom.to_string(),
        pos,
        end: pos + ref_span,
        qry_id: qry_id.to_string(),
        qry_pos,
        qry_end: qry_pos + qry_span,
        is_rev,
        score: 0.0,
        filter: "PASS".to_string(),
        ops,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn record(
        align_index: u64,
        chrom: &str,
        pos: u64,
        qry_id: &str,
        qry_pos: u64,
        is_rev: bool,
        cigar: &str,
    ) -> AlignmentRecord {
        test_record(align_index, chrom, pos, qry_id, qry_pos, is_rev, cigar)
    }

    #[test]
    fn parse_ops_round_trips_codes() -> Result<(), anyhow::Error> {
        let ops = parse_ops("10=1X2I3D4S5H6N")?;

        assert_eq!(
            ops,
            vec![
                AlignOp::new(OpCode::Match, 10),
                AlignOp::new(OpCode::Mismatch, 1),
                AlignOp::new(OpCode::Ins, 2),
                AlignOp::new(OpCode::Del, 3),
                AlignOp::new(OpCode::SoftClip, 4),
                AlignOp::new(OpCode::HardClip, 5),
                AlignOp::new(OpCode::Skip, 6),
            ]
        );

        Ok(())
    }

    #[rstest]
    #[case("10")]
    #[case("=10")]
    #[case("3Q")]
    fn parse_ops_rejects_malformed_text(#[case] text: &str) {
        assert!(parse_ops(text).is_err());
    }

    #[test]
    fn op_codes_round_trip_through_char() -> Result<(), anyhow::Error> {
        for c in ['=', 'X', 'I', 'D', 'S', 'H', 'N'] {
            assert_eq!(OpCode::try_from(c)?.as_char(), c);
        }

        Ok(())
    }

    #[test]
    fn expand_forward_record() {
        let record = record(0, "chr1", 100, "q1", 0, false, "10=1X4I3D2=");

        let spans = expand_ops(&record, 100);
        assert_eq!(spans.len(), 5);
        // 10=
        assert_eq!((spans[0].pos, spans[0].end), (100, 110));
        assert_eq!((spans[0].qry_pos, spans[0].qry_end), (0, 10));
        // 1X
        assert_eq!((spans[1].pos, spans[1].end), (110, 111));
        assert_eq!((spans[1].qry_pos, spans[1].qry_end), (10, 11));
        // 4I does not advance the reference
        assert_eq!((spans[2].pos, spans[2].end), (111, 111));
        assert_eq!((spans[2].qry_pos, spans[2].qry_end), (11, 15));
        // 3D does not advance the query
        assert_eq!((spans[3].pos, spans[3].end), (111, 114));
        assert_eq!((spans[3].qry_pos, spans[3].qry_end), (15, 15));
        // 2=
        assert_eq!((spans[4].pos, spans[4].end), (114, 116));
        assert_eq!((spans[4].qry_pos, spans[4].qry_end), (15, 17));
    }

    #[test]
    fn expand_reverse_record_remaps_query() {
        let record = record(0, "chr1", 100, "q1", 5, true, "5=1X4=");

        let spans = expand_ops(&record, 20);
        // The mismatch sits at aligned query 10..11, original contig 9..10.
        assert_eq!((spans[1].pos, spans[1].end), (105, 106));
        assert_eq!((spans[1].qry_pos, spans[1].qry_end), (9, 10));
        // Leading aligned 5..10 maps to trailing original 10..15.
        assert_eq!((spans[0].qry_pos, spans[0].qry_end), (10, 15));
    }

    #[test]
    fn validate_accepts_consistent_record() {
        let record = record(7, "chr1", 100, "q1", 0, false, "10=1X9=");

        assert!(record.validate(200, 20).is_ok());
    }

    #[test]
    fn validate_reports_offending_alignment() {
        let mut record = record(7, "chr1", 100, "q1", 0, false, "10=1X9=");
        record.end += 5;

        let err = record.validate(200, 20).expect_err("inconsistent");
        assert!(err.to_string().contains("alignment 7"));
    }

    #[test]
    fn validate_rejects_query_overflow() {
        let record = record(3, "chr1", 100, "q1", 0, false, "10=");

        assert!(matches!(
            record.validate(200, 5),
            Err(Error::QueryOverflow { align_index: 3, .. })
        ));
    }

    #[test]
    fn validate_rejects_reference_overflow() {
        let record = record(4, "chr1", 100, "q1", 0, false, "10=");

        assert!(matches!(
            record.validate(105, 20),
            Err(Error::ReferenceOverflow { align_index: 4, .. })
        ));
    }
}
