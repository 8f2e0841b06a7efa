//! Variant record schema, identifiers, and sort keys.

use arrow2::array::{MutableUtf8Array, TryPush, Utf8Array};
use arrow2::datatypes::DataType;
use arrow2_convert::{ArrowDeserialize, ArrowField, ArrowSerialize};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Variant type of a call.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VarType {
    /// Single-nucleotide variant.
    Snv,
    /// Insertion.
    Ins,
    /// Deletion.
    Del,
    /// Inversion.
    Inv,
}

impl arrow2_convert::field::ArrowField for VarType {
    type Type = Self;

    fn data_type() -> DataType {
        DataType::Utf8
    }
}

impl arrow2_convert::serialize::ArrowSerialize for VarType {
    type MutableArrayType = MutableUtf8Array<i32>;

    fn new_array() -> Self::MutableArrayType {
        MutableUtf8Array::new()
    }

    fn arrow_serialize(
        v: &Self,
        array: &mut Self::MutableArrayType,
    ) -> arrow2::error::Result<()> {
        array.try_push(Some(v.to_string()))
    }
}

impl arrow2_convert::deserialize::ArrowDeserialize for VarType {
    type ArrayType = Utf8Array<i32>;

    fn arrow_deserialize(v: Option<&str>) -> Option<Self> {
        v.and_then(|s| s.parse().ok())
    }
}

/// One variant call in the common superschema.
///
/// Columns not applicable to a variant type are `None`: `reference`/`alt` are
/// set for SNVs only, `varlen` for non-SNVs, `seq` for INS/DEL.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, ArrowField, ArrowSerialize, ArrowDeserialize,
)]
pub struct VariantRecord {
    /// Reference sequence name.
    pub chrom: String,
    /// 0-based start, inclusive.
    pub pos: u64,
    /// 0-based end, exclusive.
    pub end: u64,
    /// Variant identifier, 1-based display coordinate.
    pub id: String,
    /// Variant type.
    pub vartype: VarType,
    /// Reference base (SNV only).
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    /// Alternate base (SNV only).
    pub alt: Option<String>,
    /// Variant length (non-SNV).
    pub varlen: Option<u64>,
    /// Inserted or deleted bases (INS/DEL only).
    pub seq: Option<String>,
    /// Pass/fail tag inherited from the source alignment.
    pub filter: String,
    /// Query sequence name.
    pub qry_id: String,
    /// Query start on the original contig.
    pub qry_pos: u64,
    /// Query end on the original contig.
    pub qry_end: u64,
    /// Whether the query was reverse-complemented in the alignment.
    pub qry_rev: bool,
    /// Call source tag.
    pub call_source: String,
    /// Variant score from the alignment score model.
    pub var_score: f64,
    /// Indices of the contributing alignment records.
    pub align_source: Vec<u64>,
}

/// Identifier of an SNV: `{chrom}-{pos+1}-SNV-{alt}`.
pub fn id_snv(chrom: &str, pos: u64, alt: &str) -> String {
    format!("{}-{}-SNV-{}", chrom, pos + 1, alt)
}

/// Identifier of a non-SNV variant: `{chrom}-{pos+1}-{vartype}-{varlen}`.
pub fn id_nonsnv(chrom: &str, pos: u64, vartype: VarType, varlen: u64) -> String {
    format!("{}-{}-{}-{}", chrom, pos + 1, vartype, varlen)
}

/// Sort SNV rows of one chromosome; rows are paired with the score of their
/// source alignment, which is a sort key but not an output column.
pub(crate) fn sort_snv(rows: &mut [(VariantRecord, f64)]) {
    rows.sort_by(|(a, a_align), (b, b_align)| {
        a.pos
            .cmp(&b.pos)
            .then_with(|| a.alt.cmp(&b.alt))
            .then_with(|| b.var_score.total_cmp(&a.var_score))
            .then_with(|| b_align.total_cmp(a_align))
            .then_with(|| a.qry_id.cmp(&b.qry_id))
            .then_with(|| a.qry_pos.cmp(&b.qry_pos))
    });
}

/// Sort INS/DEL rows of one chromosome (same alignment-score pairing as
/// [`sort_snv`]).
pub(crate) fn sort_insdel(rows: &mut [(VariantRecord, f64)]) {
    rows.sort_by(|(a, a_align), (b, b_align)| {
        a.pos
            .cmp(&b.pos)
            .then_with(|| b.var_score.total_cmp(&a.var_score))
            .then_with(|| b_align.total_cmp(a_align))
            .then_with(|| a.qry_id.cmp(&b.qry_id))
            .then_with(|| a.qry_pos.cmp(&b.qry_pos))
            .then_with(|| a.end.cmp(&b.end))
    });
}

/// Sort INV rows across chromosomes.
pub(crate) fn sort_inv(rows: &mut [VariantRecord]) {
    rows.sort_by(|a, b| {
        a.chrom
            .cmp(&b.chrom)
            .then_with(|| a.pos.cmp(&b.pos))
            .then_with(|| a.end.cmp(&b.end))
            .then_with(|| a.qry_id.cmp(&b.qry_id))
            .then_with(|| a.qry_pos.cmp(&b.qry_pos))
    });
}

/// Build an SNV row for tests.
#[cfg(test)]
pub(crate) fn test_snv_row(
    chrom: &str,
    pos: u64,
    alt: &str,
    qry_id: &str,
    qry_pos: u64,
) -> VariantRecord {
    VariantRecord {
        chrom: chrom.to_string(),
        pos,
        end: pos + 1,
        id: id_snv(chrom, pos, alt),
        vartype: VarType::Snv,
        reference: Some("A".to_string()),
        alt: Some(alt.to_string()),
        varlen: None,
        seq: None,
        filter: "PASS".to_string(),
        qry_id: qry_id.to_string(),
        qry_pos,
        qry_end: qry_pos + 1,
        qry_rev: false,
        call_source: crate::call::CALL_SOURCE.to_string(),
        var_score: -4.0,
        align_source: vec![0],
    }
}

/// Build an INS or DEL row for tests.
#[cfg(test)]
pub(crate) fn test_insdel_row(
    chrom: &str,
    pos: u64,
    vartype: VarType,
    varlen: u64,
    qry_id: &str,
    align_index: u64,
) -> VariantRecord {
    let end = match vartype {
        VarType::Del => pos + varlen,
        _ => pos + 1,
    };
    VariantRecord {
        chrom: chrom.to_string(),
        pos,
        end,
        id: id_nonsnv(chrom, pos, vartype, varlen),
        vartype,
        reference: None,
        alt: None,
        varlen: Some(varlen),
        seq: Some("A".repeat(varlen as usize)),
        filter: "PASS".to_string(),
        qry_id: qry_id.to_string(),
        qry_pos: pos,
        qry_end: if vartype == VarType::Ins {
            pos + varlen
        } else {
            pos + 1
        },
        qry_rev: false,
        call_source: crate::call::CALL_SOURCE.to_string(),
        var_score: -12.0,
        align_source: vec![align_index],
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn snv_row(chrom: &str, pos: u64, alt: &str, qry_id: &str, qry_pos: u64) -> VariantRecord {
        test_snv_row(chrom, pos, alt, qry_id, qry_pos)
    }

    #[test]
    fn vartype_display_and_parse() {
        assert_eq!(VarType::Snv.to_string(), "SNV");
        assert_eq!(VarType::Ins.to_string(), "INS");
        assert_eq!("DEL".parse::<VarType>().expect("known"), VarType::Del);
        assert!("MNV".parse::<VarType>().is_err());
    }

    #[test]
    fn identifiers_use_display_coordinates() {
        assert_eq!(id_snv("chr1", 110, "G"), "chr1-111-SNV-G");
        assert_eq!(id_nonsnv("chr2", 203, VarType::Del, 5), "chr2-204-DEL-5");
        assert_eq!(id_nonsnv("chr2", 104, VarType::Ins, 4), "chr2-105-INS-4");
    }

    #[test]
    fn snv_sort_orders_by_pos_alt_then_scores() {
        let mut rows = vec![
            (snv_row("chr1", 20, "T", "q2", 5), -10.0),
            (snv_row("chr1", 10, "G", "q1", 0), -10.0),
            (snv_row("chr1", 10, "C", "q2", 7), -10.0),
            (snv_row("chr1", 10, "C", "q1", 3), -20.0),
        ];
        sort_snv(&mut rows);

        let keys = rows
            .iter()
            .map(|(row, align_score)| (row.pos, row.alt.clone().expect("snv"), *align_score))
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                (10, "C".to_string(), -10.0),
                (10, "C".to_string(), -20.0),
                (10, "G".to_string(), -10.0),
                (20, "T".to_string(), -10.0),
            ]
        );
    }

    #[test]
    fn insdel_sort_puts_higher_var_score_first() {
        let mut del = snv_row("chr1", 10, "T", "q1", 0);
        del.vartype = VarType::Del;
        del.var_score = -12.0;
        let mut ins = snv_row("chr1", 10, "T", "q1", 0);
        ins.vartype = VarType::Ins;
        ins.var_score = -6.0;

        let mut rows = vec![(del, -1.0), (ins, -1.0)];
        sort_insdel(&mut rows);

        assert_eq!(rows[0].0.vartype, VarType::Ins);
        assert_eq!(rows[1].0.vartype, VarType::Del);
    }
}
