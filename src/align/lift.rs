//! Lifting coordinates through single alignment records.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::AlignmentRecord;

/// A reference region lifted onto a query contig.
///
/// Coordinates are on the original contig; `is_rev` records the strand of the
/// alignment the region was lifted through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiftedRegion {
    pub qry_id: String,
    pub pos: u64,
    pub end: u64,
    pub is_rev: bool,
}

/// Coordinate lift between reference and query through alignment records.
///
/// Lifts walk the record's operation stream.  A reference coordinate that
/// falls into a deletion (or skip) lifts to the gap point on the query; a
/// coordinate outside the record's span fails the lift.  All query
/// coordinates returned are on the original contig.
pub struct AlignLift<'a> {
    by_index: HashMap<u64, &'a AlignmentRecord>,
    qry_fai: &'a IndexMap<String, u64>,
}

impl<'a> AlignLift<'a> {
    /// Build a lift over the given alignment table and query length table.
    pub fn new(records: &'a [AlignmentRecord], qry_fai: &'a IndexMap<String, u64>) -> Self {
        Self {
            by_index: records
                .iter()
                .map(|record| (record.align_index, record))
                .collect(),
            qry_fai,
        }
    }

    /// Lift the reference region `[pos, end)` on `chrom` through the
    /// alignment `align_index` onto the query.
    ///
    /// Returns `None` when the record is unknown, lies on a different
    /// chromosome, or does not cover the region.
    pub fn lift_region(
        &self,
        chrom: &str,
        pos: u64,
        end: u64,
        align_index: u64,
    ) -> Option<LiftedRegion> {
        let record = self.by_index.get(&align_index)?;
        if record.chrom != chrom || pos >= end || pos < record.pos || end > record.end {
            return None;
        }
        let qry_len = *self.qry_fai.get(&record.qry_id)?;

        let aligned_pos = ref_to_qry_aligned(record, pos)?;
        let aligned_end = ref_to_qry_aligned(record, end)?;
        let (pos, end) = if record.is_rev {
            (qry_len - aligned_end, qry_len - aligned_pos)
        } else {
            (aligned_pos, aligned_end)
        };
        if pos >= end {
            // The whole region collapsed into a query gap.
            return None;
        }

        Some(LiftedRegion {
            qry_id: record.qry_id.clone(),
            pos,
            end,
            is_rev: record.is_rev,
        })
    }

    /// Lift an original-contig query boundary coordinate back onto the
    /// reference through the alignment `align_index`.
    pub fn lift_qry_to_ref(&self, align_index: u64, coord: u64) -> Option<u64> {
        let record = self.by_index.get(&align_index)?;
        let aligned = if record.is_rev {
            let qry_len = *self.qry_fai.get(&record.qry_id)?;
            qry_len.checked_sub(coord)?
        } else {
            coord
        };
        qry_to_ref_aligned(record, aligned)
    }
}

/// Lift a reference boundary coordinate to aligned-strand query space.
fn ref_to_qry_aligned(record: &AlignmentRecord, coord: u64) -> Option<u64> {
    let mut ref_c = record.pos;
    let mut qry_c = record.qry_pos;
    for op in &record.ops {
        let ref_adv = if op.code.advances_ref() { op.len } else { 0 };
        let qry_adv = if op.code.advances_qry() { op.len } else { 0 };
        if ref_adv > 0 && coord < ref_c + ref_adv {
            return Some(if qry_adv > 0 {
                qry_c + (coord - ref_c)
            } else {
                // Deletion or skip: the region edge sits on the gap point.
                qry_c
            });
        }
        ref_c += ref_adv;
        qry_c += qry_adv;
    }
    (coord == ref_c).then_some(qry_c)
}

/// Lift an aligned-strand query boundary coordinate to reference space.
fn qry_to_ref_aligned(record: &AlignmentRecord, coord: u64) -> Option<u64> {
    if coord < record.qry_pos {
        return None;
    }
    let mut ref_c = record.pos;
    let mut qry_c = record.qry_pos;
    for op in &record.ops {
        let ref_adv = if op.code.advances_ref() { op.len } else { 0 };
        let qry_adv = if op.code.advances_qry() { op.len } else { 0 };
        if qry_adv > 0 && coord < qry_c + qry_adv {
            return Some(if ref_adv > 0 {
                ref_c + (coord - qry_c)
            } else {
                // Insertion or clip: the coordinate sits on the reference gap.
                ref_c
            });
        }
        ref_c += ref_adv;
        qry_c += qry_adv;
    }
    (coord == qry_c).then_some(ref_c)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::align::test_record;

    fn qry_fai(entries: &[(&str, u64)]) -> IndexMap<String, u64> {
        entries
            .iter()
            .map(|(name, len)| (name.to_string(), *len))
            .collect()
    }

    #[test]
    fn lift_region_forward_through_indels() {
        let records = vec![test_record(0, "chr1", 100, "q1", 0, false, "10=4I5=3D5=")];
        let fai = qry_fai(&[("q1", 24)]);
        let lift = AlignLift::new(&records, &fai);

        // Before the insertion the lift is the identity shifted by 100.
        assert_eq!(
            lift.lift_region("chr1", 102, 108, 0),
            Some(LiftedRegion {
                qry_id: "q1".to_string(),
                pos: 2,
                end: 8,
                is_rev: false
            })
        );
        // Past insertion and deletion the query is shifted by 4 - 0 and the
        // deletion collapses to its gap point.
        assert_eq!(
            lift.lift_region("chr1", 112, 120, 0),
            Some(LiftedRegion {
                qry_id: "q1".to_string(),
                pos: 16,
                end: 21,
                is_rev: false
            })
        );
    }

    #[test]
    fn lift_region_reverse_remaps_to_original_contig() {
        let records = vec![test_record(0, "chr1", 100, "q1", 5, true, "10=")];
        let fai = qry_fai(&[("q1", 20)]);
        let lift = AlignLift::new(&records, &fai);

        // Aligned query span 7..10 maps to original contig 10..13.
        assert_eq!(
            lift.lift_region("chr1", 102, 105, 0),
            Some(LiftedRegion {
                qry_id: "q1".to_string(),
                pos: 10,
                end: 13,
                is_rev: true
            })
        );
    }

    #[test]
    fn lift_region_outside_span_fails() {
        let records = vec![test_record(0, "chr1", 100, "q1", 0, false, "10=")];
        let fai = qry_fai(&[("q1", 10)]);
        let lift = AlignLift::new(&records, &fai);

        assert_eq!(lift.lift_region("chr1", 95, 105, 0), None);
        assert_eq!(lift.lift_region("chr1", 100, 120, 0), None);
        assert_eq!(lift.lift_region("chr2", 100, 105, 0), None);
        assert_eq!(lift.lift_region("chr1", 100, 105, 9), None);
    }

    #[test]
    fn lift_region_collapsing_into_deletion_fails() {
        let records = vec![test_record(0, "chr1", 100, "q1", 0, false, "5=10D5=")];
        let fai = qry_fai(&[("q1", 10)]);
        let lift = AlignLift::new(&records, &fai);

        // The region lies fully inside the deletion.
        assert_eq!(lift.lift_region("chr1", 107, 112, 0), None);
    }

    #[test]
    fn lift_qry_to_ref_round_trips_forward() {
        let records = vec![test_record(0, "chr1", 100, "q1", 0, false, "10=4I5=")];
        let fai = qry_fai(&[("q1", 19)]);
        let lift = AlignLift::new(&records, &fai);

        assert_eq!(lift.lift_qry_to_ref(0, 3), Some(103));
        // Inside the insertion the reference stays at the gap.
        assert_eq!(lift.lift_qry_to_ref(0, 12), Some(110));
        assert_eq!(lift.lift_qry_to_ref(0, 16), Some(112));
    }

    #[test]
    fn lift_qry_to_ref_reverse() {
        let records = vec![test_record(0, "chr1", 100, "q1", 5, true, "10=")];
        let fai = qry_fai(&[("q1", 20)]);
        let lift = AlignLift::new(&records, &fai);

        // Original contig boundary 10 is aligned boundary 10, reference 105.
        assert_eq!(lift.lift_qry_to_ref(0, 10), Some(105));
        assert_eq!(lift.lift_qry_to_ref(0, 13), Some(102));
    }
}
