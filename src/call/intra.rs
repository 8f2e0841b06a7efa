//! Intra-alignment variant discovery.
//!
//! SNV and INS/DEL variants are called directly from the operation streams of
//! single alignment records, chromosome by chromosome.  Inversions traversed
//! without splitting the alignment are recovered in two passes: candidate
//! regions are flagged from variant signatures and then confirmed with a
//! k-mer density test.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::align::lift::AlignLift;
use crate::align::score::ScoreModel;
use crate::align::{expand_ops, AlignmentRecord, OpCode, OpSpan};
use crate::inv::confirm::{try_intra_region, RegionCall};
use crate::inv::{self, FlagRegion};
use crate::kde::KdeTruncNorm;
use crate::kmer::KmerUtil;
use crate::params::CallerParams;
use crate::seq::{self, SequenceCache};

use super::schema::{self, id_nonsnv, id_snv, VarType, VariantRecord};
use super::sink::{ChromPartition, PartitionSink, TableKind, VariantTable};
use super::{Error, CALL_SOURCE};

/// Counters for recoverable failures during inversion confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvCallStats {
    /// Candidates dropped because a coordinate fell outside the alignment
    /// projection.
    pub lift_fail: usize,
    /// Candidates dropped because the region yielded no usable k-mers.
    pub kde_degenerate: usize,
}

/// Call SNV and INS/DEL variants from alignment operations.
///
/// Every chromosome is processed as an independent task; within a chromosome,
/// records are visited in query-name order and their operation streams are
/// expanded into variant rows.  The finished chromosome tables are sorted and
/// either retained in memory or, when `temp_dir` is given, spilled to
/// columnar files so only one chromosome is resident at a time.  The returned
/// tables concatenate the partitions in chromosome order, which together with
/// the in-partition sort makes the output fully deterministic.
pub fn variant_tables_snv_insdel(
    df_align: &[AlignmentRecord],
    ref_fa_filename: &Path,
    qry_fa_filename: &Path,
    temp_dir: Option<&Path>,
    params: &CallerParams,
) -> Result<(VariantTable, VariantTable), Error> {
    let score_model = ScoreModel::from_selector(&params.align_score_model)?;

    if let Some(dir) = temp_dir {
        if !dir.is_dir() {
            return Err(Error::MissingTempDir(dir.to_owned()));
        }
    }
    let sink = match temp_dir {
        Some(dir) => PartitionSink::Spill {
            dir: dir.to_owned(),
        },
        None => PartitionSink::Memory,
    };

    let ref_cache = SequenceCache::new(ref_fa_filename, 1)?;
    let qry_cache = SequenceCache::new(qry_fa_filename, 10)?;

    let mut by_chrom: BTreeMap<&str, Vec<&AlignmentRecord>> = BTreeMap::new();
    for record in df_align {
        by_chrom
            .entry(record.chrom.as_str())
            .or_default()
            .push(record);
    }
    let by_chrom = by_chrom.into_iter().collect::<Vec<_>>();

    let partitions = by_chrom
        .into_par_iter()
        .map(|(chrom, records)| {
            call_chrom(
                chrom,
                records,
                &ref_cache,
                &qry_cache,
                &score_model,
                &sink,
                params,
            )
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let (snv_partitions, insdel_partitions) = partitions.into_iter().unzip();
    Ok((
        VariantTable::new(snv_partitions),
        VariantTable::new(insdel_partitions),
    ))
}

/// Run discovery for one chromosome and store both partitions.
fn call_chrom(
    chrom: &str,
    mut records: Vec<&AlignmentRecord>,
    ref_cache: &SequenceCache,
    qry_cache: &SequenceCache,
    score_model: &ScoreModel,
    sink: &PartitionSink,
    params: &CallerParams,
) -> Result<(ChromPartition, ChromPartition), Error> {
    if params.debug {
        tracing::info!("intra-alignment discovery: {}", chrom);
    }

    let ref_seq = ref_cache.fetch(chrom)?;
    // Stable sort keeps the ingest order as tiebreak.
    records.sort_by(|a, b| a.qry_id.cmp(&b.qry_id));

    let mut snv_rows = Vec::new();
    let mut insdel_rows = Vec::new();
    for record in records {
        if params.debug {
            tracing::info!(
                "* {}: index={}, qry_id={}, is_rev={}, pos={}",
                chrom,
                record.align_index,
                record.qry_id,
                record.is_rev,
                record.pos
            );
        }

        let qry_seq = qry_cache.fetch(&record.qry_id)?;
        let qry_len = qry_seq.len() as u64;
        record.validate(ref_seq.len() as u64, qry_len)?;

        for span in expand_ops(record, qry_len) {
            match span.code {
                OpCode::Mismatch => emit_snv(
                    record,
                    &span,
                    ref_seq.as_slice(),
                    qry_seq.as_slice(),
                    score_model,
                    &mut snv_rows,
                ),
                OpCode::Ins => {
                    emit_ins(record, &span, qry_seq.as_slice(), score_model, &mut insdel_rows)
                }
                OpCode::Del => {
                    emit_del(record, &span, ref_seq.as_slice(), score_model, &mut insdel_rows)
                }
                _ => {}
            }
        }
    }

    schema::sort_snv(&mut snv_rows);
    schema::sort_insdel(&mut insdel_rows);

    let snv = sink.store(TableKind::Snv, chrom, strip_align_score(snv_rows))?;
    let insdel = sink.store(TableKind::InsDel, chrom, strip_align_score(insdel_rows))?;
    Ok((snv, insdel))
}

/// Expand a mismatch run into one SNV per base.
///
/// On reverse records the query position is mirrored within the run so that
/// per-base reference and query bases line up on the original strand, and the
/// alternate base is complemented back to the reference orientation.
fn emit_snv(
    record: &AlignmentRecord,
    span: &OpSpan,
    ref_seq: &[u8],
    qry_seq: &[u8],
    score_model: &ScoreModel,
    rows: &mut Vec<(VariantRecord, f64)>,
) {
    let var_score = score_model.mismatch(1);
    for offset in 0..span.len {
        let pos = span.pos + offset;
        let qry_pos = if record.is_rev {
            span.qry_pos + (span.len - offset - 1)
        } else {
            span.qry_pos + offset
        };

        let ref_base = ref_seq[pos as usize];
        let qry_base = qry_seq[qry_pos as usize];
        let alt_base = if record.is_rev {
            seq::complement(qry_base)
        } else {
            qry_base
        };
        let reference = (ref_base as char).to_string();
        let alt = (alt_base as char).to_string();

        rows.push((
            VariantRecord {
                chrom: record.chrom.clone(),
                pos,
                end: pos + 1,
                id: id_snv(&record.chrom, pos, &alt),
                vartype: VarType::Snv,
                reference: Some(reference),
                alt: Some(alt),
                varlen: None,
                seq: None,
                filter: record.filter.clone(),
                qry_id: record.qry_id.clone(),
                qry_pos,
                qry_end: qry_pos + 1,
                qry_rev: record.is_rev,
                call_source: CALL_SOURCE.to_string(),
                var_score,
                align_source: vec![record.align_index],
            },
            record.score,
        ));
    }
}

/// Emit an insertion anchored at the reference base before the gap.
fn emit_ins(
    record: &AlignmentRecord,
    span: &OpSpan,
    qry_seq: &[u8],
    score_model: &ScoreModel,
    rows: &mut Vec<(VariantRecord, f64)>,
) {
    let pos = span.pos.saturating_sub(1);
    let mut seq_bytes = qry_seq[span.qry_pos as usize..span.qry_end as usize].to_vec();
    if record.is_rev {
        seq_bytes = seq::revcomp(&seq_bytes);
    }

    rows.push((
        VariantRecord {
            chrom: record.chrom.clone(),
            pos,
            end: pos + 1,
            id: id_nonsnv(&record.chrom, pos, VarType::Ins, span.len),
            vartype: VarType::Ins,
            reference: None,
            alt: None,
            varlen: Some(span.len),
            seq: Some(String::from_utf8_lossy(&seq_bytes).into_owned()),
            filter: record.filter.clone(),
            qry_id: record.qry_id.clone(),
            qry_pos: span.qry_pos,
            qry_end: span.qry_end,
            qry_rev: record.is_rev,
            call_source: CALL_SOURCE.to_string(),
            var_score: score_model.gap(span.len),
            align_source: vec![record.align_index],
        },
        record.score,
    ));
}

/// Emit a deletion spanning the deleted reference bases.
fn emit_del(
    record: &AlignmentRecord,
    span: &OpSpan,
    ref_seq: &[u8],
    score_model: &ScoreModel,
    rows: &mut Vec<(VariantRecord, f64)>,
) {
    let seq_bytes = &ref_seq[span.pos as usize..span.end as usize];

    rows.push((
        VariantRecord {
            chrom: record.chrom.clone(),
            pos: span.pos,
            end: span.end,
            id: id_nonsnv(&record.chrom, span.pos, VarType::Del, span.len),
            vartype: VarType::Del,
            reference: None,
            alt: None,
            varlen: Some(span.len),
            seq: Some(String::from_utf8_lossy(seq_bytes).into_owned()),
            filter: record.filter.clone(),
            qry_id: record.qry_id.clone(),
            qry_pos: span.qry_pos,
            qry_end: span.qry_pos + 1,
            qry_rev: record.is_rev,
            call_source: CALL_SOURCE.to_string(),
            var_score: score_model.gap(span.len),
            align_source: vec![record.align_index],
        },
        record.score,
    ));
}

fn strip_align_score(rows: Vec<(VariantRecord, f64)>) -> Vec<VariantRecord> {
    rows.into_iter().map(|(row, _)| row).collect()
}

/// Flag regions with potential intra-alignment inversions.
///
/// Candidate regions come from the clustering of matched INS/DEL pairs and
/// SNV/indel clusters; SNV-only clusters are removed because they rarely
/// indicate inversions and inflate false positives.
pub fn variant_flag_inv(
    df_snv: &VariantTable,
    df_insdel: &VariantTable,
    df_ref_fai: &IndexMap<String, u64>,
    df_qry_fai: &IndexMap<String, u64>,
    params: &CallerParams,
) -> Result<Vec<FlagRegion>, Error> {
    let regions = inv::cluster_table(df_snv, df_insdel, df_ref_fai, df_qry_fai, params)?;
    Ok(regions
        .into_iter()
        .filter(|region| !region.is_snv_cluster_only())
        .collect())
}

/// Call intra-alignment inversions from flagged candidate regions.
///
/// Each candidate is lifted onto the query and tested with the k-mer density
/// kernel; accepted rows inherit the `filter` of their first source alignment.
/// Lift failures and degenerate regions are dropped and counted in the
/// returned [`InvCallStats`].
pub fn variant_tables_inv(
    df_align: &[AlignmentRecord],
    df_flag: &[FlagRegion],
    ref_fa_filename: &Path,
    qry_fa_filename: &Path,
    df_ref_fai: &IndexMap<String, u64>,
    df_qry_fai: &IndexMap<String, u64>,
    params: &CallerParams,
) -> Result<(Vec<VariantRecord>, InvCallStats), Error> {
    let k_util = KmerUtil::new(params.inv_k_size)?;
    let kde_model = KdeTruncNorm::new(
        params.inv_kde_bandwidth,
        params.inv_kde_trunc_z,
        params.inv_kde_func,
    )?;
    let align_lift = AlignLift::new(df_align, df_qry_fai);

    let ref_cache = SequenceCache::new(ref_fa_filename, 1)?;
    let qry_cache = SequenceCache::new(qry_fa_filename, 10)?;

    let filters = df_align
        .iter()
        .map(|record| (record.align_index, record.filter.as_str()))
        .collect::<HashMap<_, _>>();

    let mut stats = InvCallStats::default();
    let mut rows = Vec::new();
    for region in df_flag {
        let chrom_len = *df_ref_fai
            .get(&region.chrom)
            .ok_or_else(|| seq::Error::MissingSequence(region.chrom.clone()))?;
        if region.end > chrom_len {
            stats.lift_fail += 1;
            continue;
        }

        match try_intra_region(
            region,
            &ref_cache,
            &qry_cache,
            &align_lift,
            &k_util,
            &kde_model,
            params,
        )? {
            RegionCall::Inv(inv_row) => {
                let filter = inv_row
                    .align_source
                    .first()
                    .and_then(|align_index| filters.get(align_index))
                    .map(|filter| filter.to_string())
                    .unwrap_or_default();
                rows.push(VariantRecord {
                    id: id_nonsnv(&inv_row.chrom, inv_row.pos, VarType::Inv, inv_row.varlen),
                    chrom: inv_row.chrom,
                    pos: inv_row.pos,
                    end: inv_row.end,
                    vartype: VarType::Inv,
                    reference: None,
                    alt: None,
                    varlen: Some(inv_row.varlen),
                    seq: None,
                    filter,
                    qry_id: inv_row.qry_id,
                    qry_pos: inv_row.qry_pos,
                    qry_end: inv_row.qry_end,
                    qry_rev: inv_row.qry_rev,
                    call_source: CALL_SOURCE.to_string(),
                    var_score: inv_row.var_score,
                    align_source: inv_row.align_source,
                });
            }
            RegionCall::LiftFail => stats.lift_fail += 1,
            RegionCall::Degenerate => stats.kde_degenerate += 1,
            RegionCall::NoCall => {}
        }
    }
    schema::sort_inv(&mut rows);

    tracing::debug!(
        "inversion confirmation: {} accepted, {} lift failures, {} degenerate regions",
        rows.len(),
        stats.lift_fail,
        stats.kde_degenerate
    );

    Ok((rows, stats))
}
