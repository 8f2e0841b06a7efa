//! Inversion signature detection.
//!
//! Alignments pushed through an inversion without splitting leave matched
//! INS/DEL pairs and clusters of SNVs and indels near the inversion center.
//! [`cluster_table`] nominates candidate regions from these signatures;
//! [`confirm::try_intra_region`] tests each candidate with a k-mer density
//! estimate.

pub mod confirm;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::call::schema::{VarType, VariantRecord};
use crate::call::sink::VariantTable;
use crate::call::Error;
use crate::params::CallerParams;
use crate::seq;

/// Indels above this length are SV-scale and do not count into
/// SNV/indel clusters (matched pairs handle them).
const CLUSTER_INDEL_MAX: u64 = 50;

/// Signature that nominated a candidate region.
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
pub enum InvFlag {
    /// INS/DEL pair in close proximity with similar lengths.
    MatchIndel,
    /// Cluster of indels.
    ClusterIndel,
    /// Cluster of SNVs only.
    ClusterSnv,
    /// Cluster with both SNVs and indels.
    ClusterMixed,
}

/// A candidate region for intra-alignment inversion confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRegion {
    /// Reference sequence name.
    pub chrom: String,
    /// 0-based start, inclusive.
    pub pos: u64,
    /// 0-based end, exclusive.
    pub end: u64,
    /// Alignment record the signature was found in.
    pub align_index: u64,
    /// Signatures that nominated the region.
    pub flags: BTreeSet<InvFlag>,
}

impl FlagRegion {
    /// Whether the region was nominated by SNV clusters alone.
    pub fn is_snv_cluster_only(&self) -> bool {
        self.flags.len() == 1 && self.flags.contains(&InvFlag::ClusterSnv)
    }
}

/// Nominate inversion candidate regions from the SNV and INS/DEL tables.
///
/// Candidates are collected per chromosome and per source alignment, expanded
/// by `inv_region_flank`, clipped to the chromosome, and merged when they
/// overlap (uniting their flag sets).  Variants on sequences missing from the
/// length tables are an error.
pub fn cluster_table(
    df_snv: &VariantTable,
    df_insdel: &VariantTable,
    df_ref_fai: &IndexMap<String, u64>,
    df_qry_fai: &IndexMap<String, u64>,
    params: &CallerParams,
) -> Result<Vec<FlagRegion>, Error> {
    let mut regions = Vec::new();

    let snv_by_chrom = partition_index(df_snv);
    let insdel_by_chrom = partition_index(df_insdel);
    let chroms = snv_by_chrom
        .keys()
        .chain(insdel_by_chrom.keys())
        .cloned()
        .collect::<BTreeSet<_>>();

    for chrom in chroms {
        let chrom_len = *df_ref_fai
            .get(&chrom)
            .ok_or_else(|| seq::Error::MissingSequence(chrom.clone()))?;

        let snv_rows = load_rows(df_snv, snv_by_chrom.get(&chrom))?;
        let insdel_rows = load_rows(df_insdel, insdel_by_chrom.get(&chrom))?;
        for row in snv_rows.iter().chain(insdel_rows.iter()) {
            if !df_qry_fai.contains_key(&row.qry_id) {
                return Err(seq::Error::MissingSequence(row.qry_id.clone()).into());
            }
        }

        let mut by_align: BTreeMap<u64, (Vec<&VariantRecord>, Vec<&VariantRecord>)> =
            BTreeMap::new();
        for row in &snv_rows {
            by_align.entry(source_index(row)).or_default().0.push(row);
        }
        for row in &insdel_rows {
            by_align.entry(source_index(row)).or_default().1.push(row);
        }

        let mut candidates = Vec::new();
        for (align_index, (snv, insdel)) in &by_align {
            nominate_matched_pairs(insdel, *align_index, params, &mut candidates);
            nominate_clusters(snv, insdel, *align_index, params, &mut candidates);
        }

        for candidate in &mut candidates {
            candidate.pos = candidate.pos.saturating_sub(params.inv_region_flank);
            candidate.end = (candidate.end + params.inv_region_flank).min(chrom_len);
        }
        regions.extend(merge_candidates(&chrom, candidates));
    }

    Ok(regions)
}

/// Candidate interval before flanking and merging.
struct Candidate {
    pos: u64,
    end: u64,
    align_index: u64,
    flag: InvFlag,
}

/// Nominate INS/DEL pairs in close proximity with similar lengths.
fn nominate_matched_pairs(
    insdel: &[&VariantRecord],
    align_index: u64,
    params: &CallerParams,
    candidates: &mut Vec<Candidate>,
) {
    let eligible = |vartype: VarType| {
        move |row: &&VariantRecord| {
            row.vartype == vartype && row.varlen.unwrap_or(0) >= params.inv_match_min
        }
    };
    let ins = insdel
        .iter()
        .copied()
        .filter(eligible(VarType::Ins))
        .collect::<Vec<_>>();
    let del = insdel
        .iter()
        .copied()
        .filter(eligible(VarType::Del))
        .collect::<Vec<_>>();

    for ins_row in &ins {
        for del_row in &del {
            let dist = ins_row.pos.abs_diff(del_row.pos);
            if dist > params.inv_match_dist {
                continue;
            }
            let ins_len = ins_row.varlen.unwrap_or(0);
            let del_len = del_row.varlen.unwrap_or(0);
            let prop = ins_len.min(del_len) as f64 / ins_len.max(del_len) as f64;
            if prop < params.inv_match_prop {
                continue;
            }
            candidates.push(Candidate {
                pos: ins_row.pos.min(del_row.pos),
                end: ins_row.end.max(del_row.end),
                align_index,
                flag: InvFlag::MatchIndel,
            });
        }
    }
}

/// Nominate runs of closely spaced SNVs and small indels.
fn nominate_clusters(
    snv: &[&VariantRecord],
    insdel: &[&VariantRecord],
    align_index: u64,
    params: &CallerParams,
    candidates: &mut Vec<Candidate>,
) {
    let mut members = snv
        .iter()
        .copied()
        .chain(
            insdel
                .iter()
                .copied()
                .filter(|row| row.varlen.unwrap_or(0) <= CLUSTER_INDEL_MAX),
        )
        .collect::<Vec<_>>();
    members.sort_by_key(|row| (row.pos, row.end));

    let mut cluster: Vec<&VariantRecord> = Vec::new();
    for row in members {
        if let Some(prev) = cluster.last() {
            if row.pos.saturating_sub(prev.end) > params.inv_cluster_gap {
                flush_cluster(&cluster, align_index, params, candidates);
                cluster.clear();
            }
        }
        cluster.push(row);
    }
    flush_cluster(&cluster, align_index, params, candidates);
}

/// Turn a finished cluster into a candidate if it is large enough.
fn flush_cluster(
    cluster: &[&VariantRecord],
    align_index: u64,
    params: &CallerParams,
    candidates: &mut Vec<Candidate>,
) {
    if cluster.len() < params.inv_cluster_count {
        return;
    }
    let has_snv = cluster.iter().any(|m| m.vartype == VarType::Snv);
    let has_indel = cluster.iter().any(|m| m.vartype != VarType::Snv);
    let flag = match (has_snv, has_indel) {
        (true, true) => InvFlag::ClusterMixed,
        (false, true) => InvFlag::ClusterIndel,
        _ => InvFlag::ClusterSnv,
    };
    candidates.push(Candidate {
        pos: cluster.first().map(|m| m.pos).unwrap_or(0),
        end: cluster.iter().map(|m| m.end).max().unwrap_or(0),
        align_index,
        flag,
    });
}

/// Merge overlapping candidates of the same alignment, uniting flags.
fn merge_candidates(chrom: &str, mut candidates: Vec<Candidate>) -> Vec<FlagRegion> {
    candidates.sort_by_key(|c| (c.align_index, c.pos, c.end));

    let mut merged: Vec<FlagRegion> = Vec::new();
    for candidate in candidates {
        match merged.last_mut() {
            Some(last)
                if last.align_index == candidate.align_index && candidate.pos <= last.end =>
            {
                last.end = last.end.max(candidate.end);
                last.flags.insert(candidate.flag);
            }
            _ => merged.push(FlagRegion {
                chrom: chrom.to_string(),
                pos: candidate.pos,
                end: candidate.end,
                align_index: candidate.align_index,
                flags: BTreeSet::from([candidate.flag]),
            }),
        }
    }
    merged
}

/// First contributing alignment of a variant row.
fn source_index(row: &VariantRecord) -> u64 {
    row.align_source.first().copied().unwrap_or(u64::MAX)
}

/// Map chromosome name to partition index of a table.
fn partition_index(table: &VariantTable) -> BTreeMap<String, usize> {
    table
        .partitions()
        .iter()
        .enumerate()
        .map(|(i, partition)| (partition.chrom().to_string(), i))
        .collect()
}

fn load_rows(
    table: &VariantTable,
    partition: Option<&usize>,
) -> Result<Vec<VariantRecord>, Error> {
    match partition {
        Some(&i) => Ok(table.partitions()[i].load()?.into_owned()),
        None => Ok(Vec::new()),
    }
}
