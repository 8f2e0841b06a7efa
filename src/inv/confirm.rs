//! KDE-based confirmation of flagged inversion candidates.

use std::collections::HashSet;

use crate::align::lift::AlignLift;
use crate::call::Error;
use crate::kde::KdeTruncNorm;
use crate::kmer::KmerUtil;
use crate::params::CallerParams;
use crate::seq::{self, SequenceCache};

use super::FlagRegion;

/// A confirmed intra-alignment inversion before schema completion.
#[derive(Debug, Clone, PartialEq)]
pub struct InvRow {
    pub chrom: String,
    pub pos: u64,
    pub end: u64,
    pub qry_id: String,
    pub qry_pos: u64,
    pub qry_end: u64,
    pub qry_rev: bool,
    pub varlen: u64,
    pub var_score: f64,
    pub align_source: Vec<u64>,
}

/// Outcome of testing one candidate region.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionCall {
    /// The candidate was confirmed as an inversion.
    Inv(InvRow),
    /// A coordinate fell outside the alignment projection.
    LiftFail,
    /// The region yielded no usable k-mers.
    Degenerate,
    /// The density test found no reverse-dominant interior run.
    NoCall,
}

/// Test a flagged region for an intra-alignment inversion.
///
/// The reference slice of the region provides forward and reverse-complement
/// k-mer sets; the lifted query slice (oriented to the aligned strand) is
/// scored against both sets and the two indicator tracks are smoothed with
/// the KDE kernel.  An inversion is called when the reverse density exceeds
/// the forward density over an interior run of sufficient length; the run is
/// lifted back to reference coordinates for the output row.
///
/// Only sequence access errors are fatal; every per-candidate failure is
/// reported through [`RegionCall`].
pub fn try_intra_region(
    region: &FlagRegion,
    ref_cache: &SequenceCache,
    qry_cache: &SequenceCache,
    align_lift: &AlignLift,
    k_util: &KmerUtil,
    kde_model: &KdeTruncNorm,
    params: &CallerParams,
) -> Result<RegionCall, Error> {
    let Some(lifted) = align_lift.lift_region(&region.chrom, region.pos, region.end, region.align_index)
    else {
        return Ok(RegionCall::LiftFail);
    };

    let ref_seq = ref_cache.fetch(&region.chrom)?;
    let qry_seq = qry_cache.fetch(&lifted.qry_id)?;
    if region.end as usize > ref_seq.len() || lifted.end as usize > qry_seq.len() {
        return Ok(RegionCall::LiftFail);
    }
    let ref_slice = &ref_seq[region.pos as usize..region.end as usize];
    let qry_slice = &qry_seq[lifted.pos as usize..lifted.end as usize];

    // Orient the query slice to the aligned strand so that forward density is
    // high outside the inversion.
    let qry_oriented = if lifted.is_rev {
        seq::revcomp(qry_slice)
    } else {
        qry_slice.to_vec()
    };

    let mut fwd_set = HashSet::new();
    let mut rev_set = HashSet::new();
    for kmer in k_util.kmers(ref_slice).into_iter().flatten() {
        fwd_set.insert(kmer);
        rev_set.insert(k_util.revcomp(kmer));
    }

    let qry_kmers = k_util.kmers(&qry_oriented);
    let grid_len = qry_kmers.len();
    let mut fwd_hits = Vec::new();
    let mut rev_hits = Vec::new();
    for (i, kmer) in qry_kmers.into_iter().enumerate() {
        if let Some(kmer) = kmer {
            if fwd_set.contains(&kmer) {
                fwd_hits.push(i);
            }
            if rev_set.contains(&kmer) {
                rev_hits.push(i);
            }
        }
    }
    if grid_len == 0 || (fwd_hits.is_empty() && rev_hits.is_empty()) {
        return Ok(RegionCall::Degenerate);
    }

    let fwd_density = kde_model.density(&fwd_hits, grid_len);
    let rev_density = kde_model.density(&rev_hits, grid_len);

    let Some((run_start, run_end)) = longest_rev_run(&fwd_density, &rev_density) else {
        return Ok(RegionCall::NoCall);
    };
    // Require forward flanks: a run touching the slice edge suggests the
    // inversion extends beyond the candidate region.
    if run_start == 0 || run_end == grid_len {
        return Ok(RegionCall::NoCall);
    }

    // K-mer start positions [run_start, run_end) cover base positions
    // [run_start, run_end + k - 1) of the oriented slice.
    let slice_len = (lifted.end - lifted.pos) as usize;
    let base_start = run_start;
    let base_end = (run_end + k_util.k() - 1).min(slice_len);

    // Back to original-contig query coordinates.
    let (qry_pos, qry_end) = if lifted.is_rev {
        (
            lifted.pos + (slice_len - base_end) as u64,
            lifted.pos + (slice_len - base_start) as u64,
        )
    } else {
        (lifted.pos + base_start as u64, lifted.pos + base_end as u64)
    };

    // And through the alignment onto the reference.
    let (Some(ref_a), Some(ref_b)) = (
        align_lift.lift_qry_to_ref(region.align_index, qry_pos),
        align_lift.lift_qry_to_ref(region.align_index, qry_end),
    ) else {
        return Ok(RegionCall::LiftFail);
    };
    let (pos, end) = (ref_a.min(ref_b), ref_a.max(ref_b));
    if end - pos < params.inv_min_inv_len {
        return Ok(RegionCall::NoCall);
    }

    let var_score = (run_start..run_end)
        .map(|i| rev_density[i] - fwd_density[i])
        .sum::<f64>()
        / (run_end - run_start) as f64;

    Ok(RegionCall::Inv(InvRow {
        chrom: region.chrom.clone(),
        pos,
        end,
        qry_id: lifted.qry_id,
        qry_pos,
        qry_end,
        qry_rev: lifted.is_rev,
        varlen: end - pos,
        var_score,
        align_source: vec![region.align_index],
    }))
}

/// The longest contiguous run of positions where the reverse density is
/// strictly above the forward density.
fn longest_rev_run(fwd: &[f64], rev: &[f64]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut current: Option<usize> = None;
    for i in 0..=fwd.len() {
        let dominant = i < fwd.len() && rev[i] > fwd[i];
        match (current, dominant) {
            (None, true) => current = Some(i),
            (Some(start), false) => {
                // Ties keep the earliest run.
                if best.map_or(true, |(b_start, b_end)| i - start > b_end - b_start) {
                    best = Some((start, i));
                }
                current = None;
            }
            _ => {}
        }
    }
    best
}
