//! Caller configuration.

use serde::{Deserialize, Serialize};

use crate::kde::KdeFunc;

/// Parameters steering intra-alignment variant discovery.
///
/// All fields have defaults so `CallerParams::default()` is a fully usable
/// configuration; use [`CallerParamsBuilder`] to override individual values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[serde(default)]
pub struct CallerParams {
    /// Alignment score model selector, e.g. `affine` or
    /// `affine:mismatch=5:gap=6,2`.
    #[builder(default = "String::from(\"affine\")")]
    pub align_score_model: String,

    /// K-mer size for inversion confirmation.
    #[builder(default = "31")]
    pub inv_k_size: usize,
    /// Bandwidth (standard deviation) of the inversion KDE kernel.
    #[builder(default = "100.0")]
    pub inv_kde_bandwidth: f64,
    /// Truncation of the KDE kernel in standard deviations.
    #[builder(default = "3.0")]
    pub inv_kde_trunc_z: f64,
    /// KDE kernel function selector.
    #[builder(default = "KdeFunc::Auto")]
    pub inv_kde_func: KdeFunc,
    /// Minimal reference span of a confirmed inversion.
    #[builder(default = "100")]
    pub inv_min_inv_len: u64,

    /// Maximal distance between an INS/DEL pair flagged as matched.
    #[builder(default = "500")]
    pub inv_match_dist: u64,
    /// Minimal length agreement (shorter / longer) of a matched INS/DEL pair.
    #[builder(default = "0.5")]
    pub inv_match_prop: f64,
    /// Minimal length of each event in a matched INS/DEL pair.
    #[builder(default = "8")]
    pub inv_match_min: u64,
    /// Maximal gap between consecutive variants inside one cluster.
    #[builder(default = "200")]
    pub inv_cluster_gap: u64,
    /// Minimal number of variants for a cluster to be flagged.
    #[builder(default = "10")]
    pub inv_cluster_count: usize,
    /// Flank added to flagged regions before confirmation.
    #[builder(default = "500")]
    pub inv_region_flank: u64,

    /// Emit one log line per chromosome and per record processed.
    #[builder(default = "false")]
    pub debug: bool,
}

impl Default for CallerParams {
    fn default() -> Self {
        CallerParamsBuilder::default()
            .build()
            .expect("all fields have defaults")
    }
}
