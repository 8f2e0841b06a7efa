//! Truncated-normal kernel density estimation over integer positions.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};
use strum_macros::{Display, EnumString};

/// Error type for KDE construction.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("KDE bandwidth must be positive but is: {0}")]
    InvalidBandwidth(f64),
    #[error("KDE truncation must be positive but is: {0}")]
    InvalidTruncZ(f64),
}

/// Selector for the KDE kernel function.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KdeFunc {
    /// Pick the kernel automatically (currently resolves to `gaussian`).
    #[default]
    Auto,
    /// Gaussian (normal) kernel.
    Gaussian,
}

/// Kernel density estimator with a discretized, truncated normal kernel.
///
/// The kernel has standard deviation `bandwidth`, is cut off at
/// `trunc_z * bandwidth` and normalized to unit mass so that the density of a
/// track is a smoothed local sample count.
#[derive(Debug, Clone)]
pub struct KdeTruncNorm {
    /// One-sided kernel weights; `kernel[d]` is the weight at distance `d`.
    kernel: Vec<f64>,
}

impl KdeTruncNorm {
    /// Build a kernel for the given bandwidth and truncation.
    pub fn new(bandwidth: f64, trunc_z: f64, func: KdeFunc) -> Result<Self, Error> {
        if !(bandwidth > 0.0) {
            return Err(Error::InvalidBandwidth(bandwidth));
        }
        if !(trunc_z > 0.0) {
            return Err(Error::InvalidTruncZ(trunc_z));
        }

        let normal = match func {
            KdeFunc::Auto | KdeFunc::Gaussian => {
                Normal::new(0.0, bandwidth).expect("bandwidth checked positive")
            }
        };

        let half_width = (bandwidth * trunc_z).ceil() as usize;
        let mut kernel = (0..=half_width)
            .map(|d| normal.pdf(d as f64))
            .collect::<Vec<_>>();

        // Normalize the two-sided discrete kernel to unit mass.
        let mass = kernel[0] + 2.0 * kernel.iter().skip(1).sum::<f64>();
        for weight in kernel.iter_mut() {
            *weight /= mass;
        }

        Ok(Self { kernel })
    }

    /// One-sided kernel half width in positions.
    pub fn half_width(&self) -> usize {
        self.kernel.len() - 1
    }

    /// Smoothed sample count at every position of a grid of length `len`.
    pub fn density(&self, samples: &[usize], len: usize) -> Vec<f64> {
        let mut out = vec![0.0; len];
        for &sample in samples {
            if sample >= len {
                continue;
            }
            out[sample] += self.kernel[0];
            for (d, &weight) in self.kernel.iter().enumerate().skip(1) {
                if sample + d < len {
                    out[sample + d] += weight;
                }
                if let Some(pos) = sample.checked_sub(d) {
                    out[pos] += weight;
                }
            }
        }
        out
    }
}
