//! Alignment score models used to score variant calls.

/// Error type for score model selectors.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("unknown score model: {0}")]
    UnknownModel(String),
    #[error("invalid score model attribute: {0}")]
    InvalidAttribute(String),
}

/// Affine gap score model with one or more gap segments.
///
/// A gap of length `n` is charged the cheapest segment,
/// `min_i(open_i + extend_i * n)`; multiple segments keep long gaps from
/// being dominated by the per-base extension cost.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineScoreModel {
    mismatch: f64,
    gap_segments: Vec<(f64, f64)>,
}

impl Default for AffineScoreModel {
    fn default() -> Self {
        Self {
            mismatch: 4.0,
            gap_segments: vec![(4.0, 2.0), (24.0, 1.0)],
        }
    }
}

/// Score model, constructed from a selector string.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreModel {
    Affine(AffineScoreModel),
}

impl ScoreModel {
    /// Construct a model from a selector such as `affine`,
    /// `affine:mismatch=5`, or `affine:mismatch=5:gap=6,2;30,1`.
    pub fn from_selector(selector: &str) -> Result<Self, Error> {
        let mut parts = selector.split(':');
        let name = parts.next().unwrap_or_default();
        if name != "affine" {
            return Err(Error::UnknownModel(selector.to_string()));
        }

        let mut model = AffineScoreModel::default();
        for attr in parts {
            let (key, value) = attr
                .split_once('=')
                .ok_or_else(|| Error::InvalidAttribute(attr.to_string()))?;
            match key {
                "mismatch" => model.mismatch = parse_num(value)?,
                "gap" => {
                    model.gap_segments = value
                        .split(';')
                        .map(|seg| {
                            let (open, extend) = seg
                                .split_once(',')
                                .ok_or_else(|| Error::InvalidAttribute(seg.to_string()))?;
                            Ok((parse_num(open)?, parse_num(extend)?))
                        })
                        .collect::<Result<Vec<_>, Error>>()?;
                }
                _ => return Err(Error::InvalidAttribute(attr.to_string())),
            }
        }
        Ok(ScoreModel::Affine(model))
    }

    /// Score of a run of `n` mismatching bases (negative penalty).
    pub fn mismatch(&self, n: u64) -> f64 {
        match self {
            ScoreModel::Affine(model) => -(n as f64 * model.mismatch),
        }
    }

    /// Score of a gap of length `len` (negative penalty).
    pub fn gap(&self, len: u64) -> f64 {
        match self {
            ScoreModel::Affine(model) => -model
                .gap_segments
                .iter()
                .map(|(open, extend)| open + extend * len as f64)
                .fold(f64::INFINITY, f64::min),
        }
    }
}

fn parse_num(value: &str) -> Result<f64, Error> {
    value
        .parse::<f64>()
        .map_err(|_| Error::InvalidAttribute(value.to_string()))
}
