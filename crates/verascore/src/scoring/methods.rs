//! Normalization methods mapping a raw metric value to a 0-100 score.
//!
//! Every method is total over finite input: out-of-range values are clamped,
//! never rejected. Percentile methods are the only ones that can come back empty,
//! which happens when the peer universe has no members.

use serde::Serialize;

use super::universe::{PeerUniverse, UniverseScope};

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

/// Scoring method of a metric together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ScoringMethod {
    Percentile { universe: UniverseScope },
    PercentileInverse { universe: UniverseScope },
    Threshold { ladder: ThresholdLadder },
    Linear { bounds: LinearBounds },
}

impl ScoringMethod {
    pub const NAMES: [&'static str; 4] =
        ["percentile", "percentile_inverse", "threshold", "linear"];

    pub fn name(&self) -> &'static str {
        match self {
            ScoringMethod::Percentile { .. } => "percentile",
            ScoringMethod::PercentileInverse { .. } => "percentile_inverse",
            ScoringMethod::Threshold { .. } => "threshold",
            ScoringMethod::Linear { .. } => "linear",
        }
    }

    /// Peer universe the method ranks against, if it ranks at all.
    pub fn universe(&self) -> Option<UniverseScope> {
        match self {
            ScoringMethod::Percentile { universe }
            | ScoringMethod::PercentileInverse { universe } => Some(*universe),
            ScoringMethod::Threshold { .. } | ScoringMethod::Linear { .. } => None,
        }
    }
}

/// Midpoint percentile rank of `raw` within `peers`: values strictly below count
/// fully, ties count half. `None` for an empty universe.
pub fn percentile_score(raw: f64, peers: &PeerUniverse) -> Option<f64> {
    let values = peers.values();
    if values.is_empty() || raw.is_nan() {
        return None;
    }

    let below = values.partition_point(|peer| *peer < raw);
    let through = values.partition_point(|peer| *peer <= raw);
    let ties = through - below;
    let rank = (below as f64 + 0.5 * ties as f64) / values.len() as f64;

    Some((rank * SCORE_MAX).clamp(SCORE_MIN, SCORE_MAX))
}

/// Percentile rank mirrored for metrics where lower raw values are better.
pub fn percentile_inverse_score(raw: f64, peers: &PeerUniverse) -> Option<f64> {
    percentile_score(raw, peers).map(|score| SCORE_MAX - score)
}

/// Condition attached to one rung of a threshold ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBound {
    /// Matches `raw >= bound`.
    AtLeast(f64),
    /// Matches `raw <= bound`.
    AtMost(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdBand {
    pub bound: ThresholdBound,
    pub score: f64,
}

impl ThresholdBand {
    pub fn matches(&self, raw: f64) -> bool {
        match self.bound {
            ThresholdBound::AtLeast(min) => raw >= min,
            ThresholdBound::AtMost(max) => raw <= max,
        }
    }
}

/// Ordered step function with a mandatory fallback score.
///
/// Bands are evaluated in declared order and the first match wins, so config
/// authors express precedence between overlapping bands purely by ordering.
/// Bands need not be sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdLadder {
    bands: Vec<ThresholdBand>,
    default_score: f64,
}

impl ThresholdLadder {
    pub fn new(bands: Vec<ThresholdBand>, default_score: f64) -> Self {
        Self {
            bands,
            default_score,
        }
    }

    pub fn bands(&self) -> &[ThresholdBand] {
        &self.bands
    }

    pub fn default_score(&self) -> f64 {
        self.default_score
    }

    pub fn score(&self, raw: f64) -> f64 {
        self.bands
            .iter()
            .find(|band| band.matches(raw))
            .map_or(self.default_score, |band| band.score)
    }
}

/// Linear interpolation from an input range onto an output range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearBounds {
    pub input_min: f64,
    pub input_max: f64,
    pub output_min: f64,
    pub output_max: f64,
}

impl LinearBounds {
    pub fn new(input_min: f64, input_max: f64, output_min: f64, output_max: f64) -> Self {
        Self {
            input_min,
            input_max,
            output_min,
            output_max,
        }
    }

    /// Interpolate and clamp to `[output_min, output_max]`. A zero-width input
    /// range maps everything to `output_min`. An input range given high-to-low
    /// inverts the mapping.
    pub fn score(&self, raw: f64) -> f64 {
        if self.input_max == self.input_min {
            return self.output_min;
        }

        let ratio = (raw - self.input_min) / (self.input_max - self.input_min);
        let scaled = self.output_min + ratio * (self.output_max - self.output_min);
        if scaled.is_nan() {
            return self.output_min;
        }

        scaled.max(self.output_min).min(self.output_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(values: &[f64]) -> PeerUniverse {
        PeerUniverse::new(values.iter().copied())
    }

    #[test]
    fn percentile_uses_midpoint_for_ties() {
        let universe = peers(&[25.0, 10.0, 20.0, 15.0]);
        assert_eq!(percentile_score(15.0, &universe), Some(37.5));
        assert_eq!(percentile_inverse_score(15.0, &universe), Some(62.5));

        let universe = peers(&[4.0, 8.0, 12.0, 16.0]);
        assert_eq!(percentile_score(8.0, &universe), Some(37.5));
    }

    #[test]
    fn percentile_handles_extremes_and_duplicates() {
        let universe = peers(&[5.0, 5.0, 5.0, 5.0]);
        assert_eq!(percentile_score(5.0, &universe), Some(50.0));
        assert_eq!(percentile_score(1.0, &universe), Some(0.0));
        assert_eq!(percentile_score(9.0, &universe), Some(100.0));
    }

    #[test]
    fn percentile_of_empty_universe_is_absent() {
        let universe = PeerUniverse::default();
        assert_eq!(percentile_score(1.0, &universe), None);
        assert_eq!(percentile_inverse_score(1.0, &universe), None);
    }

    #[test]
    fn threshold_first_declared_match_wins() {
        let ladder = ThresholdLadder::new(
            vec![
                ThresholdBand {
                    bound: ThresholdBound::AtMost(0.3),
                    score: 100.0,
                },
                ThresholdBand {
                    bound: ThresholdBound::AtMost(0.5),
                    score: 85.0,
                },
            ],
            25.0,
        );

        assert_eq!(ladder.score(0.4), 85.0);
        assert_eq!(ladder.score(0.9), 25.0);
        assert_eq!(ladder.score(0.1), 100.0);
    }

    #[test]
    fn threshold_overlapping_bands_follow_declared_priority() {
        let ladder = ThresholdLadder::new(
            vec![
                ThresholdBand {
                    bound: ThresholdBound::AtLeast(10.0),
                    score: 60.0,
                },
                ThresholdBand {
                    bound: ThresholdBound::AtLeast(20.0),
                    score: 95.0,
                },
            ],
            10.0,
        );

        // The broader band is declared first, so it shadows the narrower one.
        assert_eq!(ladder.score(25.0), 60.0);
        assert_eq!(ladder.score(5.0), 10.0);
    }

    #[test]
    fn linear_clamps_out_of_range_input() {
        let bounds = LinearBounds::new(-0.2, 0.4, 0.0, 100.0);
        assert_eq!(bounds.score(1.0), 100.0);
        assert_eq!(bounds.score(-3.0), 0.0);
        assert!((bounds.score(0.1) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn linear_degenerate_range_returns_output_min() {
        let bounds = LinearBounds::new(5.0, 5.0, 20.0, 80.0);
        assert_eq!(bounds.score(5.0), 20.0);
        assert_eq!(bounds.score(-100.0), 20.0);
    }

    #[test]
    fn linear_inverted_input_range_flips_direction() {
        let bounds = LinearBounds::new(3.0, 0.0, 0.0, 100.0);
        assert_eq!(bounds.score(0.0), 100.0);
        assert_eq!(bounds.score(3.0), 0.0);
        assert_eq!(bounds.score(10.0), 0.0);
    }
}
