/// This file contains the valuation models buyers are drawn from.
///
/// - independent: private values i.i.d. uniform on [0,1], never revised
/// - common_value: each buyer reads a common value V through per-object noise
/// - correlated_private: private values jointly normal, correlation decaying with object distance
///
/// A ValuationSampler is prepared once per population so the correlated covariance is only
/// factorised once, then draws one valuation vector per buyer.

use std::fmt;
use std::str::FromStr;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use crate::error::{invalid, Result, SimulationError};
use crate::linalg::{Matrix, MultivariateNormal};
use crate::utils::clip_unit;

/// Statistical model used to generate (and later revise) a buyer's valuations
#[derive(Debug, Clone, PartialEq)]
pub enum ValuationModel {
    Independent,
    CommonValue {
        mean: f64,
        sd: f64,
        noise_sd: f64,
    },
    CorrelatedPrivate {
        mean: f64,
        variance: f64,
        scale: f64,
        correlation: f64,
        decay: f64,
    },
}

impl ValuationModel {
    pub fn common_value() -> Self {
        ValuationModel::CommonValue { mean: 0.5, sd: 0.15, noise_sd: 0.1 }
    }

    pub fn correlated_private() -> Self {
        ValuationModel::CorrelatedPrivate { mean: 0.5, variance: 0.08, scale: 0.1, correlation: 0.8, decay: 3.0 }
    }

    /// Selector string used on the command line and in logs
    pub fn name(&self) -> &'static str {
        match self {
            ValuationModel::Independent => "independent",
            ValuationModel::CommonValue { .. } => "common_value",
            ValuationModel::CorrelatedPrivate { .. } => "correlated_private",
        }
    }

    /// Affiliated models revise valuations from public auction state
    pub fn is_affiliated(&self) -> bool {
        !matches!(self, ValuationModel::Independent)
    }

    /// All three models with their default parameters, in reporting order
    pub fn all() -> Vec<ValuationModel> {
        vec![
            ValuationModel::common_value(),
            ValuationModel::correlated_private(),
            ValuationModel::Independent,
        ]
    }
}

impl Default for ValuationModel {
    fn default() -> Self {
        ValuationModel::common_value()
    }
}

impl fmt::Display for ValuationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ValuationModel {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "independent" => Ok(ValuationModel::Independent),
            "common_value" => Ok(ValuationModel::common_value()),
            "correlated_private" => Ok(ValuationModel::correlated_private()),
            other => Err(SimulationError::UnknownValuationModel(other.to_string())),
        }
    }
}

/// How strongly and how fast affiliated buyers react to public information
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffiliationParams {
    pub learning_rate: f64,
    pub affiliation_strength: f64,
}

impl Default for AffiliationParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.15,
            affiliation_strength: 0.3,
        }
    }
}

impl AffiliationParams {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("learning_rate", self.learning_rate), ("affiliation_strength", self.affiliation_strength)] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{} must be finite and non-negative, got {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Covariance of correlated private values: `variance` on the diagonal,
/// `scale * correlation * exp(-|i-j| / decay)` elsewhere
pub fn correlated_private_covariance(m: usize, variance: f64, scale: f64, correlation: f64, decay: f64) -> Matrix {
    let mut cov = vec![vec![0.0; m]; m];
    for i in 0..m {
        for j in 0..m {
            cov[i][j] = if i == j {
                variance
            } else {
                let distance = (i as f64 - j as f64).abs();
                scale * correlation * (-distance / decay).exp()
            };
        }
    }
    cov
}

/// One buyer's freshly drawn valuations
#[derive(Debug, Clone)]
pub struct ValuationDraw {
    pub valuations: Vec<f64>,
    /// Common value V behind the draw (common value model only)
    pub common_value: Option<f64>,
}

/// Valuation model prepared for a fixed number of objects
#[derive(Debug, Clone)]
pub enum ValuationSampler {
    Independent {
        m: usize,
    },
    CommonValue {
        m: usize,
        common: Normal<f64>,
        noise: Normal<f64>,
    },
    CorrelatedPrivate {
        joint: MultivariateNormal,
    },
}

impl ValuationSampler {
    pub fn new(model: &ValuationModel, m: usize) -> Result<Self> {
        if m == 0 {
            return Err(invalid("number of objects must be at least 1"));
        }
        match *model {
            ValuationModel::Independent => Ok(ValuationSampler::Independent { m }),
            ValuationModel::CommonValue { mean, sd, noise_sd } => {
                let common = Normal::new(mean, sd).map_err(|e| invalid(format!("common value distribution: {}", e)))?;
                let noise = Normal::new(0.0, noise_sd).map_err(|e| invalid(format!("common value noise: {}", e)))?;
                Ok(ValuationSampler::CommonValue { m, common, noise })
            }
            ValuationModel::CorrelatedPrivate { mean, variance, scale, correlation, decay } => {
                if decay <= 0.0 || !decay.is_finite() {
                    return Err(invalid(format!("correlation decay must be positive, got {}", decay)));
                }
                let cov = correlated_private_covariance(m, variance, scale, correlation, decay);
                let joint = MultivariateNormal::new(vec![mean; m], &cov)?;
                Ok(ValuationSampler::CorrelatedPrivate { joint })
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ValuationDraw {
        match self {
            ValuationSampler::Independent { m } => {
                let unit = Uniform::new(0.0, 1.0);
                ValuationDraw {
                    valuations: (0..*m).map(|_| unit.sample(rng)).collect(),
                    common_value: None,
                }
            }
            ValuationSampler::CommonValue { m, common, noise } => {
                let v = common.sample(rng);
                ValuationDraw {
                    valuations: (0..*m).map(|_| clip_unit(v + noise.sample(rng))).collect(),
                    common_value: Some(v),
                }
            }
            ValuationSampler::CorrelatedPrivate { joint } => ValuationDraw {
                valuations: joint.sample(rng).into_iter().map(clip_unit).collect(),
                common_value: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_parse_model_names() {
        assert_eq!("independent".parse::<ValuationModel>().unwrap(), ValuationModel::Independent);
        assert_eq!("common_value".parse::<ValuationModel>().unwrap(), ValuationModel::common_value());
        assert_eq!("correlated_private".parse::<ValuationModel>().unwrap(), ValuationModel::correlated_private());
        assert_eq!(
            "private_values".parse::<ValuationModel>(),
            Err(SimulationError::UnknownValuationModel("private_values".to_string()))
        );
        for model in ValuationModel::all() {
            assert_eq!(model.name().parse::<ValuationModel>().unwrap(), model);
        }
    }

    #[test]
    fn test_affiliation_validation() {
        assert!(AffiliationParams::default().validate().is_ok());
        let negative = AffiliationParams { learning_rate: -0.1, affiliation_strength: 0.3 };
        assert!(matches!(negative.validate(), Err(SimulationError::InvalidParameter(_))));
        let nan = AffiliationParams { learning_rate: 0.1, affiliation_strength: f64::NAN };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_correlated_covariance_shape() {
        let cov = correlated_private_covariance(4, 0.08, 0.1, 0.8, 3.0);
        assert_eq!(cov[0][0], 0.08);
        assert!((cov[0][1] - 0.08 * (-1.0_f64 / 3.0).exp()).abs() < 1e-12);
        assert_eq!(cov[1][3], cov[3][1]);
        assert!(cov[0][3] < cov[0][1]);
    }

    #[test]
    fn test_samples_stay_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(11);
        for model in ValuationModel::all() {
            let sampler = ValuationSampler::new(&model, 12).unwrap();
            for _ in 0..200 {
                let draw = sampler.sample(&mut rng);
                assert_eq!(draw.valuations.len(), 12);
                assert!(draw.valuations.iter().all(|v| (0.0..=1.0).contains(v)));
                assert_eq!(draw.common_value.is_some(), matches!(model, ValuationModel::CommonValue { .. }));
            }
        }
    }

    #[test]
    fn test_common_value_draws_cluster_around_v() {
        // Per-object noise has sd 0.1, so valuations stay close to each buyer's V
        let mut rng = StdRng::seed_from_u64(5);
        let sampler = ValuationSampler::new(&ValuationModel::common_value(), 50).unwrap();
        let draw = sampler.sample(&mut rng);
        let v = draw.common_value.unwrap();
        let mean = draw.valuations.iter().sum::<f64>() / 50.0;
        assert!((mean - v.clamp(0.0, 1.0)).abs() < 0.1);
    }

    #[test]
    fn test_zero_objects_is_rejected() {
        assert!(ValuationSampler::new(&ValuationModel::Independent, 0).is_err());
    }
}
