/// This file contains the correlated feature generator for affiliated objects.
///
/// Objects are arranged in blocks of three. Objects in the same block share strongly
/// correlated features, neighbours across a block border are correlated more weakly and
/// everything else is independent. Each object gets three features drawn jointly across
/// objects, normalised per object to [0,1].

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use crate::error::{invalid, Result};
use crate::linalg::{ensure_positive_semidefinite, Matrix, MultivariateNormal};
use crate::logger::{LogEvent, Logger};
use crate::object::{AuctionObject, ObjectProfile, LATENT_QUALITY_WEIGHTS};
use crate::warnln;

pub const FEATURE_VARIANCE: f64 = 0.08;
pub const FEATURE_MEAN: f64 = 0.5;
pub const GROUP_SIZE: usize = 3;
pub const DEFAULT_FEATURE_CORRELATION: f64 = 0.85;
const ADJACENT_DAMPING: f64 = 0.8;
const LATENT_QUALITY_NOISE_SD: f64 = 0.05;
const NORMALIZE_EPSILON: f64 = 1e-8;

pub fn correlation_group(index: usize) -> usize {
    index / GROUP_SIZE
}

/// Covariance between the m objects' features
pub fn feature_covariance(m: usize, correlation: f64) -> Matrix {
    let mut cov = vec![vec![0.0; m]; m];
    for i in 0..m {
        cov[i][i] = FEATURE_VARIANCE;
        for j in (i + 1)..m {
            let value = if correlation_group(i) == correlation_group(j) {
                FEATURE_VARIANCE * correlation
            } else if j - i == 1 {
                FEATURE_VARIANCE * correlation * ADJACENT_DAMPING
            } else {
                0.0
            };
            cov[i][j] = value;
            cov[j][i] = value;
        }
    }
    cov
}

/// m x 3 matrix of features, each row min-max normalised
///
/// A covariance that cannot be factorised even after the diagonal shift falls back to
/// independent uniform features; the fallback is reported as a warning.
pub fn generate_correlated_features<R: Rng + ?Sized>(m: usize, correlation: f64, rng: &mut R, logger: &mut Logger) -> Vec<[f64; 3]> {
    let mut cov = feature_covariance(m, correlation);
    let shift = ensure_positive_semidefinite(&mut cov);

    let mut features: Vec<[f64; 3]> = match MultivariateNormal::new(vec![FEATURE_MEAN; m], &cov) {
        Ok(joint) => {
            let columns: Vec<Vec<f64>> = (0..3).map(|_| joint.sample(&mut *rng)).collect();
            (0..m).map(|i| [columns[0][i], columns[1][i], columns[2][i]]).collect()
        }
        Err(e) => {
            warnln!(
                logger,
                LogEvent::Convergence,
                "feature covariance unusable ({}), m={}, correlation={}, diagonal shift={:?}; using independent features",
                e, m, correlation, shift
            );
            let unit = Uniform::new(0.0, 1.0);
            (0..m).map(|_| [unit.sample(&mut *rng), unit.sample(&mut *rng), unit.sample(&mut *rng)]).collect()
        }
    };

    for row in features.iter_mut() {
        let min = row.iter().copied().fold(f64::INFINITY, f64::min);
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for value in row.iter_mut() {
            *value = (*value - min) / (max - min + NORMALIZE_EPSILON);
        }
    }
    features
}

fn check_object_parameters(reserve_prices: &[f64], min_increments: &[f64]) -> Result<()> {
    if reserve_prices.is_empty() {
        return Err(invalid("at least one object is required"));
    }
    if reserve_prices.len() != min_increments.len() {
        return Err(invalid(format!(
            "{} reserve prices but {} minimum increments",
            reserve_prices.len(),
            min_increments.len()
        )));
    }
    Ok(())
}

/// Objects with latent profiles built from correlated features
pub fn create_affiliated_objects<R: Rng + ?Sized>(
    reserve_prices: &[f64],
    min_increments: &[f64],
    correlation: f64,
    rng: &mut R,
    logger: &mut Logger,
) -> Result<Vec<AuctionObject>> {
    check_object_parameters(reserve_prices, min_increments)?;
    let m = reserve_prices.len();
    let features = generate_correlated_features(m, correlation, rng, logger);
    let quality_noise = Normal::new(0.0, LATENT_QUALITY_NOISE_SD).map_err(|e| invalid(e.to_string()))?;

    Ok(features
        .into_iter()
        .enumerate()
        .map(|(i, feature_vector)| {
            let weighted: f64 = feature_vector.iter().zip(LATENT_QUALITY_WEIGHTS.iter()).map(|(f, w)| f * w).sum();
            let profile = ObjectProfile {
                feature_vector,
                correlation_group: correlation_group(i),
                latent_quality: weighted + quality_noise.sample(&mut *rng),
            };
            AuctionObject::with_profile(i + 1, reserve_prices[i], min_increments[i], profile)
        })
        .collect())
}

/// Objects without profiles
pub fn create_plain_objects(reserve_prices: &[f64], min_increments: &[f64]) -> Result<Vec<AuctionObject>> {
    check_object_parameters(reserve_prices, min_increments)?;
    Ok(reserve_prices
        .iter()
        .zip(min_increments)
        .enumerate()
        .map(|(i, (&reserve, &increment))| AuctionObject::new(i + 1, reserve, increment))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::capture::Capture;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_covariance_structure() {
        let cov = feature_covariance(7, 0.85);
        assert_eq!(cov[0][0], 0.08);
        // Same block
        assert!((cov[0][2] - 0.08 * 0.85).abs() < 1e-12);
        // Adjacent across a block border
        assert!((cov[2][3] - 0.08 * 0.85 * 0.8).abs() < 1e-12);
        // Unrelated
        assert_eq!(cov[0][4], 0.0);
        assert_eq!(cov[5][6], cov[6][5]);
    }

    #[test]
    fn test_features_are_normalised() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut logger = Logger::new();
        let features = generate_correlated_features(10, 0.85, &mut rng, &mut logger);
        assert_eq!(features.len(), 10);
        for row in &features {
            assert!(row.iter().all(|v| (0.0..=1.0).contains(v)));
            // Min maps to exactly 0, max to just under 1
            assert!(row.iter().any(|&v| v == 0.0));
            assert!(row.iter().any(|&v| v > 0.99));
        }
    }

    #[test]
    fn test_singular_correlations_sample_without_fallback() {
        // Rank deficient blocks are still factorised, so no warning is raised
        for (m, correlation) in [(3, 1.0), (6, 1.0), (3, -0.5)] {
            let (receiver, out) = Capture::new(vec![LogEvent::Convergence]);
            let mut logger = Logger::new();
            logger.add_receiver(receiver);
            let mut rng = StdRng::seed_from_u64(2);
            let features = generate_correlated_features(m, correlation, &mut rng, &mut logger);
            assert_eq!(features.len(), m);
            assert!(features.iter().all(|row| row.iter().all(|v| v.is_finite())));
            assert!(!out.borrow().contains("WARNING"), "m={} correlation={}: {}", m, correlation, out.borrow());
        }
    }

    #[test]
    fn test_unusable_covariance_falls_back_to_uniform() {
        // A NaN correlation poisons the covariance so that no factor exists
        let (receiver, out) = Capture::new(vec![LogEvent::Convergence]);
        let mut logger = Logger::new();
        logger.add_receiver(receiver);
        let mut rng = StdRng::seed_from_u64(11);
        let features = generate_correlated_features(4, f64::NAN, &mut rng, &mut logger);

        assert!(out.borrow().starts_with("WARNING feature covariance unusable"), "{}", out.borrow());
        assert!(out.borrow().contains("using independent features"));
        assert_eq!(features.len(), 4);
        for row in &features {
            assert!(row.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
            assert!(row.iter().any(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_affiliated_objects_profiles() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut logger = Logger::new();
        let objects = create_affiliated_objects(&[0.0; 7], &[0.1; 7], 0.85, &mut rng, &mut logger).unwrap();
        let groups: Vec<usize> = objects.iter().map(|o| o.correlation_group().unwrap()).collect();
        assert_eq!(groups, vec![0, 0, 0, 1, 1, 1, 2]);
        assert_eq!(objects[6].object_id, 7);
        for object in &objects {
            let quality = object.profile.as_ref().unwrap().latent_quality;
            assert!(quality > -0.5 && quality < 1.5);
            assert!(object.winner.is_none());
        }
    }

    #[test]
    fn test_mismatched_parameter_lists() {
        assert!(create_plain_objects(&[0.0, 0.0], &[0.1]).is_err());
        assert!(create_plain_objects(&[], &[]).is_err());
        let objects = create_plain_objects(&[0.1, 0.2], &[0.01, 0.02]).unwrap();
        assert_eq!(objects[1].reserve_price, 0.2);
        assert!(objects[1].profile.is_none());
    }
}
