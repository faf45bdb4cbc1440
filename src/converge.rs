use crate::arrival::arrival_order;
use crate::buyer::{Buyer, BuyerId};
use crate::error::{invalid, Result};
use crate::features::{create_affiliated_objects, create_plain_objects, DEFAULT_FEATURE_CORRELATION};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::object::AuctionObject;
use crate::simulationrun::SimulationRun;
use crate::utils::TOTAL_AUCTION_RUNS;
use crate::valuations::{AffiliationParams, ValuationModel};
use crate::warnln;
use rand::Rng;
use std::sync::atomic::Ordering;
pub use crate::simulationrun::EntryRule;

/// Default cap on the number of passes of one matching run
pub const DEFAULT_MAX_ITER: usize = 10000;

/// Parameters of one multi-object market
#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    pub reserve_prices: Vec<f64>,
    pub min_increments: Vec<f64>,
    pub valuation_model: ValuationModel,
    pub affiliation: AffiliationParams,
    /// Correlation of object features; None builds objects without latent profiles
    pub feature_correlation: Option<f64>,
    pub entry_rule: EntryRule,
    pub max_iter: usize,
}

impl MarketConfig {
    /// Market over the given objects with default model, affiliation and iteration cap
    pub fn new(reserve_prices: Vec<f64>, min_increments: Vec<f64>) -> Self {
        Self {
            reserve_prices,
            min_increments,
            valuation_model: ValuationModel::default(),
            affiliation: AffiliationParams::default(),
            feature_correlation: Some(DEFAULT_FEATURE_CORRELATION),
            entry_rule: EntryRule::default(),
            max_iter: DEFAULT_MAX_ITER,
        }
    }

    /// Number of objects
    pub fn m(&self) -> usize {
        self.reserve_prices.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.reserve_prices.is_empty() {
            return Err(invalid("at least one object is required"));
        }
        if self.reserve_prices.len() != self.min_increments.len() {
            return Err(invalid(format!(
                "{} reserve prices but {} minimum increments",
                self.reserve_prices.len(),
                self.min_increments.len()
            )));
        }
        for (i, &reserve) in self.reserve_prices.iter().enumerate() {
            if !reserve.is_finite() || reserve < 0.0 {
                return Err(invalid(format!("reserve price of object {} must be finite and >= 0, got {}", i + 1, reserve)));
            }
        }
        for (i, &increment) in self.min_increments.iter().enumerate() {
            if !increment.is_finite() || increment <= 0.0 {
                return Err(invalid(format!("minimum increment of object {} must be finite and > 0, got {}", i + 1, increment)));
            }
        }
        if self.max_iter < 1 {
            return Err(invalid("max_iter must be at least 1"));
        }
        self.affiliation.validate()?;
        if let Some(correlation) = self.feature_correlation {
            if !correlation.is_finite() || !(-1.0..=1.0).contains(&correlation) {
                return Err(invalid(format!("feature correlation must lie in [-1, 1], got {}", correlation)));
            }
        }
        Ok(())
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self::new(vec![0.0], vec![0.1])
    }
}

/// Terminal state of a matching run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingStatus {
    /// A full pass changed no assignment
    Converged,
    /// The pass cap was hit while buyers were still moving
    IterationLimitReached,
}

/// Final state of one matching run
#[derive(Debug, Clone)]
pub struct MatchingOutcome {
    pub objects: Vec<AuctionObject>,
    /// Buyers in arrival order
    pub buyers: Vec<Buyer>,
    pub iterations: usize,
    pub status: MatchingStatus,
    /// Prices of all objects after each pass
    pub price_history: Vec<Vec<f64>>,
}

impl MatchingOutcome {
    pub fn converged(&self) -> bool {
        self.status == MatchingStatus::Converged
    }

    pub fn sold_objects(&self) -> impl Iterator<Item = &AuctionObject> {
        self.objects.iter().filter(|o| o.has_winner())
    }

    pub fn won_any(&self, buyer_id: BuyerId) -> bool {
        self.objects.iter().any(|o| o.winner == Some(buyer_id))
    }

    /// Final prices of all objects won by the buyer
    pub fn prices_paid_by(&self, buyer_id: BuyerId) -> Vec<f64> {
        self.objects
            .iter()
            .filter(|o| o.winner == Some(buyer_id))
            .filter_map(|o| o.final_price())
            .collect()
    }

    pub fn buyer(&self, buyer_id: BuyerId) -> Option<&Buyer> {
        self.buyers.iter().find(|b| b.buyer_id == buyer_id)
    }
}

/// Object for running the multi-object matching dynamic to its fixed point
pub struct MatchingConverge {
    pub config: MarketConfig,
}

impl MatchingConverge {
    /// Create a new MatchingConverge instance, rejecting invalid market parameters
    pub fn new(config: MarketConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Fresh objects for one run
    fn create_objects<R: Rng + ?Sized>(&self, rng: &mut R, logger: &mut Logger) -> Result<Vec<AuctionObject>> {
        match self.config.feature_correlation {
            Some(correlation) => create_affiliated_objects(&self.config.reserve_prices, &self.config.min_increments, correlation, rng, logger),
            None => create_plain_objects(&self.config.reserve_prices, &self.config.min_increments),
        }
    }

    /// Explicit arrival order supplied by the caller, checked and reset to unassigned
    fn prepare_buyers(&self, n: usize, mut buyers: Vec<Buyer>) -> Result<Vec<Buyer>> {
        if buyers.len() != n {
            return Err(invalid(format!("expected {} buyers in the arrival order, got {}", n, buyers.len())));
        }
        let m = self.config.m();
        for buyer in buyers.iter_mut() {
            if buyer.valuations.len() != m {
                return Err(invalid(format!("buyer {} has {} valuations for {} objects", buyer, buyer.valuations.len(), m)));
            }
            if buyer.valuations.iter().any(|v| !v.is_finite() || !(0.0..=1.0).contains(v)) {
                return Err(invalid(format!("buyer {} has valuations outside [0, 1]", buyer)));
            }
            buyer.active_object = None;
        }
        Ok(buyers)
    }

    /// Run a single pass over the current state
    pub fn pass(&self, objects: &mut [AuctionObject], buyers: &mut [Buyer], pass: usize, logger: &mut Logger) -> SimulationRun {
        SimulationRun::new(objects, buyers, self.config.entry_rule, pass, logger)
    }

    /// Run the matching dynamic (maximum max_iter passes)
    ///
    /// # Arguments
    /// * `n` - Number of buyers
    /// * `buyers` - Explicit arrival order; None draws a fresh population from the valuation model
    /// * `rng` - Random source for the population and the object features
    /// * `logger` - Logger for event-based logging
    pub fn run<R: Rng + ?Sized>(&self, n: usize, buyers: Option<Vec<Buyer>>, rng: &mut R, logger: &mut Logger) -> Result<MatchingOutcome> {
        let m = self.config.m();
        let mut buyers = match buyers {
            Some(order) => self.prepare_buyers(n, order)?,
            None => arrival_order(n, m, &self.config.valuation_model, self.config.affiliation, rng)?,
        };
        let mut objects = self.create_objects(rng, logger)?;

        let mut price_history = Vec::new();
        let mut status = MatchingStatus::IterationLimitReached;
        let mut iterations = 0;

        for iteration in 0..self.config.max_iter {
            iterations = iteration + 1;
            let run = self.pass(&mut objects, &mut buyers, iterations, logger);
            price_history.push(objects.iter().map(|o| o.current_price).collect());
            logln!(logger, LogEvent::Iteration, "pass {}: {} exits, {} entries", iterations, run.exits, run.entries);

            // Break early if nobody moved (converged)
            if !run.changed() {
                status = MatchingStatus::Converged;
                logln!(logger, LogEvent::Convergence, "Converged after {} iterations", iterations);
                break;
            }
        }

        if status == MatchingStatus::IterationLimitReached {
            warnln!(logger, LogEvent::Convergence, "Reached maximum iterations ({}) with n={}, m={}", self.config.max_iter, n, m);
        }

        TOTAL_AUCTION_RUNS.fetch_add(1, Ordering::Relaxed);

        Ok(MatchingOutcome {
            objects,
            buyers,
            iterations,
            status,
            price_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use rand::{rngs::StdRng, SeedableRng};

    fn fixed_buyer(id: BuyerId, valuations: Vec<f64>) -> Buyer {
        Buyer::with_valuations(id, valuations, ValuationModel::Independent, AffiliationParams::default())
    }

    fn independent_market(reserves: Vec<f64>, increments: Vec<f64>) -> MarketConfig {
        MarketConfig {
            valuation_model: ValuationModel::Independent,
            feature_correlation: None,
            ..MarketConfig::new(reserves, increments)
        }
    }

    #[test]
    fn test_two_objects_three_buyers() {
        let engine = MatchingConverge::new(independent_market(vec![0.0, 0.0], vec![0.1, 0.1])).unwrap();
        let order = vec![
            fixed_buyer(1, vec![0.9, 0.9]),
            fixed_buyer(2, vec![0.5, 0.5]),
            fixed_buyer(3, vec![0.2, 0.2]),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = engine.run(3, Some(order), &mut rng, &mut Logger::new()).unwrap();

        assert!(outcome.converged());
        assert_eq!(outcome.objects[0].winner, Some(1));
        assert_eq!(outcome.objects[1].winner, Some(2));
        assert!(!outcome.won_any(3));
        assert_eq!(outcome.buyer(3).unwrap().active_object, None);
        // The 0.2 buyer tried both objects before being priced out, lifting each to 0.2 + 0.1
        assert!((outcome.objects[0].current_price - 0.3).abs() < 1e-9);
        assert!((outcome.objects[1].current_price - 0.3).abs() < 1e-9);
        assert_eq!(outcome.iterations, 4);
    }

    #[test]
    fn test_two_objects_reproducible_for_fixed_order() {
        let engine = MatchingConverge::new(independent_market(vec![0.0, 0.0], vec![0.1, 0.1])).unwrap();
        let order = vec![
            fixed_buyer(1, vec![0.5, 0.5]),
            fixed_buyer(2, vec![0.2, 0.2]),
            fixed_buyer(3, vec![0.9, 0.9]),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let a = engine.run(3, Some(order.clone()), &mut rng, &mut Logger::new()).unwrap();
        let b = engine.run(3, Some(order), &mut rng, &mut Logger::new()).unwrap();
        let summary = |o: &MatchingOutcome| o.objects.iter().map(|x| (x.winner, x.current_price)).collect::<Vec<_>>();
        assert_eq!(summary(&a), summary(&b));
        // Strongest and second strongest buyers end up with the two objects
        assert!(a.won_any(3));
        assert!(a.won_any(1));
        assert!(!a.won_any(2));
    }

    #[test]
    fn test_single_object_two_buyers_either_order() {
        let engine = MatchingConverge::new(independent_market(vec![0.0], vec![0.05])).unwrap();
        for order in [
            vec![fixed_buyer(1, vec![0.8]), fixed_buyer(2, vec![0.3])],
            vec![fixed_buyer(2, vec![0.3]), fixed_buyer(1, vec![0.8])],
        ] {
            let mut rng = StdRng::seed_from_u64(1);
            let outcome = engine.run(2, Some(order), &mut rng, &mut Logger::new()).unwrap();
            assert_eq!(outcome.objects[0].winner, Some(1));
            assert!((outcome.objects[0].current_price - 0.35).abs() < 1e-9);
        }
    }

    #[test]
    fn test_common_value_buyer_reacts_to_busy_object() {
        // Affiliated object receiving two bids with positive intensity raises the observer's valuation
        let config = MarketConfig {
            valuation_model: ValuationModel::common_value(),
            ..MarketConfig::new(vec![0.0], vec![0.1])
        };
        let engine = MatchingConverge::new(config).unwrap();
        let common = |id, v: f64| Buyer::with_valuations(id, vec![v], ValuationModel::common_value(), AffiliationParams::default());
        let mut buyers = vec![common(1, 0.6), common(2, 0.4), common(3, 0.3)];
        let mut rng = StdRng::seed_from_u64(8);
        let mut logger = Logger::new();
        let mut objects = create_affiliated_objects(&[0.0], &[0.1], 0.85, &mut rng, &mut logger).unwrap();

        engine.pass(&mut objects, &mut buyers, 1, &mut logger);
        assert_eq!(objects[0].observed_bids.len(), 2);
        assert!(objects[0].bidding_intensity > 0.0);
        let before = buyers[2].valuations[0];
        engine.pass(&mut objects, &mut buyers, 2, &mut logger);
        assert!(buyers[2].valuations[0] > before);
    }

    #[test]
    fn test_random_markets_terminate_with_monotone_prices() {
        let mut logger = Logger::new();
        for (seed, model) in ValuationModel::all().into_iter().enumerate() {
            let config = MarketConfig {
                valuation_model: model,
                ..MarketConfig::new(vec![0.05; 6], vec![0.02; 6])
            };
            let engine = MatchingConverge::new(config).unwrap();
            let mut rng = StdRng::seed_from_u64(100 + seed as u64);
            let mut outcome = engine.run(15, None, &mut rng, &mut logger).unwrap();

            assert!(outcome.iterations <= DEFAULT_MAX_ITER);
            assert!(outcome.converged());
            assert_eq!(outcome.price_history.len(), outcome.iterations);
            for window in outcome.price_history.windows(2) {
                for (before, after) in window[0].iter().zip(&window[1]) {
                    assert!(after >= before);
                }
            }
            for buyer in &outcome.buyers {
                assert!(buyer.valuations.iter().all(|v| (0.0..=1.0).contains(v)));
            }
            for object in outcome.sold_objects() {
                let expected = object.highest_bid.min(object.second_highest_bid + object.min_increment);
                if object.bids_accepted > 1 {
                    assert!((object.current_price - expected).abs() < 1e-12);
                }
            }

            // With fixed valuations one more pass after convergence changes nothing
            if !engine.config.valuation_model.is_affiliated() {
                let extra = engine.pass(&mut outcome.objects, &mut outcome.buyers, outcome.iterations + 1, &mut logger);
                assert!(!extra.changed());
            }
        }
    }

    #[test]
    fn test_baseline_entry_rule_converges() {
        let config = MarketConfig {
            entry_rule: EntryRule::LowestEntryPrice,
            ..independent_market(vec![0.0, 0.1, 0.2], vec![0.05, 0.05, 0.05])
        };
        let engine = MatchingConverge::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let mut logger = Logger::new();
        let mut outcome = engine.run(10, None, &mut rng, &mut logger).unwrap();
        assert!(outcome.converged());
        // Reserve 0 is always reachable without a profit filter
        assert!(outcome.objects[0].has_winner());
        let extra = engine.pass(&mut outcome.objects, &mut outcome.buyers, outcome.iterations + 1, &mut logger);
        assert!(!extra.changed());
    }

    #[test]
    fn test_iteration_cap_is_observable() {
        let config = MarketConfig {
            max_iter: 1,
            ..independent_market(vec![0.0], vec![0.05])
        };
        let engine = MatchingConverge::new(config).unwrap();
        let order = vec![fixed_buyer(1, vec![0.8]), fixed_buyer(2, vec![0.3])];
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = engine.run(2, Some(order), &mut rng, &mut Logger::new()).unwrap();
        assert_eq!(outcome.status, MatchingStatus::IterationLimitReached);
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn test_explicit_buyers_are_reset() {
        let engine = MatchingConverge::new(independent_market(vec![0.0], vec![0.05])).unwrap();
        let mut stale = fixed_buyer(1, vec![0.8]);
        stale.active_object = Some(1);
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = engine.run(1, Some(vec![stale]), &mut rng, &mut Logger::new()).unwrap();
        assert_eq!(outcome.objects[0].winner, Some(1));
        assert_eq!(outcome.objects[0].bids_accepted, 1);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let bad_configs = vec![
            MarketConfig::new(vec![], vec![]),
            MarketConfig::new(vec![0.0, 0.0], vec![0.1]),
            MarketConfig::new(vec![-0.1], vec![0.1]),
            MarketConfig::new(vec![0.0], vec![0.0]),
            MarketConfig::new(vec![0.0], vec![f64::NAN]),
            MarketConfig { max_iter: 0, ..MarketConfig::default() },
            MarketConfig { feature_correlation: Some(1.5), ..MarketConfig::default() },
            MarketConfig {
                affiliation: AffiliationParams { learning_rate: 0.1, affiliation_strength: -1.0 },
                ..MarketConfig::default()
            },
        ];
        for config in bad_configs {
            assert!(matches!(MatchingConverge::new(config), Err(SimulationError::InvalidParameter(_))));
        }

        let engine = MatchingConverge::new(independent_market(vec![0.0, 0.0], vec![0.1, 0.1])).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let wrong_count = vec![fixed_buyer(1, vec![0.5, 0.5])];
        assert!(engine.run(2, Some(wrong_count), &mut rng, &mut Logger::new()).is_err());
        let wrong_width = vec![fixed_buyer(1, vec![0.5])];
        assert!(engine.run(1, Some(wrong_width), &mut rng, &mut Logger::new()).is_err());
        let out_of_range = vec![fixed_buyer(1, vec![0.5, 1.5])];
        assert!(engine.run(1, Some(out_of_range), &mut rng, &mut Logger::new()).is_err());
    }
}
