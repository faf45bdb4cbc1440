/// This file contains the Monte Carlo drivers built on top of the matching engine.
///
/// Every driver repeats the matching run `sims` times per sweep point. Each repetition gets its
/// own StdRng seeded from the caller's master generator, so a sweep is replayable from one seed
/// and no two repetitions share random state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use crate::arrival::{arrival_order, kth_highest_index, with_buyer_at};
use crate::buyer::Buyer;
use crate::converge::{EntryRule, MarketConfig, MatchingConverge, MatchingOutcome, DEFAULT_MAX_ITER};
use crate::error::{invalid, Result};
use crate::features::DEFAULT_FEATURE_CORRELATION;
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::stats::{buyer_profit, PooledStat, RunStat};
use crate::utils::mean;
use crate::valuations::{AffiliationParams, ValuationModel};
use crate::warnln;

/// Floor applied to every generated minimum increment
pub const MIN_INCREMENT_FLOOR: f64 = 1e-4;

/// Market shape and repetition count shared by all drivers
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSetup {
    pub n: usize,
    pub m: usize,
    pub valuation_model: ValuationModel,
    pub affiliation: AffiliationParams,
    pub entry_rule: EntryRule,
    pub feature_correlation: Option<f64>,
    pub sims: usize,
    pub max_iter: usize,
    /// Spread of reserve prices of objects 2..m around the base
    pub sigma_reserve: f64,
    /// Spread of minimum increments of objects 2..m around the base
    pub sigma_increment: f64,
}

impl Default for ExperimentSetup {
    fn default() -> Self {
        Self {
            n: 10,
            m: 5,
            valuation_model: ValuationModel::default(),
            affiliation: AffiliationParams::default(),
            entry_rule: EntryRule::default(),
            feature_correlation: Some(DEFAULT_FEATURE_CORRELATION),
            sims: 100,
            max_iter: DEFAULT_MAX_ITER,
            sigma_reserve: 0.05,
            sigma_increment: 0.002,
        }
    }
}

impl ExperimentSetup {
    fn validate(&self) -> Result<()> {
        if self.n < 1 {
            return Err(invalid("experiments need at least one buyer"));
        }
        if self.m < 1 {
            return Err(invalid("experiments need at least one object"));
        }
        if self.sims < 1 {
            return Err(invalid("experiments need at least one simulation per point"));
        }
        Ok(())
    }

    fn engine(&self, reserve_prices: Vec<f64>, min_increments: Vec<f64>) -> Result<MatchingConverge> {
        MatchingConverge::new(MarketConfig {
            reserve_prices,
            min_increments,
            valuation_model: self.valuation_model.clone(),
            affiliation: self.affiliation,
            feature_correlation: self.feature_correlation,
            entry_rule: self.entry_rule,
            max_iter: self.max_iter,
        })
    }

    fn general_parameters<R: Rng + ?Sized>(&self, reserve_base: f64, increment_base: f64, rng: &mut R) -> Result<(Vec<f64>, Vec<f64>)> {
        general_parameters(self.m, reserve_base, increment_base, self.sigma_reserve, self.sigma_increment, rng)
    }

    /// Fresh population with random arrival order from the setup's valuation model
    fn population<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Buyer>> {
        arrival_order(self.n, self.m, &self.valuation_model, self.affiliation, rng)
    }
}

/// Heterogeneous object parameters around a base
///
/// Object 1 gets the base values, the others `base + Normal(0, sigma)`. Reserves are floored at 0
/// and increments at MIN_INCREMENT_FLOOR.
pub fn general_parameters<R: Rng + ?Sized>(
    m: usize,
    reserve_base: f64,
    increment_base: f64,
    sigma_reserve: f64,
    sigma_increment: f64,
    rng: &mut R,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if m < 1 {
        return Err(invalid("at least one object is required"));
    }
    let reserve_noise = Normal::new(0.0, sigma_reserve).map_err(|e| invalid(format!("sigma_reserve {}: {}", sigma_reserve, e)))?;
    let increment_noise = Normal::new(0.0, sigma_increment).map_err(|e| invalid(format!("sigma_increment {}: {}", sigma_increment, e)))?;

    let mut reserve_prices = vec![reserve_base.max(0.0)];
    let mut min_increments = vec![increment_base.max(MIN_INCREMENT_FLOOR)];
    for _ in 1..m {
        reserve_prices.push((reserve_base + reserve_noise.sample(rng)).max(0.0));
        min_increments.push((increment_base + increment_noise.sample(rng)).max(MIN_INCREMENT_FLOOR));
    }
    Ok((reserve_prices, min_increments))
}

/// Object parameters growing linearly with the object index: `base + j * delta`
pub fn stepped_parameters(m: usize, reserve_base: f64, increment_base: f64, delta_reserve: f64, delta_increment: f64) -> (Vec<f64>, Vec<f64>) {
    let reserve_prices = (0..m).map(|j| reserve_base + j as f64 * delta_reserve).collect();
    let min_increments = (0..m).map(|j| increment_base + j as f64 * delta_increment).collect();
    (reserve_prices, min_increments)
}

fn run_rng(master: &mut StdRng) -> StdRng {
    StdRng::seed_from_u64(master.gen())
}

/// Mean results at one point of a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub x: f64,
    pub mean_price: f64,
    pub mean_bids: f64,
    pub capped_runs: usize,
}

fn report_capped(point: &SweepPoint, label: &str, logger: &mut Logger) {
    if point.capped_runs > 0 {
        warnln!(logger, LogEvent::Experiment, "{} = {:.4}: {} runs hit the iteration cap", label, point.x, point.capped_runs);
    }
}

fn sweep<F>(setup: &ExperimentSetup, xs: &[f64], label: &str, master: &mut StdRng, logger: &mut Logger, parameters: F) -> Result<Vec<SweepPoint>>
where
    F: Fn(f64, &mut StdRng) -> Result<(Vec<f64>, Vec<f64>)>,
{
    setup.validate()?;
    let mut points = Vec::with_capacity(xs.len());
    for &x in xs {
        let mut pooled = PooledStat::default();
        for _ in 0..setup.sims {
            let mut rng = run_rng(master);
            let (reserve_prices, min_increments) = parameters(x, &mut rng)?;
            let outcome = setup.engine(reserve_prices, min_increments)?.run(setup.n, None, &mut rng, logger)?;
            pooled.add(&RunStat::new(&outcome));
        }
        let point = SweepPoint {
            x,
            mean_price: pooled.mean_price(),
            mean_bids: pooled.mean_bids(),
            capped_runs: pooled.capped_runs,
        };
        logln!(logger, LogEvent::Experiment, "{} ({}) {} = {:.4}: mean price {:.4}, mean bids {:.2}",
            setup.valuation_model, setup.sims, label, x, point.mean_price, point.mean_bids);
        report_capped(&point, label, logger);
        points.push(point);
    }
    Ok(points)
}

/// Mean final price and accepted bids of sold objects for each base reserve price
pub fn revenue_by_reserve(setup: &ExperimentSetup, reserve_prices: &[f64], increment: f64, master: &mut StdRng, logger: &mut Logger) -> Result<Vec<SweepPoint>> {
    sweep(setup, reserve_prices, "reserve", master, logger, |reserve, rng| setup.general_parameters(reserve, increment, rng))
}

/// Mean final price and accepted bids of sold objects for each base minimum increment
pub fn revenue_by_increment(setup: &ExperimentSetup, increments: &[f64], reserve: f64, master: &mut StdRng, logger: &mut Logger) -> Result<Vec<SweepPoint>> {
    sweep(setup, increments, "increment", master, logger, |increment, rng| setup.general_parameters(reserve, increment, rng))
}

/// Mean accepted bids per sold object as the number of potential bidders grows
pub fn bids_by_population(
    setup: &ExperimentSetup,
    populations: &[usize],
    reserve: f64,
    increment: f64,
    master: &mut StdRng,
    logger: &mut Logger,
) -> Result<Vec<(usize, f64)>> {
    let mut points = Vec::with_capacity(populations.len());
    for &n in populations {
        let sized = ExperimentSetup { n, ..setup.clone() };
        let point = sweep(&sized, &[increment], "increment", master, logger, |d, rng| sized.general_parameters(reserve, d, rng))?;
        points.push((n, point[0].mean_bids));
    }
    Ok(points)
}

/// Win probability for every arrival position at one increment
#[derive(Debug, Clone, PartialEq)]
pub struct PositionCurve {
    pub increment: f64,
    /// Index k holds the probability that the buyer arriving k-th (0-based) wins an object
    pub win_probability: Vec<f64>,
}

/// Probability that the buyer at each arrival position wins at least one object
pub fn win_probability_by_position(setup: &ExperimentSetup, increments: &[f64], master: &mut StdRng, logger: &mut Logger) -> Result<Vec<PositionCurve>> {
    setup.validate()?;
    let mut curves = Vec::with_capacity(increments.len());
    for &increment in increments {
        let mut wins = vec![0usize; setup.n];
        for _ in 0..setup.sims {
            let mut rng = run_rng(master);
            let order = setup.population(&mut rng)?;
            let (reserve_prices, min_increments) = setup.general_parameters(0.0, increment, &mut rng)?;
            let ids: Vec<usize> = order.iter().map(|b| b.buyer_id).collect();
            let outcome = setup.engine(reserve_prices, min_increments)?.run(setup.n, Some(order), &mut rng, logger)?;
            for (position, id) in ids.into_iter().enumerate() {
                if outcome.won_any(id) {
                    wins[position] += 1;
                }
            }
        }
        let win_probability: Vec<f64> = wins.iter().map(|&w| w as f64 / setup.sims as f64).collect();
        logln!(logger, LogEvent::Experiment, "{} increment = {:.4}: win probability by position {:?}",
            setup.valuation_model, increment, win_probability.iter().map(|p| format!("{:.3}", p)).collect::<Vec<_>>());
        curves.push(PositionCurve { increment, win_probability });
    }
    Ok(curves)
}

/// Where the tracked buyer is placed in the arrival order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    First,
    Random,
    Last,
}

impl Placement {
    pub const ALL: [Placement; 3] = [Placement::First, Placement::Random, Placement::Last];

    pub fn name(&self) -> &'static str {
        match self {
            Placement::First => "first",
            Placement::Random => "random",
            Placement::Last => "last",
        }
    }
}

/// Win probability and expected profit of the tracked buyer for one placement
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlacementStat {
    pub win_probability: f64,
    pub expected_profit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KthBidderPoint {
    pub increment: f64,
    /// Indexed like Placement::ALL
    pub placements: [PlacementStat; 3],
    /// Mean common value V drawn by the tracked buyer, None unless the model draws one
    pub mean_common_value: Option<f64>,
}

impl KthBidderPoint {
    pub fn get(&self, placement: Placement) -> PlacementStat {
        self.placements[placement as usize]
    }
}

/// Track the buyer with the k-th highest mean valuation placed first, at random and last
///
/// Every placement runs on its own copy of the same population, with the same reserve prices and
/// minimum increments.
pub fn kth_bidder_by_position(
    setup: &ExperimentSetup,
    k: usize,
    increments: &[f64],
    master: &mut StdRng,
    logger: &mut Logger,
) -> Result<Vec<KthBidderPoint>> {
    setup.validate()?;
    if k < 1 || k > setup.n {
        return Err(invalid(format!("k must be between 1 and {}, got {}", setup.n, k)));
    }

    let mut points = Vec::with_capacity(increments.len());
    for &increment in increments {
        let mut wins = [0usize; 3];
        let mut profits: [Vec<f64>; 3] = Default::default();
        let mut common_values = Vec::new();
        for _ in 0..setup.sims {
            let mut rng = run_rng(master);
            let order = setup.population(&mut rng)?;
            let target = kth_highest_index(&order, k)?;
            let target_id = order[target].buyer_id;
            common_values.extend(order[target].common_value);
            let (reserve_prices, min_increments) = setup.general_parameters(0.0, increment, &mut rng)?;
            let engine = setup.engine(reserve_prices, min_increments)?;

            for (slot, placement) in Placement::ALL.iter().enumerate() {
                let position = match placement {
                    Placement::First => 0,
                    Placement::Random => rng.gen_range(0..setup.n),
                    Placement::Last => setup.n - 1,
                };
                let reordered = with_buyer_at(&order, target, position)?;
                let outcome: MatchingOutcome = engine.run(setup.n, Some(reordered), &mut rng, logger)?;
                if outcome.won_any(target_id) {
                    wins[slot] += 1;
                }
                profits[slot].push(buyer_profit(&outcome, target_id));
            }
        }

        let mut placements = [PlacementStat::default(); 3];
        for slot in 0..3 {
            placements[slot] = PlacementStat {
                win_probability: wins[slot] as f64 / setup.sims as f64,
                expected_profit: mean(&profits[slot]),
            };
        }
        logln!(logger, LogEvent::Experiment, "{} k={} increment = {:.4}: win (first/random/last) {:.3} / {:.3} / {:.3}, profit {:.4} / {:.4} / {:.4}",
            setup.valuation_model, k, increment,
            placements[0].win_probability, placements[1].win_probability, placements[2].win_probability,
            placements[0].expected_profit, placements[1].expected_profit, placements[2].expected_profit);
        let mean_common_value = if common_values.is_empty() { None } else { Some(mean(&common_values)) };
        points.push(KthBidderPoint { increment, placements, mean_common_value });
    }
    Ok(points)
}

/// Revenue curve of one valuation model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCurve {
    pub model: ValuationModel,
    pub points: Vec<SweepPoint>,
}

/// Revenue and bids against the minimum increment for all three valuation models (reserve 0)
pub fn compare_models(setup: &ExperimentSetup, increments: &[f64], master: &mut StdRng, logger: &mut Logger) -> Result<Vec<ModelCurve>> {
    ValuationModel::all()
        .into_iter()
        .map(|model| {
            let model_setup = ExperimentSetup { valuation_model: model.clone(), ..setup.clone() };
            let points = revenue_by_increment(&model_setup, increments, 0.0, master, logger)?;
            Ok(ModelCurve { model, points })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinnersCursePoint {
    pub increment: f64,
    pub profit_independent: f64,
    pub profit_common_value: f64,
    /// Independent minus common value profit of the top bidder
    pub overpayment: f64,
    /// Mean V the top bidder drew under common values
    pub common_value: f64,
}

/// Profit the strongest bidder (arriving first) loses under common values compared to independent values
pub fn winners_curse(setup: &ExperimentSetup, increments: &[f64], master: &mut StdRng, logger: &mut Logger) -> Result<Vec<WinnersCursePoint>> {
    let independent = ExperimentSetup { valuation_model: ValuationModel::Independent, ..setup.clone() };
    let common = ExperimentSetup { valuation_model: ValuationModel::common_value(), ..setup.clone() };

    let mut points = Vec::with_capacity(increments.len());
    for &increment in increments {
        let ipv = kth_bidder_by_position(&independent, 1, &[increment], master, logger)?;
        let cv = kth_bidder_by_position(&common, 1, &[increment], master, logger)?;
        let profit_independent = ipv[0].get(Placement::First).expected_profit;
        let profit_common_value = cv[0].get(Placement::First).expected_profit;
        let common_value = cv[0]
            .mean_common_value
            .ok_or_else(|| invalid("common value population drew no common value"))?;
        let point = WinnersCursePoint {
            increment,
            profit_independent,
            profit_common_value,
            overpayment: profit_independent - profit_common_value,
            common_value,
        };
        logln!(logger, LogEvent::Experiment, "winner's curse increment = {:.4}: profit independent {:.4}, common value {:.4}, overpayment {:.4}, mean V {:.4}",
            increment, profit_independent, profit_common_value, point.overpayment, common_value);
        points.push(point);
    }
    Ok(points)
}
