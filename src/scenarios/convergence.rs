/// This scenario runs the matching engine on random markets under every valuation model and on
/// the two hand-computed markets.
///
/// It validates:
/// - Every run halts by convergence well before the iteration cap
/// - Object prices never decrease from one pass to the next
/// - Buyer valuations stay in [0, 1] after all updates
/// - Two objects, three buyers (0.9, 0.5, 0.2), reserves 0 and increments 0.1: the two strongest
///   buyers win one object each and the weakest stays out
/// - One object, buyers 0.8 and 0.3, increment 0.05: the 0.8 buyer wins at 0.35
/// - The lowest-entry-price baseline rule also converges on stepped markets

use rand::{rngs::StdRng, Rng, SeedableRng};
use crate::buyer::Buyer;
use crate::converge::{EntryRule, MarketConfig, MatchingConverge, MatchingOutcome};
use crate::experiments::{general_parameters, stepped_parameters};
use crate::stats::RunStat;
use crate::utils::get_seed;
use crate::valuations::{AffiliationParams, ValuationModel};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::errln;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "convergence",
    run,
});

const RANDOM_MARKETS: usize = 50;

fn check(ok: bool, msg: String, errors: &mut Vec<String>, logger: &mut Logger) {
    if ok {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }
}

fn prices_monotone(outcome: &MatchingOutcome) -> bool {
    outcome.price_history.windows(2).all(|w| w[0].iter().zip(&w[1]).all(|(before, after)| after >= before))
}

fn fixed_order(valuations: &[Vec<f64>]) -> Vec<Buyer> {
    valuations
        .iter()
        .enumerate()
        .map(|(i, v)| Buyer::with_valuations(i + 1, v.clone(), ValuationModel::Independent, AffiliationParams::default()))
        .collect()
}

fn independent_engine(reserves: Vec<f64>, increments: Vec<f64>) -> Result<MatchingConverge, Box<dyn std::error::Error>> {
    Ok(MatchingConverge::new(MarketConfig {
        valuation_model: ValuationModel::Independent,
        feature_correlation: None,
        ..MarketConfig::new(reserves, increments)
    })?)
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut errors: Vec<String> = Vec::new();
    let mut master = StdRng::seed_from_u64(get_seed(1));

    for model in ValuationModel::all() {
        logln!(logger, LogEvent::Scenario, "");
        logln!(logger, LogEvent::Scenario, "=== Random markets: {} ===", model);

        let mut converged = 0;
        let mut monotone = 0;
        let mut in_range = 0;
        let mut max_iterations = 0;
        for _ in 0..RANDOM_MARKETS {
            let mut rng = StdRng::seed_from_u64(master.gen());
            let n = rng.gen_range(2..=15);
            let m = rng.gen_range(1..=6);
            let reserve_base = rng.gen_range(0.0..0.3);
            let increment_base = rng.gen_range(0.001..0.1);
            let (reserve_prices, min_increments) = general_parameters(m, reserve_base, increment_base, 0.05, 0.002, &mut rng)?;
            let engine = MatchingConverge::new(MarketConfig {
                valuation_model: model.clone(),
                ..MarketConfig::new(reserve_prices, min_increments)
            })?;
            let outcome = engine.run(n, None, &mut rng, logger)?;

            if outcome.converged() {
                converged += 1;
            }
            if prices_monotone(&outcome) {
                monotone += 1;
            }
            if outcome.buyers.iter().all(|b| b.valuations.iter().all(|v| (0.0..=1.0).contains(v))) {
                in_range += 1;
            }
            max_iterations = max_iterations.max(outcome.iterations);
        }
        logln!(logger, LogEvent::Scenario, "Longest run: {} passes", max_iterations);

        check(converged == RANDOM_MARKETS, format!("{}: runs converged: {} / {}", model, converged, RANDOM_MARKETS), &mut errors, logger);
        check(monotone == RANDOM_MARKETS, format!("{}: runs with non-decreasing prices: {} / {}", model, monotone, RANDOM_MARKETS), &mut errors, logger);
        check(in_range == RANDOM_MARKETS, format!("{}: runs with valuations in [0, 1]: {} / {}", model, in_range, RANDOM_MARKETS), &mut errors, logger);
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Two objects, three buyers ===");
    let engine = independent_engine(vec![0.0, 0.0], vec![0.1, 0.1])?;
    let order = fixed_order(&[vec![0.9, 0.9], vec![0.5, 0.5], vec![0.2, 0.2]]);
    let outcome = engine.run(3, Some(order), &mut StdRng::seed_from_u64(get_seed(2)), logger)?;
    RunStat::new(&outcome).printout(logger, LogEvent::Scenario);

    let winners: Vec<Option<usize>> = outcome.objects.iter().map(|o| o.winner).collect();
    let prices: Vec<f64> = outcome.objects.iter().map(|o| o.current_price).collect();
    check(
        winners == vec![Some(1), Some(2)],
        format!("0.9 buyer wins object 1, 0.5 buyer wins object 2: winners {:?}", winners),
        &mut errors,
        logger,
    );
    check(
        outcome.buyer(3).map_or(false, |b| b.active_object.is_none()),
        "0.2 buyer stays unassigned".to_string(),
        &mut errors,
        logger,
    );
    check(
        prices.iter().all(|p| (p - 0.3).abs() < 1e-9),
        format!("Both objects close at the 0.2 bid plus increment: {:.4} / {:.4}", prices[0], prices[1]),
        &mut errors,
        logger,
    );

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== One object, two buyers ===");
    for valuations in [vec![vec![0.8], vec![0.3]], vec![vec![0.3], vec![0.8]]] {
        let engine = independent_engine(vec![0.0], vec![0.05])?;
        let strong_id = if valuations[0][0] > valuations[1][0] { 1 } else { 2 };
        let outcome = engine.run(2, Some(fixed_order(&valuations)), &mut StdRng::seed_from_u64(get_seed(3)), logger)?;
        let object = &outcome.objects[0];
        check(
            object.winner == Some(strong_id) && (object.current_price - 0.35).abs() < 1e-9,
            format!("Arrival {:?}: 0.8 buyer wins at 0.35: winner {:?}, price {:.4}", valuations, object.winner, object.current_price),
            &mut errors,
            logger,
        );
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Baseline entry rule on stepped markets ===");
    let (reserve_prices, min_increments) = stepped_parameters(4, 0.0, 0.01, 0.05, 0.005);
    let engine = MatchingConverge::new(MarketConfig {
        valuation_model: ValuationModel::Independent,
        entry_rule: EntryRule::LowestEntryPrice,
        feature_correlation: None,
        ..MarketConfig::new(reserve_prices, min_increments)
    })?;
    let mut converged = 0;
    for _ in 0..RANDOM_MARKETS {
        let mut rng = StdRng::seed_from_u64(master.gen());
        if engine.run(8, None, &mut rng, logger)?.converged() {
            converged += 1;
        }
    }
    check(converged == RANDOM_MARKETS, format!("Baseline rule runs converged: {} / {}", converged, RANDOM_MARKETS), &mut errors, logger);

    if !errors.is_empty() {
        return Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, errors.join("\n")).into());
    }

    Ok(())
}
