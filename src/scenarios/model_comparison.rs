/// This scenario compares revenue under the three valuation models and measures the winner's
/// curse of the strongest buyer.
///
/// It validates:
/// - Every model sells objects at every increment of the sweep
/// - Common value buyers only ever revise valuations upwards
/// - Independent buyers keep no adjustment history, affiliated buyers record one
/// - The overpayment reported equals the profit gap between the two models

use rand::{rngs::StdRng, Rng, SeedableRng};
use crate::converge::{MarketConfig, MatchingConverge};
use crate::experiments::{compare_models, general_parameters, winners_curse, ExperimentSetup};
use crate::utils::get_seed;
use crate::valuations::ValuationModel;
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::errln;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "model_comparison",
    run,
});

const UPDATE_RUNS: usize = 30;

fn check(ok: bool, msg: String, errors: &mut Vec<String>, logger: &mut Logger) {
    if ok {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let setup = ExperimentSetup::default();
    let increments = [0.005, 0.05, 0.15];
    let mut errors: Vec<String> = Vec::new();

    logln!(logger, LogEvent::Scenario, "=== Revenue vs minimum increment by valuation model ===");
    let curves = compare_models(&setup, &increments, &mut StdRng::seed_from_u64(get_seed(50)), logger)?;
    for curve in &curves {
        for point in &curve.points {
            logln!(logger, LogEvent::Scenario, "{} increment {:.3}: mean price {:.4}, mean bids {:.2}",
                curve.model, point.x, point.mean_price, point.mean_bids);
        }
        check(
            curve.points.iter().all(|p| p.mean_bids >= 1.0),
            format!("{}: objects sell at every increment", curve.model),
            &mut errors,
            logger,
        );
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Valuation updates ===");
    let mut master = StdRng::seed_from_u64(get_seed(51));
    for model in ValuationModel::all() {
        let mut never_lowered = true;
        let mut buyers_adjusting = 0;
        for _ in 0..UPDATE_RUNS {
            let mut rng = StdRng::seed_from_u64(master.gen());
            let (reserve_prices, min_increments) = general_parameters(setup.m, 0.0, 0.02, setup.sigma_reserve, setup.sigma_increment, &mut rng)?;
            let engine = MatchingConverge::new(MarketConfig {
                valuation_model: model.clone(),
                ..MarketConfig::new(reserve_prices, min_increments)
            })?;
            let outcome = engine.run(setup.n, None, &mut rng, logger)?;
            for buyer in &outcome.buyers {
                if !buyer.adjustment_history.is_empty() {
                    buyers_adjusting += 1;
                }
                if buyer.valuations.iter().zip(&buyer.original_valuations).any(|(now, before)| now < before) {
                    never_lowered = false;
                }
            }
        }
        logln!(logger, LogEvent::Scenario, "{}: {} buyers recorded adjustments over {} runs", model, buyers_adjusting, UPDATE_RUNS);

        match model {
            ValuationModel::CommonValue { .. } => {
                check(never_lowered, format!("{}: valuations never fall below the original draw", model), &mut errors, logger);
            }
            ValuationModel::CorrelatedPrivate { .. } => {
                check(buyers_adjusting > 0, format!("{}: buyers record valuation adjustments: {}", model, buyers_adjusting), &mut errors, logger);
            }
            ValuationModel::Independent => {
                check(buyers_adjusting == 0, format!("{}: no buyer records valuation adjustments: {}", model, buyers_adjusting), &mut errors, logger);
            }
        }
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Winner's curse of the strongest buyer ===");
    let curse = winners_curse(&setup, &increments, &mut StdRng::seed_from_u64(get_seed(52)), logger)?;
    for point in &curse {
        logln!(logger, LogEvent::Scenario, "increment {:.3}: profit independent {:.4}, common value {:.4}, overpayment {:.4}, mean V of the strongest buyer {:.4}",
            point.increment, point.profit_independent, point.profit_common_value, point.overpayment, point.common_value);
        check(
            (point.overpayment - (point.profit_independent - point.profit_common_value)).abs() < 1e-12,
            format!("Increment {:.3}: overpayment is the profit gap", point.increment),
            &mut errors,
            logger,
        );
    }

    if !errors.is_empty() {
        return Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, errors.join("\n")).into());
    }

    Ok(())
}
