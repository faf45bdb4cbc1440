/// This scenario measures how the arrival position of a buyer affects its chance to win.
///
/// It validates that position win probabilities are proper probabilities and that, per run,
/// between one and m buyers end up winning (summed over positions).

use rand::{rngs::StdRng, SeedableRng};
use crate::experiments::{win_probability_by_position, ExperimentSetup};
use crate::utils::get_seed;
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::errln;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "arrival_position",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let setup = ExperimentSetup::default();
    let mut errors: Vec<String> = Vec::new();
    let mut master = StdRng::seed_from_u64(get_seed(30));

    for model in crate::valuations::ValuationModel::all() {
        logln!(logger, LogEvent::Scenario, "");
        logln!(logger, LogEvent::Scenario, "=== Win probability by arrival position: {} ===", model);
        let model_setup = ExperimentSetup { valuation_model: model.clone(), ..setup.clone() };
        let curves = win_probability_by_position(&model_setup, &[0.001, 0.1], &mut master, logger)?;

        for curve in &curves {
            let formatted: Vec<String> = curve.win_probability.iter().map(|p| format!("{:.2}", p)).collect();
            logln!(logger, LogEvent::Scenario, "increment {:.3}: {}", curve.increment, formatted.join(" "));

            let expected_winners: f64 = curve.win_probability.iter().sum();
            let msg = format!(
                "{} increment {:.3}: expected winners per run lie in [1, {}]: {:.3}",
                model, curve.increment, setup.m, expected_winners
            );
            let valid = curve.win_probability.iter().all(|p| (0.0..=1.0).contains(p))
                && expected_winners >= 1.0 - 1e-9
                && expected_winners <= setup.m as f64 + 1e-9;
            if valid {
                logln!(logger, LogEvent::Scenario, "✓ {}", msg);
            } else {
                errors.push(msg.clone());
                errln!(logger, LogEvent::Scenario, "✗ {}", msg);
            }
        }
    }

    if !errors.is_empty() {
        return Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, errors.join("\n")).into());
    }

    Ok(())
}
