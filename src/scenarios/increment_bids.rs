/// This scenario looks at how many bids an object collects.
///
/// It validates:
/// - A larger minimum increment means fewer accepted bids per sold object
/// - More potential bidders means more accepted bids per sold object

use rand::{rngs::StdRng, SeedableRng};
use crate::experiments::{bids_by_population, revenue_by_increment, ExperimentSetup};
use crate::utils::get_seed;
use crate::valuations::ValuationModel;
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::errln;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "increment_bids",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let setup = ExperimentSetup {
        valuation_model: ValuationModel::Independent,
        ..ExperimentSetup::default()
    };

    logln!(logger, LogEvent::Scenario, "=== Scenario: Bids vs minimum increment ===");
    let increments = [0.001, 0.05, 0.2];
    let points = revenue_by_increment(&setup, &increments, 0.0, &mut StdRng::seed_from_u64(get_seed(20)), logger)?;
    for point in &points {
        logln!(logger, LogEvent::Scenario, "increment {:.3}: mean bids {:.2}, mean price {:.4}", point.x, point.mean_bids, point.mean_price);
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Scenario: Bids vs potential bidders ===");
    let populations = [3, 10, 30];
    let by_population = bids_by_population(&setup, &populations, 0.0, 0.01, &mut StdRng::seed_from_u64(get_seed(21)), logger)?;
    for (n, bids) in &by_population {
        logln!(logger, LogEvent::Scenario, "n = {}: mean bids {:.2}", n, bids);
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Validation Results ===");
    let mut errors: Vec<String> = Vec::new();

    let (small, large) = (&points[0], &points[points.len() - 1]);
    let msg = format!(
        "Increment {:.3} collects more bids than increment {:.3}: {:.2} > {:.2}",
        small.x, large.x, small.mean_bids, large.mean_bids
    );
    if small.mean_bids > large.mean_bids {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    let (few, many) = (by_population[0], by_population[by_population.len() - 1]);
    let msg = format!("{} bidders place more bids than {} bidders: {:.2} > {:.2}", many.0, few.0, many.1, few.1);
    if many.1 > few.1 {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errors.push(msg.clone());
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
    }

    if !errors.is_empty() {
        return Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, errors.join("\n")).into());
    }

    Ok(())
}
