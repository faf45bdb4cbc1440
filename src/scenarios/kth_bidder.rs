/// This scenario tracks the strongest and the weakest buyer (by mean valuation) while moving
/// them to the front, a random slot, and the back of the arrival order.
///
/// It validates:
/// - The strongest buyer wins more often than the weakest one in every placement
/// - The strongest buyer expects a positive profit in every placement

use rand::{rngs::StdRng, SeedableRng};
use crate::experiments::{kth_bidder_by_position, ExperimentSetup, KthBidderPoint, Placement};
use crate::utils::get_seed;
use crate::valuations::ValuationModel;
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::errln;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "kth_bidder",
    run,
});

fn print_points(label: &str, points: &[KthBidderPoint], logger: &mut Logger) {
    for point in points {
        for placement in Placement::ALL {
            let stat = point.get(placement);
            logln!(logger, LogEvent::Scenario, "{} increment {:.3} placed {}: win {:.3}, profit {:.4}",
                label, point.increment, placement.name(), stat.win_probability, stat.expected_profit);
        }
    }
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: k-th highest bidder by placement (independent values) ===");

    let setup = ExperimentSetup {
        valuation_model: ValuationModel::Independent,
        ..ExperimentSetup::default()
    };
    let increments = [0.01, 0.1];
    let mut master = StdRng::seed_from_u64(get_seed(40));
    let strongest = kth_bidder_by_position(&setup, 1, &increments, &mut master, logger)?;
    let weakest = kth_bidder_by_position(&setup, setup.n, &increments, &mut master, logger)?;
    print_points("k=1", &strongest, logger);
    print_points(&format!("k={}", setup.n), &weakest, logger);

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Validation Results ===");
    let mut errors: Vec<String> = Vec::new();

    for (top, bottom) in strongest.iter().zip(&weakest) {
        for placement in Placement::ALL {
            let (t, b) = (top.get(placement), bottom.get(placement));
            let msg = format!(
                "Increment {:.3} placed {}: strongest wins more often than weakest: {:.3} > {:.3}",
                top.increment, placement.name(), t.win_probability, b.win_probability
            );
            if t.win_probability > b.win_probability {
                logln!(logger, LogEvent::Scenario, "✓ {}", msg);
            } else {
                errors.push(msg.clone());
                errln!(logger, LogEvent::Scenario, "✗ {}", msg);
            }

            let msg = format!(
                "Increment {:.3} placed {}: strongest expects a positive profit: {:.4}",
                top.increment, placement.name(), t.expected_profit
            );
            if t.expected_profit > 0.0 {
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
