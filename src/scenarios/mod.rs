use std::error::Error;
use crate::logger::Logger;

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

// Create an inventory collection for scenario entries
inventory::collect!(ScenarioEntry);

/// Get all registered scenarios from the catalog, sorted by name
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut catalog: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>
        .into_iter()
        .cloned()
        .collect();
    catalog.sort_by_key(|entry| entry.short_name);
    catalog
}

// Scenario modules
pub mod convergence;
pub mod reserve_sweep;
pub mod increment_bids;
pub mod arrival_position;
pub mod kth_bidder;
pub mod model_comparison;
