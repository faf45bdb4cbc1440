use crate::buyer::BuyerId;
use crate::converge::MatchingOutcome;
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::utils::mean;

/// Aggregated results of one matching run
#[derive(Debug, Clone, PartialEq)]
pub struct RunStat {
    pub objects: usize,
    pub objects_sold: usize,
    pub total_revenue: f64,
    /// Final prices of sold objects, in object order
    pub sold_prices: Vec<f64>,
    /// Accepted bids of sold objects, in object order
    pub sold_bid_counts: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
    pub unassigned_buyers: usize,
}

impl RunStat {
    pub fn new(outcome: &MatchingOutcome) -> Self {
        let sold_prices: Vec<f64> = outcome.objects.iter().filter_map(|o| o.final_price()).collect();
        let sold_bid_counts: Vec<usize> = outcome.sold_objects().map(|o| o.bids_accepted).collect();
        Self {
            objects: outcome.objects.len(),
            objects_sold: sold_prices.len(),
            total_revenue: sold_prices.iter().sum(),
            sold_prices,
            sold_bid_counts,
            iterations: outcome.iterations,
            converged: outcome.converged(),
            unassigned_buyers: outcome.buyers.iter().filter(|b| b.active_object.is_none()).count(),
        }
    }

    pub fn mean_price(&self) -> f64 {
        mean(&self.sold_prices)
    }

    pub fn mean_bids(&self) -> f64 {
        let counts: Vec<f64> = self.sold_bid_counts.iter().map(|&c| c as f64).collect();
        mean(&counts)
    }

    pub fn printout(&self, logger: &mut Logger, event: LogEvent) {
        logln!(logger, event, "Objects (sold/offered): {} / {}", self.objects_sold, self.objects);
        logln!(logger, event, "Revenue (total/mean price): {:.4} / {:.4}", self.total_revenue, self.mean_price());
        logln!(logger, event, "Mean accepted bids per sold object: {:.2}", self.mean_bids());
        logln!(logger, event, "Unassigned buyers: {}", self.unassigned_buyers);
        logln!(logger, event, "Convergence: {} iterations{}", self.iterations, if self.converged { "" } else { " (iteration cap reached)" });
    }
}

/// Profit of a buyer: mean original valuation minus the sum of prices of every object it won,
/// 0.0 if it won nothing (or is unknown)
pub fn buyer_profit(outcome: &MatchingOutcome, buyer_id: BuyerId) -> f64 {
    let paid = outcome.prices_paid_by(buyer_id);
    if paid.is_empty() {
        return 0.0;
    }
    match outcome.buyer(buyer_id) {
        Some(buyer) => buyer.mean_original_valuation() - paid.iter().sum::<f64>(),
        None => 0.0,
    }
}

/// Pooled averages over many runs (sold objects from all runs weigh equally)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PooledStat {
    prices: Vec<f64>,
    bid_counts: Vec<f64>,
    pub runs: usize,
    pub capped_runs: usize,
}

impl PooledStat {
    pub fn add(&mut self, stat: &RunStat) {
        self.prices.extend_from_slice(&stat.sold_prices);
        self.bid_counts.extend(stat.sold_bid_counts.iter().map(|&c| c as f64));
        self.runs += 1;
        if !stat.converged {
            self.capped_runs += 1;
        }
    }

    /// Mean final price of sold objects, 0.0 when nothing sold
    pub fn mean_price(&self) -> f64 {
        mean(&self.prices)
    }

    /// Mean accepted bids per sold object, 0.0 when nothing sold
    pub fn mean_bids(&self) -> f64 {
        mean(&self.bid_counts)
    }
}
