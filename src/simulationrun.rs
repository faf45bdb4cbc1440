/// This file contains the SimulationRun struct, which runs one single pass of the matching
/// dynamic (which is then repeated until nothing changes by converge.rs).
///
/// A pass has two phases:
/// - every buyer revises its valuations from the public state of the objects (affiliated models only)
/// - in arrival order, every buyer either leaves an object whose price passed its valuation
///   or, when unassigned, enters an object chosen by the entry rule bidding its full valuation
///
/// We support two entry rules
/// - MaxExpectedProfit: object with the largest positive valuation - entry price
/// - LowestEntryPrice: cheapest object the buyer can bid on, without a profit filter

use std::sync::atomic::Ordering;
use crate::buyer::Buyer;
use crate::object::AuctionObject;
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::utils::VERBOSE_BIDS;

/// Rule an unassigned buyer uses to pick the object it enters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryRule {
    #[default]
    MaxExpectedProfit,
    LowestEntryPrice,
}

impl EntryRule {
    /// Index of the object the buyer enters, None if it stays out
    /// Ties keep the first object in object order
    pub fn choose(&self, buyer: &Buyer, objects: &[AuctionObject]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, object) in objects.iter().enumerate() {
            if !buyer.can_bid(object) {
                continue;
            }
            match self {
                EntryRule::MaxExpectedProfit => {
                    let profit = buyer.expected_profit(object);
                    if profit > 0.0 && best.map_or(true, |(_, top)| profit > top) {
                        best = Some((index, profit));
                    }
                }
                EntryRule::LowestEntryPrice => {
                    let price = object.entry_price();
                    if best.map_or(true, |(_, lowest)| price < lowest) {
                        best = Some((index, price));
                    }
                }
            }
        }
        best.map(|(index, _)| index)
    }
}

/// CSV header matching the rows written on LogEvent::Bid
pub const BID_CSV_HEADER: &str = "pass,buyer_id,object_id,amount,accepted,current_price,highest_bid,second_highest_bid";

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationRun {
    pub pass: usize,
    pub exits: usize,
    pub entries: usize,
    pub rejected_bids: usize,
}

impl SimulationRun {
    /// Run a single pass over `buyers` (arrival order) and `objects`
    pub fn new(
        objects: &mut [AuctionObject],
        buyers: &mut [Buyer],
        entry_rule: EntryRule,
        pass: usize,
        logger: &mut Logger,
    ) -> Self {
        let mut run = SimulationRun { pass, ..Default::default() };
        let verbose_bids = VERBOSE_BIDS.load(Ordering::Relaxed) && logger.is_listening(LogEvent::Bid);

        // Phase 1: every buyer reads the same object state, objects are not touched here
        for buyer in buyers.iter_mut() {
            buyer.update_valuations(objects);
        }

        // Phase 2: exits and entries in arrival order
        for buyer in buyers.iter_mut() {
            if let Some(object_id) = buyer.active_object {
                let price = objects[object_id - 1].current_price;
                if buyer.valuation_for(object_id) < price {
                    buyer.active_object = None;
                    run.exits += 1;
                }
            }

            if buyer.active_object.is_none() {
                if let Some(index) = entry_rule.choose(buyer, objects) {
                    let object = &mut objects[index];
                    let amount = buyer.valuation_for(object.object_id);
                    let accepted = object.register_bid(buyer.buyer_id, amount);
                    if verbose_bids {
                        logln!(logger, LogEvent::Bid, "{},{},{},{:.6},{},{:.6},{:.6},{:.6}",
                            pass,
                            buyer.buyer_id,
                            object.object_id,
                            amount,
                            accepted,
                            object.current_price,
                            object.highest_bid,
                            object.second_highest_bid
                        );
                    }
                    if accepted {
                        buyer.active_object = Some(object.object_id);
                        run.entries += 1;
                    } else {
                        run.rejected_bids += 1;
                    }
                }
            }
        }

        run
    }

    /// True if any buyer changed assignment during the pass
    pub fn changed(&self) -> bool {
        self.exits + self.entries > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuations::{AffiliationParams, ValuationModel};

    fn buyer(id: usize, valuations: Vec<f64>) -> Buyer {
        Buyer::with_valuations(id, valuations, ValuationModel::Independent, AffiliationParams::default())
    }

    #[test]
    fn test_max_profit_ties_go_to_first_object() {
        let objects = vec![AuctionObject::new(1, 0.0, 0.1), AuctionObject::new(2, 0.0, 0.1)];
        let b = buyer(1, vec![0.9, 0.9]);
        assert_eq!(EntryRule::MaxExpectedProfit.choose(&b, &objects), Some(0));
        assert_eq!(EntryRule::LowestEntryPrice.choose(&b, &objects), Some(0));
    }

    #[test]
    fn test_max_profit_requires_positive_profit() {
        let objects = vec![AuctionObject::new(1, 0.4, 0.1)];
        let b = buyer(1, vec![0.4]);
        // Can bid (valuation equals reserve) but expects zero profit
        assert!(b.can_bid(&objects[0]));
        assert_eq!(EntryRule::MaxExpectedProfit.choose(&b, &objects), None);
        // The baseline rule has no profit filter
        assert_eq!(EntryRule::LowestEntryPrice.choose(&b, &objects), Some(0));
    }

    #[test]
    fn test_rules_can_disagree() {
        let mut objects = vec![AuctionObject::new(1, 0.1, 0.1), AuctionObject::new(2, 0.2, 0.1)];
        objects[0].register_bid(9, 0.15);
        // Entry prices: 0.2 and 0.2; valuations make the second more profitable
        let b = buyer(1, vec![0.3, 0.8]);
        assert_eq!(EntryRule::MaxExpectedProfit.choose(&b, &objects), Some(1));
        assert_eq!(EntryRule::LowestEntryPrice.choose(&b, &objects), Some(0));
    }

    #[test]
    fn test_single_pass_exit_and_entry() {
        let mut logger = Logger::new();
        let mut objects = vec![AuctionObject::new(1, 0.0, 0.1)];
        let mut buyers = vec![buyer(1, vec![0.8]), buyer(2, vec![0.3])];

        let first = SimulationRun::new(&mut objects, &mut buyers, EntryRule::MaxExpectedProfit, 1, &mut logger);
        assert_eq!(first.entries, 2);
        assert_eq!(first.exits, 0);
        assert!((objects[0].current_price - 0.4).abs() < 1e-12);

        // Buyer 2 is now priced out and leaves, nobody else can enter
        let second = SimulationRun::new(&mut objects, &mut buyers, EntryRule::MaxExpectedProfit, 2, &mut logger);
        assert_eq!(second.exits, 1);
        assert_eq!(second.entries, 0);
        assert_eq!(buyers[1].active_object, None);

        let third = SimulationRun::new(&mut objects, &mut buyers, EntryRule::MaxExpectedProfit, 3, &mut logger);
        assert!(!third.changed());
        assert_eq!(objects[0].winner, Some(1));
    }
}
