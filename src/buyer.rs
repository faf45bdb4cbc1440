/// This file contains the Buyer struct.
///
/// A buyer holds one valuation per object and competes in at most one object at a time
/// (objects are perfect substitutes). Under the affiliated models the buyer revises its
/// valuations every pass from the public state of the objects.

use std::fmt;
use crate::object::{AuctionObject, ObjectId};
use crate::utils::clip_unit;
use crate::valuations::{AffiliationParams, ValuationDraw, ValuationModel};

pub type BuyerId = usize;

/// Extra weight given to the pull towards prices of similar objects
pub const SIMILAR_PRICE_WEIGHT: f64 = 1.2;

#[derive(Debug, Clone)]
pub struct Buyer {
    pub buyer_id: BuyerId,
    pub valuations: Vec<f64>,
    pub original_valuations: Vec<f64>,
    pub common_value: Option<f64>,
    pub active_object: Option<ObjectId>,
    pub adjustment_history: Vec<Vec<f64>>,
    pub model: ValuationModel,
    pub affiliation: AffiliationParams,
}

impl Buyer {
    /// Create a buyer from a sampled valuation draw
    pub fn new(buyer_id: BuyerId, draw: ValuationDraw, model: ValuationModel, affiliation: AffiliationParams) -> Self {
        Self {
            buyer_id,
            original_valuations: draw.valuations.clone(),
            valuations: draw.valuations,
            common_value: draw.common_value,
            active_object: None,
            adjustment_history: Vec::new(),
            model,
            affiliation,
        }
    }

    /// Create a buyer with given valuations
    pub fn with_valuations(buyer_id: BuyerId, valuations: Vec<f64>, model: ValuationModel, affiliation: AffiliationParams) -> Self {
        Self::new(buyer_id, ValuationDraw { valuations, common_value: None }, model, affiliation)
    }

    /// Current valuation for a 1-based object id, 0.0 when out of range
    pub fn valuation_for(&self, object_id: ObjectId) -> f64 {
        object_id
            .checked_sub(1)
            .and_then(|index| self.valuations.get(index))
            .copied()
            .unwrap_or(0.0)
    }

    /// Mean of the valuations the buyer was created with
    pub fn mean_original_valuation(&self) -> f64 {
        crate::utils::mean(&self.original_valuations)
    }

    pub fn can_bid(&self, object: &AuctionObject) -> bool {
        self.valuation_for(object.object_id) >= object.entry_price()
    }

    pub fn expected_profit(&self, object: &AuctionObject) -> f64 {
        self.valuation_for(object.object_id) - object.entry_price()
    }

    /// Revise valuations from the public state of `objects`
    ///
    /// All adjustments are computed against the valuations held before the call, the delta is
    /// appended to the adjustment history and the result is clipped to [0,1].
    /// Buyers with independent values never change.
    pub fn update_valuations(&mut self, objects: &[AuctionObject]) {
        if !self.model.is_affiliated() {
            return;
        }

        let previous = self.valuations.clone();
        let mut updated = previous.clone();
        let rate = self.affiliation.learning_rate * self.affiliation.affiliation_strength;

        for object in objects.iter().filter(|o| o.has_winner()) {
            let slot = match updated.get_mut(object.index()) {
                Some(slot) => slot,
                None => continue,
            };
            match self.model {
                ValuationModel::CommonValue { .. } => {
                    let info = object.public_info();
                    if info.observed_bids > 0 {
                        *slot += rate * info.bidding_intensity;
                    }
                }
                ValuationModel::CorrelatedPrivate { .. } => {
                    let group = match object.correlation_group() {
                        Some(group) => group,
                        None => continue,
                    };
                    let similar_prices: Vec<f64> = objects
                        .iter()
                        .filter(|o| o.object_id != object.object_id && o.correlation_group() == Some(group) && o.has_winner())
                        .map(|o| o.current_price)
                        .collect();
                    if !similar_prices.is_empty() {
                        let price_gap = crate::utils::mean(&similar_prices) - object.current_price;
                        *slot += rate * price_gap * SIMILAR_PRICE_WEIGHT;
                    }
                }
                ValuationModel::Independent => {}
            }
        }

        self.adjustment_history.push(updated.iter().zip(&previous).map(|(new, old)| new - old).collect());
        self.valuations = updated.into_iter().map(clip_unit).collect();
    }
}

impl fmt::Display for Buyer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID{}", self.buyer_id)
    }
}
