/// This file contains the per-object proxy auction.
///
/// Each auctioned object runs its own second-price-with-increment auction: buyers declare a
/// maximum valuation once and the visible price only rises as far as needed to beat the
/// runner-up. Objects also expose public information (bid count, bidding intensity, price)
/// which affiliated buyers use to revise their valuations.

pub type ObjectId = usize;
pub use crate::buyer::BuyerId;

/// Weights mapping the latent feature vector onto latent quality
pub const LATENT_QUALITY_WEIGHTS: [f64; 3] = [0.3, 0.34, 0.33];

/// Latent description of an object in the affiliated market
/// Objects sharing a correlation group are treated as similar by correlated private buyers
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProfile {
    pub feature_vector: [f64; 3],
    pub correlation_group: usize,
    pub latent_quality: f64,
}

/// One accepted bid as seen by everybody
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedBid {
    pub bidder: BuyerId,
    pub amount: f64,
    pub sequence: usize,
}

/// Read-only snapshot of what buyers can observe about an object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublicInfo {
    pub observed_bids: usize,
    pub bidding_intensity: f64,
    pub current_price: f64,
    pub has_winner: bool,
}

/// Proxy auction state of a single object
#[derive(Debug, Clone)]
pub struct AuctionObject {
    pub object_id: ObjectId,
    pub reserve_price: f64,
    pub min_increment: f64,
    pub current_price: f64,
    pub highest_bid: f64,
    pub second_highest_bid: f64,
    pub winner: Option<BuyerId>,
    pub bids_accepted: usize,
    pub profile: Option<ObjectProfile>,
    pub observed_bids: Vec<ObservedBid>,
    pub bidding_intensity: f64,
    pub intensity_history: Vec<f64>,
}

impl AuctionObject {
    /// Create an empty object without a latent profile
    pub fn new(object_id: ObjectId, reserve_price: f64, min_increment: f64) -> Self {
        Self {
            object_id,
            reserve_price,
            min_increment,
            current_price: 0.0,
            highest_bid: 0.0,
            second_highest_bid: 0.0,
            winner: None,
            bids_accepted: 0,
            profile: None,
            observed_bids: Vec::new(),
            bidding_intensity: 0.0,
            intensity_history: Vec::new(),
        }
    }

    /// Create an empty object carrying a latent profile (affiliated market)
    pub fn with_profile(object_id: ObjectId, reserve_price: f64, min_increment: f64, profile: ObjectProfile) -> Self {
        Self {
            profile: Some(profile),
            ..Self::new(object_id, reserve_price, min_increment)
        }
    }

    /// Position of this object in the engine's object vector
    pub fn index(&self) -> usize {
        self.object_id - 1
    }

    pub fn correlation_group(&self) -> Option<usize> {
        self.profile.as_ref().map(|p| p.correlation_group)
    }

    pub fn has_winner(&self) -> bool {
        self.winner.is_some()
    }

    /// Minimum declared valuation that gets a bid admitted
    pub fn entry_price(&self) -> f64 {
        match self.winner {
            None => self.reserve_price,
            Some(_) => self.current_price + self.min_increment,
        }
    }

    /// Register a proxy bid with declared maximum valuation `bid_max`
    ///
    /// Returns false and leaves the object untouched when the bid is below the entry price.
    pub fn register_bid(&mut self, buyer: BuyerId, bid_max: f64) -> bool {
        if bid_max < self.entry_price() {
            return false;
        }
        self.bids_accepted += 1;

        // Public information uses the price from before this bid moves it
        let sequence = self.observed_bids.len();
        self.observed_bids.push(ObservedBid { bidder: buyer, amount: bid_max, sequence });
        if self.observed_bids.len() >= 2 {
            let recent = &self.observed_bids[self.observed_bids.len() - 2..];
            let recent_mean = (recent[0].amount + recent[1].amount) / 2.0;
            self.bidding_intensity = recent_mean - self.current_price;
            self.intensity_history.push(self.bidding_intensity);
        }

        match self.winner {
            None => {
                self.highest_bid = bid_max;
                self.winner = Some(buyer);
                self.current_price = self.reserve_price;
            }
            Some(_) => {
                if bid_max > self.highest_bid {
                    self.second_highest_bid = self.highest_bid;
                    self.highest_bid = bid_max;
                    self.winner = Some(buyer);
                } else {
                    self.second_highest_bid = self.second_highest_bid.max(bid_max);
                }
                self.current_price = self.highest_bid.min(self.second_highest_bid + self.min_increment);
            }
        }
        true
    }

    pub fn public_info(&self) -> PublicInfo {
        PublicInfo {
            observed_bids: self.observed_bids.len(),
            bidding_intensity: self.bidding_intensity,
            current_price: self.current_price,
            has_winner: self.winner.is_some(),
        }
    }

    /// Final price paid, None when the object stays unsold
    pub fn final_price(&self) -> Option<f64> {
        self.winner.map(|_| self.current_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(object: &AuctionObject) -> (f64, f64, f64, Option<BuyerId>, usize, usize, f64) {
        (
            object.current_price,
            object.highest_bid,
            object.second_highest_bid,
            object.winner,
            object.bids_accepted,
            object.observed_bids.len(),
            object.bidding_intensity,
        )
    }

    #[test]
    fn test_entry_price_before_and_after_first_bid() {
        let mut object = AuctionObject::new(1, 0.2, 0.05);
        assert_eq!(object.entry_price(), 0.2);
        assert!(object.register_bid(1, 0.7));
        // First admitted bid opens the auction at the reserve
        assert_eq!(object.current_price, 0.2);
        assert!((object.entry_price() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_single_object_two_buyers() {
        let mut object = AuctionObject::new(1, 0.0, 0.05);
        assert!(object.register_bid(1, 0.8));
        assert!(object.register_bid(2, 0.3));
        assert_eq!(object.winner, Some(1));
        assert!((object.current_price - 0.35).abs() < 1e-12);
        assert_eq!(object.bids_accepted, 2);
    }

    #[test]
    fn test_new_leader_pushes_old_leader_to_second() {
        let mut object = AuctionObject::new(1, 0.0, 0.1);
        assert!(object.register_bid(1, 0.4));
        assert!(object.register_bid(2, 0.9));
        assert_eq!(object.winner, Some(2));
        assert_eq!(object.highest_bid, 0.9);
        assert_eq!(object.second_highest_bid, 0.4);
        assert!((object.current_price - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_price_invariant_after_valid_bids() {
        let mut object = AuctionObject::new(1, 0.1, 0.03);
        let bids = [0.5, 0.2, 0.45, 0.95, 0.6, 0.9];
        for (i, &bid) in bids.iter().enumerate() {
            if bid >= object.entry_price() {
                assert!(object.register_bid(i + 1, bid));
                let expected = object.highest_bid.min(object.second_highest_bid + object.min_increment);
                if object.bids_accepted > 1 {
                    assert!((object.current_price - expected).abs() < 1e-12);
                }
                assert!(object.current_price <= object.highest_bid + 1e-12);
            }
        }
        assert_eq!(object.winner, Some(4));
    }

    #[test]
    fn test_rejected_bid_is_idempotent() {
        let mut object = AuctionObject::new(1, 0.0, 0.1);
        assert!(object.register_bid(1, 0.6));
        assert!(object.register_bid(2, 0.3));
        let before = snapshot(&object);
        // Entry price is now 0.4 + 0.1
        for _ in 0..5 {
            assert!(!object.register_bid(3, 0.45));
            assert_eq!(snapshot(&object), before);
        }
    }

    #[test]
    fn test_below_reserve_is_rejected() {
        let mut object = AuctionObject::new(1, 0.5, 0.1);
        assert!(!object.register_bid(1, 0.49));
        assert_eq!(object.winner, None);
        assert_eq!(object.current_price, 0.0);
        assert_eq!(object.final_price(), None);
    }

    #[test]
    fn test_bidding_intensity_uses_price_before_update() {
        let mut object = AuctionObject::new(1, 0.0, 0.1);
        assert!(object.register_bid(1, 0.6));
        // Single observation leaves intensity untouched
        assert_eq!(object.bidding_intensity, 0.0);
        assert!(object.register_bid(2, 0.4));
        // mean(0.6, 0.4) - price before this bid (0.0)
        assert!((object.bidding_intensity - 0.5).abs() < 1e-12);
        assert!((object.current_price - 0.5).abs() < 1e-12);
        assert!(object.register_bid(3, 0.8));
        // mean(0.4, 0.8) - 0.5
        assert!((object.bidding_intensity - 0.1).abs() < 1e-12);
        assert_eq!(object.intensity_history.len(), 2);
        assert_eq!(object.observed_bids[2], ObservedBid { bidder: 3, amount: 0.8, sequence: 2 });
    }

    #[test]
    fn test_public_info_snapshot() {
        let mut object = AuctionObject::new(2, 0.0, 0.1);
        let info = object.public_info();
        assert_eq!(info.observed_bids, 0);
        assert!(!info.has_winner);
        object.register_bid(5, 0.3);
        let info = object.public_info();
        assert_eq!(info.observed_bids, 1);
        assert!(info.has_winner);
        assert_eq!(info.current_price, 0.0);
        assert_eq!(object.index(), 1);
    }
}
