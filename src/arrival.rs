/// This file builds buyer populations and their arrival order.
///
/// The arrival order is a uniformly random permutation of the population; the matching engine
/// processes buyers in exactly this order on every pass. Position sensitive experiments reorder
/// a population by swapping a chosen buyer into a given slot.

use rand::seq::SliceRandom;
use rand::Rng;
use crate::buyer::Buyer;
use crate::error::{invalid, Result};
use crate::valuations::{AffiliationParams, ValuationModel, ValuationSampler};

/// Create `n` buyers with ids 1..=n and valuations over `m` objects, in id order
pub fn generate_buyers<R: Rng + ?Sized>(
    n: usize,
    m: usize,
    model: &ValuationModel,
    affiliation: AffiliationParams,
    rng: &mut R,
) -> Result<Vec<Buyer>> {
    affiliation.validate()?;
    let sampler = ValuationSampler::new(model, m)?;
    Ok((1..=n)
        .map(|buyer_id| Buyer::new(buyer_id, sampler.sample(&mut *rng), model.clone(), affiliation))
        .collect())
}

/// Create `n` buyers and shuffle them into a random arrival order
pub fn arrival_order<R: Rng + ?Sized>(
    n: usize,
    m: usize,
    model: &ValuationModel,
    affiliation: AffiliationParams,
    rng: &mut R,
) -> Result<Vec<Buyer>> {
    let mut buyers = generate_buyers(n, m, model, affiliation, rng)?;
    buyers.shuffle(rng);
    Ok(buyers)
}

/// Index (into `order`) of the buyer with the k-th highest mean original valuation
///
/// `k` is 1-based. Ties between equal means resolve to the later arrival.
pub fn kth_highest_index(order: &[Buyer], k: usize) -> Result<usize> {
    if k < 1 || k > order.len() {
        return Err(invalid(format!("k must be between 1 and {}, got {}", order.len(), k)));
    }
    let means: Vec<f64> = order.iter().map(|b| b.mean_original_valuation()).collect();
    let mut ranked: Vec<usize> = (0..order.len()).collect();
    ranked.sort_by(|&a, &b| means[a].total_cmp(&means[b]));
    Ok(ranked[order.len() - k])
}

/// Copy of `order` with the buyer at `from` swapped into `to`
pub fn with_buyer_at(order: &[Buyer], from: usize, to: usize) -> Result<Vec<Buyer>> {
    if from >= order.len() || to >= order.len() {
        return Err(invalid(format!("arrival positions {} and {} must be below {}", from, to, order.len())));
    }
    let mut reordered = order.to_vec();
    reordered.swap(from, to);
    Ok(reordered)
}
