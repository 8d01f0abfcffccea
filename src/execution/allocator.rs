use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use tracing::{debug, warn};

use super::types::{AllocationError, AllocationPlan, AssetWeight, Position};

/// Decimal places kept when scaling down an over-allocated weight set
const SCALED_WEIGHT_DP: u32 = 12;

/// Convert target weights into a whole-share buy list that never spends more than `budget`.
///
/// Symbols with a non-positive weight are dropped before anything else. Leftover cash after
/// flooring is folded into the largest-weight holding (earliest symbol on ties).
pub fn allocate(
    weights: &[AssetWeight],
    prices: &HashMap<String, Decimal>,
    budget: Decimal,
) -> Result<AllocationPlan, AllocationError> {
    if budget <= Decimal::ZERO {
        return Err(AllocationError::InvalidBudget);
    }

    let held = held_weights(weights);
    if held.is_empty() {
        debug!(%budget, "No positive weights, keeping the whole budget as cash");
        return Ok(AllocationPlan::uninvested(budget));
    }

    // Resolve every price up front so a bad quote fails the whole request
    let mut priced = Vec::with_capacity(held.len());
    for asset in held {
        let price = prices
            .get(&asset.symbol)
            .copied()
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| AllocationError::InvalidPrice(asset.symbol.clone()))?;
        priced.push((asset, price));
    }

    let weight_sum: Decimal = priced.iter().map(|(asset, _)| asset.weight).sum();
    let over_allocated = weight_sum > Decimal::ONE;
    if over_allocated {
        warn!(%weight_sum, "Weights sum above 1, scaling down before allocation");
    }

    let mut positions = Vec::with_capacity(priced.len());
    for (asset, price) in &priced {
        let target_weight = if over_allocated {
            (asset.weight / weight_sum)
                .round_dp_with_strategy(SCALED_WEIGHT_DP, RoundingStrategy::ToZero)
        } else {
            asset.weight
        };
        let target_value = budget
            .checked_mul(target_weight)
            .ok_or(AllocationError::InvalidBudget)?;
        let shares = whole_shares(target_value, *price)
            .and_then(|s| s.to_u64())
            .ok_or_else(|| AllocationError::InvalidPrice(asset.symbol.clone()))?;

        positions.push(Position {
            symbol: asset.symbol.clone(),
            shares,
            price: *price,
            target_weight,
        });
    }

    trim_overspend(&mut positions, budget);

    let spent: Decimal = positions.iter().map(Position::cost).sum();
    let mut leftover_cash = budget - spent;

    // Fold the leftover into the highest-conviction holding
    let top = priced
        .iter()
        .enumerate()
        .fold(0, |best, (i, (asset, _))| {
            if asset.weight > priced[best].0.weight { i } else { best }
        });
    let top_position = &mut positions[top];
    if leftover_cash >= top_position.price {
        if let Some(extra) = whole_shares(leftover_cash, top_position.price).and_then(|s| s.to_u64()) {
            top_position.shares += extra;
            leftover_cash -= Decimal::from(extra) * top_position.price;
            debug!(symbol = %top_position.symbol, extra, "Folded leftover cash into top holding");
        }
    }

    let plan = AllocationPlan {
        budget,
        positions,
        leftover_cash,
    };
    debug!(
        spent = %plan.spent(),
        leftover = %plan.leftover_cash,
        holdings = ?plan.share_counts(),
        "Allocation computed"
    );

    Ok(plan)
}

/// Positive weights in input order, first occurrence of each symbol only
fn held_weights(weights: &[AssetWeight]) -> Vec<&AssetWeight> {
    let mut seen = HashSet::new();
    let mut held = Vec::with_capacity(weights.len());

    for asset in weights {
        if !seen.insert(asset.symbol.as_str()) {
            warn!(symbol = %asset.symbol, "Duplicate symbol in weights, keeping the first entry");
            continue;
        }
        if asset.weight > Decimal::ZERO {
            held.push(asset);
        }
    }

    held
}

/// Largest whole number of shares whose cost stays within `amount`
fn whole_shares(amount: Decimal, price: Decimal) -> Option<Decimal> {
    let mut shares = amount.checked_div(price)?.floor();
    // Division rounds at 28 significant digits, so re-check the product
    while shares > Decimal::ZERO && shares.checked_mul(price)? > amount {
        shares -= Decimal::ONE;
    }
    Some(shares.max(Decimal::ZERO))
}

/// Drop shares from the back of the plan until the spend fits the budget
fn trim_overspend(positions: &mut [Position], budget: Decimal) {
    let mut spent: Decimal = positions.iter().map(Position::cost).sum();

    while spent > budget {
        let Some(position) = positions.iter_mut().rev().find(|p| p.shares > 0) else {
            break;
        };
        position.shares -= 1;
        spent -= position.price;
        warn!(symbol = %position.symbol, "Trimmed one share to stay within budget");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    fn weights(entries: &[(&str, Decimal)]) -> Vec<AssetWeight> {
        entries
            .iter()
            .map(|(symbol, weight)| AssetWeight::new(*symbol, *weight))
            .collect()
    }

    fn prices(entries: &[(&str, Decimal)]) -> HashMap<String, Decimal> {
        entries
            .iter()
            .map(|(symbol, price)| (symbol.to_string(), *price))
            .collect()
    }

    #[test]
    fn exact_split_leaves_no_cash() {
        let plan = allocate(
            &weights(&[("A", dec!(0.6)), ("B", dec!(0.4))]),
            &prices(&[("A", dec!(100)), ("B", dec!(50))]),
            dec!(1000),
        )
        .unwrap();

        assert_eq!(plan.share_counts(), vec![("A", 6), ("B", 8)]);
        assert_eq!(plan.leftover_cash, Decimal::ZERO);
        assert_eq!(plan.spent(), dec!(1000));
    }

    #[test]
    fn leftover_goes_to_first_of_tied_weights() {
        let plan = allocate(
            &weights(&[("A", dec!(0.5)), ("B", dec!(0.5))]),
            &prices(&[("A", dec!(33)), ("B", dec!(33))]),
            dec!(100),
        )
        .unwrap();

        assert_eq!(plan.share_counts(), vec![("A", 2), ("B", 1)]);
        assert_eq!(plan.leftover_cash, dec!(1));
    }

    #[test]
    fn tie_break_follows_input_order() {
        let plan = allocate(
            &weights(&[("B", dec!(0.5)), ("A", dec!(0.5))]),
            &prices(&[("A", dec!(33)), ("B", dec!(33))]),
            dec!(100),
        )
        .unwrap();

        assert_eq!(plan.shares("B"), Some(2));
        assert_eq!(plan.shares("A"), Some(1));
    }

    #[test]
    fn empty_weights_keep_budget_as_cash() {
        let plan = allocate(&[], &HashMap::new(), dec!(500)).unwrap();

        assert!(plan.is_empty());
        assert_eq!(plan.leftover_cash, dec!(500));
    }

    #[test]
    fn missing_price_names_the_symbol() {
        let err = allocate(&weights(&[("A", dec!(1.0))]), &HashMap::new(), dec!(1000)).unwrap_err();
        assert_eq!(err, AllocationError::InvalidPrice("A".to_string()));
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let err = allocate(
            &weights(&[("A", dec!(0.5)), ("B", dec!(0.5))]),
            &prices(&[("A", dec!(10)), ("B", dec!(0))]),
            dec!(1000),
        )
        .unwrap_err();
        assert_eq!(err, AllocationError::InvalidPrice("B".to_string()));
    }

    #[test]
    fn non_positive_budget_is_rejected() {
        let w = weights(&[("A", dec!(1.0))]);
        let p = prices(&[("A", dec!(10))]);

        assert_eq!(allocate(&w, &p, Decimal::ZERO).unwrap_err(), AllocationError::InvalidBudget);
        assert_eq!(allocate(&w, &p, dec!(-5)).unwrap_err(), AllocationError::InvalidBudget);
    }

    #[test]
    fn non_positive_weights_are_excluded() {
        // C has no price, which is fine because it is never held
        let plan = allocate(
            &weights(&[("A", dec!(0.7)), ("B", dec!(-0.2)), ("C", Decimal::ZERO)]),
            &prices(&[("A", dec!(10)), ("B", dec!(10))]),
            dec!(1000),
        )
        .unwrap();

        assert_eq!(plan.share_counts(), vec![("A", 100)]);
        assert_eq!(plan.shares("B"), None);
        assert_eq!(plan.shares("C"), None);
    }

    #[test]
    fn over_allocated_weights_are_scaled_down() {
        let plan = allocate(
            &weights(&[("A", dec!(0.9)), ("B", dec!(0.6))]),
            &prices(&[("A", dec!(100)), ("B", dec!(30))]),
            dec!(10000),
        )
        .unwrap();

        let scaled_sum: Decimal = plan.positions.iter().map(|p| p.target_weight).sum();
        assert!(scaled_sum <= Decimal::ONE);
        assert_eq!(plan.shares("A"), Some(60));
        assert_eq!(plan.shares("B"), Some(133));
        assert!(plan.spent() <= dec!(10000));
        assert_eq!(plan.leftover_cash, dec!(10));
    }

    #[test]
    fn unaffordable_holding_gets_zero_shares() {
        let plan = allocate(
            &weights(&[("A", dec!(0.9)), ("B", dec!(0.1))]),
            &prices(&[("A", dec!(10)), ("B", dec!(500))]),
            dec!(1000),
        )
        .unwrap();

        assert_eq!(plan.share_counts(), vec![("A", 100), ("B", 0)]);
        assert_eq!(plan.leftover_cash, Decimal::ZERO);
    }

    #[test]
    fn duplicate_symbols_keep_first_entry() {
        let plan = allocate(
            &weights(&[("A", dec!(0.5)), ("A", dec!(0.4)), ("B", dec!(0.5))]),
            &prices(&[("A", dec!(10)), ("B", dec!(10))]),
            dec!(100),
        )
        .unwrap();

        assert_eq!(plan.share_counts(), vec![("A", 5), ("B", 5)]);
    }

    #[test]
    fn repeated_calls_give_identical_plans() {
        let w = weights(&[("X", dec!(0.3)), ("Y", dec!(0.3)), ("Z", dec!(0.4))]);
        let p = prices(&[("X", dec!(17.25)), ("Y", dec!(3.10)), ("Z", dec!(251.7))]);

        let first = allocate(&w, &p, dec!(12345.67)).unwrap();
        let second = allocate(&w, &p, dec!(12345.67)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn budget_and_leftover_bounds_hold() {
        let cases = [
            (vec![("A", dec!(0.25)), ("B", dec!(0.35)), ("C", dec!(0.4))], dec!(999.99)),
            (vec![("A", dec!(0.7)), ("B", dec!(0.7)), ("C", dec!(0.1))], dec!(2500)),
            (vec![("A", dec!(0.05)), ("B", dec!(0.15)), ("C", dec!(0.30))], dec!(77)),
            (vec![("A", dec!(0.333333)), ("B", dec!(0.333333)), ("C", dec!(0.333334))], dec!(1000000)),
        ];
        let p = prices(&[("A", dec!(12.34)), ("B", dec!(7.5)), ("C", dec!(101.01))]);

        for (entries, budget) in cases {
            let w = weights(&entries);
            let plan = allocate(&w, &p, budget).unwrap();

            assert!(plan.spent() <= budget);
            assert!(plan.leftover_cash >= Decimal::ZERO);
            assert_eq!(plan.leftover_cash, budget - plan.spent());

            let top = w
                .iter()
                .fold(&w[0], |best, a| if a.weight > best.weight { a } else { best });
            assert!(plan.leftover_cash < p[&top.symbol]);
        }
    }
}
