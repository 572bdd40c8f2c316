//! The pure function that turns a submitted `Order` plus the account's
//! current view into an `AcceptedOrder` or a rejection. Kept free of
//! channels/async so it is trivially unit tested, mirroring how the
//! teacher keeps `ValidationError`'s rule checks (`src/account/validation.rs`
//! in the original tree) separate from I/O.

use crate::balance_map::AssetMap;
use crate::error::MatcherError;
use crate::models::{AcceptedOrder, FillState, Order, Side};

/// Everything the validator needs besides the order itself. All of it is
/// resolved by the caller (the actor) before validation runs; the
/// `already_known` predicate folds together activeOrders membership,
/// OrderDB containment and `hasOrderInBlockchain`.
pub struct ValidationContext {
    pub tradable_balance: AssetMap,
    pub active_orders_count: usize,
    pub max_active_orders: usize,
    pub already_known: bool,
}

/// The funds an order needs to execute in full: the spend side (price
/// asset for a buy, amount asset for a sell) plus the matcher fee, folded
/// into the same entry if `fee_asset` happens to coincide with the spend
/// asset. This is deliberately the simplest possible reservation model;
/// further price/amount arithmetic is out of scope here.
pub fn required_balance(order: &Order) -> AssetMap {
    let mut required = AssetMap::default();
    match order.side {
        Side::Buy => {
            required.insert(order.pair.price_asset, order.price.saturating_mul(order.amount));
        }
        Side::Sell => {
            required.insert(order.pair.amount_asset, order.amount);
        }
    }
    let entry = required.entry(order.fee_asset).or_insert(0);
    *entry = entry.saturating_add(order.matcher_fee);
    required.retain(|_, v| *v != 0);
    required
}

/// Cap `required` by what is actually tradable, asset by asset. Used for
/// market orders, which reserve only what they can actually spend rather
/// than being rejected outright; limit orders are not capped this way.
fn cap_by_tradable(required: &AssetMap, tradable: &AssetMap) -> AssetMap {
    let mut capped = AssetMap::default();
    for (asset, amount) in required {
        let available = tradable.get(asset).copied().unwrap_or(0);
        capped.insert(*asset, (*amount).min(available));
    }
    capped.retain(|_, v| *v != 0);
    capped
}

pub fn validate_order(
    order: Order,
    is_market: bool,
    ctx: &ValidationContext,
) -> Result<AcceptedOrder, MatcherError> {
    if ctx.already_known {
        return Err(MatcherError::OrderDuplicate(order.id));
    }
    if ctx.active_orders_count >= ctx.max_active_orders {
        return Err(MatcherError::ActiveOrdersLimitReached);
    }

    let required = required_balance(&order);

    let reservable = if is_market {
        cap_by_tradable(&required, &ctx.tradable_balance)
    } else {
        for (asset, amount) in &required {
            let available = ctx.tradable_balance.get(asset).copied().unwrap_or(0);
            if available < *amount {
                return Err(MatcherError::NotEnoughCoins {
                    asset: *asset,
                    shortfall: amount - available,
                });
            }
        }
        required.clone()
    };

    Ok(AcceptedOrder {
        order,
        fill: FillState::default(),
        is_market,
        reservable_balance: reservable,
        required_balance: required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Address, Asset, OrderId, Pair};

    fn sample_order(side: Side, price: u64, amount: u64) -> Order {
        Order {
            id: OrderId::from_u64(1),
            sender: Address::from_u64(1),
            pair: Pair::new(Asset::Native, Asset::issued_from_u64(1)),
            side,
            price,
            amount,
            matcher_fee: 1,
            fee_asset: Asset::Native,
            timestamp: 0,
            expiration: 0,
        }
    }

    fn ctx(tradable: AssetMap) -> ValidationContext {
        ValidationContext {
            tradable_balance: tradable,
            active_orders_count: 0,
            max_active_orders: 200,
            already_known: false,
        }
    }

    #[test]
    fn limit_buy_reserves_price_times_amount_plus_fee() {
        let order = sample_order(Side::Buy, 300, 1);
        let mut tradable = AssetMap::default();
        tradable.insert(Asset::Native, 10);
        tradable.insert(Asset::issued_from_u64(1), 300);
        let ao = validate_order(order, false, &ctx(tradable)).unwrap();
        assert_eq!(ao.reservable_balance.get(&Asset::issued_from_u64(1)), Some(&300));
        assert_eq!(ao.reservable_balance.get(&Asset::Native), Some(&1));
    }

    #[test]
    fn limit_order_rejected_when_tradable_balance_insufficient() {
        let order = sample_order(Side::Buy, 300, 1);
        let mut tradable = AssetMap::default();
        tradable.insert(Asset::issued_from_u64(1), 100);
        tradable.insert(Asset::Native, 10);
        let err = validate_order(order, false, &ctx(tradable)).unwrap_err();
        assert_eq!(
            err,
            MatcherError::NotEnoughCoins {
                asset: Asset::issued_from_u64(1),
                shortfall: 200,
            }
        );
    }

    #[test]
    fn market_order_is_capped_instead_of_rejected() {
        let order = sample_order(Side::Buy, 300, 1);
        let mut tradable = AssetMap::default();
        tradable.insert(Asset::issued_from_u64(1), 100);
        tradable.insert(Asset::Native, 10);
        let ao = validate_order(order, true, &ctx(tradable)).unwrap();
        assert_eq!(ao.reservable_balance.get(&Asset::issued_from_u64(1)), Some(&100));
    }

    #[test]
    fn duplicate_is_rejected_before_balance_checks() {
        let order = sample_order(Side::Buy, 300, 1);
        let mut c = ctx(AssetMap::default());
        c.already_known = true;
        let err = validate_order(order, false, &c).unwrap_err();
        assert!(matches!(err, MatcherError::OrderDuplicate(_)));
    }

    #[test]
    fn active_orders_limit_is_enforced() {
        let order = sample_order(Side::Buy, 300, 1);
        let mut c = ctx(AssetMap::default());
        c.active_orders_count = 200;
        let err = validate_order(order, false, &c).unwrap_err();
        assert_eq!(err, MatcherError::ActiveOrdersLimitReached);
    }
}
