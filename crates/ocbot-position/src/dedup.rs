//! Duplicate exit-order selection.
//!
//! Partial failures in the placement path can leave several trigger orders
//! of the same kind resting for one position. Orders are grouped by
//! `(symbol, protected side, order type)`; within a group of two or more the
//! most recently placed order survives, as does any order the local row
//! still references.

use std::collections::HashMap;

use ocbot_core::{ExchangeOrder, ExchangeOrderType, Position, PositionSide};

type GroupKey<'a> = (&'a str, PositionSide, &'a ExchangeOrderType);

/// Exit orders that should be cancelled.
pub fn redundant_exit_orders<'a>(
    orders: &'a [ExchangeOrder],
    positions: &[Position],
) -> Vec<&'a ExchangeOrder> {
    let mut groups: HashMap<GroupKey<'a>, Vec<&'a ExchangeOrder>> = HashMap::new();
    for order in orders.iter().filter(|o| o.is_exit_order()) {
        groups
            .entry((
                order.normalized_symbol.as_str(),
                order.protected_side(),
                &order.order_type,
            ))
            .or_default()
            .push(order);
    }

    let mut redundant = Vec::new();
    for ((symbol, side, _), mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        // Newest first; order id breaks ties on equal timestamps.
        group.sort_by(|a, b| {
            b.time_ms
                .cmp(&a.time_ms)
                .then_with(|| b.order_id.cmp(&a.order_id))
        });
        let referenced = |order: &ExchangeOrder| {
            positions.iter().any(|p| {
                p.normalized_symbol == symbol
                    && p.side == side
                    && p.references_order(&order.order_id)
            })
        };
        redundant.extend(group.into_iter().skip(1).filter(|o| !referenced(o)));
    }
    redundant.sort_by(|a, b| a.order_id.cmp(&b.order_id));
    redundant
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocbot_core::{BotId, ExchangeKind, NewPosition, OrderSide, PositionId, PositionStatus};

    fn order(id: &str, order_type: ExchangeOrderType, time_ms: u64) -> ExchangeOrder {
        ExchangeOrder {
            order_id: id.to_string(),
            symbol: "BTCUSDT".to_string(),
            normalized_symbol: "BTCUSDT".to_string(),
            order_type,
            side: OrderSide::Sell,
            position_side: Some(PositionSide::Long),
            reduce_only: true,
            close_position: false,
            stop_price: Some(101.0),
            time_ms,
        }
    }

    fn long_position(tp_order: Option<&str>) -> Position {
        let mut position = Position::from_new(
            PositionId::new(1),
            NewPosition {
                bot_id: BotId::new(1),
                strategy_id: None,
                exchange: ExchangeKind::Binance,
                symbol: "BTCUSDT".to_string(),
                side: PositionSide::Long,
                entry_price: 100.0,
                amount: 100.0,
                quantity: 1.0,
                status: PositionStatus::Open,
                entry_order_id: None,
                tp_price: Some(101.0),
                stop_loss_price: None,
                current_reduce: None,
                reservation_token: None,
                opened_at_ms: 0,
            },
        );
        position.tp_order_id = tp_order.map(str::to_string);
        position
    }

    fn ids(orders: Vec<&ExchangeOrder>) -> Vec<&str> {
        orders.into_iter().map(|o| o.order_id.as_str()).collect()
    }

    #[test]
    fn test_keeps_newest_and_referenced() {
        let orders = vec![
            order("1", ExchangeOrderType::TakeProfitMarket, 10),
            order("2", ExchangeOrderType::TakeProfitMarket, 20),
            order("3", ExchangeOrderType::TakeProfitMarket, 30),
            order("4", ExchangeOrderType::StopMarket, 15),
        ];
        let rows = [long_position(Some("1"))];
        assert_eq!(ids(redundant_exit_orders(&orders, &rows)), vec!["2"]);
        assert_eq!(ids(redundant_exit_orders(&orders, &[])), vec!["1", "2"]);
    }

    #[test]
    fn test_one_tp_and_one_sl_are_not_duplicates() {
        let orders = vec![
            order("1", ExchangeOrderType::TakeProfitMarket, 10),
            order("2", ExchangeOrderType::StopMarket, 10),
        ];
        assert!(redundant_exit_orders(&orders, &[]).is_empty());
    }

    #[test]
    fn test_ignores_entry_orders_and_other_sides() {
        let mut limit = order("1", ExchangeOrderType::Limit, 10);
        limit.reduce_only = false;
        let mut short_tp = order("2", ExchangeOrderType::TakeProfitMarket, 20);
        short_tp.side = OrderSide::Buy;
        short_tp.position_side = Some(PositionSide::Short);
        let orders = vec![
            limit,
            short_tp,
            order("3", ExchangeOrderType::TakeProfitMarket, 30),
            order("4", ExchangeOrderType::Limit, 40),
        ];
        assert!(redundant_exit_orders(&orders, &[]).is_empty());
    }
}
