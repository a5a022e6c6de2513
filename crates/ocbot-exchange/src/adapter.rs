//! Venue payload adapters.
//!
//! Each venue names and scales position fields differently:
//!
//! | Venue   | Size                    | Side                         | Entry           |
//! |---------|-------------------------|------------------------------|-----------------|
//! | Binance | `positionAmt` (signed)  | `positionSide` or size sign  | `entryPrice`    |
//! | MEXC    | `holdVol`               | `positionType` 1=long 2=short| `holdAvgPrice`  |
//! | Gate    | `size` (signed)         | `mode` or size sign          | `entry_price`   |
//! | unified | `contracts`             | `side`                       | `entryPrice`    |
//!
//! Numbers may arrive as JSON numbers or strings. Rows whose side cannot be
//! determined (one-way mode with zero size) are dropped.

use ocbot_core::{
    ExchangeKind, ExchangeOrder, ExchangeOrderType, ExchangePosition, OrderSide, PositionSide,
};
use serde_json::Value;
use tracing::debug;

fn num(row: &Value, field: &str) -> Option<f64> {
    let value = match row.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

fn text<'a>(row: &'a Value, field: &str) -> Option<&'a str> {
    row.get(field)?.as_str()
}

fn flag(row: &Value, field: &str) -> bool {
    match row.get(field) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Order id as string; venues send either numbers or strings.
fn id(row: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match row.get(*field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn side_from_label(label: &str) -> Option<PositionSide> {
    match label.trim().to_ascii_lowercase().as_str() {
        "long" | "dual_long" => Some(PositionSide::Long),
        "short" | "dual_short" => Some(PositionSide::Short),
        _ => None,
    }
}

fn side_from_sign(size: f64) -> Option<PositionSide> {
    if size > 0.0 {
        Some(PositionSide::Long)
    } else if size < 0.0 {
        Some(PositionSide::Short)
    } else {
        None
    }
}

fn rows(payload: &Value) -> &[Value] {
    match payload {
        Value::Array(items) => items,
        // Some venues wrap lists as {"data": [...]}.
        Value::Object(obj) => obj
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

// ============================================================================
// Positions
// ============================================================================

/// Parse a venue position list into canonical positions.
pub fn parse_positions(exchange: ExchangeKind, payload: &Value) -> Vec<ExchangePosition> {
    rows(payload)
        .iter()
        .filter_map(|row| {
            let parsed = if row.get("contracts").is_some() {
                parse_unified_position(row)
            } else {
                match exchange {
                    ExchangeKind::Binance => parse_binance_position(row),
                    ExchangeKind::Mexc => parse_mexc_position(row),
                    ExchangeKind::Gate => parse_gate_position(row),
                }
            };
            if parsed.is_none() {
                debug!(%exchange, row = %row, "Skipping unparseable position row");
            }
            parsed
        })
        .collect()
}

fn parse_binance_position(row: &Value) -> Option<ExchangePosition> {
    let symbol = text(row, "symbol")?;
    let amount = num(row, "positionAmt")?;
    let side = text(row, "positionSide")
        .and_then(side_from_label)
        .or_else(|| side_from_sign(amount))?;
    let mut pos = ExchangePosition::new(symbol, side, amount)
        .with_prices(num(row, "entryPrice"), num(row, "markPrice"));
    pos.unrealized_pnl = num(row, "unRealizedProfit");
    Some(pos)
}

fn parse_mexc_position(row: &Value) -> Option<ExchangePosition> {
    let symbol = text(row, "symbol")?;
    let volume = num(row, "holdVol")?;
    let side = match num(row, "positionType")? as i64 {
        1 => PositionSide::Long,
        2 => PositionSide::Short,
        _ => return None,
    };
    let mut pos = ExchangePosition::new(symbol, side, volume)
        .with_prices(num(row, "holdAvgPrice"), num(row, "markPrice"));
    pos.unrealized_pnl = num(row, "unrealisedPnl");
    Some(pos)
}

fn parse_gate_position(row: &Value) -> Option<ExchangePosition> {
    let symbol = text(row, "contract")?;
    let size = num(row, "size")?;
    let side = text(row, "mode")
        .and_then(side_from_label)
        .or_else(|| side_from_sign(size))?;
    let mut pos = ExchangePosition::new(symbol, side, size)
        .with_prices(num(row, "entry_price"), num(row, "mark_price"));
    pos.unrealized_pnl = num(row, "unrealised_pnl");
    Some(pos)
}

fn parse_unified_position(row: &Value) -> Option<ExchangePosition> {
    let symbol = text(row, "symbol")?;
    let contracts = num(row, "contracts").unwrap_or(0.0);
    let side = text(row, "side")
        .and_then(side_from_label)
        .or_else(|| side_from_sign(contracts))?;
    let mut pos = ExchangePosition::new(symbol, side, contracts)
        .with_prices(num(row, "entryPrice"), num(row, "markPrice"));
    pos.unrealized_pnl = num(row, "unrealizedPnl");
    Some(pos)
}

// ============================================================================
// Orders
// ============================================================================

/// Parse a venue open-order list into canonical orders.
///
/// Binance rows are read natively; other venues are expected in the unified
/// shape (`id`, `type`, `side`, `reduceOnly`, `stopPrice`, `timestamp`).
pub fn parse_orders(exchange: ExchangeKind, payload: &Value) -> Vec<ExchangeOrder> {
    rows(payload)
        .iter()
        .filter_map(|row| {
            let parsed = parse_order(row);
            if parsed.is_none() {
                debug!(%exchange, row = %row, "Skipping unparseable order row");
            }
            parsed
        })
        .collect()
}

fn parse_order(row: &Value) -> Option<ExchangeOrder> {
    let order_id = id(row, &["orderId", "id"])?;
    let symbol = text(row, "symbol")?.to_string();
    let order_type = ExchangeOrderType::parse(text(row, "type")?);
    let side = match text(row, "side")?.to_ascii_lowercase().as_str() {
        "buy" => OrderSide::Buy,
        "sell" => OrderSide::Sell,
        _ => return None,
    };
    let position_side = text(row, "positionSide").and_then(side_from_label);
    let stop_price = num(row, "stopPrice").or_else(|| num(row, "triggerPrice"));
    let time_ms = ["time", "updateTime", "timestamp"]
        .iter()
        .find_map(|field| num(row, field))
        .unwrap_or(0.0)
        .max(0.0) as u64;

    Some(ExchangeOrder {
        order_id,
        normalized_symbol: ocbot_core::normalize_symbol(&symbol),
        symbol,
        order_type,
        side,
        position_side,
        reduce_only: flag(row, "reduceOnly"),
        close_position: flag(row, "closePosition"),
        stop_price,
        time_ms,
    })
}
