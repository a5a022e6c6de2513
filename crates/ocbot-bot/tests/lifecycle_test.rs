//! Position lifecycle integration tests.
//!
//! Tests the wired paper-mode engine:
//! - Materialization and exit placement for a seeded exchange position
//! - Take-profit fill followed by a zero-size close
//! - Trailing take-profit replacement
//! - Missing-row force close
//! - Failure isolation and the timer-driven main loop

mod integration;
use integration::common::{app, approx, paper_config, positions, settle, START_MS};

use std::sync::Arc;
use std::time::Duration;

use ocbot_core::{
    Bot, BotId, CloseReason, ExchangeKind, ExchangeOrderType, PositionSide, PositionStatus,
};
use ocbot_exchange::{ExchangeError, Operation, PaperExchange};
use ocbot_orders::TrailOutcome;
use ocbot_position::SyncOutcome;
use tokio_test::assert_ok;

fn summary(outcome: &SyncOutcome) -> &ocbot_position::SyncSummary {
    match outcome {
        SyncOutcome::Completed(summary) => summary,
        SyncOutcome::AlreadyRunning => panic!("pass unexpectedly skipped"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_seeded_position_gets_exits_then_closes_on_fill() {
    let (app, _clock) = app(paper_config());
    let exchange = app.exchange(BotId::new(1)).unwrap();

    let first = assert_ok!(app.run_cycle().await);
    assert!(first.fills.is_empty());
    let totals = &summary(&first.sync).totals;
    assert_eq!(totals.materialized, 1);
    assert_eq!(summary(&first.sync).synced_bots, vec![BotId::new(1)]);

    settle().await;
    let rows = positions(&app);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.status, PositionStatus::Open);
    assert!(approx(row.tp_price.unwrap(), 101.0));
    assert!(approx(row.stop_loss_price.unwrap(), 95.0));
    assert!(row.tp_order_id.is_some());
    assert!(row.sl_order_id.is_some());

    let orders = exchange.open_orders();
    assert_eq!(orders.len(), 2);
    assert!(orders
        .iter()
        .any(|o| o.order_type == ExchangeOrderType::TakeProfitMarket
            && approx(o.stop_price.unwrap(), 101.0)));
    assert!(orders
        .iter()
        .any(|o| o.order_type == ExchangeOrderType::StopMarket
            && approx(o.stop_price.unwrap(), 95.0)));

    // Price crosses the take-profit: the paper venue fills it and the next
    // pass closes the row against the flat slot.
    exchange.set_ticker("BTCUSDT", 101.5);
    let second = assert_ok!(app.run_cycle().await);
    assert_eq!(second.fills.len(), 1);
    assert_eq!(summary(&second.sync).totals.closed_zero_size, 1);
    assert!(exchange.open_orders().is_empty());

    let closed = &positions(&app)[0];
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.close_reason, Some(CloseReason::SyncExchangeClosed));
    assert!(approx(closed.pnl.unwrap(), 1.5));
    assert!(approx(closed.pnl_percent.unwrap(), 1.5));
}

#[tokio::test(start_paused = true)]
async fn test_steady_state_pass_writes_nothing() {
    let (app, _clock) = app(paper_config());
    assert_ok!(app.run_cycle().await);
    settle().await;

    let writes_before = app.store().write_count();
    let cycle = assert_ok!(app.run_cycle().await);
    settle().await;

    let totals = &summary(&cycle.sync).totals;
    assert_eq!(totals.writes(), 0);
    assert_eq!(totals.exit_repairs, 0);
    assert_eq!(totals.exit_cancelled, 0);
    assert_eq!(cycle.trailing, vec![TrailOutcome::NotDue]);
    assert_eq!(app.store().write_count(), writes_before);
    assert_eq!(app.exchange(BotId::new(1)).unwrap().open_orders().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_moves_take_profit_after_a_minute() {
    let (app, clock) = app(paper_config());
    assert_ok!(app.reconciler().sync_positions().await);
    settle().await;

    clock.advance_ms(60_000);
    let cycle = assert_ok!(app.run_cycle().await);
    assert_eq!(cycle.trailing.len(), 1);
    match &cycle.trailing[0] {
        TrailOutcome::Moved { from, to } => {
            assert!(approx(*from, 101.0));
            assert!(approx(*to, 100.9));
        }
        other => panic!("expected a trailing step, got {other:?}"),
    }

    settle().await;
    let row = &positions(&app)[0];
    assert!(approx(row.tp_price.unwrap(), 100.9));
    assert_eq!(row.minutes_elapsed, 1);
    assert_eq!(row.last_trailing_ms, Some(START_MS + 60_000));

    let orders = app.exchange(BotId::new(1)).unwrap().open_orders();
    let take_profits: Vec<_> = orders
        .iter()
        .filter(|o| o.order_type == ExchangeOrderType::TakeProfitMarket)
        .collect();
    assert_eq!(take_profits.len(), 1);
    assert!(approx(take_profits[0].stop_price.unwrap(), 100.9));
}

#[tokio::test(start_paused = true)]
async fn test_missing_position_force_closed_at_threshold() {
    let mut config = paper_config();
    config.trailing.enabled = false;
    let (app, _clock) = app(config);
    let exchange = app.exchange(BotId::new(1)).unwrap();

    assert_ok!(app.run_cycle().await);
    settle().await;

    exchange.remove_position("BTCUSDT", PositionSide::Long);
    let first = assert_ok!(app.run_cycle().await);
    assert_eq!(summary(&first.sync).totals.missing_counted, 1);
    assert_eq!(positions(&app)[0].not_on_exchange_count, 1);

    let second = assert_ok!(app.run_cycle().await);
    assert_eq!(summary(&second.sync).totals.closed_missing, 1);
    let row = &positions(&app)[0];
    assert_eq!(row.status, PositionStatus::Closed);
    assert_eq!(row.close_reason, Some(CloseReason::SyncNotOnExchange));
}

#[tokio::test(start_paused = true)]
async fn test_failing_bot_does_not_block_others() {
    let mut config = paper_config();
    config.bots.push(Bot {
        id: BotId::new(2),
        name: "paper-mexc".to_string(),
        exchange: ExchangeKind::Mexc,
        is_active: true,
        max_concurrent_positions: 5,
        risk_amount_usd: None,
    });
    let (app, _clock) = app(config);
    app.exchange(BotId::new(2))
        .unwrap()
        .fail_always(Operation::GetOpenPositions, ExchangeError::network("timeout"));

    let cycle = assert_ok!(app.run_cycle().await);
    let summary = summary(&cycle.sync);
    assert_eq!(summary.synced_bots, vec![BotId::new(1)]);
    assert_eq!(summary.failed_bots, vec![BotId::new(2)]);
    assert_eq!(summary.totals.materialized, 1);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_bot_has_no_exchange() {
    let mut config = paper_config();
    config.bots[0].is_active = false;
    let (app, _clock) = app(config);
    assert!(app.exchange(BotId::new(1)).is_none());

    let cycle = assert_ok!(app.run_cycle().await);
    let summary = summary(&cycle.sync);
    assert!(summary.synced_bots.is_empty());
    assert!(summary.failed_bots.is_empty());
    assert!(positions(&app).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_until_places_exits_and_stops() {
    let (app, _clock) = app(paper_config());
    let store = app.store().clone();
    let exchange: Arc<PaperExchange> = app.exchange(BotId::new(1)).unwrap();

    app.run_until(tokio::time::sleep(Duration::from_secs(5)))
        .await
        .unwrap();

    let rows = store.all_positions();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PositionStatus::Open);
    assert_eq!(exchange.open_orders().len(), 2);
    assert_eq!(exchange.call_count(Operation::PlaceOrder), 2);
}
