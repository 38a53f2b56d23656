//! Operator halt/resume over the paper stack

mod common;

use common::{drain_for, start, wait_for};
use pk_arb::book::Level;
use pk_arb::events::Event;
use pk_arb::exec::TradeReason;
use pk_arb::ops::Operator;
use pk_arb::registry::VenueId;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn seed_profitable_books(app: &common::App) {
    app.poly.push_book(
        "0xbtc100k",
        vec![Level::new(dec!(46), 100)],
        vec![Level::new(dec!(48), 100)],
    );
    app.kalshi.push_book(
        "KXBTC-100K",
        vec![Level::new(dec!(51), 100)],
        vec![Level::new(dec!(53), 100)],
    );
}

#[tokio::test]
async fn test_halt_unwinds_live_hedge_and_blocks_admissions() {
    let app = start(|c| {
        c.execution.hedge_timeout_ms = 1_000;
    })
    .await;
    let operator = Operator::new(
        Arc::clone(&app.health),
        Arc::clone(&app.registry),
        app.bus.clone(),
    );
    let mut tap = app.bus.subscribe();

    // Keep the hedge leg pending so the halt catches a live hedge.
    app.kalshi
        .update_behavior(|b| b.fill_delay = std::time::Duration::from_millis(500));
    seed_profitable_books(&app);

    wait_for(&mut tap, 2_000, |e| matches!(e, Event::IntentAdmitted { .. }))
        .await
        .expect("intent admitted");

    operator.halt(VenueId::Kalshi, "ops");

    let unwound = wait_for(&mut tap, 3_000, |e| matches!(e, Event::TradeUnwound(_)))
        .await
        .expect("live hedge should unwind on halt");
    let Event::TradeUnwound(record) = unwound else {
        unreachable!()
    };
    assert_eq!(record.reason, Some(TradeReason::OperatorHalt));
    assert_eq!(record.residual_qty, 0);

    // New quotes are refused while halted.
    seed_profitable_books(&app);
    let events = drain_for(&mut tap, 300).await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::IntentAdmitted { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::IntentRejected { reason, .. } if reason.contains("halted"))));

    app.stop();
}

#[tokio::test]
async fn test_resume_restores_admissions() {
    let app = start(|_| {}).await;
    let operator = Operator::new(
        Arc::clone(&app.health),
        Arc::clone(&app.registry),
        app.bus.clone(),
    );
    let mut tap = app.bus.subscribe();

    operator.halt(VenueId::Polymarket, "ops");
    seed_profitable_books(&app);
    let events = drain_for(&mut tap, 300).await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::IntentAdmitted { .. })));

    assert!(operator.resume(VenueId::Polymarket, "ops"));
    seed_profitable_books(&app);
    let admitted = wait_for(&mut tap, 2_000, |e| {
        matches!(e, Event::IntentAdmitted { .. })
    })
    .await;
    assert!(admitted.is_some());

    app.stop();
}

#[tokio::test]
async fn test_deactivate_pair_leaves_hedge_to_finish() {
    let app = start(|c| {
        c.execution.hedge_timeout_ms = 1_000;
    })
    .await;
    let operator = Operator::new(
        Arc::clone(&app.health),
        Arc::clone(&app.registry),
        app.bus.clone(),
    );
    let mut tap = app.bus.subscribe();

    app.kalshi
        .update_behavior(|b| b.fill_delay = std::time::Duration::from_millis(150));
    seed_profitable_books(&app);

    wait_for(&mut tap, 2_000, |e| matches!(e, Event::IntentAdmitted { .. }))
        .await
        .expect("intent admitted");

    // Deactivation stops new admissions but the live hedge completes.
    assert!(operator.deactivate_pair(app.pair_id));
    let settled = wait_for(&mut tap, 3_000, |e| matches!(e, Event::TradeSettled(_)))
        .await;
    assert!(settled.is_some(), "in-flight hedge should settle normally");

    seed_profitable_books(&app);
    let events = drain_for(&mut tap, 300).await;
    assert!(!events.iter().any(|e| matches!(e, Event::EdgeComputed(_))));

    app.stop();
}
