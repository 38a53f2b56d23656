//! Lead-lag detection and leader-first routing

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{start, wait_for};
use pk_arb::book::{BookSnapshot, Level};
use pk_arb::events::Event;
use pk_arb::registry::{PairSide, VenueId};
use pk_arb::signal::LeaderHint;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// A wandering mid series in cents
fn mid_at(i: usize) -> Decimal {
    let wave = 6.0 * ((i as f64) * 0.7).sin() + 2.0 * ((i as f64) * 0.23).cos();
    Decimal::try_from(50.0 + wave).unwrap()
}

#[tokio::test]
async fn test_sustained_lead_elects_leader() {
    let app = start(|c| {
        c.signal.bar_duration_ms = 100;
    })
    .await;

    // Seed ~2 minutes of backdated bars: polymarket leads kalshi by 2 bars.
    let bars = 120usize;
    let t0 = Utc::now() - ChronoDuration::milliseconds((bars as i64 + 2) * 100);
    for i in 0..bars {
        let ts = t0 + ChronoDuration::milliseconds(i as i64 * 100);
        let a_mid = mid_at(i);
        let b_mid = mid_at(i.saturating_sub(2));
        for (venue, market_id, mid) in [
            (VenueId::Polymarket, "0xbtc100k", a_mid),
            (VenueId::Kalshi, "KXBTC-100K", b_mid),
        ] {
            app.books.apply(BookSnapshot {
                venue,
                market_id: market_id.to_string(),
                received_at: ts,
                venue_ts: ts,
                bids: vec![Level::new(mid - dec!(1), 200)],
                asks: vec![Level::new(mid + dec!(1), 200)],
                seq: 1_000 + i as u64,
            });
        }
    }

    // Four window evaluations satisfy the 3-of-4 stability filter.
    for _ in 0..4 {
        app.leadlag_tx.send(app.pair_id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    // The worker runs asynchronously; poll for the stable hint.
    let mut leader = None;
    for _ in 0..40 {
        let hint = app.board.get(app.pair_id);
        if hint.leader.is_some() {
            leader = hint.leader;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    assert_eq!(leader, Some(PairSide::A), "polymarket should lead");
    let hint = app.board.get(app.pair_id);
    assert!(hint.correlation > 0.8);
    assert!(hint.lag_bars > 0);

    app.stop();
}

#[tokio::test]
async fn test_leader_leg_is_placed_first() {
    let app = start(|_| {}).await;
    let mut tap = app.bus.subscribe();

    // Kalshi is the stable leader; make the polymarket fill lag so the fill
    // order reflects the placement order.
    app.board.set(
        app.pair_id,
        LeaderHint {
            leader: Some(PairSide::B),
            confidence: 0.95,
            lag_bars: -2,
            correlation: 0.95,
        },
    );
    app.poly
        .update_behavior(|b| b.fill_delay = std::time::Duration::from_millis(30));

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

    let first_fill = wait_for(&mut tap, 2_000, |e| matches!(e, Event::LegFilled(_)))
        .await
        .expect("a leg should fill");
    let Event::LegFilled(fill) = first_fill else {
        unreachable!()
    };
    // The kalshi NO leg was primary, so its fill lands first.
    assert_eq!(fill.venue, VenueId::Kalshi);

    let settled = wait_for(&mut tap, 2_000, |e| matches!(e, Event::TradeSettled(_)))
        .await
        .expect("trade should settle");
    let Event::TradeSettled(record) = settled else {
        unreachable!()
    };
    assert_eq!(record.intent.legs[0].venue, VenueId::Kalshi);
    assert_eq!(record.intent.legs[1].venue, VenueId::Polymarket);

    app.stop();
}
