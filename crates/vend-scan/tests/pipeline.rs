//! End-to-end pipeline scenarios: raw keystrokes in, cart mutations and
//! operator notices out, with time driven by a hand-stepped clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vend_core::Money;
use vend_scan::{
    DispatchOutcome, DispatcherConfig, LookupError, LookupOutcome, ManualClock, Notice, Product,
    ReconstructorConfig, ScanHost, ScanIntent, ScanMode, ScanPipeline,
};

#[derive(Default)]
struct ScriptedHost {
    sell_results: VecDeque<Result<LookupOutcome, LookupError>>,
    purchase_results: VecDeque<Result<Option<Product>, LookupError>>,
    notices: Vec<Notice>,
    draft_adds: Vec<Product>,
    lookup_count: usize,
}

impl ScanHost for ScriptedHost {
    async fn resolve_product(
        &mut self,
        _value: &str,
        _format: Option<&str>,
        _mode: ScanMode,
        _online: bool,
    ) -> Result<LookupOutcome, LookupError> {
        self.lookup_count += 1;
        self.sell_results
            .pop_front()
            .unwrap_or(Ok(LookupOutcome::Ignored))
    }

    async fn resolve_for_purchase(
        &mut self,
        _value: &str,
        _format: Option<&str>,
    ) -> Result<Option<Product>, LookupError> {
        self.lookup_count += 1;
        self.purchase_results.pop_front().unwrap_or(Ok(None))
    }

    async fn prompt_price(&mut self, _product: Product) {}

    async fn add_to_purchase_draft(&mut self, product: Product) {
        self.draft_adds.push(product);
    }

    async fn handle_device_auth_error(&mut self, _message: &str) -> bool {
        false
    }

    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

fn product(id: &str, stock: Option<i64>) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {id}"),
        price_minor: Some(Money::from_minor(1500)),
        currency: "PKR".to_string(),
        barcode: Some(format!("bc-{id}")),
        available_stock: stock,
    }
}

fn pipeline(clock: &ManualClock) -> ScanPipeline {
    ScanPipeline::new(
        ReconstructorConfig::default(),
        DispatcherConfig::default(),
        Arc::new(clock.clone()),
    )
}

/// Types one value as a scanner burst (10 ms gaps), without a terminator.
async fn type_burst(p: &mut ScanPipeline, host: &mut ScriptedHost, clock: &ManualClock, text: &str) {
    for c in text.chars() {
        clock.advance(10);
        assert!(p.feed_key(host, &c.to_string()).await.is_none());
    }
}

/// Types one value as a burst and terminates it with Enter.
async fn scan_value(
    p: &mut ScanPipeline,
    host: &mut ScriptedHost,
    clock: &ManualClock,
    text: &str,
) -> DispatchOutcome {
    type_burst(p, host, clock, text).await;
    p.feed_key(host, "Enter").await.expect("burst should commit")
}

#[tokio::test]
async fn burst_commits_once_and_adds_to_cart() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    let mut host = ScriptedHost::default();
    host.sell_results
        .push_back(Ok(LookupOutcome::AddToCart(product("p1", Some(5)))));

    let outcome = scan_value(&mut p, &mut host, &clock, "bc-p1").await;
    assert_eq!(
        outcome,
        DispatchOutcome::AddedToCart {
            item_id: "p1".to_string(),
            quantity: 1
        }
    );

    let cart = p.dispatcher().cart();
    assert_eq!(cart.items().len(), 1);
    assert_eq!(cart.totals().total, Money::from_minor(1500));

    // The trailing Enter of the scanner consumed the buffer; a stray extra
    // Enter dispatches nothing.
    assert!(p.feed_key(&mut host, "Enter").await.is_none());
}

#[tokio::test]
async fn human_typing_never_reaches_the_dispatcher() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    let mut host = ScriptedHost::default();

    for c in "12345678".chars() {
        clock.advance(250); // human cadence
        assert!(p.feed_key(&mut host, &c.to_string()).await.is_none());
    }
    assert!(p.feed_key(&mut host, "Enter").await.is_none());
    assert_eq!(host.lookup_count, 0);
}

#[tokio::test]
async fn idle_commit_dispatches_without_terminator() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    let mut host = ScriptedHost::default();
    host.sell_results
        .push_back(Ok(LookupOutcome::AddToCart(product("p1", Some(5)))));

    type_burst(&mut p, &mut host, &clock, "bc-p1").await;
    assert!(p.poll_idle(&mut host).await.is_none()); // deadline not reached

    clock.advance(121);
    let outcome = p.poll_idle(&mut host).await.expect("idle commit due");
    assert!(matches!(outcome, DispatchOutcome::AddedToCart { .. }));
}

#[tokio::test]
async fn same_value_700ms_apart_is_a_keyed_duplicate() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    let mut host = ScriptedHost::default();
    host.sell_results
        .push_back(Ok(LookupOutcome::AddToCart(product("p1", Some(10)))));

    scan_value(&mut p, &mut host, &clock, "1111").await;

    // Past the 600 ms raw window, inside the 800 ms keyed window.
    clock.advance(700);
    let outcome = scan_value(&mut p, &mut host, &clock, "1111").await;
    assert_eq!(outcome, DispatchOutcome::DroppedKeyedDuplicate);
    assert_eq!(p.dispatcher().cart().items()[0].quantity, 1);
    assert_eq!(host.lookup_count, 1);
}

#[tokio::test]
async fn scan_storm_trips_cooldown_with_one_notice() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    let mut host = ScriptedHost::default();

    for i in 0..12 {
        host.sell_results.push_back(Ok(LookupOutcome::Ignored));
        let outcome = scan_value(&mut p, &mut host, &clock, &format!("code-{i:04}")).await;
        assert_eq!(outcome, DispatchOutcome::Ignored, "scan {i}");
        clock.advance(30);
    }

    // 13th scan inside the window trips the guard, with exactly one notice.
    let outcome = scan_value(&mut p, &mut host, &clock, "code-0012").await;
    assert_eq!(outcome, DispatchOutcome::DroppedStorm { notified: true });
    let outcome = scan_value(&mut p, &mut host, &clock, "code-0013").await;
    assert_eq!(outcome, DispatchOutcome::DroppedStorm { notified: false });
    assert_eq!(
        host.notices
            .iter()
            .filter(|n| n.message.contains("too fast"))
            .count(),
        1
    );

    // After the cooldown, scanning works again.
    clock.advance(1600);
    host.sell_results
        .push_back(Ok(LookupOutcome::AddToCart(product("p9", Some(3)))));
    let outcome = scan_value(&mut p, &mut host, &clock, "bc-p9").await;
    assert!(matches!(outcome, DispatchOutcome::AddedToCart { .. }));
}

#[tokio::test]
async fn store_deactivation_stops_lookups_locally() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    let mut host = ScriptedHost::default();
    host.sell_results.push_back(Err(LookupError::StoreInactive));

    let outcome = scan_value(&mut p, &mut host, &clock, "1111").await;
    assert_eq!(outcome, DispatchOutcome::RejectedStoreInactive);
    assert!(!p.dispatcher().store_active());

    // Subsequent scans are rejected before any round trip.
    clock.advance(2000);
    let outcome = scan_value(&mut p, &mut host, &clock, "2222").await;
    assert_eq!(outcome, DispatchOutcome::RejectedStoreInactive);
    assert_eq!(host.lookup_count, 1);

    // Re-activation restores the flow.
    p.dispatcher_mut().set_store_active(true);
    clock.advance(2000);
    host.sell_results
        .push_back(Ok(LookupOutcome::AddToCart(product("p1", Some(2)))));
    let outcome = scan_value(&mut p, &mut host, &clock, "bc-p1").await;
    assert!(matches!(outcome, DispatchOutcome::AddedToCart { .. }));
}

#[tokio::test]
async fn purchase_flow_is_confirmed_before_drafting() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    p.dispatcher_mut().set_intent(ScanIntent::Purchase);
    let mut host = ScriptedHost::default();
    host.purchase_results
        .push_back(Ok(Some(product("p1", Some(40)))));

    let outcome = scan_value(&mut p, &mut host, &clock, "bc-p1").await;
    assert_eq!(outcome, DispatchOutcome::ConfirmationRequested);

    // A second purchase scan while one is pending is dropped.
    clock.advance(700);
    let outcome = scan_value(&mut p, &mut host, &clock, "bc-p2").await;
    assert_eq!(outcome, DispatchOutcome::ConfirmationPending);

    let outcome = p
        .dispatcher_mut()
        .confirm_pending_purchase(&mut host, true)
        .await;
    assert_eq!(
        outcome,
        DispatchOutcome::AddedToPurchaseDraft {
            product_id: "p1".to_string()
        }
    );
    assert_eq!(host.draft_adds.len(), 1);
}

#[tokio::test]
async fn declined_purchase_allows_immediate_rescan() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    p.dispatcher_mut().set_intent(ScanIntent::Purchase);
    let mut host = ScriptedHost::default();

    scan_value(&mut p, &mut host, &clock, "bc-p1").await;
    let outcome = p
        .dispatcher_mut()
        .confirm_pending_purchase(&mut host, false)
        .await;
    assert_eq!(outcome, DispatchOutcome::ConfirmationDeclined);

    clock.advance(100);
    let outcome = scan_value(&mut p, &mut host, &clock, "bc-p1").await;
    assert_eq!(outcome, DispatchOutcome::ConfirmationRequested);
}

#[tokio::test]
async fn camera_decode_joins_past_the_reconstructor() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    let mut host = ScriptedHost::default();
    host.sell_results
        .push_back(Ok(LookupOutcome::AddToCart(product("p1", Some(5)))));

    let outcome = p
        .dispatch_camera(&mut host, "bc-p1", Some("ean_13".to_string()))
        .await;
    assert!(matches!(outcome, DispatchOutcome::AddedToCart { .. }));

    // Frame repeat 200 ms later: raw duplicate window drops it.
    clock.advance(200);
    let outcome = p.dispatch_camera(&mut host, "bc-p1", None).await;
    assert_eq!(outcome, DispatchOutcome::DroppedDuplicate);
}

#[tokio::test]
async fn health_ping_fires_for_hid_but_not_camera() {
    let clock = ManualClock::new();
    let pings = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pings);
    let mut p = pipeline(&clock).with_health_ping(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let mut host = ScriptedHost::default();

    host.sell_results.push_back(Ok(LookupOutcome::Ignored));
    scan_value(&mut p, &mut host, &clock, "bc-p1").await;
    assert_eq!(pings.load(Ordering::SeqCst), 1);

    clock.advance(2000);
    host.sell_results.push_back(Ok(LookupOutcome::Ignored));
    p.dispatch_camera(&mut host, "bc-p2", None).await;
    assert_eq!(pings.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn text_field_stream_commits_via_embedded_newline() {
    let clock = ManualClock::new();
    let mut p = pipeline(&clock);
    let mut host = ScriptedHost::default();
    host.sell_results
        .push_back(Ok(LookupOutcome::AddToCart(product("p1", Some(5)))));

    assert!(p.feed_text(&mut host, "bc-").await.is_empty());
    clock.advance(20);
    assert!(p.feed_text(&mut host, "bc-p1").await.is_empty());
    clock.advance(20);

    let outcomes = p.feed_text(&mut host, "bc-p1\n").await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], DispatchOutcome::AddedToCart { .. }));
}
