//! # Scan Dispatcher
//!
//! Routes committed scans through the guard chain, resolves them into
//! products via the host, and applies cart side effects.
//!
//! ## Guard Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CommittedScan                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. raw duplicate window (600 ms, same raw value)                       │
//! │  2. purchase confirmation slot (Purchase intent only, single in-flight) │
//! │  3. keyed duplicate window (800 ms, same intent+mode+value)             │
//! │  4. store-inactive gate (local, no round trip)                          │
//! │  5. storm guard (12 / 2000 ms → 1500 ms cooldown)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  resolution by (intent, mode) via ScanHost                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  stock cache refresh → CartLedger::add_item / purchase draft            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Purchase scans are split-phase: the first dispatch parks the scan in a
//! single-slot pending buffer and asks the host to confirm; the actual
//! resolution runs in [`Dispatcher::confirm_pending_purchase`]. A second
//! purchase scan arriving while one is pending is dropped, which keeps the
//! at-most-one-in-flight invariant without any queueing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vend_core::{CartItem, CartLedger, CartStore, Money, StockLimitReason};

use crate::clock::Clock;
use crate::error::LookupError;
use crate::guards::{DuplicateWindow, StormGuard, StormVerdict};
use crate::reconstructor::CommittedScan;
use crate::stock_cache::StockCache;

// =============================================================================
// Scan session state
// =============================================================================

/// What the operator is doing with the scanner right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanIntent {
    /// Ringing up a customer sale.
    Sell,
    /// Building a supplier purchase draft.
    Purchase,
}

/// Sub-mode within the Sell intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanMode {
    /// Scans add products to the cart.
    Sell,
    /// Scans register unknown barcodes into the catalog instead of selling.
    Digitise,
}

/// A product as resolved by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    /// None means the catalog has no price yet (prompt the operator).
    pub price_minor: Option<Money>,
    pub currency: String,
    pub barcode: Option<String>,
    /// None means stock tracking is off or the figure is not known.
    pub available_stock: Option<i64>,
}

// =============================================================================
// Host boundary
// =============================================================================

/// Severity of an operator-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeTone {
    Info,
    Warning,
    Error,
}

/// Operator-facing message emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub tone: NoticeTone,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Notice {
            tone: NoticeTone::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Notice {
            tone: NoticeTone::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            tone: NoticeTone::Error,
            message: message.into(),
        }
    }
}

/// What a Sell-intent resolution decided.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// Value recognized but deliberately not actionable (e.g. an internal
    /// coupon code the host consumed itself).
    Ignored,
    /// Known product with a price: add it to the cart.
    AddToCart(Product),
    /// Known product without a price: operator must supply one.
    PromptPrice(Product),
    /// Digitise mode: the barcode was recorded against the catalog.
    Digitised(Product),
    /// Digitise mode: this barcode is already in the catalog.
    AlreadyDigitised,
}

/// Everything the dispatcher needs from its embedding application.
///
/// Implemented by the shell that owns the UI and the backend connection.
/// All lookups are async (they may hit the network); notices are sync
/// fire-and-forget.
#[allow(async_fn_in_trait)]
pub trait ScanHost {
    /// Resolves a Sell-intent scan into a product decision.
    async fn resolve_product(
        &mut self,
        value: &str,
        format: Option<&str>,
        mode: ScanMode,
        online: bool,
    ) -> Result<LookupOutcome, LookupError>;

    /// Resolves a confirmed Purchase-intent scan. `Ok(None)` means the
    /// barcode is unknown to the catalog.
    async fn resolve_for_purchase(
        &mut self,
        value: &str,
        format: Option<&str>,
    ) -> Result<Option<Product>, LookupError>;

    /// Opens the manual price entry flow for a priceless product.
    async fn prompt_price(&mut self, product: Product);

    /// Appends a resolved product to the open purchase draft.
    async fn add_to_purchase_draft(&mut self, product: Product);

    /// Device credentials were rejected mid-session. Return true when fully
    /// handled (e.g. re-registration flow started); false lets the
    /// dispatcher show its default failure notice.
    async fn handle_device_auth_error(&mut self, message: &str) -> bool;

    /// Shows an operator-facing notice.
    fn notify(&mut self, notice: Notice);

    /// Clears the currently shown notice, if any.
    fn clear_notice(&mut self) {}
}

// =============================================================================
// Configuration
// =============================================================================

/// Dispatcher tuning and session state.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub intent: ScanIntent,
    pub mode: ScanMode,

    /// Gate flipped locally when the backend reports the store inactive.
    pub store_active: bool,

    /// Passed through to lookups so the host can pick local vs remote.
    pub online: bool,

    /// Raw duplicate window; 0 disables. Default: 600 ms.
    pub raw_duplicate_window_ms: u64,

    /// Keyed (intent, mode, value) duplicate window; 0 disables.
    /// Default: 800 ms.
    pub keyed_duplicate_window_ms: u64,

    pub storm_max_scans: usize,
    pub storm_window_ms: u64,
    pub storm_cooldown_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            intent: ScanIntent::Sell,
            mode: ScanMode::Sell,
            store_active: true,
            online: true,
            raw_duplicate_window_ms: 600,
            keyed_duplicate_window_ms: 800,
            storm_max_scans: StormGuard::DEFAULT_MAX_SCANS,
            storm_window_ms: StormGuard::DEFAULT_WINDOW_MS,
            storm_cooldown_ms: StormGuard::DEFAULT_COOLDOWN_MS,
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// What happened to one dispatched scan. Returned to the caller for
/// logging/telemetry; user feedback goes through [`ScanHost::notify`].
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Dropped by the raw duplicate window.
    DroppedDuplicate,
    /// Dropped by the keyed duplicate window.
    DroppedKeyedDuplicate,
    /// Dropped by the storm guard; `notified` is true for the one drop per
    /// cooldown that carries the operator notice.
    DroppedStorm { notified: bool },
    /// Rejected locally because the store is inactive.
    RejectedStoreInactive,
    /// Purchase scan parked; host must confirm.
    ConfirmationRequested,
    /// A purchase confirmation is already in flight; this scan was dropped.
    ConfirmationPending,
    /// Operator declined the pending purchase.
    ConfirmationDeclined,
    /// Line added or incremented.
    AddedToCart { item_id: String, quantity: i64 },
    /// The stock cap refused the increment (details via
    /// `cart().last_stock_limit()`).
    StockLimited { item_id: String },
    /// Manual price entry opened.
    PricePrompted { product_id: String },
    /// Barcode recorded against the catalog (Digitise mode).
    Digitised { product_id: String },
    /// Confirmed purchase scan appended to the draft.
    AddedToPurchaseDraft { product_id: String },
    /// Nothing actionable (empty value, host consumed it, ...).
    Ignored,
    /// Lookup failed; a notice was emitted.
    Failed,
}

/// Purchase scan awaiting operator confirmation.
#[derive(Debug, Clone)]
struct PendingPurchase {
    value: String,
    format: Option<String>,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// The scan dispatcher. Owns the guard chain, the stock cache, and the
/// cart ledger; borrows a [`ScanHost`] per call instead of owning one.
pub struct Dispatcher {
    config: DispatcherConfig,
    raw_window: DuplicateWindow<String>,
    keyed_window: DuplicateWindow<(ScanIntent, ScanMode, String)>,
    storm: StormGuard,
    stock_cache: StockCache,
    cart: CartLedger,
    pending_purchase: Option<PendingPurchase>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, clock: Arc<dyn Clock>) -> Self {
        let stock_cache = StockCache::new();
        let cart = CartLedger::new(Arc::new(stock_cache.clone()));
        Dispatcher {
            raw_window: DuplicateWindow::new(config.raw_duplicate_window_ms, Arc::clone(&clock)),
            keyed_window: DuplicateWindow::new(
                config.keyed_duplicate_window_ms,
                Arc::clone(&clock),
            ),
            storm: StormGuard::new(
                config.storm_max_scans,
                config.storm_window_ms,
                config.storm_cooldown_ms,
                clock,
            ),
            config,
            stock_cache,
            cart,
            pending_purchase: None,
        }
    }

    /// Attaches a persistence hook to a freshly built dispatcher. Replaces
    /// the (empty) ledger, so call before any scans.
    pub fn with_cart_store(mut self, store: Arc<dyn CartStore>) -> Self {
        self.cart = CartLedger::new(Arc::new(self.stock_cache.clone())).with_store(store);
        self
    }

    pub fn cart(&self) -> &CartLedger {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> &mut CartLedger {
        &mut self.cart
    }

    pub fn stock_cache(&self) -> &StockCache {
        &self.stock_cache
    }

    pub fn store_active(&self) -> bool {
        self.config.store_active
    }

    pub fn set_store_active(&mut self, active: bool) {
        self.config.store_active = active;
    }

    pub fn set_online(&mut self, online: bool) {
        self.config.online = online;
    }

    pub fn set_intent(&mut self, intent: ScanIntent) {
        self.config.intent = intent;
    }

    pub fn set_mode(&mut self, mode: ScanMode) {
        self.config.mode = mode;
    }

    pub fn has_pending_purchase(&self) -> bool {
        self.pending_purchase.is_some()
    }

    /// Routes one committed scan.
    pub async fn dispatch<H: ScanHost>(
        &mut self,
        host: &mut H,
        scan: CommittedScan,
    ) -> DispatchOutcome {
        let value = scan.value.trim().to_string();
        if value.is_empty() {
            return DispatchOutcome::Ignored;
        }

        // Guard 1: raw duplicate (scanner double-fire, camera frame repeat).
        if self.raw_window.is_duplicate(&value) {
            debug!(value = %value, "dropped: raw duplicate");
            return DispatchOutcome::DroppedDuplicate;
        }

        // Guard 2: purchase confirmation slot. Purchase scans park here and
        // resume in confirm_pending_purchase. They are never recorded in the
        // raw window: the slot itself absorbs re-fires while the confirmation
        // is open, and a raw entry would swallow a deliberate rescan of the
        // same barcode right after the confirmation resolves.
        if self.config.intent == ScanIntent::Purchase {
            if self.pending_purchase.is_some() {
                debug!(value = %value, "dropped: purchase confirmation in flight");
                return DispatchOutcome::ConfirmationPending;
            }
            self.pending_purchase = Some(PendingPurchase {
                value,
                format: scan.format,
            });
            return DispatchOutcome::ConfirmationRequested;
        }

        self.raw_window.record(value.clone());

        if let Some(outcome) = self.run_common_guards(host, &value) {
            return outcome;
        }

        let mode = self.config.mode;
        let result = host
            .resolve_product(&value, scan.format.as_deref(), mode, self.config.online)
            .await;

        // The store may have been deactivated out-of-band while the lookup
        // was in flight; a stale success must not mutate the cart.
        if !self.config.store_active {
            return self.reject_store_inactive(host);
        }

        match result {
            Ok(outcome) => self.apply_sell_outcome(host, &value, outcome).await,
            Err(err) => self.handle_lookup_failure(host, err).await,
        }
    }

    /// Second phase of a purchase scan. Whether accepted or declined, the
    /// parked value never occupied the raw window, so an immediate rescan
    /// of the same barcode opens a fresh confirmation instead of being
    /// swallowed as a duplicate.
    pub async fn confirm_pending_purchase<H: ScanHost>(
        &mut self,
        host: &mut H,
        accepted: bool,
    ) -> DispatchOutcome {
        let pending = match self.pending_purchase.take() {
            Some(p) => p,
            None => return DispatchOutcome::Ignored,
        };

        if !accepted {
            debug!(value = %pending.value, "purchase declined by operator");
            return DispatchOutcome::ConfirmationDeclined;
        }

        if let Some(outcome) = self.run_common_guards(host, &pending.value) {
            return outcome;
        }

        let result = host
            .resolve_for_purchase(&pending.value, pending.format.as_deref())
            .await;

        if !self.config.store_active {
            return self.reject_store_inactive(host);
        }

        match result {
            Ok(Some(product)) => {
                self.refresh_stock(&product, &pending.value);
                let product_id = product.id.clone();
                host.add_to_purchase_draft(product).await;
                host.clear_notice();
                DispatchOutcome::AddedToPurchaseDraft { product_id }
            }
            Ok(None) => {
                host.notify(Notice::warning(format!(
                    "No product found for \"{}\"",
                    pending.value
                )));
                DispatchOutcome::Failed
            }
            Err(err) => self.handle_lookup_failure(host, err).await,
        }
    }

    // -------------------------------------------------------------------------
    // Guard chain internals
    // -------------------------------------------------------------------------

    /// Guards 3-5, shared by the sell path and the confirmed purchase path.
    /// Returns Some(outcome) when the scan must stop here.
    fn run_common_guards<H: ScanHost>(
        &mut self,
        host: &mut H,
        value: &str,
    ) -> Option<DispatchOutcome> {
        // Guard 3: semantic duplicate past mode routing.
        let key = (self.config.intent, self.config.mode, value.to_string());
        if self.keyed_window.check_and_record(key) {
            debug!(value = %value, "dropped: keyed duplicate");
            return Some(DispatchOutcome::DroppedKeyedDuplicate);
        }

        // Guard 4: local store-inactive gate, no round trip.
        if !self.config.store_active {
            return Some(self.reject_store_inactive(host));
        }

        // Guard 5: storm guard.
        match self.storm.check() {
            StormVerdict::Pass => None,
            StormVerdict::DropWithNotice => {
                host.notify(Notice::warning(
                    "Scanning too fast; pausing for a moment",
                ));
                Some(DispatchOutcome::DroppedStorm { notified: true })
            }
            StormVerdict::DropSilently => {
                Some(DispatchOutcome::DroppedStorm { notified: false })
            }
        }
    }

    fn reject_store_inactive<H: ScanHost>(&mut self, host: &mut H) -> DispatchOutcome {
        host.notify(Notice::warning(
            "This store is not active; scanning is disabled",
        ));
        DispatchOutcome::RejectedStoreInactive
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    async fn apply_sell_outcome<H: ScanHost>(
        &mut self,
        host: &mut H,
        value: &str,
        outcome: LookupOutcome,
    ) -> DispatchOutcome {
        match outcome {
            LookupOutcome::Ignored => DispatchOutcome::Ignored,

            LookupOutcome::AddToCart(product) => {
                // A product without a price cannot be rung up no matter
                // what the host decided.
                let price = match product.price_minor {
                    Some(p) => p,
                    None => {
                        let product_id = product.id.clone();
                        host.prompt_price(product).await;
                        return DispatchOutcome::PricePrompted { product_id };
                    }
                };
                self.refresh_stock(&product, value);
                self.add_product_to_cart(host, product, price)
            }

            LookupOutcome::PromptPrice(product) => {
                self.refresh_stock(&product, value);
                let product_id = product.id.clone();
                host.prompt_price(product).await;
                DispatchOutcome::PricePrompted { product_id }
            }

            LookupOutcome::Digitised(product) => {
                host.notify(Notice::info(format!("\"{}\" digitised", product.name)));
                DispatchOutcome::Digitised {
                    product_id: product.id,
                }
            }

            LookupOutcome::AlreadyDigitised => {
                host.notify(Notice::info("This barcode is already digitised"));
                DispatchOutcome::Ignored
            }
        }
    }

    fn add_product_to_cart<H: ScanHost>(
        &mut self,
        host: &mut H,
        product: Product,
        price: Money,
    ) -> DispatchOutcome {
        let mut item = CartItem::new(
            product.id.clone(),
            product.name.clone(),
            price,
            product.currency.clone(),
        );
        item.barcode = product.barcode.clone();

        let before = self.line_quantity(&product.id);
        self.cart.add_item(item, 1);
        let after = self.line_quantity(&product.id);

        if after > before {
            debug!(product_id = %product.id, quantity = after, "added to cart");
            // A successful add supersedes any stale warning on screen.
            host.clear_notice();
            return DispatchOutcome::AddedToCart {
                item_id: product.id,
                quantity: after,
            };
        }

        // The cap engine refused the increment; tell the operator why.
        if let Some(event) = self.cart.last_stock_limit() {
            let message = match event.reason {
                StockLimitReason::OutOfStock => {
                    format!("\"{}\" is out of stock", product.name)
                }
                StockLimitReason::Capped => format!(
                    "Only {} of \"{}\" in stock",
                    event.available_stock.unwrap_or(0),
                    product.name
                ),
                StockLimitReason::UnknownStock => format!(
                    "Stock for \"{}\" is unknown; not added",
                    product.name
                ),
            };
            host.notify(Notice::warning(message));
        }
        DispatchOutcome::StockLimited {
            item_id: product.id,
        }
    }

    fn line_quantity(&self, item_id: &str) -> i64 {
        self.cart
            .items()
            .iter()
            .find(|i| i.id == item_id)
            .map(|i| i.quantity)
            .unwrap_or(0)
    }

    /// Publishes the freshest stock figure under every identifier this
    /// product answers to, so the next scan caps correctly whichever one
    /// it arrives by.
    fn refresh_stock(&self, product: &Product, scanned_value: &str) {
        let Some(stock) = product.available_stock else {
            return;
        };
        self.stock_cache.set(&product.id, stock);
        if let Some(barcode) = &product.barcode {
            self.stock_cache.set(barcode, stock);
        }
        if scanned_value != product.id && Some(scanned_value) != product.barcode.as_deref() {
            self.stock_cache.set(scanned_value, stock);
        }
    }

    async fn handle_lookup_failure<H: ScanHost>(
        &mut self,
        host: &mut H,
        err: LookupError,
    ) -> DispatchOutcome {
        match err {
            LookupError::DeviceAuth(message) => {
                warn!(%message, "device auth rejected during lookup");
                if !host.handle_device_auth_error(&message).await {
                    host.notify(Notice::error("Could not resolve scan; please retry"));
                }
                DispatchOutcome::Failed
            }
            LookupError::StoreInactive => {
                // Remember locally so later scans fail fast without a
                // round trip.
                self.config.store_active = false;
                self.reject_store_inactive(host)
            }
            other => {
                warn!(error = %other, "product lookup failed");
                host.notify(Notice::error("Could not resolve scan; please retry"));
                DispatchOutcome::Failed
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
