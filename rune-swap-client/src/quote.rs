//! The quote manager
//!
//! Keeps at most one current quote consistent with the user's latest
//! trade parameters without flooding the quoting service: parameter
//! changes are debounced, fetches are keyed and throttled, and late
//! responses to superseded requests are discarded via a request-identity
//! token. All counters and instants live as explicit fields here, one
//! manager per trading session.
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use bigdecimal::{BigDecimal, FromPrimitive, RoundingMode, Zero};
use rune_swap_api::{is_valid_pair, Asset, Quote, QuoteRequest, QuoteResponse};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::amount::{sanitize_localized_number, to_display_units};
use crate::clients::QuoteService;
use crate::error::{QuoteFetchFailure, SwapClientError, SwapClientResult};
use crate::state::{SwapAction, SwapStateHandle};

// -------------
// | Constants |
// -------------

/// How long trade parameters must stay unchanged before they are settled
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(1500);
/// The minimum spacing between two fetches for the same quote key
const THROTTLE_WINDOW: Duration = Duration::from_millis(3000);
/// The minimum spacing between two invalid-parameter state resets
const RESET_COOLDOWN: Duration = Duration::from_secs(5);
/// The number of decimals in the base asset's (BTC) representation
const BASE_ASSET_DECIMALS: u8 = 8;

/// The counterparty address quotes are priced against before a wallet is
/// connected
pub const PLACEHOLDER_COUNTERPARTY_ADDRESS: &str = "bc1qm34lsc65zpw79lxes69zkqmk6ee3ewf0j77s3h";

// ---------
// | Types |
// ---------

/// The user's requested trade parameters, as entered
#[derive(Clone, Debug, Default)]
pub struct TradeParams {
    /// The raw input amount, possibly locale-formatted
    pub input_amount: String,
    /// The asset being sold, once resolved
    pub asset_in: Option<Asset>,
    /// The asset being bought, once resolved
    pub asset_out: Option<Asset>,
    /// The connected wallet's address, if any
    pub counterparty_address: Option<String>,
    /// A reference USD price for the input asset, for display math
    pub reference_price: Option<f64>,
}

/// The tuple identifying whether a new quote fetch is needed
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    /// The canonical input amount
    pub amount: String,
    /// The id of the asset being sold
    pub asset_in: String,
    /// The id of the asset being bought
    pub asset_out: String,
}

/// Trade parameters after validation and canonicalization
#[derive(Clone, Debug)]
struct SettledParams {
    /// The parsed, positive input amount
    amount: BigDecimal,
    /// The asset being sold
    asset_in: Asset,
    /// The asset being bought
    asset_out: Asset,
    /// The counterparty address, with the placeholder applied
    counterparty_address: String,
    /// A reference USD price for the input asset
    reference_price: Option<f64>,
    /// The quote key these parameters map to
    key: QuoteKey,
}

/// The quote manager's visible output state
#[derive(Clone, Debug, Default)]
pub struct QuoteSnapshot {
    /// The current quote, if one is held
    pub quote: Option<Quote>,
    /// When the current quote was fetched
    pub fetched_at: Option<Instant>,
    /// The quote key the current quote was fetched for
    pub key: Option<QuoteKey>,
    /// The derived display output amount
    pub output_amount: Option<BigDecimal>,
    /// The derived exchange-rate text
    pub exchange_rate: Option<String>,
    /// The input amount's USD value, from the reference price
    pub input_usd_value: Option<BigDecimal>,
}

/// Request bookkeeping: identity tokens, keys and timers
#[derive(Debug, Default)]
struct Bookkeeping {
    /// The identity token of the most recently issued fetch
    latest_token: u64,
    /// The key of the last issued fetch
    last_issued_key: Option<QuoteKey>,
    /// The key the throttle guard applies to
    throttle_key: Option<QuoteKey>,
    /// When the last fetch was started
    last_fetch_started: Option<Instant>,
    /// When the last invalid-parameter reset was dispatched
    last_auto_reset: Option<Instant>,
}

// -----------
// | Manager |
// -----------

/// The quote manager for one trading session
pub struct QuoteManager {
    /// The quote service to fetch from
    quote_service: Arc<dyn QuoteService>,
    /// The shared swap process state
    state: SwapStateHandle,
    /// The manager's visible output state
    snapshot: Mutex<QuoteSnapshot>,
    /// Request bookkeeping
    bookkeeping: Mutex<Bookkeeping>,
}

impl QuoteManager {
    /// Create a manager for one trading session
    pub fn new(quote_service: Arc<dyn QuoteService>, state: SwapStateHandle) -> Self {
        Self {
            quote_service,
            state,
            snapshot: Mutex::new(QuoteSnapshot::default()),
            bookkeeping: Mutex::new(Bookkeeping::default()),
        }
    }

    /// Spawn the parameter intake worker and return its sender
    ///
    /// The worker debounces valid parameter changes: a change only
    /// settles once no newer change has arrived for [`DEBOUNCE_WINDOW`].
    /// Invalid input skips the debounce and clears quote state at once.
    pub fn spawn_intake(self: &Arc<Self>) -> mpsc::UnboundedSender<TradeParams> {
        let (param_tx, mut param_rx) = mpsc::unbounded_channel::<TradeParams>();
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(first) = param_rx.recv().await {
                let mut params = first;
                let mut channel_closed = false;

                // Absorb newer parameters until the input settles;
                // invalid input exits immediately, even mid-debounce
                while Self::settle(&params).is_some() {
                    match tokio::time::timeout(DEBOUNCE_WINDOW, param_rx.recv()).await {
                        Ok(Some(newer)) => params = newer,
                        Ok(None) => {
                            channel_closed = true;
                            break;
                        },
                        Err(_) => break,
                    }
                }

                manager.handle_settled_params(&params).await;
                if channel_closed {
                    break;
                }
            }
        });

        param_tx
    }

    /// Handle trade parameters that have settled through the debounce
    pub async fn handle_settled_params(&self, params: &TradeParams) {
        let Some(settled) = Self::settle(params) else {
            self.clear_quote();
            self.maybe_auto_reset();
            return;
        };

        let Some((token, request)) = self.begin_fetch(&settled) else {
            return;
        };

        let result = self.quote_service.get_quote(request).await;
        self.complete_fetch(token, &settled, result);
    }

    /// Snapshot the manager's visible output state
    pub fn current_quote(&self) -> QuoteSnapshot {
        self.snapshot.lock().expect("quote snapshot lock poisoned").clone()
    }

    /// Allow the next settled parameters to re-fetch even if the quote
    /// key is unchanged
    ///
    /// This is the explicit user-triggered re-fetch path after a quote
    /// expires; the same-key throttle still applies.
    pub fn force_refresh(&self) {
        let mut book = self.bookkeeping.lock().expect("quote bookkeeping lock poisoned");
        book.last_issued_key = None;
    }

    // -----------
    // | Helpers |
    // -----------

    /// Validate and canonicalize raw trade parameters
    fn settle(params: &TradeParams) -> Option<SettledParams> {
        let canonical = sanitize_localized_number(&params.input_amount);
        let amount = BigDecimal::from_str(&canonical).ok()?;
        if amount <= BigDecimal::zero() {
            return None;
        }

        let asset_in = params.asset_in.clone()?;
        let asset_out = params.asset_out.clone()?;
        if !is_valid_pair(&asset_in, &asset_out) {
            return None;
        }

        let amount_text = amount.normalized().to_string();
        let key = QuoteKey {
            amount: amount_text,
            asset_in: asset_in.id.clone(),
            asset_out: asset_out.id.clone(),
        };

        let counterparty_address = params
            .counterparty_address
            .clone()
            .filter(|addr| !addr.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_COUNTERPARTY_ADDRESS.to_string());

        Some(SettledParams {
            amount,
            asset_in,
            asset_out,
            counterparty_address,
            reference_price: params.reference_price,
            key,
        })
    }

    /// Begin a fetch for the given settled parameters
    ///
    /// Returns the request-identity token and the request to issue, or
    /// `None` if the fetch is redundant (unchanged key) or throttled.
    fn begin_fetch(&self, settled: &SettledParams) -> Option<(u64, QuoteRequest)> {
        let mut book = self.bookkeeping.lock().expect("quote bookkeeping lock poisoned");
        let now = Instant::now();

        // The throttle guard only applies to re-entry for the same key; a
        // key change resets it immediately
        if let (Some(throttle_key), Some(started)) = (&book.throttle_key, book.last_fetch_started) {
            if *throttle_key == settled.key && now.duration_since(started) < THROTTLE_WINDOW {
                debug!(key = ?settled.key, "throttling re-entrant quote fetch");
                return None;
            }
        }

        if book.last_issued_key.as_ref() == Some(&settled.key) {
            debug!(key = ?settled.key, "quote key unchanged, skipping fetch");
            return None;
        }

        book.latest_token += 1;
        let token = book.latest_token;
        book.last_issued_key = Some(settled.key.clone());
        book.throttle_key = Some(settled.key.clone());
        book.last_fetch_started = Some(now);
        drop(book);

        self.state.dispatch(SwapAction::FetchQuoteStart);

        let rune = if settled.asset_in.is_base_asset { &settled.asset_out } else { &settled.asset_in };
        let request = QuoteRequest {
            amount: settled.key.amount.clone(),
            token_name: rune.name.clone(),
            counterparty_address: settled.counterparty_address.clone(),
            sell_direction: !settled.asset_in.is_base_asset,
        };

        Some((token, request))
    }

    /// Complete a fetch, discarding it if a newer fetch has been issued
    fn complete_fetch(
        &self,
        token: u64,
        settled: &SettledParams,
        result: SwapClientResult<QuoteResponse>,
    ) {
        {
            let book = self.bookkeeping.lock().expect("quote bookkeeping lock poisoned");
            if token != book.latest_token {
                debug!(token, latest = book.latest_token, "discarding superseded quote response");
                return;
            }
        }

        let parsed = result
            .and_then(|response| Quote::try_from(response).map_err(SwapClientError::parsing));

        match parsed {
            Ok(quote) => {
                let (output_amount, exchange_rate, input_usd_value) =
                    Self::derive_display_fields(&quote, settled);

                let mut snapshot = self.snapshot.lock().expect("quote snapshot lock poisoned");
                *snapshot = QuoteSnapshot {
                    quote: Some(quote),
                    fetched_at: Some(Instant::now()),
                    key: Some(settled.key.clone()),
                    output_amount,
                    exchange_rate,
                    input_usd_value,
                };
                drop(snapshot);

                info!(key = ?settled.key, "stored fresh quote");
                self.state.dispatch(SwapAction::FetchQuoteSuccess);
            },
            Err(err) => {
                let failure = QuoteFetchFailure::classify(&err.to_string());
                warn!(%failure, "quote fetch failed");
                self.clear_quote();
                self.state.dispatch(SwapAction::FetchQuoteError(failure.to_string()));
            },
        }
    }

    /// Derive the display output amount, exchange-rate text and USD value
    /// from a stored quote, using exact-decimal arithmetic throughout
    fn derive_display_fields(
        quote: &Quote,
        settled: &SettledParams,
    ) -> (Option<BigDecimal>, Option<String>, Option<BigDecimal>) {
        let output_amount = match &quote.total_formatted_amount {
            Some(formatted) => BigDecimal::from_str(&sanitize_localized_number(formatted)).ok(),
            // Without a formatted amount the total price stands in, given
            // in sats of the base asset
            None => quote.total_price.and_then(|sats| {
                if sats < 0.0 {
                    return None;
                }
                to_display_units(&format!("{:.0}", sats.trunc()), BASE_ASSET_DECIMALS).ok()
            }),
        };

        let exchange_rate = output_amount.as_ref().and_then(|output| {
            if settled.amount.is_zero() {
                return None;
            }
            let rate = (output / &settled.amount)
                .with_scale_round(8, RoundingMode::Down)
                .normalized();
            Some(format!(
                "1 {} = {} {}",
                settled.asset_in.name, rate, settled.asset_out.name
            ))
        });

        let input_usd_value = settled
            .reference_price
            .and_then(BigDecimal::from_f64)
            .map(|price| (&settled.amount * price).with_scale_round(2, RoundingMode::Down));

        (output_amount, exchange_rate, input_usd_value)
    }

    /// Clear the visible quote state
    fn clear_quote(&self) {
        let mut snapshot = self.snapshot.lock().expect("quote snapshot lock poisoned");
        *snapshot = QuoteSnapshot::default();
    }

    /// Dispatch a full state reset for invalid parameters, gated by a
    /// cooldown and never while a swap is in flight
    fn maybe_auto_reset(&self) {
        if self.state.snapshot().is_swapping {
            return;
        }

        let mut book = self.bookkeeping.lock().expect("quote bookkeeping lock poisoned");
        let now = Instant::now();
        if let Some(last) = book.last_auto_reset {
            if now.duration_since(last) < RESET_COOLDOWN {
                return;
            }
        }
        book.last_auto_reset = Some(now);
        drop(book);

        self.state.dispatch(SwapAction::ResetSwap);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rune_swap_api::serialization::StringOrNumber;
    use rune_swap_api::RawQuoteOrder;

    use super::*;
    use crate::state::{SwapProcessState, SwapStep};

    /// A quote service that counts calls and returns a fixed response
    struct CountingQuoteService {
        /// The number of fetches issued so far
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteService for CountingQuoteService {
        async fn get_quote(&self, _request: QuoteRequest) -> SwapClientResult<QuoteResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(sample_response("0.05"))
        }
    }

    /// Build a manager around a counting service
    fn counting_manager() -> (Arc<QuoteManager>, Arc<CountingQuoteService>, SwapStateHandle) {
        let service = Arc::new(CountingQuoteService { calls: AtomicUsize::new(0) });
        let state = SwapStateHandle::new();
        let manager =
            Arc::new(QuoteManager::new(service.clone() as Arc<dyn QuoteService>, state.clone()));
        (manager, service, state)
    }

    /// Build trade parameters for a Rune purchase of `amount` BTC
    fn params(amount: &str) -> TradeParams {
        TradeParams {
            input_amount: amount.to_string(),
            asset_in: Some(Asset::base("btc", "BTC")),
            asset_out: Some(Asset::rune("840000:3", "DOG", 5)),
            counterparty_address: None,
            reference_price: Some(60_000.0),
        }
    }

    /// Build a quote response with the given formatted output amount
    fn sample_response(formatted: &str) -> QuoteResponse {
        QuoteResponse {
            orders: vec![RawQuoteOrder {
                id: "ord-1".to_string(),
                amount: StringOrNumber::Text("5000".to_string()),
                price: StringOrNumber::Number(2.0),
                side: "Sell".to_string(),
            }],
            total_price: Some(StringOrNumber::Number(10_000.0)),
            total_formatted_amount: Some(formatted.to_string()),
        }
    }

    /// Test that only the most recent fetch's result becomes visible
    #[tokio::test(start_paused = true)]
    async fn test_stale_response_discarded() {
        let (manager, _service, _state) = counting_manager();

        let settled_a = QuoteManager::settle(&params("1")).unwrap();
        let settled_b = QuoteManager::settle(&params("2")).unwrap();

        let (token_a, request_a) = manager.begin_fetch(&settled_a).unwrap();
        let (token_b, _request_b) = manager.begin_fetch(&settled_b).unwrap();
        assert!(token_b > token_a);
        assert_eq!(request_a.counterparty_address, PLACEHOLDER_COUNTERPARTY_ADDRESS);

        // B resolves first; A's late result must be dropped silently
        manager.complete_fetch(token_b, &settled_b, Ok(sample_response("0.1")));
        manager.complete_fetch(token_a, &settled_a, Ok(sample_response("0.05")));

        let snapshot = manager.current_quote();
        assert_eq!(snapshot.key.as_ref(), Some(&settled_b.key));
        assert_eq!(
            snapshot.output_amount,
            Some(BigDecimal::from_str("0.1").unwrap()),
        );
    }

    /// Test that a same-key fetch is throttled within the window and
    /// permitted after it elapses
    #[tokio::test(start_paused = true)]
    async fn test_same_key_fetch_throttled() {
        let (manager, _service, _state) = counting_manager();
        let settled = QuoteManager::settle(&params("1")).unwrap();

        let (token, _request) = manager.begin_fetch(&settled).unwrap();
        manager.complete_fetch(token, &settled, Ok(sample_response("0.05")));

        // An explicit refresh within the throttle window stays blocked
        manager.force_refresh();
        assert!(manager.begin_fetch(&settled).is_none());

        tokio::time::advance(THROTTLE_WINDOW + Duration::from_millis(1)).await;
        assert!(manager.begin_fetch(&settled).is_some());
    }

    /// Test that a key change is never blocked by the old key's throttle
    #[tokio::test(start_paused = true)]
    async fn test_key_change_resets_throttle() {
        let (manager, _service, _state) = counting_manager();
        let settled_a = QuoteManager::settle(&params("1")).unwrap();
        let settled_b = QuoteManager::settle(&params("2")).unwrap();

        assert!(manager.begin_fetch(&settled_a).is_some());
        assert!(manager.begin_fetch(&settled_b).is_some());
    }

    /// Test that an unchanged key issues no redundant fetch
    #[tokio::test(start_paused = true)]
    async fn test_unchanged_key_skips_fetch() {
        let (manager, _service, _state) = counting_manager();
        let settled = QuoteManager::settle(&params("1")).unwrap();

        assert!(manager.begin_fetch(&settled).is_some());
        tokio::time::advance(THROTTLE_WINDOW + Duration::from_millis(1)).await;
        assert!(manager.begin_fetch(&settled).is_none());
    }

    /// Test that rapid parameter changes settle into a single fetch
    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_changes() {
        let (manager, service, _state) = counting_manager();
        let param_tx = manager.spawn_intake();

        param_tx.send(params("1")).unwrap();
        param_tx.send(params("1.2")).unwrap();
        param_tx.send(params("1.25")).unwrap();

        tokio::time::sleep(DEBOUNCE_WINDOW * 2).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        let snapshot = manager.current_quote();
        assert_eq!(snapshot.key.as_ref().map(|k| k.amount.as_str()), Some("1.25"));
    }

    /// Test that invalid input clears the quote immediately instead of
    /// riding out the debounce window, even when it interrupts a pending
    /// valid change
    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_skips_debounce() {
        let (manager, service, _state) = counting_manager();

        // Seed a visible quote
        let settled = QuoteManager::settle(&params("1")).unwrap();
        let (token, _request) = manager.begin_fetch(&settled).unwrap();
        manager.complete_fetch(token, &settled, Ok(sample_response("0.05")));
        assert!(manager.current_quote().quote.is_some());

        let param_tx = manager.spawn_intake();
        let debounce_deadline = Instant::now() + DEBOUNCE_WINDOW;

        // A valid change starts debouncing; blanking the amount right
        // after must clear at once and drop the pending change
        param_tx.send(params("2")).unwrap();
        param_tx.send(params("")).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(Instant::now() < debounce_deadline);
        assert!(manager.current_quote().quote.is_none());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    /// Test that invalid parameters clear the quote and reset the state,
    /// gated by the cooldown and suppressed mid-swap
    #[tokio::test(start_paused = true)]
    async fn test_invalid_params_reset_with_cooldown() {
        let (manager, _service, state) = counting_manager();

        // Seed some visible state, then invalidate the input
        let settled = QuoteManager::settle(&params("1")).unwrap();
        let (token, _request) = manager.begin_fetch(&settled).unwrap();
        manager.complete_fetch(token, &settled, Ok(sample_response("0.05")));

        manager.handle_settled_params(&params("not-a-number")).await;
        assert!(manager.current_quote().quote.is_none());
        assert_eq!(state.snapshot(), SwapProcessState::default());

        // Within the cooldown, a second invalidation must not reset again
        state.dispatch(SwapAction::FetchQuoteError("boom".to_string()));
        manager.handle_settled_params(&params("0")).await;
        assert!(state.snapshot().quote_error.is_some());

        // A reset never fires while a swap is in flight
        tokio::time::advance(RESET_COOLDOWN + Duration::from_millis(1)).await;
        state.dispatch(SwapAction::SwapStart);
        manager.handle_settled_params(&params("-3")).await;
        assert!(state.snapshot().is_swapping);
    }

    /// Test that a failed fetch is classified and reported through the
    /// state machine rather than thrown
    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_classified() {
        let (manager, _service, state) = counting_manager();
        let settled = QuoteManager::settle(&params("1")).unwrap();

        let (token, _request) = manager.begin_fetch(&settled).unwrap();
        manager.complete_fetch(
            token,
            &settled,
            Err(SwapClientError::http("Status 503: maintenance")),
        );

        let snapshot = state.snapshot();
        assert_eq!(snapshot.step, SwapStep::Idle);
        assert_eq!(
            snapshot.quote_error.as_deref(),
            Some("the quoting service is temporarily unavailable"),
        );
        assert!(manager.current_quote().quote.is_none());
    }
}
