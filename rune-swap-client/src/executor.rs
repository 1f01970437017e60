//! The swap execution engine
//!
//! Drives a quoted swap through construction, signing and settlement.
//! Every outcome is reported through the state machine; the async entry
//! point itself never bubbles an error to the caller.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rune_swap_api::{
    is_valid_pair, Asset, ConstructSwapRequest, ConstructSwapResponse, Quote, SubmitSwapRequest,
    SwapAddresses,
};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use crate::{
    clients::{SettlementService, SignOutcome, TransactionService, TransactionSigner},
    error::{is_insufficient_funds, ConstructionFailure, SwapClientError, SwapClientResult},
    quote::{QuoteKey, QuoteSnapshot},
    state::{SwapAction, SwapStateHandle, SwapStep},
};

// -------------
// | Constants |
// -------------

/// How long after its fetch a quote may still be executed
const QUOTE_FRESHNESS_WINDOW: Duration = Duration::from_secs(60);
/// The multiplier applied to the fee rate on a fee-too-low retry
const FEE_ESCALATION_FACTOR: f64 = 1.3;
/// The fee rate used when the recommended rates cannot be fetched, in
/// sats per vbyte
const DEFAULT_FEE_RATE: u64 = 10;
/// The escalated fee rate used on a fee-too-low retry when no rate data
/// is available, in sats per vbyte
const FALLBACK_ESCALATED_FEE_RATE: u64 = 500;

/// The error message for executing without a connected wallet
const ERR_WALLET_NOT_CONNECTED: &str = "wallet not connected";
/// The error message for executing with an incomplete address bundle
const ERR_ADDRESSES_INCOMPLETE: &str = "wallet addresses incomplete";
/// The error message for executing without a resolved asset pair
const ERR_PAIR_UNRESOLVED: &str = "trading pair not resolved";
/// The error message for executing without a fillable quote
const ERR_NO_QUOTE: &str = "no fillable quote available";
/// The error message for replaying an already-consumed quote
const ERR_QUOTE_CONSUMED: &str = "quote already consumed, fetch a new quote";
/// The error message for executing while another swap is in flight
const ERR_SWAP_IN_FLIGHT: &str = "a swap is already in flight";
/// The error message for a settlement response carrying no id
const ERR_NO_SETTLEMENT_ID: &str = "settlement response carried no transaction id";
/// The message surfaced after the user declines a signing request
const SIGNING_CANCELED_MESSAGE: &str = "signing request canceled";
/// The user-facing guidance shown for an underfunded wallet
const INSUFFICIENT_FUNDS_GUIDANCE: &str =
    "insufficient funds: top up the payment address and try again";

// ---------
// | Types |
// ---------

/// The caller-supplied inputs to a swap execution
#[derive(Clone, Debug, Default)]
pub struct ExecutionParams {
    /// Whether a wallet is connected
    pub wallet_connected: bool,
    /// The connected wallet's address bundle
    pub addresses: Option<SwapAddresses>,
    /// The asset being sold
    pub asset_in: Option<Asset>,
    /// The asset being bought
    pub asset_out: Option<Asset>,
    /// A user-chosen fee rate override, in sats per vbyte
    pub fee_rate: Option<u64>,
}

/// The validated inputs a run operates on
struct CheckedInputs<'a> {
    /// The wallet's complete address bundle
    addresses: &'a SwapAddresses,
    /// The quote being executed
    quote: &'a Quote,
    /// The quote's key, consumed on success
    key: &'a QuoteKey,
    /// When the quote was fetched, if a timestamp was recorded
    fetched_at: Option<Instant>,
    /// The name of the Rune being traded
    token_name: String,
    /// Whether the Rune is being sold for BTC
    sell_direction: bool,
}

// ----------
// | Engine |
// ----------

/// The execution engine for one trading session
pub struct ExecutionEngine {
    /// The shared swap process state
    state: SwapStateHandle,
    /// The transaction-construction service
    transactions: Arc<dyn TransactionService>,
    /// The local signer
    signer: Arc<dyn TransactionSigner>,
    /// The settlement service
    settlement: Arc<dyn SettlementService>,
    /// The keys of quotes that already settled successfully
    consumed_keys: Mutex<HashSet<QuoteKey>>,
}

impl ExecutionEngine {
    /// Create an engine for one trading session
    pub fn new(
        state: SwapStateHandle,
        transactions: Arc<dyn TransactionService>,
        signer: Arc<dyn TransactionSigner>,
        settlement: Arc<dyn SettlementService>,
    ) -> Self {
        Self { state, transactions, signer, settlement, consumed_keys: Mutex::new(HashSet::new()) }
    }

    /// Execute the given quote end to end
    ///
    /// All outcomes land in the state machine: settlement records the
    /// transaction id, the user declining resets to idle, and every other
    /// failure becomes a terminal error step.
    pub async fn execute(&self, params: &ExecutionParams, snapshot: &QuoteSnapshot) {
        match self.run(params, snapshot).await {
            Ok(tx_id) => {
                if let Some(key) = &snapshot.key {
                    self.consumed_keys
                        .lock()
                        .expect("consumed key lock poisoned")
                        .insert(key.clone());
                }
                info!(%tx_id, "swap settled");
                self.state.dispatch(SwapAction::SwapSuccess(tx_id));
            },
            Err(SwapClientError::SigningDeclined) => {
                // Declining is recoverable: reset fully, then surface a
                // message so the UI can say why the flow restarted
                info!("signing declined by user, resetting swap state");
                self.state.dispatch(SwapAction::ResetSwap);
                self.state
                    .dispatch(SwapAction::SetGenericError(SIGNING_CANCELED_MESSAGE.to_string()));
            },
            Err(err @ SwapClientError::PreconditionMissing(_)) => {
                warn!(%err, "swap preconditions not met");
                self.state.dispatch(SwapAction::SetGenericError(err.to_string()));
                self.state.dispatch(SwapAction::SwapError(err.to_string()));
            },
            Err(err) => {
                warn!(%err, "swap execution failed");
                let message = if is_insufficient_funds(&err.to_string()) {
                    INSUFFICIENT_FUNDS_GUIDANCE.to_string()
                } else {
                    err.to_string()
                };
                self.state.dispatch(SwapAction::SwapError(message));
            },
        }
    }

    /// Run one swap attempt, returning the settlement transaction id
    async fn run(
        &self,
        params: &ExecutionParams,
        snapshot: &QuoteSnapshot,
    ) -> SwapClientResult<String> {
        // Validate everything before any service call or state change; at
        // most one swap may be in flight at a time
        if self.state.snapshot().is_swapping {
            return Err(SwapClientError::precondition(ERR_SWAP_IN_FLIGHT));
        }
        let inputs = Self::check_preconditions(params, snapshot)?;

        // A quote with no recorded fetch time is treated as expired, never
        // silently reused
        let fresh = inputs
            .fetched_at
            .is_some_and(|fetched_at| fetched_at.elapsed() <= QUOTE_FRESHNESS_WINDOW);
        if !fresh {
            self.state.dispatch(SwapAction::QuoteExpired);
            return Err(SwapClientError::QuoteExpired);
        }

        {
            let consumed = self.consumed_keys.lock().expect("consumed key lock poisoned");
            if consumed.contains(inputs.key) {
                return Err(SwapClientError::precondition(ERR_QUOTE_CONSUMED));
            }
        }

        self.state.dispatch(SwapAction::SwapStart);
        self.state.dispatch(SwapAction::SwapStep(SwapStep::GettingTransaction));

        let fee_rate = self.resolve_fee_rate(params.fee_rate, inputs.sell_direction).await;
        let request = ConstructSwapRequest {
            orders: inputs.quote.orders.clone(),
            addresses: inputs.addresses.clone(),
            token_name: inputs.token_name.clone(),
            sell_direction: inputs.sell_direction,
            fee_rate,
        };
        let constructed = self.construct_with_escalation(request).await?;

        self.state.dispatch(SwapAction::SwapStep(SwapStep::Signing));
        let signed_psbt = match self.signer.sign_psbt(constructed.psbt_base64.clone()).await? {
            SignOutcome::Signed(payload) => payload,
            SignOutcome::Declined => return Err(SwapClientError::SigningDeclined),
        };

        // The fee-bump variant is optional; a hard signer failure on it is
        // tolerated, the user declining it is not
        let signed_rbf_psbt = match &constructed.rbf_psbt_base64 {
            Some(rbf_psbt) => match self.signer.sign_psbt(rbf_psbt.clone()).await {
                Ok(SignOutcome::Signed(payload)) => Some(payload),
                Ok(SignOutcome::Declined) => return Err(SwapClientError::SigningDeclined),
                Err(err) => {
                    warn!(%err, "fee-bump signing failed, submitting without it");
                    None
                },
            },
            None => None,
        };

        self.state.dispatch(SwapAction::SwapStep(SwapStep::Confirming));
        let submission = SubmitSwapRequest {
            orders: inputs.quote.orders.clone(),
            addresses: inputs.addresses.clone(),
            signed_psbt_base64: signed_psbt,
            swap_id: constructed.swap_id,
            signed_rbf_psbt_base64: signed_rbf_psbt,
        };
        let response = self
            .settlement
            .submit_swap(submission)
            .await
            .map_err(SwapClientError::settlement)?;

        response
            .settlement_id()
            .map(str::to_string)
            .ok_or_else(|| SwapClientError::settlement(ERR_NO_SETTLEMENT_ID))
    }

    // -----------
    // | Helpers |
    // -----------

    /// Validate the execution inputs without side effects
    fn check_preconditions<'a>(
        params: &'a ExecutionParams,
        snapshot: &'a QuoteSnapshot,
    ) -> SwapClientResult<CheckedInputs<'a>> {
        if !params.wallet_connected {
            return Err(SwapClientError::precondition(ERR_WALLET_NOT_CONNECTED));
        }

        let addresses = params
            .addresses
            .as_ref()
            .filter(|addresses| addresses.is_complete())
            .ok_or_else(|| SwapClientError::precondition(ERR_ADDRESSES_INCOMPLETE))?;

        let (asset_in, asset_out) = match (&params.asset_in, &params.asset_out) {
            (Some(asset_in), Some(asset_out)) if is_valid_pair(asset_in, asset_out) => {
                (asset_in, asset_out)
            },
            _ => return Err(SwapClientError::precondition(ERR_PAIR_UNRESOLVED)),
        };

        let quote = snapshot
            .quote
            .as_ref()
            .filter(|quote| !quote.orders.is_empty())
            .ok_or_else(|| SwapClientError::precondition(ERR_NO_QUOTE))?;
        let key = snapshot.key.as_ref().ok_or_else(|| SwapClientError::precondition(ERR_NO_QUOTE))?;

        let sell_direction = !asset_in.is_base_asset;
        let rune = if sell_direction { asset_in } else { asset_out };

        Ok(CheckedInputs {
            addresses,
            quote,
            key,
            fetched_at: snapshot.fetched_at,
            token_name: rune.name.clone(),
            sell_direction,
        })
    }

    /// Resolve the fee rate for construction
    ///
    /// A user override always wins; otherwise a sale skews fast (the Rune
    /// leg must confirm promptly) and a purchase takes the half-hour rate.
    async fn resolve_fee_rate(&self, user_rate: Option<u64>, sell_direction: bool) -> u64 {
        if let Some(rate) = user_rate {
            return rate;
        }

        match self.transactions.recommended_fee_rates().await {
            Ok(rates) => {
                if sell_direction {
                    rates.fastest
                } else {
                    rates.half_hour
                }
            },
            Err(err) => {
                warn!(%err, fallback = DEFAULT_FEE_RATE, "fee rate lookup failed");
                DEFAULT_FEE_RATE
            },
        }
    }

    /// Construct the swap transaction, retrying exactly once with an
    /// escalated fee rate if the service rejects the fee as too low
    async fn construct_with_escalation(
        &self,
        mut request: ConstructSwapRequest,
    ) -> SwapClientResult<ConstructSwapResponse> {
        let first_attempt = self.transactions.construct_swap(request.clone()).await;
        let err = match first_attempt {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        let failure = ConstructionFailure::classify(&err.to_string());
        if !failure.is_fee_too_low() {
            return Err(SwapClientError::Construction(failure));
        }

        let fastest = self.transactions.recommended_fee_rates().await.ok().map(|rates| rates.fastest);
        let escalated = escalate_fee_rate(fastest, request.fee_rate);
        info!(previous = request.fee_rate, escalated, "retrying construction with a higher fee");
        self.state.dispatch(SwapAction::SetGenericError(format!(
            "network fee too low, retrying at {escalated} sat/vB"
        )));

        request.fee_rate = escalated;
        self.transactions.construct_swap(request).await.map_err(|retry_err| {
            SwapClientError::Construction(ConstructionFailure::classify(&retry_err.to_string()))
        })
    }
}

/// Escalate a rejected fee rate
///
/// Scales the recommended fastest rate up, falling back to a fixed high
/// rate without rate data; the result is always strictly above the rate
/// that was rejected.
fn escalate_fee_rate(fastest: Option<u64>, rejected: u64) -> u64 {
    let escalated = match fastest {
        Some(fastest) => (fastest as f64 * FEE_ESCALATION_FACTOR).ceil() as u64,
        None => FALLBACK_ESCALATED_FEE_RATE,
    };
    escalated.max(rejected + 1)
}
