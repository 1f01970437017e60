//! Service seams for the external collaborators of a swap
//!
//! Each boundary from the swap flow is a trait so the orchestration core
//! can be exercised against mocks; the HTTP binding in [`http`] implements
//! the three network-facing services.
use async_trait::async_trait;
use rune_swap_api::{
    ConstructSwapRequest, ConstructSwapResponse, FeeRates, QuoteRequest, QuoteResponse,
    SubmitSwapRequest, SubmitSwapResponse,
};

use crate::error::SwapClientResult;

pub mod http;

/// The outcome of a signing request to the local signer
///
/// The signer is a browser wallet; the user declining is an expected,
/// recoverable outcome and must stay distinguishable from a hard failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignOutcome {
    /// The signer produced a signed payload, base64-encoded
    Signed(String),
    /// The user declined the signing request
    Declined,
}

/// The quote service boundary
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait QuoteService: Send + Sync {
    /// Fetch a priced quote for the given trade parameters
    async fn get_quote(&self, request: QuoteRequest) -> SwapClientResult<QuoteResponse>;
}

/// The transaction-construction service boundary
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait TransactionService: Send + Sync {
    /// Construct an unsigned swap transaction for the given orders
    async fn construct_swap(
        &self,
        request: ConstructSwapRequest,
    ) -> SwapClientResult<ConstructSwapResponse>;

    /// Fetch the currently recommended network fee rates
    async fn recommended_fee_rates(&self) -> SwapClientResult<FeeRates>;
}

/// The local signer boundary (a browser wallet extension)
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Request a signature over the given transaction payload
    async fn sign_psbt(&self, psbt_base64: String) -> SwapClientResult<SignOutcome>;
}

/// The settlement/confirmation service boundary
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait SettlementService: Send + Sync {
    /// Submit a signed swap for settlement
    async fn submit_swap(&self, request: SubmitSwapRequest)
        -> SwapClientResult<SubmitSwapResponse>;
}
