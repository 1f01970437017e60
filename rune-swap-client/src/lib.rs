//! A client-side orchestration layer for BTC <> Rune token swaps
//!
//! Composes four unreliable collaborators -- a quote service, a
//! transaction-construction service, a local signer and a settlement
//! service -- into a single reliable swap flow. The [`quote`] manager
//! keeps one fresh quote per trading session, the [`state`] machine is
//! the sole owner of process state, and the [`executor`] drives a quoted
//! swap through construction, signing and settlement.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]
#![deny(clippy::needless_pass_by_value)]

pub mod amount;
pub mod clients;
pub mod error;
pub mod executor;
pub mod quote;
pub mod state;

pub use amount::{percentage_of_base_units, to_base_units, to_display_units};
pub use clients::{
    http::HttpSwapClient, QuoteService, SettlementService, SignOutcome, TransactionService,
    TransactionSigner,
};
pub use error::{SwapClientError, SwapClientResult};
pub use executor::{ExecutionEngine, ExecutionParams};
pub use quote::{QuoteKey, QuoteManager, QuoteSnapshot, TradeParams};
pub use state::{SwapAction, SwapProcessState, SwapStateHandle, SwapStep};
