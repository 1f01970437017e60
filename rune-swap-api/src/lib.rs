//! API types for the services a BTC <> Rune swap client composes: the
//! quote service, the transaction-construction service, the local signer
//! and the settlement service.
//!
//! These types carry no I/O; transport bindings live with their clients.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]
#![deny(clippy::needless_pass_by_value)]

pub mod assets;
pub mod quotes;
pub mod serialization;
pub mod transactions;

pub use assets::{Asset, is_valid_pair};
pub use quotes::{OrderParseError, OrderSide, Quote, QuoteOrder, QuoteRequest, QuoteResponse, RawQuoteOrder};
pub use transactions::{
    ConstructSwapRequest, ConstructSwapResponse, FeeRates, RbfSettlement, SubmitSwapRequest,
    SubmitSwapResponse, SwapAddresses,
};
