//! Error types for the swap client
use thiserror::Error;

/// Type alias for Results using SwapClientError
pub type SwapClientResult<T> = Result<T, SwapClientError>;

// -------------
// | Constants |
// -------------

/// Message fragments upstream services use to signal an insufficient
/// network fee rate on transaction construction
const FEE_TOO_LOW_PATTERNS: [&str; 3] =
    ["insufficient fee", "fee rate too low", "min relay fee not met"];

/// The upstream error signature for an underfunded wallet
const INSUFFICIENT_FUNDS_PATTERN: &str = "insufficient funds";

/// Message fragments indicating the quote service itself is down
const SERVICE_UNAVAILABLE_PATTERNS: [&str; 3] = ["503", "502", "unavailable"];

/// Message fragments indicating the pair has no fillable liquidity
const NO_LIQUIDITY_PATTERNS: [&str; 2] = ["no liquidity", "no orders"];

/// Message fragments indicating a transport-level failure
const NETWORK_TIMEOUT_PATTERNS: [&str; 3] = ["timeout", "timed out", "connection"];

// ---------------
// | Error Types |
// ---------------

/// The generic swap client error
#[derive(Debug, Clone, Error)]
pub enum SwapClientError {
    /// A display amount failed local validation
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A precondition for executing a swap was not met
    #[error("missing precondition: {0}")]
    PreconditionMissing(String),

    /// The quote is older than the freshness window
    #[error("quote expired, fetch a new quote before executing")]
    QuoteExpired,

    /// A quote fetch failed
    #[error("quote fetch failed: {0}")]
    QuoteFetch(QuoteFetchFailure),

    /// Transaction construction failed
    #[error("transaction construction failed: {0}")]
    Construction(ConstructionFailure),

    /// The user declined the signing request
    #[error("signing request canceled by user")]
    SigningDeclined,

    /// The signer failed for a reason other than the user declining
    #[error("signing failed: {0}")]
    Signing(String),

    /// Settlement submission failed
    #[error("settlement failed: {0}")]
    Settlement(String),

    /// The wallet lacks the funds the swap requires
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Parsing error
    #[error("parsing error: {0}")]
    Parsing(String),
}

impl SwapClientError {
    /// Create a new invalid amount error
    #[allow(clippy::needless_pass_by_value)]
    pub fn invalid_amount<T: ToString>(msg: T) -> Self {
        Self::InvalidAmount(msg.to_string())
    }

    /// Create a new missing precondition error
    #[allow(clippy::needless_pass_by_value)]
    pub fn precondition<T: ToString>(msg: T) -> Self {
        Self::PreconditionMissing(msg.to_string())
    }

    /// Create a new signing error
    #[allow(clippy::needless_pass_by_value)]
    pub fn signing<T: ToString>(msg: T) -> Self {
        Self::Signing(msg.to_string())
    }

    /// Create a new settlement error
    #[allow(clippy::needless_pass_by_value)]
    pub fn settlement<T: ToString>(msg: T) -> Self {
        Self::Settlement(msg.to_string())
    }

    /// Create a new HTTP error
    #[allow(clippy::needless_pass_by_value)]
    pub fn http<T: ToString>(msg: T) -> Self {
        Self::Http(msg.to_string())
    }

    /// Create a new parsing error
    #[allow(clippy::needless_pass_by_value)]
    pub fn parsing<T: ToString>(msg: T) -> Self {
        Self::Parsing(msg.to_string())
    }
}

// ------------------------
// | Failure Sub-Classing |
// ------------------------

/// The user-facing categories of a failed quote fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteFetchFailure {
    /// The quoting service is unreachable or returned a server error
    #[error("the quoting service is temporarily unavailable")]
    ServiceUnavailable,
    /// The pair has no fillable liquidity at the requested size
    #[error("no liquidity available for this trade")]
    NoLiquidity,
    /// The request failed at the transport layer
    #[error("network error while fetching the quote")]
    NetworkTimeout,
    /// Any other failure, carrying the upstream message
    #[error("{0}")]
    Generic(String),
}

impl QuoteFetchFailure {
    /// Classify an upstream error message into a user-facing category
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        if SERVICE_UNAVAILABLE_PATTERNS.iter().any(|p| lowered.contains(p)) {
            Self::ServiceUnavailable
        } else if NO_LIQUIDITY_PATTERNS.iter().any(|p| lowered.contains(p)) {
            Self::NoLiquidity
        } else if NETWORK_TIMEOUT_PATTERNS.iter().any(|p| lowered.contains(p)) {
            Self::NetworkTimeout
        } else {
            Self::Generic(message.to_string())
        }
    }
}

/// The categories of a failed transaction construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionFailure {
    /// The network fee rate was too low to construct a viable transaction
    #[error("network fee rate too low: {0}")]
    FeeTooLow(String),
    /// Any other construction failure
    #[error("{0}")]
    Generic(String),
}

impl ConstructionFailure {
    /// Classify an upstream construction error message
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        if FEE_TOO_LOW_PATTERNS.iter().any(|p| lowered.contains(p)) {
            Self::FeeTooLow(message.to_string())
        } else {
            Self::Generic(message.to_string())
        }
    }

    /// Whether this failure is recoverable by escalating the fee rate
    pub fn is_fee_too_low(&self) -> bool {
        matches!(self, Self::FeeTooLow(_))
    }
}

/// Whether an upstream error message matches the known insufficient-funds
/// signature
pub fn is_insufficient_funds(message: &str) -> bool {
    message.to_ascii_lowercase().contains(INSUFFICIENT_FUNDS_PATTERN)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the quote failure classifier against each category
    #[test]
    fn test_quote_failure_classification() {
        assert_eq!(
            QuoteFetchFailure::classify("HTTP error: Status 503: bad gateway"),
            QuoteFetchFailure::ServiceUnavailable,
        );
        assert_eq!(
            QuoteFetchFailure::classify("No liquidity for pair"),
            QuoteFetchFailure::NoLiquidity,
        );
        assert_eq!(
            QuoteFetchFailure::classify("request timed out after 10s"),
            QuoteFetchFailure::NetworkTimeout,
        );
        assert_eq!(
            QuoteFetchFailure::classify("unexpected response shape"),
            QuoteFetchFailure::Generic("unexpected response shape".to_string()),
        );
    }

    /// Test that fee-insufficiency signatures are distinguishable from
    /// generic construction failures
    #[test]
    fn test_construction_failure_classification() {
        assert!(ConstructionFailure::classify("Insufficient fee for transaction").is_fee_too_low());
        assert!(ConstructionFailure::classify("min relay fee not met: 1.2 < 2").is_fee_too_low());
        assert!(!ConstructionFailure::classify("utxo already spent").is_fee_too_low());
    }

    /// Test the insufficient funds signature match
    #[test]
    fn test_insufficient_funds_signature() {
        assert!(is_insufficient_funds("Insufficient funds at payment address"));
        assert!(!is_insufficient_funds("insufficient fee"));
    }
}
