//! API types for transaction construction and settlement
use serde::{Deserialize, Serialize};

use crate::quotes::QuoteOrder;

// --------------
// | Api Routes |
// --------------

/// The route to construct an unsigned swap transaction
pub const CONSTRUCT_SWAP_ROUTE: &str = "construct-swap";
/// The route to submit a signed swap for settlement
pub const SUBMIT_SWAP_ROUTE: &str = "submit-swap";
/// The route to fetch recommended network fee rates
pub const FEE_RATES_ROUTE: &str = "fee-rates";

// -------------
// | Api Types |
// -------------

/// The four wallet addresses/keys a swap transaction spends from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapAddresses {
    /// The payment (cardinal) address
    pub payment_address: String,
    /// The public key of the payment address
    pub payment_public_key: String,
    /// The ordinals address holding the Runes
    pub ordinals_address: String,
    /// The public key of the ordinals address
    pub ordinals_public_key: String,
}

impl SwapAddresses {
    /// Whether all four fields are present and non-empty
    pub fn is_complete(&self) -> bool {
        !self.payment_address.is_empty()
            && !self.payment_public_key.is_empty()
            && !self.ordinals_address.is_empty()
            && !self.ordinals_public_key.is_empty()
    }
}

/// Recommended network fee rates, in sats per vbyte
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRates {
    /// The fastest (next-block) fee rate
    pub fastest: u64,
    /// The half-hour fee rate
    pub half_hour: u64,
    /// The one-hour fee rate
    pub hour: u64,
}

/// The request body for constructing an unsigned swap transaction
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructSwapRequest {
    /// The normalized liquidity orders to fill
    pub orders: Vec<QuoteOrder>,
    /// The wallet addresses the transaction spends from
    pub addresses: SwapAddresses,
    /// The name of the Rune being traded
    pub token_name: String,
    /// Whether the Rune is being sold for BTC
    pub sell_direction: bool,
    /// The network fee rate to use, in sats per vbyte
    pub fee_rate: u64,
}

/// The response body for a construction request
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructSwapResponse {
    /// The primary unsigned transaction payload, base64-encoded
    pub psbt_base64: String,
    /// The settlement identifier for this swap
    pub swap_id: String,
    /// An optional fee-bump (RBF) variant of the transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rbf_psbt_base64: Option<String>,
}

/// The request body for submitting a signed swap for settlement
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSwapRequest {
    /// The normalized liquidity orders being filled
    pub orders: Vec<QuoteOrder>,
    /// The wallet addresses the transaction spends from
    pub addresses: SwapAddresses,
    /// The signed primary transaction payload, base64-encoded
    pub signed_psbt_base64: String,
    /// The settlement identifier from construction
    pub swap_id: String,
    /// The signed fee-bump payload, if one was signed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_rbf_psbt_base64: Option<String>,
}

/// A fee-bump-specific settlement result
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RbfSettlement {
    /// The network id of the fee-bump transaction, if broadcast
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
}

/// The response body for a settlement submission
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSwapResponse {
    /// The network id of the settled transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    /// Fee-bump settlement details, used as an id fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rbf: Option<RbfSettlement>,
}

impl SubmitSwapResponse {
    /// The settlement id for this submission, preferring the primary
    /// transaction's id and falling back to the fee-bump variant's
    pub fn settlement_id(&self) -> Option<&str> {
        self.txid
            .as_deref()
            .or_else(|| self.rbf.as_ref().and_then(|rbf| rbf.txid.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the settlement id fallback order
    #[test]
    fn test_settlement_id_fallback() {
        let primary = SubmitSwapResponse {
            txid: Some("tx123".to_string()),
            rbf: Some(RbfSettlement { txid: Some("rbf456".to_string()) }),
        };
        assert_eq!(primary.settlement_id(), Some("tx123"));

        let rbf_only = SubmitSwapResponse {
            txid: None,
            rbf: Some(RbfSettlement { txid: Some("rbf456".to_string()) }),
        };
        assert_eq!(rbf_only.settlement_id(), Some("rbf456"));

        let neither = SubmitSwapResponse { txid: None, rbf: None };
        assert_eq!(neither.settlement_id(), None);
    }

    /// Test that an addresses bundle with any empty field is incomplete
    #[test]
    fn test_addresses_completeness() {
        let mut addresses = SwapAddresses {
            payment_address: "bc1q...".to_string(),
            payment_public_key: "02ab".to_string(),
            ordinals_address: "bc1p...".to_string(),
            ordinals_public_key: "03cd".to_string(),
        };
        assert!(addresses.is_complete());

        addresses.ordinals_public_key.clear();
        assert!(!addresses.is_complete());
    }
}
