//! API types for the quote service
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serialization::StringOrNumber;

// --------------
// | Api Routes |
// --------------

/// The route to fetch a priced quote for a swap
pub const GET_QUOTE_ROUTE: &str = "quote";

// -------------
// | Api Types |
// -------------

/// The request body for fetching a quote
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// The input amount, in canonical display units
    pub amount: String,
    /// The name of the Rune being traded
    pub token_name: String,
    /// The address quotes are priced against
    pub counterparty_address: String,
    /// Whether the Rune is being sold for BTC (`true`) or bought (`false`)
    pub sell_direction: bool,
}

/// A liquidity order as the quote service returns it
///
/// Numeric fields arrive as either strings or numbers and the side field
/// in arbitrary case; [`QuoteOrder::try_from`] is the single place this
/// shape is validated.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuoteOrder {
    /// The order identifier
    pub id: String,
    /// The order's Rune amount, in base units
    pub amount: StringOrNumber,
    /// The order's unit price, in sats per base unit
    pub price: StringOrNumber,
    /// The order side, in whatever case the service chose
    pub side: String,
}

/// The response body for a quote request
///
/// An empty order list with no totals is a valid, successful response; it
/// means no output amount is computable for the requested input.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    /// The underlying liquidity orders backing the quote
    #[serde(default)]
    pub orders: Vec<RawQuoteOrder>,
    /// The total price of the quote, in sats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<StringOrNumber>,
    /// The total output amount, formatted in display units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_formatted_amount: Option<String>,
}

// ----------------
// | Parsed Types |
// ----------------

/// The canonical side of a liquidity order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// The order buys the Rune
    Buy,
    /// The order sells the Rune
    Sell,
}

/// An error encountered while validating a raw liquidity order
#[derive(Debug, Clone, Error)]
pub enum OrderParseError {
    /// A numeric field did not parse as a number
    #[error("order {id}: field `{field}` is not numeric")]
    NonNumericField {
        /// The id of the offending order
        id: String,
        /// The name of the offending field
        field: &'static str,
    },
    /// The side field was not a recognized order side
    #[error("order {id}: unrecognized side `{side}`")]
    UnrecognizedSide {
        /// The id of the offending order
        id: String,
        /// The side value the service sent
        side: String,
    },
}

/// A validated, strongly typed liquidity order
///
/// Produced exactly once per quote at the service boundary; the stored
/// quote is immutable from then on and outbound requests reuse these
/// orders as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteOrder {
    /// The order identifier
    pub id: String,
    /// The order's Rune amount, in base units
    pub amount: u64,
    /// The order's unit price, in sats per base unit
    pub price: f64,
    /// The canonical order side
    pub side: OrderSide,
}

impl TryFrom<RawQuoteOrder> for QuoteOrder {
    type Error = OrderParseError;

    fn try_from(raw: RawQuoteOrder) -> Result<Self, Self::Error> {
        let amount = raw.amount.as_u64().ok_or_else(|| OrderParseError::NonNumericField {
            id: raw.id.clone(),
            field: "amount",
        })?;
        let price = raw.price.as_f64().ok_or_else(|| OrderParseError::NonNumericField {
            id: raw.id.clone(),
            field: "price",
        })?;

        let side = match raw.side.to_ascii_lowercase().as_str() {
            "buy" => OrderSide::Buy,
            "sell" => OrderSide::Sell,
            _ => {
                return Err(OrderParseError::UnrecognizedSide { id: raw.id, side: raw.side });
            },
        };

        Ok(Self { id: raw.id, amount, price, side })
    }
}

/// A validated quote with its orders already normalized
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// The validated liquidity orders backing the quote
    pub orders: Vec<QuoteOrder>,
    /// The total price of the quote, in sats
    pub total_price: Option<f64>,
    /// The total output amount, formatted in display units
    pub total_formatted_amount: Option<String>,
}

impl TryFrom<QuoteResponse> for Quote {
    type Error = OrderParseError;

    fn try_from(response: QuoteResponse) -> Result<Self, Self::Error> {
        let orders = response
            .orders
            .into_iter()
            .map(QuoteOrder::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let total_price = response.total_price.as_ref().and_then(StringOrNumber::as_f64);
        Ok(Self { orders, total_price, total_formatted_amount: response.total_formatted_amount })
    }
}
