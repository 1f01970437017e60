//! An HTTP binding for the network-facing swap services
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use rune_swap_api::{
    quotes::GET_QUOTE_ROUTE,
    transactions::{CONSTRUCT_SWAP_ROUTE, FEE_RATES_ROUTE, SUBMIT_SWAP_ROUTE},
    ConstructSwapRequest, ConstructSwapResponse, FeeRates, QuoteRequest, QuoteResponse,
    SubmitSwapRequest, SubmitSwapResponse,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    clients::{QuoteService, SettlementService, TransactionService},
    error::{SwapClientError, SwapClientResult},
};

/// Default timeout for requests to the swap services
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// An HTTP client for the quote, construction and settlement services
///
/// The local signer has no HTTP binding; it models the browser wallet and
/// is provided by the embedding application.
#[derive(Clone, Debug)]
pub struct HttpSwapClient {
    /// The base URL of the swap API
    base_url: String,
    /// The shared HTTP client used for issuing requests
    http_client: Client,
}

impl HttpSwapClient {
    /// Create a new client against the given base URL
    pub fn new(base_url: &str) -> SwapClientResult<Self> {
        // Build a shared HTTP client with a sensible default timeout
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(SwapClientError::http)?;

        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http_client })
    }

    /// Send a GET request to the given route
    async fn get_json<Resp: DeserializeOwned>(&self, route: &str) -> SwapClientResult<Resp> {
        let url = format!("{}/{}", self.base_url, route);
        let response = self.http_client.get(&url).send().await.map_err(SwapClientError::http)?;
        Self::parse_response(response).await
    }

    /// Send a POST request with a JSON body to the given route
    async fn post_json<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        route: &str,
        body: &Req,
    ) -> SwapClientResult<Resp> {
        let url = format!("{}/{}", self.base_url, route);
        let response =
            self.http_client.post(&url).json(body).send().await.map_err(SwapClientError::http)?;
        Self::parse_response(response).await
    }

    /// Check the response status and deserialize its body
    async fn parse_response<Resp: DeserializeOwned>(response: Response) -> SwapClientResult<Resp> {
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(SwapClientError::http(format!("Status {status}: {message}")));
        }

        response.json().await.map_err(SwapClientError::parsing)
    }
}

#[async_trait]
impl QuoteService for HttpSwapClient {
    async fn get_quote(&self, request: QuoteRequest) -> SwapClientResult<QuoteResponse> {
        self.post_json(GET_QUOTE_ROUTE, &request).await
    }
}

#[async_trait]
impl TransactionService for HttpSwapClient {
    async fn construct_swap(
        &self,
        request: ConstructSwapRequest,
    ) -> SwapClientResult<ConstructSwapResponse> {
        self.post_json(CONSTRUCT_SWAP_ROUTE, &request).await
    }

    async fn recommended_fee_rates(&self) -> SwapClientResult<FeeRates> {
        self.get_json(FEE_RATES_ROUTE).await
    }
}

#[async_trait]
impl SettlementService for HttpSwapClient {
    async fn submit_swap(
        &self,
        request: SubmitSwapRequest,
    ) -> SwapClientResult<SubmitSwapResponse> {
        self.post_json(SUBMIT_SWAP_ROUTE, &request).await
    }
}
