//! Read-only client for the pool's indexed subgraph record.
//!
//! The record seeds the trade view (token list, decimals, indices) and backs the pool state
//! store while no wallet is connected.
use std::{str::FromStr, time::Duration};

use alloy_primitives::{Address, B256, U256};
use ascend_common::models::{
    token::from_raw_amount, PoolMetadata, PoolToken, TokenRef, WeightUpdate,
};
use backoff::{exponential::ExponentialBackoffBuilder, ExponentialBackoff};
use chrono::{DateTime, Utc};
use reqwest::{header, Client, ClientBuilder, StatusCode, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Weights in weight update checkpoints are 18 decimal fixed point integers.
const WEIGHT_DECIMALS: u32 = 18;

const POOL_QUERY: &str = r#"
query Pool($id: ID!) {
  pool(id: $id) {
    id
    address
    swapFee
    tokens(orderBy: index) {
      address
      name
      symbol
      decimals
      index
      weight
      balance
    }
    weightUpdates(orderBy: scheduledTimestamp) {
      startTimestamp
      endTimestamp
      startWeights
      endWeights
    }
  }
}
"#;

#[derive(Error, Debug)]
pub enum SubgraphError {
    #[error("Invalid subgraph url {0}: {1}")]
    UrlParsing(String, String),
    #[error("Subgraph request failed: {0}")]
    HttpClient(String, #[source] reqwest::Error),
    #[error("Subgraph unreachable: {0}")]
    Unreachable(String),
    #[error("Subgraph returned errors: {0}")]
    Query(String),
    #[error("Pool {0} not found")]
    PoolNotFound(B256),
    #[error("Malformed subgraph response: {0}")]
    ParseResponse(String),
}

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Deserialize)]
struct PoolData {
    pool: Option<RawPool>,
}

/// The subgraph encodes big numbers as strings.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawPool {
    id: String,
    address: String,
    swap_fee: String,
    tokens: Vec<RawPoolToken>,
    #[serde(default)]
    weight_updates: Vec<RawWeightUpdate>,
}

#[derive(Deserialize, Debug)]
struct RawPoolToken {
    address: String,
    name: String,
    symbol: String,
    decimals: u32,
    index: Option<usize>,
    weight: Option<String>,
    balance: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawWeightUpdate {
    start_timestamp: String,
    end_timestamp: String,
    start_weights: Vec<String>,
    end_weights: Vec<String>,
}

fn parse<T: FromStr>(field: &str, value: &str) -> Result<T, SubgraphError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| SubgraphError::ParseResponse(format!("{field} '{value}': {e}")))
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, SubgraphError> {
    let seconds = parse::<i64>(field, value)?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| SubgraphError::ParseResponse(format!("{field} '{value}' out of range")))
}

fn parse_weights(field: &str, values: &[String]) -> Result<Vec<Decimal>, SubgraphError> {
    values
        .iter()
        .map(|value| {
            let raw = parse::<U256>(field, value)?;
            from_raw_amount(raw, WEIGHT_DECIMALS)
                .map_err(|e| SubgraphError::ParseResponse(format!("{field}: {e}")))
        })
        .collect()
}

impl TryFrom<RawPool> for PoolMetadata {
    type Error = SubgraphError;

    fn try_from(raw: RawPool) -> Result<Self, Self::Error> {
        let tokens = raw
            .tokens
            .into_iter()
            .enumerate()
            .map(|(position, token)| {
                let index = token.index.unwrap_or(position);
                Ok(PoolToken {
                    token: TokenRef {
                        name: token.name,
                        symbol: token.symbol,
                        address: parse("token address", &token.address)?,
                        decimals: token.decimals,
                        token_index: index,
                    },
                    weight: token
                        .weight
                        .as_deref()
                        .map(|w| parse("token weight", w))
                        .transpose()?
                        .unwrap_or_default(),
                    balance: parse("token balance", &token.balance)?,
                })
            })
            .collect::<Result<Vec<_>, SubgraphError>>()?;

        let weight_updates = raw
            .weight_updates
            .iter()
            .map(|update| {
                Ok(WeightUpdate {
                    start_timestamp: parse_timestamp("startTimestamp", &update.start_timestamp)?,
                    end_timestamp: parse_timestamp("endTimestamp", &update.end_timestamp)?,
                    start_weights: parse_weights("startWeights", &update.start_weights)?,
                    end_weights: parse_weights("endWeights", &update.end_weights)?,
                })
            })
            .collect::<Result<Vec<_>, SubgraphError>>()?;

        let metadata = PoolMetadata {
            pool_id: parse("pool id", &raw.id)?,
            address: parse::<Address>("pool address", &raw.address)?,
            swap_fee: parse("swap fee", &raw.swap_fee)?,
            tokens,
            weight_updates,
        };
        // vault balances and simulation deltas are positional, token indices must be 0..n
        if let Some(missing) =
            (0..metadata.tokens.len()).find(|&index| metadata.token_by_index(index).is_none())
        {
            return Err(SubgraphError::ParseResponse(format!(
                "pool tokens do not cover index {missing}"
            )));
        }
        Ok(metadata)
    }
}

#[derive(Debug, Clone)]
pub struct SubgraphClient {
    http_client: Client,
    url: Url,
    backoff_policy: ExponentialBackoff,
}

impl SubgraphClient {
    pub fn new(subgraph_url: &str) -> Result<Self, SubgraphError> {
        let url = subgraph_url
            .parse::<Url>()
            .map_err(|e| SubgraphError::UrlParsing(subgraph_url.to_string(), e.to_string()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        let user_agent = format!("ascend-client-{version}", version = env!("CARGO_PKG_VERSION"));
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&user_agent)
                .map_err(|e| SubgraphError::ParseResponse(format!("Invalid user agent: {e}")))?,
        );

        let client = ClientBuilder::new()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SubgraphError::HttpClient(e.to_string(), e))?;

        Ok(Self {
            http_client: client,
            url,
            backoff_policy: ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(250))
                .with_multiplier(1.75)
                .with_max_interval(Duration::from_secs(10))
                .with_max_elapsed_time(Some(Duration::from_secs(30)))
                .build(),
        })
    }

    #[cfg(test)]
    fn with_test_backoff_policy(mut self) -> Self {
        self.backoff_policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(2))
            .with_max_interval(Duration::from_millis(10))
            .with_max_elapsed_time(Some(Duration::from_secs(1)))
            .build();
        self
    }

    /// Posts the query, retrying rate limits and unavailable gateways with backoff.
    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        request: &GraphQLRequest<'_>,
    ) -> Result<T, SubgraphError> {
        let response = backoff::future::retry(self.backoff_policy.clone(), || async {
            let response = self
                .http_client
                .post(self.url.clone())
                .json(request)
                .send()
                .await
                .map_err(|e| backoff::Error::permanent(SubgraphError::HttpClient(e.to_string(), e)))?;

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS |
                StatusCode::BAD_GATEWAY |
                StatusCode::SERVICE_UNAVAILABLE |
                StatusCode::GATEWAY_TIMEOUT => {
                    let status = response.status();
                    warn!(%status, "Subgraph temporarily unavailable");
                    Err(backoff::Error::transient(SubgraphError::Unreachable(status.to_string())))
                }
                status if !status.is_success() => {
                    let body = response.text().await.unwrap_or_default();
                    Err(backoff::Error::permanent(SubgraphError::Query(format!("{status}: {body}"))))
                }
                _ => Ok(response),
            }
        })
        .await?;

        let body = response
            .text()
            .await
            .map_err(|e| SubgraphError::HttpClient(e.to_string(), e))?;
        let parsed: GraphQLResponse<T> = serde_json::from_str(&body)
            .map_err(|e| SubgraphError::ParseResponse(format!("{e}: {body}")))?;
        if !parsed.errors.is_empty() {
            let messages = parsed
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SubgraphError::Query(messages));
        }
        parsed
            .data
            .ok_or_else(|| SubgraphError::ParseResponse("response without data".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_pool(&self, pool_id: B256) -> Result<PoolMetadata, SubgraphError> {
        let request = GraphQLRequest {
            query: POOL_QUERY,
            variables: json!({ "id": pool_id.to_string() }),
        };
        let data: PoolData = self.post(&request).await?;
        let raw = data
            .pool
            .ok_or(SubgraphError::PoolNotFound(pool_id))?;
        debug!(n_tokens = raw.tokens.len(), n_updates = raw.weight_updates.len(), "Loaded pool");
        PoolMetadata::try_from(raw)
    }
}
