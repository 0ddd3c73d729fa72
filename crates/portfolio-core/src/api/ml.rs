//! Client for the HedgeAI ML scoring service.
//!
//! The service speaks camelCase JSON and plain floats. Decimals are converted
//! at this boundary only.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::MlConfig;
use crate::{Error, Result};

/// One holding as the scoring model sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPosition {
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vega: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlPortfolioData {
    pub total_value: f64,
    pub positions: Vec<MlPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_returns: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRequest {
    pub portfolio_id: String,
    pub portfolio_data: MlPortfolioData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPrediction {
    /// 0..=100.
    pub risk_score: f64,
    pub volatility: f64,
    #[serde(rename = "var95")]
    pub var_95: f64,
    #[serde(rename = "var99")]
    pub var_99: f64,
    pub sharpe_ratio: f64,
    pub recommendation: String,
    /// 0..=1.
    pub confidence: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HedgeRequest {
    /// Aggregate portfolio delta.
    pub delta: f64,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HedgeRecommendation {
    /// BUY, SELL or HOLD.
    pub action: String,
    pub contracts: i64,
    pub strategy: String,
    pub expected_reduction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlHealth {
    pub status: String,
    pub timestamp: String,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub trained_at: String,
    pub performance_metrics: HashMap<String, f64>,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    portfolios: &'a [RiskRequest],
}

/// Risk scoring and hedging seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RiskModel: Send + Sync {
    async fn predict_risk(&self, request: &RiskRequest) -> Result<RiskPrediction>;

    async fn recommend_hedge(&self, request: &HedgeRequest) -> Result<HedgeRecommendation>;

    async fn batch_predict(&self, requests: &[RiskRequest]) -> Result<Vec<RiskPrediction>>;

    async fn health(&self) -> Result<MlHealth>;

    async fn model_info(&self) -> Result<ModelInfo>;
}

/// HTTP client for the ML service.
pub struct MlClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl MlClient {
    pub fn new(config: &MlConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        decode(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http_client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;

        decode(path, response).await
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::MlService {
        message: if e.is_timeout() {
            "ML service timed out".to_string()
        } else {
            format!("ML service unreachable: {}", e)
        },
        status: None,
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(path, status = status.as_u16(), body = %body, "ML service request failed");
        return Err(Error::MlService {
            message: format!("{} returned {}", path, status),
            status: Some(status.as_u16()),
        });
    }

    response.json().await.map_err(|e| Error::MlService {
        message: format!("Malformed response from {}: {}", path, e),
        status: Some(status.as_u16()),
    })
}

#[async_trait]
impl RiskModel for MlClient {
    async fn predict_risk(&self, request: &RiskRequest) -> Result<RiskPrediction> {
        tracing::debug!(portfolio_id = %request.portfolio_id, "Requesting risk prediction");
        self.post("/predict-risk", request).await
    }

    async fn recommend_hedge(&self, request: &HedgeRequest) -> Result<HedgeRecommendation> {
        self.post("/recommend-hedge", request).await
    }

    async fn batch_predict(&self, requests: &[RiskRequest]) -> Result<Vec<RiskPrediction>> {
        self.post("/batch-predict", &BatchRequest { portfolios: requests })
            .await
    }

    async fn health(&self) -> Result<MlHealth> {
        self.get("/health").await
    }

    async fn model_info(&self) -> Result<ModelInfo> {
        self.get("/model-info").await
    }
}
