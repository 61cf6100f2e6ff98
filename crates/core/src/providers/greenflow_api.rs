use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::emission::MonthlyCarbonData;
use crate::models::settings::Settings;
use crate::models::trip::TripLogPayload;
use super::traits::CarbonBackend;

const MY_DATA_PATH: &str = "/api/custom/my-data";
const VEHICLE_LOG_PATH: &str = "/api/carbon/vehicle-log";

/// HTTP client for the GreenFlow backend.
///
/// - **Auth**: `Authorization: Bearer <token>` on every request.
/// - **Envelope**: every response is `{ "status": bool, "message": str, "data": ... }`;
///   `status == false` is reported as [`CoreError::Api`] with the message.
/// - **Endpoints used**: `GET /api/custom/my-data` (monthly carbon series),
///   `POST /api/carbon/vehicle-log` (finished trips).
pub struct GreenFlowApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl GreenFlowApiClient {
    pub fn new(settings: &Settings) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            auth_token: settings.auth_token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_envelope<T: DeserializeOwned>(
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, CoreError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| CoreError::Api {
            endpoint: endpoint.into(),
            message: format!("Failed to parse response (HTTP {status}): {e}"),
        })?;

        if !envelope.status || !status.is_success() {
            warn!(endpoint, http_status = status.as_u16(), message = %envelope.message, "Backend rejected request");
            return Err(CoreError::Api {
                endpoint: endpoint.into(),
                message: if envelope.message.is_empty() {
                    format!("HTTP {status}")
                } else {
                    envelope.message
                },
            });
        }

        Ok(envelope)
    }
}

// ── GreenFlow API response types ────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl CarbonBackend for GreenFlowApiClient {
    fn name(&self) -> &str {
        "GreenFlow API"
    }

    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch_monthly_carbon(&self) -> Result<MonthlyCarbonData, CoreError> {
        let request = self.authorized(self.client.get(self.url(MY_DATA_PATH)));
        let envelope: Envelope<MonthlyCarbonData> =
            Self::read_envelope(MY_DATA_PATH, request).await?;

        let data = envelope.data.unwrap_or_default();
        debug!(
            vehicle_months = data.monthly_vehicle_carbon.len(),
            electronic_months = data.monthly_electronic_carbon.len(),
            "Monthly carbon fetched"
        );
        Ok(data)
    }

    #[tracing::instrument(skip(self, payload), fields(vehicle_id = payload.vehicle_id))]
    async fn submit_trip(&self, payload: &TripLogPayload) -> Result<(), CoreError> {
        let request = self
            .authorized(self.client.post(self.url(VEHICLE_LOG_PATH)))
            .json(payload);
        let _: Envelope<serde_json::Value> = Self::read_envelope(VEHICLE_LOG_PATH, request).await?;

        info!(distance_km = payload.distance_km, "Trip submitted");
        Ok(())
    }
}
