//! OpenUV HTTP client.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::City;
use crate::error::{ConfigError, CoreError, FetchError};

const TOKEN_HEADER: &str = "x-access-token";

/// Current UV index and today's forecast maximum for one city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvReading {
    pub current: f64,
    pub today_max: f64,
}

/// Anything that can fetch a [`UvReading`] for a city.
pub trait UvSource: Send + Sync {
    fn fetch(&self, city: &City) -> impl Future<Output = Result<UvReading, FetchError>> + Send;
}

pub struct UvForecastClient {
    http: Client,
    endpoint: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct ApiBody {
    result: Option<ApiResult>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiResult {
    uv: f64,
    uv_max: f64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl UvForecastClient {
    pub fn new(endpoint: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, CoreError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "forecast.endpoint".into(),
            message: e.to_string(),
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::from)?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }
}

impl UvSource for UvForecastClient {
    fn fetch(&self, city: &City) -> impl Future<Output = Result<UvReading, FetchError>> + Send {
        let request = self
            .http
            .get(self.endpoint.clone())
            .query(&[("lat", city.lat), ("lng", city.lng)])
            .header(TOKEN_HEADER, &self.api_key);
        let name = city.name;

        async move {
            let resp = request.send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            let reading = decode_body(status.as_u16(), &body);
            if let Err(e) = &reading {
                tracing::warn!(city = name, status = status.as_u16(), error = %e, "UV fetch failed");
            }
            reading
        }
    }
}

/// Interpret an OpenUV response. An `error.message` in the body wins over
/// the status code.
fn decode_body(status: u16, body: &str) -> Result<UvReading, FetchError> {
    let parsed = serde_json::from_str::<ApiBody>(body);

    if let Ok(ApiBody {
        error: Some(err), ..
    }) = &parsed
    {
        return Err(FetchError::Api(err.message.clone()));
    }
    if !(200..300).contains(&status) {
        return Err(FetchError::Status(status));
    }

    match parsed {
        Ok(ApiBody {
            result: Some(result),
            ..
        }) => Ok(UvReading {
            current: result.uv,
            today_max: result.uv_max,
        }),
        Ok(_) => Err(FetchError::Decode("missing result".into())),
        Err(e) => Err(FetchError::Decode(e.to_string())),
    }
}
