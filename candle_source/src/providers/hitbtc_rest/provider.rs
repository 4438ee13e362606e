use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::get_env_var_opt;
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    models::{candle::CandleTick, request_params::CandlesRequest, ticker::Ticker},
    providers::{
        CandleSource, ClientBuildSnafu, InvalidBaseUrlSnafu, ProviderInitError, SourceError,
        hitbtc_rest::{
            params::{Sort, construct_params, validate_symbol},
            response::{api_error_message, decode_candles, decode_ticker},
        },
    },
};

pub const DEFAULT_BASE_URL: &str = "https://api.hitbtc.com";

const API_PREFIX: &str = "/api/2";

/// Basic-auth pair sent with every request when configured.
struct Credentials {
    public_key: SecretString,
    secret: SecretString,
}

pub struct HitBtcProvider {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl HitBtcProvider {
    /// Creates a provider for `base_url` (e.g., [`DEFAULT_BASE_URL`]) with a
    /// per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderInitError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            InvalidBaseUrlSnafu { url: base_url }
        );

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url,
            credentials: None,
        })
    }

    /// Same as [`HitBtcProvider::new`], attaching credentials from the
    /// `HITBTC_PUBLIC_KEY` and `HITBTC_SECRET` environment variables when both are set.
    pub fn from_env(base_url: &str, timeout: Duration) -> Result<Self, ProviderInitError> {
        let provider = Self::new(base_url, timeout)?;
        match (
            get_env_var_opt("HITBTC_PUBLIC_KEY"),
            get_env_var_opt("HITBTC_SECRET"),
        ) {
            (Some(pk), Some(secret)) => {
                Ok(provider.with_credentials(SecretString::from(pk), SecretString::from(secret)))
            }
            _ => Ok(provider),
        }
    }

    pub fn with_credentials(mut self, public_key: SecretString, secret: SecretString) -> Self {
        self.credentials = Some(Credentials { public_key, secret });
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{API_PREFIX}/{path}", self.base_url);
        let req = self.client.get(url);
        match &self.credentials {
            Some(c) => req.basic_auth(
                c.public_key.expose_secret(),
                Some(c.secret.expose_secret()),
            ),
            None => req,
        }
    }

    async fn fetch_body(&self, req: RequestBuilder) -> Result<String, SourceError> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SourceError::Api(format!(
                "HTTP {status}: {}",
                api_error_message(&body)
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl CandleSource for HitBtcProvider {
    async fn get_candles(&self, req: &CandlesRequest) -> Result<Vec<CandleTick>, SourceError> {
        req.validate()?;
        validate_symbol(&req.symbol)?;

        let query = construct_params(req, Sort::Desc);
        let body = self
            .fetch_body(
                self.get(&format!("public/candles/{}", req.symbol))
                    .query(&query),
            )
            .await?;

        let ticks = decode_candles(&req.symbol, &body)?;
        debug!(
            symbol = %req.symbol,
            period = %req.period,
            count = ticks.len(),
            "fetched candles"
        );
        Ok(ticks)
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, SourceError> {
        validate_symbol(symbol)?;
        let body = self
            .fetch_body(self.get(&format!("public/ticker/{symbol}")))
            .await?;
        decode_ticker(symbol, &body)
    }
}
