use crate::push::{CredentialProvider, Credentials, PushError, PushResult};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Fetches push credentials from the mail backend's credentials endpoint
pub struct HttpCredentialProvider {
    endpoint: Url,
    http_client: HttpClient,
    session_token: Option<String>,
}

impl HttpCredentialProvider {
    /// Create a provider for the given endpoint URL
    pub fn new(endpoint: &str) -> PushResult<Self> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(PushError::invalid_config(format!(
                "credentials endpoint must be http(s), got {}",
                endpoint.scheme()
            )));
        }

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            endpoint,
            http_client,
            session_token: None,
        })
    }

    /// Authenticate credential requests with a bearer session token
    pub fn with_session_token<S: Into<String>>(mut self, token: S) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn fetch_credentials(&self) -> PushResult<Credentials> {
        let mut request = self.http_client.get(self.endpoint.clone());
        if let Some(token) = &self.session_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PushError::credentials(format!("{}: {}", status, error_text)));
        }

        let body = response.text().await?;
        debug!("Received push credentials from {}", self.endpoint);
        parse_credentials(&body)
    }
}

/// Parse the endpoint's JSON body
pub fn parse_credentials(body: &str) -> PushResult<Credentials> {
    let credentials: Credentials = serde_json::from_str(body)
        .map_err(|e| PushError::credentials(format!("unreadable credentials: {}", e)))?;

    if credentials.token.trim().is_empty() {
        return Err(PushError::credentials("empty credentials token"));
    }

    Ok(credentials)
}
