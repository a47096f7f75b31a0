use log::debug;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Token;
use crate::error::{PipewaitError, Result};
use crate::providers::gitlab::types::ApiResponse;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Thin client for the GitLab REST API of a single project.
///
/// Every request carries the `PRIVATE-TOKEN` header. Response bodies are
/// parsed as JSON regardless of the HTTP status because GitLab reports
/// scope and auth problems as error objects.
pub struct GitLabClient {
    client: Client,
    project_url: String,
    token: Token,
}

impl GitLabClient {
    /// Creates a client for `repo` on the instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be built or the
    /// resulting project URL is invalid.
    pub fn new(
        base_url: &Url,
        api_version: &str,
        repo: &str,
        token: Token,
        user_agent: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| PipewaitError::Config(format!("Failed to create HTTP client: {e}")))?;

        let project_url = format!(
            "{}/api/{}/projects/{}",
            base_url.as_str().trim_end_matches('/'),
            api_version,
            urlencoding::encode(repo)
        );

        Url::parse(&project_url)
            .map_err(|e| PipewaitError::Config(format!("Invalid project URL: {e}")))?;

        Ok(Self {
            client,
            project_url,
            token,
        })
    }

    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(TOKEN_HEADER, self.token.as_str())
    }

    /// Builds `{project_url}/{path}`.
    pub fn project_endpoint(&self, path: &str) -> Result<Url> {
        let endpoint = format!("{}/{}", self.project_url, path.trim_start_matches('/'));
        Url::parse(&endpoint)
            .map_err(|e| PipewaitError::Config(format!("Invalid endpoint URL {endpoint}: {e}")))
    }

    pub(super) async fn send_get(&self, url: Url) -> Result<Response> {
        debug!("GET {url}");
        let response = self.auth_request(self.client.get(url)).send().await?;
        debug!("Response status: {}", response.status());
        Ok(response)
    }

    /// GETs `url` and parses the body as data or an API error object.
    pub(super) async fn get_api<T>(&self, url: Url) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
    {
        let endpoint = url.to_string();
        let body = self.send_get(url).await?.text().await?;
        ApiResponse::parse(&endpoint, &body)
    }
}
