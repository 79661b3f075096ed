//! HTTP client for the Microsoft To Do endpoints of the Graph API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::remote::{Page, RemoteList, RemoteService, RemoteTask};

/// Environment variable that overrides `remote.access_token`.
pub const TOKEN_ENV: &str = "CARDSYNC_TOKEN";

/// `RemoteService` over the Graph REST API.
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Build a client from config, preferring the token in `CARDSYNC_TOKEN`.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .or_else(|| config.access_token.clone())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(Error::MissingToken)?;
        Self::new(
            config.base_url.clone(),
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ODataError>(&text) {
            Ok(body) if !body.error.code.is_empty() => {
                format!("{}: {}", body.error.code, body.error.message)
            }
            Ok(body) => body.error.message,
            Err(_) => text,
        };
        warn!(status = status.as_u16(), %message, "remote request failed");
        Err(Error::Remote {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>> {
        debug!(url, "GET page");
        let response = self.request(Method::GET, url).send().await?;
        let page: ODataPage<T> = Self::check(response).await?.json().await?;
        Ok(Page {
            items: page.value,
            next: page.next_link,
        })
    }

    async fn send_json<B, T>(&self, method: Method, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        debug!(%method, url, "send");
        let response = self.request(method, url).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete(&self, url: &str) -> Result<()> {
        debug!(url, "DELETE");
        let response = self.request(Method::DELETE, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteService for GraphClient {
    async fn list_collections(&self, cursor: Option<&str>) -> Result<Page<RemoteList>> {
        let url = cursor.map_or_else(|| self.url("lists"), str::to_string);
        self.get_page(&url).await
    }

    async fn list_items(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page<RemoteTask>> {
        let url = cursor
            .map_or_else(|| self.url(&format!("lists/{collection_id}/tasks")), str::to_string);
        self.get_page(&url).await
    }

    async fn create_collection(&self, list: &RemoteList) -> Result<RemoteList> {
        self.send_json(Method::POST, &self.url("lists"), list).await
    }

    async fn update_collection(&self, collection_id: &str, list: &RemoteList) -> Result<RemoteList> {
        self.send_json(Method::PATCH, &self.url(&format!("lists/{collection_id}")), list)
            .await
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        self.delete(&self.url(&format!("lists/{collection_id}"))).await
    }

    async fn create_item(&self, collection_id: &str, task: &RemoteTask) -> Result<RemoteTask> {
        self.send_json(
            Method::POST,
            &self.url(&format!("lists/{collection_id}/tasks")),
            task,
        )
        .await
    }

    async fn update_item(
        &self,
        collection_id: &str,
        item_id: &str,
        task: &RemoteTask,
    ) -> Result<RemoteTask> {
        self.send_json(
            Method::PATCH,
            &self.url(&format!("lists/{collection_id}/tasks/{item_id}")),
            task,
        )
        .await
    }

    async fn delete_item(&self, collection_id: &str, item_id: &str) -> Result<()> {
        self.delete(&self.url(&format!("lists/{collection_id}/tasks/{item_id}")))
            .await
    }
}
