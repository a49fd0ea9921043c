//! HTTP client for the registry's read-only JSON API.
//!
//! Two endpoints are used:
//! - `GET {api_base}/query?page={n}&per_page={k}` → `{ "plugins": [ {slug, name, version} ] }`
//! - `GET {api_base}/info?slug={slug}` → `{slug, name, version}`, or a 404 / a body
//!   without `slug` when the registry has no such key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::model::{CatalogItem, Lookup};
use crate::traits::{RegistryClient, RegistryError};

#[derive(Debug, Deserialize)]
struct QueryResponse {
    plugins: Vec<PluginPayload>,
}

#[derive(Debug, Deserialize)]
struct PluginPayload {
    slug: String,
    name: String,
    #[serde(default)]
    version: Option<String>,
}

impl From<PluginPayload> for CatalogItem {
    fn from(payload: PluginPayload) -> Self {
        Self {
            key: payload.slug,
            display_name: payload.name,
            version: payload.version,
        }
    }
}

/// [`RegistryClient`] over `reqwest`.
///
/// Every request carries its own timeout; a stuck call surfaces as
/// [`RegistryError::Transport`] rather than blocking the tick.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    api_base: String,
    lookup_timeout: Duration,
    list_timeout: Duration,
}

impl HttpRegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            lookup_timeout: Duration::from_secs(config.lookup_timeout_secs),
            list_timeout: Duration::from_secs(config.list_timeout_secs),
        })
    }

    async fn get_text(
        &self,
        url: String,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<(StatusCode, String), RegistryError> {
        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn list_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<CatalogItem>, RegistryError> {
        let url = format!("{}/query", self.api_base);
        let (status, body) = self
            .get_text(
                url.clone(),
                &[("page", page.to_string()), ("per_page", page_size.to_string())],
                self.list_timeout,
            )
            .await?;

        if status != StatusCode::OK {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let parsed: QueryResponse = serde_json::from_str(&body)?;
        debug!(page, items = parsed.plugins.len(), "Fetched catalog page");
        Ok(parsed.plugins.into_iter().map(CatalogItem::from).collect())
    }

    async fn lookup_by_key(&self, key: &str) -> Result<Lookup, RegistryError> {
        let url = format!("{}/info", self.api_base);
        let (status, body) = self
            .get_text(url.clone(), &[("slug", key.to_string())], self.lookup_timeout)
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        if status != StatusCode::OK {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let value: serde_json::Value = serde_json::from_str(&body)?;
        if value.get("error").is_some() || value.get("slug").is_none() {
            return Ok(Lookup::NotFound);
        }

        let payload: PluginPayload = serde_json::from_value(value)?;
        Ok(Lookup::Found(payload.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server) -> HttpRegistryClient {
        HttpRegistryClient::new(&RegistryConfig {
            api_base: server.url(),
            lookup_timeout_secs: 2,
            list_timeout_secs: 2,
            ..RegistryConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn list_page_sends_paging_params_and_decodes_items() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "3".into()),
                Matcher::UrlEncoded("per_page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"plugins":[
                    {"slug":"akismet","name":"Akismet","version":"5.3"},
                    {"slug":"hello-dolly","name":"Hello Dolly"}
                ]}"#,
            )
            .create_async()
            .await;

        let items = client_for(&server).list_page(3, 2).await.unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "akismet");
        assert_eq!(items[0].version.as_deref(), Some("5.3"));
        assert_eq!(items[1].version, None);
    }

    #[tokio::test]
    async fn list_page_treats_bad_status_and_bad_json_as_errors() {
        let mut server = Server::new_async().await;
        let _unavailable = server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(503)
            .create_async()
            .await;
        let _garbage = server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"{"info":{}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.list_page(1, 50).await,
            Err(RegistryError::Status { status: 503, .. })
        ));
        assert!(matches!(
            client.list_page(2, 50).await,
            Err(RegistryError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn lookup_distinguishes_found_not_found_and_failure() {
        let mut server = Server::new_async().await;
        let _found = server
            .mock("GET", "/info")
            .match_query(Matcher::UrlEncoded("slug".into(), "gamma".into()))
            .with_status(200)
            .with_body(r#"{"slug":"gamma","name":"Gamma","version":"1.0"}"#)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/info")
            .match_query(Matcher::UrlEncoded("slug".into(), "nope".into()))
            .with_status(404)
            .create_async()
            .await;
        let _error_body = server
            .mock("GET", "/info")
            .match_query(Matcher::UrlEncoded("slug".into(), "closed".into()))
            .with_status(200)
            .with_body(r#"{"error":"Plugin not found."}"#)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/info")
            .match_query(Matcher::UrlEncoded("slug".into(), "flaky".into()))
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.lookup_by_key("gamma").await.unwrap(),
            Lookup::Found(CatalogItem {
                key: "gamma".into(),
                display_name: "Gamma".into(),
                version: Some("1.0".into()),
            })
        );
        assert_eq!(client.lookup_by_key("nope").await.unwrap(), Lookup::NotFound);
        assert_eq!(client.lookup_by_key("closed").await.unwrap(), Lookup::NotFound);
        assert!(client.lookup_by_key("flaky").await.is_err());
    }
}
