use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use watchedit_core::{format_timestamp, AppConfig, RecordSet, Tag, Work, BACKUP_VERSION};

use crate::error::{CloudError, Result};
use crate::USER_AGENT;

/// Body of `GET /backup`. `null` or missing collections mean empty.
#[derive(Debug, Default, Deserialize)]
pub struct RemoteRecords {
    #[serde(default)]
    pub works: Option<Vec<Work>>,
    #[serde(default)]
    pub tags: Option<Vec<Tag>>,
}

impl RemoteRecords {
    pub fn into_records(self) -> RecordSet {
        RecordSet::new(self.works.unwrap_or_default(), self.tags.unwrap_or_default())
    }
}

/// Body of `POST /backup`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload<'a> {
    pub works: &'a [Work],
    pub tags: &'a [Tag],
    pub backup_date: String,
    pub version: &'a str,
    pub device_id: &'a str,
}

impl<'a> UploadPayload<'a> {
    pub fn new(records: &'a RecordSet, device_id: &'a str) -> Self {
        Self {
            works: &records.works,
            tags: &records.tags,
            backup_date: format_timestamp(&chrono::Utc::now()),
            version: BACKUP_VERSION,
            device_id,
        }
    }
}

/// Client for the user's cloud backup endpoint. No retries: every failure
/// is reported to the caller as-is.
pub struct CloudClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CloudClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let endpoint = config.cloud_endpoint().ok_or_else(|| {
            CloudError::NotConfigured("set [cloud] endpoint or WATCHEDIT_CLOUD_ENDPOINT".into())
        })?;
        Ok(Self::new(&endpoint, config.cloud_api_key()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn check_status(url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CloudError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// `GET {endpoint}/backup?device_id=...`
    pub async fn fetch(&self, device_id: &str) -> Result<RecordSet> {
        let url = format!("{}/backup", self.base_url);
        tracing::debug!(%url, device_id, "downloading remote records");

        let response = self
            .authorized(self.client.get(&url).query(&[("device_id", device_id)]))
            .send()
            .await?;
        let text = Self::check_status(&url, response).await?.text().await?;
        let remote: RemoteRecords =
            serde_json::from_str(&text).map_err(|e| CloudError::Parse(e.to_string()))?;
        Ok(remote.into_records())
    }

    /// `POST {endpoint}/backup`. The response body is not used.
    pub async fn upload(&self, payload: &UploadPayload<'_>) -> Result<()> {
        let url = format!("{}/backup", self.base_url);
        tracing::debug!(
            %url,
            works = payload.works.len(),
            tags = payload.tags.len(),
            "uploading records"
        );

        let response = self
            .authorized(self.client.post(&url).json(payload))
            .send()
            .await?;
        Self::check_status(&url, response).await?;
        Ok(())
    }

    /// `GET {endpoint}/health`
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::check_status(&url, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use watchedit_core::WorkType;

    #[tokio::test]
    async fn test_fetch_sends_device_id_and_bearer() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/backup")
            .match_query(Matcher::UrlEncoded("device_id".into(), "device_1_abc".into()))
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"works":[{"id":"w1","title":"Akira","type":"movie","status":"completed",
                    "date_added":"2024-01-01T00:00:00Z"}],"tags":null}"#,
            )
            .create_async()
            .await;

        let client = CloudClient::new(&format!("{}/", server.url()), Some("secret".into()));
        let records = client.fetch("device_1_abc").await.unwrap();
        assert_eq!(records.works.len(), 1);
        assert_eq!(records.works[0].work_type, WorkType::Movie);
        assert!(records.tags.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_empty_object() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/backup")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = CloudClient::new(&server.url(), None);
        assert!(client.fetch("d").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/backup")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let client = CloudClient::new(&server.url(), None);
        match client.fetch("d").await {
            Err(CloudError::Status { status, body, .. }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_payload_shape() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/backup")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "version": "1.0.0",
                "deviceId": "dev",
                "tags": [{"id": 1, "name": "x", "color": "#3b82f6"}],
            })))
            .with_status(201)
            .create_async()
            .await;

        let records = RecordSet::new(
            vec![Work::new("A", WorkType::Anime)],
            vec![Tag::new(1, "x")],
        );
        let client = CloudClient::new(&server.url(), None);
        client.upload(&UploadPayload::new(&records, "dev")).await.unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = Server::new_async().await;
        let ok = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let client = CloudClient::new(&server.url(), None);
        client.health().await.unwrap();
        ok.assert_async().await;
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        let config = AppConfig::default();
        assert!(matches!(
            CloudClient::from_config(&config),
            Err(CloudError::NotConfigured(_))
        ));

        let mut config = AppConfig::default();
        config.cloud.endpoint = Some("https://sync.example.com/".into());
        let client = CloudClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "https://sync.example.com");
    }
}
