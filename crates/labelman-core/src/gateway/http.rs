//! `reqwest`-backed gateway talking to the labeling API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    BulkTagRequest, ClusterAssignment, ClusterResultBody, DatasetPayload, Empty, Envelope, Gateway,
    MessageBody, SaveModelRequest, TagRequest, TagsBody, TrainBody, TrainRequest,
};
use crate::config::ClientConfig;
use crate::error::{LabelmanError, Result};
use crate::models::TrainingResults;

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| LabelmanError::validation(format!("Invalid API URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(LabelmanError::validation(format!(
                "API URL cannot be used as a base: {base_url}"
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            token,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.base_url, config.token.clone())
    }

    /// Builds `base_url/segment/...`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LabelmanError::validation("API URL cannot be used as a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        debug!(%method, %url, "API request");
        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }
}

/// Maps non-2xx to [`LabelmanError::Http`] and `success: false` to
/// [`LabelmanError::Remote`]; otherwise returns the envelope body.
async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Envelope<Empty>>(&text)
            .ok()
            .and_then(|env| env.error)
            .unwrap_or_else(|| {
                if text.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    text
                }
            });
        return Err(LabelmanError::Http {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: Envelope<T> = serde_json::from_str(&text)?;
    envelope.into_result(what)
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch_dataset_items(&self, dataset_id: &str) -> Result<DatasetPayload> {
        let resp = self
            .request(Method::GET, &["datasets", dataset_id, "items"])?
            .send()
            .await?;
        decode(resp, "Loading dataset").await
    }

    async fn fetch_cluster_result(
        &self,
        cluster_result_id: &str,
    ) -> Result<Vec<ClusterAssignment>> {
        let resp = self
            .request(Method::GET, &["clustering", "results", cluster_result_id])?
            .send()
            .await?;
        let body: ClusterResultBody = decode(resp, "Loading cluster result").await?;
        Ok(body.data.map(|d| d.results).unwrap_or_default())
    }

    async fn list_tags(&self, item_id: &str) -> Result<Vec<String>> {
        let resp = self
            .request(Method::GET, &["images", item_id, "tags"])?
            .send()
            .await?;
        let body: TagsBody = decode(resp, "Listing tags").await?;
        Ok(body.tags.unwrap_or_default())
    }

    async fn add_tag(&self, item_id: &str, label: &str) -> Result<()> {
        let resp = self
            .request(Method::POST, &["images", item_id, "tags"])?
            .json(&TagRequest {
                tag: label.to_string(),
            })
            .send()
            .await?;
        decode::<TagsBody>(resp, "Adding tag").await?;
        Ok(())
    }

    async fn delete_tag(&self, item_id: &str, label: &str) -> Result<()> {
        let resp = self
            .request(Method::DELETE, &["images", item_id, "tags", label])?
            .send()
            .await?;
        decode::<Empty>(resp, "Deleting tag").await?;
        Ok(())
    }

    async fn bulk_tag_by_cluster(&self, request: &BulkTagRequest) -> Result<String> {
        let resp = self
            .request(Method::POST, &["clustering", "bulk-tag"])?
            .json(request)
            .send()
            .await?;
        let body: MessageBody = decode(resp, "Tagging clusters").await?;
        Ok(body.message.unwrap_or_default())
    }

    async fn submit_training(&self, request: &TrainRequest) -> Result<TrainingResults> {
        let resp = self
            .request(Method::POST, &["training", "train"])?
            .json(request)
            .send()
            .await?;
        let body: TrainBody = decode(resp, "Training").await?;
        body.training_results
            .ok_or_else(|| LabelmanError::Remote("Training response carried no results".into()))
    }

    async fn save_model(&self, request: &SaveModelRequest) -> Result<()> {
        let resp = self
            .request(Method::POST, &["models", "save"])?
            .json(request)
            .send()
            .await?;
        decode::<Empty>(resp, "Saving model").await?;
        Ok(())
    }
}
