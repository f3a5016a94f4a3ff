//! Request/response endpoints of the backend.
//!
//! Routes, relative to the configured API base (`<url><prefix>`):
//!
//! ```text
//! GET    /<cluster>/topic/<topic>/data?<filter>        paginated records
//! GET    /<cluster>/topic/<topic>/partitions           partition listing
//! GET    /<cluster>/schema                             schema registry listing
//! DELETE /<cluster>/topic/<topic>/data?partition=&key= tombstone one key
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use topicscope_core::query::encode_value;
use topicscope_core::{
    Config, Error, PartitionSummary, RecordsResponse, Result, SchemaEntry, SchemaListResponse,
};

/// The non-streaming backend operations the data view depends on.
#[async_trait]
pub trait TopicApi: Send + Sync {
    /// One page of records for `query` (a serialized filter, possibly carrying `after`).
    async fn fetch_records(&self, cluster: &str, topic: &str, query: &str)
    -> Result<RecordsResponse>;

    async fn fetch_partitions(&self, cluster: &str, topic: &str) -> Result<Vec<PartitionSummary>>;

    async fn fetch_schemas(&self, cluster: &str) -> Result<Vec<SchemaEntry>>;

    /// Produce a tombstone for `key_base64` in `partition`.
    async fn delete_record(
        &self,
        cluster: &str,
        topic: &str,
        partition: u32,
        key_base64: &str,
    ) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct DeleteRecordBody<'a> {
    partition: u32,
    key: &'a str,
}

/// [`TopicApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTopicApi {
    client: reqwest::Client,
    base: String,
}

impl HttpTopicApi {
    /// Build a client with the configured request timeout.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self::with_client(client, config.api_base()))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { client, base }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    fn topic_url(&self, cluster: &str, topic: &str, leaf: &str) -> String {
        format!(
            "{}/{}/topic/{}/{leaf}",
            self.base,
            encode_value(cluster),
            encode_value(topic)
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "GET");
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        let body = read_success_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl TopicApi for HttpTopicApi {
    async fn fetch_records(
        &self,
        cluster: &str,
        topic: &str,
        query: &str,
    ) -> Result<RecordsResponse> {
        let mut url = self.topic_url(cluster, topic, "data");
        let query = query.trim_start_matches('?');
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        self.get_json(&url).await
    }

    async fn fetch_partitions(&self, cluster: &str, topic: &str) -> Result<Vec<PartitionSummary>> {
        self.get_json(&self.topic_url(cluster, topic, "partitions"))
            .await
    }

    async fn fetch_schemas(&self, cluster: &str) -> Result<Vec<SchemaEntry>> {
        let url = format!("{}/{}/schema", self.base, encode_value(cluster));
        let listing: SchemaListResponse = self.get_json(&url).await?;
        Ok(listing.results)
    }

    async fn delete_record(
        &self,
        cluster: &str,
        topic: &str,
        partition: u32,
        key_base64: &str,
    ) -> Result<()> {
        let url = format!(
            "{}?partition={partition}&key={}",
            self.topic_url(cluster, topic, "data"),
            encode_value(key_base64)
        );
        debug!(url, partition, "DELETE");
        let response = self
            .client
            .delete(&url)
            .json(&DeleteRecordBody {
                partition,
                key: key_base64,
            })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_success_body(response).await?;
        Ok(())
    }
}

/// Return the body of a 2xx response, or an [`Error::Http`] carrying it.
pub(crate) async fn read_success_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(map_reqwest_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::Http {
            status: status.as_u16(),
            message: body,
        })
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(err.to_string())
    } else if let Some(status) = err.status() {
        Error::Http {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else {
        Error::Connection(err.to_string())
    }
}
