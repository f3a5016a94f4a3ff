//! One paginated, non-streaming fetch.
//!
//! A fetch is three reads joined together: the records page, the partition
//! listing, and (permission allowing) the schema listing. Nothing is published
//! unless all three succeed.

use std::sync::Arc;

use tracing::{debug, warn};

use topicscope_client::TopicApi;
use topicscope_core::{Capabilities, Filter, NextPage, Page, Result, SchemaEntry};

/// Whether a fetch starts over or continues from a next-page token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    First,
    Next(NextPage),
}

impl FetchMode {
    #[must_use]
    pub const fn is_next(&self) -> bool {
        matches!(self, Self::Next(_))
    }
}

/// Everything one fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// The response as a standalone page (page number 1).
    pub page: Page,
    pub partition_count: usize,
    pub schemas: Vec<SchemaEntry>,
    /// The query the records were requested with.
    pub history_query: String,
    pub mode: FetchMode,
}

#[derive(Clone)]
pub struct PageFetcher {
    api: Arc<dyn TopicApi>,
    cluster: String,
    topic: String,
    capabilities: Capabilities,
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher")
            .field("cluster", &self.cluster)
            .field("topic", &self.topic)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl PageFetcher {
    #[must_use]
    pub fn new(
        api: Arc<dyn TopicApi>,
        cluster: impl Into<String>,
        topic: impl Into<String>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            api,
            cluster: cluster.into(),
            topic: topic.into(),
            capabilities,
        }
    }

    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub async fn fetch_first_page(&self, filter: &Filter) -> Result<FetchedPage> {
        self.fetch(filter, FetchMode::First).await
    }

    pub async fn fetch_next_page(&self, filter: &Filter, next: &NextPage) -> Result<FetchedPage> {
        self.fetch(filter, FetchMode::Next(next.clone())).await
    }

    /// Fetch per `mode`; any failure is reported as `FetchFailed`.
    pub async fn fetch(&self, filter: &Filter, mode: FetchMode) -> Result<FetchedPage> {
        let query = request_query(filter, &mode);
        debug!(
            cluster = %self.cluster,
            topic = %self.topic,
            query = %query,
            next = mode.is_next(),
            "fetching page"
        );

        let result = tokio::try_join!(
            self.api.fetch_records(&self.cluster, &self.topic, &query),
            self.api.fetch_partitions(&self.cluster, &self.topic),
            self.schemas(),
        );
        let (records, partitions, schemas) = result.map_err(|err| {
            warn!(cluster = %self.cluster, topic = %self.topic, error = %err, "page fetch failed");
            err.into_fetch_failed()
        })?;

        let page = Page::from_response(records);
        debug!(
            records = page.records.len(),
            total = page.total_size,
            partitions = partitions.len(),
            "page fetched"
        );
        Ok(FetchedPage {
            page,
            partition_count: partitions.len(),
            schemas,
            history_query: query,
            mode,
        })
    }

    /// Tombstone `key_base64` in `partition`; failures become `DeleteFailed`.
    pub async fn delete_record(&self, partition: u32, key_base64: &str) -> Result<()> {
        self.api
            .delete_record(&self.cluster, &self.topic, partition, key_base64)
            .await
            .map_err(|err| {
                warn!(partition, error = %err, "delete failed");
                err.into_delete_failed()
            })
    }

    async fn schemas(&self) -> Result<Vec<SchemaEntry>> {
        if self.capabilities.can_access_schema {
            self.api.fetch_schemas(&self.cluster).await
        } else {
            Ok(Vec::new())
        }
    }
}

/// The records query for `mode`.
///
/// A link token is followed as-is; a bare cursor is applied to `filter`.
#[must_use]
pub fn request_query(filter: &Filter, mode: &FetchMode) -> String {
    match mode {
        FetchMode::First => filter.build(),
        FetchMode::Next(next) if next.is_link() => next.query(),
        FetchMode::Next(next) => filter.clone().with_after(next.after()).build(),
    }
}
