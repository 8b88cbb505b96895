use serde::Deserialize;

/// Main configuration structure for Comment-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "collection")]
    pub collections: Vec<CollectionConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of HTTP requests in flight at once
    #[serde(rename = "network-concurrency", default = "default_network_concurrency")]
    pub network_concurrency: usize,

    /// Maximum number of crawl units admitted per collection at once
    #[serde(rename = "fan-out-limit", default = "default_fan_out_limit")]
    pub fan_out_limit: usize,

    /// Retries per request after the first attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Minimum time between console redraws (milliseconds)
    #[serde(rename = "report-interval-ms", default = "default_report_interval")]
    pub report_interval_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            network_concurrency: default_network_concurrency(),
            fan_out_limit: default_fan_out_limit(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout(),
            report_interval_ms: default_report_interval(),
        }
    }
}

fn default_network_concurrency() -> usize {
    16
}

fn default_fan_out_limit() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_report_interval() -> u64 {
    500
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Shape of a collection's upstream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// JSON comment pages addressed by `(id, page)`
    Paginated,
    /// Raw bodies addressed by `id` alone
    Body,
}

/// One harvested collection
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    /// Collection name, also used as the table name
    pub name: String,

    pub kind: CollectionKind,

    /// URL template with `{id}` and (for paginated collections) `{page}`
    pub url: String,

    /// Fixed upper bound of the id space
    #[serde(rename = "max-id", default)]
    pub max_id: Option<i64>,

    /// Page scanned for the newest id when no fixed bound is given
    #[serde(rename = "discovery-url", default)]
    pub discovery_url: Option<String>,

    /// Regex with one capture group matching ids on the discovery page
    #[serde(rename = "id-pattern", default)]
    pub id_pattern: Option<String>,

    /// Overrides `crawler.fan-out-limit` for this collection
    #[serde(rename = "fan-out-limit", default)]
    pub fan_out_limit: Option<usize>,
}

impl CollectionConfig {
    /// Builds the request URL for one unit
    pub fn url_for(&self, id: i64, page: u32) -> String {
        self.url
            .replace("{id}", &id.to_string())
            .replace("{page}", &page.to_string())
    }

    /// Fan-out capacity for this collection
    pub fn fan_out_limit(&self, crawler: &CrawlerConfig) -> usize {
        self.fan_out_limit.unwrap_or(crawler.fan_out_limit)
    }
}
