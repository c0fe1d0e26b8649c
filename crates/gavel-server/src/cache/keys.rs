//! Cache key derivation.
//!
//! Layouts:
//! - data key: `cache:<traffic>:<host>:<method>:<path>[:<sorted-query>]/<suffix>`
//! - bucket key: `cache:bucket:<name>`
//! - buffer sub-key: `<dataKey>#<index>`, indices starting at 1

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

pub const BUCKET_PREFIX: &str = "cache:bucket:";

/// Direction of the traffic a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Traffic {
    /// Requests served by this process.
    #[default]
    Inbound,
    /// Calls this process makes to other services.
    Outbound,
}

impl Traffic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Traffic::Inbound => "inbound",
            Traffic::Outbound => "outbound",
        }
    }
}

/// Request attributes a data key is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheKeyParams {
    pub traffic: Traffic,
    pub host: String,
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl CacheKeyParams {
    pub fn new(method: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            traffic: Traffic::Inbound,
            host: host.into(),
            method: method.into(),
            path: path.into(),
            query: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_query<K, V>(mut self, query: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query = query
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_traffic(mut self, traffic: Traffic) -> Self {
        self.traffic = traffic;
        self
    }

    /// Query string with parameters sorted by name, `None` when empty.
    ///
    /// The sort is stable, so repeated names keep their relative order.
    pub fn sorted_query(&self) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        let mut pairs: Vec<&(String, String)> = self.query.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in pairs {
            serializer.append_pair(name, value);
        }
        Some(serializer.finish())
    }
}

/// Derives the data key for a request and uniqueness suffix.
pub fn build_cache_data_key(params: &CacheKeyParams, unique_suffix: &str) -> String {
    let CacheKeyParams {
        traffic,
        host,
        method,
        path,
        ..
    } = params;
    match params.sorted_query() {
        Some(query) => format!(
            "cache:{}:{host}:{method}:{path}:{query}/{unique_suffix}",
            traffic.as_str()
        ),
        None => format!(
            "cache:{}:{host}:{method}:{path}/{unique_suffix}",
            traffic.as_str()
        ),
    }
}

pub fn bucket_key(bucket: &str) -> String {
    format!("{BUCKET_PREFIX}{bucket}")
}

/// Bucket name of a bucket key, `None` for other keys.
pub fn bucket_name(key: &str) -> Option<&str> {
    key.strip_prefix(BUCKET_PREFIX)
}

pub fn buffer_sub_key(data_key: &str, index: usize) -> String {
    format!("{data_key}#{index}")
}
