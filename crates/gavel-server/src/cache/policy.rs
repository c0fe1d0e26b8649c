//! Per-route cache policies.
//!
//! A route declares either a [`CachePopulate`] (read-through and write-back)
//! or a [`CacheInvalidate`] (drop buckets after the handler ran). The policy
//! is resolved once per request against the service defaults.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::keys::CacheKeyParams;
use super::payload::CachedPayload;
use super::service::CacheSettings;

/// Request attributes visible to bucket selectors and key derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub host: String,
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Matched path parameters, by name.
    pub params: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn key_params(&self) -> CacheKeyParams {
        CacheKeyParams::new(&self.method, &self.host, &self.path).with_query(self.query.clone())
    }
}

/// Input of bucket selectors. `data` is `None` before the handler ran.
#[derive(Debug, Clone, Copy)]
pub struct BucketContext<'a> {
    pub request: &'a RequestContext,
    pub data: Option<&'a CachedPayload>,
}

pub type BucketSelector = Arc<dyn Fn(&BucketContext<'_>) -> Vec<String> + Send + Sync>;
pub type SuffixSelector = Arc<dyn Fn(&BucketContext<'_>) -> String + Send + Sync>;

/// How the uniqueness suffix of a data key is derived.
#[derive(Clone)]
pub enum UniqueSuffix {
    /// Reuse the bucket selector's output, joined with `,`.
    Same,
    With(SuffixSelector),
}

impl fmt::Debug for UniqueSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Same => f.write_str("Same"),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Read-through policy. Unset fields fall back to the service defaults.
#[derive(Clone)]
pub struct CachePopulate {
    pub enabled: Option<bool>,
    pub ttl: Option<Duration>,
    pub timeout: Option<Duration>,
    pub serializable: Option<bool>,
    pub buckets: BucketSelector,
    pub unique_suffix: UniqueSuffix,
}

impl CachePopulate {
    pub fn new<F>(buckets: F) -> Self
    where
        F: Fn(&BucketContext<'_>) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            enabled: None,
            ttl: None,
            timeout: None,
            serializable: None,
            buckets: Arc::new(buckets),
            unique_suffix: UniqueSuffix::Same,
        }
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn serializable(mut self, serializable: bool) -> Self {
        self.serializable = Some(serializable);
        self
    }

    #[must_use]
    pub fn unique_suffix<F>(mut self, suffix: F) -> Self
    where
        F: Fn(&BucketContext<'_>) -> String + Send + Sync + 'static,
    {
        self.unique_suffix = UniqueSuffix::With(Arc::new(suffix));
        self
    }

    pub fn select_buckets(&self, ctx: &BucketContext<'_>) -> Vec<String> {
        (self.buckets)(ctx)
    }

    /// Suffix for the data key, computed before the handler runs.
    pub fn suffix_for(&self, request: &RequestContext) -> String {
        let ctx = BucketContext {
            request,
            data: None,
        };
        match &self.unique_suffix {
            UniqueSuffix::Same => self.select_buckets(&ctx).join(","),
            UniqueSuffix::With(suffix) => suffix(&ctx),
        }
    }
}

impl fmt::Debug for CachePopulate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePopulate")
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .field("serializable", &self.serializable)
            .field("unique_suffix", &self.unique_suffix)
            .finish_non_exhaustive()
    }
}

/// Cache-busting policy: drops the selected buckets after a successful
/// handler run.
#[derive(Clone)]
pub struct CacheInvalidate {
    pub invalidate: BucketSelector,
    pub serializable: Option<bool>,
}

impl CacheInvalidate {
    pub fn new<F>(invalidate: F) -> Self
    where
        F: Fn(&BucketContext<'_>) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            invalidate: Arc::new(invalidate),
            serializable: None,
        }
    }

    #[must_use]
    pub fn serializable(mut self, serializable: bool) -> Self {
        self.serializable = Some(serializable);
        self
    }

    pub fn select_buckets(&self, ctx: &BucketContext<'_>) -> Vec<String> {
        (self.invalidate)(ctx)
    }
}

impl fmt::Debug for CacheInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInvalidate")
            .field("serializable", &self.serializable)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum CachePolicy {
    Populate(CachePopulate),
    Invalidate(CacheInvalidate),
}

impl From<CachePopulate> for CachePolicy {
    fn from(policy: CachePopulate) -> Self {
        Self::Populate(policy)
    }
}

impl From<CacheInvalidate> for CachePolicy {
    fn from(policy: CacheInvalidate) -> Self {
        Self::Invalidate(policy)
    }
}

/// Effective settings of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPolicy {
    pub enabled: bool,
    pub timeout: Duration,
    pub ttl: Duration,
    pub serializable: bool,
}

impl CachePolicy {
    pub fn resolve(&self, method: &str, settings: &CacheSettings) -> ResolvedPolicy {
        match self {
            Self::Populate(policy) => ResolvedPolicy {
                enabled: policy.enabled.unwrap_or_else(|| is_safe_method(method)),
                timeout: policy.timeout.unwrap_or(settings.default_timeout),
                ttl: policy.ttl.unwrap_or(settings.default_ttl),
                serializable: policy.serializable.unwrap_or(settings.default_serializable),
            },
            Self::Invalidate(policy) => ResolvedPolicy {
                enabled: false,
                timeout: settings.default_timeout,
                ttl: settings.default_ttl,
                serializable: policy.serializable.unwrap_or(settings.default_serializable),
            },
        }
    }
}

fn is_safe_method(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")
}
