//! External reference resolution.
//!
//! The XML loader asks an [`EntityResolver`] for the bytes behind every
//! absolute system identifier it meets (XInclude targets, external entities,
//! DTDs). [`CachingResolver`] answers shared-content placeholders itself,
//! serves `http://` resources from a [`ResourceCache`] backed by an HTTP
//! fetch, and hands everything else to a fallback resolver.

use std::sync::Arc;
use std::time::Duration;

use dbk_cache::{CacheBucket, ResourceCache};
use ureq::Agent;
use url::Url;

use crate::error::ResolveError;

/// Marker of shared content that is never resolved to real data.
pub const SHARED_CONTENT_MARKER: &str = "Common_Content/";

/// Placeholder returned for shared-content XML documents.
pub const SHARED_CONTENT_PLACEHOLDER: &[u8] = b"<?xml version='1.0'?><a></a>";

/// Default HTTP timeout for external resources.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves an absolute system identifier to its content.
pub trait EntityResolver: Send + Sync {
    /// Content behind `system_id`, or `None` when this resolver does not
    /// know the resource.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the resource is known but unreadable.
    fn resolve(&self, system_id: &str) -> Result<Option<Vec<u8>>, ResolveError>;
}

/// Reads `file:` URLs from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileResolver;

impl EntityResolver for FileResolver {
    fn resolve(&self, system_id: &str) -> Result<Option<Vec<u8>>, ResolveError> {
        let Ok(url) = Url::parse(system_id) else {
            return Ok(None);
        };
        if url.scheme() != "file" {
            return Ok(None);
        }
        let Ok(path) = url.to_file_path() else {
            return Ok(None);
        };
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ResolveError::Io { path, source }),
        }
    }
}

/// Fetches remote resources.
pub trait Fetch: Send + Sync {
    /// Download `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Fetch`] on transport failure or HTTP error status.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError>;
}

/// HTTP fetcher backed by a pooled `ureq` agent.
pub struct HttpFetcher {
    agent: Agent,
}

impl HttpFetcher {
    /// Create a fetcher with the given global timeout.
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let fetch_error = |message: String| ResolveError::Fetch {
            url: url.to_owned(),
            message,
        };

        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status().as_u16();
        let mut body = response.into_body();

        if status >= 400 {
            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            return Err(fetch_error(format!("HTTP {status}: {error_body}")));
        }

        body.read_to_vec().map_err(|e| fetch_error(e.to_string()))
    }
}

/// Resolver with shared-content placeholders and a two-tier cache for
/// `http://` resources.
pub struct CachingResolver {
    cache: Arc<ResourceCache>,
    fetcher: Box<dyn Fetch>,
    fallback: Option<Box<dyn EntityResolver>>,
}

impl CachingResolver {
    /// Create a resolver using `cache` for remote resources.
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        Self {
            cache,
            fetcher: Box::new(HttpFetcher::default()),
            fallback: None,
        }
    }

    /// Replace the fetcher used on cache misses.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Delegate unhandled identifiers to `fallback`.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Box<dyn EntityResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Shared resource cache.
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }
}

impl EntityResolver for CachingResolver {
    fn resolve(&self, system_id: &str) -> Result<Option<Vec<u8>>, ResolveError> {
        if system_id.contains(SHARED_CONTENT_MARKER) {
            tracing::debug!(system_id, "Using placeholder for shared content");
            if system_id.to_lowercase().ends_with(".xml") {
                return Ok(Some(SHARED_CONTENT_PLACEHOLDER.to_vec()));
            }
            return Ok(Some(Vec::new()));
        }

        if is_http(system_id) {
            if let Some(bytes) = self.cache.get(system_id) {
                return Ok(Some(bytes));
            }
            let bytes = self.fetcher.fetch(system_id).inspect_err(|e| {
                tracing::warn!(error = %e, "External resource fetch failed");
            })?;
            tracing::debug!(system_id, size = bytes.len(), "Fetched external resource");
            self.cache.set(system_id, &bytes);
            return Ok(Some(bytes));
        }

        match &self.fallback {
            Some(fallback) => fallback.resolve(system_id),
            None => Ok(None),
        }
    }
}

fn is_http(system_id: &str) -> bool {
    system_id
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("http://"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Fetcher serving canned responses and counting calls.
    #[derive(Default)]
    struct StubFetcher {
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Fetch for StubFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
            self.calls.lock().unwrap().push(url.to_owned());
            if self.fail {
                return Err(ResolveError::Fetch {
                    url: url.to_owned(),
                    message: "connection refused".to_owned(),
                });
            }
            Ok(format!("content of {url}").into_bytes())
        }
    }

    fn resolver_with(fetcher: StubFetcher, dir: Option<std::path::PathBuf>) -> CachingResolver {
        CachingResolver::new(Arc::new(ResourceCache::new(10, dir)))
            .with_fetcher(Box::new(fetcher))
    }

    #[test]
    fn test_shared_content_placeholders() {
        let fetcher = StubFetcher::default();
        let calls = Arc::clone(&fetcher.calls);
        let resolver = resolver_with(fetcher, None);

        let xml = resolver
            .resolve("http://example.com/Common_Content/Legal_Notice.XML")
            .unwrap();
        let other = resolver
            .resolve("file:///doc/Common_Content/css/default.css")
            .unwrap();

        assert_eq!(xml.as_deref(), Some(SHARED_CONTENT_PLACEHOLDER));
        assert_eq!(other, Some(Vec::new()));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_http_fetched_once_then_cached() {
        let fetcher = StubFetcher::default();
        let calls = Arc::clone(&fetcher.calls);
        let resolver = resolver_with(fetcher, None);
        let url = "HTTP://www.oasis-open.org/docbook/xml/4.5/docbookx.dtd";

        let first = resolver.resolve(url).unwrap().unwrap();
        let second = resolver.resolve(url).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(resolver.cache().memory().contains(url));
    }

    #[test]
    fn test_persistent_tier_survives_new_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let url = "http://example.com/ent/book.ent";

        let fetcher = StubFetcher::default();
        resolver_with(fetcher, Some(dir.path().to_path_buf()))
            .resolve(url)
            .unwrap();

        let fetcher = StubFetcher::default();
        let calls = Arc::clone(&fetcher.calls);
        let resolver = resolver_with(fetcher, Some(dir.path().to_path_buf()));
        let bytes = resolver.resolve(url).unwrap().unwrap();

        assert_eq!(bytes, format!("content of {url}").into_bytes());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fetch_failure_not_cached() {
        let resolver = resolver_with(
            StubFetcher {
                fail: true,
                ..StubFetcher::default()
            },
            None,
        );
        let url = "http://example.com/missing.dtd";

        let err = resolver.resolve(url).unwrap_err();

        assert!(err.to_string().contains("Error retrieving external resource from URL"));
        assert!(resolver.cache().memory().is_empty());
    }

    #[test]
    fn test_other_ids_use_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter.xml");
        std::fs::write(&path, "<chapter/>").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let without = resolver_with(StubFetcher::default(), None);
        assert_eq!(without.resolve(url.as_str()).unwrap(), None);

        let with = resolver_with(StubFetcher::default(), None).with_fallback(Box::new(FileResolver));
        assert_eq!(
            with.resolve(url.as_str()).unwrap().as_deref(),
            Some(&b"<chapter/>"[..])
        );
    }

    #[test]
    fn test_file_resolver_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("nope.xml")).unwrap();
        assert_eq!(FileResolver.resolve(url.as_str()).unwrap(), None);
        assert_eq!(FileResolver.resolve("https://example.com/a").unwrap(), None);
    }
}
