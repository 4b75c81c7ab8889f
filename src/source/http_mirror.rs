//! Source speaking the provider network mirror protocol.
//!
//! For a provider `host/ns/type` the mirror serves two JSON documents
//! relative to its base URL:
//!
//! - `host/ns/type/index.json`: `{"versions": {"2.0.0": {}, ...}}`
//! - `host/ns/type/<version>.json`:
//!   `{"archives": {"linux_amd64": {"url": "...", "hashes": ["h1:..."]}}}`
//!
//! Archive URLs may be relative to the document that names them. A 404 for
//! the index means the mirror does not know the provider; a 404 for a
//! version document means that version has no packages here.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};
use url::Url;

use super::{
    PackageHash, PackageLocation, PackageMeta, Platform, Source, SourceError, Version, VersionList,
    parse_version,
};
use crate::addrs::Provider;
use crate::constants::{
    HTTP_REQUEST_TIMEOUT, HTTP_RETRY_ATTEMPTS, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS,
};

#[derive(Debug, Deserialize)]
struct VersionIndex {
    versions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct VersionDocument {
    archives: BTreeMap<String, Archive>,
}

#[derive(Debug, Deserialize)]
struct Archive {
    url: String,
    #[serde(default)]
    hashes: Vec<String>,
}

/// Outcome of a single request attempt.
enum Attempt {
    Transient(String),
    Fatal(String),
}

#[derive(Debug, Clone)]
pub struct HttpMirrorSource {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpMirrorSource {
    /// Create a source rooted at `base_url`. Only `https` and `http` URLs
    /// are accepted; a missing trailing slash is added.
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let invalid = |message: String| SourceError::InvalidResponse {
            origin: base_url.to_string(),
            message,
        };
        let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(invalid("network mirror URL must use https".to_string()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            base_url: url,
            client,
        })
    }

    fn provider_url(&self, provider: &Provider, document: &str) -> Result<Url, SourceError> {
        // the leading "./" keeps a "host:port" segment from parsing as a scheme
        let relative = format!(
            "./{}/{}/{}/{document}",
            provider.hostname, provider.namespace, provider.type_name
        );
        self.base_url.join(&relative).map_err(|e| SourceError::InvalidResponse {
            origin: self.base_url.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_once(&self, url: &Url) -> Result<Option<String>, Attempt> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Attempt::Transient(e.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Transient(format!("server responded {status}")));
        }
        if !status.is_success() {
            return Err(Attempt::Fatal(format!("server responded {status}")));
        }
        response.text().await.map(Some).map_err(|e| Attempt::Transient(e.to_string()))
    }

    /// GET and decode a JSON document; `None` on 404.
    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>, SourceError> {
        let strategy = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
            .factor(2)
            .take(HTTP_RETRY_ATTEMPTS);

        debug!(target: "provman::source", "GET {url}");
        let body = RetryIf::start(
            strategy,
            || self.get_once(url),
            |e: &Attempt| matches!(e, Attempt::Transient(_)),
        )
        .await
        .map_err(|e| {
            let (Attempt::Transient(message) | Attempt::Fatal(message)) = e;
            SourceError::Http {
                url: url.to_string(),
                message,
            }
        })?;

        let Some(body) = body else {
            return Ok(None);
        };
        serde_json::from_str(&body).map(Some).map_err(|e| SourceError::InvalidResponse {
            origin: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Source for HttpMirrorSource {
    async fn available_versions(&self, provider: &Provider) -> Result<VersionList, SourceError> {
        let url = self.provider_url(provider, "index.json")?;
        let Some(index) = self.get_json::<VersionIndex>(&url).await? else {
            return Err(SourceError::ProviderNotKnown {
                provider: provider.clone(),
                origin: self.for_display(provider),
            });
        };

        let mut versions = VersionList::new();
        for raw in index.versions.keys() {
            match parse_version(raw) {
                Ok(v) => versions.push(v),
                Err(e) => warn!(target: "provman::source", "{url}: ignoring {e}"),
            }
        }
        super::normalize_version_list(&mut versions);
        Ok(versions)
    }

    async fn package_meta(
        &self,
        provider: &Provider,
        version: &Version,
        target: &Platform,
    ) -> Result<PackageMeta, SourceError> {
        let url = self.provider_url(provider, &format!("{version}.json"))?;
        let unsupported = |supported: Vec<Platform>| SourceError::PlatformNotSupported {
            provider: provider.clone(),
            version: version.clone(),
            platform: target.clone(),
            supported,
        };

        let Some(doc) = self.get_json::<VersionDocument>(&url).await? else {
            return Err(unsupported(Vec::new()));
        };
        let Some(archive) = doc.archives.get(&target.to_string()) else {
            let supported = doc.archives.keys().filter_map(|k| Platform::parse(k).ok()).collect();
            return Err(unsupported(supported));
        };

        let location = url.join(&archive.url).map_err(|e| SourceError::InvalidResponse {
            origin: url.to_string(),
            message: format!("invalid archive URL {:?}: {e}", archive.url),
        })?;
        let filename = location
            .path_segments()
            .and_then(|mut s| s.next_back())
            .filter(|s| !s.is_empty())
            .map_or_else(|| PackageMeta::archive_filename(provider, version, target), str::to_string);

        Ok(PackageMeta {
            provider: provider.clone(),
            version: version.clone(),
            target_platform: target.clone(),
            filename,
            location: PackageLocation::HttpUrl(location.to_string()),
            hashes: archive.hashes.iter().map(PackageHash::new).collect(),
        })
    }

    fn for_display(&self, _provider: &Provider) -> String {
        self.base_url.to_string()
    }
}
