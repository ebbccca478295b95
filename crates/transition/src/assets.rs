use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("request for {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot resolve image url '{0}'")]
    UnsupportedUrl(String),
}

/// Produces the encoded bytes behind an image url.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

/// Resolves site-relative urls (`/images/desktop/hero.webp`) under a directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, url: &str) -> Result<PathBuf, AssetError> {
        let relative = url.strip_prefix("file://").unwrap_or(url);
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|segment| segment == "..") {
            return Err(AssetError::UnsupportedUrl(url.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ImageSource for FileSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.resolve(url)?;
        fs::read(&path).map_err(|source| AssetError::Io { path, source })
    }
}

/// Fetches images over HTTP(S); relative urls are joined onto `base`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: Client,
    base: Option<Url>,
}

impl HttpSource {
    pub fn new(base: Option<Url>) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { http, base })
    }

    fn resolve(&self, url: &str) -> Result<Url, AssetError> {
        if is_remote(url) {
            return Url::parse(url).map_err(|_| AssetError::UnsupportedUrl(url.to_string()));
        }
        self.base
            .as_ref()
            .and_then(|base| base.join(url).ok())
            .ok_or_else(|| AssetError::UnsupportedUrl(url.to_string()))
    }
}

impl ImageSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let resolved = self.resolve(url)?;
        tracing::debug!(url = %resolved, "fetching remote image");
        let http_error = |source| AssetError::Http {
            url: resolved.to_string(),
            source,
        };
        let response = self
            .http
            .get(resolved.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(http_error)?;
        let bytes = response.bytes().map_err(http_error)?;
        Ok(bytes.to_vec())
    }
}

/// Where the scene's images come from: a local directory or a site root.
pub enum AssetSource {
    Directory(FileSource),
    Remote(HttpSource),
}

impl AssetSource {
    /// Interprets `location` as an `http(s)://` base or a filesystem directory.
    pub fn from_location(location: &str) -> Result<Self, AssetError> {
        if is_remote(location) {
            let mut base =
                Url::parse(location).map_err(|_| AssetError::UnsupportedUrl(location.into()))?;
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            let source = HttpSource::new(Some(base)).map_err(|source| AssetError::Http {
                url: location.to_string(),
                source,
            })?;
            Ok(AssetSource::Remote(source))
        } else {
            Ok(AssetSource::Directory(FileSource::new(location)))
        }
    }
}

impl ImageSource for AssetSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        match self {
            AssetSource::Directory(files) => files.fetch(url),
            AssetSource::Remote(http) => http.fetch(url),
        }
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
