//! Resource providers
//!
//! A provider serves one scheme. The filesystem provider reads below a root
//! directory; the internet providers fetch over HTTP(S).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Resource, ResourceError};

/// Source of raw resource bytes for one scheme
pub trait ResourceProvider {
    /// Scheme this provider serves, without `://`
    fn scheme(&self) -> &str;

    /// Whether `path` can be served
    fn has_resource(&self, path: &str) -> bool;

    /// Read the raw bytes of `path`
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError>;

    /// Read `path` and decode it into `target`
    fn compile_resource(&self, path: &str, target: &mut dyn Resource) -> Result<(), ResourceError> {
        let bytes = self.read(path)?;
        target.compile(bytes)
    }

    /// Local filesystem path of `path`, for APIs that need a real file
    fn local_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

/// Serves `file://` identifiers relative to a root directory
#[derive(Debug, Clone)]
pub struct FilesystemProvider {
    root: PathBuf,
}

impl FilesystemProvider {
    /// Scheme served by this provider
    pub const SCHEME: &'static str = "file";

    /// Create a provider rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` below the root; absolute paths are used as-is
    pub fn absolute_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }
}

impl ResourceProvider for FilesystemProvider {
    fn scheme(&self) -> &str {
        Self::SCHEME
    }

    fn has_resource(&self, path: &str) -> bool {
        self.absolute_path(path).is_file()
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let full_path = self.absolute_path(path);
        std::fs::read(&full_path).map_err(|source| ResourceError::Io {
            path: full_path.display().to_string(),
            source,
        })
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.absolute_path(path))
    }
}

/// Serves `http://` or `https://` identifiers
pub struct InternetProvider {
    scheme: String,
    port: u16,
    agent: ureq::Agent,
}

impl InternetProvider {
    /// Requests give up after this long
    pub const TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a provider for `scheme` using `port` when an identifier names none
    pub fn new(scheme: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            port,
            agent: ureq::AgentBuilder::new().timeout(Self::TIMEOUT).build(),
        }
    }

    /// Default port of this provider
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Full URL for `path`, which starts with the host
    pub fn url(&self, path: &str) -> String {
        let (host, rest) = path.split_once('/').unwrap_or((path, ""));
        if host.contains(':') {
            format!("{}://{host}/{rest}", self.scheme)
        } else {
            format!("{}://{host}:{}/{rest}", self.scheme, self.port)
        }
    }
}

impl ResourceProvider for InternetProvider {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn has_resource(&self, path: &str) -> bool {
        match self.agent.head(&self.url(path)).call() {
            Ok(response) => (200..300).contains(&response.status()),
            Err(e) => {
                log::debug!("HEAD {} failed: {e}", self.url(path));
                false
            }
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let url = self.url(path);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| ResourceError::Network(format!("GET {url}: {e}")))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| ResourceError::Network(format!("GET {url}: {e}")))?;
        Ok(bytes)
    }
}

impl std::fmt::Debug for InternetProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternetProvider")
            .field("scheme", &self.scheme)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_inserts_default_port() {
        let provider = InternetProvider::new("https", 443);
        assert_eq!(provider.url("example.com/a/b.png"), "https://example.com:443/a/b.png");
        assert_eq!(provider.url("example.com:8443/x"), "https://example.com:8443/x");
        assert_eq!(provider.url("example.com"), "https://example.com:443/");
    }

    #[test]
    fn test_filesystem_provider_reads_below_root() {
        let root = std::env::temp_dir().join(format!("lumen_fs_provider_{}", std::process::id()));
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(root.join("data/blob.bin"), [1_u8, 2, 3]).unwrap();

        let provider = FilesystemProvider::new(&root);
        assert!(provider.has_resource("data/blob.bin"));
        assert!(!provider.has_resource("data/missing.bin"));
        assert_eq!(provider.read("data/blob.bin").unwrap(), vec![1, 2, 3]);
        assert!(matches!(provider.read("nope"), Err(ResourceError::Io { .. })));

        std::fs::remove_dir_all(&root).ok();
    }
}
