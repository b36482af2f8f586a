//! Shared HTTP plumbing for release sources.
//!
//! Every request is raced against the run's cancellation token and subject
//! to the client's per-request timeout.

use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A cancellable HTTP client shared by every source of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    cancel: CancellationToken,
}

impl HttpClient {
    /// Build a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("backplane-tools/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, cancel })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(client: Client, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// The underlying reqwest client, for building requests.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The cancellation token requests are raced against.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Await `fut` unless the run is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation, or whatever `fut` yields.
    pub async fn cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            out = fut => out,
        }
    }

    /// Send `request`, mapping transport failures and non-2xx statuses to
    /// [`Error::SourceUnavailable`] attributed to `source_name`.
    ///
    /// # Errors
    ///
    /// See above; also [`Error::Cancelled`].
    pub async fn send(&self, request: RequestBuilder, source_name: &str) -> Result<Response> {
        self.cancellable(async {
            let response = request
                .send()
                .await
                .map_err(|e| Error::source_unavailable(source_name, e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let url = response.url().clone();
                return Err(Error::source_unavailable(
                    source_name,
                    format!("{url} returned HTTP {status}"),
                ));
            }
            Ok(response)
        })
        .await
    }

    /// GET `url` and return the body as text.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] or [`Error::Cancelled`].
    pub async fn get_text(&self, url: &str, source_name: &str) -> Result<String> {
        debug!(%url, "Fetching text");
        let response = self.send(self.client.get(url), source_name).await?;
        self.cancellable(async {
            response
                .text()
                .await
                .map_err(|e| Error::source_unavailable(source_name, format!("failed to read {url}: {e}")))
        })
        .await
    }

    /// GET `url` and return the raw body.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] or [`Error::Cancelled`].
    pub async fn get_bytes(&self, url: &str, source_name: &str) -> Result<Vec<u8>> {
        debug!(%url, "Fetching bytes");
        let response = self.send(self.client.get(url), source_name).await?;
        self.cancellable(async {
            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| Error::source_unavailable(source_name, format!("failed to read {url}: {e}")))
        })
        .await
    }

    /// Stream `request`'s body to `dest` and mark it executable (0755).
    ///
    /// A partially written file is removed on failure.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`], [`Error::Filesystem`] or [`Error::Cancelled`].
    pub async fn download_request(
        &self,
        request: RequestBuilder,
        dest: &Path,
        source_name: &str,
    ) -> Result<PathBuf> {
        let response = self.send(request, source_name).await?;
        let result = self.cancellable(write_body(response, dest, source_name)).await;
        if result.is_err() {
            match tokio::fs::remove_file(dest).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?dest, error = %e, "Could not remove partial download"),
            }
        }
        result?;
        debug!(path = ?dest, "Downloaded");
        Ok(dest.to_path_buf())
    }

    /// Stream `url` to `dest`. See [`Self::download_request`].
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`], [`Error::Filesystem`] or [`Error::Cancelled`].
    pub async fn download(&self, url: &str, dest: &Path, source_name: &str) -> Result<PathBuf> {
        debug!(%url, dest = ?dest, "Downloading");
        self.download_request(self.client.get(url), dest, source_name)
            .await
    }
}

async fn write_body(response: Response, dest: &Path, source_name: &str) -> Result<()> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| Error::filesystem("create file", dest, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| Error::filesystem("set permissions on", dest, e))?;
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            Error::source_unavailable(source_name, format!("download of '{}' interrupted: {e}", dest.display()))
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::filesystem("write", dest, e))?;
    }
    file.flush().await.map_err(|e| Error::filesystem("write", dest, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(DEFAULT_TIMEOUT, CancellationToken::new()).unwrap()
    }

    #[tokio::test]
    async fn test_download_writes_executable_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tool"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("tool");
        let out = client()
            .download(&format!("{}/tool", server.uri()), &dest, "test")
            .await
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"payload");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&out).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn test_non_success_status_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("missing");
        let err = client()
            .download(&format!("{}/missing", server.uri()), &dest, "mirror")
            .await
            .unwrap_err();
        match err {
            Error::SourceUnavailable { source_name, message } => {
                assert_eq!(source_name, "mirror");
                assert!(message.contains("404"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let http = HttpClient::new(DEFAULT_TIMEOUT, cancel).unwrap();
        let err = http.get_text("http://127.0.0.1:9/never", "test").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
