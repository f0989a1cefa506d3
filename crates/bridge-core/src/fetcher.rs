use std::{io, path::Path, time::Duration};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{errors::Error, utils::redact_url, Result};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("failed to write download: {0}")]
    Io(#[from] io::Error),
}

/// Downloads remote media into a local file.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// On error no file is left at `dest`.
    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<u64, FetchError>;
}

/// `reqwest`-backed fetcher used for both Telegram file links and Discord CDN URLs.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self { http })
    }

    async fn download(&self, url: &str, dest: &Path) -> std::result::Result<u64, FetchError> {
        let mut resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<u64, FetchError> {
        info!(url = %redact_url(url), "downloading media");

        match self.download(url, dest).await {
            Ok(bytes) => {
                debug!(path = %dest.display(), bytes, "media saved");
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    /// One-shot HTTP/1.1 server answering a single request with `status` and `body`.
    async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut seen = Vec::new();
            loop {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(&body).await.unwrap();
            sock.shutdown().await.ok();
        });
        format!("http://{addr}/file/bot123:abc/voice.oga")
    }

    #[tokio::test]
    async fn downloads_body_to_destination() {
        let body = vec![7u8; 50 * 1024];
        let url = serve_once("200 OK", body.clone()).await;
        let dest = tmp("bridge-fetch-ok");

        let n = HttpFetcher::new().unwrap().fetch(&url, &dest).await.unwrap();
        assert_eq!(n, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        let _ = std::fs::remove_file(&dest);
    }

    #[tokio::test]
    async fn non_success_status_is_reported_and_leaves_no_file() {
        let url = serve_once("404 Not Found", b"missing".to_vec()).await;
        let dest = tmp("bridge-fetch-404");

        let err = HttpFetcher::new().unwrap().fetch(&url, &dest).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn connection_failure_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dest = tmp("bridge-fetch-refused");
        let err = HttpFetcher::new()
            .unwrap()
            .fetch(&format!("http://{addr}/x"), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
        assert!(!dest.exists());

        let transport: Error = err.into();
        assert!(matches!(transport, Error::Transport(_)));
    }
}
