//! Plain HTTP downloader.

use async_trait::async_trait;
use std::time::Duration;

use super::{cookie_header, with_retry, Downloader, FetchOptions};
use crate::config::FetchConfig;
use crate::errors::DownloadError;
use crate::stores::DownloadType;

/// Fetches documents with a single GET, following redirects.
#[derive(Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Builds a downloader from fetch settings.
    pub fn new(config: &FetchConfig) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_once(&self, url: &str, options: &FetchOptions) -> Result<String, DownloadError> {
        let mut request = self.client.get(url).timeout(options.request_timeout);
        for (key, value) in &options.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(cookies) = cookie_header(&options.cookies) {
            request = request.header(reqwest::header::COOKIE, cookies);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, options.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| map_reqwest_error(&e, options.request_timeout))
    }
}

pub(super) fn map_reqwest_error(err: &reqwest::Error, timeout: Duration) -> DownloadError {
    if err.is_timeout() {
        DownloadError::Timeout(timeout)
    } else if err.is_builder() {
        DownloadError::Client(err.to_string())
    } else if let Some(status) = err.status() {
        DownloadError::Status {
            status: status.as_u16(),
            url: err.url().map(ToString::to_string).unwrap_or_default(),
        }
    } else {
        DownloadError::Transport(err.to_string())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    fn download_type(&self) -> DownloadType {
        DownloadType::DirectHttp
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, DownloadError> {
        tracing::debug!(url, "HTTP fetch starting");
        let text = with_retry(&options.retry, url, || self.fetch_once(url, options)).await?;
        tracing::debug!(url, bytes = text.len(), "HTTP fetch finished");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{Cookie, RetryPolicy};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serves one canned response per queued entry and reports each request head.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap();
                let _ = tx.send(String::from_utf8_lossy(&buf[..n]).to_string());
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (format!("http://{addr}/search?q=1"), rx)
    }

    #[tokio::test]
    async fn test_fetch_sends_cookies_and_headers() {
        let (url, mut requests) = serve(vec![(200, "<html>ok</html>")]).await;
        let downloader = HttpDownloader::new(&FetchConfig::default()).unwrap();
        let options = FetchOptions::new()
            .with_cookie(Cookie::new("session", "abc"))
            .with_header("X-Test", "1");

        let text = downloader.fetch(&url, &options).await.unwrap();
        assert_eq!(text, "<html>ok</html>");

        let head = requests.recv().await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /search?q=1"));
        assert!(head.contains("cookie: session=abc"));
        assert!(head.contains("x-test: 1"));
    }

    #[tokio::test]
    async fn test_status_error_is_retried() {
        let (url, _requests) = serve(vec![(503, "busy"), (200, "done")]).await;
        let downloader = HttpDownloader::new(&FetchConfig::default()).unwrap();
        let options =
            FetchOptions::new().with_retry(RetryPolicy::fixed(1, Duration::from_millis(10)));

        assert_eq!(downloader.fetch(&url, &options).await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_status_error_without_retries() {
        let (url, _requests) = serve(vec![(404, "missing")]).await;
        let downloader = HttpDownloader::new(&FetchConfig::default()).unwrap();

        let err = downloader.fetch(&url, &FetchOptions::new()).await.unwrap_err();
        assert!(matches!(err, DownloadError::Status { status: 404, .. }));
        assert_eq!(downloader.download_type(), DownloadType::DirectHttp);
    }
}
