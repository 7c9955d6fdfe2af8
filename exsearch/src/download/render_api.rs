//! Client for a remote browser-rendering service.
//!
//! The service exposes `POST <base_url>/download` taking
//! `{url, cookie?, wait_css_selector?, page_wait_time?}` and answering
//! `{result, cookies, error: {error_msg, error_type}}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::http::map_reqwest_error;
use super::{with_retry, Downloader, FetchOptions, RenderCookieOptions};
use crate::config::RenderApiConfig;
use crate::errors::DownloadError;
use crate::stores::DownloadType;

/// Failure reported by the rendering service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error message.
    #[serde(default)]
    pub error_msg: String,
    /// Error type name.
    #[serde(default)]
    pub error_type: String,
}

/// Body returned by the rendering service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderResponse {
    /// Rendered document.
    #[serde(default)]
    pub result: String,
    /// Cookies returned when requested.
    #[serde(default)]
    pub cookies: Vec<Map<String, Value>>,
    /// Failure details; empty on success.
    #[serde(default)]
    pub error: RemoteError,
}

impl RenderResponse {
    /// Parses a response body.
    pub fn parse(body: &str) -> Result<Self, DownloadError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| DownloadError::InvalidResponse(e.to_string()))?;
        if !value.is_object() {
            return Err(DownloadError::InvalidResponse(format!(
                "expected a JSON object, got {value}"
            )));
        }
        serde_json::from_value(value).map_err(|e| DownloadError::InvalidResponse(e.to_string()))
    }

    /// Returns the document, or the remote failure.
    pub fn into_result(self) -> Result<String, DownloadError> {
        if self.error.error_msg.is_empty() {
            Ok(self.result)
        } else {
            Err(DownloadError::Remote {
                kind: self.error.error_type,
                message: self.error.error_msg,
            })
        }
    }
}

/// Builds the request body for `url`.
///
/// Request-level cookies are forwarded when the render options carry no
/// cookie section of their own.
#[must_use]
pub fn render_request_body(url: &str, options: &FetchOptions) -> Value {
    let mut render = options.render.clone().unwrap_or_default();
    if render.cookie.is_none() && !options.cookies.is_empty() {
        render.cookie = Some(RenderCookieOptions {
            cookie_dict_list: Some(options.cookies.clone()),
            ..RenderCookieOptions::default()
        });
    }

    let mut body = Map::new();
    body.insert("url".to_string(), Value::String(url.to_string()));
    if let Ok(Value::Object(fields)) = serde_json::to_value(&render) {
        body.extend(fields);
    }
    Value::Object(body)
}

/// Downloader backed by the rendering service.
#[derive(Clone)]
pub struct RenderApiDownloader {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RenderApiDownloader {
    /// Builds a downloader for the configured service.
    pub fn new(config: &RenderApiConfig) -> Result<Self, DownloadError> {
        config
            .validate()
            .map_err(|e| DownloadError::Client(e.to_string()))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/download", config.base_url.trim_end_matches('/')),
            timeout: config.timeout(),
        })
    }

    /// Returns the download endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_once(&self, body: &Value) -> Result<String, DownloadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| map_reqwest_error(&e, self.timeout))
    }
}

#[async_trait]
impl Downloader for RenderApiDownloader {
    fn download_type(&self) -> DownloadType {
        DownloadType::ExternalRenderApi
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, DownloadError> {
        let body = render_request_body(url, options);
        tracing::debug!(url, endpoint = %self.endpoint, "Render request starting");

        let raw = with_retry(&options.retry, url, || self.post_once(&body)).await?;
        let response = RenderResponse::parse(&raw)?;
        let text = response.into_result()?;

        tracing::debug!(url, bytes = text.len(), "Render request finished");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{Cookie, RenderOptions, WaitCssSelector};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_request_body_shape() {
        let options = FetchOptions::new()
            .with_cookie(Cookie::new("session", "abc"))
            .with_render(RenderOptions {
                page_wait_time: Some(1.0),
                ..RenderOptions::default()
            });

        let body = render_request_body("https://a.example/s", &options);
        assert_eq!(
            body,
            json!({
                "url": "https://a.example/s",
                "cookie": {
                    "cookie_dict_list": [{"name": "session", "value": "abc"}],
                    "return_cookies": false,
                    "save": false,
                    "load": false
                },
                "page_wait_time": 1.0
            })
        );
    }

    #[test]
    fn test_explicit_cookie_section_wins() {
        let options = FetchOptions::new()
            .with_cookie(Cookie::new("session", "abc"))
            .with_render(RenderOptions {
                cookie: Some(RenderCookieOptions {
                    load: true,
                    ..RenderCookieOptions::default()
                }),
                wait_css_selector: Some(WaitCssSelector::new(".item")),
                page_wait_time: None,
            });

        let body = render_request_body("https://a.example/s", &options);
        assert_eq!(body["cookie"]["load"], json!(true));
        assert!(body["cookie"].get("cookie_dict_list").is_none());
        assert_eq!(body["wait_css_selector"]["selector"], json!(".item"));
    }

    #[test]
    fn test_parse_response() {
        let ok = RenderResponse::parse(r#"{"result": "<html/>", "cookies": []}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), "<html/>");

        let failed = RenderResponse::parse(
            r#"{"result": "", "error": {"error_msg": "selector not found", "error_type": "TimeoutError"}}"#,
        )
        .unwrap();
        match failed.into_result() {
            Err(DownloadError::Remote { kind, message }) => {
                assert_eq!(kind, "TimeoutError");
                assert_eq!(message, "selector not found");
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            RenderResponse::parse("[1, 2]"),
            Err(DownloadError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_timeout() {
        let result = RenderApiDownloader::new(&RenderApiConfig {
            base_url: "http://render.internal".to_string(),
            timeout_seconds: 1e20,
        });
        assert!(matches!(result, Err(DownloadError::Client(ref m)) if m.contains("timeout_seconds")));
    }

    #[tokio::test]
    async fn test_fetch_posts_to_download_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let body = r#"{"result": "<html>rendered</html>", "cookies": [], "error": {"error_msg": "", "error_type": ""}}"#;
            let reply = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            head
        });

        let downloader = RenderApiDownloader::new(&RenderApiConfig {
            base_url: format!("http://{addr}/"),
            timeout_seconds: 5.0,
        })
        .unwrap();
        assert!(downloader.endpoint().ends_with("/download"));

        let text = downloader
            .fetch("https://a.example/s", &FetchOptions::new())
            .await
            .unwrap();
        assert_eq!(text, "<html>rendered</html>");
        assert_eq!(downloader.download_type(), DownloadType::ExternalRenderApi);

        let head = server.await.unwrap();
        assert!(head.starts_with("POST /download"));
    }
}
