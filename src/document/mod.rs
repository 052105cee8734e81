use futures::StreamExt;
use log::{ debug, error, info };
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use scraper::{ ElementRef, Html, Selector };
use std::error::Error;
use std::time::Duration;
use url::Url;

use crate::error::RelayError;

const HIDDEN_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// Extraction strategy, chosen from the declared content type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => DocumentKind::Html,
            "application/pdf" => DocumentKind::Pdf,
            _ => DocumentKind::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    http: HttpClient,
    max_bytes: usize,
}

impl DocumentFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build document HTTP client: {}", e))?;
        Ok(Self { http, max_bytes })
    }

    /// Downloads `raw_url` and returns its text content.
    pub async fn fetch_text(&self, raw_url: &str) -> Result<String, RelayError> {
        let url = parse_document_url(raw_url)?;
        info!("Fetching document {}", url);

        let resp = self.http.get(url.clone()).send().await.map_err(|e| {
            error!("Failed to fetch {}: {}", url, e);
            RelayError::Fetch(e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            error!("Fetching {} returned {}", url, status);
            return Err(RelayError::Fetch(format!("HTTP {}", status)));
        }

        let kind = DocumentKind::from_content_type(
            resp.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
        );

        if let Some(len) = resp.content_length() {
            if len > self.max_bytes as u64 {
                return Err(self.too_large());
            }
        }

        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RelayError::Fetch(e.to_string()))?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }
        debug!("Fetched {} bytes from {} as {:?}", body.len(), url, kind);

        extract_text(kind, body).await
    }

    fn too_large(&self) -> RelayError {
        RelayError::Fetch(format!("Document exceeds the {} byte limit", self.max_bytes))
    }
}

pub fn parse_document_url(raw: &str) -> Result<Url, RelayError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| RelayError::InvalidInput(format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RelayError::InvalidInput(format!("Unsupported URL scheme '{}'", other))),
    }
}

pub async fn extract_text(kind: DocumentKind, body: Vec<u8>) -> Result<String, RelayError> {
    match kind {
        DocumentKind::Html => Ok(extract_html(&String::from_utf8_lossy(&body))),
        DocumentKind::Pdf => extract_pdf(body).await,
        DocumentKind::Text => Ok(String::from_utf8_lossy(&body).into_owned()),
    }
}

/// Text of `<body>` with markup removed. Script and style content is skipped.
pub fn extract_html(source: &str) -> String {
    let document = Html::parse_document(source);
    let selector = Selector::parse("body").ok();
    let root = selector
        .as_ref()
        .and_then(|selector| document.select(selector).next())
        .unwrap_or_else(|| document.root_element());

    collect_visible_text(root).trim().to_string()
}

fn collect_visible_text(root: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in root.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            text.push_str(fragment);
        }
    }
    text
}

async fn extract_pdf(body: Vec<u8>) -> Result<String, RelayError> {
    // pdf-extract is CPU bound and panics on some malformed input.
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&body))
        .await
        .map_err(|e| RelayError::Extraction(format!("PDF parser aborted: {}", e)))?;

    extracted.map_err(|e| RelayError::Extraction(e.to_string()))
}
