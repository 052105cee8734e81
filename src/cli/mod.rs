use clap::Parser;
use std::time::Duration;
use url::Url;

use crate::error::RelayError;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:5000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    // --- Upstream Model Args ---
    /// Base URL of the Ollama server (e.g., http://localhost:11434)
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: String,

    /// Model used for document analysis when no query has been submitted yet.
    #[arg(long, env = "DEFAULT_MODEL", default_value = "llama2")]
    pub default_model: String,

    /// Prompt template for document analysis. `{text}` is replaced with the document text.
    #[arg(long, env = "ANALYSIS_PROMPT", default_value = "Analyze the following text:\n{text}")]
    pub analysis_prompt: String,

    /// Whole-request timeout for upstream generation calls, in seconds. Unset means no timeout.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: Option<u64>,

    // --- Session Args ---
    /// Seconds an unconsumed keyed session stays available to /api/stream.
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "300")]
    pub session_ttl_secs: u64,

    // --- Document Args ---
    /// Timeout for fetching remote documents, in seconds.
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "30")]
    pub fetch_timeout_secs: u64,

    /// Documents larger than this many bytes are rejected.
    #[arg(long, env = "MAX_DOCUMENT_BYTES", default_value = "10485760")]
    pub max_document_bytes: usize,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    /// Checks cross-field constraints clap cannot express.
    pub fn validate(&self) -> Result<(), RelayError> {
        let base = Url::parse(&self.ollama_base_url).map_err(|e| {
            RelayError::InvalidInput(format!(
                "Invalid Ollama base URL '{}': {}",
                self.ollama_base_url, e
            ))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(RelayError::InvalidInput(format!(
                "Ollama base URL must be http or https, got '{}'",
                base.scheme()
            )));
        }

        if self.enable_tls && (self.tls_cert_path.is_none() || self.tls_key_path.is_none()) {
            return Err(RelayError::InvalidInput(
                "Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into(),
            ));
        }

        if self.session_ttl_secs == 0 {
            return Err(RelayError::InvalidInput("--session-ttl-secs must be greater than zero".into()));
        }

        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_secs.map(Duration::from_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
