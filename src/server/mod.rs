pub mod api;

use crate::cli::Args;
use std::error::Error;
use std::net::SocketAddr;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use log::info;

pub struct Server {
    addr: String,
    app: Router,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: api::AppState, args: Args) -> Self {
        Self {
            addr,
            app: api::router(state),
            args,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;

        match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let tls_config = RustlsConfig::from_pem_file(cert_path, key_path).await?;
                info!("Relay listening on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config)
                    .serve(self.app.into_make_service())
                    .await?;
            }
            (true, _, _) => {
                return Err("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into());
            }
            (false, _, _) => {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                info!("Relay listening on: http://{}", listener.local_addr()?);
                axum::serve(listener, self.app.into_make_service()).await?;
            }
        }

        Ok(())
    }
}
