//! Entry point: load configuration, wire the tracer backend, and serve the
//! webhook ingress routes until told to shut down.

mod app;
mod logging;
mod routes;
mod shutdown;

use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use vstrace_sdk::Config;

use app::App;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    logging::init(config.log_level);

    let addr = config.addr;
    let drain = config.shutdown_drain;
    let request_timeout = config.request_timeout;

    let app = match App::build(config) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize metrics registry");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "listening");

    let mut shutdown_signal = shutdown::signal();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let app = Arc::clone(&app);
                tokio::spawn(async move {
                    let service = service_fn(move |req| routes::router(Arc::clone(&app), req));
                    let serve = Builder::new(TokioExecutor::new()).serve_connection(TokioIo::new(stream), service);
                    match tokio::time::timeout(request_timeout, serve).await {
                        Ok(Err(e)) => tracing::debug!(%peer, error = %e, "connection closed with error"),
                        Ok(Ok(())) => {}
                        Err(_) => tracing::warn!(%peer, ?request_timeout, "connection exceeded request timeout"),
                    }
                });
            }
            _ = &mut shutdown_signal => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    shutdown::drain(drain).await;
    app.shutdown().await;
    tracing::info!("shutdown complete");
}
