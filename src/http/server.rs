use crate::config::ServerConfig;
use crate::core::orchestrator::AuthSettings;
use crate::core::reader::PcscTransport;
use crate::http::api::{route, ApiReply};
use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Settings shared by every request handler
#[derive(Debug, Clone)]
struct AppState {
    scope: pcsc::Scope,
    auth: AuthSettings,
}

/// Bind the listener and serve until Ctrl-C
pub async fn serve(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    let state = Arc::new(AppState {
        scope: config.scope.into(),
        auth: config.auth_settings()?,
    });

    tokio::select! {
        result = accept_loop(listener, state) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            Ok(())
        }
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, Arc::clone(&state), peer));
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                log::warn!("Connection from {peer} failed: {err}");
            }
        });
    }
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    log::debug!("Request from {peer}: {method} {path}");

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            let reply = ApiReply::error(
                StatusCode::BAD_REQUEST,
                format!("Failed to read request body: {err}"),
            );
            return Ok(into_response(reply));
        }
    };

    // PC/SC calls block; the whole exchange runs on the blocking pool
    let reply = tokio::task::spawn_blocking(move || {
        route(
            &method,
            &path,
            query.as_deref(),
            &body,
            &state.auth,
            || PcscTransport::establish(state.scope),
        )
    })
    .await
    .unwrap_or_else(|err| {
        log::error!("Request handler panicked: {err}");
        ApiReply::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    });

    Ok(into_response(reply))
}

/// Serialize a reply into an HTTP response
pub fn into_response(reply: ApiReply) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(&reply.body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = reply.status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_response() {
        let reply = ApiReply::error(StatusCode::NOT_FOUND, "No card reader detected");
        let response = into_response(reply);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let bytes = tokio_test::block_on(response.into_body().collect())
            .unwrap()
            .to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["Status"], "ERROR");
        assert_eq!(body["Message"], "No card reader detected");
    }
}
