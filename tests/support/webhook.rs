use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicU16, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Request, Response, Server, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// HTTP endpoint that records every JSON body posted to it.
pub struct MockWebhook {
    url: String,
    received: Arc<Mutex<Vec<Value>>>,
    status: Arc<AtomicU16>,
    delay_ms: Arc<AtomicU64>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockWebhook {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock webhook listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock webhook address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock webhook listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock webhook listener non-blocking")?;

        let received = Arc::new(Mutex::new(Vec::new()));
        let status = Arc::new(AtomicU16::new(StatusCode::NO_CONTENT.as_u16()));
        let delay_ms = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = {
            let received = Arc::clone(&received);
            let status = Arc::clone(&status);
            let delay_ms = Arc::clone(&delay_ms);
            make_service_fn(move |_| {
                let received = Arc::clone(&received);
                let status = Arc::clone(&status);
                let delay_ms = Arc::clone(&delay_ms);
                async move {
                    Ok::<_, Infallible>(service_fn(move |req| {
                        record(
                            Arc::clone(&received),
                            Arc::clone(&status),
                            Arc::clone(&delay_ms),
                            req,
                        )
                    }))
                }
            })
        };

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock webhook server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock webhook stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}/hook", addr),
            received,
            status,
            delay_ms,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Status returned for subsequent posts. Payloads are only recorded on 2xx.
    pub fn respond_with(&self, status: StatusCode) {
        self.status.store(status.as_u16(), Ordering::SeqCst);
    }

    /// Holds every subsequent response for `delay` before answering.
    pub fn delay_responses(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().expect("webhook log poisoned").clone()
    }

    /// `content` strings of every recorded payload.
    pub fn messages(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|payload| payload.get("content").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn record(
    received: Arc<Mutex<Vec<Value>>>,
    status: Arc<AtomicU16>,
    delay_ms: Arc<AtomicU64>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let delay = delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let status = StatusCode::from_u16(status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = body::to_bytes(req.into_body()).await.unwrap_or_default();

    if status.is_success() {
        if let Ok(payload) = serde_json::from_slice::<Value>(&bytes) {
            received.lock().expect("webhook log poisoned").push(payload);
        }
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    Ok(response)
}
