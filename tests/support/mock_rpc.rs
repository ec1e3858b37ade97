use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use alloy_primitives::{hex, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use jobwatch::chain::contracts::{work_event_topic, IJob, ISequencer};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Scriptable Ethereum node state served by [`MockRpcServer`].
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<RwLock<MockChainInner>>,
    height: Arc<AtomicU64>,
    requests: Arc<AtomicUsize>,
}

struct MockChainInner {
    sequencer: Address,
    leader: B256,
    jobs: Vec<Address>,
    workable: HashMap<Address, Option<(bool, Bytes)>>,
    events: Vec<(Address, u64)>,
    failing_methods: HashMap<String, usize>,
}

impl MockChain {
    pub fn new(sequencer: Address, leader: B256, height: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockChainInner {
                sequencer,
                leader,
                jobs: Vec::new(),
                workable: HashMap::new(),
                events: Vec::new(),
                failing_methods: HashMap::new(),
            })),
            height: Arc::new(AtomicU64::new(height)),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_jobs(&self, jobs: &[Address]) {
        self.inner.write().expect("mock chain poisoned").jobs = jobs.to_vec();
    }

    pub fn set_workable(&self, job: Address, can_work: bool, reason: &str) {
        self.inner
            .write()
            .expect("mock chain poisoned")
            .workable
            .insert(job, Some((can_work, Bytes::copy_from_slice(reason.as_bytes()))));
    }

    pub fn revert_workable(&self, job: Address) {
        self.inner
            .write()
            .expect("mock chain poisoned")
            .workable
            .insert(job, None);
    }

    pub fn add_work_event(&self, job: Address, block: u64) {
        self.inner
            .write()
            .expect("mock chain poisoned")
            .events
            .push((job, block));
    }

    /// Answers the next `times` requests for `method` with an internal error.
    pub fn fail_method(&self, method: &str, times: usize) {
        self.inner
            .write()
            .expect("mock chain poisoned")
            .failing_methods
            .insert(method.to_string(), times);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn take_failure(&self, method: &str) -> bool {
        let mut inner = self.inner.write().expect("mock chain poisoned");
        match inner.failing_methods.get_mut(method) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn eth_call(&self, to: Address, data: &[u8]) -> std::result::Result<Bytes, String> {
        let inner = self.inner.read().expect("mock chain poisoned");
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| "missing selector".to_string())?;

        if to == inner.sequencer {
            if selector == ISequencer::getMasterCall::SELECTOR {
                return Ok(inner.leader.abi_encode().into());
            }
            if selector == ISequencer::numJobsCall::SELECTOR {
                return Ok(U256::from(inner.jobs.len()).abi_encode().into());
            }
            if selector == ISequencer::jobAtCall::SELECTOR {
                let call = ISequencer::jobAtCall::abi_decode(data, true)
                    .map_err(|err| err.to_string())?;
                return usize::try_from(call.index)
                    .ok()
                    .and_then(|index| inner.jobs.get(index))
                    .map(|job| job.abi_encode().into())
                    .ok_or_else(|| "execution reverted".to_string());
            }
            return Err("execution reverted".to_string());
        }

        if selector != IJob::workableCall::SELECTOR {
            return Err("execution reverted".to_string());
        }
        match inner.workable.get(&to) {
            Some(Some((can_work, reason))) => {
                Ok((*can_work, reason.clone()).abi_encode_params().into())
            }
            Some(None) => Err("execution reverted".to_string()),
            None => Ok((false, Bytes::new()).abi_encode_params().into()),
        }
    }

    fn logs(&self, filter: &Value) -> Vec<Value> {
        let inner = self.inner.read().expect("mock chain poisoned");
        let addresses: Vec<Address> = filter
            .get("address")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|raw| raw.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        let from = filter
            .get("fromBlock")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64)
            .unwrap_or(0);
        let to = filter
            .get("toBlock")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64)
            .unwrap_or(u64::MAX);

        inner
            .events
            .iter()
            .filter(|(job, block)| addresses.contains(job) && (from..=to).contains(block))
            .enumerate()
            .map(|(index, (job, block))| {
                json!({
                    "address": format!("{job:#x}"),
                    "topics": [
                        format!("{:#x}", work_event_topic()),
                        format!("{:#x}", inner.leader),
                    ],
                    "data": "0x",
                    "blockNumber": format!("{block:#x}"),
                    "transactionHash": format!("{:#x}", B256::with_last_byte(index as u8)),
                    "logIndex": format!("{index:#x}"),
                    "removed": false,
                })
            })
            .collect()
    }
}

fn parse_hex_u64(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.strip_prefix("0x")?, 16).ok()
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(chain: MockChain) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let chain = chain.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| serve_request(chain.clone(), req))) }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
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

async fn serve_request(chain: MockChain, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };
    chain.requests.fetch_add(1, Ordering::SeqCst);

    let response_value = match payload {
        Value::Array(calls) => Value::Array(
            calls
                .into_iter()
                .map(|call| handle_call(&chain, call))
                .collect(),
        ),
        call => handle_call(&chain, call),
    };

    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(chain: &MockChain, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let first_param = params.as_array().and_then(|arr| arr.first()).cloned();

    if chain.take_failure(&method) {
        return error(id, -32603, "internal error");
    }

    match method.as_str() {
        "eth_blockNumber" => success(id, json!(format!("{:#x}", chain.height()))),
        "eth_call" => {
            let request = first_param.unwrap_or(Value::Null);
            let to = request
                .get("to")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<Address>().ok());
            let data = request
                .get("data")
                .or_else(|| request.get("input"))
                .and_then(Value::as_str)
                .and_then(|raw| hex::decode(raw).ok());
            match (to, data) {
                (Some(to), Some(data)) => match chain.eth_call(to, &data) {
                    Ok(output) => success(id, json!(format!("{output}"))),
                    Err(message) => error(id, 3, message),
                },
                _ => error(id, -32602, "invalid eth_call params"),
            }
        }
        "eth_getLogs" => match first_param {
            Some(filter) => success(id, Value::Array(chain.logs(&filter))),
            None => error(id, -32602, "missing filter"),
        },
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
