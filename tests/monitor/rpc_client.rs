use std::{sync::Arc, time::Duration};

use crate::support::{
    helpers::{init_tracing, JOB_A, JOB_B, LEADER, SEQUENCER},
    mock_rpc::{MockChain, MockRpcServer},
};
use anyhow::Result;
use jobwatch::chain::contracts::{self, work_event_topic};
use jobwatch::{AsyncRpcClient, ChainClient, JobRegistry, LogFilter, RpcClientOptions, RpcError, Telemetry};

fn fast_options() -> RpcClientOptions {
    RpcClientOptions {
        request_timeout: Duration::from_secs(2),
        max_attempts: 3,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        ..RpcClientOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reads_height_and_registry() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(SEQUENCER, LEADER, 19_000_123);
    chain.set_jobs(&[JOB_A, JOB_B]);
    let server = MockRpcServer::start(chain.clone()).await?;

    let client = Arc::new(AsyncRpcClient::with_options(
        server.url(),
        fast_options(),
        Arc::new(Telemetry::default()),
    )?);
    assert_eq!(client.current_height().await?, 19_000_123);

    let registry = JobRegistry::new(client, SEQUENCER);
    assert_eq!(registry.active_leader().await?, LEADER);
    assert_eq!(registry.jobs().await?, vec![JOB_A, JOB_B]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_call_isolates_reverting_entries() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(SEQUENCER, LEADER, 100);
    chain.set_workable(JOB_A, false, "No work to do");
    chain.revert_workable(JOB_B);
    let server = MockRpcServer::start(chain.clone()).await?;

    let client = AsyncRpcClient::with_options(
        server.url(),
        fast_options(),
        Arc::new(Telemetry::default()),
    )?;
    let calls = vec![
        contracts::workable_call(JOB_A, LEADER),
        contracts::workable_call(JOB_B, LEADER),
    ];
    let results = client.batch_call(&calls).await?;
    assert_eq!(results.len(), 2);

    let output = results[0].as_ref().expect("first entry should succeed");
    let (can_work, reason) = contracts::decode_workable(output)?;
    assert!(!can_work);
    assert_eq!(reason.as_ref(), b"No work to do");

    let err = results[1].as_ref().expect_err("reverting job should fail alone");
    assert!(matches!(
        err.downcast_ref::<RpcError>(),
        Some(RpcError::Call { code: 3, .. })
    ));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_logs_returns_work_events_in_range() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(SEQUENCER, LEADER, 500);
    chain.add_work_event(JOB_A, 120);
    chain.add_work_event(JOB_A, 480);
    chain.add_work_event(JOB_B, 300);
    let server = MockRpcServer::start(chain.clone()).await?;

    let client = AsyncRpcClient::with_options(
        server.url(),
        fast_options(),
        Arc::new(Telemetry::default()),
    )?;
    let filter = LogFilter {
        addresses: vec![JOB_A],
        topic: work_event_topic(),
        from_block: 100,
        to_block: 400,
    };
    let logs = client.get_logs(&filter).await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].address, JOB_A);
    assert_eq!(logs[0].block_number, 120);
    assert_eq!(logs[0].topics.first(), Some(&work_event_topic()));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retries_transient_failures() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(SEQUENCER, LEADER, 42);
    chain.fail_method("eth_blockNumber", 2);
    let server = MockRpcServer::start(chain.clone()).await?;

    let telemetry = Arc::new(Telemetry::default());
    let client = AsyncRpcClient::with_options(server.url(), fast_options(), Arc::clone(&telemetry))?;
    assert_eq!(client.block_number().await?, 42);
    assert_eq!(telemetry.snapshot().rpc_errors, 2);

    chain.fail_method("eth_blockNumber", 5);
    let err = client.block_number().await.expect_err("attempts should be exhausted");
    assert!(matches!(
        err.downcast_ref::<RpcError>(),
        Some(RpcError::Call { code: -32603, .. })
    ));

    server.shutdown().await;
    Ok(())
}
