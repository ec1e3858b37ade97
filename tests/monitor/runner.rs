use std::{sync::Arc, time::Duration};

use crate::support::{
    helpers::{init_tracing, wait_until, JOB_A, JOB_B, LEADER, SEQUENCER},
    mock_rpc::{MockChain, MockRpcServer},
    webhook::MockWebhook,
};
use anyhow::{Context, Result};
use jobwatch::{MonitorConfig, Runner, WebhookTarget};
use tokio::time::timeout;

fn config(rpc_url: &str, webhook_url: &str) -> Result<MonitorConfig> {
    MonitorConfig::builder()
        .rpc_url(rpc_url)
        .sequencer_address(SEQUENCER)
        .webhook(WebhookTarget::Url(webhook_url.to_string()))
        .tick_interval(Duration::from_millis(20))
        .unworked_blocks_threshold(5)
        .suppressed_reasons(["No work to do"])
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn monitors_jobs_end_to_end() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(SEQUENCER, LEADER, 1_000);
    chain.set_jobs(&[JOB_A, JOB_B]);
    chain.set_workable(JOB_A, true, "");
    chain.add_work_event(JOB_A, 997);
    chain.set_workable(JOB_B, false, "No work to do");
    chain.add_work_event(JOB_B, 999);
    let server = MockRpcServer::start(chain.clone()).await?;
    let hook = MockWebhook::start().await?;

    let runner = Arc::new(Runner::from_config(config(server.url(), hook.url())?)?);
    let task = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run().await })
    };

    wait_until(Duration::from_secs(5), || {
        let started = !hook.messages().is_empty();
        async move { started }
    })
    .await
    .context("startup notice was not delivered")?;
    assert!(hook.messages()[0].contains("monitor started, tracking 2 jobs"));

    // JOB_A starts three blocks behind; two more blocks reach the threshold.
    chain.set_height(1_002);
    wait_until(Duration::from_secs(5), || {
        let alerted = hook
            .messages()
            .iter()
            .any(|message| message.contains("0x00000000000000000000000000000000000000aa"));
        async move { alerted }
    })
    .await
    .context("threshold alert was not delivered")?;

    // JOB_A alerts again five blocks after its reset; JOB_B's reason stays suppressed.
    chain.set_height(1_010);
    wait_until(Duration::from_secs(5), || {
        let done = runner.last_processed_block() == Some(1_010);
        async move { done }
    })
    .await
    .context("watermark did not reach the chain tip")?;

    runner.cancellation_token().cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .context("runner did not stop")?
        .context("runner task panicked")??;

    let messages = hook.messages();
    let job_a_alerts: Vec<_> = messages
        .iter()
        .filter(|message| message.contains("0x00000000000000000000000000000000000000aa"))
        .collect();
    assert_eq!(job_a_alerts.len(), 2);
    assert!(job_a_alerts[0].contains("5 blocks (block 1002)"));
    assert!(job_a_alerts[1].contains("5 blocks (block 1007)"));
    assert!(!messages
        .iter()
        .any(|message| message.contains("0x00000000000000000000000000000000000000bb")));
    assert!(messages
        .last()
        .is_some_and(|message| message.contains("monitor stopped")));

    let snapshot = runner.telemetry().snapshot();
    assert!(snapshot.alerts_suppressed >= 1);
    assert_eq!(snapshot.alerts_sent, 2);

    hook.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bootstrap_failure_stops_before_notifying() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(SEQUENCER, LEADER, 1_000);
    chain.set_jobs(&[JOB_A]);
    chain.fail_method("eth_getLogs", 100);
    let server = MockRpcServer::start(chain.clone()).await?;
    let hook = MockWebhook::start().await?;

    let runner = Runner::from_config(config(server.url(), hook.url())?)?;
    let err = timeout(Duration::from_secs(10), runner.run())
        .await
        .context("bootstrap should fail promptly")?
        .expect_err("bootstrap must fail when history is unavailable");
    assert!(format!("{err:#}").contains("bootstrap"));
    assert!(hook.messages().is_empty());

    hook.shutdown().await;
    server.shutdown().await;
    Ok(())
}
