use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use subtask_core::{ExecutorRegistry, SubAgentEngine, Subscribe};
use subtask_exec::{BuiltinExecutor, ProcessConfig, ProcessExecutor};
use subtask_model::{EngineConfig, SubmitOptions};
use subtask_observe::{EventLog, LogConfig, init_logging};
use subtask_prometheus::EngineMetrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    init_logging(&LogConfig::default())?;
    info!("logger initialized");

    // 2) Executors + registry
    let builtin = Arc::new(BuiltinExecutor::new());
    builtin.register("summarize", |prompt, _opts| async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(format!("summary ({} bytes in)", prompt.len()))
    });
    builtin.register("slow-audit", |_prompt, opts| async move {
        opts.progress.report(10, "collecting findings");
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("audit done".to_string())
    });

    let mut registry = ExecutorRegistry::new("builtin", builtin.clone());
    registry.register(
        "process",
        Arc::new(ProcessExecutor::new(ProcessConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat".to_string()],
            ..ProcessConfig::default()
        })),
    );
    info!("registered builtin and process executors");

    // 3) Subscribers
    let metrics = EngineMetrics::new()?;
    let subscribers: Vec<Arc<dyn Subscribe>> =
        vec![Arc::new(EventLog::new()), Arc::new(metrics.clone())];

    // 4) Engine
    let engine = SubAgentEngine::builder(EngineConfig::default(), registry)
        .with_subscribers(subscribers)
        .build();
    info!("engine ready");

    // 5) Delegate a burst of tasks across agents
    let fast = engine.submit(
        "agent-main",
        "summarize",
        "summarize the diff",
        "...diff text...",
        SubmitOptions::new(),
    )?;
    let queued = engine.submit(
        "agent-main",
        "summarize",
        "second summary",
        "...more text...",
        SubmitOptions::new(),
    )?;
    let doomed = engine.submit(
        "agent-side",
        "slow-audit",
        "full audit",
        "...tree...",
        SubmitOptions::new().with_timeout_ms(500),
    )?;

    info!(status = ?fast.wait().await.status, "first summary settled");
    info!(status = ?queued.wait().await.status, "queued summary settled");
    info!(status = ?doomed.wait().await.status, "audit settled (timeout expected)");

    // 6) Reconfigure: subsequent tasks run through the process executor
    engine.apply_config(EngineConfig {
        executor: "process".to_string(),
        ..EngineConfig::default()
    });
    let piped = engine.submit(
        "agent-main",
        "shell",
        "pipe through cat",
        "hello from the child process",
        SubmitOptions::new(),
    )?;
    let piped_result = piped.wait().await;
    info!(status = ?piped_result.status, output = ?piped_result.output, "process task settled");

    // 7) Stats + metrics exposition
    let stats = engine.stats();
    info!(
        total = stats.total,
        succeeded = stats.succeeded,
        timed_out = stats.timed_out,
        avg_ms = stats.avg_execution_ms,
        "engine statistics"
    );
    info!(metric_families = metrics.gather().len(), "metrics collected");

    // 8) Shutdown
    engine.shutdown();
    Ok(())
}
