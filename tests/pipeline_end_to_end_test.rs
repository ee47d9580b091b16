use async_trait::async_trait;
use clband::application::pipeline::ExecutionPipeline;
use clband::application::reconciler;
use clband::domain::episode::Episode;
use clband::domain::errors::VaultError;
use clband::domain::ports::{VaultActionResult, VaultClient, VaultStatus};
use clband::domain::repositories::SignalRepository;
use clband::domain::signal::{Signal, SignalStatus};
use clband::domain::types::{Dex, EpisodeStatus, Majority, PoolType, Trend, WithdrawMode};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
use tempfile::TempDir;

use clband::infrastructure::persistence::database::Database;
use clband::infrastructure::persistence::repositories::SqliteSignalRepository;

struct RecordingVault {
    status: VaultStatus,
    calls: Mutex<Vec<String>>,
    swap_calls: AtomicUsize,
}

#[async_trait]
impl VaultClient for RecordingVault {
    async fn status(&self, _dex: Dex, _alias: &str) -> Result<VaultStatus, VaultError> {
        self.calls.lock().unwrap().push("status".to_string());
        Ok(self.status)
    }
    async fn collect(&self, _dex: Dex, _alias: &str) -> Result<VaultActionResult, VaultError> {
        self.calls.lock().unwrap().push("collect".to_string());
        Ok(VaultActionResult { ok: true, raw: serde_json::json!({}) })
    }
    async fn withdraw(&self, _dex: Dex, _alias: &str, _mode: WithdrawMode) -> Result<VaultActionResult, VaultError> {
        self.calls.lock().unwrap().push("withdraw".to_string());
        Ok(VaultActionResult { ok: true, raw: serde_json::json!({}) })
    }
    async fn swap_exact_in(
        &self,
        _dex: Dex,
        _alias: &str,
        token_in: &str,
        token_out: &str,
        amount_in_usd: f64,
    ) -> Result<VaultActionResult, VaultError> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(format!("swap {token_in}->{token_out}:{amount_in_usd:.2}"));
        Ok(VaultActionResult { ok: true, raw: serde_json::json!({}) })
    }
    async fn rebalance(&self, _dex: Dex, _alias: &str, _lower: f64, _upper: f64) -> Result<VaultActionResult, VaultError> {
        self.calls.lock().unwrap().push("rebalance".to_string());
        Ok(VaultActionResult { ok: true, raw: serde_json::json!({}) })
    }
}

fn misaligned_episode() -> Episode {
    Episode {
        strategy_id: "strat-1".to_string(),
        symbol: "ETHUSDT".to_string(),
        status: EpisodeStatus::Open,
        open_time: 10,
        open_price: 2000.0,
        pa: 1900.0,
        pb: 2100.0,
        pool_type: PoolType::Standard,
        mode_on_open: Trend::Up,
        majority_on_open: Majority::Token2,
        target_major_pct: 0.6,
        target_minor_pct: 0.4,
        last_event_bar: 0,
        out_above_streak: 0,
        out_below_streak: 0,
        atr_streak: HashMap::new(),
        close_time: None,
        close_price: None,
        close_reason: None,
        dex: Some(Dex::Uniswap),
        alias: Some("alias1".to_string()),
        token0_address: Some("0xaaa".to_string()),
        token1_address: Some("0xbbb".to_string()),
    }
}

async fn signal_db() -> (TempDir, SqliteSignalRepository) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clband.db");
    let db = Database::new(&format!("sqlite://{}", path.display())).await.unwrap();
    let repo = SqliteSignalRepository::new(db.pool.clone());
    (dir, repo)
}

/// A misaligned episode reconciles into a 4-step plan, persists as a pending
/// signal, and the pipeline drives it through every vault call in order,
/// sizing the swap from a fresh status read.
#[tokio::test]
async fn misaligned_episode_reconciles_and_executes_full_rotation() {
    let episode = misaligned_episode();
    let vault = Arc::new(RecordingVault {
        status: VaultStatus { amt0: 1.0, amt1: 1.0, p_t1_t0: 2000.0, current_lower_price: 1800.0, current_upper_price: 2000.0 },
        calls: Mutex::new(Vec::new()),
        swap_calls: AtomicUsize::new(0),
    });

    let plan = reconciler::reconcile(vault.as_ref(), &episode).await.unwrap().unwrap();
    assert_eq!(plan.steps.len(), 4);

    let (_dir, signals) = signal_db().await;
    let now = 1_000;
    let signal = Signal {
        strategy_id: episode.strategy_id.clone(),
        ts: episode.open_time,
        signal_type: plan.signal_type,
        status: SignalStatus::Pending,
        attempts: 0,
        cfg_hash: "cfg123".to_string(),
        symbol: episode.symbol.clone(),
        steps: plan.steps,
        episode: episode.clone(),
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    signals.upsert(&episode.strategy_id, &signal).await.unwrap();

    let pipeline = ExecutionPipeline::new(vault.clone(), 3, std::time::Duration::from_millis(1));
    pipeline.execute_once(&signals, 10).await.unwrap();

    let pending = signals.list_pending(10).await.unwrap();
    assert!(pending.is_empty(), "executed signal should no longer be pending");

    let calls = vault.calls.lock().unwrap();
    assert_eq!(calls[0], "collect");
    assert_eq!(calls[1], "withdraw");
    assert!(calls[2].starts_with("status") || calls[2].starts_with("swap"));
    assert_eq!(calls.last().unwrap(), "rebalance");
    assert_eq!(vault.swap_calls.load(Ordering::SeqCst), 1);
}

/// A vault status call that keeps failing marks the signal failed, with its
/// attempts counter advanced, rather than looping forever.
#[tokio::test]
async fn failing_step_marks_signal_failed_after_retries() {
    struct AlwaysFailsVault;

    #[async_trait]
    impl VaultClient for AlwaysFailsVault {
        async fn status(&self, _dex: Dex, _alias: &str) -> Result<VaultStatus, VaultError> {
            Err(VaultError::Http("connection refused".to_string()))
        }
        async fn collect(&self, _dex: Dex, _alias: &str) -> Result<VaultActionResult, VaultError> {
            Err(VaultError::Http("connection refused".to_string()))
        }
        async fn withdraw(&self, _dex: Dex, _alias: &str, _mode: WithdrawMode) -> Result<VaultActionResult, VaultError> {
            unimplemented!()
        }
        async fn swap_exact_in(&self, _dex: Dex, _alias: &str, _tin: &str, _tout: &str, _amt: f64) -> Result<VaultActionResult, VaultError> {
            unimplemented!()
        }
        async fn rebalance(&self, _dex: Dex, _alias: &str, _lower: f64, _upper: f64) -> Result<VaultActionResult, VaultError> {
            unimplemented!()
        }
    }

    let episode = misaligned_episode();
    let (_dir, signals) = signal_db().await;
    let now = 2_000;
    let signal = Signal {
        strategy_id: episode.strategy_id.clone(),
        ts: episode.open_time,
        signal_type: clband::domain::signal::SignalType::RebalanceToRange,
        status: SignalStatus::Pending,
        attempts: 0,
        cfg_hash: "cfg123".to_string(),
        symbol: episode.symbol.clone(),
        steps: vec![clband::domain::signal::Step::Collect { dex: Dex::Uniswap, alias: "alias1".to_string() }],
        episode: episode.clone(),
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    signals.upsert(&episode.strategy_id, &signal).await.unwrap();

    let pipeline = ExecutionPipeline::new(Arc::new(AlwaysFailsVault), 2, std::time::Duration::from_millis(1));
    pipeline.execute_once(&signals, 10).await.unwrap();

    let pending = signals.list_pending(10).await.unwrap();
    assert!(pending.is_empty(), "failed signal is not pending anymore");
}
