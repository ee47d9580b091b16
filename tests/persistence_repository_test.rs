use clband::domain::candle::{Candle, StreamOffset};
use clband::domain::indicators::IndicatorSet;
use clband::domain::repositories::{CandleRepository, IndicatorSetRepository, StreamOffsetRepository};
use clband::domain::types::IndicatorSetStatus;
use clband::infrastructure::persistence::database::Database;
use clband::infrastructure::persistence::repositories::{
    SqliteCandleRepository, SqliteIndicatorSetRepository, SqliteStreamOffsetRepository,
};
use rust_decimal_macros::dec;
use tempfile::TempDir;

async fn test_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clband.db");
    let url = format!("sqlite://{}", path.display());
    let db = Database::new(&url).await.unwrap();
    (dir, db)
}

fn candle(open_time: i64) -> Candle {
    Candle {
        symbol: "ETHUSDT".to_string(),
        interval: "1m".to_string(),
        open_time,
        close_time: open_time + 60_000,
        open: dec!(2000.0),
        high: dec!(2010.0),
        low: dec!(1990.0),
        close: dec!(2005.0),
        volume: dec!(100.0),
        trades: 50,
    }
}

#[tokio::test]
async fn candle_upsert_is_idempotent_and_orders_ascending() {
    let (_dir, db) = test_db().await;
    let repo = SqliteCandleRepository::new(db.pool.clone());

    repo.upsert_many(&[candle(1_000), candle(2_000), candle(3_000)]).await.unwrap();
    // Re-inserting the same open_time is a no-op, not a duplicate row.
    repo.upsert_many(&[candle(2_000)]).await.unwrap();

    let latest = repo.latest("ETHUSDT", "1m", 10).await.unwrap();
    assert_eq!(latest.len(), 3);
    assert_eq!(latest[0].open_time, 1_000);
    assert_eq!(latest[2].open_time, 3_000);
}

#[tokio::test]
async fn candle_latest_respects_limit_and_takes_most_recent() {
    let (_dir, db) = test_db().await;
    let repo = SqliteCandleRepository::new(db.pool.clone());

    repo.upsert_many(&[candle(1_000), candle(2_000), candle(3_000), candle(4_000)]).await.unwrap();

    let latest = repo.latest("ETHUSDT", "1m", 2).await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].open_time, 3_000);
    assert_eq!(latest[1].open_time, 4_000);
}

#[tokio::test]
async fn stream_offset_upsert_overwrites_watermark() {
    let (_dir, db) = test_db().await;
    let repo = SqliteStreamOffsetRepository::new(db.pool.clone());

    repo.upsert(&StreamOffset { stream_key: "ethusdt_1m".into(), last_closed_open_time: 1_000, last_sync_at: 1 })
        .await
        .unwrap();
    repo.upsert(&StreamOffset { stream_key: "ethusdt_1m".into(), last_closed_open_time: 2_000, last_sync_at: 2 })
        .await
        .unwrap();

    let offset = repo.get("ethusdt_1m").await.unwrap().unwrap();
    assert_eq!(offset.last_closed_open_time, 2_000);
    assert_eq!(offset.last_sync_at, 2);
}

#[tokio::test]
async fn indicator_set_upsert_is_get_or_create_on_status_change() {
    let (_dir, db) = test_db().await;
    let repo = SqliteIndicatorSetRepository::new(db.pool.clone());

    let set = IndicatorSet::new("ETHUSDT", 12, 26, 14);
    repo.upsert(&set).await.unwrap();

    let mut retired = set.clone();
    retired.status = IndicatorSetStatus::Retired;
    repo.upsert(&retired).await.unwrap();

    let active = repo.active_for_symbol("ETHUSDT").await.unwrap();
    assert!(active.is_empty(), "retiring the only matching set should clear it from the active list");
}
