use chrono::Duration;
use marathon_core::model::{ProgressState, Stage, UserId};
use marathon_core::time::fixed_now;
use storage::repository::{LocalStore, StorageError};
use storage::sqlite::{SqliteLocalStore, open_or_in_memory};

fn stages(numbers: &[u32]) -> Vec<Stage> {
    numbers.iter().map(|n| Stage::new(*n).unwrap()).collect()
}

fn numbers(stages: &std::collections::BTreeSet<Stage>) -> Vec<u32> {
    stages.iter().map(|s| s.number()).collect()
}

#[tokio::test]
async fn sqlite_roundtrip_replaces_full_set() {
    let store = SqliteLocalStore::connect("sqlite:file:memdb_progress_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    let user = UserId::new("1001").unwrap();

    assert!(store.read(&user).await.unwrap().is_none());

    let first = ProgressState::from_stages(stages(&[1, 2, 3]), fixed_now());
    store.write(&user, &first).await.unwrap();
    let second = ProgressState::from_stages(stages(&[3, 7, 12]), fixed_now() + Duration::seconds(5));
    store.write(&user, &second).await.unwrap();

    let fetched = store.read(&user).await.unwrap().expect("stored");
    assert_eq!(numbers(&fetched), vec![3, 7, 12]);
}

#[tokio::test]
async fn sqlite_persists_bare_json_array_under_namespaced_key() {
    let store = SqliteLocalStore::connect("sqlite:file:memdb_progress_layout?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    let user = UserId::new("tg-77").unwrap();

    let state = ProgressState::from_stages(stages(&[5, 4]), fixed_now());
    store.write(&user, &state).await.unwrap();

    let (key, value): (String, String) =
        sqlx::query_as("SELECT key, value FROM local_progress")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(key, "marathon-progress:tg-77");
    assert_eq!(value, "[4,5]");
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let store = SqliteLocalStore::connect("sqlite:file:memdb_progress_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("first migrate");
    store.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn sqlite_reports_malformed_values() {
    let store = SqliteLocalStore::connect("sqlite:file:memdb_progress_malformed?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");

    sqlx::query("INSERT INTO local_progress (key, value, updated_at) VALUES (?1, ?2, ?3)")
        .bind("marathon-progress:broken")
        .bind("{oops")
        .bind(fixed_now())
        .execute(store.pool())
        .await
        .unwrap();

    let user = UserId::new("broken").unwrap();
    assert!(matches!(
        store.read(&user).await,
        Err(StorageError::Serialization(_))
    ));
}

#[tokio::test]
async fn unreachable_database_falls_back_to_memory() {
    let store = open_or_in_memory("sqlite:///nonexistent-dir/definitely/missing.sqlite3").await;
    let user = UserId::new("offline").unwrap();

    let state = ProgressState::from_stages(stages(&[1]), fixed_now());
    store.write(&user, &state).await.unwrap();
    let fetched = store.read(&user).await.unwrap().expect("stored in memory");
    assert_eq!(numbers(&fetched), vec![1]);
}
