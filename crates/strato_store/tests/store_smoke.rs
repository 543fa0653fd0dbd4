use strato_store::{DatabaseConfig, StoreConfig, StratoStore};
use tempfile::tempdir;

#[tokio::test]
async fn reopening_a_datastore_keeps_config_and_schema() -> strato_store::DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();

    let first = StratoStore::open_dir(base).await?;
    first.health_check().await?;
    drop(first);
    assert!(base.join("strato.json").exists());
    assert!(base.join("strato.sqlite").exists());

    let config = StoreConfig::load_or_init(base)?;
    assert!(matches!(config.database, DatabaseConfig::Sqlite { .. }));
    assert_eq!(config.sqlite_path(base)?, base.join("strato.sqlite"));
    let second = StratoStore::connect(&config, base).await?;
    second.migrate().await?;
    second.health_check().await?;
    assert_eq!(second.settings().writer, "strato");
    assert_eq!(second.settings().max_subscriptions_per_area, 10);
    Ok(())
}

#[tokio::test]
async fn malformed_config_is_rejected() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(dir.path().join("strato.json"), "{ not json").expect("write config");
    let err = StoreConfig::load_or_init(dir.path()).expect_err("invalid config");
    assert_eq!(err.kind(), strato_store::ErrorKind::BadRequest);
}

#[tokio::test]
async fn a_moved_datastore_still_finds_its_database() -> strato_store::DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let original = dir.path().join("original");
    StratoStore::open_dir(&original).await?;

    let moved = dir.path().join("moved");
    std::fs::rename(&original, &moved).expect("move datastore");
    let store = StratoStore::open_dir(&moved).await?;
    store.health_check().await?;
    assert!(!original.exists());
    Ok(())
}

#[tokio::test]
async fn sqlite_paths_resolve_against_the_base_dir() -> strato_store::DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let config = StoreConfig::default_sqlite("nested.sqlite");
    assert_eq!(
        config.sqlite_path(dir.path())?,
        dir.path().join("nested.sqlite")
    );
    let store = StratoStore::connect(&config, dir.path()).await?;
    store.health_check().await?;
    assert!(dir.path().join("nested.sqlite").exists());
    Ok(())
}
