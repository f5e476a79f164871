use stratus_pg::{DbConfig, PgStore};

pub async fn test_store() -> PgStore {
    let store =
        PgStore::from_config(&DbConfig::from_env()).expect("Failed to create database pool");
    store.migrate().await.expect("Failed to apply schema");
    store
}
