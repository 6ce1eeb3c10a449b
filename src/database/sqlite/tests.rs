use super::*;
use tempfile::TempDir;

#[tokio::test]
async fn creates_database_file_and_runs_migrations() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("metadata.db");

    let database = Database::new(&db_path).await.unwrap();
    assert!(db_path.exists());

    // Migrations are idempotent
    database.run_migrations().await.unwrap();
}

#[tokio::test]
async fn initialize_creates_missing_base_dir() {
    let dir = TempDir::new().unwrap();
    let base_dir = dir.path().join("nested").join("data");

    let database = Database::initialize_from_base_dir(&base_dir).await.unwrap();
    assert!(base_dir.join("metadata.db").exists());

    database.optimize().await.unwrap();
}
