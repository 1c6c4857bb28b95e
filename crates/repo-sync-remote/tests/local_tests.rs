use std::path::PathBuf;

use futures::TryStreamExt;
use repo_sync::{ContentUnit, FetchError, RemoteDescriptor, RemoteFetcher};
use repo_sync_remote::LocalFetcher;

fn write_fixture(name: &str, body: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("repo-sync-{}-{name}", std::process::id()));
    std::fs::write(&path, body).unwrap();
    path
}

fn file_remote(path: &std::path::Path) -> RemoteDescriptor {
    RemoteDescriptor::new("local", format!("file://{}", path.display()))
}

#[tokio::test]
async fn reads_listing_from_file() {
    let path = write_fixture(
        "specs.json",
        r#"[{"name": "rake", "version": "13.0.6"}, {"name": "rack", "version": "3.0.0"}]"#,
    );

    let units: Vec<ContentUnit> = LocalFetcher::new()
        .fetch(&file_remote(&path))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(units.len(), 2);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn missing_file_is_unreachable() {
    let path = std::env::temp_dir().join("repo-sync-does-not-exist.json");
    let err = LocalFetcher::new().fetch(&file_remote(&path)).await.err().unwrap();
    assert!(matches!(err, FetchError::Unreachable(_)));
}

#[tokio::test]
async fn malformed_file_is_malformed() {
    let path = write_fixture("broken.json", "{ this is not json");
    let err = LocalFetcher::new().fetch(&file_remote(&path)).await.err().unwrap();
    assert!(matches!(err, FetchError::Malformed(_)));
    let _ = std::fs::remove_file(&path);
}
