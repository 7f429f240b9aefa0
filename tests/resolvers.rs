//! Resolver contract tests shared by every implementation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use rpc_transport::resolver::{
    ConstantResolver, Endpoint, FileResolver, Resolver, Version, WatchResolver,
};
use rpc_transport::ProtocolError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn endpoints(ports: &[u16]) -> Vec<Endpoint> {
    ports
        .iter()
        .map(|p| Endpoint::new("tcp", format!("127.0.0.1:{p}")))
        .collect()
}

/// A blocking resolve must return `Cancelled` promptly once its token fires
async fn assert_cancels_promptly(resolver: Arc<dyn Resolver>, version: Version) {
    let cancel = CancellationToken::new();
    let parked = {
        let resolver = resolver.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { resolver.resolve(&cancel, Some(&version)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!parked.is_finished(), "resolve returned without a change");

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(1), parked)
        .await
        .expect("cancelled resolve did not return")
        .unwrap();
    assert!(matches!(result, Err(ProtocolError::Cancelled)));
}

#[tokio::test]
async fn test_constant_resolver_contract() {
    let resolver = ConstantResolver::new(endpoints(&[1, 2]));
    assert!(resolver.is_constant());

    let cancel = CancellationToken::new();
    let res = resolver.resolve(&cancel, None).await.unwrap();
    assert_eq!(res.endpoints, endpoints(&[1, 2]));
    assert!(res.version.is_none());

    let err = resolver
        .resolve(&cancel, Some(&Version::Opaque(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownVersion(_)));
}

#[tokio::test]
async fn test_file_resolver_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let trigger = dir.path().join("server.ready");
    let resolver = Arc::new(FileResolver::new(&trigger, endpoints(&[9])));
    let cancel = CancellationToken::new();

    // not yet started
    let res = resolver.resolve(&cancel, None).await.unwrap();
    assert!(res.endpoints.is_empty());
    assert_eq!(res.version, Some(Version::ABSENT));

    // still absent: same version back, no blocking
    let again = resolver.resolve(&cancel, res.version.as_ref()).await.unwrap();
    assert_eq!(again, res);

    std::fs::create_dir(&trigger).unwrap();
    let ready = resolver.resolve(&cancel, res.version.as_ref()).await.unwrap();
    assert_eq!(ready.endpoints, endpoints(&[9]));
    assert_eq!(ready.version, Some(Version::PRESENT));

    assert_cancels_promptly(resolver, Version::PRESENT).await;
}

#[tokio::test]
async fn test_watch_resolver_contract() {
    let resolver = Arc::new(WatchResolver::new(endpoints(&[1])));
    let cancel = CancellationToken::new();

    let first = resolver.resolve(&cancel, None).await.unwrap();
    let current = first.version.clone().unwrap();

    assert_cancels_promptly(resolver.clone(), current.clone()).await;

    resolver.update(endpoints(&[1, 2]));
    let next = resolver.resolve(&cancel, Some(&current)).await.unwrap();
    assert_eq!(next.endpoints, endpoints(&[1, 2]));
    assert_ne!(next.version, Some(current));
}

#[tokio::test]
async fn test_many_watchers_wake_on_one_update() {
    let resolver = Arc::new(WatchResolver::new(endpoints(&[1])));
    let cancel = CancellationToken::new();
    let version = resolver.resolve(&cancel, None).await.unwrap().version.unwrap();

    let mut watchers = Vec::new();
    for _ in 0..8 {
        let resolver = resolver.clone();
        let cancel = cancel.clone();
        let version = version.clone();
        watchers.push(tokio::spawn(async move {
            resolver.resolve(&cancel, Some(&version)).await
        }));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    resolver.update(endpoints(&[5]));

    for watcher in watchers {
        let res = tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(res.endpoints, endpoints(&[5]));
    }
}
