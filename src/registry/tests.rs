//! Registry Tests
//!
//! ## Test Scopes
//! - **Registration**: validation, duplicate names, ring/table consistency.
//! - **Failure Detection**: dead members removed, live members kept, recovered members
//!   re-supervised.
//! - **Peer Sync**: a node's peer pool follows the member list and survives registry outages.
//! - **Routing**: client requests proxied to the owning node over HTTP.

#[cfg(test)]
mod tests {
    use crate::cache::CacheNode;
    use crate::cache::protocol::{Action, DataRequest};
    use crate::config::RegistryConfig;
    use crate::error::CacheError;
    use crate::registry::types::{RegistryParams, RegistryRequest};
    use crate::registry::{MemberState, Registry, RegistryClient};
    use crate::cache::HttpPeerPool;
    use axum::{
        Router,
        extract::Request,
        http::StatusCode,
        middleware::{self, Next},
        response::IntoResponse,
        routing::get,
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast_config() -> RegistryConfig {
        RegistryConfig {
            heartbeat_interval: Duration::from_millis(50),
            probe_timeout: Duration::from_millis(200),
            ..RegistryConfig::default()
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        url
    }

    async fn spawn_node() -> (String, Arc<CacheNode>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let node = CacheNode::new(&url, 1 << 20, None);
        let app = crate::cache::handlers::router(node.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (url, node)
    }

    async fn wait_until<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        false
    }

    // ============================================================
    // REGISTRATION
    // ============================================================

    #[tokio::test]
    async fn test_register_rejects_empty_name() {
        let registry = Registry::new(RegistryConfig::default());
        let err = registry.register("").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_duplicate_registration_leaves_state_unchanged() {
        let registry = Registry::new(RegistryConfig::default());
        registry.register("http://n1").await.unwrap();
        let before = registry.snapshot().await;

        let err = registry.register("http://n1").await.unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists(_)));

        let after = registry.snapshot().await;
        assert_eq!(before, after);
        assert_eq!(after.ring_points, 1);
        assert_eq!(after.ring_members, vec!["http://n1".to_string()]);
        assert_eq!(after.ring_members, after.table_members);
    }

    #[tokio::test]
    async fn test_resolve_requires_members() {
        let registry = Registry::new(RegistryConfig::default());
        assert!(matches!(
            registry.resolve("k").await,
            Err(CacheError::NotFound(_))
        ));

        registry.register("http://n1").await.unwrap();
        let node = registry.resolve("k").await.unwrap();
        assert_eq!(node.name(), "http://n1");
    }

    #[tokio::test]
    async fn test_members_report_alive_state() {
        let registry = Registry::new(RegistryConfig::default());
        registry.register("http://b").await.unwrap();
        registry.register("http://a").await.unwrap();

        let members = registry.members().await;
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["http://a", "http://b"]);
        assert!(members.iter().all(|m| m.state == MemberState::Alive));
    }

    #[tokio::test]
    async fn test_members_endpoint_json_shape() {
        let registry = Registry::new(RegistryConfig::default());
        registry.register("http://n1").await.unwrap();
        let registry_url = serve(crate::registry::handlers::router(registry.clone())).await;

        let body = reqwest::Client::new()
            .get(format!("{}/mcache", registry_url))
            .query(&[("action", "members")])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["members"][0]["name"], "http://n1");
        assert_eq!(json["members"][0]["state"], "Alive");
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let registry = Registry::new(RegistryConfig::default());
        assert!(registry.start().is_some());
        assert!(registry.start().is_none());
    }

    // ============================================================
    // FAILURE DETECTION
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unreachable_node_is_removed() {
        let registry = Registry::new(fast_config());
        registry.start();
        registry.register("http://127.0.0.1:1").await.unwrap();

        let removed = wait_until(|| {
            let registry = registry.clone();
            async move { registry.snapshot().await.table_members.is_empty() }
        })
        .await;
        assert!(removed, "dead node should be removed");

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.ring_points, 0);
        assert!(snapshot.ring_members.is_empty());
        assert_eq!(registry.member_state("http://127.0.0.1:1"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_live_node_survives_heartbeats() {
        let (url, _node) = spawn_node().await;
        let registry = Registry::new(fast_config());
        registry.start();
        registry.register(&url).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.table_members, vec![url.clone()]);
        assert_eq!(registry.member_state(&url), Some(MemberState::Alive));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_recovered_node_is_supervised_again() {
        // First probe fails, every later one succeeds.
        let pings = Arc::new(AtomicUsize::new(0));
        let counter = pings.clone();
        let app = Router::new().route(
            "/cache",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, "down")
                    } else {
                        (StatusCode::OK, "pong")
                    }
                }
            }),
        );
        let url = serve(app).await;

        let registry = Registry::new(fast_config());
        registry.start();
        registry.register(&url).await.unwrap();

        // Failed heartbeat, successful re-verification, then the new supervisor probes.
        let reprobed = wait_until(|| {
            let pings = pings.clone();
            async move { pings.load(Ordering::SeqCst) >= 4 }
        })
        .await;
        assert!(reprobed, "supervisor should be restarted after recovery");

        assert_eq!(registry.snapshot().await.table_members, vec![url.clone()]);
        assert_eq!(registry.member_state(&url), Some(MemberState::Alive));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reregistered_node_is_supervised() {
        let registry = Registry::new(fast_config());
        registry.start();
        let dead = "http://127.0.0.1:1";

        for round in 0..2 {
            registry.register(dead).await.unwrap();
            assert_eq!(
                registry.member_state(dead),
                Some(MemberState::Alive),
                "round {} should start a supervisor",
                round
            );

            let removed = wait_until(|| {
                let registry = registry.clone();
                async move { registry.snapshot().await.table_members.is_empty() }
            })
            .await;
            assert!(removed, "round {} should detect the dead node", round);
            assert_eq!(registry.member_state(dead), None);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unstarted_registry_is_released_when_dropped() {
        // One queue slot and two dead members: the second supervisor waits on a full queue.
        let registry = Registry::new(RegistryConfig {
            dead_queue_capacity: 1,
            ..fast_config()
        });
        registry.register("http://127.0.0.1:1").await.unwrap();
        registry.register("http://127.0.0.1:2").await.unwrap();

        let suspects = wait_until(|| {
            let registry = registry.clone();
            async move {
                registry.member_state("http://127.0.0.1:1") == Some(MemberState::Suspect)
                    && registry.member_state("http://127.0.0.1:2") == Some(MemberState::Suspect)
            }
        })
        .await;
        assert!(suspects, "both members should become suspect");

        let weak = Arc::downgrade(&registry);
        drop(registry);

        let released = wait_until(|| {
            let weak = weak.clone();
            async move { weak.upgrade().is_none() }
        })
        .await;
        assert!(released, "supervisors must not keep the registry alive");
    }

    // ============================================================
    // PEER SYNC
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sync_peers_follows_registry_and_keeps_last_set() {
        let registry = Registry::new(RegistryConfig::default());
        registry.register("http://n1").await.unwrap();

        // Answers 503 for every request once `down` is set.
        let down = Arc::new(AtomicBool::new(false));
        let switch = down.clone();
        let app = crate::registry::handlers::router(registry.clone()).layer(
            middleware::from_fn(move |request: Request, next: Next| {
                let switch = switch.clone();
                async move {
                    if switch.load(Ordering::SeqCst) {
                        StatusCode::SERVICE_UNAVAILABLE.into_response()
                    } else {
                        next.run(request).await
                    }
                }
            }),
        );
        let registry_url = serve(app).await;

        let pool = Arc::new(HttpPeerPool::new("http://n1", 50, Duration::from_secs(1)));
        let sync = tokio::spawn(
            RegistryClient::new(&registry_url).sync_peers(pool.clone(), Duration::from_millis(30)),
        );

        let expect_peers = |expected: Vec<&'static str>| {
            let pool = pool.clone();
            move || {
                let pool = pool.clone();
                let expected = expected.clone();
                async move { pool.peers() == expected }
            }
        };

        assert!(wait_until(expect_peers(vec!["http://n1"])).await);

        registry.register("http://n2").await.unwrap();
        assert!(wait_until(expect_peers(vec!["http://n1", "http://n2"])).await);

        down.store(true, Ordering::SeqCst);
        registry.register("http://n3").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(pool.peers(), vec!["http://n1", "http://n2"]);

        sync.abort();
    }

    // ============================================================
    // ROUTING
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_requests_are_proxied_to_owner() {
        let (url_a, node_a) = spawn_node().await;
        let (url_b, node_b) = spawn_node().await;

        let registry = Registry::new(RegistryConfig::default());
        registry.register(&url_a).await.unwrap();
        registry.register(&url_b).await.unwrap();
        let registry_url = serve(crate::registry::handlers::router(registry.clone())).await;

        let client = reqwest::Client::new();
        let body = client
            .get(format!("{}/mcache", registry_url))
            .query(&[("action", "set"), ("key", "x"), ("value", "1")])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "success");

        let owner = registry.resolve("x").await.unwrap();
        let owner_node = if owner.name() == url_a { &node_a } else { &node_b };
        assert!(owner_node.lookup_local("x").is_some());

        let response = client
            .get(format!("{}/mcache", registry_url))
            .query(&[("action", "get"), ("key", "x")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "1");

        // Node errors are relayed with their status.
        let response = client
            .get(format!("{}/mcache", registry_url))
            .query(&[("action", "delete"), ("key", "absent")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_route_without_members_is_not_found() {
        let registry = Registry::new(RegistryConfig::default());
        let request = DataRequest::Get {
            key: "k".to_string(),
        };
        assert!(matches!(
            registry.route(&request).await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_client_registers_and_lists() {
        let registry = Registry::new(RegistryConfig::default());
        let registry_url = serve(crate::registry::handlers::router(registry.clone())).await;
        let client = RegistryClient::new(&registry_url);

        client.register("http://n1").await.unwrap();
        assert!(client.register("http://n1").await.is_err());
        assert_eq!(client.members().await.unwrap(), vec!["http://n1".to_string()]);
    }

    // ============================================================
    // REQUEST PARSING
    // ============================================================

    fn params(action: &str, name: Option<&str>, key: Option<&str>) -> RegistryParams {
        RegistryParams {
            action: Some(action.to_string()),
            name: name.map(str::to_string),
            key: key.map(str::to_string),
            value: None,
        }
    }

    #[test]
    fn test_registry_request_parsing() {
        assert_eq!(
            RegistryRequest::try_from(params("register", Some("http://n1"), None)).unwrap(),
            RegistryRequest::Register {
                name: "http://n1".to_string()
            }
        );
        assert!(RegistryRequest::try_from(params("register", Some(""), None)).is_err());
        assert!(RegistryRequest::try_from(RegistryParams::default()).is_err());
        assert_eq!(
            RegistryRequest::try_from(params("MEMBERS", None, None)).unwrap(),
            RegistryRequest::Members
        );

        match RegistryRequest::try_from(params("get", None, Some("k"))).unwrap() {
            RegistryRequest::Route(request) => assert_eq!(request.action(), Action::Get),
            other => panic!("expected a routed request, got {:?}", other),
        }
        assert!(RegistryRequest::try_from(params("set", None, Some("k"))).is_err());
    }
}
