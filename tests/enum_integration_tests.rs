mod common;

use common::{MockResolver, test_config};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use muninn::enumeration::Enumeration;
use muninn::error::EnumError;
use muninn::graph::{EdgeKind, Graph, MemGraph};
use muninn::requests::RecordType;

const RUN_TIMEOUT: Duration = Duration::from_secs(20);

struct Run {
    enumeration: Enumeration,
    graph: Arc<MemGraph>,
    resolver: Arc<MockResolver>,
    event: String,
}

fn run_with(config: muninn::config::EnumConfig, resolver: Arc<MockResolver>) -> Run {
    let graph = Arc::new(MemGraph::new());
    let event = config.uuid.clone();
    let enumeration = Enumeration::new(
        config,
        resolver.clone(),
        resolver.clone(),
        graph.clone(),
        Vec::new(),
    );
    Run {
        enumeration,
        graph,
        resolver,
        event,
    }
}

#[tokio::test]
async fn test_passive_single_root() {
    let mut config = test_config(&["example.com"]);
    config.passive = true;
    let run = run_with(config, Arc::new(MockResolver::new()));

    timeout(RUN_TIMEOUT, run.enumeration.start(CancellationToken::new()))
        .await
        .expect("run should go quiescent")
        .unwrap();

    // The root reached the output sink unresolved and was persisted.
    assert_eq!(run.graph.event_fqdns(&run.event).await, vec!["example.com".to_string()]);
    assert_eq!(
        run.graph.node_sources("example.com", &run.event).await.unwrap(),
        vec!["DNS".to_string()]
    );
    // Passive mode never touched the resolver.
    assert!(run.resolver.calls().is_empty());
}

#[tokio::test]
async fn test_active_run_resolves_and_stores() {
    let resolver = Arc::new(MockResolver::new());
    resolver.answer("example.com", RecordType::A, &["192.0.2.1"]);
    resolver.answer("www.example.com", RecordType::A, &["192.0.2.2"]);
    let mut config = test_config(&["example.com"]);
    config.provided_names = vec!["www.example.com".into()];
    let run = run_with(config, resolver);

    timeout(RUN_TIMEOUT, run.enumeration.start(CancellationToken::new()))
        .await
        .expect("run should go quiescent")
        .unwrap();

    let names = run.graph.event_fqdns(&run.event).await;
    assert!(names.contains(&"example.com".to_string()));
    assert!(names.contains(&"www.example.com".to_string()));
    assert!(run.graph.has_edge("www.example.com", "192.0.2.2", EdgeKind::ARecord));
}

#[tokio::test]
async fn test_blocklisted_answer_never_reaches_the_graph() {
    let resolver = Arc::new(MockResolver::new());
    resolver.answer("x.example.com", RecordType::A, &["198.105.244.42"]);
    let mut config = test_config(&["example.com"]);
    config.provided_names = vec!["x.example.com".into()];
    let run = run_with(config, resolver);

    timeout(RUN_TIMEOUT, run.enumeration.start(CancellationToken::new()))
        .await
        .expect("run should go quiescent")
        .unwrap();

    assert!(!run
        .graph
        .event_fqdns(&run.event)
        .await
        .contains(&"x.example.com".to_string()));
}

#[tokio::test]
async fn test_wildcard_zone_suppressed_but_cert_tag_trusted() {
    let resolver = Arc::new(MockResolver::new());
    resolver.wildcard("wild.example.com", RecordType::A, "10.0.0.1");
    let mut config = test_config(&["example.com"]);
    config.provided_names = vec!["random.wild.example.com".into()];
    let run = run_with(config, resolver);

    timeout(RUN_TIMEOUT, run.enumeration.start(CancellationToken::new()))
        .await
        .expect("run should go quiescent")
        .unwrap();

    // Provided names carry the external tag, which is untrusted; the
    // wildcard fingerprint suppresses the name.
    assert!(!run
        .graph
        .event_fqdns(&run.event)
        .await
        .contains(&"random.wild.example.com".to_string()));
}

#[tokio::test]
async fn test_srv_discovery_round_trip() {
    let resolver = Arc::new(MockResolver::new());
    resolver.answer("example.com", RecordType::A, &["192.0.2.1"]);
    resolver.answer("host.api.example.com", RecordType::A, &["192.0.2.3"]);
    resolver.answer(
        "_ldap._tcp.api.example.com",
        RecordType::SRV,
        &["dc.api.example.com"],
    );
    // The first FQDN under api.example.com makes it a new subdomain and
    // triggers the SRV sweep.
    let mut config = test_config(&["example.com"]);
    config.provided_names = vec!["host.api.example.com".into()];
    let run = run_with(config, resolver);

    timeout(RUN_TIMEOUT, run.enumeration.start(CancellationToken::new()))
        .await
        .expect("run should go quiescent")
        .unwrap();

    let names = run.graph.event_fqdns(&run.event).await;
    assert!(names.contains(&"_ldap._tcp.api.example.com".to_string()));
}

#[tokio::test]
async fn test_cancellation_drains_and_returns_cancelled() {
    let resolver = Arc::new(MockResolver::new());
    resolver.answer("example.com", RecordType::A, &["192.0.2.1"]);
    let config = test_config(&["example.com"]);
    let run = run_with(config, resolver);

    let token = CancellationToken::new();
    token.cancel();

    let err = timeout(RUN_TIMEOUT, run.enumeration.start(token))
        .await
        .expect("cancelled run must still drain")
        .unwrap_err();
    assert!(matches!(err, EnumError::Cancelled));
}

#[tokio::test]
async fn test_resubmitting_a_root_converges() {
    let make_resolver = || {
        let resolver = Arc::new(MockResolver::new());
        resolver.answer("example.com", RecordType::A, &["192.0.2.1"]);
        resolver
    };
    let config = test_config(&["example.com"]);

    let run = run_with(config.clone(), make_resolver());
    timeout(RUN_TIMEOUT, run.enumeration.start(CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();
    let names_one = run.graph.event_fqdns(&run.event).await;
    let edges_one = run.graph.edge_count();

    let run = run_with(config, make_resolver());
    timeout(RUN_TIMEOUT, run.enumeration.start(CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.graph.event_fqdns(&run.event).await, names_one);
    assert_eq!(run.graph.edge_count(), edges_one);
}

#[tokio::test]
async fn test_missing_domains_is_a_config_error() {
    let run = run_with(
        muninn::config::EnumConfig::default(),
        Arc::new(MockResolver::new()),
    );
    let err = run
        .enumeration
        .start(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EnumError::Config(_)));
}
