mod common;

use common::{MockResolver, test_config};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use muninn::enumeration::DnsTask;
use muninn::pipeline::Stage;
use muninn::requests::{DNSRequest, RecordType, Tag};
use muninn::wildcard::WildcardDetector;

fn wildcard_resolver() -> Arc<MockResolver> {
    let resolver = Arc::new(MockResolver::new());
    // Every label under the zone answers with the same address.
    resolver.wildcard("wild.example.com", RecordType::A, "10.0.0.1");
    resolver
}

#[tokio::test]
async fn test_dynamic_zone_matches_fingerprint() {
    let resolver = wildcard_resolver();
    let detector = WildcardDetector::new(resolver.clone());

    let mut req = DNSRequest::new("random.wild.example.com", "example.com", Tag::Dns, "DNS");
    req.attach_records(vec![muninn::requests::DNSAnswer {
        name: req.name.clone(),
        rrtype: RecordType::A.to_u16(),
        ttl: 60,
        data: "10.0.0.1".into(),
    }]);

    assert!(detector.matches(&req).await);

    // A name whose answers differ from the fingerprint passes.
    let mut other = DNSRequest::new("real.wild.example.com", "example.com", Tag::Dns, "DNS");
    other.attach_records(vec![muninn::requests::DNSAnswer {
        name: other.name.clone(),
        rrtype: RecordType::A.to_u16(),
        ttl: 60,
        data: "192.0.2.200".into(),
    }]);
    assert!(!detector.matches(&other).await);
}

#[tokio::test]
async fn test_probes_are_cached_per_zone() {
    let resolver = wildcard_resolver();
    let detector = WildcardDetector::new(resolver.clone());

    let mut req = DNSRequest::new("a.wild.example.com", "example.com", Tag::Dns, "DNS");
    req.attach_records(vec![muninn::requests::DNSAnswer {
        name: req.name.clone(),
        rrtype: RecordType::A.to_u16(),
        ttl: 60,
        data: "10.0.0.1".into(),
    }]);

    assert!(detector.matches(&req).await);
    let calls_after_first = resolver.calls().len();

    let mut again = req.clone();
    again.name = "b.wild.example.com".into();
    assert!(detector.matches(&again).await);
    // Same zone: the cached classification answers without new probes.
    assert_eq!(resolver.calls().len(), calls_after_first);
}

#[tokio::test]
async fn test_validation_drops_wildcard_but_trusts_cert() {
    let resolver = wildcard_resolver();
    let config = Arc::new(test_config(&["example.com"]));
    let detector = Arc::new(WildcardDetector::new(resolver.clone()));
    let task = DnsTask::new(config, resolver, true, Some(detector));

    // Untrusted tag: resolved through the wildcard zone, then rejected.
    let req = DNSRequest::new("random.wild.example.com", "example.com", Tag::Scrape, "scraper");
    assert!(task.process(req, &CancellationToken::new()).await.is_none());

    // Trusted tag bypasses the wildcard filter but is still resolved.
    let req = DNSRequest::new("random.wild.example.com", "example.com", Tag::Cert, "CT log");
    let out = task.process(req, &CancellationToken::new()).await.unwrap();
    assert!(!out.records.is_empty());
}
