//! Integration tests for the collector
//!
//! These tests use wiremock to create mock HTTP servers and drive the full
//! cycle end-to-end: frontier, cache, rate limiter, retry, extractors,
//! checkpoints and fallback.

use leadcrawl::config::{parse_config, Config};
use leadcrawl::crawler::{Coordinator, CrawlContext, StopReason};
use leadcrawl::metrics::{read_sidecar, SAMPLE_RECORD_COUNT};
use leadcrawl::{Collector, DataSource, RunStatus};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for a collector seeded at `seed`
///
/// Pacing and backoff are zeroed so tests run fast; `extra` is appended as
/// raw TOML inside `[crawler]`.
fn create_test_config(dir: &TempDir, seed: &str, extra: &str) -> Config {
    let toml = format!(
        r#"
        [collector]
        name = "testtown"
        seeds = ["{seed}"]

        [crawler]
        concurrency = 4
        request-timeout-secs = 5
        {extra}

        [retry]
        max-retries = 2
        backoff-factor = 0.0
        jitter = false

        [rate-limit]
        min-delay-ms = 0
        max-delay-ms = 0

        [cache]
        dir = "{cache}"
        ttl-secs = 3600

        [fallback]
        error-ratio-threshold = 0.5
        min-attempts = 5

        [output]
        state-dir = "{state}"

        [user-agent]
        name = "TestBot"
        version = "1.0.0"
        "#,
        seed = seed,
        extra = extra,
        cache = dir.path().join("cache").display(),
        state = dir.path().join("state").display(),
    );
    parse_config(&toml).expect("test config should be valid")
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

/// A page the generic feature extractor turns into a record
fn table_page(label: &str) -> String {
    format!(
        r#"<html><head><title>{label}</title></head><body>
        <table><tr><th>Parcel</th><th>Owner</th></tr><tr><td>{label}</td><td>X</td></tr></table>
        </body></html>"#,
        label = label
    )
}

async fn mount_page(server: &MockServer, route: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_depth_two_scenario() {
    let site = MockServer::start().await;
    let elsewhere = MockServer::start().await;
    let base = site.uri();

    // A -> B, C on the same site; B -> D on another site
    mount_page(
        &site,
        "/a",
        format!(r#"<a href="{base}/b">B</a> <a href="/c">C</a>"#, base = base),
        1,
    )
    .await;
    mount_page(
        &site,
        "/b",
        format!(r#"<a href="{}/d">D</a>"#, elsewhere.uri()),
        1,
    )
    .await;
    mount_page(&site, "/c", "<p>leaf</p>".to_string(), 1).await;
    mount_page(&elsewhere, "/d", "<p>never</p>".to_string(), 0).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/a", base), "max-depth = 2");
    let ctx = CrawlContext::from_config(config).expect("context should build");

    let outcome = Coordinator::restore(&ctx, true).await.run().await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.metrics.pages_visited, 3);
    assert_eq!(outcome.metrics.failures, 0);
    assert!(!ctx.checkpoints.exists().await);
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let site = MockServer::start().await;
    let base = site.uri();

    mount_page(&site, "/", format!(r#"{}<a href="/p1">1</a>"#, table_page("root")), 1).await;
    mount_page(&site, "/p1", table_page("p1"), 1).await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", base);

    let first = Collector::new(create_test_config(&dir, &seed, ""))
        .unwrap()
        .fresh(true)
        .collect()
        .await
        .unwrap();
    assert_eq!(first.metadata.source, DataSource::Live);
    assert_eq!(first.records.len(), 2);
    assert_eq!(first.metadata.metrics.requests, 2);

    let second = Collector::new(create_test_config(&dir, &seed, ""))
        .unwrap()
        .fresh(true)
        .collect()
        .await
        .unwrap();
    assert_eq!(second.metadata.metrics.requests, 0);
    assert_eq!(second.metadata.metrics.cache_hits, 2);

    let contents = |r: &leadcrawl::CollectionResult| {
        r.records
            .iter()
            .map(|rec| rec.content().clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(contents(&first), contents(&second));
}

#[tokio::test]
async fn test_resume_after_quota() {
    let site = MockServer::start().await;
    let base = site.uri();

    mount_page(
        &site,
        "/",
        format!(r#"{}<a href="/p1">1</a><a href="/p2">2</a>"#, table_page("root")),
        1,
    )
    .await;
    mount_page(&site, "/p1", table_page("p1"), 1).await;
    mount_page(&site, "/p2", table_page("p2"), 1).await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", base);

    // Quota of two: the root and one child, then the run stops
    let mut limited = create_test_config(&dir, &seed, "");
    limited.rate_limit.daily_quota = Some(2);
    let first = Collector::new(limited).unwrap().collect().await.unwrap();

    assert_eq!(first.metadata.source, DataSource::Cached);
    assert!(first.metadata.partial);
    assert!(!first.metadata.using_sample_data);
    assert_eq!(first.records.len(), 2);
    assert!(first.metadata.error.as_deref().unwrap_or("").contains("quota"));

    // The next run resumes from the checkpoint and only fetches what is left
    let second = Collector::new(create_test_config(&dir, &seed, ""))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(second.metadata.source, DataSource::Live);
    assert_eq!(second.metadata.status, RunStatus::Completed);
    assert_eq!(second.records.len(), 3);
    assert_eq!(second.metadata.metrics.pages_visited, 3);
    assert!(!second.metadata.partial);
}

#[tokio::test]
async fn test_unreachable_seed_falls_back_to_sample_data() {
    let site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&site)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", site.uri()), "");
    let collector = Collector::new(config).unwrap();

    let result = collector.collect().await.unwrap();

    assert_eq!(result.metadata.status, RunStatus::Failed);
    assert_eq!(result.metadata.source, DataSource::Sample);
    assert!(result.metadata.using_sample_data);
    assert_eq!(result.records.len(), SAMPLE_RECORD_COUNT);
    assert!(result.records.iter().all(|r| r.is_sample()));
    assert_eq!(result.metadata.metrics.retries, 1);
    assert_eq!(result.metadata.metrics.failures, 1);

    let report = read_sidecar(&collector.context().sidecar).await.unwrap();
    assert!(report.using_sample_data);
    assert_eq!(report.metrics.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let site = MockServer::start().await;

    mount_page(&site, "/", r#"<a href="/gone">gone</a>"#.to_string(), 1).await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&site)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", site.uri()), "");
    let result = Collector::new(config).unwrap().collect().await.unwrap();

    assert_eq!(result.metadata.source, DataSource::Live);
    assert_eq!(result.metadata.status, RunStatus::Completed);
    assert_eq!(result.metadata.metrics.failures, 1);
    assert_eq!(result.metadata.metrics.retries, 0);
    assert_eq!(result.metadata.metrics.errors.len(), 1);
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&site)
        .await;
    mount_page(&site, "/", table_page("root"), 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", site.uri()), "");
    let result = Collector::new(config).unwrap().collect().await.unwrap();

    assert_eq!(result.metadata.source, DataSource::Live);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.metadata.metrics.requests, 1);
    assert_eq!(result.metadata.metrics.retries, 1);
    assert_eq!(result.metadata.metrics.failures, 0);
}

#[tokio::test]
async fn test_error_ratio_trips_fallback() {
    let site = MockServer::start().await;

    let links: String = (1..=5)
        .map(|i| format!(r#"<a href="/broken{}">{}</a>"#, i, i))
        .collect();
    mount_page(&site, "/", links, 1).await;
    for i in 1..=5 {
        Mock::given(method("GET"))
            .and(path(format!("/broken{}", i)))
            .respond_with(ResponseTemplate::new(500))
            .mount(&site)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", site.uri()), "");
    let result = Collector::new(config).unwrap().collect().await.unwrap();

    assert_eq!(result.metadata.status, RunStatus::Completed);
    assert_eq!(result.metadata.source, DataSource::Sample);
    assert!(result.metadata.using_sample_data);
    assert_eq!(result.metadata.metrics.failures, 5);
    assert!(result
        .metadata
        .error
        .as_deref()
        .unwrap_or("")
        .contains("error ratio"));
}

#[tokio::test]
async fn test_max_items_caps_records() {
    let site = MockServer::start().await;

    let links: String = (1..=4).map(|i| format!(r#"<a href="/p{}">{}</a>"#, i, i)).collect();
    mount_page(&site, "/", format!("{}{}", table_page("root"), links), 1).await;
    for i in 1..=4 {
        mount_page(&site, &format!("/p{}", i), table_page(&format!("p{}", i)), 1).await;
    }

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", site.uri()), "max-items = 3");
    let ctx = CrawlContext::from_config(config).unwrap();

    let outcome = Coordinator::restore(&ctx, true).await.run().await.unwrap();

    assert_eq!(outcome.stop, StopReason::MaxItems);
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.metrics.items_collected, 3);
}

#[tokio::test]
async fn test_deadline_mid_batch_checkpoints_and_resumes() {
    let site = MockServer::start().await;
    let base = site.uri();

    mount_page(&site, "/", format!(r#"{}<a href="/slow">slow</a>"#, table_page("root")), 2).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            html(format!(r#"{}<a href="/leaf">leaf</a>"#, table_page("slow")))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&site)
        .await;
    mount_page(&site, "/leaf", table_page("leaf"), 2).await;

    let seed = format!("{}/", base);
    let slow_url = format!("{}/slow", base);

    // The whole site, crawled without a deadline
    let reference_dir = TempDir::new().unwrap();
    let reference_ctx =
        CrawlContext::from_config(create_test_config(&reference_dir, &seed, "")).unwrap();
    let reference = Coordinator::restore(&reference_ctx, true)
        .await
        .run()
        .await
        .unwrap();
    assert_eq!(reference.stop, StopReason::FrontierExhausted);

    // A one second deadline expires while /slow is in flight
    let dir = TempDir::new().unwrap();
    let collector = Collector::new(create_test_config(&dir, &seed, "deadline-secs = 1")).unwrap();
    let first = collector.collect().await.unwrap();

    assert_eq!(first.metadata.status, RunStatus::Completed);
    assert_eq!(first.metadata.source, DataSource::Live);
    assert!(first.metadata.partial);
    assert_eq!(first.records.len(), 1);

    let checkpoint = collector
        .context()
        .checkpoints
        .load()
        .await
        .expect("deadline should leave a checkpoint");
    assert!(checkpoint.frontier.pending().contains(&slow_url));
    assert!(!checkpoint.frontier.visited().contains(&slow_url));
    assert_eq!(checkpoint.frontier.depth(), 1);

    // Resuming without the deadline finishes the returned batch
    let ctx = CrawlContext::from_config(create_test_config(&dir, &seed, "")).unwrap();
    let resumed = Coordinator::restore(&ctx, false).await;
    assert!(resumed.is_resumed());
    let outcome = resumed.run().await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.stop, StopReason::FrontierExhausted);
    assert_eq!(outcome.frontier.visited(), reference.frontier.visited());
    assert_eq!(outcome.records.len(), reference.records.len());
    assert!(!ctx.checkpoints.exists().await);
}
