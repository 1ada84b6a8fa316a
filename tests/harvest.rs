use bharat_connect::content::{ContentKind, ContentStore, FeedHarvester, HarvestConfig};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HINDI_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>पत्र सूचना कार्यालय</title>
    <language>hi-IN</language>
    <item>
      <title>सौर ऊर्जा क्षमता 100 गीगावाट के पार</title>
      <link>/PressReleasePage.aspx?PRID=11</link>
      <description>Solar capacity milestone announced by the ministry</description>
      <guid>prid-11</guid>
    </item>
    <item>
      <title>ग्रामीण विद्युतीकरण</title>
      <link>/PressReleasePage.aspx?PRID=12</link>
    </item>
    <item>
      <title>No link here</title>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn harvest_stores_items_and_reports_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hindi.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(HINDI_RSS, "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.xml"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let store = ContentStore::open(&dir.path().join("content.db")).unwrap();
    let harvester = FeedHarvester::new(HarvestConfig::default()).unwrap();

    let urls = vec![
        format!("{}/hindi.xml", server.uri()),
        format!("{}/broken.xml", server.uri()),
    ];
    let report = harvester.harvest(&urls, &store).await.unwrap();

    assert_eq!(report.feeds_ok, 1);
    assert_eq!(report.feeds_failed, 1);
    assert_eq!(report.items_stored, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].0.ends_with("/broken.xml"));
    assert!(report.errors[0].1.contains("HTTP 503"));

    let url = format!("{}/PressReleasePage.aspx?PRID=11", server.uri());
    let stored = store.get_by_url(&url).unwrap().unwrap();
    assert_eq!(stored.item.kind, ContentKind::Rss);
    assert_eq!(stored.item.content_id, "prid-11");
    assert_eq!(stored.item.languages, vec!["hi"]);
    assert_eq!(stored.item.source, "पत्र सूचना कार्यालय");

    let hits = store.search("solar", &["hi".to_string()], None, 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(store.search("solar", &["ta".to_string()], None, 5).unwrap().is_empty());

    // 같은 피드를 다시 수집해도 URL 기준으로 갱신만 된다
    harvester.harvest(&urls[..1], &store).await.unwrap();
    assert_eq!(store.stats().unwrap().total, 2);
}
