use std::time::Duration;

use bharat_connect::content::{ContentKind, ContentStore};
use bharat_connect::diksha::{DikshaConfig, DikshaDiscoveryAgent, DikshaFilters, SystematicPlan};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/api/content/v1/search";

fn item(id: &str, name: &str, grade: &str) -> Value {
    json!({
        "identifier": id,
        "name": name,
        "description": format!("{} for {}", name, grade),
        "board": "CBSE",
        "gradeLevel": [grade],
        "subject": ["Science"],
        "medium": ["Hindi"],
        "language": ["Hindi"],
        "contentType": "Resource",
        "lastUpdatedOn": "2024-05-01T10:00:00.000+0000"
    })
}

fn page(count: u64, content: Vec<Value>) -> Value {
    json!({ "id": "api.content.search", "result": { "count": count, "content": content } })
}

fn agent(server: &MockServer, dir: &TempDir, page_limit: usize) -> DikshaDiscoveryAgent {
    DikshaDiscoveryAgent::new(DikshaConfig {
        base_url: server.uri(),
        page_limit,
        rate_delay: Duration::ZERO,
        retry_unit: Duration::ZERO,
        checkpoint_dir: dir.path().join("diksha"),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn pagination_stops_at_reported_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({"request": {"offset": 0}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            3,
            vec![item("do_1", "Light", "Class 6"), item("do_2", "Sound", "Class 6")],
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({"request": {"offset": 2}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(3, vec![item("do_3", "Heat", "Class 6")])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let mut agent = agent(&server, &dir, 2);
    let filters = DikshaFilters {
        board: Some("CBSE".to_string()),
        grade: Some("Class 6".to_string()),
        ..Default::default()
    };

    let items = agent.discover_with_pagination(&filters, None).await;
    let names: Vec<_> = items.iter().filter_map(|i| i.name.as_deref()).collect();
    assert_eq!(names, vec!["Light", "Sound", "Heat"]);
    assert_eq!(agent.stats().total_requests, 2);
}

#[tokio::test]
async fn max_items_truncates_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            50,
            vec![item("do_1", "Light", "Class 6"), item("do_2", "Sound", "Class 6")],
        )))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let mut agent = agent(&server, &dir, 2);
    let items = agent.discover_with_pagination(&DikshaFilters::default(), Some(3)).await;
    assert_eq!(items.len(), 3);
    assert_eq!(agent.stats().total_requests, 2);
}

#[tokio::test]
async fn rate_limited_request_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1, vec![item("do_9", "Plants", "Class 3")])))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let mut agent = agent(&server, &dir, 100);
    let result = agent.search_content(&DikshaFilters::default(), 100, 0).await;
    assert_eq!(result.count, 1);
    assert_eq!(result.content[0].identifier.as_deref(), Some("do_9"));
    assert_eq!(agent.stats().total_requests, 2);
}

#[tokio::test]
async fn server_error_gives_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let mut agent = agent(&server, &dir, 100);
    let result = agent.search_content(&DikshaFilters::default(), 100, 0).await;
    assert_eq!(result.count, 0);
    assert!(result.content.is_empty());
}

#[tokio::test]
async fn systematic_discovery_checkpoints_and_stores() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({"request": {"filters": {"gradeLevel": ["Class 1"]}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            2,
            vec![item("do_a", "बिजली की कहानी", "Class 1"), item("do_b", "Water cycle", "Class 1")],
        )))
        .mount(&server)
        .await;
    // 그 외 조합은 404 → 빈 결과

    let dir = tempdir().unwrap();
    let mut agent = agent(&server, &dir, 100);

    let skipped = DikshaFilters {
        board: Some("CBSE".to_string()),
        grade: Some("Class 3".to_string()),
        subject: Some("Science".to_string()),
        medium: None,
    };
    let checkpoint_dir = dir.path().join("diksha");
    std::fs::write(checkpoint_dir.join(format!("{}.json", skipped.checkpoint_key())), "{}").unwrap();

    let plan = SystematicPlan {
        boards: vec!["CBSE".to_string()],
        grades: vec!["Class 1".to_string(), "Class 2".to_string(), "Class 3".to_string()],
        subjects: vec!["Science".to_string()],
        mediums: vec![],
        items_per_combination: 10,
    };
    let report = agent.discover_systematic(plan).await.unwrap();

    assert_eq!(report.combinations_total, 3);
    assert_eq!(report.combinations_skipped, 1);
    assert_eq!(report.combinations_tested, 2);
    assert_eq!(report.combinations_with_content, 1);
    assert_eq!(report.total_content, 2);
    assert!(checkpoint_dir.join("CBSE_Class 1_Science_all.json").exists());
    assert!(!checkpoint_dir.join("CBSE_Class 2_Science_all.json").exists());

    let discovered = &agent.discovered()[0];
    assert_eq!(discovered.discovered.as_ref().and_then(|f| f.grade.as_deref()), Some("Class 1"));
    assert_eq!(agent.stats().by_language.get("Hindi"), Some(&2));

    let csv_path = dir.path().join("diksha.csv");
    assert_eq!(agent.export_csv(&csv_path).unwrap(), 2);
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.starts_with("source,content_id,title"));

    let store = ContentStore::open(&dir.path().join("content.db")).unwrap();
    assert_eq!(agent.store_into(&store).unwrap(), 2);

    let stored = store
        .get_by_url("https://diksha.gov.in/play/content/do_a")
        .unwrap()
        .unwrap();
    assert_eq!(stored.item.kind, ContentKind::Diksha);
    assert_eq!(stored.item.languages, vec!["hi"]);
    assert_eq!(stored.item.board.as_deref(), Some("CBSE"));

    let hits = store.search("water", &[], Some(ContentKind::Diksha), 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.title, "Water cycle");
}
