//! Tests for the config loader module.

use std::fs;

use reqsched_core::HttpMethod;
use reqsched_template::TemplateEngine;
use tempfile::TempDir;

use super::*;
use crate::schedule::ScheduleEngine;

const VALID_YAML: &str = r#"
seed: 42
variables:
  tenant: acme
  port: 8080
requests:
  - name: create-order
    schedule:
      template: "{{ addMinutes 15 now | unix }}"
      jitter: "±30s"
    http:
      method: POST
      url: "https://{{ .Variables.tenant }}.example.com/orders"
      headers:
        Authorization: "Bearer {{ env \"API_TOKEN\" }}"
      body:
        id: "{{ uuid }}"
        qty: 2
        at:
          template: "{{ now | unix }}"
          type: integer
  - name: heartbeat
    schedule:
      cron: "*/5 * * * *"
    http:
      method: get
      url: https://example.com/health
"#;

fn loader() -> ConfigLoader {
    ConfigLoader::new(ScheduleEngine::with_cron(TemplateEngine::default()))
}

fn write(dir: &TempDir, file: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn loads_yaml_file() {
    let dir = TempDir::new().expect("create tempdir");
    let path = write(&dir, "requests.yaml", VALID_YAML);

    let loaded = loader().load_file(&path).unwrap();
    assert_eq!(loaded.requests.len(), 2);
    assert_eq!(loaded.requests[0].name, "create-order");
    assert_eq!(loaded.requests[1].http.method, HttpMethod::Get);
    assert_eq!(loaded.seed, Some(42));
    assert_eq!(loaded.variables["tenant"], "acme");
    assert_eq!(loaded.variables["port"], "8080");
    assert_eq!(loaded.rejected().count(), 0);
}

#[test]
fn loads_json_file() {
    let dir = TempDir::new().expect("create tempdir");
    let json = r#"{
        "requests": [{
            "name": "ping",
            "schedule": {"relative": "5m"},
            "http": {"method": "GET", "url": "https://example.com/ping"}
        }]
    }"#;
    let path = write(&dir, "requests.JSON", json);

    let loaded = loader().load_file(&path).unwrap();
    assert_eq!(loaded.requests.len(), 1);
    assert_eq!(loaded.seed, None);
    assert!(loaded.variables.is_empty());
}

#[test]
fn unsupported_extension_rejected() {
    let dir = TempDir::new().expect("create tempdir");
    let path = write(&dir, "requests.toml", "requests = []");
    assert!(matches!(
        loader().load_file(&path),
        Err(LoadError::UnsupportedExtension { ref extension }) if extension == "toml"
    ));
}

#[test]
fn missing_file_is_io_error() {
    let dir = TempDir::new().expect("create tempdir");
    let err = loader().load_file(&dir.path().join("absent.yml")).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn malformed_yaml_is_parse_error() {
    assert!(matches!(
        loader().load_yaml("requests: [unclosed"),
        Err(LoadError::Yaml(_))
    ));
    assert!(matches!(loader().load_json("{"), Err(LoadError::Json(_))));
}

#[test]
fn invalid_entries_are_skipped_and_reported() {
    let yaml = r#"
requests:
  - name: good
    schedule: { epoch: 1700000000 }
    http: { method: GET, url: "https://example.com" }
  - name: bad-method
    schedule: { epoch: 1700000000 }
    http: { method: FETCH, url: "https://example.com" }
  - name: two-schedules
    schedule: { epoch: 1700000000, relative: 5m }
    http: { method: GET, url: "https://example.com" }
  - name: bad-cron
    schedule: { cron: "not a cron" }
    http: { method: GET, url: "https://example.com" }
  - name: bad-template
    schedule: { relative: 1m }
    http: { method: GET, url: "https://example.com/{{ nope }}" }
  - schedule: { relative: 1m }
    http: { method: GET, url: "https://example.com" }
  - name: good
    schedule: { relative: 1m }
    http: { method: GET, url: "https://example.com" }
"#;
    let loaded = loader().load_yaml(yaml).unwrap();
    assert_eq!(loaded.requests.len(), 1);
    assert_eq!(loaded.results.len(), 7);

    let rejected: Vec<_> = loaded.rejected().map(|r| r.index).collect();
    assert_eq!(rejected, vec![1, 2, 3, 4, 5, 6]);

    let by_index = |i: usize| match &loaded.results[i].status {
        LoadStatus::Rejected { error } => error.clone(),
        LoadStatus::Loaded => String::new(),
    };
    assert!(by_index(1).contains("FETCH"));
    assert!(by_index(2).contains("exactly one"));
    assert!(by_index(3).contains("cron"));
    assert!(by_index(4).contains("http.url"));
    assert!(by_index(6).contains("duplicate"));
    assert_eq!(loaded.results[5].name, None);
}

#[test]
fn no_valid_requests_is_empty_error() {
    assert!(matches!(
        loader().load_yaml("requests: []"),
        Err(LoadError::Empty { rejected: 0 })
    ));

    let yaml = r#"
requests:
  - name: ""
    schedule: { relative: 1m }
    http: { method: GET, url: "https://example.com" }
"#;
    assert!(matches!(
        loader().load_yaml(yaml),
        Err(LoadError::Empty { rejected: 1 })
    ));
}

#[test]
fn body_templates_are_checked_not_run() {
    let yaml = r#"
requests:
  - name: bad-body
    schedule: { relative: 1m }
    http:
      method: POST
      url: https://example.com
      body:
        items:
          - ok
          - "{{ bogus }}"
  - name: counted
    schedule: { relative: 1m }
    http:
      method: POST
      url: https://example.com
      body: { n: "{{ seq }}" }
"#;
    let engine = TemplateEngine::default();
    let loader = ConfigLoader::new(ScheduleEngine::with_cron(engine.clone()));
    let loaded = loader.load_yaml(yaml).unwrap();

    match &loaded.results[0].status {
        LoadStatus::Rejected { error } => assert!(error.contains("http.body.items[1]")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(engine.context().current_sequence(), 0);
}
