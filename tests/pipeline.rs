use std::process::Command;

use serde_json::{json, Value};
use svc_principals::config::Config;
use svc_principals::merge::Source;
use svc_principals::process::process_site;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POLICY_SCRIPT: &str = r#"var app=app||{};app.PolicyEditorConfig={"serviceMap":{"AWS Lambda":{"StringPrefix":"lambda","name":"AWS Lambda"},"Amazon S3":{"StringPrefix":"s3","name":"Amazon S3"}}};"#;

fn config_for(server: &MockServer, snippets: &std::path::Path) -> Config {
    Config {
        snippets_dir: snippets.to_path_buf(),
        docs_base_url: format!("{}/guide/", server.uri()),
        services_page: "services.html".into(),
        policy_generator_url: format!("{}/js/policies.js", server.uri()),
        retry_delay_ms: 10,
        timeout_secs: 5,
        ..Config::default()
    }
}

async fn mount(server: &MockServer, at: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn empty_sources_write_an_empty_object() {
    let server = MockServer::start().await;
    mount(&server, "/guide/services.html", "<html><body><p>No table</p></body></html>").await;
    mount(&server, "/js/policies.js", "app.PolicyEditorConfig={\"serviceMap\":{}}").await;

    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, &dir.path().join("snippets"));
    let report = process_site(&config).await.unwrap();

    assert!(report.merged.is_empty());
    assert_eq!(report.summary.total, 0);
    assert_eq!(std::fs::read_to_string(report.output_path).unwrap(), "{}");
}

#[tokio::test]
async fn documentation_and_policy_generator_are_merged() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/guide/services.html",
        r#"<table>
  <tr><th>Service</th><th>a</th><th>b</th><th>c</th><th>d</th><th>e</th><th>SLR</th></tr>
  <tr><td>AWS Lambda</td><td>Yes</td><td>Yes</td><td>Yes</td><td>Yes</td><td>Yes</td><td><a href="lambda-slr.html">Yes</a></td></tr>
  <tr><td>AWS Step Functions</td><td>Yes</td><td>Yes</td><td>Yes</td><td>Yes</td><td>Yes</td><td><a href="states-slr.html">Yes</a></td></tr>
</table>"#,
    )
    .await;
    mount(
        &server,
        "/guide/lambda-slr.html",
        "<p>Lambda uses the service principal lambda.amazonaws.com to assume the role.</p>",
    )
    .await;
    mount(
        &server,
        "/guide/states-slr.html",
        "<h1>Step Functions</h1><p>The role trusts the <code>states.amazonaws.com</code> service.</p>",
    )
    .await;
    mount(&server, "/js/policies.js", POLICY_SCRIPT).await;

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        output_file: "principals.json".into(),
        ..config_for(&server, &dir.path().join("snippets"))
    };
    let report = process_site(&config).await.unwrap();

    assert_eq!(report.output_path, dir.path().join("snippets").join("principals.json"));
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.documentation_only, 1);
    assert_eq!(report.summary.policy_generator_only, 1);
    assert_eq!(report.summary.both, 1);
    assert_eq!(
        report.merged["lambda"].sources,
        vec![Source::Documentation, Source::PolicyGenerator]
    );

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(&report.output_path).unwrap()).unwrap();
    let uri = server.uri();
    assert_eq!(
        written,
        json!({
            "lambda": {
                "originalNames": ["lambda", "AWS Lambda"],
                "reference_url": format!("{uri}/guide/lambda-slr.html"),
                "servicePrincipal": "lambda.amazonaws.com",
                "sources": ["documentation", "policy_generator"]
            },
            "s3": {
                "originalNames": ["Amazon S3"],
                "reference_url": format!("{uri}/js/policies.js"),
                "servicePrincipal": "s3.amazonaws.com",
                "sources": ["policy_generator"]
            },
            "states": {
                "originalNames": ["stepfunctions"],
                "reference_url": format!("{uri}/guide/states-slr.html"),
                "servicePrincipal": "states.amazonaws.com",
                "sources": ["documentation"]
            }
        })
    );
}

#[tokio::test]
async fn unreachable_policy_generator_is_not_fatal() {
    let server = MockServer::start().await;
    mount(&server, "/guide/services.html", "<table><tr><th>Service</th></tr></table>").await;
    Mock::given(method("GET"))
        .and(path("/js/policies.js"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let report = process_site(&config_for(&server, dir.path())).await.unwrap();
    assert!(report.merged.is_empty());
}

#[test]
fn suggest_prints_catalog_inside_principal_block() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("service-principals.json");
    std::fs::write(
        &catalog,
        r#"{"sns": {"originalNames": ["Amazon SNS"], "reference_url": "u", "servicePrincipal": "sns.amazonaws.com", "sources": ["policy_generator"]}}"#,
    )
    .unwrap();
    let policy = dir.path().join("policy.json");
    std::fs::write(&policy, "{\n  \"Principal\": {\n    \"Service\": \"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_svc-principals"))
        .arg("suggest")
        .arg(&policy)
        .args(["--line", "2", "--column", "16"])
        .arg("--catalog")
        .arg(&catalog)
        .output()
        .expect("failed to run suggest");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "sns.amazonaws.com\n");
}
