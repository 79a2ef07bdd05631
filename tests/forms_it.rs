use reqwest::Url;
use serde_json::json;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use map_approvalbot::forms::{FormsClient, FormsService};
use map_approvalbot::model::FieldMap;

fn client_for(server: &MockServer) -> FormsClient {
    let base_url = Url::parse(&format!("{}/", server.uri())).unwrap();
    FormsClient::with_base_url("consumer-key".into(), "consumer-secret".into(), base_url)
}

#[tokio::test]
async fn fetch_entry_tolerates_utf8_bom() {
    let server = MockServer::start().await;
    let body = format!(
        "\u{feff}{}",
        json!({ "id": "55", "form_id": "2", "21": "Midtown" })
    );
    Mock::given(method("GET"))
        .and(path("/wp-json/gf/v2/entries/55"))
        .and(basic_auth("consumer-key", "consumer-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let fields: FieldMap = client_for(&server).fetch_entry("55").await.unwrap();
    assert_eq!(fields["21"], "Midtown");
}

#[tokio::test]
async fn fetch_entry_surfaces_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/gf/v2/entries/55"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_entry("55").await.unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn update_entry_reports_backend_status_as_bool() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/wp-json/gf/v2/entries/55"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "55" })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/wp-json/gf/v2/entries/56"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fields = FieldMap::new();
    assert!(client.update_entry("55", &fields).await.unwrap());
    assert!(!client.update_entry("56", &fields).await.unwrap());
}

#[tokio::test]
async fn trash_entry_uses_http_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/wp-json/gf/v2/entries/55"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "trash" })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client_for(&server).trash_entry("55").await.unwrap());
}

#[tokio::test]
async fn unapproved_count_sends_the_pending_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/gf/v2/forms/2/entries"))
        .and(query_param(
            "search",
            r#"{"field_filters": [{"key":"is_approved","value":3,"operator":"="}]}"#,
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "total_count": 3, "entries": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).unapproved_count("2").await.unwrap(), 3);
}

#[tokio::test]
async fn unapproved_count_accepts_string_totals() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/gf/v2/forms/5/entries"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "total_count": "12", "entries": [] })),
        )
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).unapproved_count("5").await.unwrap(), 12);
}
