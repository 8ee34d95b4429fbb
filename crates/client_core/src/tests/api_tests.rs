use axum::{
    extract::State,
    http::{HeaderMap, Method as HttpMethod, StatusCode, Uri},
    Router,
};
use chrono::{NaiveDate, TimeZone, Utc};
use shared::{
    domain::{InvoiceStatus, NotificationId, PatientId, Role, UserId},
    error::ErrorCode,
    protocol::{AuthResponse, UserSnapshot, UserUpsert},
};
use storage::Storage;
use tokio::{net::TcpListener, sync::Mutex};

use super::*;
use crate::session::SessionContext;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    authorization: Option<String>,
    body: String,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

async fn handle_any(
    State(state): State<MockState>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let query = uri
        .query()
        .map(|raw| {
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(name, value)| (name.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default();
    state.requests.lock().await.push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        authorization: headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
    });

    match (method.as_str(), uri.path()) {
        ("GET", "/api/v1/notifications") => (
            StatusCode::OK,
            r#"{"content":[{"id":1,"title":"Welcome","message":"hello","read":false,"type":"SYSTEM_NOTIFICATION"}],
                "totalElements":11,"totalPages":2,"size":10,"number":0}"#
                .to_string(),
        ),
        ("GET", "/api/v1/notifications/unread/count") => (StatusCode::OK, "3".to_string()),
        ("GET", "/api/v1/patients/404") => (
            StatusCode::NOT_FOUND,
            r#"{"status":404,"error":"Not Found","message":"Patient not found"}"#.to_string(),
        ),
        ("GET", "/api/v1/admin/dashboard/stats") => (StatusCode::FORBIDDEN, String::new()),
        ("GET", "/api/v1/doctor/dashboard/stats") => {
            (StatusCode::SERVICE_UNAVAILABLE, "upstream down".to_string())
        }
        ("GET", "/api/v1/admin/dashboard/weekly-appointments") => {
            (StatusCode::OK, r#"{"Mon":2,"Tue":0}"#.to_string())
        }
        ("POST", _) => (StatusCode::OK, String::new()),
        _ => (StatusCode::OK, "[]".to_string()),
    }
}

async fn spawn_api_server() -> (String, MockState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = MockState::default();
    let app = Router::new().fallback(handle_any).with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/api/v1"), state)
}

async fn api_client(base: &str, token: Option<&str>) -> ApiClient {
    let storage = Storage::new("sqlite::memory:").await.expect("storage");
    let session = SessionContext::restore(Client::new(), base, storage)
        .await
        .expect("session");
    if let Some(token) = token {
        session
            .begin(AuthResponse {
                token: token.to_string(),
                user: UserSnapshot {
                    id: UserId(1),
                    email: "admin@clinic.test".into(),
                    first_name: "Ari".into(),
                    last_name: "Admin".into(),
                    role: Role::Admin,
                },
            })
            .await
            .expect("begin");
    }
    ApiClient::new(Client::new(), session)
}

fn query_value<'a>(request: &'a Recorded, name: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

#[tokio::test]
async fn bearer_token_goes_only_to_the_api_base() {
    let (base, state) = spawn_api_server().await;
    let api = api_client(&base, Some("tok-1")).await;

    assert_eq!(api.unread_notification_count().await.expect("count"), 3);

    let requests = state.requests.lock().await;
    assert_eq!(requests[0].path, "/api/v1/notifications/unread/count");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok-1"));
    drop(requests);

    assert!(api.should_attach_token(&format!("{base}/patients")));
    assert!(!api.should_attach_token("https://maps.example.com/tiles"));
}

#[tokio::test]
async fn anonymous_requests_carry_no_authorization() {
    let (base, state) = spawn_api_server().await;
    let api = api_client(&base, None).await;

    api.patients().await.expect("patients");
    assert!(state.requests.lock().await[0].authorization.is_none());
}

#[tokio::test]
async fn notification_pages_are_zero_based_and_newest_first() {
    let (base, state) = spawn_api_server().await;
    let api = api_client(&base, Some("tok")).await;

    let page = api.notifications_page(1, 10).await.expect("page");
    assert_eq!(page.total(), 11);
    let items = page.into_items();
    assert_eq!(items[0].id, Some(NotificationId(1)));
    assert_eq!(items[0].title, "Welcome");

    let requests = state.requests.lock().await;
    assert_eq!(query_value(&requests[0], "page"), Some("0"));
    assert_eq!(query_value(&requests[0], "size"), Some("10"));
    assert_eq!(query_value(&requests[0], "sort"), Some("createdAt,desc"));
}

#[tokio::test]
async fn read_actions_post_to_the_record_endpoints() {
    let (base, state) = spawn_api_server().await;
    let api = api_client(&base, Some("tok")).await;

    api.mark_notification_read(NotificationId(7)).await.expect("read");
    api.mark_all_notifications_read().await.expect("read all");
    api.send_test_notification("nurse@clinic.test").await.expect("test push");

    let requests = state.requests.lock().await;
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/api/v1/notifications/7/read");
    assert_eq!(requests[0].body, "{}");
    assert_eq!(requests[1].path, "/api/v1/notifications/read-all");
    assert_eq!(requests[2].path, "/api/v1/notifications/test-notification");
    assert_eq!(
        query_value(&requests[2], "recipientEmail"),
        Some("nurse@clinic.test")
    );
}

#[tokio::test]
async fn error_statuses_map_onto_client_errors() {
    let (base, _state) = spawn_api_server().await;
    let api = api_client(&base, Some("tok")).await;

    let err = api.patient(PatientId(404)).await.expect_err("missing");
    match &err {
        ClientError::NotFound(detail) => assert_eq!(detail, "Patient not found"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = api.admin_stats().await.expect_err("forbidden");
    assert!(matches!(err, ClientError::Forbidden(_)));
    assert_eq!(
        err.user_message(),
        "Access denied: you do not have permission to perform this action."
    );

    let err = api.doctor_stats().await.expect_err("unavailable");
    assert!(matches!(err, ClientError::Server { status: 503, .. }));
    assert_eq!(err.code(), ErrorCode::Network);
}

#[tokio::test]
async fn create_user_without_password_sends_nothing() {
    let (base, state) = spawn_api_server().await;
    let api = api_client(&base, Some("tok")).await;
    let mut user = UserUpsert {
        username: None,
        email: "new@clinic.test".into(),
        first_name: "New".into(),
        last_name: "Hire".into(),
        password: None,
        role: Role::Secretary,
    };

    let err = api.create_user(&user).await.expect_err("no password");
    assert!(matches!(err, ClientError::Validation(_)));
    user.password = Some("   ".into());
    assert!(api.create_user(&user).await.is_err());

    assert!(state.requests.lock().await.is_empty());
}

#[tokio::test]
async fn optional_filters_are_only_sent_when_set() {
    let (base, state) = spawn_api_server().await;
    let api = api_client(&base, Some("tok")).await;

    api.invoices(Some(PatientId(4)), Some(InvoiceStatus::Paid))
        .await
        .expect("filtered");
    api.invoices(None, None).await.expect("unfiltered");
    api.users(Some(Role::Doctor)).await.expect("doctors");

    let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 3, 8, 9, 0, 0).unwrap();
    api.appointments_between(start, end).await.expect("range");

    let week = api
        .weekly_appointments(NaiveDate::from_ymd_opt(2025, 3, 3))
        .await
        .expect("week");
    assert_eq!(week.get("Mon"), Some(&2));

    let requests = state.requests.lock().await;
    assert_eq!(query_value(&requests[0], "patientId"), Some("4"));
    assert_eq!(query_value(&requests[0], "status"), Some("PAID"));
    assert!(requests[1].query.is_empty());
    assert_eq!(requests[2].path, "/api/v1/admin/users");
    assert_eq!(query_value(&requests[2], "role"), Some("DOCTOR"));
    assert_eq!(query_value(&requests[3], "start"), Some("2025-03-01T09:00:00.000Z"));
    assert_eq!(query_value(&requests[3], "end"), Some("2025-03-08T09:00:00.000Z"));
    assert_eq!(query_value(&requests[4], "startDate"), Some("2025-03-03"));
}
