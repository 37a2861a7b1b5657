use std::sync::Arc;

use anyhow::Result as AnyResult;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Recorded {
    method: Method,
    path: String,
    query: String,
    admin_key: Option<String>,
    body: String,
}

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl ServerState {
    async fn last(&self) -> Recorded {
        self.requests
            .lock()
            .await
            .last()
            .cloned()
            .expect("at least one request")
    }
}

async fn backend_handler(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let admin_key = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.requests.lock().await.push(Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        admin_key: admin_key.clone(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    match (method.as_str(), uri.path()) {
        ("GET", "/api/stats") => Json(json!({
            "total_users": 5,
            "total_orders": 3,
            "paid_orders": 2,
            "total_revenue": 37.5,
            "total_profit": null,
            "total_labels": 2
        }))
        .into_response(),
        ("GET", "/api/orders") => Json(json!([{
            "id": "3f9c2a7e-0000-4000-8000-000000000001",
            "address_from": {"name": "Sender", "street": "1 Main St", "city": "Austin",
                             "state": "TX", "zip": "73301", "country": "US"},
            "address_to": null,
            "amount": 12.5,
            "payment_status": "paid",
            "shipping_status": "label_created",
            "refund_status": null,
            "tracking_number": "1Z999",
            "carrier": "ups",
            "label_id": "lbl-1",
            "created_at": "2024-03-01T10:15:00"
        }]))
        .into_response(),
        ("POST", "/api/orders") => Json(json!({
            "order_id": "ord-9",
            "amount": 18.4,
            "currency": "USD",
            "payment_url": "https://pay.example/ord-9"
        }))
        .into_response(),
        ("GET", "/api/orders/search") => Json(json!([])).into_response(),
        ("GET", "/api/stats/expenses") => Json(json!({
            "total_expense": 10.0,
            "labels_count": 2,
            "today_expense": 0.0,
            "today_labels": 0,
            "date_from": "2024-01-01",
            "date_to": "2024-01-31"
        }))
        .into_response(),
        ("GET", "/api/orders/export/csv") => (
            StatusCode::OK,
            [
                ("content-type", "text/csv; charset=utf-8"),
                ("content-disposition", "attachment; filename=\"orders_paid.csv\""),
            ],
            "id,amount\n1,12.5\n",
        )
            .into_response(),
        ("POST", "/api/users/42/balance/deduct") => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Insufficient balance"})),
        )
            .into_response(),
        ("POST", path) if path.starts_with("/api/users/") || path.starts_with("/api/orders/") => {
            Json(json!({"status": "success", "new_balance": 999.0})).into_response()
        }
        ("GET", "/api/users/7/details") => {
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response()
        }
        ("GET", "/api/bot/logs") => Json(json!({
            "logs": "2024-03-01 INFO started\n\n2024-03-01 ERROR webhook failed\n"
        }))
        .into_response(),
        ("POST", "/api/bot/restart") => match admin_key.as_deref() {
            Some("secret") => {
                Json(json!({"status": "restarting", "message": "Restart scheduled"}))
                    .into_response()
            }
            _ => (
                StatusCode::FORBIDDEN,
                Json(json!({"detail": "Invalid admin key"})),
            )
                .into_response(),
        },
        _ => (StatusCode::NOT_FOUND, Json(json!({"detail": "Not Found"}))).into_response(),
    }
}

async fn spawn_backend() -> AnyResult<(HttpBackend, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .fallback(backend_handler)
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let backend = HttpBackend::with_timeout(&format!("http://{addr}/api"), Duration::from_secs(5))?;
    Ok((backend, state))
}

#[test]
fn base_url_must_be_http() {
    for raw in ["not a url", "ftp://example.com/api", "mailto:admin@example.com"] {
        let err = HttpBackend::new(raw).err().expect("rejected");
        assert!(
            matches!(err, DashboardError::InvalidBaseUrl { .. }),
            "{raw}: {err}"
        );
        assert!(err.is_local());
    }
    let backend = HttpBackend::new(" https://admin.example.com/api/ ").expect("valid");
    assert_eq!(backend.base_url(), "https://admin.example.com/api/");
}

#[tokio::test]
async fn overview_resources_decode_leniently() {
    let (backend, server) = spawn_backend().await.expect("spawn server");

    let stats = backend.fetch_stats().await.expect("stats");
    assert_eq!(stats.total_users, 5);
    assert_eq!(stats.total_profit, 0.0);
    assert_eq!(server.last().await.path, "/api/stats");

    let orders = backend.fetch_orders().await.expect("orders");
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.short_id(), "3f9c2a7e");
    assert_eq!(order.address_from.street1, "1 Main St");
    assert_eq!(order.address_to, Default::default());
    assert!(order.refund_available());
    assert!(order.created_at.is_some());
}

#[tokio::test]
async fn expense_range_travels_as_query_parameters() {
    let (backend, server) = spawn_backend().await.expect("spawn server");
    let range = ExpenseRange::new(
        NaiveDate::from_ymd_opt(2024, 1, 1),
        NaiveDate::from_ymd_opt(2024, 1, 31),
    )
    .expect("range");

    let expenses = backend.fetch_expenses(&range).await.expect("expenses");
    assert_eq!(expenses.labels_count, 2);
    assert_eq!(
        server.last().await.query,
        "date_from=2024-01-01&date_to=2024-01-31"
    );

    backend
        .fetch_expenses(&ExpenseRange::default())
        .await
        .expect("unbounded");
    assert_eq!(server.last().await.query, "");
}

#[tokio::test]
async fn commands_send_parameters_in_query_string() {
    let (backend, server) = spawn_backend().await.expect("spawn server");

    let ack = backend
        .add_balance(TelegramId(42), 10.5)
        .await
        .expect("add balance");
    assert_eq!(ack.status.as_deref(), Some("success"));
    let request = server.last().await;
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/api/users/42/balance/add");
    assert_eq!(request.query, "amount=10.5");
    assert_eq!(request.admin_key, None);

    backend
        .set_discount(TelegramId(42), 15)
        .await
        .expect("discount");
    assert_eq!(server.last().await.query, "discount=15");

    backend
        .refund_order(&OrderId::from("ord 1"), Some("duplicate"))
        .await
        .expect("refund");
    let request = server.last().await;
    assert_eq!(request.path, "/api/orders/ord%201/refund");
    assert_eq!(request.query, "refund_reason=duplicate");

    backend
        .block_user(TelegramId(42), None)
        .await
        .expect("block");
    let request = server.last().await;
    assert_eq!(request.path, "/api/users/42/block");
    assert_eq!(request.query, "");

    backend
        .search_orders("1Z999", Some(PaymentStatus::Pending))
        .await
        .expect("search");
    assert_eq!(
        server.last().await.query,
        "query=1Z999&payment_status=pending"
    );
}

#[tokio::test]
async fn create_order_posts_json_body() {
    let (backend, server) = spawn_backend().await.expect("spawn server");
    let order = NewOrder {
        telegram_id: TelegramId(42),
        address_from: Default::default(),
        address_to: Default::default(),
        parcel: Default::default(),
        amount: 18.4,
    };

    let created = backend.create_order(&order).await.expect("create order");
    assert_eq!(created.order_id, Some(OrderId::from("ord-9")));
    assert_eq!(created.payment_url.as_deref(), Some("https://pay.example/ord-9"));

    let request = server.last().await;
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/api/orders");
    assert_eq!(request.query, "");
    let body: serde_json::Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(body["telegram_id"], json!(42));
    assert_eq!(body["amount"], json!(18.4));
    assert_eq!(body["parcel"]["mass_unit"], json!("lb"));
}

#[tokio::test]
async fn error_detail_becomes_server_message() {
    let (backend, _server) = spawn_backend().await.expect("spawn server");

    let err = backend
        .deduct_balance(TelegramId(42), 500.0)
        .await
        .expect_err("rejected");
    match err {
        DashboardError::Server {
            status, message, ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(message.as_deref(), Some("Insufficient balance"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = backend
        .fetch_user_details(TelegramId(7))
        .await
        .expect_err("server error");
    assert!(matches!(
        err,
        DashboardError::Server {
            status: 500,
            message: None,
            ..
        }
    ));
    assert_eq!(
        err.notification_text("Failed to load user details"),
        "Failed to load user details"
    );
}

#[tokio::test]
async fn export_keeps_server_filename_and_content_type() {
    let (backend, server) = spawn_backend().await.expect("spawn server");

    let download = backend
        .export_orders_csv(Some(PaymentStatus::Paid))
        .await
        .expect("export");

    assert_eq!(server.last().await.query, "payment_status=paid");
    assert_eq!(download.suggested_name.as_deref(), Some("orders_paid.csv"));
    assert_eq!(
        download.content_type.as_deref(),
        Some("text/csv; charset=utf-8")
    );
    assert_eq!(download.bytes, b"id,amount\n1,12.5\n");
}

#[tokio::test]
async fn raw_log_dump_is_split_into_entries() {
    let (backend, server) = spawn_backend().await.expect("spawn server");

    let logs = backend.bot_logs(5).await.expect("logs");

    assert_eq!(server.last().await.query, "limit=5");
    assert_eq!(logs.logs.len(), 2);
    assert_eq!(logs.logs[0].level, "INFO");
    assert_eq!(logs.logs[1].level, "ERROR");
}

#[tokio::test]
async fn restart_carries_admin_key_header() {
    let (backend, server) = spawn_backend().await.expect("spawn server");

    let ack = backend.restart_bot("secret").await.expect("restart");
    assert_eq!(ack.message.as_deref(), Some("Restart scheduled"));
    let request = server.last().await;
    assert_eq!(request.path, "/api/bot/restart");
    assert_eq!(request.admin_key.as_deref(), Some("secret"));

    let err = backend.restart_bot("wrong").await.expect_err("forbidden");
    assert_eq!(err.notification_text("Failed to restart bot"), "Invalid admin key");
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = HttpBackend::with_timeout(&format!("http://{addr}/api"), Duration::from_secs(2))
        .expect("backend");
    let err = backend.fetch_stats().await.expect_err("nothing listening");

    assert!(matches!(err, DashboardError::Transport { .. }));
    assert!(!err.is_local());
    assert_eq!(err.notification_text("Failed to load data"), "Failed to load data");
}
