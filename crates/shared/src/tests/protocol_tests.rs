use serde_json::json;

use super::*;

#[test]
fn order_tolerates_nulls_and_naive_timestamps() {
    let order: Order = serde_json::from_value(json!({
        "id": "3f2a9c71-5b0e-4e55-a1c2-9d1b6c2f0e11",
        "address_from": {
            "name": "Ann", "street1": "1 Main", "city": "Austin",
            "state": "TX", "zip": "73301", "country": "US"
        },
        "address_to": {
            "name": "Bob", "street1": "2 Side", "city": "Boston",
            "state": "MA", "zip": "02101", "country": "US", "phone": null
        },
        "amount": 42.5,
        "payment_status": "paid",
        "shipping_status": "label_created",
        "refund_status": null,
        "tracking_number": "1Z999",
        "carrier": "UPS",
        "created_at": "2024-06-01T12:30:00.000123"
    }))
    .expect("decode order");

    assert_eq!(order.refund_status, RefundStatus::NotRefunded);
    assert!(order.refund_available());
    assert_eq!(order.short_id(), "3f2a9c71");
    assert_eq!(order.address_to.city, "Boston");
    assert!(order.created_at.is_some());
}

#[test]
fn refunded_or_unpaid_orders_do_not_offer_refund() {
    let refunded: Order = serde_json::from_value(json!({
        "id": "a1", "amount": 10.0, "payment_status": "paid", "refund_status": "refunded"
    }))
    .expect("decode");
    assert!(refunded.is_refunded());
    assert!(!refunded.refund_available());

    let pending: Order = serde_json::from_value(json!({
        "id": "a2", "amount": 10.0, "payment_status": "pending"
    }))
    .expect("decode");
    assert!(!pending.refund_available());

    let odd: Order = serde_json::from_value(json!({
        "id": "a3", "amount": 10.0, "payment_status": "expired"
    }))
    .expect("decode");
    assert_eq!(odd.payment_status, PaymentStatus::Unknown);
}

#[test]
fn leaderboard_accepts_orders_count_alias() {
    let entry: LeaderboardEntry = serde_json::from_value(json!({
        "telegram_id": 77,
        "first_name": "Kim",
        "username": null,
        "orders_count": 12,
        "balance": 3.5
    }))
    .expect("decode");
    assert_eq!(entry.telegram_id, TelegramId(77));
    assert_eq!(entry.total_orders, 12);
    assert_eq!(entry.balance, Some(3.5));
}

#[test]
fn tracking_falls_back_to_grey_for_unknown_colors() {
    let info: TrackingInfo = serde_json::from_value(json!({
        "tracking_number": "9400",
        "carrier": "USPS",
        "progress": 40,
        "progress_color": "purple",
        "status_name": "In transit",
        "tracking_events": [
            {"status": "PRE_TRANSIT", "status_date": "2024-06-01T08:00:00Z"},
            {"status": "TRANSIT", "location": "Memphis, TN"}
        ]
    }))
    .expect("decode");
    assert_eq!(info.progress_color, ProgressColor::Grey);
    assert_eq!(info.tracking_events.len(), 2);
    assert_eq!(info.tracking_events[0].status, "PRE_TRANSIT");
}

#[test]
fn bot_logs_accept_structured_and_raw_payloads() {
    let structured: BotLogs = serde_json::from_value(json!({
        "logs": [{
            "level": "ERROR",
            "category": "security",
            "timestamp": "12:00",
            "message": "blocked flood"
        }]
    }))
    .expect("structured");
    assert_eq!(structured.logs.len(), 1);
    assert_eq!(structured.logs[0].category, "security");

    let raw: BotLogs = serde_json::from_value(json!({
        "logs": "INFO started\n\nERROR webhook failed\n",
        "lines": 50
    }))
    .expect("raw");
    assert_eq!(raw.logs.len(), 2);
    assert_eq!(raw.logs[1].level, "ERROR");
}

#[test]
fn metrics_keep_unknown_fields() {
    let metrics: BotMetrics = serde_json::from_value(json!({
        "total_users": 5,
        "pending_orders": 1,
        "revenue": {"total": 120.0, "average_order": 24.0},
        "uptime_seconds": 3600
    }))
    .expect("decode");
    assert_eq!(metrics.total_users, Some(5));
    assert_eq!(metrics.revenue.map(|r| r.average_order), Some(24.0));
    assert_eq!(metrics.extra.get("uptime_seconds"), Some(&json!(3600)));
}

#[test]
fn new_order_body_matches_backend_fields() {
    let body = serde_json::to_value(NewOrder {
        telegram_id: TelegramId(42),
        address_from: Address {
            name: "Ann".to_string(),
            street1: "1 Main".to_string(),
            country: "US".to_string(),
            ..Address::default()
        },
        address_to: Address::default(),
        parcel: Parcel::default(),
        amount: 12.5,
    })
    .expect("encode");

    assert_eq!(body["telegram_id"], json!(42));
    assert_eq!(body["amount"], json!(12.5));
    assert_eq!(body["address_from"]["street1"], json!("1 Main"));
    assert!(body["address_from"].get("street2").is_none());
    assert_eq!(
        body["parcel"],
        json!({
            "length": 5.0, "width": 5.0, "height": 5.0, "weight": 2.0,
            "distance_unit": "in", "mass_unit": "lb"
        })
    );

    let created: OrderCreated = serde_json::from_value(json!({
        "order_id": "ord-9",
        "amount": 12.5,
        "currency": "USD",
        "payment_url": "https://pay.example/ord-9"
    }))
    .expect("decode created");
    assert_eq!(created.order_id, Some(OrderId::from("ord-9")));
    assert_eq!(created.payment_url.as_deref(), Some("https://pay.example/ord-9"));
}
