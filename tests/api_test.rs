mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{call, get, test_app, test_app_with, ADMIN, AVPN, CIPT};

fn count_for(rows: &Value, key: &str, field: &str, value_field: &str) -> Option<u64> {
    rows.as_array()?
        .iter()
        .find(|r| r[field] == key)
        .and_then(|r| r[value_field].as_u64())
}

#[tokio::test]
async fn health_reports_row_count() {
    // ---
    let t = test_app();
    let (status, body) = call(&t.app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rows"], 6);
}

#[tokio::test]
async fn health_degrades_when_source_disappears() {
    // ---
    let t = test_app();
    std::fs::remove_file(t.dir.path().join("readings.csv")).unwrap();

    let (status, body) = call(&t.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn requests_without_credentials_are_rejected() {
    // ---
    let t = test_app();
    let (status, _) = call(&t.app, Method::GET, "/api/kpis", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&t.app, "/api/kpis", ("admin", "nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn kpis_for_admin_cover_everything() {
    // ---
    let t = test_app();
    let (status, body) = get(&t.app, "/api/kpis", ADMIN).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reading_count"], 6);
    assert_eq!(body["device_count"], 3);
    assert_eq!(body["farmer_count"], 3);
    assert_eq!(body["fixed_device_count"], 1);
    assert_eq!(body["portable_device_count"], 2);
    let pct = body["completeness_pct"].as_f64().unwrap();
    assert!((pct - 500.0 / 6.0).abs() < 1e-9);
    assert!(body["last_ingest_label"].as_str().unwrap().ends_with("IST"));
}

#[tokio::test]
async fn client_scope_cannot_be_widened() {
    // ---
    let t = test_app();
    let (status, body) = get(&t.app, "/api/kpis?client=CIPT,AVPN", AVPN).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reading_count"], 4);
    assert_eq!(body["device_count"], 2);
    assert_eq!(body["completeness_pct"], 100.0);

    let (_, options) = get(&t.app, "/api/options", AVPN).await;
    assert_eq!(options["clients"], json!(["AVPN"]));
    assert_eq!(options["devices"], json!(["D1", "D2"]));
}

#[tokio::test]
async fn categorical_filters_narrow_rows() {
    // ---
    let t = test_app();
    let (_, body) = get(&t.app, "/api/kpis?district=Pune,Satara", ADMIN).await;
    assert_eq!(body["reading_count"], 4);

    let (_, body) = get(&t.app, "/api/kpis?district=", ADMIN).await;
    assert_eq!(body["reading_count"], 6);
}

#[tokio::test]
async fn date_range_validation() {
    // ---
    let t = test_app();
    let (status, _) = get(&t.app, "/api/kpis?start=2025-01-01", ADMIN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&t.app, "/api/kpis?start=2000-01-02&end=2000-01-01", ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reading_count"], 0);
    assert_eq!(body["last_ingest_label"], "—");
}

#[tokio::test]
async fn status_counts_by_recency() {
    // ---
    let t = test_app();
    let (status, body) = get(&t.app, "/api/status", ADMIN).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(count_for(&body, "Online", "status", "device_count"), Some(2));
    assert_eq!(count_for(&body, "Offline", "status", "device_count"), Some(1));

    // A wide window brings D2 online too.
    let (_, body) = get(&t.app, "/api/status?hours=72", ADMIN).await;
    assert_eq!(count_for(&body, "Online", "status", "device_count"), Some(3));
}

#[tokio::test]
async fn explicit_status_column_wins() {
    // ---
    let csv = "\
Timestamp,Client,DeviceID,Status
2000-01-01 00:00:00,AVPN,D1,Active
2000-01-01 00:00:00,AVPN,D2,
";
    let t = test_app_with(csv);
    let (_, body) = get(&t.app, "/api/status", ADMIN).await;

    assert_eq!(body, json!([{ "status": "Active", "device_count": 1 }]));
}

#[tokio::test]
async fn status_without_timestamps_is_no_data() {
    // ---
    let t = test_app_with("DeviceID,WaterLevel\nD1,3\n");
    let (_, body) = get(&t.app, "/api/status", ADMIN).await;

    assert_eq!(body, json!([{ "status": "No Data", "device_count": 0 }]));
}

#[tokio::test]
async fn grouped_views() {
    // ---
    let t = test_app();

    let (_, body) = get(&t.app, "/api/devices/by-client", ADMIN).await;
    assert_eq!(body, json!([{ "key": "AVPN", "value": 2 }, { "key": "CIPT", "value": 1 }]));

    let (_, body) = get(&t.app, "/api/groups?by=district", ADMIN).await;
    assert_eq!(count_for(&body["rows"], "Pune", "key", "value"), Some(2));

    let (_, body) = get(&t.app, "/api/groups?by=client&value=water_level&agg=max", ADMIN).await;
    assert_eq!(body["rows"][0]["key"], "AVPN");
    assert_eq!(body["rows"][0]["value"], 1000.0);

    let (status, _) = get(&t.app, "/api/groups?by=nonsense", ADMIN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn portable_views() {
    // ---
    let t = test_app();

    let (_, body) = get(&t.app, "/api/portable/by-client", ADMIN).await;
    assert_eq!(body, json!([{ "key": "AVPN", "value": 2 }, { "key": "CIPT", "value": 2 }]));

    let (_, body) = get(&t.app, "/api/portable/by-officer", ADMIN).await;
    assert_eq!(body["column"], "Field Officer");
    assert_eq!(count_for(&body["rows"], "Meena", "key", "value"), Some(2));

    let (_, body) = get(&t.app, "/api/portable/top-devices", CIPT).await;
    assert_eq!(body, json!([{ "key": "D3", "value": 2 }]));
}

#[tokio::test]
async fn officer_view_without_officer_column() {
    // ---
    let t = test_app_with("Timestamp,DeviceID,DeviceType\n2025-01-01 10:00:00,D1,Portable\n");
    let (status, body) = get(&t.app, "/api/portable/by-officer", ADMIN).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["column"], Value::Null);
    assert_eq!(body["rows"], json!([]));
}

#[tokio::test]
async fn trend_heatmap_and_distribution() {
    // ---
    let t = test_app();

    let (status, body) = get(&t.app, "/api/trend?bucket=hour&agg=sum", ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    let total: f64 = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["value"].as_f64().unwrap_or(0.0))
        .sum();
    // The 40 sits on the row whose timestamp could not be parsed.
    assert_eq!(total, 1060.0);

    let (status, _) = get(&t.app, "/api/trend?bucket=fortnight", ADMIN).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = get(&t.app, "/api/heatmap", ADMIN).await;
    assert_eq!(body["days"][0], "Monday");
    assert_eq!(body["cells"].as_array().unwrap().len(), 7);

    let (_, body) = get(&t.app, "/api/distribution", ADMIN).await;
    let counted: u64 = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["count"].as_u64().unwrap())
        .sum();
    assert_eq!(counted, 5);
}

#[tokio::test]
async fn device_trend_defaults_to_busiest_device() {
    // ---
    let t = test_app();

    let (_, body) = get(&t.app, "/api/devices/trend", AVPN).await;
    assert_eq!(body["device_id"], "D1");
    assert_eq!(body["device_type"], "Fixed");
    assert_eq!(body["points"].as_array().unwrap().len(), 2);

    let (_, body) = get(&t.app, "/api/devices/trend?device=D3", CIPT).await;
    assert_eq!(body["device_type"], "Portable");
    assert_eq!(body["points"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn data_quality_views() {
    // ---
    let t = test_app();

    let (_, body) = get(&t.app, "/api/quality/duplicates", ADMIN).await;
    assert_eq!(body["extra_occurrences"], 1);
    assert_eq!(body["all_occurrences"], 2);
    assert!(body["rows"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["device_id"] == "D2"));

    let (_, body) = get(&t.app, "/api/quality/out-of-range?low=0&high=100", ADMIN).await;
    assert_eq!(body["flagged_count"], 1);
    assert_eq!(body["rows"][0]["water_level"], 1000.0);
}

#[tokio::test]
async fn map_points_need_both_coordinates() {
    // ---
    let t = test_app();
    let (_, body) = get(&t.app, "/api/map", ADMIN).await;
    assert_eq!(body.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn feedback_flow() {
    // ---
    let t = test_app();

    // Missing reason is rejected before anything is written.
    let (status, body) = call(
        &t.app,
        Method::POST,
        "/api/feedback",
        Some(AVPN),
        Some(json!({ "status": "Not Approved", "reason": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "Reason");
    assert!(!t.feedback_dir.join("feedbacks.csv").exists());

    let (status, created) = call(
        &t.app,
        Method::POST,
        "/api/feedback",
        Some(AVPN),
        Some(json!({ "status": "Approved", "satisfaction": 4, "comment": " good " })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["Client"], "AVPN");
    assert_eq!(created["Comment"], "good");
    let id = created["ID"].as_str().unwrap().to_string();

    // Admins review; they cannot submit.
    let (status, _) = call(
        &t.app,
        Method::POST,
        "/api/feedback",
        Some(ADMIN),
        Some(json!({ "status": "Approved", "satisfaction": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = call(
        &t.app,
        Method::PATCH,
        &format!("/api/feedback/{id}"),
        Some(ADMIN),
        Some(json!({ "admin_comment": "Thanks" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["AdminComment"], "Thanks");

    let (status, _) = call(
        &t.app,
        Method::PATCH,
        &format!("/api/feedback/{id}"),
        Some(AVPN),
        Some(json!({ "admin_comment": "self-approve" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, overview) = get(&t.app, "/api/feedback", ADMIN).await;
    assert_eq!(overview["entries"].as_array().unwrap().len(), 1);
    assert_eq!(overview["status_breakdown"], json!([{ "key": "Approved", "value": 1 }]));
    assert_eq!(overview["avg_satisfaction"], json!([{ "key": "AVPN", "value": 4.0 }]));

    let (_, overview) = get(&t.app, "/api/feedback", CIPT).await;
    assert!(overview["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_feedback_id_is_not_found() {
    // ---
    let t = test_app();
    let (status, _) = call(
        &t.app,
        Method::PATCH,
        "/api/feedback/5f0c6f2e-8a4b-4c1e-9d1a-2b3c4d5e6f70",
        Some(ADMIN),
        Some(json!({ "admin_comment": "?" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    // ---
    let t = test_app();

    for uri in ["/api/kpis?start=nope&end=2025-01-01", "/api/status?hours=-1"] {
        let (status, body) = get(&t.app, uri, ADMIN).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].as_str().is_some_and(|m| !m.is_empty()), "{uri}");
    }

    let (status, body) = call(
        &t.app,
        Method::PATCH,
        "/api/feedback/not-a-uuid",
        Some(ADMIN),
        Some(json!({ "admin_comment": "Thanks" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = call(
        &t.app,
        Method::POST,
        "/api/feedback",
        Some(AVPN),
        Some(json!({ "status": "Maybe" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
    assert!(!t.feedback_dir.join("feedbacks.csv").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_dataset() {
    // ---
    let t = test_app();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let app = t.app.clone();
            tokio::spawn(async move { get(&app, "/api/kpis", ADMIN).await })
        })
        .collect();

    let mut bodies = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        bodies.push(body);
    }
    assert!(bodies.iter().all(|b| *b == bodies[0]));
}
