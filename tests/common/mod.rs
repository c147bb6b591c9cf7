#![allow(dead_code)]

use std::{fs, path::PathBuf, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use codemetal_waterlevel::{
    routes::{self, AppState, PASSWORD_HEADER, USERNAME_HEADER},
    Config, DatasetCache, FeedbackStore, StaticCredentials,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Readings for two clients. Timestamps are relative to now so recency
/// classification is stable: D1 and D3 reported recently, D2 did not.
pub fn sample_csv() -> String {
    // ---
    let ago = |hours: i64| (Utc::now() - Duration::hours(hours)).format("%Y-%m-%d %H:%M:%S");
    let dup = ago(50);
    format!(
        "\
Timestamp,Client,District,DeviceID,DeviceType,FarmerName,WaterLevel,Latitude,Longitude,Field Officer
{},AVPN,Pune,D1,Fixed,Asha,10,18.5,73.8,Ravi
{},AVPN,Pune,D1,Fixed,Asha,20,18.5,73.8,Ravi
{dup},AVPN,Nashik,D2,Portable,Bala,30,,,Meena
{dup},AVPN,Nashik,D2,Portable,Bala,1000,,,Meena
{},CIPT,Satara,D3,Portable,Chand,,17.7,74.0,Ravi
not-a-date,CIPT,Satara,D3,Portable,Chand,40,17.7,74.0,Ravi
",
        ago(3),
        ago(30),
        ago(1),
    )
}

pub struct TestApp {
    pub dir: TempDir,
    pub app: Router,
    pub feedback_dir: PathBuf,
}

pub fn test_app_with(csv: &str) -> TestApp {
    // ---
    let dir = tempfile::tempdir().expect("tempdir");
    let data_path = dir.path().join("readings.csv");
    fs::write(&data_path, csv).expect("write csv");
    let feedback_dir = dir.path().join("feedback");

    let config = Config {
        data_path: data_path.clone(),
        feedback_dir: feedback_dir.clone(),
        ..Config::default()
    };
    let state = AppState {
        cache: Arc::new(DatasetCache::new(data_path, 1_000)),
        feedback: Arc::new(FeedbackStore::open(&feedback_dir).expect("feedback store")),
        auth: Arc::new(StaticCredentials::builtin()),
        config,
    };

    TestApp {
        dir,
        app: routes::router(state),
        feedback_dir,
    }
}

pub fn test_app() -> TestApp {
    test_app_with(&sample_csv())
}

pub const ADMIN: (&str, &str) = ("admin", "admin123");
pub const AVPN: (&str, &str) = ("AVPN", "avpn123");
pub const CIPT: (&str, &str) = ("CIPT", "cipt123");

/// Send a request and decode the JSON body (Null when empty).
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    // ---
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((username, password)) = user {
        builder = builder
            .header(USERNAME_HEADER, username)
            .header(PASSWORD_HEADER, password);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

pub async fn get(app: &Router, uri: &str, user: (&str, &str)) -> (StatusCode, Value) {
    call(app, Method::GET, uri, Some(user), None).await
}
