// src/metrics.rs

use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use std::time::Instant;

// 定义指标
static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap()
});

static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap()
});

static AUTH_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "auth_failures_total",
        "Rejected authentication attempts by reason",
        &["reason"]
    )
    .unwrap()
});

static RATE_LIMITED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rate_limited_requests_total",
        "Requests denied by the rate limiter",
        &["limiter"]
    )
    .unwrap()
});

static CACHE_LOOKUPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cache_lookups_total",
        "User cache lookups by outcome",
        &["outcome"]
    )
    .unwrap()
});

static VERSION_CONFLICTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "version_conflicts_total",
        "Optimistic concurrency conflicts by resource",
        &["resource"]
    )
    .unwrap()
});

/// 初始化指标（确保所有指标都被注册）
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&AUTH_FAILURES_TOTAL);
    Lazy::force(&RATE_LIMITED_TOTAL);
    Lazy::force(&CACHE_LOOKUPS_TOTAL);
    Lazy::force(&VERSION_CONFLICTS_TOTAL);
}

/// 指标中间件
///
/// 以路由模板作为 path 标签，避免 id 把标签基数撑大。
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// 获取指标端点处理器
pub async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode_to_string(&metric_families)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_rate_limited() {
    RATE_LIMITED_TOTAL.with_label_values(&["fixed_window"]).inc();
}

/// outcome: hit / miss / error / stale
pub fn record_cache_lookup(outcome: &str) {
    CACHE_LOOKUPS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_version_conflict(resource: &str) {
    VERSION_CONFLICTS_TOTAL.with_label_values(&[resource]).inc();
}
