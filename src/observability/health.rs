//! Health check HTTP server
//!
//! Provides HTTP endpoints for monitoring the bridge: broker connectivity and
//! refresh-loop freshness, for both human operators and service managers.

use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use warp::http::StatusCode;
use warp::Filter;

/// Refresh passes that may be missed before the loop is reported stale
const MISSED_REFRESH_TOLERANCE: u64 = 3;

/// HTTP health check server
pub struct HealthServer {
    node_id: String,
    port: u16,
    refresh_interval_secs: u64,
}

impl HealthServer {
    pub fn new(node_id: String, port: u16, refresh_interval_secs: u64) -> Self {
        Self {
            node_id,
            port,
            refresh_interval_secs,
        }
    }

    /// Start the HTTP health server; runs until the task is dropped
    pub async fn start(self: Arc<Self>) {
        let health_server = self.clone();

        // GET /health - comprehensive health status
        let health_route = warp::path("health").and(warp::get()).and_then(move || {
            let server = health_server.clone();
            async move {
                let status = server.get_health_status();
                let status_code = if status.status == "healthy" {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(
                    warp::reply::json(&status),
                    status_code,
                ))
            }
        });

        // GET /metrics - complete metrics export
        let metrics_route = warp::path("metrics").and(warp::get()).and_then(|| async {
            Ok::<_, Infallible>(warp::reply::json(&metrics().get_metrics()))
        });

        // GET /ready - broker connection established
        let ready_route = warp::path("ready").and(warp::get()).and_then(|| async {
            let ready = metrics().is_mqtt_connected();
            let response = ReadinessResponse {
                ready,
                timestamp: current_timestamp(),
            };
            let status_code = if ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            Ok::<_, Infallible>(warp::reply::with_status(
                warp::reply::json(&response),
                status_code,
            ))
        });

        // GET /live - process is up
        let live_route = warp::path("live").and(warp::get()).and_then(|| async {
            let response = LivenessResponse {
                alive: true,
                timestamp: current_timestamp(),
            };
            Ok::<_, Infallible>(warp::reply::json(&response))
        });

        let routes = health_route.or(metrics_route).or(ready_route).or(live_route);

        tracing::info!(port = self.port, "Starting health server");

        warp::serve(routes).run(([0, 0, 0, 0], self.port)).await;
    }

    fn get_health_status(&self) -> HealthStatus {
        let now = current_timestamp();
        let snapshot = metrics().get_metrics();

        let mut checks = HashMap::new();
        checks.insert(
            "mqtt".to_string(),
            check_mqtt_health(snapshot.mqtt.connected, now),
        );
        checks.insert(
            "refresh".to_string(),
            check_refresh_health(
                snapshot.refresh.last_refresh,
                now,
                self.refresh_interval_secs * MISSED_REFRESH_TOLERANCE,
            ),
        );

        HealthStatus {
            status: overall_status(&checks).to_string(),
            timestamp: now,
            node_id: self.node_id.clone(),
            uptime_seconds: snapshot.lifecycle.uptime_seconds,
            checks,
        }
    }
}

fn check_mqtt_health(connected: bool, now: u64) -> HealthCheck {
    if connected {
        HealthCheck {
            status: "healthy".to_string(),
            message: Some("MQTT connection established".to_string()),
            last_check: now,
        }
    } else {
        HealthCheck {
            status: "unhealthy".to_string(),
            message: Some("MQTT connection failed or disconnected".to_string()),
            last_check: now,
        }
    }
}

fn check_refresh_health(last_refresh: u64, now: u64, staleness_secs: u64) -> HealthCheck {
    if last_refresh == 0 {
        HealthCheck {
            status: "healthy".to_string(),
            message: Some("No refresh pass yet".to_string()),
            last_check: now,
        }
    } else if now.saturating_sub(last_refresh) > staleness_secs {
        HealthCheck {
            status: "stale".to_string(),
            message: Some(format!(
                "No refresh pass for {} seconds",
                now.saturating_sub(last_refresh)
            )),
            last_check: now,
        }
    } else {
        HealthCheck {
            status: "healthy".to_string(),
            message: Some("Recent refresh pass".to_string()),
            last_check: now,
        }
    }
}

fn overall_status(checks: &HashMap<String, HealthCheck>) -> &'static str {
    if checks.values().all(|check| check.status == "healthy") {
        "healthy"
    } else {
        "degraded"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    node_id: String,
    uptime_seconds: u64,
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_server_creation() {
        let health_server = HealthServer::new("192_168_1_20".to_string(), 8080, 60);
        assert_eq!(health_server.node_id, "192_168_1_20");
        assert_eq!(health_server.port, 8080);
    }

    #[test]
    fn test_mqtt_check() {
        assert_eq!(check_mqtt_health(true, 1).status, "healthy");
        assert_eq!(check_mqtt_health(false, 1).status, "unhealthy");
    }

    #[test]
    fn test_refresh_check() {
        let now = 10_000;
        assert_eq!(check_refresh_health(0, now, 180).status, "healthy");
        assert_eq!(check_refresh_health(now - 60, now, 180).status, "healthy");
        assert_eq!(check_refresh_health(now - 600, now, 180).status, "stale");
    }

    #[test]
    fn test_overall_status() {
        let mut checks = HashMap::new();
        checks.insert("mqtt".to_string(), check_mqtt_health(true, 1));
        assert_eq!(overall_status(&checks), "healthy");

        checks.insert("refresh".to_string(), check_refresh_health(1, 10_000, 180));
        assert_eq!(overall_status(&checks), "degraded");
    }

    #[test]
    fn test_health_status_reports_node() {
        let health_server = HealthServer::new("node".to_string(), 8080, 60);
        let status = health_server.get_health_status();
        assert_eq!(status.node_id, "node");
        assert!(status.checks.contains_key("mqtt"));
        assert!(status.checks.contains_key("refresh"));
    }
}
