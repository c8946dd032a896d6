//! Liveness endpoint for the commerce service.
//!
//! Reports overall status plus a database reachability flag so a load
//! balancer can tell a wedged pool apart from a dead process.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

/// `GET /health`. Always returns 200; degraded dependencies show up in
/// the body rather than the status code.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "reachable",
        Err(_) => "unreachable",
    };

    Json(HealthStatus {
        status: if database == "reachable" {
            "ok"
        } else {
            "degraded"
        },
        service: "commerce-core",
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_body_serializes_flat() {
        let body = HealthStatus {
            status: "ok",
            service: "commerce-core",
            version: "0.1.0",
            database: "reachable",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "commerce-core");
        assert_eq!(json["database"], "reachable");
    }
}
