//! The `:8000/metrics` Prometheus scrape endpoint (spec §6), brought up
//! once the engine has completed its first loop iteration.

use warp::Filter;

async fn handle_metrics() -> Result<impl warp::Reply, std::convert::Infallible> {
    match metrics::gather_prometheus_text() {
        Ok(body) => Ok(warp::reply::with_status(body, warp::http::StatusCode::OK)),
        Err(error) => {
            tracing::error!(%error, "failed to encode prometheus metrics");
            Ok(warp::reply::with_status(
                String::new(),
                warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

/// Spawns the metrics HTTP server as a background task and returns
/// immediately; the server runs for the lifetime of the process.
pub fn spawn(port: u16) {
    let route = warp::path("metrics").and(warp::get()).and_then(handle_metrics);
    tokio::spawn(async move {
        warp::serve(route).run(([0, 0, 0, 0], port)).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_route_returns_ok() {
        let route = warp::path("metrics").and(warp::get()).and_then(handle_metrics);
        let response = warp::test::request().path("/metrics").reply(&route).await;
        assert_eq!(response.status(), warp::http::StatusCode::OK);
    }
}
