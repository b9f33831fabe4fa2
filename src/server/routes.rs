use std::sync::Arc;

use serde::Serialize;
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::http::{
    HttpRequest, read_http_request, write_error_response, write_error_with_headers,
    write_event_stream_head, write_json_response,
};
use super::sse::SseSink;
use super::state::ServerState;

const RUN_TEST_PATH: &str = "/api/run-test";
const STOP_PATH: &str = "/api/stop";
const HEALTH_PATH: &str = "/health";
const ALLOW_POST: [(&str, &str); 1] = [("Allow", "POST")];

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    running: bool,
}

#[derive(Serialize)]
struct StopResponse {
    stopped: bool,
}

pub(super) async fn handle_connection(mut socket: TcpStream, state: Arc<ServerState>) {
    let request = match read_http_request(&mut socket).await {
        Ok(request) => request,
        Err(err) => {
            if write_error_response(&mut socket, err.status, &err.message)
                .await
                .is_err()
            {
                // Socket closed while writing error response.
            }
            return;
        }
    };
    debug!("{} {}", request.method, request.path);

    if request.route() == HEALTH_PATH && request.method == "GET" {
        let health = HealthResponse {
            status: "ok",
            running: state.is_running(),
        };
        if write_json_response(&mut socket, 200, &health).await.is_err() {
            // Socket closed while writing response.
        }
        return;
    }

    if !authorized(&request, state.auth_token()) {
        if write_error_response(&mut socket, 401, "Unauthorized")
            .await
            .is_err()
        {
            // Socket closed while writing error response.
        }
        return;
    }

    match (request.method.as_str(), request.route()) {
        ("POST", RUN_TEST_PATH) => run_test(socket, &state, &request.body).await,
        ("POST", STOP_PATH) => {
            let (status, stopped) = if state.request_stop() {
                info!("Stop requested over HTTP");
                (200, true)
            } else {
                (409, false)
            };
            if status == 200 {
                if write_json_response(&mut socket, status, &StopResponse { stopped })
                    .await
                    .is_err()
                {
                    // Socket closed while writing response.
                }
            } else if write_error_response(&mut socket, status, "No test is running")
                .await
                .is_err()
            {
                // Socket closed while writing error response.
            }
        }
        (_, RUN_TEST_PATH | STOP_PATH) => {
            if write_error_with_headers(&mut socket, 405, &ALLOW_POST, "Method not allowed")
                .await
                .is_err()
            {
                // Socket closed while writing error response.
            }
        }
        _ => {
            if write_error_response(&mut socket, 404, "Not found")
                .await
                .is_err()
            {
                // Socket closed while writing error response.
            }
        }
    }
}

fn authorized(request: &HttpRequest, auth_token: Option<&str>) -> bool {
    let Some(token) = auth_token else {
        return true;
    };
    let expected = format!("Bearer {}", token);
    request
        .headers
        .get("authorization")
        .map(|value| value.trim())
        == Some(expected.as_str())
}

async fn run_test(mut socket: TcpStream, state: &ServerState, body: &[u8]) {
    let Some((active, stop_rx)) = state.claim_run() else {
        if write_error_response(&mut socket, 409, "A test is already running")
            .await
            .is_err()
        {
            // Socket closed while writing error response.
        }
        return;
    };

    if let Err(err) = write_event_stream_head(&mut socket).await {
        debug!("Client left before the stream opened: {}", err);
        return;
    }

    let report = state
        .controller()
        .run_json(body, Box::new(SseSink::new(socket)), stop_rx)
        .await;
    debug!("Run finished with status {}", report.status.as_str());
    drop(active);
}
