//! In-process fake ComfyUI used by the orchestrator tests.
//!
//! Serves `/prompt`, `/history/{id}`, `/queue`, `/interrupt`, `/view` and
//! `/ws` on an ephemeral port. Every accepted submission pushes the scripted
//! WebSocket messages to all open sockets; `{prompt_id}` in a script line
//! is replaced with the id returned for that submission.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use i2v_worker::config::{WorkerConfig, COMFYUI_PORT};

pub const PROMPT_ID: &str = "8f0c2f4e-prompt";

// ---------------------------------------------------------------------------
// Fake server
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeComfyUIOptions {
    /// Messages pushed over WebSocket after each submission.
    pub script: Vec<String>,
    /// Body served by `GET /history/{id}`.
    pub history: Value,
    /// Body served by `GET /view`.
    pub view_bytes: Vec<u8>,
    /// Answer `POST /prompt` with 400.
    pub reject_submit: bool,
}

struct FakeState {
    options: FakeComfyUIOptions,
    tx: broadcast::Sender<String>,
    requests: AtomicUsize,
    submissions: Mutex<Vec<Value>>,
    queue_calls: Mutex<Vec<Value>>,
    interrupt_calls: Mutex<Vec<Value>>,
    view_queries: Mutex<Vec<HashMap<String, String>>>,
    ws_client_ids: Mutex<Vec<String>>,
    ws_closed_by_client: AtomicUsize,
}

pub struct FakeComfyUI {
    pub addr: SocketAddr,
    state: Arc<FakeState>,
}

impl FakeComfyUI {
    pub async fn start(options: FakeComfyUIOptions) -> Self {
        let (tx, _) = broadcast::channel(64);
        let state = Arc::new(FakeState {
            options,
            tx,
            requests: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            queue_calls: Mutex::new(Vec::new()),
            interrupt_calls: Mutex::new(Vec::new()),
            view_queries: Mutex::new(Vec::new()),
            ws_client_ids: Mutex::new(Vec::new()),
            ws_closed_by_client: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/prompt", post(submit))
            .route("/history/{prompt_id}", get(history))
            .route("/queue", post(queue))
            .route("/interrupt", post(interrupt))
            .route("/view", get(view))
            .route("/ws", get(ws))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Total HTTP + WebSocket requests received.
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.state.submissions.lock().unwrap().clone()
    }

    pub fn queue_calls(&self) -> Vec<Value> {
        self.state.queue_calls.lock().unwrap().clone()
    }

    pub fn interrupt_calls(&self) -> Vec<Value> {
        self.state.interrupt_calls.lock().unwrap().clone()
    }

    pub fn view_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.view_queries.lock().unwrap().clone()
    }

    pub fn ws_client_ids(&self) -> Vec<String> {
        self.state.ws_client_ids.lock().unwrap().clone()
    }

    /// Wait (briefly) until `n` sockets have been closed by the client.
    pub async fn wait_for_client_closes(&self, n: usize) -> bool {
        for _ in 0..100 {
            if self.state.ws_closed_by_client.load(Ordering::SeqCst) >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

async fn submit(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.submissions.lock().unwrap().push(body);

    if state.options.reject_submit {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"type": "prompt_outputs_failed_validation"}})),
        )
            .into_response();
    }

    for line in &state.options.script {
        let _ = state.tx.send(line.replace("{prompt_id}", PROMPT_ID));
    }

    Json(json!({"prompt_id": PROMPT_ID, "number": 0, "node_errors": {}})).into_response()
}

async fn history(
    State(state): State<Arc<FakeState>>,
    UrlPath(_prompt_id): UrlPath<String>,
) -> Json<Value> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    Json(state.options.history.clone())
}

async fn queue(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> StatusCode {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.queue_calls.lock().unwrap().push(body);
    StatusCode::OK
}

async fn interrupt(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> StatusCode {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.interrupt_calls.lock().unwrap().push(body);
    StatusCode::OK
}

async fn view(
    State(state): State<Arc<FakeState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Vec<u8> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.view_queries.lock().unwrap().push(query);
    state.options.view_bytes.clone()
}

async fn ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<FakeState>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state
        .ws_client_ids
        .lock()
        .unwrap()
        .push(query.get("clientId").cloned().unwrap_or_default());

    // Subscribe before the upgrade completes so no scripted message is lost.
    let rx = state.tx.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx, state))
}

async fn handle_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<String>, state: Arc<FakeState>) {
    let status = json!({"type": "status", "data": {"status": {"exec_info": {"queue_remaining": 0}}}});
    if socket.send(Message::Text(status.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) => {
                    state.ws_closed_by_client.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Progress chatter plus the completion signal for [`PROMPT_ID`].
pub fn completion_script() -> Vec<String> {
    vec![
        r#"{"type":"execution_start","data":{"prompt_id":"{prompt_id}"}}"#.into(),
        r#"{"type":"executing","data":{"node":"244","prompt_id":"{prompt_id}"}}"#.into(),
        r#"{"type":"progress","data":{"value":3,"max":6,"prompt_id":"{prompt_id}","node":"220"}}"#.into(),
        r#"{"type":"executing","data":{"node":null,"prompt_id":"someone-elses-prompt"}}"#.into(),
        r#"{"type":"executed","data":{"node":"9","output":{},"prompt_id":"{prompt_id}"}}"#.into(),
        r#"{"type":"executing","data":{"node":null,"prompt_id":"{prompt_id}"}}"#.into(),
    ]
}

/// History listing one video artifact at `fullpath`.
pub fn history_with_video(fullpath: &Path) -> Value {
    json!({
        PROMPT_ID: {
            "prompt": [],
            "outputs": {
                "50": {"images": [{"filename": "last_frame.png", "subfolder": "", "type": "temp"}]},
                "9": {"gifs": [{
                    "filename": "wan_00001.mp4",
                    "subfolder": "",
                    "type": "output",
                    "format": "video/h264-mp4",
                    "fullpath": fullpath.to_string_lossy(),
                }]},
            },
            "status": {"status_str": "success", "completed": true, "messages": []},
        }
    })
}

/// History whose nodes produced nothing usable.
pub fn history_without_video() -> Value {
    json!({
        PROMPT_ID: {
            "outputs": {
                "50": {"images": [{"filename": "last_frame.png", "subfolder": "", "type": "temp"}]},
                "9": {"gifs": []},
            },
            "status": {"status_str": "success", "completed": true},
        }
    })
}

/// A template containing every node the parameter table writes to.
pub fn template() -> Value {
    json!({
        "135": {"class_type": "WanVideoTextEncode", "inputs": {"positive_prompt": "", "negative_prompt": ""}},
        "220": {"class_type": "WanVideoSampler", "inputs": {"seed": 0, "cfg": 1.0}},
        "235": {"class_type": "INTConstant", "inputs": {"value": 480}},
        "236": {"class_type": "INTConstant", "inputs": {"value": 832}},
        "244": {"class_type": "LoadImage", "inputs": {"image": "example.png"}},
        "498": {"class_type": "WanVideoContextOptions", "inputs": {"context_overlap": 16}},
        "540": {"class_type": "WanVideoSampler", "inputs": {"seed": 0, "cfg": 1.0}},
        "541": {"class_type": "WanVideoImageToVideoEncode", "inputs": {"num_frames": 49}},
        "9": {"class_type": "VHS_VideoCombine", "inputs": {"frame_rate": 16}},
    })
}

pub fn write_template(dir: &Path, template: &Value) -> PathBuf {
    let path = dir.join("workflow_api.json");
    std::fs::write(&path, template.to_string()).unwrap();
    path
}

pub fn test_config(addr: SocketAddr, temp_root: &Path, workflow_path: PathBuf) -> WorkerConfig {
    WorkerConfig {
        server_address: addr.ip().to_string(),
        comfyui_port: addr.port(),
        workflow_path,
        temp_root: temp_root.to_path_buf(),
        wait_timeout: Duration::from_secs(10),
        download_program: "wget".into(),
        job_input_path: None,
    }
}

/// Config pointing at a port nothing listens on.
pub fn unreachable_config(temp_root: &Path, workflow_path: PathBuf) -> WorkerConfig {
    WorkerConfig {
        server_address: "127.0.0.1".into(),
        comfyui_port: 9,
        ..test_config(SocketAddr::from(([127, 0, 0, 1], COMFYUI_PORT)), temp_root, workflow_path)
    }
}
