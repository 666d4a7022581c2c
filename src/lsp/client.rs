//! LSP Client Core: subprocess lifecycle, request/response correlation,
//! server-initiated-request replies, diagnostics cache (spec §4.10).
//!
//! The sans-I/O codec (`super::codec::LspCodec`) is the pure state machine;
//! this module is the outer driver that owns the child process's pipes and
//! the event loop dispatching decoded messages to pending completions, the
//! diagnostics cache, or an immediate reply for server-initiated requests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};

use crate::error::{CangjieError, Result};
use crate::models::LspState;

use super::codec::{IncomingMessage, LspCodec};

const STDERR_TAIL_LINES: usize = 20;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type PendingMap = HashMap<i64, oneshot::Sender<std::result::Result<Value, Value>>>;

struct Shared {
    state: Mutex<LspState>,
    pending: Mutex<PendingMap>,
    open_files: Mutex<HashMap<PathBuf, i64>>,
    diagnostics_cache: Mutex<HashMap<PathBuf, Vec<Value>>>,
    stderr_tail: Mutex<Vec<String>>,
    stdin: Mutex<tokio::process::ChildStdin>,
    next_id: AtomicI64,
}

pub struct LspClient {
    shared: Arc<Shared>,
    _child: Child,
}

impl LspClient {
    /// Spawns `command` as a child process with stdio pipes, sends
    /// `initialize`, and waits (bounded by `init_timeout`) for a response.
    pub async fn start(
        command: &str,
        args: &[String],
        working_dir: &Path,
        extra_env: &[(String, String)],
        root_uri: &str,
        initialization_options: Value,
        init_timeout: Duration,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in extra_env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| CangjieError::ProtocolError(format!("failed to spawn language server: {e}")))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let shared = Arc::new(Shared {
            state: Mutex::new(LspState::NotInitialized),
            pending: Mutex::new(HashMap::new()),
            open_files: Mutex::new(HashMap::new()),
            diagnostics_cache: Mutex::new(HashMap::new()),
            stderr_tail: Mutex::new(Vec::new()),
            stdin: Mutex::new(stdin),
            next_id: AtomicI64::new(1),
        });

        spawn_stderr_pump(shared.clone(), stderr);
        spawn_read_loop(shared.clone(), stdout);

        {
            let mut state = shared.state.lock().await;
            *state = LspState::WaitingForInitialized;
        }

        let params = json!({
            "processId": std::process::id(),
            "rootUri": root_uri,
            "capabilities": {},
            "initializationOptions": initialization_options,
        });

        let response = tokio::time::timeout(
            init_timeout,
            send_request(&shared, "initialize", params),
        )
        .await;

        match response {
            Ok(Ok(_)) => {
                let mut state = shared.state.lock().await;
                *state = LspState::Ready;
                notify(&shared, "initialized", json!({})).await?;
            }
            Ok(Err(e)) => {
                let tail = shared.stderr_tail.lock().await.join("\n");
                return Err(CangjieError::ProtocolError(format!(
                    "language server failed to initialize: {e}; stderr tail: {tail}"
                )));
            }
            Err(_) => {
                let tail = shared.stderr_tail.lock().await.join("\n");
                return Err(CangjieError::ProtocolError(format!(
                    "language server initialization timed out; stderr tail: {tail}"
                )));
            }
        }

        Ok(Self { shared, _child: child })
    }

    /// `_ensure_file_open(path)` (spec §4.10): open-or-bump-version, sending
    /// `didOpen`/`didChange` accordingly. `open_files[path]` monotonically
    /// increases across calls.
    async fn ensure_file_open(&self, path: &Path) -> Result<()> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CangjieError::NotFound(format!("cannot read {}: {e}", path.display())))?;
        let uri = path_to_uri(path);

        let mut open_files = self.shared.open_files.lock().await;
        if let Some(version) = open_files.get_mut(path) {
            *version += 1;
            let params = json!({
                "textDocument": {"uri": uri, "version": *version},
                "contentChanges": [{"text": contents}],
            });
            drop(open_files);
            notify(&self.shared, "textDocument/didChange", params).await
        } else {
            open_files.insert(path.to_path_buf(), 0);
            drop(open_files);
            let params = json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": "Cangjie",
                    "version": 0,
                    "text": contents,
                }
            });
            notify(&self.shared, "textDocument/didOpen", params).await
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        let state = *self.shared.state.lock().await;
        match state {
            LspState::Ready => Ok(()),
            LspState::Exited => Err(CangjieError::ProtocolError("language server has exited".into())),
            _ => Err(CangjieError::ProtocolError("language server not ready".into())),
        }
    }

    async fn textdoc_request(&self, method: &str, path: &Path, line: u32, character: u32) -> Result<Value> {
        self.ensure_ready().await?;
        self.ensure_file_open(path).await?;
        let params = json!({
            "textDocument": {"uri": path_to_uri(path)},
            "position": {"line": line, "character": character},
        });
        send_request(&self.shared, method, params).await
    }

    pub async fn definition(&self, path: &Path, line: u32, character: u32) -> Result<Value> {
        self.textdoc_request("textDocument/definition", path, line, character).await
    }

    pub async fn references(&self, path: &Path, line: u32, character: u32) -> Result<Value> {
        self.textdoc_request("textDocument/references", path, line, character).await
    }

    pub async fn hover(&self, path: &Path, line: u32, character: u32) -> Result<Value> {
        self.textdoc_request("textDocument/hover", path, line, character).await
    }

    pub async fn completion(&self, path: &Path, line: u32, character: u32) -> Result<Value> {
        self.textdoc_request("textDocument/completion", path, line, character).await
    }

    pub async fn document_symbol(&self, path: &Path) -> Result<Value> {
        self.ensure_ready().await?;
        self.ensure_file_open(path).await?;
        let params = json!({"textDocument": {"uri": path_to_uri(path)}});
        send_request(&self.shared, "textDocument/documentSymbol", params).await
    }

    /// Ensures the file is open, then polls the diagnostics cache for up to
    /// `timeout`. Diagnostics arrive via server push and are last-write-wins
    /// per file (spec §4.10, §9).
    pub async fn diagnostics(&self, path: &Path, timeout: Duration) -> Result<Vec<Value>> {
        self.ensure_ready().await?;
        self.ensure_file_open(path).await?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let cache = self.shared.diagnostics_cache.lock().await;
                if let Some(diags) = cache.get(path) {
                    return Ok(diags.clone());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Send `shutdown`, wait briefly, send `exit`, then terminate the process.
    pub async fn shutdown(mut self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().await;
            *state = LspState::ShuttingDown;
        }
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, send_request(&self.shared, "shutdown", Value::Null)).await;
        let _ = notify(&self.shared, "exit", Value::Null).await;
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self._child.wait()).await;
        let _ = self._child.start_kill();
        let mut state = self.shared.state.lock().await;
        *state = LspState::Exited;
        Ok(())
    }
}

async fn send_request(shared: &Arc<Shared>, method: &str, params: Value) -> Result<Value> {
    let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = oneshot::channel();
    shared.pending.lock().await.insert(id, tx);

    let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
    write_message(shared, &message).await?;

    match rx.await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => Err(CangjieError::ProtocolError(format!("lsp error response: {error}"))),
        Err(_) => Err(CangjieError::ProtocolError("connection lost before response arrived".into())),
    }
}

async fn notify(shared: &Arc<Shared>, method: &str, params: Value) -> Result<()> {
    let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
    write_message(shared, &message).await
}

async fn write_message(shared: &Arc<Shared>, message: &Value) -> Result<()> {
    let mut codec = LspCodec::new();
    codec.encode(message);
    let bytes = codec.drain();
    let mut stdin = shared.stdin.lock().await;
    stdin.write_all(&bytes).await.map_err(CangjieError::backend)?;
    stdin.flush().await.map_err(CangjieError::backend)?;
    Ok(())
}

fn spawn_stderr_pump(shared: Arc<Shared>, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            let mut chunk = [0u8; 4096];
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if let Ok(text) = std::str::from_utf8(&buf) {
                        let mut tail = shared.stderr_tail.lock().await;
                        for line in text.lines() {
                            tail.push(line.to_string());
                            if tail.len() > STDERR_TAIL_LINES {
                                tail.remove(0);
                            }
                        }
                        buf.clear();
                    }
                }
            }
        }
    });
}

fn spawn_read_loop(shared: Arc<Shared>, stdout: tokio::process::ChildStdout) {
    tokio::spawn(async move {
        let mut reader = stdout;
        let mut codec = LspCodec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    codec.feed(&chunk[..n]);
                    while let Some(message) = codec.try_decode() {
                        dispatch(&shared, message).await;
                    }
                }
            }
        }
        fail_all_pending(&shared).await;
        let mut state = shared.state.lock().await;
        if *state != LspState::ShuttingDown {
            *state = LspState::Exited;
        }
    });
}

async fn dispatch(shared: &Arc<Shared>, message: IncomingMessage) {
    match message {
        IncomingMessage::Response { id, result, error } => {
            let Some(id) = id.as_i64() else { return };
            if let Some(tx) = shared.pending.lock().await.remove(&id) {
                let outcome = match error {
                    Some(err) => Err(err),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(outcome);
            }
            // Responses without a pending entry are logged and dropped.
            else {
                tracing::warn!(id, "received response with no pending request");
            }
        }
        IncomingMessage::Notification { method, params } => {
            if method == "textDocument/publishDiagnostics" {
                if let Some(uri) = params.get("uri").and_then(|v| v.as_str()) {
                    let path = uri_to_path(uri);
                    let diagnostics = params
                        .get("diagnostics")
                        .and_then(|v| v.as_array())
                        .cloned()
                        .unwrap_or_default();
                    shared.diagnostics_cache.lock().await.insert(path, diagnostics);
                }
            }
        }
        IncomingMessage::Request { id, method, .. } => {
            // Server-initiated requests (workspace/configuration,
            // client/registerCapability, window/workDoneProgress/create)
            // must be answered or the server hangs; reply success immediately.
            let reply = json!({"jsonrpc": "2.0", "id": id, "result": Value::Null});
            tracing::debug!(method, "answering server-initiated request with empty success");
            let _ = write_message(shared, &reply).await;
        }
    }
}

async fn fail_all_pending(shared: &Arc<Shared>) {
    let mut pending = shared.pending.lock().await;
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(json!({"message": "connection lost"})));
    }
}

fn path_to_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.trim_start_matches("file://"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_uri_roundtrip() {
        let path = Path::new("/tmp/a.cj");
        let uri = path_to_uri(path);
        assert_eq!(uri_to_path(&uri), path.to_path_buf());
    }
}
