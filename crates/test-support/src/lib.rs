use anyhow::Context as _;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.start_kill();
    }
}

/// Absolute path of a bundled fixture document (`petstore.json`, `openapi-3.1.yaml`).
#[must_use]
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

/// Read a bundled fixture document.
///
/// # Errors
///
/// Returns an error if the fixture does not exist.
pub fn read_fixture(name: &str) -> anyhow::Result<String> {
    let path = fixture_path(name);
    std::fs::read_to_string(&path).with_context(|| format!("read fixture {}", path.display()))
}

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; it's still possible for another process to bind it
/// before you do.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the bound socket's
/// local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Minimal line-delimited JSON-RPC client for an MCP server spawned over stdio.
///
/// This exists only for integration tests; it performs the `initialize` handshake and then
/// sends raw requests, returning the raw response messages.
pub struct McpStdioSession {
    _child: KillOnDrop,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    initialize_result: Value,
}

impl McpStdioSession {
    /// Spawn `bin` with `args` and complete the MCP handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or the handshake fails.
    pub async fn spawn(bin: &str, args: &[&str], timeout_dur: Duration) -> anyhow::Result<Self> {
        let mut child = Command::new(bin)
            .args(args)
            .env("OPENAPI_MCP_LOG_LEVEL", "debug")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn {bin}"))?;

        let stdin = child.stdin.take().context("child stdin")?;
        let stdout = child.stdout.take().context("child stdout")?;

        let mut session = Self {
            _child: KillOnDrop(child),
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            initialize_result: Value::Null,
        };

        let init = session
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "openapi-mcp-integration-tests", "version": "0" }
                }),
                timeout_dur,
            )
            .await?;
        session.initialize_result = init
            .get("result")
            .cloned()
            .with_context(|| format!("initialize failed: {init}"))?;

        session
            .notify("notifications/initialized", Value::Null)
            .await?;
        Ok(session)
    }

    /// The `result` of the `initialize` response.
    #[must_use]
    pub fn initialize_result(&self) -> &Value {
        &self.initialize_result
    }

    /// Send a request and wait for the response carrying the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails, the stream ends, or no response arrives in time.
    pub async fn request(
        &mut self,
        method: &str,
        params: Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        tokio::time::timeout(timeout_dur, self.read_response(id))
            .await
            .with_context(|| format!("timeout waiting for {method} response"))?
    }

    /// Send a notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the child's stdin fails.
    pub async fn notify(&mut self, method: &str, params: Value) -> anyhow::Result<()> {
        let mut msg = json!({"jsonrpc": "2.0", "method": method});
        if !params.is_null() {
            msg["params"] = params;
        }
        self.send(msg).await
    }

    async fn send(&mut self, msg: Value) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(&msg)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("write to child stdin")?;
        self.stdin.flush().await.context("flush child stdin")
    }

    async fn read_response(&mut self, id: u64) -> anyhow::Result<Value> {
        while let Some(line) = self.stdout.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let msg: Value = serde_json::from_str(line)
                .with_context(|| format!("stdout line is not JSON: {line}"))?;
            if msg.get("id") == Some(&json!(id)) {
                return Ok(msg);
            }
        }
        anyhow::bail!("server closed stdout before responding to request {id}")
    }
}

/// Parse the single text content item of a `tools/call` result as JSON.
///
/// # Errors
///
/// Returns an error if the message is not a successful tool call result with JSON text.
pub fn tool_call_text_json(msg: &Value) -> anyhow::Result<Value> {
    let text = msg
        .get("result")
        .and_then(|r| r.get("content"))
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .with_context(|| format!("tools/call missing result.content[0].text: {msg}"))?;
    serde_json::from_str(text).context("tools/call text is not JSON")
}
