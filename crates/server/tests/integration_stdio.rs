use anyhow::Context as _;
use openapi_mcp_test_support::{McpStdioSession, fixture_path, tool_call_text_json};
use serde_json::{Value, json};
use std::process::Stdio;
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_openapi-mcp");
const TIMEOUT: Duration = Duration::from_secs(10);

async fn spawn_with_fixture(name: &str) -> anyhow::Result<McpStdioSession> {
    let path = fixture_path(name);
    let path = path.to_str().context("fixture path is not UTF-8")?;
    McpStdioSession::spawn(BIN, &[path], TIMEOUT).await
}

async fn call_tool(
    session: &mut McpStdioSession,
    name: &str,
    arguments: Value,
) -> anyhow::Result<Value> {
    session
        .request(
            "tools/call",
            json!({"name": name, "arguments": arguments}),
            TIMEOUT,
        )
        .await
}

fn error_code(msg: &Value) -> Option<i64> {
    msg.get("error")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_i64)
}

#[tokio::test]
async fn stdio_initialize_reports_server_and_api() -> anyhow::Result<()> {
    let session = spawn_with_fixture("petstore.json").await?;
    let init = session.initialize_result();

    assert_eq!(init["serverInfo"]["name"], json!("openapi-mcp"));
    assert!(init["capabilities"].get("tools").is_some());
    let instructions = init["instructions"]
        .as_str()
        .context("initialize result missing instructions")?;
    assert!(instructions.contains("Swagger Petstore"));
    Ok(())
}

#[tokio::test]
async fn stdio_tools_list_exposes_read_only_operations() -> anyhow::Result<()> {
    let mut session = spawn_with_fixture("petstore.json").await?;
    let msg = session.request("tools/list", json!({}), TIMEOUT).await?;

    let tools = msg["result"]["tools"]
        .as_array()
        .with_context(|| format!("tools/list missing result.tools: {msg}"))?;
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(
        names,
        vec![
            "get_api_info",
            "list_endpoints",
            "search_endpoints",
            "get_endpoint_details",
            "list_schemas",
            "get_schema_details",
        ]
    );
    for tool in tools {
        assert_eq!(tool["annotations"]["readOnlyHint"], json!(true));
        assert_eq!(tool["annotations"]["idempotentHint"], json!(true));
        assert_eq!(tool["inputSchema"]["type"], json!("object"));
    }
    Ok(())
}

#[tokio::test]
async fn stdio_tools_call_answers_queries() -> anyhow::Result<()> {
    let mut session = spawn_with_fixture("petstore.json").await?;

    let info = tool_call_text_json(&call_tool(&mut session, "get_api_info", json!({})).await?)?;
    assert_eq!(info["title"], json!("Swagger Petstore"));
    assert_eq!(info["totalEndpoints"], json!(20));
    assert_eq!(info["totalSchemas"], json!(6));

    let hits = tool_call_text_json(
        &call_tool(
            &mut session,
            "search_endpoints",
            json!({"query": "status", "searchIn": "all"}),
        )
        .await?,
    )?;
    let first = &hits["results"][0];
    assert_eq!(first["path"], json!("/pet/findByStatus"));

    let details = tool_call_text_json(
        &call_tool(
            &mut session,
            "get_endpoint_details",
            json!({"path": "/pet/{petId}", "method": "GET"}),
        )
        .await?,
    )?;
    assert_eq!(details["operationId"], json!("getPetById"));
    assert_eq!(
        details["responses"]["200"]["content"]["application/json"]["schema"]["properties"]
            ["category"]["type"],
        json!("object")
    );

    let schema = tool_call_text_json(
        &call_tool(&mut session, "get_schema_details", json!({"name": "Pet"})).await?,
    )?;
    assert_eq!(schema["dependencies"], json!(["Category", "Tag"]));
    Ok(())
}

#[tokio::test]
async fn stdio_tools_call_errors_are_json_rpc_errors() -> anyhow::Result<()> {
    let mut session = spawn_with_fixture("petstore.json").await?;

    let msg = call_tool(&mut session, "drop_tables", json!({})).await?;
    assert_eq!(error_code(&msg), Some(-32601), "{msg}");
    assert_eq!(msg["error"]["message"], json!("Tool not found: drop_tables"));

    let msg = call_tool(&mut session, "list_endpoints", json!({"limit": 501})).await?;
    assert_eq!(error_code(&msg), Some(-32602), "{msg}");
    assert!(msg["error"]["data"]["violations"].is_array(), "{msg}");

    let msg = call_tool(
        &mut session,
        "get_schema_details",
        json!({"name": "NonExistent"}),
    )
    .await?;
    assert_eq!(error_code(&msg), Some(-32603), "{msg}");
    assert_eq!(
        msg["error"]["message"],
        json!("Tool execution failed: Schema not found: NonExistent")
    );

    // The session survives failed calls.
    let ok = call_tool(&mut session, "list_schemas", json!({})).await?;
    assert_eq!(tool_call_text_json(&ok)?["total"], json!(6));
    Ok(())
}

#[tokio::test]
async fn stdio_serves_openapi_3_1_yaml() -> anyhow::Result<()> {
    let mut session = spawn_with_fixture("openapi-3.1.yaml").await?;

    let info = tool_call_text_json(&call_tool(&mut session, "get_api_info", json!({})).await?)?;
    assert_eq!(info["title"], json!("Task Tracker"));
    assert_eq!(info["openapi"], json!("3.1.0"));

    let task = tool_call_text_json(
        &call_tool(&mut session, "get_schema_details", json!({"name": "Task"})).await?,
    )?;
    assert_eq!(task["name"], json!("Task"));
    Ok(())
}

#[tokio::test]
async fn startup_failure_exits_non_zero_without_serving() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("missing.yaml");

    let out = tokio::time::timeout(
        TIMEOUT,
        tokio::process::Command::new(BIN)
            .arg(&missing)
            .stdin(Stdio::null())
            .output(),
    )
    .await
    .context("timeout waiting for openapi-mcp to exit")??;

    assert!(!out.status.success());
    assert!(out.stdout.is_empty(), "stdout must carry protocol frames only");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("File not found"), "{stderr}");
    Ok(())
}
