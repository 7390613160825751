use axum::Router;
use serde_json::json;
use tests::{authenticated_backend, spawn_stub, stub_route, token_set, Recorder, Reply};

#[tokio::test]
async fn lists_backend_tools() {
    let recorder = Recorder::new();
    let tools = json!([
        {"name": "read_file", "description": "Reads a file", "inputSchema": {"type": "object"}},
        {"name": "list_dir"}
    ]);
    let app = Router::new().route("/llm/tools", stub_route(&recorder, vec![Reply::json(tools)]));
    let (base, _shutdown) = spawn_stub(app).await.unwrap();
    let backend = authenticated_backend(&base, token_set("tok-1", 300))
        .await
        .unwrap();

    let listed = backend.list_tools().await.unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "read_file");
    assert_eq!(listed[0].description.as_deref(), Some("Reads a file"));
    assert_eq!(listed[1].description, None);
    assert_eq!(
        recorder.to("/llm/tools")[0].authorization.as_deref(),
        Some("Bearer tok-1")
    );
}
