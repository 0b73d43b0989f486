use axum::response::Html;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Skynet Gateway</title></head>
<body>
<h1>Skynet Gateway</h1>
<p>This node has no bundled web UI. Use <code>POST /chat</code> (SSE) or a
companion app that speaks the HTTP surface documented in the project's
operator guide.</p>
</body>
</html>
"#;

/// `GET /` — a minimal landing page; the real client is the companion app.
pub async fn ui_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}
