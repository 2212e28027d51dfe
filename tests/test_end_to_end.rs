mod helpers;

use axum::http::StatusCode;
use helpers::*;
use reprow::bootstrap;
use reprow::config::Config;
use reprow::infrastructure::registry::Registry;
use serde_json::json;
use std::io::Write;

#[tokio::test]
async fn test_lines_in_file_reach_the_application() {
    let app = spawn_app(Reply::status(StatusCode::OK)).await;
    let mut file = tempfile::NamedTempFile::new().unwrap();

    let config = Config::from_yaml(&format!(
        r#"
queue:
  name: fifo
  config:
    path: {}
    poll_interval: 20ms
runner:
  name: http_proxy
  config:
    url: {}
    concurrency: 2
    timeout: 2s
"#,
        file.path().display(),
        app.url
    ))
    .unwrap();

    let registry = Registry::with_builtin().unwrap();
    let dispatcher = bootstrap::build_dispatcher(&registry, &config).unwrap();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(dispatcher.run(async move {
        let _ = stopped.await;
    }));

    for n in 1..=3 {
        writeln!(file, "{{\"n\":{n}}}").unwrap();
    }
    file.flush().unwrap();

    eventually(|| app.requests().len() == 3).await;
    stop.send(()).unwrap();
    within(running).await.unwrap().unwrap();

    let mut bodies: Vec<_> = app.requests().into_iter().map(|r| r.body).collect();
    bodies.sort_by_key(|b| b["n"].as_u64());
    assert_eq!(bodies, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
}
