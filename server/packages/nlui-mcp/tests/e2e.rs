use std::time::Duration;

use nlui_mcp::{serve, ServerConfig};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use url::Url;

struct RunningServer {
    base: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let mut config = ServerConfig::new(Url::parse("http://ui.test/render").expect("base url"));
        config.sweep_interval = Duration::from_secs(60);

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, config, async move {
            let _ = rx.await;
        }));
        Self {
            base: format!("http://{addr}"),
            shutdown: Some(tx),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server stops")
            .expect("server task");
        result.expect("server exits cleanly");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn render_then_fetch_over_tcp() {
    let server = RunningServer::start().await;
    let client = reqwest::Client::new();
    let arguments = json!({"block": {"main": {"kind": "card", "cardProps": {"title": "Hi"}}}});

    let response = client
        .post(format!("{}/mcp", server.base))
        .header("accept", "application/json, text/event-stream")
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "ui-render", "arguments": arguments}
        }))
        .send()
        .await
        .expect("post /mcp");
    assert_eq!(response.status().as_u16(), 200);
    let payload: Value = response.json().await.expect("events json");
    let uri = payload["events"][0]["data"]["result"]["content"][0]["resource"]["uri"]
        .as_str()
        .expect("resource uri")
        .to_string();
    assert!(uri.starts_with("http://ui.test/render?instanceId="), "{uri}");
    let instance_id = uri.rsplit('=').next().expect("instance id");

    let response = client
        .get(format!("{}/instances/{instance_id}", server.base))
        .send()
        .await
        .expect("get instance");
    assert_eq!(response.status().as_u16(), 200);
    let stored: Value = response.json().await.expect("stored json");
    assert_eq!(stored, arguments);

    let missing = uuid::Uuid::new_v4();
    let response = client
        .get(format!("{}/instances/{missing}", server.base))
        .send()
        .await
        .expect("get missing instance");
    assert_eq!(response.status().as_u16(), 404);

    server.stop().await;
}
