mod common;

use common::{config_with_corpus, tool_call, HashEmbedder, ScriptedChat};
use mindcare::llm::Message;
use mindcare::server::router;
use mindcare::service::CareService;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

struct TestServer {
    base: String,
    chat: Arc<ScriptedChat>,
    _tmp: TempDir,
}

async fn start() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let config = config_with_corpus(tmp.path());
    let chat = Arc::new(ScriptedChat::new(Vec::new()));
    let service = CareService::open_with(&config, chat.clone(), Arc::new(HashEmbedder))
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::new(service))).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        chat,
        _tmp: tmp,
    }
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_missing_index() {
    let server = start().await;
    let body: Value = reqwest::get(format!("{}/health", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["index_available"], false);
}

#[tokio::test]
async fn register_login_chat_and_scores() {
    let server = start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/auth/register", server.base))
        .json(&json!({ "username": "alice", "password": "secret", "email": "a@example.com", "age": "28" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let dup = client
        .post(format!("{}/auth/register", server.base))
        .json(&json!({ "username": "alice", "password": "other" }))
        .send()
        .await
        .unwrap();
    assert_eq!(dup.status(), 409);
    assert_eq!(error_code(dup).await, "conflict");

    let bad_login = client
        .post(format!("{}/auth/login", server.base))
        .json(&json!({ "username": "alice", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_login.status(), 401);

    let login: Value = client
        .post(format!("{}/auth/login", server.base))
        .json(&json!({ "username": "alice", "password": "secret" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(login["profile"]["email"], "a@example.com");
    assert!(login["profile"].get("password").is_none());

    server.chat.push(tool_call(
        "c1",
        "save_score",
        json!({ "score": "tốt", "content": "ngủ ngon", "total_guess": "ổn định" }),
    ));
    server.chat.push(Message::assistant("Tuyệt vời, hẹn gặp lại!"));
    let sent: Value = client
        .post(format!("{}/users/alice/messages", server.base))
        .json(&json!({ "content": "Hôm nay mình thấy ổn" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sent["reply"], "Tuyệt vời, hẹn gặp lại!");
    assert_eq!(sent["tool_calls"][0]["name"], "save_score");

    let history: Value = reqwest::get(format!("{}/users/alice/history", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");

    let scores: Value = reqwest::get(format!("{}/users/alice/scores?labels=Tốt", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(scores["records"].as_array().unwrap().len(), 1);
    assert_eq!(scores["records"][0]["Score"], "tốt");

    let summary: Value = reqwest::get(format!("{}/users/alice/summary", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["total"], 1);

    let cleared: Value = client
        .delete(format!("{}/users/alice/history", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["removed"], 2);
}

#[tokio::test]
async fn message_errors() {
    let server = start().await;
    let client = reqwest::Client::new();

    let unknown = client
        .post(format!("{}/users/ghost/messages", server.base))
        .json(&json!({ "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
    assert_eq!(error_code(unknown).await, "not_found");

    client
        .post(format!("{}/auth/register", server.base))
        .json(&json!({ "username": "bob", "password": "pw" }))
        .send()
        .await
        .unwrap();
    let empty = client
        .post(format!("{}/users/bob/messages", server.base))
        .json(&json!({ "content": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    let bad_filter = reqwest::get(format!("{}/users/bob/scores?since=yesterday", server.base))
        .await
        .unwrap();
    assert_eq!(bad_filter.status(), 400);
    assert_eq!(error_code(bad_filter).await, "bad_request");
}
