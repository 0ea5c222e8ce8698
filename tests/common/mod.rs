use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// What the scripted server does with each accepted connection.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Confirm the session, then answer every `message` with a streamed reply
    Answer,
    /// Confirm the session, answer once, then drop the socket
    AnswerThenDrop,
    /// Confirm the session, then fail every generation
    Fail,
}

/// A local chat server speaking the session protocol.
#[allow(dead_code)]
pub struct MockChatServer {
    /// Page URL of the server, `http://127.0.0.1:<port>`
    pub page_url: String,
    /// Request paths (with query) of every accepted connection
    pub paths: Arc<Mutex<Vec<String>>>,
    /// Every envelope the clients sent, in order
    pub received: mpsc::UnboundedReceiver<Value>,
}

#[allow(dead_code)]
impl MockChatServer {
    /// Bind to an ephemeral port and serve connections using `script`.
    ///
    /// The first connection runs `script`; later connections always run
    /// [`Script::Answer`], so a reconnected client finds a healthy server.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let addr = listener.local_addr().expect("no local addr");
        let paths = Arc::new(Mutex::new(Vec::new()));
        let (received_tx, received) = mpsc::unbounded_channel();

        let accept_paths = Arc::clone(&paths);
        tokio::spawn(async move {
            let mut connection = 0u32;
            while let Ok((stream, _)) = listener.accept().await {
                connection += 1;
                let script = if connection == 1 { script } else { Script::Answer };
                let session_id = format!("sess-{connection}");
                let paths = Arc::clone(&accept_paths);
                let received_tx = received_tx.clone();
                tokio::spawn(async move {
                    let callback = |request: &Request,
                                    response: Response|
                     -> Result<Response, ErrorResponse> {
                        let path = request
                            .uri()
                            .path_and_query()
                            .map(|p| p.to_string())
                            .unwrap_or_default();
                        paths.lock().expect("paths lock").push(path);
                        Ok(response)
                    };
                    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    serve(ws, script, &session_id, received_tx).await;
                });
            }
        });

        Self {
            page_url: format!("http://{addr}"),
            paths,
            received,
        }
    }

    /// Paths seen so far.
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().expect("paths lock").clone()
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    script: Script,
    session_id: &str,
    received_tx: mpsc::UnboundedSender<Value>,
) {
    let (mut sink, mut stream) = ws.split();
    let hello = json!({"type": "connection", "session_id": session_id});
    if sink.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    let mut next_id = 1u64;
    while let Some(Ok(frame)) = stream.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let _ = received_tx.send(envelope.clone());

        let replies = match envelope["type"].as_str() {
            Some("message") => {
                let question = envelope["message"].as_str().unwrap_or_default().to_string();
                let user_id = next_id;
                let ai_id = next_id + 1;
                next_id += 2;
                answer(&question, user_id, ai_id, script)
            }
            Some("get_history") => vec![json!({
                "type": "history",
                "messages": [
                    {"id": 1, "role": "user", "content": "Is AAPL overbought?"},
                    {"id": 2, "role": "assistant", "content": "RSI is 72, so slightly."}
                ]
            })],
            Some("cancel") => vec![json!({"type": "generation_cancelled"})],
            _ => vec![json!({"type": "error", "message": "unsupported"})],
        };

        for reply in replies {
            if sink.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
        if script == Script::AnswerThenDrop {
            let _ = sink.close().await;
            return;
        }
    }
}

fn answer(question: &str, user_id: u64, ai_id: u64, script: Script) -> Vec<Value> {
    let mut replies = vec![
        json!({"type": "message_created", "user_message_id": user_id, "ai_message_id": ai_id}),
        json!({"type": "generation_started", "message_id": ai_id}),
    ];
    if script == Script::Fail {
        replies.push(json!({"type": "token", "message_id": ai_id, "token": "Partial"}));
        replies.push(json!({
            "type": "generation_error",
            "message_id": ai_id,
            "error": "model overloaded"
        }));
        return replies;
    }
    let text = format!("You asked: {question}");
    for word in text.split_inclusive(' ') {
        replies.push(json!({"type": "token", "message_id": ai_id, "token": word}));
    }
    replies.push(json!({"type": "generation_completed", "message_id": ai_id, "message": text}));
    replies
}
