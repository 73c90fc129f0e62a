//! Fakes shared by the unit tests.

use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::dispatch::ResponseSink;
use crate::error::ExecutionError;
use crate::executor::CommandRunner;

/// Sink that keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("sink lock")
            .clone()
    }
}

#[async_trait]
impl ResponseSink for RecordingSink {
    async fn send(&self, text: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(text.to_string());
        }
    }
}

type Hook = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Runner that records command lines and fails those matching a prefix.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<String>>,
    fail_prefix: Option<String>,
    hook: Option<Hook>,
}

impl FakeRunner {
    pub fn failing_on(prefix: &str) -> Self {
        Self {
            fail_prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    pub fn fail_on(mut self, prefix: &str) -> Self {
        self.fail_prefix = Some(prefix.to_string());
        self
    }

    /// Runs `hook` for every successful call, e.g. to create files.
    pub fn with_hook(hook: impl Fn(&str) -> Result<(), String> + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn execute(&self, command_line: &str) -> Result<(), ExecutionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command_line.to_string());
        }
        if let Some(prefix) = &self.fail_prefix {
            if command_line.starts_with(prefix.as_str()) {
                return Err(ExecutionError::new(command_line, "exit status: 1"));
            }
        }
        if let Some(hook) = &self.hook {
            hook(command_line).map_err(|e| ExecutionError::new(command_line, e))?;
        }
        Ok(())
    }
}

/// Serve exactly one HTTP request with a canned response.
/// The join handle yields the raw request (headers and body).
pub async fn serve_once(status_line: &str, body: &str) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return String::new();
        };
        let request = read_request(&mut stream).await;
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
        request
    });
    (addr, handle)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
