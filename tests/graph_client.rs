//! Integration tests for the Graph REST client.
//!
//! Sign-in and every API call are pointed at an in-process HTTP responder that
//! records what it receives, so the tests can check the wire shape of the
//! token request, the upload chunks and the error mapping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use mail_dispatch::config::{GraphSettings, UPLOAD_CHUNK_GRANULARITY};
use mail_dispatch::domain::{MessageSpec, ResolvedAttachment, SendResult, UploadUrl};
use mail_dispatch::providers::email::{
    EnvelopeTransport, GraphAdapter, GraphClient, GraphMessage, MailApi, MailboxTarget,
    UploadSession,
};
use mail_dispatch::services::EnvelopeBuilder;
use mail_dispatch::DispatchError;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

// ============================================================================
// Fake HTTP server
// ============================================================================

/// One request as the responder received it.
#[derive(Debug, Clone)]
struct Request {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Route = fn(&str, &Request) -> (u16, String);

/// Answers every connection with `route` and keeps a log of requests.
struct HttpServer {
    base: String,
    log: Arc<Mutex<Vec<Request>>>,
}

impl HttpServer {
    async fn start(route: Route) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));

        let server_base = base.clone();
        let server_log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let base = server_base.clone();
                let log = Arc::clone(&server_log);
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let Some(request) = read_request(BufReader::new(read)).await else {
                        return;
                    };
                    let (status, body) = route(&base, &request);
                    log.lock().unwrap().push(request);

                    let response = format!(
                        "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = write.write_all(response.as_bytes()).await;
                    let _ = write.shutdown().await;
                });
            }
        });

        Self { base, log }
    }

    fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    fn settings(&self) -> GraphSettings {
        GraphSettings {
            authority_host: self.base.clone(),
            api_base: format!("{}/v1.0", self.base),
            upload_chunk_size: UPLOAD_CHUNK_GRANULARITY,
            ..GraphSettings::new("app-1", "contoso", "user@contoso.com", "p@ss w0rd&more")
        }
    }

    fn client(&self) -> GraphClient {
        let api_base = Url::parse(&format!("{}/v1.0", self.base)).unwrap();
        GraphClient::with_token(http(), api_base, "tok-123".to_string())
    }
}

async fn read_request<R>(mut reader: BufReader<R>) -> Option<Request>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).await.ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        let (key, value) = header.split_once(':')?;
        headers.push((key.trim().to_string(), value.trim().to_string()));
    }

    let length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.ok()?;

    Some(Request {
        method,
        path,
        headers,
        body,
    })
}

/// A well-behaved Graph service.
fn graph_service(base: &str, request: &Request) -> (u16, String) {
    let path = request.path.as_str();
    match request.method.as_str() {
        "POST" if path.ends_with("/oauth2/v2.0/token") => (
            200,
            json!({"access_token": "tok-123", "expires_in": 3600, "token_type": "Bearer"})
                .to_string(),
        ),
        "POST" if path.ends_with("/createUploadSession") => (
            201,
            json!({
                "uploadUrl": format!("{}/upload/1", base),
                "expirationDateTime": "2030-01-01T00:00:00Z",
                "nextExpectedRanges": ["0-"]
            })
            .to_string(),
        ),
        "POST" if path.ends_with("/messages") => (201, json!({"id": "draft-1"}).to_string()),
        "POST" if path.ends_with("/send") || path.ends_with("/sendMail") => (202, String::new()),
        "PUT" if path.starts_with("/upload/") => (200, json!({"nextExpectedRanges": []}).to_string()),
        _ => (404, json!({"error": {"code": "NotFound"}}).to_string()),
    }
}

/// Fails by mailbox name so one server covers every status.
fn failing_service(_base: &str, request: &Request) -> (u16, String) {
    let body = json!({"error": {"code": "Failed", "message": "nope"}}).to_string();
    if request.path.contains("expired") {
        (401, body)
    } else if request.path.contains("denied") {
        (403, body)
    } else if request.path.contains("/oauth2/") {
        (400, json!({"error": "invalid_grant"}).to_string())
    } else {
        (500, body)
    }
}

/// HTTP client that ignores proxy settings from the environment.
fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn message() -> GraphMessage {
    let envelope = EnvelopeBuilder::new()
        .build(&MessageSpec::new("a@x.com", "Hi", "Body"), Vec::new())
        .unwrap();
    GraphMessage::from_envelope(&envelope)
}

// ============================================================================
// Sign-in Tests
// ============================================================================

#[tokio::test]
async fn sign_in_posts_password_grant_form() {
    let server = HttpServer::start(graph_service).await;

    GraphClient::sign_in_with(http(), &server.settings())
        .await
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let token = &requests[0];
    assert_eq!(token.method, "POST");
    assert_eq!(token.path, "/contoso/oauth2/v2.0/token");
    assert_eq!(
        token.header("content-type"),
        Some("application/x-www-form-urlencoded")
    );

    let form: HashMap<String, String> = url::form_urlencoded::parse(&token.body)
        .into_owned()
        .collect();
    assert_eq!(form["client_id"], "app-1");
    assert_eq!(form["grant_type"], "password");
    assert_eq!(form["username"], "user@contoso.com");
    assert_eq!(form["password"], "p@ss w0rd&more");
    assert_eq!(form["scope"], format!("{}/.default", server.base));
    assert_eq!(form.len(), 5);
}

#[tokio::test]
async fn rejected_sign_in_is_an_authentication_error() {
    let server = HttpServer::start(failing_service).await;

    let result = GraphClient::sign_in_with(http(), &server.settings()).await;

    match result {
        Err(DispatchError::Authentication(message)) => assert!(message.contains("invalid_grant")),
        Err(other) => panic!("expected authentication error, got {:?}", other),
        Ok(_) => panic!("expected authentication error"),
    }
}

#[tokio::test]
async fn invalid_settings_never_reach_the_authority() {
    let server = HttpServer::start(graph_service).await;
    let settings = GraphSettings {
        password: String::new(),
        ..server.settings()
    };

    let result = GraphClient::sign_in_with(http(), &settings).await;

    assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));
    assert!(server.requests().is_empty());
}

// ============================================================================
// API Call Tests
// ============================================================================

#[tokio::test]
async fn message_without_attachments_uses_send_mail() {
    let server = HttpServer::start(graph_service).await;
    let client = GraphClient::sign_in_with(http(), &server.settings())
        .await
        .unwrap();
    let envelope = EnvelopeBuilder::new()
        .build(&MessageSpec::new("a@x.com", "Hi", "Body"), Vec::new())
        .unwrap();

    let result = GraphAdapter::new(client, UPLOAD_CHUNK_GRANULARITY)
        .send(&envelope, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result, SendResult::sent("a@x.com"));

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    let send = &requests[1];
    assert_eq!(send.method, "POST");
    assert_eq!(send.path, "/v1.0/me/sendMail");
    assert_eq!(send.header("authorization"), Some("Bearer tok-123"));

    let body = send.json();
    assert_eq!(body["saveToSentItems"], json!(true));
    assert_eq!(body["message"]["subject"], json!("Hi"));
    assert_eq!(
        body["message"]["toRecipients"][0]["emailAddress"]["address"],
        json!("a@x.com")
    );
}

#[tokio::test]
async fn attachment_is_drafted_uploaded_in_chunks_then_sent() {
    let server = HttpServer::start(graph_service).await;
    let client = GraphClient::sign_in_with(http(), &server.settings())
        .await
        .unwrap();

    let total = UPLOAD_CHUNK_GRANULARITY + 10;
    let data: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
    let spec = MessageSpec::new("a@x.com", "Report", "Attached").from("shared@contoso.com", "");
    let envelope = EnvelopeBuilder::new()
        .build(&spec, vec![ResolvedAttachment::new("scan.pdf", data.clone())])
        .unwrap();

    GraphAdapter::new(client, UPLOAD_CHUNK_GRANULARITY)
        .send(&envelope, &CancellationToken::new())
        .await
        .unwrap();

    let requests = server.requests();
    let calls: Vec<(&str, &str)> = requests
        .iter()
        .map(|r| (r.method.as_str(), r.path.as_str()))
        .collect();
    assert_eq!(
        calls,
        vec![
            ("POST", "/contoso/oauth2/v2.0/token"),
            ("POST", "/v1.0/users/shared@contoso.com/messages"),
            (
                "POST",
                "/v1.0/users/shared@contoso.com/messages/draft-1/attachments/createUploadSession"
            ),
            ("PUT", "/upload/1"),
            ("PUT", "/upload/1"),
            ("POST", "/v1.0/users/shared@contoso.com/messages/draft-1/send"),
        ]
    );

    let draft = requests[1].json();
    assert_eq!(draft["subject"], json!("Report"));
    assert_eq!(requests[1].header("authorization"), Some("Bearer tok-123"));

    let session = requests[2].json();
    assert_eq!(
        session,
        json!({
            "AttachmentItem": {
                "attachmentType": "file",
                "name": "scan.pdf",
                "size": total,
                "contentType": "application/pdf"
            }
        })
    );

    let split = UPLOAD_CHUNK_GRANULARITY;
    let first = &requests[3];
    assert_eq!(
        first.header("content-range"),
        Some(format!("bytes 0-{}/{}", split - 1, total).as_str())
    );
    assert_eq!(first.header("content-type"), Some("application/octet-stream"));
    assert_eq!(first.header("authorization"), None);
    assert_eq!(first.body, &data[..split]);

    let second = &requests[4];
    assert_eq!(
        second.header("content-range"),
        Some(format!("bytes {}-{}/{}", split, total - 1, total).as_str())
    );
    assert_eq!(second.header("authorization"), None);
    assert_eq!(second.body, &data[split..]);

    let send = &requests[5];
    assert!(send.body.is_empty());
    assert_eq!(send.header("content-length").unwrap_or("0"), "0");
    assert_eq!(send.header("authorization"), Some("Bearer tok-123"));
}

#[tokio::test]
async fn upload_chunk_range_follows_offset() {
    let server = HttpServer::start(graph_service).await;
    let session = UploadSession {
        upload_url: UploadUrl::from(format!("{}/upload/1", server.base).as_str()),
        next_expected_ranges: vec!["5-".to_string()],
    };

    server
        .client()
        .upload_chunk(&session, 5, 8, Bytes::from_static(b"xyz"))
        .await
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header("content-range"), Some("bytes 5-7/8"));
    assert_eq!(requests[0].body, b"xyz");
}

// ============================================================================
// Error Mapping Tests
// ============================================================================

#[tokio::test]
async fn unauthorized_and_forbidden_are_authentication_errors() {
    let server = HttpServer::start(failing_service).await;
    let client = server.client();

    for mailbox in ["expired@x.com", "denied@x.com"] {
        let result = client
            .send_mail(&MailboxTarget::User(mailbox.to_string()), &message())
            .await;
        assert!(
            matches!(result, Err(DispatchError::Authentication(_))),
            "{}: {:?}",
            mailbox,
            result
        );
    }
}

#[tokio::test]
async fn other_statuses_are_transport_errors() {
    let server = HttpServer::start(failing_service).await;
    let client = server.client();

    let result = client
        .create_draft(&MailboxTarget::User("broken@x.com".to_string()), &message())
        .await;
    match result {
        Err(DispatchError::Transport(message)) => {
            assert!(message.contains("500"));
            assert!(message.contains("nope"));
        }
        other => panic!("expected transport error, got {:?}", other),
    }

    let session = UploadSession {
        upload_url: UploadUrl::from(format!("{}/upload/broken", server.base).as_str()),
        next_expected_ranges: Vec::new(),
    };
    let result = client
        .upload_chunk(&session, 0, 3, Bytes::from_static(b"abc"))
        .await;
    assert!(matches!(result, Err(DispatchError::Transport(_))));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = GraphClient::with_token(
        http(),
        Url::parse(&format!("{}/v1.0", base)).unwrap(),
        "tok".to_string(),
    );
    let result = client.send_draft(&MailboxTarget::Me, &"draft-1".into()).await;

    assert!(matches!(result, Err(DispatchError::Transport(_))));
}
