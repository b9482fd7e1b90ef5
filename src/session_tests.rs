use super::*;

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    thread,
};

use crossbeam_channel::{Receiver, unbounded};
use rstest::{fixture, rstest};

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

struct Reply {
    status: u16,
    headers: Vec<(&'static str, &'static str)>,
    body: &'static str,
}

fn reply(body: &'static str) -> Reply {
    Reply {
        status: 200,
        headers: Vec::new(),
        body,
    }
}

fn read_request(stream: &mut TcpStream) -> CapturedRequest {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .expect("read request line");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let path = parts.next().unwrap_or_default().to_owned();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header");
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_owned();
        if key == "content-length" {
            content_length = value.parse().unwrap_or(0);
        }
        headers.push((key, value));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).expect("read body");

    CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    }
}

/// Serve `replies` in order, one connection each, reporting every request.
fn spawn_console(listener: TcpListener, replies: Vec<Reply>) -> (SocketAddr, Receiver<CapturedRequest>) {
    let addr = listener.local_addr().expect("listener address");
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for reply in replies {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let request = read_request(&mut stream);
            let _ = tx.send(request);
            let mut response = format!(
                "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                reply.status,
                reply.body.len()
            );
            for (key, value) in &reply.headers {
                response.push_str(&format!("{key}: {value}\r\n"));
            }
            response.push_str("\r\n");
            response.push_str(reply.body);
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });
    (addr, rx)
}

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

fn client_for(addr: SocketAddr) -> SessionClient {
    SessionClient::new(&format!("http://{addr}"), Duration::from_secs(5)).expect("valid base")
}

fn next_request(rx: &Receiver<CapturedRequest>) -> CapturedRequest {
    rx.recv_timeout(Duration::from_secs(5)).expect("request")
}

#[rstest]
fn login_posts_credentials_and_replays_cookie(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_console(
        tcp_listener,
        vec![
            Reply {
                status: 200,
                headers: vec![("Set-Cookie", "id=abc123; Path=/; HttpOnly")],
                body: r#"{"result":"ok"}"#,
            },
            reply(r#"{"user_id":"admin"}"#),
        ],
    );
    let client = client_for(addr);

    client.login("admin", "secret").expect("login succeeds");
    let login = next_request(&rx);
    assert_eq!(login.method, "POST");
    assert_eq!(login.path, "/auth/login");
    assert_eq!(login.header("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_str(&login.body).expect("json body");
    assert_eq!(body["username"], "admin");
    assert_eq!(body["password"], "secret");

    let info = client.session().expect("session succeeds");
    assert!(info.is_authenticated());
    assert_eq!(info.user_id, "admin");
    let session = next_request(&rx);
    assert_eq!(session.path, "/auth/session");
    assert_eq!(session.header("cookie"), Some("id=abc123"));
}

#[rstest]
fn rejected_login_reports_message(tcp_listener: TcpListener) {
    let (addr, _rx) = spawn_console(
        tcp_listener,
        vec![reply(
            r#"{"result":"error","message":"Invalid username or password"}"#,
        )],
    );
    let err = client_for(addr)
        .login("admin", "wrong")
        .expect_err("login must be rejected");
    assert!(
        matches!(&err, SessionError::Rejected(message) if message == "Invalid username or password"),
        "unexpected error {err}"
    );
}

#[rstest]
fn first_start_session_reports_guide(tcp_listener: TcpListener) {
    let (addr, _rx) = spawn_console(tcp_listener, vec![reply(r#"{"guide":true}"#)]);
    let info = client_for(addr).session().expect("session succeeds");
    assert!(info.guide);
    assert!(!info.is_authenticated());
}

#[rstest]
fn mqtt_user_and_logout(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_console(
        tcp_listener,
        vec![reply(r#"{"user":"tyme-7"}"#), reply(r#"{"result":"ok"}"#)],
    );
    let client = client_for(addr);
    assert_eq!(client.mqtt_user().expect("mqtt user"), "tyme-7");
    assert_eq!(next_request(&rx).path, "/c/get-mqtt-user");
    client.logout().expect("logout succeeds");
    let logout = next_request(&rx);
    assert_eq!(logout.method, "GET");
    assert_eq!(logout.path, "/auth/logout");
}

#[rstest]
fn http_errors_carry_status(tcp_listener: TcpListener) {
    let (addr, _rx) = spawn_console(
        tcp_listener,
        vec![Reply {
            status: 503,
            headers: Vec::new(),
            body: "{}",
        }],
    );
    let err = client_for(addr).session().expect_err("503 must fail");
    assert!(
        matches!(err, SessionError::Status { status: 503, .. }),
        "unexpected error {err}"
    );
}

#[rstest]
fn malformed_body_is_reported(tcp_listener: TcpListener) {
    let (addr, _rx) = spawn_console(tcp_listener, vec![reply("not json")]);
    let err = client_for(addr).mqtt_user().expect_err("bad body must fail");
    assert!(matches!(err, SessionError::Json { .. }), "unexpected error {err}");
}

#[rstest]
#[case("http://console.local", "ws://console.local/c/ws")]
#[case("https://console.local", "wss://console.local/c/ws")]
#[case("http://10.0.0.5:3000/login", "ws://10.0.0.5:3000/c/ws")]
fn socket_address_follows_base_scheme(#[case] base: &str, #[case] expected: &str) {
    let client = SessionClient::new(base, Duration::from_secs(1)).expect("valid base");
    assert_eq!(
        client.socket_address().expect("valid address").as_str(),
        expected
    );
}

#[rstest]
#[case("not a url")]
#[case("ftp://console.local")]
fn rejects_bad_base(#[case] base: &str) {
    assert!(SessionClient::new(base, Duration::from_secs(1)).is_err());
}

#[rstest]
#[case("id=abc; Path=/", Some(("id", "abc")))]
#[case("token=; Max-Age=0", Some(("token", "")))]
#[case("=orphan", None)]
#[case("garbage", None)]
fn parses_set_cookie(#[case] raw: &str, #[case] expected: Option<(&str, &str)>) {
    let parsed = parse_set_cookie(raw);
    assert_eq!(
        parsed.as_ref().map(|(n, v)| (n.as_str(), v.as_str())),
        expected
    );
}
