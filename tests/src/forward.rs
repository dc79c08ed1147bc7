use std::sync::Arc;

use common::{addr::Lookup, stream::StreamKind};
use fetch::fetch_url;
use hyper::{Method, Uri};
use proxy_agent::{ConnectRequest, CreateConnection, TargetProtocol};
use tokio::io::AsyncWriteExt;

use crate::mock::{FixedLookup, RecordingTls, WAIT, agent, round_trip, spawn_http_proxy};

#[tokio::test(flavor = "multi_thread")]
async fn forward_absolute_form() {
    let (proxy_addr, proxy) =
        spawn_http_proxy(Some("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")).await;
    let tls = Arc::new(RecordingTls::default());
    let pair = agent(
        &format!(r#"proxy = "http://user:pass@{proxy_addr}""#),
        tls,
    );

    let uri: Uri = "http://example.com/path?q=1".parse().unwrap();
    let resp = fetch_url(&pair, &uri, Method::GET).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.body().as_ref(), b"ok");

    let head = tokio::time::timeout(WAIT, proxy).await.unwrap().unwrap();
    assert!(head.starts_with("GET http://example.com/path?q=1 HTTP/1.1\r\n"));
    assert!(head.contains("Host: example.com\r\n"));
    assert!(head.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
    assert!(head.contains("Proxy-Connection: close\r\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn forward_keeps_explicit_port() {
    let (proxy_addr, proxy) =
        spawn_http_proxy(Some("HTTP/1.1 204 No Content\r\n\r\n")).await;
    let tls = Arc::new(RecordingTls::default());
    let pair = agent(&format!(r#"proxy = "http://{proxy_addr}""#), tls);

    let uri: Uri = "http://example.com:8080/".parse().unwrap();
    let resp = fetch_url(&pair, &uri, Method::HEAD).await.unwrap();
    assert_eq!(resp.status(), 204);

    let head = tokio::time::timeout(WAIT, proxy).await.unwrap().unwrap();
    assert!(head.starts_with("HEAD http://example.com:8080/ HTTP/1.1\r\n"));
    assert!(head.contains("Host: example.com:8080\r\n"));
    assert!(!head.contains("Proxy-Authorization"));
}

#[tokio::test(flavor = "multi_thread")]
async fn forward_through_https_proxy() {
    let (proxy_addr, proxy) = spawn_http_proxy(None).await;
    let tls = Arc::new(RecordingTls::default());
    let pair = agent(
        &format!(r#"proxy = "https://localhost:{}""#, proxy_addr.port()),
        tls.clone(),
    );
    let lookup = Arc::new(FixedLookup::new("127.0.0.1"));

    let req = ConnectRequest::new(TargetProtocol::Http, "example.com", 80)
        .with_lookup(Arc::clone(&lookup) as Arc<dyn Lookup>);
    let mut stream = pair.create_connection(&req).await.unwrap();
    assert_eq!(stream.kind(), StreamKind::Proxy);
    assert_eq!(
        stream.peer().to_string(),
        format!("localhost:{}", proxy_addr.port())
    );
    stream
        .write_all(b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n")
        .await
        .unwrap();
    round_trip(&mut stream, b"hello").await;
    drop(stream);

    assert_eq!(*tls.server_names.lock().unwrap(), ["localhost"]);
    let head = tokio::time::timeout(WAIT, proxy).await.unwrap().unwrap();
    assert!(head.starts_with("GET http://example.com/ HTTP/1.1\r\n"));
}
