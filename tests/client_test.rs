mod common;

use common::{head_only, response, TestServer};
use http::StatusCode;
use httpengine::socket::proxy::ProxySettings;
use httpengine::{Client, ClientConfig, NetError, ResponseSource};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

#[test]
fn test_simple_get() {
    let server = TestServer::start(|_| response("200 OK", &[("Content-Type", "text/plain")], b"hi"));
    let client = Client::new().unwrap();

    let resp = client.get(server.url("/hello")).send().unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.source(), Some(ResponseSource::Network));
    assert_eq!(resp.headers().get_str("content-type"), Some("text/plain"));
    assert_eq!(resp.text().unwrap(), "hi");

    let seen = &server.requests()[0];
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.target, "/hello");
    assert_eq!(seen.header("host"), Some(server.addr.to_string().as_str()));
    assert!(seen.header("user-agent").unwrap().starts_with("httpengine/"));
    assert_eq!(seen.header("connection"), Some("Keep-Alive"));
}

#[test]
fn test_keep_alive_reuses_connection() {
    let server = TestServer::start(|_| response("200 OK", &[], b"ok"));
    let client = Client::new().unwrap();

    for _ in 0..3 {
        assert_eq!(client.get(server.url("/")).send().unwrap().text().unwrap(), "ok");
    }
    assert_eq!(server.connection_count(), 1);
    let stats = client.pool().stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.reused, 2);
}

#[test]
fn test_connection_close_is_not_reused() {
    let server = TestServer::start(|_| response("200 OK", &[("Connection", "close")], b"bye"));
    let client = Client::new().unwrap();

    for _ in 0..2 {
        assert_eq!(client.get(server.url("/")).send().unwrap().text().unwrap(), "bye");
    }
    assert_eq!(server.connection_count(), 2);
    assert_eq!(client.pool().idle_count(), 0);
}

#[test]
fn test_redirect_hands_connection_to_next_hop() {
    let server = TestServer::start(|req| match req.target.as_str() {
        "/start" => response("302 Found", &[("Location", "/end")], b"moved"),
        _ => response("200 OK", &[], b"arrived"),
    });
    let client = Client::new().unwrap();

    let resp = client.get(server.url("/start")).send().unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().unwrap(), "arrived");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].target, "/end");
    assert_eq!(requests[0].connection, requests[1].connection);
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_see_other_turns_post_into_get() {
    let server = TestServer::start(|req| match req.target.as_str() {
        "/form" => response("303 See Other", &[("Location", "/result")], b""),
        _ => response("200 OK", &[], req.method.as_bytes()),
    });
    let client = Client::new().unwrap();

    let resp = client
        .post(server.url("/form"))
        .header("Content-Type", "text/plain")
        .body("payload")
        .send()
        .unwrap();
    assert_eq!(resp.text().unwrap(), "GET");

    let requests = server.requests();
    assert_eq!(requests[0].body, b"payload");
    assert!(requests[1].body.is_empty());
    assert!(requests[1].header("content-type").is_none());
}

#[test]
fn test_temporary_redirect_keeps_method_and_body() {
    let server = TestServer::start(|req| match req.target.as_str() {
        "/old" => response("307 Temporary Redirect", &[("Location", "/new")], b""),
        _ => response("200 OK", &[], &req.body),
    });
    let client = Client::new().unwrap();

    let resp = client.put(server.url("/old")).body("same body").send().unwrap();
    assert_eq!(resp.text().unwrap(), "same body");
    assert_eq!(server.requests()[1].method, "PUT");
}

#[test]
fn test_too_many_redirects() {
    let server = TestServer::start(|_| response("302 Found", &[("Location", "/loop")], b""));
    let client = Client::builder().max_redirects(3).build().unwrap();

    let err = client.get(server.url("/loop")).send().unwrap_err();
    assert_eq!(err, NetError::TooManyRedirects);
    assert_eq!(server.request_count(), 4);
}

#[test]
fn test_redirects_not_followed_when_disabled() {
    let server = TestServer::start(|_| response("301 Moved Permanently", &[("Location", "/x")], b""));
    let client = Client::builder().follow_redirects(false).build().unwrap();

    let resp = client.get(server.url("/")).send().unwrap();
    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(resp.headers().get_str("location"), Some("/x"));
    assert_eq!(server.request_count(), 1);
}

#[test]
fn test_cookies_round_trip() {
    let server = TestServer::start(|req| match req.target.as_str() {
        "/login" => response("200 OK", &[("Set-Cookie", "session=abc123; Path=/")], b""),
        _ => response("200 OK", &[], req.header("cookie").unwrap_or("").as_bytes()),
    });
    let client = Client::new().unwrap();

    client.get(server.url("/login")).send().unwrap().text().unwrap();
    let echoed = client.get(server.url("/me")).send().unwrap().text().unwrap();
    assert_eq!(echoed, "session=abc123");
    assert_eq!(client.cookie_store().unwrap().total_cookie_count(), 1);
}

#[test]
fn test_caller_cookie_header_wins() {
    let server = TestServer::start(|req| match req.target.as_str() {
        "/login" => response("200 OK", &[("Set-Cookie", "session=abc123")], b""),
        _ => response("200 OK", &[], req.header("cookie").unwrap_or("").as_bytes()),
    });
    let client = Client::new().unwrap();

    client.get(server.url("/login")).send().unwrap().text().unwrap();
    let echoed = client
        .get(server.url("/me"))
        .header("Cookie", "mine=1")
        .send()
        .unwrap()
        .text()
        .unwrap();
    assert_eq!(echoed, "mine=1");
}

#[test]
fn test_cookies_disabled() {
    let server = TestServer::start(|req| match req.target.as_str() {
        "/login" => response("200 OK", &[("Set-Cookie", "session=abc123")], b""),
        _ => response("200 OK", &[], req.header("cookie").unwrap_or("none").as_bytes()),
    });
    let client = Client::builder().no_cookies().build().unwrap();

    client.get(server.url("/login")).send().unwrap().text().unwrap();
    assert_eq!(client.get(server.url("/me")).send().unwrap().text().unwrap(), "none");
    assert!(client.cookie_store().is_none());
}

/// A loopback port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_connection_refused() {
    let client = Client::new().unwrap();
    let err = client
        .get(format!("http://127.0.0.1:{}/", closed_port()))
        .send()
        .unwrap_err();
    assert_eq!(err, NetError::ConnectionRefused);
}

#[test]
fn test_refused_route_falls_back_to_next_address() {
    let server = TestServer::start(|_| response("200 OK", &[], b"second route"));
    let port = server.addr.port();
    let dead: SocketAddr = "127.0.0.2:0".parse().unwrap();
    let live: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .resolve_to_addrs("service.test", &[dead, live])
        .build()
        .unwrap();

    let resp = client
        .get(format!("http://service.test:{port}/"))
        .send()
        .unwrap();
    assert_eq!(resp.text().unwrap(), "second route");
    assert_eq!(server.requests()[0].header("host"), Some(format!("service.test:{port}").as_str()));
}

#[test]
fn test_stale_pooled_connection_is_retried() {
    // The server hangs up after the first answer without announcing it.
    let server = TestServer::start(|req| match req.target.as_str() {
        "/first" => response("200 OK", &[("X-Hangup", "1")], b"first"),
        _ => response("200 OK", &[], b"second"),
    });
    let client = Client::new().unwrap();

    assert_eq!(client.get(server.url("/first")).send().unwrap().text().unwrap(), "first");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(client.get(server.url("/second")).send().unwrap().text().unwrap(), "second");
    assert_eq!(server.connection_count(), 2);
}

#[test]
fn test_idle_connections_expire() {
    let server = TestServer::start(|_| response("200 OK", &[], b"fine"));
    let client = Client::builder()
        .keep_alive(Duration::from_millis(1))
        .build()
        .unwrap();

    assert_eq!(client.get(server.url("/")).send().unwrap().text().unwrap(), "fine");
    assert_eq!(client.pool().idle_count(), 1);
    std::thread::sleep(Duration::from_millis(20));
    client.cleanup_idle();
    assert_eq!(client.pool().idle_count(), 0);
    assert_eq!(client.get(server.url("/")).send().unwrap().text().unwrap(), "fine");
    assert_eq!(server.connection_count(), 2);
}

#[test]
fn test_request_through_proxy_uses_absolute_form() {
    let proxy = TestServer::start(|_| response("200 OK", &[], b"via proxy"));
    let settings = ProxySettings::new(&format!("http://user:pw@{}", proxy.addr)).unwrap();
    let client = Client::builder().proxy(settings).build().unwrap();

    let resp = client.get("http://origin.test/path?q=1").send().unwrap();
    assert_eq!(resp.text().unwrap(), "via proxy");

    let seen = &proxy.requests()[0];
    assert_eq!(seen.target, "http://origin.test/path?q=1");
    assert_eq!(seen.header("host"), Some("origin.test"));
    assert_eq!(seen.header("proxy-authorization"), Some("Basic dXNlcjpwdw=="));
}

#[test]
fn test_chunked_response() {
    let server = TestServer::start(|_| {
        let mut resp = head_only("200 OK", &[("Transfer-Encoding", "chunked")]);
        resp.extend_from_slice(b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n");
        resp
    });
    let client = Client::new().unwrap();

    let resp = client.get(server.url("/")).send().unwrap();
    assert_eq!(resp.text().unwrap(), "hello world");
    assert_eq!(client.get(server.url("/")).send().unwrap().text().unwrap(), "hello world");
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_close_delimited_response() {
    let server = TestServer::start(|_| {
        let mut resp = head_only("200 OK", &[("Connection", "close")]);
        resp.extend_from_slice(b"until eof");
        resp
    });
    let client = Client::new().unwrap();

    let resp = client.get(server.url("/")).send().unwrap();
    assert_eq!(resp.text().unwrap(), "until eof");
    assert_eq!(client.pool().idle_count(), 0);
}

#[cfg(feature = "json")]
#[test]
fn test_json_request_and_response() {
    let server = TestServer::start(|req| {
        assert_eq!(req.header("content-type"), Some("application/json"));
        response("200 OK", &[("Content-Type", "application/json")], &req.body)
    });
    let client = Client::new().unwrap();

    let sent = serde_json::json!({ "name": "engine", "count": 2 });
    let echoed: serde_json::Value = client
        .post(server.url("/echo"))
        .json(&sent)
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(echoed, sent);
}

#[test]
fn test_builder_from_config() {
    let server = TestServer::start(|req| {
        response("200 OK", &[], req.header("user-agent").unwrap_or("").as_bytes())
    });
    let config = ClientConfig {
        user_agent: "probe/2".to_string(),
        cache_enabled: false,
        ..Default::default()
    };
    let client = Client::builder().config(config).build().unwrap();

    assert!(client.cache().is_none());
    assert_eq!(client.get(server.url("/")).send().unwrap().text().unwrap(), "probe/2");
}

#[test]
fn test_invalid_url() {
    let client = Client::new().unwrap();
    assert_eq!(client.get("not a url").send().unwrap_err(), NetError::InvalidUrl);
    assert_eq!(
        client.get("ftp://example.com/").send().unwrap_err(),
        NetError::UnknownUrlScheme
    );
}
