use http::Method;
use httpengine::http::orderedheaders::OrderedHeaderMap;
use httpengine::http::request::{apply_default_headers, request_target, HttpRequest};
use url::Url;

#[test]
fn test_ordered_headers_insertion_order() {
    let mut map = OrderedHeaderMap::new();
    map.insert("Host", "example.com").unwrap();
    map.insert("Connection", "keep-alive").unwrap();
    map.insert("User-Agent", "httpengine/0.1").unwrap();
    map.insert("Accept", "*/*").unwrap();

    let names: Vec<&str> = map.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["host", "connection", "user-agent", "accept"]);

    let header_map = map.to_header_map();
    let mut iter = header_map.iter();
    assert_eq!(iter.next().unwrap().0, "host");
    assert_eq!(iter.next().unwrap().0, "connection");
}

#[test]
fn test_ordered_headers_update_preserves_order() {
    let mut map = OrderedHeaderMap::new();
    map.insert("A", "1").unwrap();
    map.insert("B", "2").unwrap();
    map.insert("C", "3").unwrap();
    map.insert("B", "22").unwrap();

    let entries: Vec<(&str, &str)> = map
        .iter()
        .map(|(n, v)| (n.as_str(), v.to_str().unwrap()))
        .collect();
    assert_eq!(entries, [("a", "1"), ("b", "22"), ("c", "3")]);
}

#[test]
fn test_repeated_fields_survive_header_map_round_trip() {
    let mut map = OrderedHeaderMap::new();
    map.append("Set-Cookie", "a=1").unwrap();
    map.append("Set-Cookie", "b=2").unwrap();

    let back = OrderedHeaderMap::from_header_map(&map.clone().to_header_map());
    let cookies: Vec<_> = back.get_all("set-cookie").collect();
    assert_eq!(cookies, ["a=1", "b=2"]);
    assert_eq!(back, map);
}

#[test]
fn test_default_headers() {
    let mut request = HttpRequest::get("http://example.com:8080/path").unwrap();
    let gzip = apply_default_headers(&mut request, "agent/1", true).unwrap();
    assert!(gzip);

    let headers = request.headers();
    assert_eq!(headers.get_str("host"), Some("example.com:8080"));
    assert_eq!(headers.get_str("user-agent"), Some("agent/1"));
    assert_eq!(headers.get_str("connection"), Some("Keep-Alive"));
    assert_eq!(headers.get_str("accept-encoding"), Some("gzip"));
    assert!(!headers.contains("content-type"));
}

#[test]
fn test_default_headers_respect_caller_values() {
    let mut request = HttpRequest::post("https://example.com/")
        .unwrap()
        .with_header("User-Agent", "custom/9")
        .unwrap()
        .with_header("Content-Type", "application/json")
        .unwrap()
        .with_header("Connection", "close")
        .unwrap();
    apply_default_headers(&mut request, "agent/1", true).unwrap();

    let headers = request.headers();
    assert_eq!(headers.get_str("host"), Some("example.com"));
    assert_eq!(headers.get_str("user-agent"), Some("custom/9"));
    assert_eq!(headers.get_str("content-type"), Some("application/json"));
    assert_eq!(headers.get_str("connection"), Some("close"));
}

#[test]
fn test_http10_connection_gets_no_keep_alive() {
    let mut request = HttpRequest::get("http://example.com/").unwrap();
    apply_default_headers(&mut request, "agent/1", false).unwrap();
    assert!(!request.headers().contains("connection"));
}

#[test]
fn test_form_content_type_default_for_bodies() {
    let mut request = HttpRequest::post("http://example.com/").unwrap();
    apply_default_headers(&mut request, "agent/1", true).unwrap();
    assert_eq!(
        request.headers().get_str("content-type"),
        Some("application/x-www-form-urlencoded")
    );
}

#[test]
fn test_request_target_forms() {
    let url = Url::parse("http://example.com/a/b?x=1#frag").unwrap();
    assert_eq!(request_target(&url, false), "/a/b?x=1");
    assert_eq!(request_target(&url, true), "http://example.com/a/b?x=1");
}

#[test]
fn test_redirect_drops_credentials_across_origins() {
    let request = HttpRequest::get("https://a.example/")
        .unwrap()
        .with_header("Authorization", "Bearer t")
        .unwrap()
        .with_header("X-Trace", "1")
        .unwrap();

    let same = request
        .redirected(Url::parse("https://a.example/next").unwrap(), 302)
        .unwrap();
    assert_eq!(same.headers().get_str("authorization"), Some("Bearer t"));

    let other = request
        .redirected(Url::parse("https://b.example/").unwrap(), 302)
        .unwrap();
    assert!(other.headers().get_str("authorization").is_none());
    assert_eq!(other.headers().get_str("x-trace"), Some("1"));
}

#[test]
fn test_redirect_method_rewrite() {
    let post = HttpRequest::post("http://example.com/form")
        .unwrap()
        .with_body("a=1");
    let target = Url::parse("http://example.com/done").unwrap();

    assert_eq!(*post.redirected(target.clone(), 302).unwrap().method(), Method::GET);
    assert_eq!(*post.redirected(target.clone(), 303).unwrap().method(), Method::GET);
    let kept = post.redirected(target, 308).unwrap();
    assert_eq!(*kept.method(), Method::POST);
    assert!(!kept.body().is_empty());
}

#[test]
fn test_invalid_headers_rejected() {
    let mut map = OrderedHeaderMap::new();
    assert!(map.insert("Bad Name", "v").is_err());
    assert!(map.insert("X-Ok", "bad\nvalue").is_err());
    assert!(HttpRequest::get("http://example.com/")
        .unwrap()
        .with_header("", "v")
        .is_err());
}
