//! Conversion between live HTTP messages and captured records

use std::borrow::Cow;

use bytes::Bytes;
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::http::{request, response};
use hyper::{Method, Response, StatusCode};
use tracing::{debug, warn};

use crate::cassette::{CapturedRequest, CapturedResponse, FormValues, Headers, Payload};
use crate::transport::{full, Body};
use crate::{Result, TapedeckError};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Capture a request from its parts and fully buffered body
pub(crate) fn capture_request(parts: &request::Parts, body: Bytes) -> CapturedRequest {
    CapturedRequest {
        form: parse_form(parts, &body),
        body: Payload::from(body),
        headers: Headers::from_header_map(&parts.headers),
        url: parts.uri.to_string(),
        method: parts.method.to_string(),
    }
}

/// Capture a response from its parts and fully buffered body
///
/// The status line keeps the reason phrase the server actually sent, falling
/// back to the canonical one.
pub(crate) fn capture_response(parts: &response::Parts, body: Bytes) -> CapturedResponse {
    CapturedResponse {
        body: Payload::from(body),
        headers: Headers::from_header_map(&parts.headers),
        status: status_line(parts),
        code: parts.status.as_u16(),
    }
}

/// Build a response from a captured one
///
/// A non-canonical reason phrase in the recorded status line is restored as a
/// [`ReasonPhrase`] extension. Headers whose name or value is no longer a
/// valid HTTP token are dropped with a warning.
///
/// # Errors
///
/// Returns [`TapedeckError::InvalidInteraction`] if the status code cannot be
/// represented
pub(crate) fn synthesize_response(captured: CapturedResponse) -> Result<Response<Body>> {
    let CapturedResponse {
        body,
        headers: recorded_headers,
        status: recorded_status,
        code,
    } = captured;

    let status = StatusCode::from_u16(code).map_err(|e| {
        TapedeckError::InvalidInteraction(format!("status code {code}: {e}"))
    })?;

    let mut response = Response::new(full(body.into_bytes()));
    *response.status_mut() = status;

    if let Some(reason) = recorded_reason(&recorded_status, code) {
        if status.canonical_reason() != Some(reason) {
            match ReasonPhrase::try_from(reason.as_bytes()) {
                Ok(phrase) => {
                    response.extensions_mut().insert(phrase);
                }
                Err(_) => warn!("Dropping invalid recorded reason phrase: {reason:?}"),
            }
        }
    }

    let headers = response.headers_mut();
    for (name, values) in recorded_headers.iter() {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!("Dropping recorded header with invalid name: {name:?}");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(header_value) => {
                    headers.append(header_name.clone(), header_value);
                }
                Err(_) => warn!("Dropping invalid value for recorded header {name}"),
            }
        }
    }

    Ok(response)
}

fn status_line(parts: &response::Parts) -> String {
    let code = parts.status.as_u16();
    let reason = match parts.extensions.get::<ReasonPhrase>() {
        Some(phrase) => Some(String::from_utf8_lossy(phrase.as_bytes())),
        None => parts.status.canonical_reason().map(Cow::Borrowed),
    };

    match reason {
        Some(reason) if !reason.is_empty() => format!("{code} {reason}"),
        _ => code.to_string(),
    }
}

/// Reason phrase of a recorded `"<code> <reason>"` status line
fn recorded_reason(status_line: &str, code: u16) -> Option<&str> {
    status_line
        .strip_prefix(code.to_string().as_str())
        .and_then(|rest| rest.strip_prefix(' '))
        .filter(|reason| !reason.is_empty())
}

/// Parse form values the way a server would see them
///
/// Urlencoded bodies of `POST`, `PUT` and `PATCH` requests come first,
/// followed by query string values.
fn parse_form(parts: &request::Parts, body: &[u8]) -> FormValues {
    let mut form = FormValues::new();

    if has_form_body(parts) {
        match std::str::from_utf8(body) {
            Ok(text) => parse_urlencoded(text, &mut form),
            Err(_) => debug!("Skipping form body that is not valid UTF-8"),
        }
    }

    if let Some(query) = parts.uri.query() {
        parse_urlencoded(query, &mut form);
    }

    form
}

fn has_form_body(parts: &request::Parts) -> bool {
    if ![Method::POST, Method::PUT, Method::PATCH].contains(&parts.method) {
        return false;
    }

    parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

fn parse_urlencoded(input: &str, form: &mut FormValues) {
    for pair in input.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match (decode_component(key), decode_component(value)) {
            (Some(key), Some(value)) => form.entry(key).or_default().push(value),
            _ => debug!("Skipping malformed form pair: {pair}"),
        }
    }
}

fn decode_component(component: &str) -> Option<String> {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Request;

    fn parts(method: Method, uri: &str, content_type: Option<&str>) -> request::Parts {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_capture_request() {
        let parts = parts(Method::GET, "http://example.com/search?q=rust+lang&page=2", None);
        let captured = capture_request(&parts, Bytes::new());

        assert_eq!(captured.method, "GET");
        assert_eq!(captured.url, "http://example.com/search?q=rust+lang&page=2");
        assert_eq!(captured.form["q"], vec!["rust lang"]);
        assert_eq!(captured.form["page"], vec!["2"]);
        assert!(captured.body.is_empty());
    }

    #[test]
    fn test_form_body_precedes_query() {
        let parts = parts(
            Method::POST,
            "http://example.com/submit?name=query",
            Some("application/x-www-form-urlencoded; charset=utf-8"),
        );
        let captured = capture_request(&parts, Bytes::from("name=body%20value&flag"));

        assert_eq!(captured.form["name"], vec!["body value", "query"]);
        assert_eq!(captured.form["flag"], vec![""]);
        assert_eq!(&*captured.body, b"name=body%20value&flag");
        assert_eq!(
            captured.headers.first("content-type"),
            Some("application/x-www-form-urlencoded; charset=utf-8")
        );
    }

    #[test]
    fn test_json_body_not_parsed_as_form() {
        let parts = parts(
            Method::POST,
            "http://example.com/submit",
            Some("application/json"),
        );
        let captured = capture_request(&parts, Bytes::from("{\"a\":1}"));

        assert!(captured.form.is_empty());
    }

    #[test]
    fn test_get_body_not_parsed_as_form() {
        let parts = parts(
            Method::GET,
            "http://example.com/",
            Some("application/x-www-form-urlencoded"),
        );
        let captured = capture_request(&parts, Bytes::from("a=1"));

        assert!(captured.form.is_empty());
    }

    #[test]
    fn test_capture_response_status_text() {
        let response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("X-Trace", "abc")
            .body(())
            .unwrap();
        let (parts, ()) = response.into_parts();

        let captured = capture_response(&parts, Bytes::from("missing"));
        assert_eq!(captured.status, "404 Not Found");
        assert_eq!(captured.code, 404);
        assert_eq!(captured.headers.first("x-trace"), Some("abc"));
    }

    #[test]
    fn test_status_line_without_reason() {
        let response = Response::builder().status(599).body(()).unwrap();
        let (parts, ()) = response.into_parts();

        assert_eq!(status_line(&parts), "599");
    }

    #[test]
    fn test_capture_response_keeps_sent_reason_phrase() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .extension(ReasonPhrase::from_static(b"Alright"))
            .body(())
            .unwrap();
        let (parts, ()) = response.into_parts();

        let captured = capture_response(&parts, Bytes::new());
        assert_eq!(captured.status, "200 Alright");
        assert_eq!(captured.code, 200);
    }

    #[test]
    fn test_synthesize_restores_reason_phrase() {
        let response = synthesize_response(CapturedResponse {
            body: Payload::default(),
            headers: Headers::new(),
            status: "200 Alright".to_string(),
            code: 200,
        })
        .unwrap();

        let phrase = response.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(phrase.as_bytes(), b"Alright");

        let (parts, _) = response.into_parts();
        assert_eq!(capture_response(&parts, Bytes::new()).status, "200 Alright");
    }

    #[test]
    fn test_synthesize_canonical_reason_adds_no_extension() {
        for status in ["200 OK", "200", "200 ", "garbage"] {
            let response = synthesize_response(CapturedResponse {
                body: Payload::default(),
                headers: Headers::new(),
                status: status.to_string(),
                code: 200,
            })
            .unwrap();

            assert!(response.extensions().get::<ReasonPhrase>().is_none(), "{status}");
        }
    }

    #[test]
    fn test_recorded_reason() {
        assert_eq!(recorded_reason("404 Not Found", 404), Some("Not Found"));
        assert_eq!(recorded_reason("200 Alright", 200), Some("Alright"));
        assert_eq!(recorded_reason("200", 200), None);
        assert_eq!(recorded_reason("201 Created", 200), None);
    }

    #[tokio::test]
    async fn test_synthesize_response() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "text/plain");
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        headers.append("Bad Header", "dropped");

        let response = synthesize_response(CapturedResponse {
            body: Payload::from("hello"),
            headers,
            status: "201 Created".to_string(),
            code: 201,
        })
        .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
        assert_eq!(response.headers().len(), 3);

        let body = crate::transport::collect_body(response.into_body())
            .await
            .unwrap();
        assert_eq!(body, Bytes::from("hello"));
    }

    #[test]
    fn test_synthesize_rejects_invalid_status() {
        let result = synthesize_response(CapturedResponse {
            body: Payload::default(),
            headers: Headers::new(),
            status: "0".to_string(),
            code: 0,
        });

        assert!(matches!(result, Err(TapedeckError::InvalidInteraction(_))));
    }
}
