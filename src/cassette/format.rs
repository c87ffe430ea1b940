//! On-disk cassette document and the interaction records it holds

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Deref;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use hyper::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Cassette format version 1
pub const CASSETTE_FORMAT_V1: u32 = 1;

/// Extension appended to a cassette name to form its fixture path
pub const CASSETTE_EXTENSION: &str = "json";

/// Parsed form values, keyed by field name
pub type FormValues = BTreeMap<String, Vec<String>>;

/// Case-insensitive, multi-valued header collection
///
/// Names are stored lowercased so that documents written by other tools with
/// canonicalized names (`Content-Type`) load into the same keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>")]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    /// Create an empty header collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `name`
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// All values recorded under `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// First value recorded under `name`
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Iterate over header names and their values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct header names
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no headers are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Capture a header map, keeping every value of repeated headers
    ///
    /// Header values are stored as text. A value that is not valid UTF-8
    /// (obs-text bytes) is captured lossily: invalid sequences become U+FFFD
    /// and a replayed response carries the replacement bytes, not the
    /// originals.
    #[must_use]
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            let text = String::from_utf8_lossy(value.as_bytes());
            if let Cow::Owned(_) = text {
                warn!("Header {name} is not valid UTF-8, recording it lossily");
            }
            headers.append(name.as_str(), text.into_owned());
        }
        headers
    }
}

impl From<BTreeMap<String, Vec<String>>> for Headers {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        let mut headers = Self::new();
        for (name, values) in map {
            for value in values {
                headers.append(&name, value);
            }
        }
        headers
    }
}

/// Opaque body bytes
///
/// Persisted as a plain string when the bytes are valid UTF-8 and as base64
/// with a sibling `body_encoding` marker otherwise, so binary payloads
/// survive a save/load cycle byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPayload", into = "RawPayload")]
pub struct Payload(Bytes);

impl Payload {
    /// Borrow the body bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the body bytes
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BodyEncoding {
    Base64,
}

#[derive(Serialize, Deserialize)]
struct RawPayload {
    body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_encoding: Option<BodyEncoding>,
}

impl TryFrom<RawPayload> for Payload {
    type Error = base64::DecodeError;

    fn try_from(raw: RawPayload) -> Result<Self, Self::Error> {
        match raw.body_encoding {
            None => Ok(Self(Bytes::from(raw.body))),
            Some(BodyEncoding::Base64) => Ok(Self(Bytes::from(STANDARD.decode(raw.body)?))),
        }
    }
}

impl From<Payload> for RawPayload {
    fn from(payload: Payload) -> Self {
        match std::str::from_utf8(&payload.0) {
            Ok(text) => Self {
                body: text.to_string(),
                body_encoding: None,
            },
            Err(_) => Self {
                body: STANDARD.encode(&payload.0),
                body_encoding: Some(BodyEncoding::Base64),
            },
        }
    }
}

/// Request as captured in the cassette file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    /// Request body
    #[serde(flatten)]
    pub body: Payload,
    /// Form values parsed from the query string and urlencoded body
    #[serde(default, deserialize_with = "null_as_default")]
    pub form: FormValues,
    /// Request headers
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Headers,
    /// Full request URL, including the query string
    pub url: String,
    /// Request method
    pub method: String,
}

/// Response as captured in the cassette file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    /// Response body
    #[serde(flatten)]
    pub body: Payload,
    /// Response headers
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Headers,
    /// Status line text, e.g. `200 OK`
    pub status: String,
    /// Numeric status code
    pub code: u16,
}

/// A single request/response exchange between a client and a server
///
/// Interactions are never mutated once created; a cassette only adds or
/// removes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// Captured request
    pub request: CapturedRequest,
    /// Captured response
    pub response: CapturedResponse,
}

impl Interaction {
    /// Pair a captured request with its response
    #[must_use]
    pub fn new(request: CapturedRequest, response: CapturedResponse) -> Self {
        Self { request, response }
    }
}

/// Cassette document as read from disk
#[derive(Debug, Deserialize)]
pub(crate) struct CassetteDocument {
    pub version: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interactions: Vec<Interaction>,
}

/// Cassette document as written to disk, borrowing the live sequence
#[derive(Debug, Serialize)]
pub(crate) struct CassetteDocumentRef<'a> {
    pub version: u32,
    pub interactions: &'a [Interaction],
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_interaction(body: Payload) -> Interaction {
        let mut headers = Headers::new();
        headers.append("Accept", "text/plain");
        headers.append("accept", "application/json");

        Interaction::new(
            CapturedRequest {
                body: Payload::default(),
                form: FormValues::new(),
                headers,
                url: "http://example.com/?q=1".to_string(),
                method: "GET".to_string(),
            },
            CapturedResponse {
                body,
                headers: Headers::new(),
                status: "200 OK".to_string(),
                code: 200,
            },
        )
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "text/plain");
        headers.append("content-type", "charset=utf-8");

        assert_eq!(headers.len(), 1);
        assert_eq!(
            headers.get("CONTENT-TYPE").unwrap(),
            ["text/plain".to_string(), "charset=utf-8".to_string()]
        );
        assert_eq!(headers.first("content-type"), Some("text/plain"));
        assert!(headers.get("accept").is_none());
    }

    #[test]
    fn test_headers_from_header_map() {
        let mut map = HeaderMap::new();
        map.append("set-cookie", "a=1".parse().unwrap());
        map.append("set-cookie", "b=2".parse().unwrap());

        let headers = Headers::from_header_map(&map);
        assert_eq!(headers.get("Set-Cookie").unwrap().len(), 2);
    }

    #[test]
    fn test_headers_from_header_map_non_utf8_value_is_lossy() {
        let mut map = HeaderMap::new();
        map.insert(
            "x-latin1",
            hyper::header::HeaderValue::from_bytes(b"caf\xe9").unwrap(),
        );
        map.insert(
            "x-utf8",
            hyper::header::HeaderValue::from_bytes("caf\u{e9}".as_bytes()).unwrap(),
        );

        let headers = Headers::from_header_map(&map);
        assert_eq!(headers.first("x-latin1"), Some("caf\u{fffd}"));
        assert_eq!(headers.first("x-utf8"), Some("caf\u{e9}"));
    }

    #[test]
    fn test_canonical_header_names_load_lowercased() {
        let headers: Headers =
            serde_json::from_value(json!({"Content-Type": ["text/html"]})).unwrap();

        assert_eq!(headers.first("content-type"), Some("text/html"));
        assert_eq!(
            serde_json::to_value(&headers).unwrap(),
            json!({"content-type": ["text/html"]})
        );
    }

    #[test]
    fn test_text_body_written_as_plain_string() {
        let interaction = sample_interaction(Payload::from("hello"));
        let value = serde_json::to_value(&interaction).unwrap();

        assert_eq!(value["response"]["body"], json!("hello"));
        assert!(value["response"].get("body_encoding").is_none());
        assert_eq!(value["response"]["code"], json!(200));
        assert_eq!(value["request"]["url"], json!("http://example.com/?q=1"));
    }

    #[test]
    fn test_binary_body_survives_round_trip() {
        let binary = vec![0u8, 159, 146, 150, 255, b'\n'];
        let interaction = sample_interaction(Payload::from(binary.clone()));

        let text = serde_json::to_string(&interaction).unwrap();
        assert!(text.contains("\"body_encoding\":\"base64\""));

        let decoded: Interaction = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded.response.body.as_bytes(), binary.as_slice());
        assert_eq!(decoded, interaction);
    }

    #[test]
    fn test_unknown_fields_and_nulls_tolerated() {
        let value = json!({
            "request": {
                "body": "",
                "form": null,
                "headers": null,
                "url": "http://example.com/",
                "method": "GET",
                "duration": "12ms"
            },
            "response": {
                "body": "hello",
                "headers": {"Content-Length": ["5"]},
                "status": "200 OK",
                "code": 200,
                "proto": "HTTP/1.1"
            }
        });

        let interaction: Interaction = serde_json::from_value(value).unwrap();
        assert!(interaction.request.form.is_empty());
        assert!(interaction.request.headers.is_empty());
        assert_eq!(interaction.response.headers.first("content-length"), Some("5"));
        assert_eq!(&*interaction.response.body, b"hello");
    }

    #[test]
    fn test_bad_base64_rejected() {
        let value = json!({
            "body": "not base64!",
            "body_encoding": "base64",
            "headers": {},
            "status": "200 OK",
            "code": 200
        });

        assert!(serde_json::from_value::<CapturedResponse>(value).is_err());
    }
}
