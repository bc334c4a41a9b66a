//! XML-RPC client for the OpenSubtitles API
//!
//! Only the value types OpenSubtitles actually sends are supported:
//! string, int, double, boolean, base64, nil, dateTime, array and struct.
//! Responses are read with quick-xml into a flat token list and then
//! walked with a small recursive-descent parser.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::CONTENT_TYPE;

use crate::error::{Result, SubtleError};

// =============================================================================
// Value Model
// =============================================================================

/// A single XML-RPC value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Base64(Vec<u8>),
    DateTime(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Build a struct value from key/value pairs
    pub fn structure<K: Into<String>>(members: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a struct member
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_struct().and_then(|m| m.get(key))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Integer view. OpenSubtitles sends most numbers as strings.
    pub fn coerce_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Double(d) => Some(*d as i64),
            Value::Bool(b) => Some(*b as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view: "1" and "true" are true, "0", "false" and "" are false
    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Some(true),
                "0" | "false" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Check the leading token of the `status` field before trusting anything else
///
/// OpenSubtitles reports errors in-band ("401 Unauthorized",
/// "503 Service Unavailable") with an HTTP 200, so every extraction goes
/// through this gate.
pub fn ensure_ok(response: &Value) -> Result<&BTreeMap<String, Value>> {
    let body = response
        .as_struct()
        .ok_or_else(|| SubtleError::Malformed("expected a struct response".into()))?;

    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| SubtleError::Malformed("response has no status".into()))?;

    if status.split_whitespace().next() == Some("200") {
        Ok(body)
    } else {
        Err(SubtleError::ProtocolStatus(status.to_string()))
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Serialize a method call document
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Nil => out.push_str("<nil/>"),
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", *b as u8);
        }
        Value::Int(i) => {
            let _ = write!(out, "<int>{}</int>", i);
        }
        Value::Double(d) => {
            let _ = write!(out, "<double>{}</double>", d);
        }
        Value::String(s) => {
            let _ = write!(out, "<string>{}</string>", escape(s.as_str()));
        }
        Value::Base64(bytes) => {
            let _ = write!(out, "<base64>{}</base64>", BASE64.encode(bytes));
        }
        Value::DateTime(s) => {
            let _ = write!(out, "<dateTime.iso8601>{}</dateTime.iso8601>", escape(s.as_str()));
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                let _ = write!(out, "<member><name>{}</name>", escape(name.as_str()));
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

// =============================================================================
// Decoding
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Start(String),
    End(String),
    Empty(String),
    Text(String),
}

fn malformed(msg: impl Into<String>) -> SubtleError {
    SubtleError::Malformed(msg.into())
}

fn tokenize(xml: &str) -> Result<Vec<Token>> {
    let mut reader = Reader::from_str(xml);
    let mut tokens = Vec::new();

    loop {
        let token = match reader.read_event() {
            Ok(Event::Start(e)) => {
                Token::Start(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::End(e)) => {
                Token::End(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Empty(e)) => {
                Token::Empty(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(format!("bad text at {}: {}", reader.buffer_position(), e)))?;
                Token::Text(text.into_owned())
            }
            Ok(Event::CData(c)) => Token::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()),
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(e) => {
                return Err(malformed(format!(
                    "XML error at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn skip_whitespace(&mut self) {
        while let Some(Token::Text(t)) = self.peek() {
            if !t.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
    }

    fn expect_start(&mut self, name: &str) -> Result<()> {
        self.skip_whitespace();
        match self.next() {
            Some(Token::Start(n)) if n == name => Ok(()),
            other => Err(malformed(format!("expected <{}>, found {:?}", name, other))),
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<()> {
        self.skip_whitespace();
        match self.next() {
            Some(Token::End(n)) if n == name => Ok(()),
            other => Err(malformed(format!("expected </{}>, found {:?}", name, other))),
        }
    }

    fn text_until_end(&mut self, name: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next() {
                Some(Token::Text(t)) => text.push_str(&t),
                Some(Token::End(n)) if n == name => return Ok(text),
                other => {
                    return Err(malformed(format!(
                        "unexpected {:?} inside <{}>",
                        other, name
                    )))
                }
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        self.skip_whitespace();
        match self.next() {
            Some(Token::Empty(n)) if n == "value" => return Ok(Value::String(String::new())),
            Some(Token::Start(n)) if n == "value" => {}
            other => return Err(malformed(format!("expected <value>, found {:?}", other))),
        }

        // A value without a type element is a string
        let mut bare = String::new();
        while let Some(Token::Text(t)) = self.peek() {
            bare.push_str(t);
            self.pos += 1;
        }

        let value = match self.next() {
            Some(Token::End(n)) if n == "value" => return Ok(Value::String(bare)),
            Some(Token::Start(kind)) => self.parse_typed(&kind)?,
            Some(Token::Empty(kind)) => empty_typed(&kind)?,
            other => return Err(malformed(format!("unexpected {:?} in <value>", other))),
        };

        self.expect_end("value")?;
        Ok(value)
    }

    fn parse_typed(&mut self, kind: &str) -> Result<Value> {
        match kind {
            "string" => Ok(Value::String(self.text_until_end(kind)?)),
            "int" | "i4" | "i8" => {
                let text = self.text_until_end(kind)?;
                text.trim()
                    .parse()
                    .map(Value::Int)
                    .map_err(|_| malformed(format!("invalid integer '{}'", text)))
            }
            "double" => {
                let text = self.text_until_end(kind)?;
                text.trim()
                    .parse()
                    .map(Value::Double)
                    .map_err(|_| malformed(format!("invalid double '{}'", text)))
            }
            "boolean" => {
                let text = self.text_until_end(kind)?;
                match text.trim() {
                    "1" | "true" => Ok(Value::Bool(true)),
                    "0" | "false" => Ok(Value::Bool(false)),
                    other => Err(malformed(format!("invalid boolean '{}'", other))),
                }
            }
            "base64" => {
                let text = self.text_until_end(kind)?;
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                BASE64
                    .decode(compact)
                    .map(Value::Base64)
                    .map_err(|e| malformed(format!("invalid base64: {}", e)))
            }
            "dateTime.iso8601" => Ok(Value::DateTime(self.text_until_end(kind)?)),
            "nil" => {
                self.expect_end("nil")?;
                Ok(Value::Nil)
            }
            "array" => {
                let mut items = Vec::new();
                self.skip_whitespace();
                match self.next() {
                    Some(Token::Empty(n)) if n == "data" => {}
                    Some(Token::Start(n)) if n == "data" => loop {
                        self.skip_whitespace();
                        if let Some(Token::End(n)) = self.peek() {
                            if n == "data" {
                                self.pos += 1;
                                break;
                            }
                        }
                        items.push(self.parse_value()?);
                    },
                    other => return Err(malformed(format!("expected <data>, found {:?}", other))),
                }
                self.expect_end("array")?;
                Ok(Value::Array(items))
            }
            "struct" => {
                let mut members = BTreeMap::new();
                loop {
                    self.skip_whitespace();
                    if let Some(Token::End(n)) = self.peek() {
                        if n == "struct" {
                            self.pos += 1;
                            break;
                        }
                    }
                    self.expect_start("member")?;
                    self.expect_start("name")?;
                    let name = self.text_until_end("name")?;
                    let value = self.parse_value()?;
                    self.expect_end("member")?;
                    members.insert(name, value);
                }
                Ok(Value::Struct(members))
            }
            other => Err(malformed(format!("unsupported value type <{}>", other))),
        }
    }
}

fn empty_typed(kind: &str) -> Result<Value> {
    match kind {
        "nil" => Ok(Value::Nil),
        "string" => Ok(Value::String(String::new())),
        "array" => Ok(Value::Array(Vec::new())),
        "struct" => Ok(Value::Struct(BTreeMap::new())),
        other => Err(malformed(format!("empty <{}/> has no value", other))),
    }
}

/// Parse a methodResponse document. Faults become [`SubtleError::ProtocolStatus`].
pub fn decode_response(xml: &str) -> Result<Value> {
    let mut parser = Parser {
        tokens: tokenize(xml)?,
        pos: 0,
    };

    parser.expect_start("methodResponse")?;
    parser.skip_whitespace();
    match parser.next() {
        Some(Token::Start(n)) if n == "params" => {
            parser.expect_start("param")?;
            let value = parser.parse_value()?;
            parser.expect_end("param")?;
            parser.expect_end("params")?;
            Ok(value)
        }
        Some(Token::Start(n)) if n == "fault" => {
            let fault = parser.parse_value()?;
            let code = fault
                .get("faultCode")
                .and_then(Value::coerce_i64)
                .unwrap_or_default();
            let message = fault
                .get("faultString")
                .and_then(Value::as_str)
                .unwrap_or("unknown fault");
            Err(SubtleError::ProtocolStatus(format!("{} {}", code, message)))
        }
        other => Err(malformed(format!(
            "expected <params> or <fault>, found {:?}",
            other
        ))),
    }
}

// =============================================================================
// HTTP Client
// =============================================================================

/// XML-RPC over HTTP(S)
pub struct XmlRpcClient {
    endpoint: String,
    client: reqwest::Client,
}

impl XmlRpcClient {
    /// Create a client for `endpoint` with a per-request timeout
    pub fn new(endpoint: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SubtleError::Transport(format!("could not build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke `method` and return the decoded response value
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        debug!("XML-RPC call {} ({} params)", method, params.len());

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml")
            .body(encode_call(method, params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubtleError::ProtocolStatus(status.to_string()));
        }

        let body = response.text().await?;
        decode_response(&body)
    }
}
