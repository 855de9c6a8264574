//! XML envelopes for the conferencing API.
//!
//! Every API response is a `<response>` document whose first child is
//! `<returncode>`. Backend replies are parsed only as far as the gateway
//! needs (return code, message key, and raw inner XML of aggregated
//! elements); everything else is passed through untouched.

use axum::http::header;
use axum::response::{IntoResponse, Response};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;
use tracing::error;

/// Content type of every API response.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

const FALLBACK_RESPONSE: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><response><returncode>FAILED</returncode><messageKey>internalError</messageKey><message>An internal error occurred.</message></response>";

/// A node under `<response>`.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    /// `<name>escaped value</name>`
    Text(String, String),
    /// `<name>` followed by already-serialized XML and `</name>`.
    Raw(String, String),
    /// `<name attr="..">children</name>`
    Element(String, Vec<(String, String)>, Vec<XmlNode>),
}

impl XmlNode {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        XmlNode::Text(name.to_string(), value.into())
    }

    pub fn raw(name: &str, inner: impl Into<String>) -> Self {
        XmlNode::Raw(name.to_string(), inner.into())
    }

    pub fn element(name: &str, children: Vec<XmlNode>) -> Self {
        XmlNode::Element(name.to_string(), Vec::new(), children)
    }
}

/// A complete protocol response, rendered as XML with HTTP 200.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub children: Vec<XmlNode>,
}

impl ApiResponse {
    /// `<returncode>SUCCESS</returncode>` followed by `children`.
    pub fn success(children: Vec<XmlNode>) -> Self {
        let mut all = vec![XmlNode::text("returncode", "SUCCESS")];
        all.extend(children);
        Self { children: all }
    }

    /// `<returncode>FAILED</returncode>` with a message key and message.
    pub fn failed(message_key: &str, message: &str) -> Self {
        Self {
            children: vec![
                XmlNode::text("returncode", "FAILED"),
                XmlNode::text("messageKey", message_key),
                XmlNode::text("message", message),
            ],
        }
    }

    pub fn render(&self) -> String {
        render(&self.children)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        xml_response(self.render())
    }
}

/// Wrap an already-rendered XML document in an HTTP 200 response.
pub fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}

/// Render `<response>` with the given children.
pub fn render(children: &[XmlNode]) -> String {
    match write_document(children) {
        Ok(doc) => doc,
        Err(e) => {
            error!(target: "lb.xml", error = %e, "Failed to render XML response");
            FALLBACK_RESPONSE.to_string()
        }
    }
}

fn write_document(children: &[XmlNode]) -> Result<String, String> {
    let mut writer = Writer::new(Vec::new());
    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    emit(&mut writer, Event::Start(BytesStart::new("response")))?;
    for child in children {
        write_node(&mut writer, child)?;
    }
    emit(&mut writer, Event::End(BytesEnd::new("response")))?;

    String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), String> {
    match node {
        XmlNode::Text(name, value) => {
            emit(writer, Event::Start(BytesStart::new(name.as_str())))?;
            emit(writer, Event::Text(BytesText::new(value)))?;
            emit(writer, Event::End(BytesEnd::new(name.as_str())))
        }
        XmlNode::Raw(name, inner) => {
            emit(writer, Event::Start(BytesStart::new(name.as_str())))?;
            emit(writer, Event::Text(BytesText::from_escaped(inner.as_str())))?;
            emit(writer, Event::End(BytesEnd::new(name.as_str())))
        }
        XmlNode::Element(name, attributes, children) => {
            let mut start = BytesStart::new(name.as_str());
            for (key, value) in attributes {
                start.push_attribute((key.as_str(), value.as_str()));
            }
            emit(writer, Event::Start(start))?;
            for child in children {
                write_node(writer, child)?;
            }
            emit(writer, Event::End(BytesEnd::new(name.as_str())))
        }
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

// ============================================================================
// Backend replies
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),

    #[error("document has no <response> root")]
    MissingEnvelope,

    #[error("response has no <returncode>")]
    MissingReturnCode,
}

/// The fields of a backend `<response>` that drive gateway decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub returncode: String,
    pub message_key: Option<String>,
    pub message: Option<String>,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.returncode == "SUCCESS"
    }
}

/// Parse the top-level `returncode`, `messageKey` and `message` of a reply.
pub fn parse_envelope(body: &str) -> Result<Envelope, XmlError> {
    let mut reader = Reader::from_str(body);
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut current: Option<String> = None;
    let mut returncode = None;
    let mut message_key = None;
    let mut message = None;

    loop {
        match reader
            .read_event()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
        {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    if e.name().as_ref() != b"response" {
                        return Err(XmlError::MissingEnvelope);
                    }
                    saw_root = true;
                } else if depth == 2 {
                    current = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) if depth == 2 => {
                let value = t
                    .unescape()
                    .map_err(|e| XmlError::Malformed(e.to_string()))?
                    .trim()
                    .to_string();
                match current.as_deref() {
                    Some("returncode") => returncode = Some(value),
                    Some("messageKey") => message_key = Some(value),
                    Some("message") => message = Some(value),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(XmlError::MissingEnvelope);
    }

    Ok(Envelope {
        returncode: returncode.ok_or(XmlError::MissingReturnCode)?,
        message_key,
        message,
    })
}

/// Raw inner XML of the first `<element>` in the document, if any.
///
/// The content is returned exactly as it appears in the source so it can
/// be re-emitted without re-encoding.
pub fn inner_xml(body: &str, element: &str) -> Result<Option<String>, XmlError> {
    let mut reader = Reader::from_str(body);

    loop {
        match reader
            .read_event()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
        {
            Event::Start(e) if e.name().as_ref() == element.as_bytes() => {
                let end = e.to_end();
                let inner = reader
                    .read_text(end.name())
                    .map_err(|e| XmlError::Malformed(e.to_string()))?;
                return Ok(Some(inner.trim().to_string()));
            }
            Event::Empty(e) if e.name().as_ref() == element.as_bytes() => {
                return Ok(Some(String::new()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}
