//! Catalog XML document handling.
//!
//! Every record carries its source metadata as an XML document. This module
//! keeps that document and its derivatives in step: decoding raw payloads
//! to text, deriving the `anytext` free-text blob, and rewriting text nodes
//! addressed by the XPath locators of the queryable mapping.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Reader, Writer};

use crate::error::RepositoryError;

/// Decode a raw XML payload to text before storage.
///
/// Strips a UTF-8 byte-order mark if present; anything that isn't valid
/// UTF-8 is rejected.
pub fn decode_document(raw: &[u8]) -> Result<String, RepositoryError> {
    let raw = raw.strip_prefix(b"\xef\xbb\xbf").unwrap_or(raw);
    String::from_utf8(raw.to_vec()).map_err(|err| RepositoryError::Xml(err.to_string()))
}

/// Derive the searchable free-text blob from an XML document: every text
/// node, trimmed and joined with single spaces.
pub fn get_anytext(xml: &str) -> Result<String, RepositoryError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parts: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|err| RepositoryError::Xml(err.to_string()))?;
                if !text.is_empty() {
                    parts.push(text.into_owned());
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t).trim().to_string();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(RepositoryError::Xml(err.to_string())),
        }
    }
    Ok(parts.join(" "))
}

/// One step of a parsed locator path: resolved namespace URI plus local name.
#[derive(Debug, PartialEq, Eq)]
struct Step {
    ns: Option<String>,
    local: String,
}

/// How the path binds to the document tree.
enum Anchor {
    /// `/a/b` - from the document root, root element included.
    Root,
    /// `a/b` - relative to the root element, as a child path.
    Child,
    /// `//a/b` - matching at any depth.
    Anywhere,
}

/// Rewrite the leading text of every element matched by `xpath`, but only
/// where the current text differs from `value` - re-applying the same
/// update is a no-op at the text-node level.
///
/// The supported locator grammar is the slash-separated element-path subset
/// used by queryable mappings (`dc:title`, `/csw:Record/dc:title`,
/// `//ows:BoundingBox`); prefixes resolve through `namespaces`. Matched
/// empty elements gain the value as their text.
pub fn update_xpath(
    namespaces: &HashMap<String, String>,
    xml: &str,
    xpath: &str,
    value: &str,
) -> Result<String, RepositoryError> {
    let (anchor, steps) = parse_path(namespaces, xpath)?;

    let mut reader = NsReader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    // open elements as (namespace uri, local name)
    let mut stack: Vec<(Option<String>, String)> = Vec::new();
    // depths of matched elements whose leading-text window is still open
    let mut pending: Vec<usize> = Vec::new();

    loop {
        let (resolve, event) = reader
            .read_resolved_event()
            .map_err(|err| RepositoryError::Xml(err.to_string()))?;
        match event {
            Event::Start(ref e) => {
                // a child element closes the enclosing leading-text window;
                // the new value is inserted ahead of it
                if pending.last() == Some(&stack.len()) {
                    pending.pop();
                    emit(&mut writer, Event::Text(BytesText::new(value)))?;
                }
                stack.push((ns_uri(&resolve), local_name(e.local_name().as_ref())));
                let matched = path_matches(&anchor, &steps, &stack);
                emit(&mut writer, event.borrow())?;
                if matched {
                    pending.push(stack.len());
                }
            }
            Event::Empty(ref e) => {
                if pending.last() == Some(&stack.len()) {
                    pending.pop();
                    emit(&mut writer, Event::Text(BytesText::new(value)))?;
                }
                stack.push((ns_uri(&resolve), local_name(e.local_name().as_ref())));
                let matched = path_matches(&anchor, &steps, &stack);
                stack.pop();
                if matched {
                    // an empty element has no text yet, so the value always
                    // differs and becomes its content
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    emit(&mut writer, Event::Start(e.clone()))?;
                    emit(&mut writer, Event::Text(BytesText::new(value)))?;
                    emit(&mut writer, Event::End(BytesEnd::new(name)))?;
                } else {
                    emit(&mut writer, event.borrow())?;
                }
            }
            Event::Text(ref t) => {
                if pending.last() == Some(&stack.len()) {
                    pending.pop();
                    let current = t
                        .unescape()
                        .map_err(|err| RepositoryError::Xml(err.to_string()))?;
                    if current != value {
                        emit(&mut writer, Event::Text(BytesText::new(value)))?;
                    } else {
                        emit(&mut writer, event.borrow())?;
                    }
                } else {
                    emit(&mut writer, event.borrow())?;
                }
            }
            Event::CData(_) => {
                // CDATA content is left untouched; it still closes the window
                if pending.last() == Some(&stack.len()) {
                    pending.pop();
                }
                emit(&mut writer, event.borrow())?;
            }
            Event::End(_) => {
                if pending.last() == Some(&stack.len()) {
                    // no leading text was seen; the value becomes the text
                    pending.pop();
                    emit(&mut writer, Event::Text(BytesText::new(value)))?;
                }
                stack.pop();
                emit(&mut writer, event.borrow())?;
            }
            Event::Eof => break,
            _ => emit(&mut writer, event.borrow())?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|err| RepositoryError::Xml(err.to_string()))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), RepositoryError> {
    writer
        .write_event(event)
        .map_err(|err| RepositoryError::Xml(err.to_string()))
}

fn ns_uri(resolve: &ResolveResult<'_>) -> Option<String> {
    match resolve {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn parse_path(
    namespaces: &HashMap<String, String>,
    xpath: &str,
) -> Result<(Anchor, Vec<Step>), RepositoryError> {
    let (anchor, rest) = if let Some(rest) = xpath.strip_prefix("//") {
        (Anchor::Anywhere, rest)
    } else if let Some(rest) = xpath.strip_prefix('/') {
        (Anchor::Root, rest)
    } else {
        (Anchor::Child, xpath)
    };

    if rest.is_empty() {
        return Err(RepositoryError::Xml(format!("unsupported XPath: {xpath:?}")));
    }

    let mut steps = Vec::new();
    for segment in rest.split('/') {
        if segment.is_empty() || segment.contains(['[', '@', '*']) {
            return Err(RepositoryError::Xml(format!("unsupported XPath: {xpath:?}")));
        }
        let step = match segment.split_once(':') {
            Some((prefix, local)) => {
                let uri = namespaces.get(prefix).ok_or_else(|| {
                    RepositoryError::Xml(format!("unknown namespace prefix: {prefix}"))
                })?;
                Step {
                    ns: Some(uri.clone()),
                    local: local.to_string(),
                }
            }
            None => Step {
                ns: None,
                local: segment.to_string(),
            },
        };
        steps.push(step);
    }
    Ok((anchor, steps))
}

fn path_matches(anchor: &Anchor, steps: &[Step], stack: &[(Option<String>, String)]) -> bool {
    let tail = match anchor {
        Anchor::Root => {
            if stack.len() != steps.len() {
                return false;
            }
            stack
        }
        Anchor::Child => {
            if stack.len() != steps.len() + 1 {
                return false;
            }
            &stack[1..]
        }
        Anchor::Anywhere => {
            if stack.len() < steps.len() {
                return false;
            }
            &stack[stack.len() - steps.len()..]
        }
    };
    tail.iter()
        .zip(steps)
        .all(|((ns, local), step)| *ns == step.ns && *local == step.local)
}
