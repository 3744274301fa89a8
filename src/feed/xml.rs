// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal namespace-aware element tree on top of `quick-xml`.
//!
//! Feeds are small, so the whole document is materialised and the decoder
//! walks it like a DOM. Element namespaces are resolved to their URI, so
//! `<itunes:title>` and `<podcast:title>` bound to the same URI are equal.

use std::collections::HashSet;

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};

use crate::error::DecodeError;

/// A parsed XML element with resolved namespace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Namespace URI, `None` for elements outside any namespace
    pub namespace: Option<String>,
    /// Local name without prefix
    pub name: String,
    /// Attributes by local name (namespace declarations excluded)
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA content, unescaped
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// First child without namespace with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children
            .iter()
            .find(|c| c.namespace.is_none() && c.name == name)
    }

    /// All children without namespace with the given local name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children
            .iter()
            .filter(move |c| c.namespace.is_none() && c.name == name)
    }

    /// First child in the given namespace with the given local name
    pub fn ns_child(&self, namespace: &str, name: &str) -> Option<&XmlElement> {
        self.children
            .iter()
            .find(|c| c.namespace.as_deref() == Some(namespace) && c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A parsed XML document
#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub root: XmlElement,
    namespaces: HashSet<String>,
}

impl XmlDocument {
    /// Whether the namespace URI is declared anywhere in the document
    pub fn declares(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }
}

/// Parse raw XML bytes into an element tree
pub fn parse_document(xml: &[u8]) -> Result<XmlDocument, DecodeError> {
    let mut reader = NsReader::from_reader(xml);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut namespaces = HashSet::new();

    loop {
        let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
        let namespace = namespace_uri(resolved);

        match event {
            Event::Start(start) => {
                let element = open_element(namespace, &start, &mut namespaces)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(namespace, &start, &mut namespaces)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    let root = root.ok_or(DecodeError::Empty)?;
    Ok(XmlDocument { root, namespaces })
}

fn namespace_uri(resolved: ResolveResult) -> Option<String> {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        // Keep undeclared prefixes apart from un-namespaced elements
        ResolveResult::Unknown(prefix) => Some(String::from_utf8_lossy(&prefix).into_owned()),
        ResolveResult::Unbound => None,
    }
}

fn open_element(
    namespace: Option<String>,
    start: &BytesStart,
    namespaces: &mut HashSet<String>,
) -> Result<XmlElement, DecodeError> {
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        let value = attr.unescape_value()?.into_owned();

        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            namespaces.insert(value);
            continue;
        }

        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        attributes.push((name, value));
    }

    Ok(XmlElement {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
