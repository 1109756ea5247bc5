//! XML Event Types
//!
//! One event per `pull`. Text-bearing payloads are reported as written;
//! entity references are resolved on request through
//! [`unnormalize`](crate::unnormalize).

use crate::core::attributes::Attributes;
use crate::core::dtd::{AttlistDecl, DoctypeDecl, EntityDecl, NotationDecl};

/// XML parsing event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// `<name attrs...>`, or the first half of `<name attrs.../>`
    StartElement { name: String, attributes: Attributes },
    /// `</name>`, or synthesized after a self-closing tag
    EndElement { name: String },
    /// Character data between tags
    Text(String),
    CData(String),
    Comment(String),
    /// `<?target content?>`
    ProcessingInstruction {
        target: String,
        content: Option<String>,
    },
    /// `<?xml version="1.0"?>`, values as written
    XmlDecl {
        version: Option<String>,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    StartDoctype(DoctypeDecl),
    EndDoctype,
    /// `<!ELEMENT ...>` verbatim
    ElementDecl(String),
    EntityDecl(EntityDecl),
    AttlistDecl(AttlistDecl),
    NotationDecl(NotationDecl),
    /// No more input
    EndDocument,
}

/// Split a name into prefix and local name at the colon
fn split_name(name: &str) -> (Option<&str>, &str) {
    match memchr::memchr(b':', name.as_bytes()) {
        Some(pos) => (Some(&name[..pos]), &name[pos + 1..]),
        None => (None, name),
    }
}

impl ParseEvent {
    pub fn is_start_element(&self) -> bool {
        matches!(self, ParseEvent::StartElement { .. })
    }

    pub fn is_end_element(&self) -> bool {
        matches!(self, ParseEvent::EndElement { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ParseEvent::Text(_))
    }

    pub fn is_end_document(&self) -> bool {
        matches!(self, ParseEvent::EndDocument)
    }

    /// Declarations and markers of the DOCTYPE
    pub fn is_doctype(&self) -> bool {
        matches!(
            self,
            ParseEvent::StartDoctype(_)
                | ParseEvent::EndDoctype
                | ParseEvent::ElementDecl(_)
                | ParseEvent::EntityDecl(_)
                | ParseEvent::AttlistDecl(_)
                | ParseEvent::NotationDecl(_)
        )
    }

    /// Element name of a start or end element
    pub fn name(&self) -> Option<&str> {
        match self {
            ParseEvent::StartElement { name, .. } | ParseEvent::EndElement { name } => Some(name),
            _ => None,
        }
    }

    /// Namespace prefix of the element name, if any
    pub fn prefix(&self) -> Option<&str> {
        self.name().and_then(|name| split_name(name).0)
    }

    /// Element name without its prefix
    pub fn local_name(&self) -> Option<&str> {
        self.name().map(|name| split_name(name).1)
    }

    /// Raw value of an attribute of a start element
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            ParseEvent::StartElement { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Content of a text or CDATA event
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParseEvent::Text(t) | ParseEvent::CData(t) => Some(t),
            _ => None,
        }
    }
}
