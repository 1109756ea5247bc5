//! pullxml - Streaming pull parser for XML
//!
//! Turns markup into a sequence of [`ParseEvent`]s, one per call to
//! [`PullParser::pull`], without building a tree. The prolog, the DOCTYPE
//! with its internal subset, and element content are all reported. Entity
//! references in text and attribute values are left as written and resolved
//! on request with [`unnormalize`].
//!
//! ```
//! use pullxml::{ParseEvent, PullParser};
//!
//! let mut parser = PullParser::from_text("<a>text<b att='val'/></a>");
//! assert_eq!(parser.pull().unwrap().name(), Some("a"));
//! assert_eq!(parser.pull().unwrap(), ParseEvent::Text("text".to_string()));
//! assert_eq!(parser.peek(0).unwrap().attribute("att"), Some("val"));
//! ```
//!
//! Input can be any `std::io::Read`; it is read in chunks (see
//! [`Source::with_capacity`]) and decoded as UTF-8, UTF-16, or whatever
//! the XML declaration names.

mod core;
mod error;
mod reader;

pub use crate::core::attributes::Attributes;
pub use crate::core::dtd::{
    AttlistDecl, DoctypeDecl, EntityDecl, EntityPayload, ExternalId, NotationDecl, NotationKind,
};
pub use crate::core::entities::{
    entity, normalize, unnormalize, DefaultEntity, EntityMap, DEFAULT_ENTITIES, MAX_ENTITY_DEPTH,
    MAX_EXPANSION,
};
pub use error::{ErrorKind, ParseError, Position, Result, SourceError};
pub use reader::events::ParseEvent;
pub use reader::pull::{DocumentPhase, PullParser};
pub use reader::source::Source;
