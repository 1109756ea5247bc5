//! Core XML parsing primitives
//!
//! This module contains the lexical building blocks of the pull parser:
//! - Scanner: cursor and delimiter search over decoded text using memchr
//! - Grammar: prolog and content productions (tags, comments, PIs, text)
//! - DTD: DOCTYPE head and internal subset declaration productions
//! - Attributes: attribute list extraction for tag heads
//! - Entities: entity escaping and resolution with Cow (borrowed when unchanged)
//! - Encoding: BOM sniffing and encoding label resolution

pub mod attributes;
pub mod dtd;
pub mod encoding;
pub mod entities;
pub mod grammar;
pub mod scanner;
