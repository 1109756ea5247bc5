//! XML Reader Module
//!
//! - Source: chunked, decoding input buffer
//! - Events: the event type produced by the parser
//! - Pull: the pull parser and its document phase machine

pub mod events;
pub mod pull;
pub mod source;
