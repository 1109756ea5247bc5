//! Pull Parser
//!
//! Stateful parser that produces one [`ParseEvent`] per call to `pull`,
//! reading from its [`Source`] only as far as that event needs.
//!
//! Each call first replays events held in the pushback queue (filled by
//! `peek` and `unshift`), then delivers a synthesized event owed by the
//! previous step (the end of a self-closing tag or of a self-closed
//! DOCTYPE), and only then parses fresh input according to the document
//! phase.

use super::events::ParseEvent;
use super::source::Source;
use crate::core::dtd::{self, DoctypeStart};
use crate::core::grammar::{self, XmlDeclaration};
use crate::core::scanner::Scan;
use crate::error::{ErrorKind, Fault, ParseError, Position, Result};
use log::{debug, trace};
use std::collections::VecDeque;
use std::io::{self, Read};

type Step<T> = std::result::Result<T, Fault>;

/// Where in the document the parser is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentPhase {
    /// Before the DOCTYPE or the root element
    Prolog,
    /// Between `[` and `]>` of the DOCTYPE
    InDoctypeSubset,
    /// Element content, and everything after the DOCTYPE
    AfterDoctype,
}

/// Event owed to the next fresh parse step
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    /// End of a self-closing tag
    Close(String),
    /// End of a DOCTYPE closed without an internal subset
    EndDoctype,
}

#[derive(Debug, Clone, Copy)]
enum PrologItem {
    Comment,
    XmlDecl,
    Instruction,
    Doctype,
    Content,
}

const PROLOG: [(&str, PrologItem); 4] = [
    ("<!--", PrologItem::Comment),
    ("<?xml", PrologItem::XmlDecl),
    ("<?", PrologItem::Instruction),
    ("<!DOCTYPE", PrologItem::Doctype),
];

#[derive(Debug, Clone, Copy)]
enum ContentItem {
    EndTag,
    Bang,
    Instruction,
    StartTag,
    Text,
}

const CONTENT: [(&str, ContentItem); 4] = [
    ("</", ContentItem::EndTag),
    ("<!", ContentItem::Bang),
    ("<?", ContentItem::Instruction),
    ("<", ContentItem::StartTag),
];

#[derive(Debug, Clone, Copy)]
enum BangItem {
    CData,
    Comment,
}

const BANG: [(&str, BangItem); 2] = [("<![CDATA[", BangItem::CData), ("<!--", BangItem::Comment)];

#[derive(Debug, Clone, Copy)]
enum SubsetItem {
    Element,
    Entity,
    Attlist,
    Notation,
    Comment,
    Instruction,
    End,
}

const SUBSET: [(&str, SubsetItem); 7] = [
    ("<!ELEMENT", SubsetItem::Element),
    ("<!ENTITY", SubsetItem::Entity),
    ("<!ATTLIST", SubsetItem::Attlist),
    ("<!NOTATION", SubsetItem::Notation),
    ("<!--", SubsetItem::Comment),
    ("<?", SubsetItem::Instruction),
    ("]", SubsetItem::End),
];

/// Streaming pull parser
pub struct PullParser<R> {
    source: Source<R>,
    phase: DocumentPhase,
    /// Names of open elements, innermost last
    tags: Vec<String>,
    /// Events produced ahead by `peek` or pushed back by `unshift`
    queue: VecDeque<ParseEvent>,
    pending: Option<Pending>,
    /// Nothing parsed yet; only here is `<?xml ...?>` a declaration
    at_start: bool,
    /// Iteration ended at EndDocument or an error
    done: bool,
}

impl<R: Read> PullParser<R> {
    pub fn new(reader: R) -> Self {
        Self::with_source(Source::new(reader))
    }

    /// Create a parser over a configured source
    pub fn with_source(source: Source<R>) -> Self {
        PullParser {
            source,
            phase: DocumentPhase::Prolog,
            tags: Vec::new(),
            queue: VecDeque::new(),
            pending: None,
            at_start: true,
            done: false,
        }
    }

    /// Whether another event other than EndDocument is available
    ///
    /// Reads ahead until the buffer holds something other than whitespace
    /// or the input is exhausted.
    pub fn has_next(&mut self) -> Result<bool> {
        if !self.queue.is_empty() || self.pending.is_some() {
            return Ok(true);
        }
        self.source.fill_nonblank().map_err(|e| self.fail(e.into()))
    }

    /// Next event
    ///
    /// Returns EndDocument once the input is exhausted, and again on every
    /// later call. An error is terminal: the parser state is undefined
    /// afterwards.
    pub fn pull(&mut self) -> Result<ParseEvent> {
        if let Some(event) = self.queue.pop_front() {
            return Ok(event);
        }
        self.next_fresh()
    }

    /// Look `depth` events ahead without consuming them
    ///
    /// `peek(0)` is the event the next `pull` returns.
    pub fn peek(&mut self, depth: usize) -> Result<&ParseEvent> {
        while self.queue.len() <= depth {
            let event = self.next_fresh()?;
            self.queue.push_back(event);
        }
        Ok(&self.queue[depth])
    }

    /// Buffer every remaining event and return the final EndDocument
    ///
    /// Holds the rest of the document in memory.
    pub fn peek_to_end(&mut self) -> Result<&ParseEvent> {
        let queued = self.queue.iter().position(ParseEvent::is_end_document);
        let end = match queued {
            Some(end) => end,
            None => loop {
                let event = self.next_fresh()?;
                let is_end = event.is_end_document();
                self.queue.push_back(event);
                if is_end {
                    break self.queue.len() - 1;
                }
            },
        };
        Ok(&self.queue[end])
    }

    /// Push an event back; the next `pull` returns it
    pub fn unshift(&mut self, event: ParseEvent) {
        self.queue.push_front(event);
    }

    pub fn phase(&self) -> DocumentPhase {
        self.phase
    }

    /// Names of the elements currently open, outermost first
    pub fn open_elements(&self) -> &[String] {
        &self.tags
    }

    /// Location of the next unparsed character
    pub fn position(&self) -> Position {
        self.source.position()
    }

    /// Produce an event without looking at the queue
    fn next_fresh(&mut self) -> Result<ParseEvent> {
        let event = match self.pending.take() {
            Some(Pending::Close(name)) => ParseEvent::EndElement { name },
            Some(Pending::EndDoctype) => ParseEvent::EndDoctype,
            None => self.parse_next().map_err(|fault| self.fail(fault))?,
        };
        trace!("Parsed {:?}", event);
        Ok(event)
    }

    fn fail(&self, fault: Fault) -> ParseError {
        let position = self.source.position();
        let input = self.source.buffer();
        match fault {
            Fault::Structural(kind) => ParseError::new(kind, position, input),
            Fault::Source(error) => ParseError::wrap(error, position, input),
        }
    }

    fn parse_next(&mut self) -> Step<ParseEvent> {
        if !self.source.fill_nonblank()? {
            let rest = self.source.buffer().len();
            self.source.consume(rest);
            if self.phase == DocumentPhase::InDoctypeSubset {
                debug!("Input ended inside the DOCTYPE internal subset");
            }
            if !self.tags.is_empty() {
                debug!("Input ended with {} open element(s)", self.tags.len());
            }
            return Ok(ParseEvent::EndDocument);
        }

        let event = match self.phase {
            DocumentPhase::Prolog => self.parse_prolog()?,
            DocumentPhase::InDoctypeSubset => self.parse_subset()?,
            DocumentPhase::AfterDoctype => self.parse_content()?,
        };
        if self.at_start {
            self.at_start = false;
            self.source.lock_encoding();
        }
        Ok(event)
    }

    fn set_phase(&mut self, phase: DocumentPhase) {
        if self.phase != phase {
            debug!("Document phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Run a production that reports malformed input as `Err`
    ///
    /// Errors consume nothing, so the failure is reported where the
    /// construct starts. Running out of input mid-construct is an
    /// `Unterminated` error; `None` means the production did not apply.
    fn production<T>(
        &mut self,
        production: impl Fn(&str) -> Scan<std::result::Result<T, ErrorKind>>,
        construct: &'static str,
    ) -> Step<Option<T>> {
        let found = self.source.scan(
            |buf, at_eof| match production(buf) {
                Scan::Match(Err(kind), _) => Scan::Match(Err(kind), 0),
                Scan::NeedMore if at_eof => Scan::Match(Err(ErrorKind::Unterminated { construct }), 0),
                other => other,
            },
            true,
        )?;
        Ok(found.transpose()?)
    }

    /// Run a production that must match here
    fn expect<T>(
        &mut self,
        production: impl Fn(&str) -> Scan<T>,
        construct: &'static str,
        malformed: ErrorKind,
    ) -> Step<T> {
        let found = self.production(
            |buf| match production(buf) {
                Scan::Mismatch => Scan::Match(Err(malformed.clone()), 0),
                other => other.map(Ok),
            },
            construct,
        )?;
        found.ok_or_else(|| Fault::from(malformed))
    }

    fn skip_whitespace(&mut self) -> Step<()> {
        self.source.scan(grammar::whitespace, true)?;
        Ok(())
    }

    fn parse_prolog(&mut self) -> Step<ParseEvent> {
        self.skip_whitespace()?;
        let item = self
            .source
            .scan(|buf, at_eof| grammar::classify(buf, at_eof, &PROLOG, Some(PrologItem::Content)), false)?
            .unwrap_or(PrologItem::Content);

        match item {
            PrologItem::Comment => self.comment(),
            PrologItem::XmlDecl if self.at_start => {
                match self.source.scan(|buf, _| grammar::xml_declaration(buf), true)? {
                    Some(decl) => self.xml_declaration(decl),
                    None => self.instruction(),
                }
            }
            PrologItem::XmlDecl | PrologItem::Instruction => self.instruction(),
            PrologItem::Doctype => match self.production(dtd::doctype_start, "DOCTYPE")? {
                Some(start) => self.start_doctype(start),
                None => self.enter_content(),
            },
            PrologItem::Content => self.enter_content(),
        }
    }

    fn enter_content(&mut self) -> Step<ParseEvent> {
        self.set_phase(DocumentPhase::AfterDoctype);
        self.parse_content()
    }

    fn xml_declaration(&mut self, decl: XmlDeclaration) -> Step<ParseEvent> {
        if let Some(label) = decl.encoding.as_deref() {
            self.source.set_encoding(label)?;
        }
        Ok(ParseEvent::XmlDecl {
            version: decl.version,
            encoding: decl.encoding,
            standalone: decl.standalone,
        })
    }

    fn start_doctype(&mut self, start: DoctypeStart) -> Step<ParseEvent> {
        if start.self_closed {
            self.set_phase(DocumentPhase::AfterDoctype);
            self.pending = Some(Pending::EndDoctype);
            self.skip_whitespace()?;
        } else {
            self.set_phase(DocumentPhase::InDoctypeSubset);
        }
        Ok(ParseEvent::StartDoctype(start.decl))
    }

    fn comment(&mut self) -> Step<ParseEvent> {
        let content = self.expect(grammar::comment, "comment", ErrorKind::MalformedNode)?;
        Ok(ParseEvent::Comment(content))
    }

    fn instruction(&mut self) -> Step<ParseEvent> {
        let (target, content) = self.expect(
            grammar::processing_instruction,
            "processing instruction",
            ErrorKind::MalformedNode,
        )?;
        Ok(ParseEvent::ProcessingInstruction { target, content })
    }

    fn parse_content(&mut self) -> Step<ParseEvent> {
        let item = self
            .source
            .scan(|buf, at_eof| grammar::classify(buf, at_eof, &CONTENT, Some(ContentItem::Text)), false)?
            .unwrap_or(ContentItem::Text);

        match item {
            ContentItem::EndTag => self.end_tag(),
            ContentItem::Bang => self.bang(),
            ContentItem::Instruction => self.instruction(),
            ContentItem::StartTag => self.start_tag(),
            ContentItem::Text => self.text(),
        }
    }

    fn end_tag(&mut self) -> Step<ParseEvent> {
        let expected = self.tags.pop();
        let found = self.expect(grammar::close_tag, "end tag", ErrorKind::MalformedEndTag)?;
        if expected.as_deref() != Some(found.as_str()) {
            return Err(ErrorKind::MismatchedEndTag { expected, found }.into());
        }
        Ok(ParseEvent::EndElement { name: found })
    }

    /// `<!` in content: CDATA or a comment
    fn bang(&mut self) -> Step<ParseEvent> {
        if self.source.scan(|buf, _| grammar::markup_closed(buf), false)?.is_none() {
            return Err(ErrorKind::MalformedNode.into());
        }
        let item = self
            .source
            .scan(|buf, at_eof| grammar::classify(buf, at_eof, &BANG, None), false)?;
        match item {
            Some(BangItem::CData) => {
                let content = self.expect(grammar::cdata, "CDATA section", ErrorKind::MalformedNode)?;
                Ok(ParseEvent::CData(content))
            }
            Some(BangItem::Comment) => self.comment(),
            None => Err(ErrorKind::MisplacedDeclaration.into()),
        }
    }

    fn start_tag(&mut self) -> Step<ParseEvent> {
        let head = self
            .production(grammar::tag_head, "start tag")?
            .ok_or(ErrorKind::MalformedTag)?;
        if head.self_closing {
            self.pending = Some(Pending::Close(head.name.clone()));
        } else {
            self.tags.push(head.name.clone());
        }
        Ok(ParseEvent::StartElement {
            name: head.name,
            attributes: head.attributes,
        })
    }

    fn text(&mut self) -> Step<ParseEvent> {
        let text = self.source.scan(grammar::text, true)?.unwrap_or_default();
        if text.is_empty() {
            return Err(ErrorKind::EmptyText.into());
        }
        Ok(ParseEvent::Text(text))
    }

    fn parse_subset(&mut self) -> Step<ParseEvent> {
        self.skip_whitespace()?;
        let item = self
            .source
            .scan(|buf, at_eof| grammar::classify(buf, at_eof, &SUBSET, None), false)?
            .ok_or(ErrorKind::UnrecognizedDeclaration)?;

        match item {
            SubsetItem::Element => {
                let raw = self.expect(dtd::element_decl, "ELEMENT declaration", ErrorKind::UnrecognizedDeclaration)?;
                Ok(ParseEvent::ElementDecl(raw))
            }
            SubsetItem::Entity => {
                let decl = self
                    .production(dtd::entity_decl, "ENTITY declaration")?
                    .ok_or(ErrorKind::UnrecognizedDeclaration)?;
                Ok(ParseEvent::EntityDecl(decl))
            }
            SubsetItem::Attlist => {
                let decl = self
                    .production(dtd::attlist_decl, "ATTLIST declaration")?
                    .ok_or(ErrorKind::UnrecognizedDeclaration)?;
                Ok(ParseEvent::AttlistDecl(decl))
            }
            SubsetItem::Notation => {
                let decl = self
                    .production(dtd::notation_decl, "NOTATION declaration")?
                    .ok_or(ErrorKind::UnrecognizedDeclaration)?;
                Ok(ParseEvent::NotationDecl(decl))
            }
            SubsetItem::Comment => self.comment(),
            SubsetItem::Instruction => self.instruction(),
            SubsetItem::End => {
                self.expect(dtd::subset_end, "DOCTYPE", ErrorKind::UnrecognizedDeclaration)?;
                self.set_phase(DocumentPhase::AfterDoctype);
                self.skip_whitespace()?;
                Ok(ParseEvent::EndDoctype)
            }
        }
    }
}

impl PullParser<io::Empty> {
    /// Parser over text that is already decoded
    pub fn from_text(text: &str) -> Self {
        Self::with_source(Source::from_text(text))
    }
}

/// Yields events up to, not including, EndDocument; stops after an error
impl<R: Read> Iterator for PullParser<R> {
    type Item = Result<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pull() {
            Ok(ParseEvent::EndDocument) => {
                self.done = true;
                None
            }
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
