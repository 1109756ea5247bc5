//! DOCTYPE and Internal Subset Declarations
//!
//! Productions for the DOCTYPE head and for the ELEMENT, ENTITY, ATTLIST
//! and NOTATION declarations of the internal subset. Each production first
//! locates the `>` closing the declaration (skipping quoted literals) and
//! then parses that complete slice, so a short buffer only ever answers
//! `NeedMore` and a complete one is either matched or malformed.

use super::entities::reference_len;
use super::scanner::{is_name_char, Scan, Scanner};
use crate::error::ErrorKind;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Head of a `<!DOCTYPE ...>` declaration, literals without their quotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctypeDecl {
    pub name: String,
    /// Keyword after the name, normally `SYSTEM` or `PUBLIC`
    pub pub_or_sys: Option<String>,
    /// First quoted literal
    pub long_name: Option<String>,
    /// Second quoted literal
    pub uri: Option<String>,
}

/// External identifier of a DOCTYPE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalId {
    System { system_id: String },
    Public { public_id: String, system_id: Option<String> },
}

impl DoctypeDecl {
    /// Typed view of the keyword and literals, None for an internal-only
    /// DOCTYPE or an unknown keyword
    pub fn external_id(&self) -> Option<ExternalId> {
        let first = self.long_name.clone()?;
        match self.pub_or_sys.as_deref()? {
            "SYSTEM" => Some(ExternalId::System { system_id: first }),
            "PUBLIC" => Some(ExternalId::Public {
                public_id: first,
                system_id: self.uri.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDecl {
    pub name: String,
    /// Declared with `%`, usable only inside the DTD
    pub is_parameter: bool,
    pub payload: EntityPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPayload {
    /// Literal replacement text
    Internal { value: String },
    ExternalSystem {
        system_id: String,
        ndata: Option<String>,
    },
    ExternalPublic {
        public_id: String,
        system_id: String,
        ndata: Option<String>,
    },
}

impl EntityDecl {
    /// Replacement text of an internal entity
    pub fn value(&self) -> Option<&str> {
        match &self.payload {
            EntityPayload::Internal { value } => Some(value),
            _ => None,
        }
    }

    /// External entity carrying an NDATA notation
    pub fn is_unparsed(&self) -> bool {
        matches!(
            &self.payload,
            EntityPayload::ExternalSystem { ndata: Some(_), .. }
                | EntityPayload::ExternalPublic { ndata: Some(_), .. }
        )
    }
}

/// `<!ATTLIST ...>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttlistDecl {
    pub element: String,
    /// Attribute name to default value. `#REQUIRED` maps to None,
    /// `#IMPLIED` attributes are left out.
    pub defaults: IndexMap<String, Option<String>>,
    /// The declaration as written, through the closing `>`
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotationKind {
    Public,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationDecl {
    pub name: String,
    pub kind: NotationKind,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// Result of the DOCTYPE head production
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctypeStart {
    pub decl: DoctypeDecl,
    /// Closed by `>` rather than opening a subset with `[`
    pub self_closed: bool,
}

/// `<!DOCTYPE` identity up to the first `[` or `>` outside quotes
pub fn doctype_start(input: &str) -> Scan<Result<DoctypeStart, ErrorKind>> {
    let mut scanner = Scanner::new(input);
    match scanner.keyword_ws("<!DOCTYPE") {
        Scan::Match(..) => {}
        Scan::Mismatch => return Scan::Mismatch,
        Scan::NeedMore => return Scan::NeedMore,
    }
    let identity_start = scanner.position();
    let Some(end) = scanner.find_subset_or_end() else {
        return Scan::NeedMore;
    };

    match parse_identity(&input[identity_start..end]) {
        Some(decl) => Scan::Match(
            Ok(DoctypeStart {
                decl,
                self_closed: input.as_bytes()[end] == b'>',
            }),
            end + 1,
        ),
        None => Scan::Match(Err(ErrorKind::MissingDoctypeName), 0),
    }
}

/// Name, then optional keyword and up to two literals, each introduced by
/// whitespace. Trailing text that fits none of these is ignored.
fn parse_identity(identity: &str) -> Option<DoctypeDecl> {
    let mut scanner = Scanner::new(identity);
    let name = scanner.read_while(|c| is_name_char(c) || c == '!' || c == '*')?;
    let mut decl = DoctypeDecl {
        name: name.to_string(),
        pub_or_sys: None,
        long_name: None,
        uri: None,
    };

    let mark = scanner.position();
    if scanner.skip_whitespace() > 0 {
        if let Some(keyword) = scanner.read_name() {
            decl.pub_or_sys = Some(keyword.to_string());
        } else {
            scanner.set_position(mark);
        }
    }
    decl.long_name = spaced_literal(&mut scanner);
    if decl.long_name.is_some() {
        decl.uri = spaced_literal(&mut scanner);
    }
    Some(decl)
}

/// Whitespace then a quoted literal; the cursor is restored if either is
/// missing
fn spaced_literal(scanner: &mut Scanner<'_>) -> Option<String> {
    let mark = scanner.position();
    if scanner.skip_whitespace() > 0 {
        if let Some(value) = literal(scanner) {
            return Some(value.to_string());
        }
    }
    scanner.set_position(mark);
    None
}

fn literal<'a>(scanner: &mut Scanner<'a>) -> Option<&'a str> {
    match scanner.read_quoted() {
        Scan::Match(value, _) => Some(value),
        _ => None,
    }
}

/// Keyword plus whitespace against a complete slice
fn keyword(scanner: &mut Scanner<'_>, word: &str) -> bool {
    matches!(scanner.keyword_ws(word), Scan::Match(..))
}

/// Locate the declaration body: text between `<!KEYWORD ` and the closing
/// `>`. Returns the body and the total length through `>`.
fn declaration<'a>(input: &'a str, open: &str, quoted: bool) -> Scan<(&'a str, usize)> {
    let mut scanner = Scanner::new(input);
    match scanner.keyword_ws(open) {
        Scan::Match(..) => {}
        Scan::Mismatch => return Scan::Mismatch,
        Scan::NeedMore => return Scan::NeedMore,
    }
    let end = if quoted {
        scanner.find_tag_end_quoted()
    } else {
        scanner.find_byte(b'>')
    };
    match end {
        Some(end) => Scan::Match((&input[scanner.position()..end], end + 1), end + 1),
        None => Scan::NeedMore,
    }
}

/// `<!ELEMENT ...>`, kept verbatim
pub fn element_decl(input: &str) -> Scan<String> {
    declaration(input, "<!ELEMENT", false).map(|(_, len)| input[..len].to_string())
}

/// `<!ENTITY ...>`, Err when the declaration is complete but malformed
pub fn entity_decl(input: &str) -> Scan<Result<EntityDecl, ErrorKind>> {
    declaration(input, "<!ENTITY", true)
        .map(|(body, _)| parse_entity(body).ok_or(ErrorKind::MalformedEntity))
}

fn parse_entity(body: &str) -> Option<EntityDecl> {
    let mut scanner = Scanner::new(body);
    let is_parameter = scanner.peek() == Some(b'%');
    if is_parameter {
        scanner.advance(1);
        if scanner.skip_whitespace() == 0 {
            return None;
        }
    }
    let name = scanner.read_name()?.to_string();
    if scanner.skip_whitespace() == 0 {
        return None;
    }

    let payload = match scanner.peek()? {
        b'"' | b'\'' => {
            let value = literal(&mut scanner)?;
            if !is_entity_value(value) {
                return None;
            }
            EntityPayload::Internal {
                value: value.to_string(),
            }
        }
        _ => {
            let external = external_id(&mut scanner)?;
            let ndata = if is_parameter { None } else { ndata(&mut scanner) };
            match external {
                ExternalId::System { system_id } => EntityPayload::ExternalSystem { system_id, ndata },
                ExternalId::Public {
                    public_id,
                    system_id: Some(system_id),
                } => EntityPayload::ExternalPublic {
                    public_id,
                    system_id,
                    ndata,
                },
                ExternalId::Public { system_id: None, .. } => return None,
            }
        }
    };

    scanner.skip_whitespace();
    if !scanner.is_eof() {
        return None;
    }
    Some(EntityDecl {
        name,
        is_parameter,
        payload,
    })
}

/// `SYSTEM "sys"` or `PUBLIC "pub" "sys"`, the system literal of `PUBLIC`
/// being optional (as in a NOTATION)
fn external_id(scanner: &mut Scanner<'_>) -> Option<ExternalId> {
    if keyword(scanner, "SYSTEM") {
        let system_id = literal(scanner)?.to_string();
        return Some(ExternalId::System { system_id });
    }
    if keyword(scanner, "PUBLIC") {
        let public_id = literal(scanner)?;
        if !public_id.chars().all(is_pubid_char) {
            return None;
        }
        return Some(ExternalId::Public {
            public_id: public_id.to_string(),
            system_id: spaced_literal(scanner),
        });
    }
    None
}

/// Optional `NDATA name` of an unparsed entity
fn ndata(scanner: &mut Scanner<'_>) -> Option<String> {
    let mark = scanner.position();
    if scanner.skip_whitespace() > 0 && keyword(scanner, "NDATA") {
        if let Some(notation) = scanner.read_name() {
            return Some(notation.to_string());
        }
    }
    scanner.set_position(mark);
    None
}

/// Entity values may hold `%name;`, `&name;` and character references, but
/// no other `%` or `&`
fn is_entity_value(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut pos = 0;
    while let Some(i) = memchr::memchr2(b'%', b'&', &bytes[pos..]) {
        pos += i;
        let len = if bytes[pos] == b'&' {
            reference_len(&value[pos..])
        } else {
            parameter_reference_len(&value[pos..])
        };
        match len {
            Some(len) => pos += len,
            None => return false,
        }
    }
    true
}

fn parameter_reference_len(input: &str) -> Option<usize> {
    let mut scanner = Scanner::new(input);
    scanner.advance(1);
    scanner.read_name()?;
    (scanner.peek() == Some(b';')).then(|| scanner.position() + 1)
}

fn is_pubid_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            ' ' | '\r' | '\n' | '-' | '\'' | '(' | ')' | '+' | ',' | '.' | '/' | ':' | '=' | '?'
                | ';' | '!' | '*' | '#' | '@' | '$' | '_' | '%'
        )
}

/// `<!ATTLIST element attdef*>`
pub fn attlist_decl(input: &str) -> Scan<Result<AttlistDecl, ErrorKind>> {
    declaration(input, "<!ATTLIST", true).map(|(body, len)| {
        let (element, defaults) = parse_attlist(body).ok_or(ErrorKind::MalformedAttlist)?;
        Ok(AttlistDecl {
            element,
            defaults,
            raw_text: input[..len].to_string(),
        })
    })
}

fn parse_attlist(body: &str) -> Option<(String, IndexMap<String, Option<String>>)> {
    let mut scanner = Scanner::new(body);
    let element = scanner.read_name()?.to_string();
    let mut defaults = IndexMap::new();
    let mut seen = HashSet::new();

    loop {
        let skipped = scanner.skip_whitespace();
        if scanner.is_eof() {
            break;
        }
        if skipped == 0 {
            return None;
        }
        let (name, default) = parse_attdef(&mut scanner)?;
        // The first definition of an attribute is binding, #IMPLIED included
        if !seen.insert(name) {
            continue;
        }
        if let Some(default) = default {
            defaults.insert(name.to_string(), default);
        }
    }
    Some((element, defaults))
}

/// One `name type default` clause. The outer Option of the default is
/// None for `#IMPLIED`.
fn parse_attdef<'a>(scanner: &mut Scanner<'a>) -> Option<(&'a str, Option<Option<String>>)> {
    let name = scanner.read_name()?;
    if scanner.skip_whitespace() == 0 {
        return None;
    }
    parse_atttype(scanner)?;
    if scanner.skip_whitespace() == 0 {
        return None;
    }

    if scanner.peek() == Some(b'#') {
        scanner.advance(1);
        let default = match scanner.read_name()? {
            "REQUIRED" => Some(None),
            "IMPLIED" => None,
            "FIXED" => {
                if scanner.skip_whitespace() == 0 {
                    return None;
                }
                Some(Some(attribute_value(scanner)?))
            }
            _ => return None,
        };
        return Some((name, default));
    }
    Some((name, Some(Some(attribute_value(scanner)?))))
}

fn parse_atttype(scanner: &mut Scanner<'_>) -> Option<()> {
    if scanner.peek() == Some(b'(') {
        return enumeration(scanner, |s| s.read_while(is_name_char));
    }
    match scanner.read_name()? {
        "CDATA" | "ID" | "IDREF" | "IDREFS" | "ENTITY" | "ENTITIES" | "NMTOKEN" | "NMTOKENS" => Some(()),
        "NOTATION" => {
            if scanner.skip_whitespace() == 0 {
                return None;
            }
            enumeration(scanner, |s| s.read_name())
        }
        _ => None,
    }
}

/// `( token | token ... )`
fn enumeration<'a>(
    scanner: &mut Scanner<'a>,
    token: impl Fn(&mut Scanner<'a>) -> Option<&'a str>,
) -> Option<()> {
    if scanner.peek() != Some(b'(') {
        return None;
    }
    scanner.advance(1);
    loop {
        scanner.skip_whitespace();
        token(&mut *scanner)?;
        scanner.skip_whitespace();
        match scanner.peek()? {
            b')' => {
                scanner.advance(1);
                return Some(());
            }
            b'|' => scanner.advance(1),
            _ => return None,
        }
    }
}

/// Quoted attribute value without `<` or stray `&`
fn attribute_value(scanner: &mut Scanner<'_>) -> Option<String> {
    let value = literal(scanner)?;
    if value.contains('<') {
        return None;
    }
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        rest = &rest[amp..];
        rest = &rest[reference_len(rest)?..];
    }
    Some(value.to_string())
}

/// `<!NOTATION name PUBLIC "pub" ["sys"]>` or `<!NOTATION name SYSTEM "sys">`
pub fn notation_decl(input: &str) -> Scan<Result<NotationDecl, ErrorKind>> {
    declaration(input, "<!NOTATION", true)
        .map(|(body, _)| parse_notation(body).ok_or(ErrorKind::MalformedNotation))
}

fn parse_notation(body: &str) -> Option<NotationDecl> {
    let mut scanner = Scanner::new(body);
    let name = scanner.read_name()?.to_string();
    if scanner.skip_whitespace() == 0 {
        return None;
    }
    let decl = match external_id(&mut scanner)? {
        ExternalId::System { system_id } => NotationDecl {
            name,
            kind: NotationKind::System,
            public_id: None,
            system_id: Some(system_id),
        },
        ExternalId::Public { public_id, system_id } => NotationDecl {
            name,
            kind: NotationKind::Public,
            public_id: Some(public_id),
            system_id,
        },
    };
    scanner.skip_whitespace();
    scanner.is_eof().then_some(decl)
}

/// `]` whitespace `>` closing the internal subset
pub fn subset_end(input: &str) -> Scan<()> {
    let mut scanner = Scanner::new(input);
    match scanner.peek() {
        Some(b']') => scanner.advance(1),
        Some(_) => return Scan::Mismatch,
        None => return Scan::NeedMore,
    }
    scanner.skip_whitespace();
    match scanner.peek() {
        Some(b'>') => Scan::Match((), scanner.position() + 1),
        Some(_) => Scan::Mismatch,
        None => Scan::NeedMore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched<T>(scan: Scan<T>) -> T {
        match scan {
            Scan::Match(value, _) => value,
            Scan::Mismatch => panic!("Expected a match, got Mismatch"),
            Scan::NeedMore => panic!("Expected a match, got NeedMore"),
        }
    }

    #[test]
    fn test_doctype_name_only() {
        let start = matched(doctype_start("<!DOCTYPE root>")).unwrap();
        assert_eq!(start.decl.name, "root");
        assert!(start.self_closed);
        assert_eq!(start.decl.external_id(), None);
    }

    #[test]
    fn test_doctype_public_with_subset() {
        let input = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0//EN\" 'http://x/y.dtd' [";
        let Scan::Match(Ok(start), len) = doctype_start(input) else {
            panic!("Expected a DOCTYPE");
        };
        assert!(!start.self_closed);
        assert_eq!(len, input.len());
        assert_eq!(start.decl.pub_or_sys.as_deref(), Some("PUBLIC"));
        assert_eq!(start.decl.long_name.as_deref(), Some("-//W3C//DTD XHTML 1.0//EN"));
        assert_eq!(start.decl.uri.as_deref(), Some("http://x/y.dtd"));
        assert_eq!(
            start.decl.external_id(),
            Some(ExternalId::Public {
                public_id: "-//W3C//DTD XHTML 1.0//EN".to_string(),
                system_id: Some("http://x/y.dtd".to_string()),
            })
        );
    }

    #[test]
    fn test_doctype_bracket_inside_literal() {
        let start = matched(doctype_start("<!DOCTYPE r SYSTEM \"a[1].dtd\">")).unwrap();
        assert_eq!(start.decl.long_name.as_deref(), Some("a[1].dtd"));
        assert!(start.self_closed);
    }

    #[test]
    fn test_doctype_missing_name() {
        assert_eq!(doctype_start("<!DOCTYPE  >"), Scan::Match(Err(ErrorKind::MissingDoctypeName), 0));
        assert_eq!(doctype_start("<!DOCTYPE root"), Scan::NeedMore);
    }

    #[test]
    fn test_element_decl_raw() {
        let input = "<!ELEMENT a (b|c)*>rest";
        assert_eq!(element_decl(input), Scan::Match("<!ELEMENT a (b|c)*>".to_string(), 19));
    }

    #[test]
    fn test_entity_internal() {
        let decl = matched(entity_decl("<!ENTITY co 'ACME &amp; %pe; &#65;'>")).unwrap();
        assert_eq!(decl.name, "co");
        assert!(!decl.is_parameter);
        assert_eq!(decl.value(), Some("ACME &amp; %pe; &#65;"));
    }

    #[test]
    fn test_entity_parameter() {
        let decl = matched(entity_decl("<!ENTITY % pe SYSTEM \"pe.dtd\">")).unwrap();
        assert!(decl.is_parameter);
        assert_eq!(
            decl.payload,
            EntityPayload::ExternalSystem {
                system_id: "pe.dtd".to_string(),
                ndata: None
            }
        );
    }

    #[test]
    fn test_entity_shapes_are_distinct() {
        let system = matched(entity_decl("<!ENTITY a SYSTEM \"a.xml\">")).unwrap();
        let public = matched(entity_decl("<!ENTITY b PUBLIC \"-//B//EN\" \"b.xml\">")).unwrap();
        let unparsed = matched(entity_decl("<!ENTITY c SYSTEM \"c.gif\" NDATA gif>")).unwrap();
        let public_unparsed = matched(entity_decl("<!ENTITY d PUBLIC \"-//D//EN\" \"d.gif\" NDATA gif>")).unwrap();

        assert!(matches!(system.payload, EntityPayload::ExternalSystem { ndata: None, .. }));
        assert!(matches!(public.payload, EntityPayload::ExternalPublic { ndata: None, .. }));
        assert_eq!(
            unparsed.payload,
            EntityPayload::ExternalSystem {
                system_id: "c.gif".to_string(),
                ndata: Some("gif".to_string())
            }
        );
        assert!(unparsed.is_unparsed());
        assert!(public_unparsed.is_unparsed());
    }

    #[test]
    fn test_entity_malformed() {
        assert_eq!(matched(entity_decl("<!ENTITY a 'x & y'>")), Err(ErrorKind::MalformedEntity));
        assert_eq!(matched(entity_decl("<!ENTITY a PUBLIC \"-//A//EN\">")), Err(ErrorKind::MalformedEntity));
        assert_eq!(matched(entity_decl("<!ENTITY a PUBLIC \"{bad}\" \"a\">")), Err(ErrorKind::MalformedEntity));
        assert_eq!(matched(entity_decl("<!ENTITY % p SYSTEM \"p\" NDATA n>")), Err(ErrorKind::MalformedEntity));
        assert_eq!(entity_decl("<!ENTITY a 'x>"), Scan::NeedMore);
    }

    #[test]
    fn test_attlist_defaults() {
        let input = "<!ATTLIST img src CDATA #REQUIRED alt CDATA #IMPLIED \
                     align (left|right) \"left\" version CDATA #FIXED '1.0'>";
        let decl = matched(attlist_decl(input)).unwrap();
        assert_eq!(decl.element, "img");
        assert_eq!(decl.raw_text, input);
        let keys: Vec<_> = decl.defaults.keys().map(String::as_str).collect();
        assert_eq!(keys, ["src", "align", "version"]);
        assert_eq!(decl.defaults["src"], None);
        assert_eq!(decl.defaults["align"].as_deref(), Some("left"));
        assert_eq!(decl.defaults["version"].as_deref(), Some("1.0"));
    }

    #[test]
    fn test_attlist_notation_type() {
        let decl = matched(attlist_decl("<!ATTLIST pic type NOTATION (gif | png) 'gif'>")).unwrap();
        assert_eq!(decl.defaults["type"].as_deref(), Some("gif"));
    }

    #[test]
    fn test_attlist_first_definition_binds() {
        let decl = matched(attlist_decl("<!ATTLIST a x CDATA 'one' x CDATA 'two'>")).unwrap();
        assert_eq!(decl.defaults["x"].as_deref(), Some("one"));
    }

    #[test]
    fn test_attlist_implied_first_definition_binds() {
        let decl = matched(attlist_decl("<!ATTLIST a x CDATA #IMPLIED x CDATA 'late' y ID #REQUIRED>")).unwrap();
        assert!(!decl.defaults.contains_key("x"));
        assert_eq!(decl.defaults.get("y"), Some(&None));
    }

    #[test]
    fn test_attlist_malformed() {
        let bad = ErrorKind::MalformedAttlist;
        assert_eq!(matched(attlist_decl("<!ATTLIST a x BOGUS #IMPLIED>")), Err(bad.clone()));
        assert_eq!(matched(attlist_decl("<!ATTLIST a x CDATA>")), Err(bad.clone()));
        assert_eq!(matched(attlist_decl("<!ATTLIST a x CDATA '<'>")), Err(bad));
    }

    #[test]
    fn test_notation() {
        let public = matched(notation_decl("<!NOTATION gif PUBLIC \"-//GIF//EN\" 'viewer'>")).unwrap();
        assert_eq!(public.kind, NotationKind::Public);
        assert_eq!(public.public_id.as_deref(), Some("-//GIF//EN"));
        assert_eq!(public.system_id.as_deref(), Some("viewer"));

        let system = matched(notation_decl("<!NOTATION png SYSTEM \"png-viewer\">")).unwrap();
        assert_eq!(system.kind, NotationKind::System);
        assert_eq!(system.public_id, None);

        assert_eq!(
            matched(notation_decl("<!NOTATION png OTHER \"x\">")),
            Err(ErrorKind::MalformedNotation)
        );
    }

    #[test]
    fn test_subset_end() {
        assert_eq!(subset_end("] >"), Scan::Match((), 3));
        assert_eq!(subset_end("]"), Scan::NeedMore);
        assert_eq!(subset_end("]x"), Scan::Mismatch);
    }
}
