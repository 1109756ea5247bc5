//! Lexical productions for prolog and content markup
//!
//! Each production looks at the start of the decoded buffer and answers
//! with a [`Scan`]: matched (with the number of bytes to consume), cannot
//! match, or needs more input to decide. Productions never backtrack: tag
//! heads are located with a single quote-aware pass before attributes are
//! extracted.

use super::attributes::{parse_attributes, Attributes};
use super::scanner::{is_whitespace, Scan, Scanner};
use crate::error::ErrorKind;

/// Pick the first entry of `table` whose prefix starts the input
///
/// When the input is a proper prefix of an entry (and more input may come),
/// the answer is [`Scan::NeedMore`] so that `<` is never taken for a start
/// tag before the byte after it is known.
pub fn classify<K: Copy>(
    input: &str,
    at_eof: bool,
    table: &[(&str, K)],
    otherwise: Option<K>,
) -> Scan<K> {
    for &(prefix, kind) in table {
        if input.starts_with(prefix) {
            return Scan::Match(kind, 0);
        }
        if !at_eof && input.len() < prefix.len() && prefix.starts_with(input) {
            return Scan::NeedMore;
        }
    }
    match otherwise {
        Some(kind) => Scan::Match(kind, 0),
        None => Scan::Mismatch,
    }
}

/// Leading whitespace, possibly none
pub fn whitespace(input: &str, at_eof: bool) -> Scan<()> {
    let len = input.bytes().take_while(|&b| is_whitespace(b)).count();
    if len == input.len() && !at_eof {
        return Scan::NeedMore;
    }
    Scan::Match((), len)
}

/// Something after `<!` closes with `>`
pub fn markup_closed(input: &str) -> Scan<()> {
    match memchr::memchr(b'>', input.as_bytes()) {
        Some(_) => Scan::Match((), 0),
        None => Scan::NeedMore,
    }
}

fn delimited(input: &str, open: &str, close: &str) -> Scan<String> {
    let scanner = Scanner::new(input);
    if scanner.is_prefix_of(open) {
        return Scan::NeedMore;
    }
    if !scanner.starts_with(open) {
        return Scan::Mismatch;
    }
    let mut body = Scanner::new(input);
    body.advance(open.len());
    match body.find_str(close) {
        Some(end) => Scan::Match(input[open.len()..end].to_string(), end + close.len()),
        None => Scan::NeedMore,
    }
}

/// `<!--content-->`
pub fn comment(input: &str) -> Scan<String> {
    delimited(input, "<!--", "-->")
}

/// `<![CDATA[content]]>`
pub fn cdata(input: &str) -> Scan<String> {
    delimited(input, "<![CDATA[", "]]>")
}

/// `<?target content?>`, content being whatever follows the whitespace
/// after the target
pub fn processing_instruction(input: &str) -> Scan<(String, Option<String>)> {
    delimited(input, "<?", "?>").map(|inner| {
        match inner.find(|c: char| c.is_ascii_whitespace()) {
            Some(split) => {
                let content = inner[split..].trim_start_matches(|c: char| c.is_ascii_whitespace());
                (inner[..split].to_string(), Some(content.to_string()))
            }
            None => (inner, None),
        }
    })
}

/// Fields of `<?xml ...?>`, as written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// `<?xml` whitespace pseudo-attributes `?>`
pub fn xml_declaration(input: &str) -> Scan<XmlDeclaration> {
    let mut scanner = Scanner::new(input);
    match scanner.keyword_ws("<?xml") {
        Scan::Match(..) => {}
        Scan::Mismatch => return Scan::Mismatch,
        Scan::NeedMore => return Scan::NeedMore,
    }
    let Some(end) = scanner.find_str("?>") else {
        return Scan::NeedMore;
    };
    let body = scanner.slice(scanner.position(), end);
    let decl = XmlDeclaration {
        version: pseudo_attribute(body, "version"),
        encoding: pseudo_attribute(body, "encoding"),
        standalone: pseudo_attribute(body, "standalone"),
    };
    Scan::Match(decl, end + 2)
}

/// Value of `name = "value"` inside an XML declaration body
fn pseudo_attribute(body: &str, name: &str) -> Option<String> {
    let mut from = 0;
    while let Some(found) = body[from..].find(name) {
        let start = from + found;
        from = start + name.len();

        let at_word_start = body[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        if !at_word_start {
            continue;
        }

        let mut scanner = Scanner::new(body);
        scanner.set_position(from);
        scanner.skip_whitespace();
        if scanner.peek() != Some(b'=') {
            continue;
        }
        scanner.advance(1);
        scanner.skip_whitespace();
        if let Scan::Match(value, _) = scanner.read_quoted() {
            return Some(value.to_string());
        }
    }
    None
}

/// A start tag, `<name attr="v">` or `<name/>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHead {
    pub name: String,
    pub attributes: Attributes,
    pub self_closing: bool,
}

/// Start tag head
///
/// Matches with `Err` when the tag is recognisable but broken: no name after
/// `<`, or attribute text that does not parse.
pub fn tag_head(input: &str) -> Scan<Result<TagHead, ErrorKind>> {
    let mut scanner = Scanner::new(input);
    match scanner.peek() {
        Some(b'<') => scanner.advance(1),
        Some(_) => return Scan::Mismatch,
        None => return Scan::NeedMore,
    }
    if scanner.is_eof() {
        return Scan::NeedMore;
    }
    let Some(name) = scanner.read_name() else {
        return Scan::Match(Err(ErrorKind::MalformedTag), 0);
    };
    let name_end = scanner.position();
    let Some(end) = scanner.find_tag_end_quoted() else {
        return Scan::NeedMore;
    };

    let mut inner = &input[name_end..end];
    let self_closing = inner.ends_with('/');
    if self_closing {
        inner = &inner[..inner.len() - 1];
    }

    match parse_attributes(inner) {
        Ok(attributes) => Scan::Match(
            Ok(TagHead {
                name: name.to_string(),
                attributes,
                self_closing,
            }),
            end + 1,
        ),
        Err(residue) => Scan::Match(Err(ErrorKind::MalformedAttributes { residue }), 0),
    }
}

/// `</name>` with optional whitespace before `>`
pub fn close_tag(input: &str) -> Scan<String> {
    let mut scanner = Scanner::new(input);
    if scanner.is_prefix_of("</") {
        return Scan::NeedMore;
    }
    if !scanner.starts_with("</") {
        return Scan::Mismatch;
    }
    scanner.advance(2);
    let Some(name) = scanner.read_name() else {
        return if scanner.is_eof() { Scan::NeedMore } else { Scan::Mismatch };
    };
    scanner.skip_whitespace();
    match scanner.peek() {
        Some(b'>') => Scan::Match(name.to_string(), scanner.position() + 1),
        Some(_) => Scan::Mismatch,
        None => Scan::NeedMore,
    }
}

/// Character data up to the next `<`, or to the end of input
///
/// An empty match is returned as-is; the caller treats it as an error.
pub fn text(input: &str, at_eof: bool) -> Scan<String> {
    match memchr::memchr(b'<', input.as_bytes()) {
        Some(end) => Scan::Match(input[..end].to_string(), end),
        None if at_eof => Scan::Match(input.to_string(), input.len()),
        None => Scan::NeedMore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        End,
        Bang,
        Start,
        Text,
    }

    const TABLE: [(&str, Kind); 3] = [("</", Kind::End), ("<!", Kind::Bang), ("<", Kind::Start)];

    #[test]
    fn test_classify_waits_for_second_byte() {
        assert_eq!(classify("<", false, &TABLE, Some(Kind::Text)), Scan::NeedMore);
        assert_eq!(classify("<", true, &TABLE, Some(Kind::Text)), Scan::Match(Kind::Start, 0));
        assert_eq!(classify("</a>", false, &TABLE, Some(Kind::Text)), Scan::Match(Kind::End, 0));
        assert_eq!(classify("<a>", false, &TABLE, Some(Kind::Text)), Scan::Match(Kind::Start, 0));
        assert_eq!(classify("hi", false, &TABLE, Some(Kind::Text)), Scan::Match(Kind::Text, 0));
        assert_eq!(classify("hi", false, &TABLE, None), Scan::Mismatch);
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(whitespace("  <a/>", false), Scan::Match((), 2));
        assert_eq!(whitespace("   ", false), Scan::NeedMore);
        assert_eq!(whitespace("   ", true), Scan::Match((), 3));
    }

    #[test]
    fn test_comment() {
        assert_eq!(comment("<!-- hi -->rest"), Scan::Match(" hi ".to_string(), 11));
        assert_eq!(comment("<!-- hi --"), Scan::NeedMore);
        assert_eq!(comment("<!-"), Scan::NeedMore);
        assert_eq!(comment("<![CDATA[x]]>"), Scan::Mismatch);
    }

    #[test]
    fn test_cdata() {
        let input = "<![CDATA[<script>code</script>]]>";
        assert_eq!(cdata(input), Scan::Match("<script>code</script>".to_string(), input.len()));
    }

    #[test]
    fn test_processing_instruction() {
        assert_eq!(
            processing_instruction("<?target  some data?>"),
            Scan::Match(("target".to_string(), Some("some data".to_string())), 21)
        );
        assert_eq!(processing_instruction("<?empty?>"), Scan::Match(("empty".to_string(), None), 9));
    }

    #[test]
    fn test_xml_declaration() {
        let input = "<?xml version='1.0' encoding=\"ISO-8859-1\" standalone='yes'?><r/>";
        let Scan::Match(decl, len) = xml_declaration(input) else {
            panic!("Expected a match");
        };
        assert_eq!(decl.version.as_deref(), Some("1.0"));
        assert_eq!(decl.encoding.as_deref(), Some("ISO-8859-1"));
        assert_eq!(decl.standalone.as_deref(), Some("yes"));
        assert_eq!(&input[len..], "<r/>");
    }

    #[test]
    fn test_xml_declaration_needs_whitespace() {
        assert_eq!(xml_declaration("<?xml-stylesheet href='a'?>"), Scan::Mismatch);
        assert_eq!(xml_declaration("<?xml"), Scan::NeedMore);
    }

    #[test]
    fn test_pseudo_attribute_word_boundary() {
        assert_eq!(pseudo_attribute(" myversion='2' version='1.0'", "version").as_deref(), Some("1.0"));
        assert_eq!(pseudo_attribute(" version = \"1.1\"", "version").as_deref(), Some("1.1"));
        assert_eq!(pseudo_attribute(" version='1.0'", "encoding"), None);
    }

    #[test]
    fn test_tag_head() {
        let Scan::Match(Ok(head), len) = tag_head("<b att='val'/>txet") else {
            panic!("Expected a tag head");
        };
        assert_eq!(head.name, "b");
        assert_eq!(head.attributes["att"], "val");
        assert!(head.self_closing);
        assert_eq!(len, 14);
    }

    #[test]
    fn test_tag_head_gt_inside_value() {
        let Scan::Match(Ok(head), _) = tag_head("<a x=\"1 > 0\">") else {
            panic!("Expected a tag head");
        };
        assert_eq!(head.attributes["x"], "1 > 0");
        assert!(!head.self_closing);
    }

    #[test]
    fn test_tag_head_errors() {
        assert_eq!(tag_head("< a>"), Scan::Match(Err(ErrorKind::MalformedTag), 0));
        assert_eq!(
            tag_head("<a x='1' junk>"),
            Scan::Match(Err(ErrorKind::MalformedAttributes { residue: "junk".to_string() }), 0)
        );
        assert_eq!(tag_head("<a x='1"), Scan::NeedMore);
        assert_eq!(tag_head("<"), Scan::NeedMore);
    }

    #[test]
    fn test_close_tag() {
        assert_eq!(close_tag("</a >x"), Scan::Match("a".to_string(), 5));
        assert_eq!(close_tag("</a"), Scan::NeedMore);
        assert_eq!(close_tag("</a b>"), Scan::Mismatch);
        assert_eq!(close_tag("</>"), Scan::Mismatch);
    }

    #[test]
    fn test_text() {
        assert_eq!(text("hello<b>", false), Scan::Match("hello".to_string(), 5));
        assert_eq!(text("hello", false), Scan::NeedMore);
        assert_eq!(text("hello", true), Scan::Match("hello".to_string(), 5));
        assert_eq!(text("<b>", false), Scan::Match(String::new(), 0));
    }
}
