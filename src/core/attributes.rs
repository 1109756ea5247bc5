//! XML Attribute Parsing
//!
//! Extracts `name="value"` pairs from the inside of a start tag (the text
//! between the element name and `>` or `/>`). Values are returned as
//! written; entity references are left for the caller to unnormalize.

use super::scanner::Scanner;
use indexmap::IndexMap;

/// Attributes of a start tag, in document order
pub type Attributes = IndexMap<String, String>;

/// Parse the attribute list of a tag head
///
/// Every attribute must be preceded by whitespace and use the same quote
/// character on both sides of its value. Anything left over that is not
/// whitespace is returned as `Err(residue)`. A repeated name keeps its first
/// position and takes the last value.
pub fn parse_attributes(input: &str) -> Result<Attributes, String> {
    let mut attrs = Attributes::new();
    let mut scanner = Scanner::new(input);

    loop {
        let before = scanner.position();
        let skipped = scanner.skip_whitespace();
        if scanner.is_eof() {
            break;
        }
        if skipped == 0 {
            return Err(input[before..].to_string());
        }

        let clause_start = scanner.position();
        match parse_attribute(&mut scanner) {
            Some((name, value)) => {
                attrs.insert(name.to_string(), value.to_string());
            }
            None => return Err(input[clause_start..].trim_end().to_string()),
        }
    }

    Ok(attrs)
}

/// Parse one `name = "value"` clause at the cursor
fn parse_attribute<'a>(scanner: &mut Scanner<'a>) -> Option<(&'a str, &'a str)> {
    let name = scanner.read_name()?;
    scanner.skip_whitespace();
    if scanner.peek() != Some(b'=') {
        return None;
    }
    scanner.advance(1);
    scanner.skip_whitespace();

    let quote = match scanner.peek() {
        Some(q @ (b'"' | b'\'')) => q,
        _ => return None,
    };
    scanner.advance(1);
    let value_start = scanner.position();
    let value_end = scanner.find_byte(quote)?;
    scanner.set_position(value_end + 1);
    Some((name, scanner.slice(value_start, value_end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_attributes() {
        let attrs = parse_attributes(" id=\"test\" class=\"foo\"").unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get_index(0), Some((&"id".to_string(), &"test".to_string())));
        assert_eq!(attrs["class"], "foo");
    }

    #[test]
    fn test_single_quoted() {
        let attrs = parse_attributes(" id='test'").unwrap();
        assert_eq!(attrs["id"], "test");
    }

    #[test]
    fn test_other_quote_inside_value() {
        let attrs = parse_attributes(" title='say \"hi\"' alt=\"it's\"").unwrap();
        assert_eq!(attrs["title"], "say \"hi\"");
        assert_eq!(attrs["alt"], "it's");
    }

    #[test]
    fn test_namespaced_attribute() {
        let attrs = parse_attributes(" xmlns:xlink=\"http://www.w3.org/1999/xlink\"").unwrap();
        assert_eq!(attrs["xmlns:xlink"], "http://www.w3.org/1999/xlink");
    }

    #[test]
    fn test_entity_left_raw() {
        let attrs = parse_attributes(" title=\"&lt;hello&gt;\"").unwrap();
        assert_eq!(attrs["title"], "&lt;hello&gt;");
    }

    #[test]
    fn test_empty_attributes() {
        assert!(parse_attributes("").unwrap().is_empty());
        assert!(parse_attributes("   \n").unwrap().is_empty());
    }

    #[test]
    fn test_whitespace_handling() {
        let attrs = parse_attributes("  id  =  \"test\"  ").unwrap();
        assert_eq!(attrs["id"], "test");
    }

    #[test]
    fn test_duplicate_keeps_first_position() {
        let attrs = parse_attributes(" a='1' b='2' a='3'").unwrap();
        let keys: Vec<_> = attrs.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(attrs["a"], "3");
    }

    #[test]
    fn test_missing_value_is_residue() {
        assert_eq!(parse_attributes(" checked").unwrap_err(), "checked");
    }

    #[test]
    fn test_missing_separator_is_residue() {
        assert_eq!(parse_attributes(" a='1'b='2'").unwrap_err(), "b='2'");
    }

    #[test]
    fn test_unquoted_is_residue() {
        assert_eq!(parse_attributes(" a=1").unwrap_err(), "a=1");
    }
}
