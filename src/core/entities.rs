//! XML Entity Encoding and Decoding
//!
//! `normalize` escapes text for output, `unnormalize` resolves character
//! and entity references. Both take an optional map of caller-supplied
//! entities (name -> replacement text) and an optional list of entity names
//! to leave alone.
//!
//! Uses Cow so text without anything to rewrite is returned borrowed.

use super::scanner::{is_name_char, is_name_start_char};
use indexmap::IndexMap;
use memchr::memchr;
use std::borrow::Cow;

/// Caller-supplied entities, applied in insertion order
pub type EntityMap = IndexMap<String, String>;

/// One of the predefined entities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultEntity {
    pub name: &'static str,
    /// Reference form, e.g. `&gt;`
    pub escaped: &'static str,
    pub literal: char,
}

/// Built-in entities. `amp` is handled separately: it is escaped first and
/// collapsed last.
pub const DEFAULT_ENTITIES: [DefaultEntity; 4] = [
    DefaultEntity { name: "gt", escaped: "&gt;", literal: '>' },
    DefaultEntity { name: "lt", escaped: "&lt;", literal: '<' },
    DefaultEntity { name: "quot", escaped: "&quot;", literal: '"' },
    DefaultEntity { name: "apos", escaped: "&apos;", literal: '\'' },
];

pub fn default_entity(name: &str) -> Option<&'static DefaultEntity> {
    DEFAULT_ENTITIES.iter().find(|e| e.name == name)
}

/// A reference found at the start of some text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reference<'a> {
    /// `&name;`
    Named(&'a str),
    /// `&#N;` or `&#xH;`; None when the code point is not a valid char
    Char(Option<char>),
}

/// Parse a reference at the start of `input` (which begins with `&`)
fn parse_reference(input: &str) -> Option<(Reference<'_>, usize)> {
    let body = input.strip_prefix('&')?;

    if let Some(digits) = body.strip_prefix('#') {
        let (radix, digits, prefix_len) = match digits.strip_prefix('x') {
            Some(hex) => (16, hex, 3),
            None => (10, digits, 2),
        };
        let len = digits
            .bytes()
            .take_while(|b| if radix == 16 { b.is_ascii_hexdigit() } else { b.is_ascii_digit() })
            .count();
        if len == 0 || digits.as_bytes().get(len) != Some(&b';') {
            return None;
        }
        let ch = u32::from_str_radix(&digits[..len], radix)
            .ok()
            .and_then(char::from_u32);
        return Some((Reference::Char(ch), prefix_len + len + 1));
    }

    let mut chars = body.char_indices();
    match chars.next() {
        Some((_, c)) if is_name_start_char(c) => {}
        _ => return None,
    }
    let end = chars.find(|&(_, c)| !is_name_char(c))?.0;
    if body.as_bytes()[end] != b';' {
        return None;
    }
    Some((Reference::Named(&body[..end]), end + 2))
}

/// Length of the well-formed reference starting `input`, if any
pub(crate) fn reference_len(input: &str) -> Option<usize> {
    parse_reference(input).map(|(_, len)| len)
}

fn has_reference(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut pos = 0;
    while let Some(i) = memchr(b'&', &bytes[pos..]) {
        pos += i;
        if parse_reference(&text[pos..]).is_some() {
            return true;
        }
        pos += 1;
    }
    false
}

#[inline]
fn is_excluded(exclude: Option<&[&str]>, name: &str) -> bool {
    exclude.map_or(false, |names| names.contains(&name))
}

/// Replace every `&` that does not start a well-formed reference with `&amp;`
fn escape_stray_amps(input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let Some(first) = memchr(b'&', bytes) else {
        return Cow::Borrowed(input);
    };

    let mut result = String::with_capacity(input.len() + 8);
    let mut copied = 0;
    let mut pos = first;
    loop {
        if parse_reference(&input[pos..]).is_none() {
            result.push_str(&input[copied..pos]);
            result.push_str("&amp;");
            copied = pos + 1;
        }
        match memchr(b'&', &bytes[pos + 1..]) {
            Some(i) => pos += i + 1,
            None => break,
        }
    }
    if copied == 0 {
        return Cow::Borrowed(input);
    }
    result.push_str(&input[copied..]);
    Cow::Owned(result)
}

fn rewrite<'a>(text: Cow<'a, str>, f: fn(&str) -> Cow<'_, str>) -> Cow<'a, str> {
    match text {
        Cow::Borrowed(s) => f(s),
        Cow::Owned(s) => {
            let changed = match f(&s) {
                Cow::Owned(t) => Some(t),
                Cow::Borrowed(_) => None,
            };
            Cow::Owned(changed.unwrap_or(s))
        }
    }
}

/// Escape text for output
///
/// Stray `&` becomes `&amp;`, the replacement text of each custom entity not
/// in `exclude` becomes `&name;`, and `<`, `>`, `"`, `'` become their
/// predefined references.
pub fn normalize<'a>(
    input: &'a str,
    entities: Option<&EntityMap>,
    exclude: Option<&[&str]>,
) -> Cow<'a, str> {
    let mut copy = escape_stray_amps(input);

    if let Some(entities) = entities {
        for (name, value) in entities {
            if value.is_empty() || is_excluded(exclude, name) || !copy.contains(value.as_str()) {
                continue;
            }
            copy = Cow::Owned(copy.replace(value.as_str(), &format!("&{};", name)));
        }
        copy = rewrite(copy, escape_stray_amps);
    }

    for entity in &DEFAULT_ENTITIES {
        if copy.contains(entity.literal) {
            copy = Cow::Owned(copy.replace(entity.literal, entity.escaped));
        }
    }
    copy
}

/// Convert CR and CRLF line endings to LF
fn normalize_newlines(input: &str) -> Cow<'_, str> {
    if memchr(b'\r', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Resolve character and entity references
///
/// Numeric references decode to their code point. Named references not in
/// `exclude` resolve through `entities`, then the predefined entities;
/// unknown ones are left as written. Any remaining `&amp;` collapses to `&`.
///
/// References nested more than [`MAX_ENTITY_DEPTH`] deep, and any reached
/// after [`MAX_EXPANSION`] bytes of replacement text, are left as written.
pub fn unnormalize<'a>(
    input: &'a str,
    entities: Option<&EntityMap>,
    exclude: Option<&[&str]>,
) -> Cow<'a, str> {
    let text = normalize_newlines(input);
    if !has_reference(&text) {
        return text;
    }
    Cow::Owned(decode_references(&text, entities, exclude, &mut Expansion::new()))
}

/// Look up an entity and return its fully resolved replacement text
pub fn entity(name: &str, entities: Option<&EntityMap>) -> Option<String> {
    expand(name, entities, &mut Expansion::new())
}

/// Entities nested deeper than this are left as written
pub const MAX_ENTITY_DEPTH: usize = 64;

/// Replacement text one call may add, in bytes
pub const MAX_EXPANSION: usize = 1 << 20;

/// State shared by every level of one resolution
struct Expansion {
    /// Entities currently being expanded, outermost first
    chain: Vec<String>,
    budget: usize,
    /// Set once the budget ran out; nothing further is expanded
    exhausted: bool,
}

impl Expansion {
    fn new() -> Self {
        Expansion {
            chain: Vec::new(),
            budget: MAX_EXPANSION,
            exhausted: false,
        }
    }

    /// Take `len` bytes of replacement text from the budget. Every
    /// expansion costs at least one, so empty entities cannot fan out
    /// without bound.
    fn charge(&mut self, len: usize) -> bool {
        let cost = len.max(1);
        if self.exhausted || cost > self.budget {
            self.exhausted = true;
            return false;
        }
        self.budget -= cost;
        true
    }
}

/// A reference back into the chain, past the depth limit, or after the
/// budget ran out is left unresolved.
fn expand(name: &str, entities: Option<&EntityMap>, state: &mut Expansion) -> Option<String> {
    if state.exhausted
        || state.chain.len() >= MAX_ENTITY_DEPTH
        || state.chain.iter().any(|n| n == name)
    {
        return None;
    }
    let value: Cow<'_, str> = match entities.and_then(|e| e.get(name)) {
        Some(value) => Cow::Borrowed(value.as_str()),
        None => Cow::Owned(default_entity(name)?.literal.to_string()),
    };

    let value = normalize_newlines(&value).into_owned();
    if !has_reference(&value) {
        return Some(value);
    }
    state.chain.push(name.to_string());
    let resolved = decode_references(&value, entities, None, state);
    state.chain.pop();
    Some(resolved)
}

fn decode_references(
    text: &str,
    entities: Option<&EntityMap>,
    exclude: Option<&[&str]>,
    state: &mut Expansion,
) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = memchr(b'&', rest.as_bytes()) {
        result.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let Some((reference, len)) = parse_reference(rest) else {
            result.push('&');
            rest = &rest[1..];
            continue;
        };
        let raw = &rest[..len];
        match reference {
            Reference::Char(Some(c)) => result.push(c),
            Reference::Char(None) => result.push_str(raw),
            Reference::Named(name) => {
                let resolved = if is_excluded(exclude, name) {
                    None
                } else {
                    expand(name, entities, state).filter(|value| state.charge(value.len()))
                };
                match resolved {
                    Some(value) => result.push_str(&value),
                    None if name == "amp" => result.push('&'),
                    None => result.push_str(raw),
                }
            }
        }
        rest = &rest[len..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(pairs: &[(&str, &str)]) -> EntityMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_numeric_decimal_and_hex() {
        assert_eq!(unnormalize("&#65;", None, None), "A");
        assert_eq!(unnormalize("&#x41;", None, None), "A");
        assert_eq!(unnormalize("&#0065;&#x1F600;", None, None), "A😀");
    }

    #[test]
    fn test_invalid_code_point_left_as_written() {
        assert_eq!(unnormalize("&#xD800;", None, None), "&#xD800;");
    }

    #[test]
    fn test_no_references_fast_path() {
        let result = unnormalize("Hello, World!", None, None);
        assert!(matches!(result, Cow::Borrowed(_)));

        let result = unnormalize("a\r\nb\rc & d", None, None);
        assert_eq!(result, "a\nb\nc & d");
    }

    #[test]
    fn test_basic_entities() {
        let result = unnormalize("&lt;hello&gt; &amp; &quot;world&apos;", None, None);
        assert_eq!(result, "<hello> & \"world'");
    }

    #[test]
    fn test_amp_collapses_once() {
        assert_eq!(unnormalize("&amp;lt;", None, None), "&lt;");
    }

    #[test]
    fn test_unknown_entity_kept() {
        assert_eq!(unnormalize("&unknown; &lt;", None, None), "&unknown; <");
    }

    #[test]
    fn test_custom_entities_resolve_recursively() {
        let entities = custom(&[("co", "ACME"), ("sig", "&co; &lt;team&gt;")]);
        assert_eq!(unnormalize("by &sig;", Some(&entities), None), "by ACME <team>");
    }

    #[test]
    fn test_custom_entity_overrides_builtin() {
        let entities = custom(&[("lt", "LESS")]);
        assert_eq!(unnormalize("&lt;", Some(&entities), None), "LESS");
    }

    #[test]
    fn test_self_reference_left_unresolved() {
        let entities = custom(&[("a", "x&b;"), ("b", "y&a;")]);
        assert_eq!(unnormalize("&a;", Some(&entities), None), "xy&a;");
    }

    #[test]
    fn test_deep_chain_stops_at_depth_limit() {
        let mut entities = EntityMap::new();
        for i in 0..20_000 {
            entities.insert(format!("e{}", i), format!("&e{};", i + 1));
        }
        entities.insert("e20000".to_string(), "end".to_string());

        let result = unnormalize("&e0;", Some(&entities), None);
        assert_eq!(result, format!("&e{};", MAX_ENTITY_DEPTH));
    }

    #[test]
    fn test_shallow_chain_resolves() {
        let entities = custom(&[("a", "&b;"), ("b", "&c;"), ("c", "done")]);
        assert_eq!(unnormalize("&a;", Some(&entities), None), "done");
    }

    #[test]
    fn test_fan_out_is_bounded() {
        let mut entities = custom(&[("l0", "lol")]);
        for i in 1..10 {
            entities.insert(format!("l{}", i), format!("&l{};", i - 1).repeat(10));
        }

        let small = unnormalize("&l3;", Some(&entities), None);
        assert_eq!(small.len(), 3 * 1000);

        let result = unnormalize("&l9;", Some(&entities), None);
        assert!(result.len() <= MAX_EXPANSION, "expanded to {} bytes", result.len());
    }

    #[test]
    fn test_empty_entity_fan_out_is_bounded() {
        let mut entities = custom(&[("z0", "")]);
        for i in 1..12 {
            entities.insert(format!("z{}", i), format!("&z{};", i - 1).repeat(10));
        }
        let result = unnormalize("x&z11;y", Some(&entities), None);
        assert!(result.starts_with('x') && result.ends_with('y'));
        assert!(result.len() <= MAX_EXPANSION);
    }

    #[test]
    fn test_exclusion_skips_named_reference() {
        let entities = custom(&[("co", "ACME")]);
        let result = unnormalize("&co; &lt;", Some(&entities), Some(&["co", "lt"]));
        assert_eq!(result, "&co; &lt;");
    }

    #[test]
    fn test_normalize_default_characters() {
        assert_eq!(normalize("a & b < c > \"d\" 'e'", None, None),
            "a &amp; b &lt; c &gt; &quot;d&quot; &apos;e&apos;");
    }

    #[test]
    fn test_normalize_keeps_existing_references() {
        let result = normalize("&lt; &#65; &#x41; &name;", None, None);
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_custom_entities() {
        let entities = custom(&[("co", "ACME")]);
        assert_eq!(normalize("ACME & sons", Some(&entities), None), "&co; &amp; sons");
        assert_eq!(normalize("ACME", Some(&entities), Some(&["co"])), "ACME");
    }

    #[test]
    fn test_round_trip_default_characters() {
        for input in ["<a href=\"x\">", "1 < 2 && 3 > 2", "'quoted' \"text\"", "& &; &#;"] {
            let escaped = normalize(input, None, None);
            assert_eq!(unnormalize(&escaped, None, None), input);
        }
    }

    #[test]
    fn test_entity_lookup() {
        assert_eq!(entity("lt", None), Some("<".to_string()));
        assert_eq!(entity("nope", None), None);

        let entities = custom(&[("greeting", "hi &amp; bye")]);
        assert_eq!(entity("greeting", Some(&entities)), Some("hi & bye".to_string()));
    }
}
