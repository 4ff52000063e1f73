//! Format string → `SchemaNode`.
//!
//! Rules are tried in a fixed order, each anchored at both ends of the
//! remaining text: type sequence, `V(...)`, `T(...)` set, `T(...)` map,
//! `H(...)` set, `H(...)` map, and finally the `P(...)sep(...)` fallback,
//! which has no unambiguous regex and is found by trying every separator run
//! left to right.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SchemaError;
use crate::schema::{Field, KeyedValue, Prim, SchemaKind, SchemaNode, Sep, StructShape};

// ------- Character classes -------

const TYPE: &str = r"[cCbBsSlLqQfdu]";
const SEP: &str = r"(?:[^*()\\]|\\x..|\\.)";
const WEAK: &str = r"(?:[^0-9A-Za-z*()\\]|\\x..|\\.)";
const TARG: &str = r"(?:(?:,[^,()]+)+)";

fn type_seq() -> String {
    format!(r"{WEAK}*(?:{TYPE}{WEAK}*)+\*?")
}

static TYPE_SEQ_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)^(?P<pre>{WEAK}*)(?P<seq>(?:{TYPE}{WEAK}*)+)(?P<star>\*?)$"
    ))
    .expect("type sequence pattern")
});

static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?s)(?P<code>{TYPE})(?P<sep>{WEAK}*)")).expect("field pattern")
});

static VECTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)^V(?P<arg>{TARG}?)\((?P<sub>.+)\)(?P<sep>{SEP}+)$"
    ))
    .expect("vector pattern")
});

static KEYED_SET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)^(?P<kind>[TH])(?P<arg>{TARG}?)\((?P<key>{})\)(?P<keysep>{SEP}+)$",
        type_seq()
    ))
    .expect("keyed set pattern")
});

static KEYED_MAP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s)^(?P<kind>[TH])(?P<arg>{TARG}?)\((?P<key>{})\)(?P<keysep>{SEP}+)\((?P<sub>.+)\)(?P<sep>{SEP}+)$",
        type_seq()
    ))
    .expect("keyed map pattern")
});

static SEP_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?s){SEP}+")).expect("separator run pattern"));

// ------- Entry points -------

/// Parse a whole format string, numbering nodes from 0 and rejecting
/// separator collisions.
pub fn parse(format: &str) -> Result<SchemaNode, SchemaError> {
    let root = parse_at(format, 0)?;
    check_collisions(&root, &mut Vec::new())?;
    Ok(root)
}

/// Unescape separator text as written in a format string (or on the command
/// line) into the bytes it stands for.
pub fn unescape(text: &str) -> Result<Sep, SchemaError> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            push_char(&mut out, c);
            continue;
        }
        match chars.next() {
            None => out.push(b'\\'),
            Some('x') => {
                let rest = chars.as_str();
                let mut hex = rest.chars();
                match (hex.next(), hex.next()) {
                    (Some(hi), Some(lo)) => {
                        let byte = hi
                            .to_digit(16)
                            .zip(lo.to_digit(16))
                            .map(|(h, l)| (h * 16 + l) as u8)
                            .ok_or_else(|| SchemaError::BadEscape {
                                escape: format!("\\x{hi}{lo}"),
                                format: text.to_string(),
                            })?;
                        out.push(byte);
                        chars = hex;
                    }
                    _ => out.push(b'x'),
                }
            }
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some('a') => out.push(0x07),
            Some('b') => out.push(0x08),
            Some('f') => out.push(0x0c),
            Some('v') => out.push(0x0b),
            Some(other) => push_char(&mut out, other),
        }
    }
    Ok(Sep(out))
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

// ------- Recursive descent -------

fn parse_at(format: &str, ordinal: u32) -> Result<SchemaNode, SchemaError> {
    if let Some(m) = TYPE_SEQ_RE.captures(format) {
        let shape = parse_shape(&m["pre"], &m["seq"])?;
        let kind = if m["star"].is_empty() {
            collapse(shape)
        } else {
            let raw_bytes = shape.is_raw_byte();
            SchemaKind::StructSequence { shape, raw_bytes }
        };
        return Ok(node(ordinal, format, kind));
    }

    if let Some(m) = VECTOR_RE.captures(format) {
        let element = parse_at(&m["sub"], ordinal + 1)?;
        let kind = SchemaKind::Sequence {
            element: Box::new(element),
            sep: unescape(&m["sep"])?,
            args: template_args(&m["arg"]),
        };
        return Ok(node(ordinal, format, kind));
    }

    // Set before map, both for T and H.
    if let Some(m) = KEYED_SET_RE.captures(format) {
        let key = parse_at(&m["key"], ordinal + 1)?;
        let kind = SchemaKind::Keyed {
            key: Box::new(key),
            key_sep: unescape(&m["keysep"])?,
            value: None,
            ordered: &m["kind"] == "T",
            args: template_args(&m["arg"]),
        };
        return Ok(node(ordinal, format, kind));
    }

    if let Some(m) = KEYED_MAP_RE.captures(format) {
        let key = parse_at(&m["key"], ordinal + 1)?;
        let value = parse_at(&m["sub"], ordinal + 1 + key.size())?;
        let kind = SchemaKind::Keyed {
            key: Box::new(key),
            key_sep: unescape(&m["keysep"])?,
            value: Some(KeyedValue {
                node: Box::new(value),
                sep: unescape(&m["sep"])?,
            }),
            ordered: &m["kind"] == "T",
            args: template_args(&m["arg"]),
        };
        return Ok(node(ordinal, format, kind));
    }

    parse_pair(format, ordinal)
}

fn node(ordinal: u32, format: &str, kind: SchemaKind) -> SchemaNode {
    SchemaNode {
        ordinal,
        source: format.to_string(),
        kind,
    }
}

fn parse_shape(pre: &str, seq: &str) -> Result<StructShape, SchemaError> {
    let mut fields = Vec::new();
    for m in FIELD_RE.captures_iter(seq) {
        let code = m["code"].chars().next().and_then(Prim::from_code);
        let prim = code.ok_or_else(|| SchemaError::NoViableParse(seq.to_string()))?;
        fields.push(Field {
            prim,
            sep: unescape(&m["sep"])?,
        });
    }
    Ok(StructShape {
        leading: unescape(pre)?,
        fields,
    })
}

// A lone field without any separator is just a primitive.
fn collapse(shape: StructShape) -> SchemaKind {
    match shape.fields.as_slice() {
        [only] if shape.leading.is_empty() && only.sep.is_empty() => {
            SchemaKind::Primitive(only.prim)
        }
        _ => SchemaKind::Struct(shape),
    }
}

fn template_args(arg: &str) -> Vec<String> {
    arg.split(',')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

// ------- Pair fallback -------

/// A separator run at `start..end` with both sides parsed.
#[derive(Debug)]
pub struct Split<T> {
    pub start: usize,
    pub end: usize,
    pub first: T,
    pub second: T,
}

/// Walk every maximal separator run of `format` left to right and return the
/// first one for which both `format[2..start-1]` and `format[end+1..len-1]`
/// parse. Runs starting before byte 4 or ending after `len - 3` are skipped.
pub fn first_viable_split<T>(
    format: &str,
    mut parse_first: impl FnMut(&str) -> Option<T>,
    mut parse_second: impl FnMut(&str, &T) -> Option<T>,
) -> Option<Split<T>> {
    let len = format.len();
    for run in SEP_RUN_RE.find_iter(format) {
        let (start, end) = (run.start(), run.end());
        if start < 4 || end + 3 > len {
            continue;
        }
        let Some(left) = format.get(2..start - 1) else { continue };
        let Some(right) = format.get(end + 1..len - 1) else { continue };
        let Some(first) = parse_first(left) else { continue };
        let Some(second) = parse_second(right, &first) else { continue };
        return Some(Split {
            start,
            end,
            first,
            second,
        });
    }
    None
}

fn parse_pair(format: &str, ordinal: u32) -> Result<SchemaNode, SchemaError> {
    let split = first_viable_split(
        format,
        |left| parse_at(left, ordinal + 1).ok(),
        |right, first| parse_at(right, ordinal + 1 + first.size()).ok(),
    )
    .ok_or_else(|| SchemaError::NoViableParse(format.to_string()))?;

    // The accepted candidate must literally read P(first)run(second).
    let bytes = format.as_bytes();
    let framed = bytes.first() == Some(&b'P')
        && bytes.get(1) == Some(&b'(')
        && bytes[split.start - 1] == b')'
        && bytes.get(split.end) == Some(&b'(')
        && bytes.last() == Some(&b')');
    if !framed {
        return Err(SchemaError::NoViableParse(format.to_string()));
    }

    let kind = SchemaKind::Pair {
        first: Box::new(split.first),
        second: Box::new(split.second),
        sep: unescape(&format[split.start..split.end])?,
    };
    Ok(node(ordinal, format, kind))
}

// ------- Separator collisions -------

fn is_container(node: &SchemaNode) -> bool {
    matches!(
        node.kind,
        SchemaKind::Sequence { .. } | SchemaKind::Keyed { .. } | SchemaKind::Pair { .. }
    )
}

fn check_collisions<'a>(
    node: &'a SchemaNode,
    enclosing: &mut Vec<&'a Sep>,
) -> Result<(), SchemaError> {
    let own = node.own_separators();
    for inner in &own {
        if let Some(outer) = enclosing.iter().find(|outer| inner.collides_with(outer)) {
            return Err(SchemaError::SeparatorCollision {
                node: node.source.clone(),
                inner: inner.as_bytes().escape_ascii().to_string(),
                outer: outer.as_bytes().escape_ascii().to_string(),
            });
        }
    }

    if !is_container(node) {
        return Ok(());
    }
    let depth = enclosing.len();
    enclosing.extend(own);
    for child in node.children() {
        check_collisions(child, enclosing)?;
    }
    enclosing.truncate(depth);
    Ok(())
}
