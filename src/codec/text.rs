// Delimited text <-> Value, driven by the schema node.

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::codec::num::{self, F32_PRECISION, F64_PRECISION};
use crate::codec::{Cursor, binary, utf16};
use crate::error::DecodeError;
use crate::records::{self, EntryReader, RecordReader};
use crate::schema::{Prim, SchemaKind, SchemaNode, Sep, StructShape};
use crate::value::{Scalar, Value};

// ------- Decoding -------

/// Decode one whole chunk. Everything must be consumed; trailing ASCII
/// whitespace is tolerated after a numeric field.
pub fn decode(node: &SchemaNode, chunk: &[u8]) -> Result<Value, DecodeError> {
    match &node.kind {
        SchemaKind::Primitive(p) => {
            let mut cur = Cursor::new(chunk);
            let s = decode_scalar(*p, &mut cur)?;
            expect_end(&cur, p.skips_whitespace())?;
            Ok(Value::Scalar(s))
        }
        SchemaKind::Struct(shape) => {
            let mut cur = Cursor::new(chunk);
            let fields = decode_struct(shape, &mut cur)?;
            expect_end(&cur, trailing_numeric(shape))?;
            Ok(Value::Struct(fields))
        }
        SchemaKind::StructSequence { raw_bytes: true, .. } => Ok(Value::Bytes(chunk.to_vec())),
        SchemaKind::StructSequence { shape, .. } => {
            let mut cur = Cursor::new(chunk);
            let mut items = Vec::new();
            while !exhausted(&cur, shape) {
                items.push(decode_struct(shape, &mut cur)?);
            }
            Ok(Value::Structs(items))
        }
        SchemaKind::Sequence { element, sep, .. } => {
            let mut pieces = RecordReader::new(chunk, sep.as_bytes());
            let mut items = Vec::new();
            while let Ok(Some(piece)) = pieces.next_record() {
                match decode(element, &piece) {
                    Ok(v) => items.push(v),
                    Err(e) => debug!(node = node.ordinal, error = %e, "skipping element"),
                }
            }
            Ok(Value::Seq(items))
        }
        SchemaKind::Keyed { key, key_sep, value, .. } => {
            let value_sep = value.as_ref().map(|v| v.sep.as_bytes());
            let mut reader = EntryReader::new(chunk, key_sep.as_bytes(), value_sep);
            // Binary key -> entry; a repeated key keeps its first position.
            let mut entries: IndexMap<Vec<u8>, (Value, Option<Value>)> = IndexMap::new();
            while let Ok(Some(raw)) = reader.next_entry() {
                let Ok(raw) = raw else {
                    debug!(node = node.ordinal, "skipping entry without key separator");
                    continue;
                };
                let decoded = decode(key, &raw.key).and_then(|k| {
                    let v = match (value, &raw.value) {
                        (Some(kv), Some(text)) => Some(decode(&kv.node, text)?),
                        _ => None,
                    };
                    Ok((k, v))
                });
                match decoded {
                    Ok((k, v)) => {
                        entries.insert(binary::key_bytes(key, &k)?, (k, v));
                    }
                    Err(e) => debug!(node = node.ordinal, error = %e, "skipping entry"),
                }
            }
            Ok(Value::Keyed(entries.into_values().collect()))
        }
        SchemaKind::Pair { first, second, sep } => {
            let (a, b) = split_pair(chunk, sep)?;
            Ok(Value::pair(decode(first, a)?, decode(second, b)?))
        }
    }
}

/// Decode the next primitive or struct from a stream of concatenated
/// values, leaving the cursor after it.
pub fn decode_next(node: &SchemaNode, cur: &mut Cursor<'_>) -> Result<Value, DecodeError> {
    match &node.kind {
        SchemaKind::Primitive(p) => decode_scalar(*p, cur).map(Value::Scalar),
        SchemaKind::Struct(shape) => decode_struct(shape, cur).map(Value::Struct),
        _ => Err(DecodeError::ShapeMismatch(node.ordinal)),
    }
}

/// Split a pair chunk at the first occurrence of its separator.
pub fn split_pair<'a>(chunk: &'a [u8], sep: &Sep) -> Result<(&'a [u8], &'a [u8]), DecodeError> {
    let sep = sep.as_bytes();
    let at = records::find(chunk, sep).ok_or_else(|| DecodeError::MissingSeparator {
        expected: escaped(sep),
    })?;
    Ok((&chunk[..at], &chunk[at + sep.len()..]))
}

pub fn decode_scalar(prim: Prim, cur: &mut Cursor<'_>) -> Result<Scalar, DecodeError> {
    let int = |cur: &mut Cursor<'_>, signed: bool, min: i128, max: i128| {
        num::read_integer(cur, prim.code(), signed, min, max)
    };
    Ok(match prim {
        Prim::Char => Scalar::Char(cur.next_byte().ok_or(DecodeError::UnexpectedEnd)? as i8),
        Prim::UChar => Scalar::UChar(cur.next_byte().ok_or(DecodeError::UnexpectedEnd)?),
        // Read as 32-bit, keep the low byte.
        Prim::I8 => Scalar::I8(int(cur, true, i32::MIN.into(), i32::MAX.into())? as i8),
        Prim::U8 => Scalar::U8(int(cur, false, 0, u32::MAX.into())? as u8),
        Prim::I16 => Scalar::I16(int(cur, true, i16::MIN.into(), i16::MAX.into())? as i16),
        Prim::U16 => Scalar::U16(int(cur, false, 0, u16::MAX.into())? as u16),
        Prim::I32 => Scalar::I32(int(cur, true, i32::MIN.into(), i32::MAX.into())? as i32),
        Prim::U32 => Scalar::U32(int(cur, false, 0, u32::MAX.into())? as u32),
        Prim::I64 => Scalar::I64(int(cur, true, i64::MIN.into(), i64::MAX.into())? as i64),
        Prim::U64 => Scalar::U64(int(cur, false, 0, u64::MAX.into())? as u64),
        Prim::F32 => Scalar::F32(OrderedFloat(num::read_f32(cur)?)),
        Prim::F64 => Scalar::F64(OrderedFloat(num::read_f64(cur)?)),
        Prim::Utf16 => Scalar::Utf16(utf16::decode_unit(cur)?),
    })
}

fn decode_struct(shape: &StructShape, cur: &mut Cursor<'_>) -> Result<Vec<Scalar>, DecodeError> {
    let lenient = shape.skips_whitespace();
    meet_separator(&shape.leading, cur, lenient)?;
    let mut fields = Vec::with_capacity(shape.fields.len());
    for field in &shape.fields {
        fields.push(decode_scalar(field.prim, cur)?);
        meet_separator(&field.sep, cur, lenient)?;
    }
    Ok(fields)
}

// A separator is met when it matches, when input is exhausted, or when
// only whitespace remains in a whitespace-skipping struct.
fn meet_separator(sep: &Sep, cur: &mut Cursor<'_>, lenient: bool) -> Result<(), DecodeError> {
    if sep.is_empty() {
        return Ok(());
    }
    if cur.rest().starts_with(sep.as_bytes()) {
        cur.advance(sep.as_bytes().len());
        return Ok(());
    }
    if cur.is_empty() || (lenient && cur.only_whitespace_left()) {
        return Ok(());
    }
    Err(DecodeError::UnmetSeparator {
        expected: escaped(sep.as_bytes()),
    })
}

fn exhausted(cur: &Cursor<'_>, shape: &StructShape) -> bool {
    cur.is_empty() || (shape.skips_whitespace() && cur.only_whitespace_left())
}

fn trailing_numeric(shape: &StructShape) -> bool {
    shape.fields.last().is_some_and(|f| f.prim.skips_whitespace())
}

fn expect_end(cur: &Cursor<'_>, whitespace_ok: bool) -> Result<(), DecodeError> {
    if cur.is_empty() || (whitespace_ok && cur.only_whitespace_left()) {
        Ok(())
    } else {
        Err(DecodeError::TrailingInput(cur.rest().len()))
    }
}

fn escaped(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

// ------- Encoding -------

/// Canonical text of `value`.
pub fn encode(node: &SchemaNode, value: &Value, out: &mut Vec<u8>) -> Result<(), DecodeError> {
    let mismatch = || DecodeError::ShapeMismatch(node.ordinal);
    match (&node.kind, value) {
        (SchemaKind::Primitive(p), Value::Scalar(s)) if s.prim() == *p => encode_scalar(s, out),
        (SchemaKind::Struct(shape), Value::Struct(fields)) => {
            encode_struct(shape, fields, out).ok_or_else(mismatch)?
        }
        (SchemaKind::StructSequence { raw_bytes: true, .. }, Value::Bytes(bytes)) => {
            out.extend_from_slice(bytes)
        }
        (SchemaKind::StructSequence { shape, raw_bytes: false }, Value::Structs(items)) => {
            for fields in items {
                encode_struct(shape, fields, out).ok_or_else(mismatch)?;
            }
        }
        (SchemaKind::Sequence { element, sep, .. }, Value::Seq(items)) => {
            for item in items {
                encode(element, item, out)?;
                out.extend_from_slice(sep.as_bytes());
            }
        }
        (SchemaKind::Keyed { key, key_sep, value: kv, .. }, Value::Keyed(entries)) => {
            for (k, v) in entries {
                encode(key, k, out)?;
                out.extend_from_slice(key_sep.as_bytes());
                match (kv, v) {
                    (Some(kv), Some(v)) => {
                        encode(&kv.node, v, out)?;
                        out.extend_from_slice(kv.sep.as_bytes());
                    }
                    (None, None) => {}
                    _ => return Err(mismatch()),
                }
            }
        }
        (SchemaKind::Pair { first, second, sep }, Value::Pair(a, b)) => {
            encode(first, a, out)?;
            out.extend_from_slice(sep.as_bytes());
            encode(second, b, out)?;
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

pub fn encode_scalar(s: &Scalar, out: &mut Vec<u8>) {
    let text = match *s {
        Scalar::Char(v) => return out.push(v as u8),
        Scalar::UChar(v) => return out.push(v),
        Scalar::Utf16(v) => return utf16::encode_unit(v, out),
        Scalar::I8(v) => v.to_string(),
        Scalar::U8(v) => v.to_string(),
        Scalar::I16(v) => v.to_string(),
        Scalar::U16(v) => v.to_string(),
        Scalar::I32(v) => v.to_string(),
        Scalar::U32(v) => v.to_string(),
        Scalar::I64(v) => v.to_string(),
        Scalar::U64(v) => v.to_string(),
        Scalar::F32(v) => num::format_g(f64::from(v.0), F32_PRECISION),
        Scalar::F64(v) => num::format_g(v.0, F64_PRECISION),
    };
    out.extend_from_slice(text.as_bytes());
}

fn encode_struct(shape: &StructShape, fields: &[Scalar], out: &mut Vec<u8>) -> Option<()> {
    if fields.len() != shape.fields.len() {
        return None;
    }
    out.extend_from_slice(shape.leading.as_bytes());
    for (s, field) in fields.iter().zip(&shape.fields) {
        if s.prim() != field.prim {
            return None;
        }
        encode_scalar(s, out);
        out.extend_from_slice(field.sep.as_bytes());
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse;

    fn text(format: &str, input: &str) -> Result<Value, DecodeError> {
        decode(&parse(format).unwrap(), input.as_bytes())
    }

    fn canonical(format: &str, value: &Value) -> String {
        let mut out = Vec::new();
        encode(&parse(format).unwrap(), value, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn bytes(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn primitives() {
        assert_eq!(text("l", " 42 \n").unwrap(), Value::Scalar(Scalar::I32(42)));
        assert_eq!(text("c", "a").unwrap(), Value::Scalar(Scalar::Char(b'a' as i8)));
        assert_eq!(text("c", "ab"), Err(DecodeError::TrailingInput(1)));
        assert_eq!(text("c", ""), Err(DecodeError::UnexpectedEnd));
        assert!(text("l", "12x").is_err());
        assert!(text("S", "-1").is_err());
        assert!(text("s", "40000").is_err());
    }

    #[test]
    fn byte_codes_widen_and_truncate() {
        assert_eq!(text("b", "-5").unwrap(), Value::Scalar(Scalar::I8(-5)));
        assert_eq!(text("b", "300").unwrap(), Value::Scalar(Scalar::I8(44)));
        assert_eq!(text("B", "257").unwrap(), Value::Scalar(Scalar::U8(1)));
        assert_eq!(canonical("b", &Value::Scalar(Scalar::I8(-5))), "-5");
        assert_eq!(canonical("B", &Value::Scalar(Scalar::U8(200))), "200");
    }

    #[test]
    fn float_text() {
        assert_eq!(canonical("f", &Value::Scalar(Scalar::F32(OrderedFloat(0.1)))), "0.100000001");
        assert_eq!(canonical("d", &Value::Scalar(Scalar::F64(OrderedFloat(0.5)))), "0.5");
        let v = text("d", "0.1").unwrap();
        assert_eq!(canonical("d", &v), "0.10000000000000001");
        assert_eq!(text("d", &canonical("d", &v)).unwrap(), v);
    }

    #[test]
    fn structs() {
        let v = text("l\tf", "1\t2.5").unwrap();
        assert_eq!(
            v,
            Value::Struct(vec![Scalar::I32(1), Scalar::F32(OrderedFloat(2.5))])
        );
        assert_eq!(canonical("l\tf", &v), "1\t2.5");
        assert_eq!(text("l\tf", "1"), Err(DecodeError::UnexpectedEnd));
        assert!(matches!(text("l\tf", "1,2"), Err(DecodeError::UnmetSeparator { .. })));

        let v = text("[l]", "[7]").unwrap();
        assert_eq!(canonical("[l]", &v), "[7]");
    }

    #[test]
    fn struct_sequences() {
        let items = |xs: &[i32]| Value::Structs(xs.iter().map(|x| vec![Scalar::I32(*x)]).collect());
        assert_eq!(text("l,*", "1,2,3").unwrap(), items(&[1, 2, 3]));
        assert_eq!(text("l,*", "1,2, ").unwrap(), items(&[1, 2]));
        assert_eq!(text("l,*", "").unwrap(), items(&[]));
        assert!(text("l,*", "1,x").is_err());
        assert_eq!(canonical("l,*", &items(&[1, 2])), "1,2,");
        assert_eq!(text("c*", "a\tb").unwrap(), bytes("a\tb"));
    }

    #[test]
    fn sequences_skip_bad_elements() {
        let v = text("V(l)\n", "1\nX\n3\n").unwrap();
        let ints = |xs: &[i32]| Value::Seq(xs.iter().map(|x| Value::Scalar(Scalar::I32(*x))).collect());
        assert_eq!(v, ints(&[1, 3]));
        assert_eq!(canonical("V(l)\n", &v), "1\n3\n");
        // Empty inner chunks count.
        assert_eq!(text("V(c*),", "a,,b").unwrap(), Value::Seq(vec![bytes("a"), bytes(""), bytes("b")]));
    }

    #[test]
    fn keyed_entries() {
        let v = text("T(l)\t(c*)\n", "1\ta\n2\tb\n1\tc\nnokey\n").unwrap();
        let i = |x| Value::Scalar(Scalar::I32(x));
        assert_eq!(
            v,
            Value::Keyed(vec![(i(1), Some(bytes("c"))), (i(2), Some(bytes("b")))])
        );
        assert_eq!(canonical("T(l)\t(c*)\n", &v), "1\tc\n2\tb\n");

        let v = text("T(l)\n(c*)\n", "1\nabc\n2\ndef\n").unwrap();
        assert_eq!(
            v,
            Value::Keyed(vec![(i(1), Some(bytes("abc"))), (i(2), Some(bytes("def")))])
        );

        let v = text("T(c*)\n", "b\na\nb\n").unwrap();
        assert_eq!(v, Value::Keyed(vec![(bytes("b"), None), (bytes("a"), None)]));
        assert_eq!(canonical("T(c*)\n", &v), "b\na\n");
    }

    #[test]
    fn pairs() {
        let v = text("P(l)\t(c*)", "5\tx\ty").unwrap();
        assert_eq!(v, Value::pair(Value::Scalar(Scalar::I32(5)), bytes("x\ty")));
        assert_eq!(canonical("P(l)\t(c*)", &v), "5\tx\ty");
        assert!(matches!(text("P(l)\t(c*)", "5"), Err(DecodeError::MissingSeparator { .. })));
        assert!(text("P(l)\t(c*)", "x\ty").is_err());
    }

    #[test]
    fn utf16_field() {
        let v = text("u", "é").unwrap();
        assert_eq!(v, Value::Scalar(Scalar::Utf16(0xE9)));
        assert_eq!(canonical("u", &v), "é");

        let units = decode(&parse("u*").unwrap(), b"\xF0abcd").unwrap();
        let unit = |u| vec![Scalar::Utf16(u)];
        assert_eq!(units, Value::Structs(vec![unit(0xFFFD), unit(0x62), unit(0x63), unit(0x64)]));
    }

    #[test]
    fn shape_mismatch() {
        let node = parse("l").unwrap();
        let mut out = Vec::new();
        assert_eq!(
            encode(&node, &Value::Scalar(Scalar::U8(1)), &mut out),
            Err(DecodeError::ShapeMismatch(0))
        );
    }

    #[test]
    fn streaming_values() {
        let node = parse("l").unwrap();
        let mut cur = Cursor::new(b"1 2\n3 x");
        let mut got = Vec::new();
        while let Ok(v) = decode_next(&node, &mut cur) {
            got.push(v);
        }
        assert_eq!(got.len(), 3);
    }
}
