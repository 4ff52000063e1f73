// Fixed-width little-endian form of flat values. Keys of T/H containers are
// exactly these bytes.

use ordered_float::OrderedFloat;

use crate::error::DecodeError;
use crate::schema::{Prim, SchemaKind, SchemaNode, StructShape};
use crate::value::{Scalar, Value};

pub fn write_scalar(s: &Scalar, out: &mut Vec<u8>) {
    match *s {
        Scalar::Char(v) | Scalar::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::UChar(v) | Scalar::U8(v) => out.push(v),
        Scalar::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::U16(v) | Scalar::Utf16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::F32(v) => out.extend_from_slice(&v.0.to_le_bytes()),
        Scalar::F64(v) => out.extend_from_slice(&v.0.to_le_bytes()),
    }
}

pub fn read_scalar(prim: Prim, bytes: &[u8]) -> Result<Scalar, DecodeError> {
    let raw = bytes.get(..prim.width()).ok_or(DecodeError::UnexpectedEnd)?;
    let arr = |n: usize| -> [u8; 8] {
        let mut a = [0u8; 8];
        a[..n].copy_from_slice(&raw[..n]);
        a
    };
    Ok(match prim {
        Prim::Char => Scalar::Char(raw[0] as i8),
        Prim::UChar => Scalar::UChar(raw[0]),
        Prim::I8 => Scalar::I8(raw[0] as i8),
        Prim::U8 => Scalar::U8(raw[0]),
        Prim::I16 => Scalar::I16(i16::from_le_bytes([raw[0], raw[1]])),
        Prim::U16 => Scalar::U16(u16::from_le_bytes([raw[0], raw[1]])),
        Prim::Utf16 => Scalar::Utf16(u16::from_le_bytes([raw[0], raw[1]])),
        Prim::I32 => Scalar::I32(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
        Prim::U32 => Scalar::U32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
        Prim::F32 => Scalar::F32(OrderedFloat(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))),
        Prim::I64 => Scalar::I64(i64::from_le_bytes(arr(8))),
        Prim::U64 => Scalar::U64(u64::from_le_bytes(arr(8))),
        Prim::F64 => Scalar::F64(OrderedFloat(f64::from_le_bytes(arr(8)))),
    })
}

fn write_struct(shape: &StructShape, fields: &[Scalar], out: &mut Vec<u8>, ordinal: u32) -> Result<(), DecodeError> {
    if fields.len() != shape.fields.len()
        || fields.iter().zip(&shape.fields).any(|(s, f)| s.prim() != f.prim)
    {
        return Err(DecodeError::ShapeMismatch(ordinal));
    }
    fields.iter().for_each(|s| write_scalar(s, out));
    Ok(())
}

pub fn read_struct(shape: &StructShape, bytes: &[u8]) -> Result<Vec<Scalar>, DecodeError> {
    let mut pos = 0;
    let mut out = Vec::with_capacity(shape.fields.len());
    for field in &shape.fields {
        out.push(read_scalar(field.prim, bytes.get(pos..).ok_or(DecodeError::UnexpectedEnd)?)?);
        pos += field.prim.width();
    }
    Ok(out)
}

/// Binary form of a flat value (primitive, struct, struct sequence).
pub fn write_flat(node: &SchemaNode, value: &Value, out: &mut Vec<u8>) -> Result<(), DecodeError> {
    let mismatch = || DecodeError::ShapeMismatch(node.ordinal);
    match (&node.kind, value) {
        (SchemaKind::Primitive(p), Value::Scalar(s)) if s.prim() == *p => write_scalar(s, out),
        (SchemaKind::Struct(shape), Value::Struct(fields)) => {
            write_struct(shape, fields, out, node.ordinal)?
        }
        (SchemaKind::StructSequence { raw_bytes: true, .. }, Value::Bytes(bytes)) => {
            out.extend_from_slice(bytes)
        }
        (SchemaKind::StructSequence { shape, raw_bytes: false }, Value::Structs(items)) => {
            for fields in items {
                write_struct(shape, fields, out, node.ordinal)?;
            }
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Key bytes as stored in a keyed container.
pub fn key_bytes(node: &SchemaNode, value: &Value) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    write_flat(node, value, &mut out)?;
    Ok(out)
}

/// Inverse of `write_flat` for one whole value.
pub fn read_flat(node: &SchemaNode, bytes: &[u8]) -> Result<Value, DecodeError> {
    match &node.kind {
        SchemaKind::Primitive(p) => Ok(Value::Scalar(read_scalar(*p, bytes)?)),
        SchemaKind::Struct(shape) => Ok(Value::Struct(read_struct(shape, bytes)?)),
        SchemaKind::StructSequence { raw_bytes: true, .. } => Ok(Value::Bytes(bytes.to_vec())),
        SchemaKind::StructSequence { shape, .. } => {
            let width = shape.width();
            if width == 0 || bytes.len() % width != 0 {
                return Err(DecodeError::ShapeMismatch(node.ordinal));
            }
            bytes
                .chunks_exact(width)
                .map(|item| read_struct(shape, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Structs)
        }
        _ => Err(DecodeError::ShapeMismatch(node.ordinal)),
    }
}

/// Width of one fixed-size element of a flat node (a whole primitive or
/// struct, or one item of a struct sequence).
pub fn element_width(node: &SchemaNode) -> usize {
    match &node.kind {
        SchemaKind::Primitive(p) => p.width(),
        SchemaKind::Struct(shape) | SchemaKind::StructSequence { shape, .. } => shape.width(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse;

    #[test]
    fn little_endian_scalars() {
        let mut out = Vec::new();
        write_scalar(&Scalar::I32(1), &mut out);
        write_scalar(&Scalar::U16(0x0102), &mut out);
        write_scalar(&Scalar::I8(-1), &mut out);
        assert_eq!(out, vec![1, 0, 0, 0, 2, 1, 0xFF]);
        assert_eq!(read_scalar(Prim::I32, &out).unwrap(), Scalar::I32(1));
        assert_eq!(read_scalar(Prim::U16, &out[4..]).unwrap(), Scalar::U16(0x0102));
        assert_eq!(read_scalar(Prim::I8, &out[6..]).unwrap(), Scalar::I8(-1));
        assert!(read_scalar(Prim::I64, &out).is_err());
    }

    #[test]
    fn struct_key_bytes() {
        let node = parse("l\tS").unwrap();
        let v = Value::Struct(vec![Scalar::I32(-2), Scalar::U16(7)]);
        let bytes = key_bytes(&node, &v).unwrap();
        assert_eq!(bytes, vec![0xFE, 0xFF, 0xFF, 0xFF, 7, 0]);
        assert_eq!(read_flat(&node, &bytes).unwrap(), v);

        let wrong = Value::Struct(vec![Scalar::I32(-2)]);
        assert_eq!(key_bytes(&node, &wrong), Err(DecodeError::ShapeMismatch(0)));
    }

    #[test]
    fn struct_sequence_bytes() {
        let node = parse("s,*").unwrap();
        let v = Value::Structs(vec![vec![Scalar::I16(1)], vec![Scalar::I16(-1)]]);
        let bytes = key_bytes(&node, &v).unwrap();
        assert_eq!(bytes, vec![1, 0, 0xFF, 0xFF]);
        assert_eq!(read_flat(&node, &bytes).unwrap(), v);
        assert!(read_flat(&node, &bytes[..3]).is_err());
    }
}
