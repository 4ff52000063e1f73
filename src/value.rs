// Decoded records. One `Value` shape per `SchemaKind`.

use ordered_float::OrderedFloat;

use crate::schema::Prim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    Char(i8),
    UChar(u8),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(OrderedFloat<f32>),
    F64(OrderedFloat<f64>),
    Utf16(u16),
}

impl Scalar {
    pub fn prim(&self) -> Prim {
        match self {
            Scalar::Char(_) => Prim::Char,
            Scalar::UChar(_) => Prim::UChar,
            Scalar::I8(_) => Prim::I8,
            Scalar::U8(_) => Prim::U8,
            Scalar::I16(_) => Prim::I16,
            Scalar::U16(_) => Prim::U16,
            Scalar::I32(_) => Prim::I32,
            Scalar::U32(_) => Prim::U32,
            Scalar::I64(_) => Prim::I64,
            Scalar::U64(_) => Prim::U64,
            Scalar::F32(_) => Prim::F32,
            Scalar::F64(_) => Prim::F64,
            Scalar::Utf16(_) => Prim::Utf16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Scalar(Scalar),
    Struct(Vec<Scalar>),
    Structs(Vec<Vec<Scalar>>),
    Bytes(Vec<u8>),                        // raw `c*` / `C*`
    Seq(Vec<Value>),
    Keyed(Vec<(Value, Option<Value>)>),    // value None: set entry
    Pair(Box<Value>, Box<Value>),
}

impl Value {
    pub fn pair(first: Value, second: Value) -> Self {
        Value::Pair(Box::new(first), Box::new(second))
    }
}
