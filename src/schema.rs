// Strongly-typed schema tree. Built once by `grammar::parse`, read-only after.

use serde::Serialize;

/// Primitive type codes of the format language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Prim {
    Char,      // c  (i8, raw byte in text)
    UChar,     // C  (u8, raw byte in text)
    I8,        // b  (i8, decimal in text)
    U8,        // B  (u8, decimal in text)
    I16,       // s
    U16,       // S
    I32,       // l
    U32,       // L
    I64,       // q
    U64,       // Q
    F32,       // f
    F64,       // d
    Utf16,     // u  (one UTF-16 code unit, UTF-8 in text)
}

impl Prim {
    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'c' => Prim::Char,
            'C' => Prim::UChar,
            'b' => Prim::I8,
            'B' => Prim::U8,
            's' => Prim::I16,
            'S' => Prim::U16,
            'l' => Prim::I32,
            'L' => Prim::U32,
            'q' => Prim::I64,
            'Q' => Prim::U64,
            'f' => Prim::F32,
            'd' => Prim::F64,
            'u' => Prim::Utf16,
            _ => return None,
        })
    }

    pub fn code(self) -> char {
        match self {
            Prim::Char => 'c',
            Prim::UChar => 'C',
            Prim::I8 => 'b',
            Prim::U8 => 'B',
            Prim::I16 => 's',
            Prim::U16 => 'S',
            Prim::I32 => 'l',
            Prim::U32 => 'L',
            Prim::I64 => 'q',
            Prim::U64 => 'Q',
            Prim::F32 => 'f',
            Prim::F64 => 'd',
            Prim::Utf16 => 'u',
        }
    }

    /// Width of the little-endian binary form.
    pub fn width(self) -> usize {
        match self {
            Prim::Char | Prim::UChar | Prim::I8 | Prim::U8 => 1,
            Prim::I16 | Prim::U16 | Prim::Utf16 => 2,
            Prim::I32 | Prim::U32 | Prim::F32 => 4,
            Prim::I64 | Prim::U64 | Prim::F64 => 8,
        }
    }

    /// Numeric codes skip leading whitespace when decoded from text.
    pub fn skips_whitespace(self) -> bool {
        !matches!(self, Prim::Char | Prim::UChar | Prim::Utf16)
    }
}

/// A separator after escape processing. Empty means "none".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Sep(pub Vec<u8>);

// Shown escaped (`"\n"`) rather than as a byte array.
impl Serialize for Sep {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.escape_ascii().to_string())
    }
}

impl Sep {
    pub fn none() -> Self { Sep(Vec::new()) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    /// Equal, or one is a prefix of the other.
    pub fn collides_with(&self, other: &Sep) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.0.starts_with(&other.0) || other.0.starts_with(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub prim: Prim,
    pub sep: Sep,        // separator written/expected after this field
}

/// Fixed-arity tuple of primitives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructShape {
    pub leading: Sep,
    pub fields: Vec<Field>,
}

impl StructShape {
    /// Width of one struct instance in binary form.
    pub fn width(&self) -> usize {
        self.fields.iter().map(|f| f.prim.width()).sum()
    }

    pub fn skips_whitespace(&self) -> bool {
        self.leading.is_empty()
            && self.fields.first().is_some_and(|f| f.prim.skips_whitespace())
    }

    /// A lone `c`/`C` with no separators anywhere.
    pub fn is_raw_byte(&self) -> bool {
        self.leading.is_empty()
            && self.fields.len() == 1
            && matches!(self.fields[0].prim, Prim::Char | Prim::UChar)
            && self.fields[0].sep.is_empty()
    }

    pub fn separators(&self) -> impl Iterator<Item = &Sep> {
        std::iter::once(&self.leading).chain(self.fields.iter().map(|f| &f.sep))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedValue {
    pub node: Box<SchemaNode>,
    pub sep: Sep,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SchemaKind {
    Primitive(Prim),
    Struct(StructShape),
    StructSequence {
        shape: StructShape,
        raw_bytes: bool,
    },
    Sequence {
        element: Box<SchemaNode>,
        sep: Sep,
        args: Vec<String>,
    },
    Keyed {
        key: Box<SchemaNode>,
        key_sep: Sep,
        value: Option<KeyedValue>,   // None: set form
        ordered: bool,               // T (trie) vs H (hash)
        args: Vec<String>,
    },
    Pair {
        first: Box<SchemaNode>,
        second: Box<SchemaNode>,
        sep: Sep,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaNode {
    pub ordinal: u32,        // pre-order, assigned at parse time
    pub source: String,      // format text this node was parsed from
    pub kind: SchemaKind,
}

impl SchemaNode {
    /// Number of nodes in this subtree.
    pub fn size(&self) -> u32 {
        1 + match &self.kind {
            SchemaKind::Primitive(_)
            | SchemaKind::Struct(_)
            | SchemaKind::StructSequence { .. } => 0,
            SchemaKind::Sequence { element, .. } => element.size(),
            SchemaKind::Keyed { key, value, .. } => {
                key.size() + value.as_ref().map_or(0, |v| v.node.size())
            }
            SchemaKind::Pair { first, second, .. } => first.size() + second.size(),
        }
    }

    /// Flat shapes: the three kinds a key may take.
    pub fn is_flat(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::Primitive(_) | SchemaKind::Struct(_) | SchemaKind::StructSequence { .. }
        )
    }

    /// Separators this node itself declares (not its children's).
    pub fn own_separators(&self) -> Vec<&Sep> {
        match &self.kind {
            SchemaKind::Primitive(_) => Vec::new(),
            SchemaKind::Struct(shape) | SchemaKind::StructSequence { shape, .. } => {
                shape.separators().collect()
            }
            SchemaKind::Sequence { sep, .. } | SchemaKind::Pair { sep, .. } => vec![sep],
            SchemaKind::Keyed { key_sep, value, .. } => {
                let mut out = vec![key_sep];
                if let Some(v) = value {
                    out.push(&v.sep);
                }
                out
            }
        }
    }

    pub fn children(&self) -> Vec<&SchemaNode> {
        match &self.kind {
            SchemaKind::Primitive(_)
            | SchemaKind::Struct(_)
            | SchemaKind::StructSequence { .. } => Vec::new(),
            SchemaKind::Sequence { element, .. } => vec![element.as_ref()],
            SchemaKind::Keyed { key, value, .. } => {
                let mut out = vec![key.as_ref()];
                if let Some(v) = value {
                    out.push(v.node.as_ref());
                }
                out
            }
            SchemaKind::Pair { first, second, .. } => vec![first.as_ref(), second.as_ref()],
        }
    }

    /// Separator that terminates top-level records of this node when read
    /// from a key stream (used by interactive lookup).
    pub fn record_separator(&self) -> Option<&Sep> {
        match &self.kind {
            SchemaKind::Sequence { sep, .. } | SchemaKind::Pair { sep, .. } => Some(sep),
            SchemaKind::Keyed { key_sep, value, .. } => {
                Some(value.as_ref().map_or(key_sep, |v| &v.sep))
            }
            _ => None,
        }
    }

    /// Pre-order walk.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a SchemaNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prim_codes_roundtrip() {
        for c in "cCbBsSlLqQfdu".chars() {
            let prim = Prim::from_code(c).unwrap();
            assert_eq!(prim.code(), c);
        }
        assert!(Prim::from_code('x').is_none());
    }

    #[test]
    fn widths() {
        let widths: Vec<usize> = "cCbBsSlLqQfdu"
            .chars()
            .map(|c| Prim::from_code(c).unwrap().width())
            .collect();
        assert_eq!(widths, vec![1, 1, 1, 1, 2, 2, 4, 4, 8, 8, 4, 8, 2]);
    }

    #[test]
    fn separator_collisions() {
        let nl = Sep(b"\n".to_vec());
        let nn = Sep(b"\n\n".to_vec());
        let tab = Sep(b"\t".to_vec());
        assert!(nl.collides_with(&nl));
        assert!(nl.collides_with(&nn));
        assert!(nn.collides_with(&nl));
        assert!(!nl.collides_with(&tab));
        assert!(!Sep::none().collides_with(&nl));
    }
}
