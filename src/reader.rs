//! Read and lookup over built container bytes.

use crate::codec::{binary, text};
use crate::error::{DecodeError, ReadError};
use crate::schema::{SchemaKind, SchemaNode};
use crate::store::{self, Container, Entry, SectionView};
use crate::value::Value;

/// Text a set lookup answers with.
pub const PRESENT: &[u8] = b"1";

/// A built container opened against the schema it was built with.
#[derive(Debug)]
pub struct Archive<'a> {
    schema: &'a SchemaNode,
    root: Container<'a>,
}

impl<'a> Archive<'a> {
    pub fn open(schema: &'a SchemaNode, bytes: &'a [u8]) -> Result<Self, ReadError> {
        let (format, body_at) = store::read_header(bytes)?;
        if format != schema.source {
            return Err(ReadError::FormatMismatch {
                expected: schema.source.clone(),
                found: format.to_string(),
            });
        }
        let root = Container::open(schema, &bytes[body_at..])?;
        Ok(Self { schema, root })
    }

    pub fn schema(&self) -> &SchemaNode {
        self.schema
    }

    pub fn container(&self) -> &Container<'a> {
        &self.root
    }

    pub fn instances(&self) -> u64 {
        self.root.instance_count()
    }

    pub fn read(&self, instance: u64) -> Result<Value, ReadError> {
        self.check_instance(instance)?;
        read_node(self.schema, &self.root, instance)
    }

    /// Canonical text of one root instance.
    pub fn read_text(&self, instance: u64) -> Result<Vec<u8>, ReadError> {
        let value = self.read(instance)?;
        let mut out = Vec::new();
        text::encode(self.schema, &value, &mut out)?;
        Ok(out)
    }

    /// Look `key_text` up in the first root instance. A root without
    /// instances has no keys.
    pub fn lookup(&self, key_text: &[u8]) -> Result<Option<Vec<u8>>, ReadError> {
        if !matches!(self.schema.kind, SchemaKind::Keyed { .. }) {
            return Err(ReadError::NotKeyed(self.schema.source.clone()));
        }
        if self.instances() == 0 {
            return Ok(None);
        }
        self.lookup_in(0, key_text)
    }

    /// Map hits return the value's text, set hits return [`PRESENT`].
    pub fn lookup_in(&self, instance: u64, key_text: &[u8]) -> Result<Option<Vec<u8>>, ReadError> {
        let (SchemaKind::Keyed { key, value, .. }, SectionView::Keyed(view)) =
            (&self.schema.kind, &self.root.view)
        else {
            return Err(ReadError::NotKeyed(self.schema.source.clone()));
        };
        self.check_instance(instance)?;

        let key_bytes = binary::key_bytes(key, &text::decode(key, key_text)?)?;
        let Some(found) = view.instance(instance).and_then(|i| i.get(&key_bytes)) else {
            return Ok(None);
        };
        match (found, value, self.root.children.first()) {
            (Entry::Present, None, _) => Ok(Some(PRESENT.to_vec())),
            (Entry::Value(index), Some(kv), Some(child)) => {
                let v = read_node(&kv.node, child, index)?;
                let mut out = Vec::new();
                text::encode(&kv.node, &v, &mut out)?;
                Ok(Some(out))
            }
            _ => Err(corrupt(&self.root, "entry kind does not match schema")),
        }
    }

    fn check_instance(&self, index: u64) -> Result<(), ReadError> {
        let count = self.instances();
        if index >= count {
            return Err(ReadError::InstanceOutOfRange { index, count });
        }
        Ok(())
    }
}

/// The format string stored in a container header.
pub fn embedded_format(bytes: &[u8]) -> Result<&str, ReadError> {
    store::read_header(bytes).map(|(format, _)| format)
}

fn read_node(node: &SchemaNode, c: &Container<'_>, i: u64) -> Result<Value, ReadError> {
    let out_of_range = || corrupt(c, &format!("instance {i} missing"));
    match (&node.kind, &c.view) {
        (_, SectionView::Flat(v)) => Ok(binary::read_flat(node, v.get(i).ok_or_else(out_of_range)?)?),
        (_, SectionView::Ragged(v)) => {
            Ok(binary::read_flat(node, v.instance(i).ok_or_else(out_of_range)?)?)
        }
        (SchemaKind::Sequence { element, .. }, SectionView::Shape(v)) => {
            let child = only_child(c)?;
            v.range(i)
                .ok_or_else(out_of_range)?
                .map(|j| read_node(element, child, j))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Seq)
        }
        (SchemaKind::Keyed { key, value, .. }, SectionView::Keyed(v)) => {
            let instance = v.instance(i).ok_or_else(out_of_range)?;
            let mut entries = Vec::with_capacity(instance.len() as usize);
            for (key_bytes, entry) in instance.iter() {
                let k = binary::read_flat(key, key_bytes)?;
                let v = match (entry, value) {
                    (Entry::Present, None) => None,
                    (Entry::Value(j), Some(kv)) => Some(read_node(&kv.node, only_child(c)?, j)?),
                    _ => return Err(corrupt(c, "entry kind does not match schema")),
                };
                entries.push((k, v));
            }
            Ok(Value::Keyed(entries))
        }
        (SchemaKind::Pair { first, second, .. }, SectionView::Pair { .. }) => {
            let [a, b] = c.children.as_slice() else {
                return Err(corrupt(c, "pair needs two children"));
            };
            Ok(Value::pair(read_node(first, a, i)?, read_node(second, b, i)?))
        }
        _ => Err(DecodeError::ShapeMismatch(node.ordinal).into()),
    }
}

fn only_child<'c, 'a>(c: &'c Container<'a>) -> Result<&'c Container<'a>, ReadError> {
    c.children.first().ok_or_else(|| corrupt(c, "missing child section"))
}

fn corrupt(c: &Container<'_>, message: &str) -> ReadError {
    ReadError::Corrupt {
        ordinal: c.ordinal,
        message: message.to_string(),
    }
}
