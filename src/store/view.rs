//! Zero-copy read side of the container sections.
//!
//! `Container::open` walks the sections in schema pre-order and validates
//! every offset table once, so the accessors below only need range checks
//! against instance counts.

use std::cmp::Ordering;
use std::ops::Range;

use crate::codec::binary;
use crate::error::ReadError;
use crate::schema::{SchemaKind, SchemaNode};
use crate::store::{ByteReader, SectionTag, hash};

/// Little-endian u64 array view.
#[derive(Debug, Clone, Copy)]
pub struct U64s<'a>(&'a [u8]);

impl<'a> U64s<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len() / 8
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> u64 {
        let mut a = [0u8; 8];
        a.copy_from_slice(&self.0[i * 8..i * 8 + 8]);
        u64::from_le_bytes(a)
    }

    pub fn last(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.get(self.len() - 1))
    }

    /// Starts at 0, never decreases, ends at `end`.
    fn is_offset_table(&self, end: u64) -> bool {
        if self.is_empty() || self.get(0) != 0 {
            return false;
        }
        let mut prev = 0;
        for i in 1..self.len() {
            let v = self.get(i);
            if v < prev {
                return false;
            }
            prev = v;
        }
        prev == end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Present,
    Value(u64),      // index into the value container
}

#[derive(Debug)]
pub struct FlatView<'a> {
    pub width: usize,
    pub count: u64,
    data: &'a [u8],
}

impl<'a> FlatView<'a> {
    pub fn get(&self, i: u64) -> Option<&'a [u8]> {
        if i >= self.count {
            return None;
        }
        let at = i as usize * self.width;
        self.data.get(at..at + self.width)
    }
}

#[derive(Debug)]
pub struct RaggedView<'a> {
    pub width: usize,
    pub instances: u64,
    offsets: U64s<'a>,
    data: &'a [u8],
}

impl<'a> RaggedView<'a> {
    pub fn instance(&self, i: u64) -> Option<&'a [u8]> {
        if i >= self.instances {
            return None;
        }
        let i = i as usize;
        let w = self.width as u64;
        let (a, b) = (self.offsets.get(i) * w, self.offsets.get(i + 1) * w);
        self.data.get(a as usize..b as usize)
    }
}

#[derive(Debug)]
pub struct ShapeView<'a> {
    pub instances: u64,
    offsets: U64s<'a>,
}

impl ShapeView<'_> {
    /// Element indices of instance `i` in the child container.
    pub fn range(&self, i: u64) -> Option<Range<u64>> {
        (i < self.instances).then(|| self.offsets.get(i as usize)..self.offsets.get(i as usize + 1))
    }

    pub fn total(&self) -> u64 {
        self.offsets.last().unwrap_or(0)
    }
}

#[derive(Debug)]
struct HashTables<'a> {
    bucket_index: U64s<'a>,
    table: U64s<'a>,
}

#[derive(Debug)]
pub struct KeyedView<'a> {
    pub set: bool,
    pub instances: u64,
    entry_starts: U64s<'a>,
    key_offsets: U64s<'a>,
    keys: &'a [u8],
    hash: Option<HashTables<'a>>,
}

impl<'a> KeyedView<'a> {
    pub fn entries(&self) -> u64 {
        self.entry_starts.last().unwrap_or(0)
    }

    pub fn is_hash(&self) -> bool {
        self.hash.is_some()
    }

    pub fn instance(&self, i: u64) -> Option<KeyedInstance<'_, 'a>> {
        if i >= self.instances {
            return None;
        }
        let i = i as usize;
        let buckets = self
            .hash
            .as_ref()
            .map(|h| (h.bucket_index.get(i) as usize, h.bucket_index.get(i + 1) as usize));
        Some(KeyedInstance {
            view: self,
            start: self.entry_starts.get(i),
            end: self.entry_starts.get(i + 1),
            buckets,
        })
    }

    fn key(&self, entry: u64) -> &'a [u8] {
        let e = entry as usize;
        &self.keys[self.key_offsets.get(e) as usize..self.key_offsets.get(e + 1) as usize]
    }

    fn entry(&self, index: u64) -> Entry {
        if self.set { Entry::Present } else { Entry::Value(index) }
    }
}

/// One T/H instance: a finite, restartable sequence of `(key, Entry)`.
pub struct KeyedInstance<'v, 'a> {
    view: &'v KeyedView<'a>,
    start: u64,
    end: u64,
    buckets: Option<(usize, usize)>,     // this instance's slice of the bucket table
}

impl<'v, 'a> KeyedInstance<'v, 'a> {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        // Keys are sorted within the whole trie instance, or within a bucket.
        let (mut lo, mut hi) = match (self.buckets, &self.view.hash) {
            (Some((from, to)), Some(tables)) => {
                let nb = (to - from - 1) as u64;
                let b = from + hash::bucket_of(key, nb) as usize;
                (self.start + tables.table.get(b), self.start + tables.table.get(b + 1))
            }
            _ => (self.start, self.end),
        };
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.view.key(mid).cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(self.view.entry(mid)),
            }
        }
        None
    }

    /// Entries in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a [u8], Entry)> + '_ {
        (self.start..self.end).map(|e| (self.view.key(e), self.view.entry(e)))
    }
}

#[derive(Debug)]
pub enum SectionView<'a> {
    Flat(FlatView<'a>),
    Ragged(RaggedView<'a>),
    Shape(ShapeView<'a>),
    Keyed(KeyedView<'a>),
    Pair { instances: u64 },
}

/// One node's section plus the sections of its stored children.
/// Keyed nodes carry only their value child: keys live in the section.
#[derive(Debug)]
pub struct Container<'a> {
    pub ordinal: u32,
    pub args: &'a str,
    pub view: SectionView<'a>,
    pub children: Vec<Container<'a>>,
}

impl<'a> Container<'a> {
    /// Parse `bytes` (everything after the file header) against `schema`.
    pub fn open(schema: &SchemaNode, bytes: &'a [u8]) -> Result<Self, ReadError> {
        let mut r = ByteReader::new(bytes);
        let root = Self::parse(schema, &mut r)?;
        if !r.at_end() {
            return Err(corrupt(schema.ordinal, "trailing bytes after last section"));
        }
        Ok(root)
    }

    pub fn instance_count(&self) -> u64 {
        match &self.view {
            SectionView::Flat(v) => v.count,
            SectionView::Ragged(v) => v.instances,
            SectionView::Shape(v) => v.instances,
            SectionView::Keyed(v) => v.instances,
            SectionView::Pair { instances } => *instances,
        }
    }

    fn parse(node: &SchemaNode, r: &mut ByteReader<'a>) -> Result<Self, ReadError> {
        let tag = r.u8()?;
        let ordinal = r.u32()?;
        if ordinal != node.ordinal {
            return Err(ReadError::OrdinalMismatch {
                expected: node.ordinal,
                found: ordinal,
            });
        }
        let args_len = r.u16()? as usize;
        let args = std::str::from_utf8(r.take(args_len)?)
            .map_err(|_| corrupt(ordinal, "section args are not UTF-8"))?;
        let body_len = r.u64()?;
        let body_len =
            usize::try_from(body_len).map_err(|_| corrupt(ordinal, "body length overflow"))?;
        let mut body = ByteReader::new(r.take(body_len)?);

        let found = SectionTag::from_u8(tag);
        let unexpected = ReadError::UnexpectedSection { ordinal, found: tag };
        let view = match (&node.kind, found) {
            (SchemaKind::Primitive(_) | SchemaKind::Struct(_), Some(SectionTag::Flat)) => {
                SectionView::Flat(parse_flat(node, &mut body)?)
            }
            (SchemaKind::StructSequence { .. }, Some(SectionTag::Ragged)) => {
                SectionView::Ragged(parse_ragged(node, &mut body)?)
            }
            (SchemaKind::Sequence { .. }, Some(SectionTag::Shape)) => {
                let instances = body.u64()?;
                let offsets = body.offset_table(instances)?;
                let end = offsets.last().unwrap_or(0);
                if !offsets.is_offset_table(end) {
                    return Err(corrupt(ordinal, "bad element offsets"));
                }
                SectionView::Shape(ShapeView { instances, offsets })
            }
            (SchemaKind::Keyed { ordered: true, .. }, Some(SectionTag::Trie))
            | (SchemaKind::Keyed { ordered: false, .. }, Some(SectionTag::Hash)) => {
                SectionView::Keyed(parse_keyed(ordinal, found == Some(SectionTag::Hash), &mut body)?)
            }
            (SchemaKind::Pair { .. }, Some(SectionTag::Pair)) => SectionView::Pair {
                instances: body.u64()?,
            },
            _ => return Err(unexpected),
        };
        if !body.at_end() {
            return Err(corrupt(ordinal, "trailing bytes in section body"));
        }

        let stored: Vec<&SchemaNode> = match &node.kind {
            SchemaKind::Sequence { element, .. } => vec![element.as_ref()],
            SchemaKind::Keyed { value: Some(v), .. } => vec![v.node.as_ref()],
            SchemaKind::Pair { first, second, .. } => vec![first.as_ref(), second.as_ref()],
            _ => Vec::new(),
        };
        let children = stored
            .into_iter()
            .map(|child| Self::parse(child, r))
            .collect::<Result<Vec<_>, _>>()?;

        let container = Container {
            ordinal,
            args,
            view,
            children,
        };
        container.check_child_counts()?;
        Ok(container)
    }

    fn check_child_counts(&self) -> Result<(), ReadError> {
        let expected = match &self.view {
            SectionView::Shape(v) => Some(v.total()),
            SectionView::Keyed(v) if !v.set => Some(v.entries()),
            SectionView::Pair { instances } => Some(*instances),
            _ => None,
        };
        let Some(expected) = expected else { return Ok(()) };
        for child in &self.children {
            if child.instance_count() != expected {
                return Err(corrupt(
                    self.ordinal,
                    &format!(
                        "child {} has {} instance(s), expected {expected}",
                        child.ordinal,
                        child.instance_count()
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn corrupt(ordinal: u32, message: &str) -> ReadError {
    ReadError::Corrupt {
        ordinal,
        message: message.to_string(),
    }
}

fn check_width(node: &SchemaNode, width: u32) -> Result<usize, ReadError> {
    let expected = binary::element_width(node);
    if width as usize != expected {
        return Err(corrupt(node.ordinal, &format!("element width {width}, expected {expected}")));
    }
    Ok(expected)
}

fn parse_flat<'a>(node: &SchemaNode, body: &mut ByteReader<'a>) -> Result<FlatView<'a>, ReadError> {
    let width = check_width(node, body.u32()?)?;
    let count = body.u64()?;
    let len = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(width))
        .ok_or_else(|| corrupt(node.ordinal, "value count overflow"))?;
    let data = body.take(len)?;
    Ok(FlatView { width, count, data })
}

fn parse_ragged<'a>(
    node: &SchemaNode,
    body: &mut ByteReader<'a>,
) -> Result<RaggedView<'a>, ReadError> {
    let width = check_width(node, body.u32()?)?;
    let instances = body.u64()?;
    let offsets = body.offset_table(instances)?;
    let elements = offsets.last().unwrap_or(0);
    if !offsets.is_offset_table(elements) {
        return Err(corrupt(node.ordinal, "bad instance offsets"));
    }
    let len = usize::try_from(elements)
        .ok()
        .and_then(|e| e.checked_mul(width))
        .ok_or_else(|| corrupt(node.ordinal, "element count overflow"))?;
    let data = body.take(len)?;
    Ok(RaggedView {
        width,
        instances,
        offsets,
        data,
    })
}

fn parse_keyed<'a>(
    ordinal: u32,
    is_hash: bool,
    body: &mut ByteReader<'a>,
) -> Result<KeyedView<'a>, ReadError> {
    let set = body.u8()? != 0;
    let instances = body.u64()?;
    let entry_starts = body.offset_table(instances)?;
    let entries = entry_starts.last().unwrap_or(0);
    if !entry_starts.is_offset_table(entries) {
        return Err(corrupt(ordinal, "bad entry starts"));
    }
    let key_offsets = body.offset_table(entries)?;
    let key_bytes = key_offsets.last().unwrap_or(0);
    if !key_offsets.is_offset_table(key_bytes) {
        return Err(corrupt(ordinal, "bad key offsets"));
    }
    let keys = body.take(
        usize::try_from(key_bytes).map_err(|_| corrupt(ordinal, "key blob overflow"))?,
    )?;

    let hash = if is_hash {
        let bucket_index = body.offset_table(instances)?;
        let table_len = bucket_index.last().unwrap_or(0);
        if !bucket_index.is_offset_table(table_len) {
            return Err(corrupt(ordinal, "bad bucket index"));
        }
        let table = body.u64s(table_len)?;
        for i in 0..instances as usize {
            let (from, to) = (bucket_index.get(i) as usize, bucket_index.get(i + 1) as usize);
            let buckets = to.saturating_sub(from).saturating_sub(1);
            let slice = U64s::new(&table.0[from * 8..to * 8]);
            let count = entry_starts.get(i + 1) - entry_starts.get(i);
            if !buckets.is_power_of_two() || !slice.is_offset_table(count) {
                return Err(corrupt(ordinal, "bad bucket table"));
            }
        }
        Some(HashTables {
            bucket_index,
            table,
        })
    } else {
        None
    };

    Ok(KeyedView {
        set,
        instances,
        entry_starts,
        key_offsets,
        keys,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse;
    use crate::staging::StagingArea;
    use crate::store::{KeyedSink, Slot};

    fn keyed_bytes(ordered: bool, keys: &[&[&str]]) -> Vec<u8> {
        let mut sink = KeyedSink::begin(0, ordered, true, &[]);
        for instance in keys {
            sink.start_instance();
            for k in *instance {
                sink.insert(k.as_bytes().to_vec(), Slot::Presence);
            }
        }
        sink.finish().unwrap().bytes
    }

    fn check_set(format: &str, ordered: bool) {
        let schema = parse(format).unwrap();
        let bytes = keyed_bytes(ordered, &[&["pear", "apple", "fig", "apple"], &[], &["kiwi"]]);
        let c = Container::open(&schema, &bytes).unwrap();
        assert_eq!(c.instance_count(), 3);
        let SectionView::Keyed(view) = &c.view else { panic!("{:?}", c.view) };
        assert_eq!(view.is_hash(), !ordered);

        let first = view.instance(0).unwrap();
        assert_eq!(first.len(), 3);
        for k in ["apple", "fig", "pear"] {
            assert_eq!(first.get(k.as_bytes()), Some(Entry::Present), "{k}");
        }
        assert_eq!(first.get(b"kiwi"), None);
        assert!(view.instance(1).unwrap().is_empty());
        assert_eq!(view.instance(2).unwrap().get(b"kiwi"), Some(Entry::Present));
        assert!(view.instance(3).is_none());

        // Restartable iteration.
        let a: Vec<_> = first.iter().collect();
        let b: Vec<_> = first.iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        if ordered {
            let keys: Vec<&[u8]> = a.iter().map(|(k, _)| *k).collect();
            assert_eq!(keys, vec![&b"apple"[..], b"fig", b"pear"]);
        }
    }

    #[test]
    fn trie_set() {
        check_set("T(c*)\n", true);
    }

    #[test]
    fn hash_set() {
        check_set("H(c*)\n", false);
    }

    #[test]
    fn final_order_follows_storage_order() {
        let mut area = StagingArea::in_memory("0-a");
        let mut sink = KeyedSink::begin(0, true, false, &[]);
        sink.start_instance();
        for k in ["b", "c", "a"] {
            let h = area.append(k.as_bytes()).unwrap();
            sink.insert(k.as_bytes().to_vec(), Slot::Staged(h));
        }
        let built = sink.finish().unwrap();
        assert_eq!(built.entries, 3);
        let staged: Vec<Vec<u8>> = built
            .final_order
            .iter()
            .map(|h| area.read(*h).unwrap())
            .collect();
        assert_eq!(staged, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn wrong_section_kind_is_rejected() {
        let schema = parse("H(c*)\n").unwrap();
        let bytes = keyed_bytes(true, &[&["a"]]);
        assert!(matches!(
            Container::open(&schema, &bytes),
            Err(ReadError::UnexpectedSection { found: 4, .. })
        ));
    }

    #[test]
    fn truncated_section_is_rejected() {
        let schema = parse("T(c*)\n").unwrap();
        let mut bytes = keyed_bytes(true, &[&["a", "b"]]);
        bytes.truncate(bytes.len() - 1);
        assert!(Container::open(&schema, &bytes).is_err());
    }
}
