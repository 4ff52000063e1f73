// Section writers for the non-keyed node kinds.

use std::io::{self, Write};

use crate::store::{SectionTag, put_u64s, write_section};

/// Fixed-width values, one per instance.
pub struct FlatSection {
    ordinal: u32,
    width: usize,
    count: u64,
    data: Vec<u8>,
}

impl FlatSection {
    pub fn new(ordinal: u32, width: usize) -> Self {
        Self {
            ordinal,
            width,
            count: 0,
            data: Vec::new(),
        }
    }

    /// Append one value's binary form (must be `width` bytes).
    pub fn push(&mut self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.width);
        self.data.extend_from_slice(bytes);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn write(self, out: &mut dyn Write) -> io::Result<()> {
        let mut body = Vec::with_capacity(12 + self.data.len());
        body.extend_from_slice(&(self.width as u32).to_le_bytes());
        body.extend_from_slice(&self.count.to_le_bytes());
        body.extend_from_slice(&self.data);
        write_section(out, SectionTag::Flat, self.ordinal, &[], &body)
    }
}

/// Variable-length runs of fixed-width elements (struct sequences).
pub struct RaggedSection {
    ordinal: u32,
    width: usize,
    offsets: Vec<u64>,       // in elements, instances + 1
    data: Vec<u8>,
}

impl RaggedSection {
    pub fn new(ordinal: u32, width: usize) -> Self {
        Self {
            ordinal,
            width,
            offsets: vec![0],
            data: Vec::new(),
        }
    }

    pub fn push_instance(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.offsets.push((self.data.len() / self.width.max(1)) as u64);
    }

    pub fn instances(&self) -> u64 {
        self.offsets.len() as u64 - 1
    }

    pub fn write(self, out: &mut dyn Write) -> io::Result<()> {
        let mut body = Vec::with_capacity(12 + 8 * self.offsets.len() + self.data.len());
        body.extend_from_slice(&(self.width as u32).to_le_bytes());
        body.extend_from_slice(&self.instances().to_le_bytes());
        put_u64s(&mut body, &self.offsets);
        body.extend_from_slice(&self.data);
        write_section(out, SectionTag::Ragged, self.ordinal, &[], &body)
    }
}

/// Element counts of a `V(...)` node; the elements follow as the child section.
pub struct ShapeSection {
    ordinal: u32,
    args: Vec<String>,
    offsets: Vec<u64>,
}

impl ShapeSection {
    pub fn new(ordinal: u32, args: &[String]) -> Self {
        Self {
            ordinal,
            args: args.to_vec(),
            offsets: vec![0],
        }
    }

    pub fn push_instance(&mut self, elements: u64) {
        let last = self.offsets.last().copied().unwrap_or(0);
        self.offsets.push(last + elements);
    }

    pub fn instances(&self) -> u64 {
        self.offsets.len() as u64 - 1
    }

    /// Elements over all instances.
    pub fn total(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn write(self, out: &mut dyn Write) -> io::Result<()> {
        let mut body = Vec::with_capacity(8 * (self.offsets.len() + 1));
        body.extend_from_slice(&self.instances().to_le_bytes());
        put_u64s(&mut body, &self.offsets);
        write_section(out, SectionTag::Shape, self.ordinal, &self.args, &body)
    }
}

pub fn write_pair_section(out: &mut dyn Write, ordinal: u32, instances: u64) -> io::Result<()> {
    write_section(out, SectionTag::Pair, ordinal, &[], &instances.to_le_bytes())
}
