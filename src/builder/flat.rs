// Primitive/Struct (Flat section) and struct sequence (Ragged section) nodes.

use std::io::{BufRead, Write};

use tracing::debug;

use super::{BuildFrame, for_each_instance};
use crate::codec::{Cursor, binary, text};
use crate::error::BuildError;
use crate::records::RecordReader;
use crate::schema::SchemaNode;
use crate::store::section::{FlatSection, RaggedSection};

impl BuildFrame<'_> {
    /// Without an outer separator every value decoded from the stream is
    /// one instance, up to the first one that fails.
    pub(super) fn build_flat(
        &mut self,
        node: &SchemaNode,
        input: &mut dyn BufRead,
        outer: Option<&[u8]>,
        out: &mut dyn Write,
    ) -> Result<u64, BuildError> {
        let mut section = FlatSection::new(node.ordinal, binary::element_width(node));
        let mut value_bytes = Vec::new();

        match outer {
            None => {
                let mut all = Vec::new();
                input.read_to_end(&mut all)?;
                let mut cur = Cursor::new(&all);
                loop {
                    let value = match text::decode_next(node, &mut cur) {
                        Ok(v) => v,
                        Err(e) => {
                            if !cur.only_whitespace_left() {
                                debug!(node = node.ordinal, at = cur.position(), error = %e, "stopped at undecodable value");
                            }
                            break;
                        }
                    };
                    value_bytes.clear();
                    binary::write_flat(node, &value, &mut value_bytes)?;
                    section.push(&value_bytes);
                }
            }
            Some(sep) => {
                let mut chunks = RecordReader::new(input, sep);
                while let Some(chunk) = chunks.next_record()? {
                    match text::decode(node, &chunk) {
                        Ok(value) => {
                            value_bytes.clear();
                            binary::write_flat(node, &value, &mut value_bytes)?;
                            section.push(&value_bytes);
                        }
                        Err(e) => self.skip(node, e),
                    }
                }
            }
        }

        let count = section.count();
        section.write(out)?;
        Ok(count)
    }

    pub(super) fn build_ragged(
        &mut self,
        node: &SchemaNode,
        input: &mut dyn BufRead,
        outer: Option<&[u8]>,
        out: &mut dyn Write,
    ) -> Result<u64, BuildError> {
        let mut section = RaggedSection::new(node.ordinal, binary::element_width(node));
        let mut record = Vec::new();
        let mut items = Vec::new();

        for_each_instance(input, outer, |chunk| {
            record.clear();
            chunk.read_to_end(&mut record)?;
            match text::decode(node, &record) {
                Ok(value) => {
                    items.clear();
                    binary::write_flat(node, &value, &mut items)?;
                    section.push_instance(&items);
                }
                Err(e) => self.skip(node, e),
            }
            Ok(())
        })?;

        let instances = section.instances();
        section.write(out)?;
        Ok(instances)
    }
}
