//! T(...) and H(...) nodes, built in two phases.
//!
//! 1. Skeleton: keys go to the `KeyedSink`, map values are re-encoded and
//!    appended to staging area `a`; the sink keeps the handle.
//! 2. The sink fixes the storage order. Payloads are copied from `a` into
//!    staging area `b` in that order, each followed by the value separator,
//!    and the value node is built from `b`.

use std::io::{BufRead, Write};

use tracing::trace;

use super::{BuildFrame, check_instances, for_each_instance, wrong_kind};
use crate::codec::{binary, text};
use crate::error::BuildError;
use crate::records::{self, EntryReader};
use crate::schema::{SchemaKind, SchemaNode};
use crate::store::{KeyedSink, Slot};

impl BuildFrame<'_> {
    pub(super) fn build_keyed(
        &mut self,
        node: &SchemaNode,
        input: &mut dyn BufRead,
        outer: Option<&[u8]>,
        out: &mut dyn Write,
    ) -> Result<u64, BuildError> {
        let SchemaKind::Keyed { key, key_sep, value, ordered, args } = &node.kind else {
            return Err(wrong_kind(node));
        };
        let value_sep = value.as_ref().map(|v| v.sep.as_bytes());
        let mut sink = KeyedSink::begin(node.ordinal, *ordered, value.is_none(), args);
        let mut payloads = match value {
            Some(_) => Some(self.stager.area(node.ordinal, "a")?),
            None => None,
        };
        let mut canonical = Vec::new();

        for_each_instance(input, outer, |chunk| {
            sink.start_instance();
            let mut entries = EntryReader::new(chunk, key_sep.as_bytes(), value_sep);
            while let Some(entry) = entries.next_entry()? {
                let Ok(raw) = entry else {
                    self.skip(node, "entry without key separator");
                    continue;
                };
                let key_bytes = match text::decode(key, &raw.key).and_then(|k| binary::key_bytes(key, &k)) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        self.skip(key, e);
                        continue;
                    }
                };

                let slot = match (value, raw.value, payloads.as_mut()) {
                    (Some(kv), Some(text_value), Some(area)) => {
                        let encoded = text::decode(&kv.node, &text_value).and_then(|v| {
                            canonical.clear();
                            text::encode(&kv.node, &v, &mut canonical)
                        });
                        if let Err(e) = encoded {
                            self.skip(&kv.node, e);
                            continue;
                        }
                        if !records::delimits_cleanly(&canonical, kv.sep.as_bytes()) {
                            self.skip(&kv.node, "value text contains its delimiter");
                            continue;
                        }
                        Slot::Staged(area.append(&canonical)?)
                    }
                    _ => Slot::Presence,
                };
                sink.insert(key_bytes, slot);
            }
            Ok(())
        })?;

        let instances = sink.instances();
        let built = sink.finish()?;
        out.write_all(&built.bytes)?;
        trace!(node = node.ordinal, instances, entries = built.entries, "keyed skeleton written");

        let (Some(kv), Some(mut payloads)) = (value, payloads) else {
            return Ok(instances);
        };
        let delim = kv.sep.as_bytes();
        let mut in_order = self.stager.area(node.ordinal, "b")?;
        for handle in &built.final_order {
            in_order.write_raw(&payloads.read(*handle)?)?;
            in_order.write_raw(delim)?;
        }
        drop(payloads);

        let produced = self.build_node(&kv.node, &mut in_order.reader()?, Some(delim), out)?;
        check_instances(&kv.node, built.entries, produced)?;
        Ok(instances)
    }
}
