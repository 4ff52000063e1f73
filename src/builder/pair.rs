// P(...) nodes: Pair section, then the first and second containers.
//
// First sides are staged behind the pair separator. Second sides may contain
// that separator, so they are staged behind the outer one; at the root there
// is at most one instance and its second side is staged bare.

use std::io::{BufRead, Write};

use super::{BuildFrame, check_instances, for_each_instance, wrong_kind};
use crate::codec::text;
use crate::error::BuildError;
use crate::records;
use crate::schema::{SchemaKind, SchemaNode};
use crate::store::section;

impl BuildFrame<'_> {
    /// A record missing the separator, or with a side that fails to decode,
    /// is skipped even at the root.
    pub(super) fn build_pair(
        &mut self,
        node: &SchemaNode,
        input: &mut dyn BufRead,
        outer: Option<&[u8]>,
        out: &mut dyn Write,
    ) -> Result<u64, BuildError> {
        let SchemaKind::Pair { first, second, sep } = &node.kind else {
            return Err(wrong_kind(node));
        };
        let delim = sep.as_bytes();
        let trailer = outer.unwrap_or_default();
        let mut firsts = self.stager.area(node.ordinal, "1")?;
        let mut seconds = self.stager.area(node.ordinal, "2")?;
        let (mut a, mut b) = (Vec::new(), Vec::new());
        let mut record = Vec::new();
        let mut count = 0u64;

        for_each_instance(input, outer, |chunk| {
            record.clear();
            chunk.read_to_end(&mut record)?;
            let encoded = text::split_pair(&record, sep).and_then(|(left, right)| {
                let (va, vb) = (text::decode(first, left)?, text::decode(second, right)?);
                a.clear();
                b.clear();
                text::encode(first, &va, &mut a)?;
                text::encode(second, &vb, &mut b)
            });
            match encoded {
                Err(e) => self.skip(node, e),
                Ok(()) if !records::delimits_cleanly(&a, delim) => {
                    self.skip(node, "first side contains the pair separator")
                }
                Ok(()) if outer.is_some() && !records::delimits_cleanly(&b, trailer) => {
                    self.skip(node, "second side contains the outer separator")
                }
                Ok(()) => {
                    firsts.write_raw(&a)?;
                    firsts.write_raw(delim)?;
                    seconds.write_raw(&b)?;
                    seconds.write_raw(trailer)?;
                    count += 1;
                }
            }
            Ok(())
        })?;

        section::write_pair_section(out, node.ordinal, count)?;

        let produced = self.build_node(first, &mut firsts.reader()?, Some(delim), out)?;
        check_instances(first, count, produced)?;

        // An empty area read under any delimiter yields no instances.
        let second_outer = match outer {
            None if count == 0 => Some(delim),
            _ => outer,
        };
        let produced = self.build_node(second, &mut seconds.reader()?, second_outer, out)?;
        check_instances(second, count, produced)?;
        Ok(count)
    }
}
