// V(...) nodes: Shape section, then the element container.

use std::io::{BufRead, Write};

use super::{BuildFrame, check_instances, for_each_instance, stage_delimited, wrong_kind};
use crate::codec::text;
use crate::error::BuildError;
use crate::records::RecordReader;
use crate::schema::{SchemaKind, SchemaNode};
use crate::store::section::ShapeSection;

impl BuildFrame<'_> {
    pub(super) fn build_sequence(
        &mut self,
        node: &SchemaNode,
        input: &mut dyn BufRead,
        outer: Option<&[u8]>,
        out: &mut dyn Write,
    ) -> Result<u64, BuildError> {
        let SchemaKind::Sequence { element, sep, args } = &node.kind else {
            return Err(wrong_kind(node));
        };
        let delim = sep.as_bytes();
        let mut area = self.stager.area(node.ordinal, "v")?;
        let mut shape = ShapeSection::new(node.ordinal, args);
        let mut canonical = Vec::new();

        for_each_instance(input, outer, |chunk| {
            let mut items = RecordReader::new(chunk, delim);
            let mut count = 0;
            while let Some(item) = items.next_record()? {
                let encoded = text::decode(element, &item).and_then(|v| {
                    canonical.clear();
                    text::encode(element, &v, &mut canonical)
                });
                match encoded {
                    Ok(()) => {
                        if stage_delimited(&mut area, &canonical, delim)? {
                            count += 1;
                        } else {
                            self.skip(element, "element text contains its delimiter");
                        }
                    }
                    Err(e) => self.skip(element, e),
                }
            }
            shape.push_instance(count);
            Ok(())
        })?;

        let (instances, elements) = (shape.instances(), shape.total());
        shape.write(out)?;

        let produced = self.build_node(element, &mut area.reader()?, Some(delim), out)?;
        check_instances(element, elements, produced)?;
        Ok(instances)
    }
}
