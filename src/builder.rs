//! Streams delimited text through a schema into a container file.
//!
//! `build_node` recurses in pre-order. A container node first writes its own
//! section, staging each child payload (re-encoded canonically and followed
//! by a delimiter), then builds the child from that staging area with the
//! delimiter as the child's outer separator. Malformed records are skipped
//! and counted.

mod flat;
mod keyed;
mod pair;
mod sequence;

use std::fmt::Display;
use std::io::{self, BufRead, BufWriter, Write};

use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::error::{BuildError, DecodeError};
use crate::records::{self, RecordReader};
use crate::schema::{SchemaKind, SchemaNode};
use crate::staging::{Stager, StagingArea};
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSummary {
    pub instances: u64,      // root instances
    pub skipped: u64,        // malformed records, all levels
    pub bytes_written: u64,
}

pub struct Builder<'s> {
    schema: &'s SchemaNode,
    config: BuildConfig,
}

impl<'s> Builder<'s> {
    pub fn new(schema: &'s SchemaNode, config: BuildConfig) -> Self {
        Self { schema, config }
    }

    /// Build `input` into `out`. With `outer = None` the whole input is one
    /// record; otherwise every `outer`-delimited chunk is one root instance.
    pub fn build(
        &self,
        mut input: impl BufRead,
        outer: Option<&[u8]>,
        out: impl Write,
    ) -> Result<BuildSummary, BuildError> {
        let stager = Stager::new(&self.config)?;
        let mut out = CountingWriter {
            inner: BufWriter::new(out),
            written: 0,
        };
        store::write_header(&mut out, &self.schema.source)?;

        let mut frame = BuildFrame {
            stager: &stager,
            skipped: 0,
        };
        let instances = frame.build_node(self.schema, &mut input, outer, &mut out)?;
        out.flush()?;

        let summary = BuildSummary {
            instances,
            skipped: frame.skipped,
            bytes_written: out.written,
        };
        info!(
            format = %self.schema.source.escape_debug(),
            instances = summary.instances,
            skipped = summary.skipped,
            bytes = summary.bytes_written,
            "build finished"
        );
        Ok(summary)
    }
}

struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// State shared by every level of one build.
struct BuildFrame<'a> {
    stager: &'a Stager,
    skipped: u64,
}

impl BuildFrame<'_> {
    /// Build `node` from `input`; returns the number of instances written.
    fn build_node(
        &mut self,
        node: &SchemaNode,
        input: &mut dyn BufRead,
        outer: Option<&[u8]>,
        out: &mut dyn Write,
    ) -> Result<u64, BuildError> {
        match &node.kind {
            SchemaKind::Primitive(_) | SchemaKind::Struct(_) => self.build_flat(node, input, outer, out),
            SchemaKind::StructSequence { .. } => self.build_ragged(node, input, outer, out),
            SchemaKind::Sequence { .. } => self.build_sequence(node, input, outer, out),
            SchemaKind::Keyed { .. } => self.build_keyed(node, input, outer, out),
            SchemaKind::Pair { .. } => self.build_pair(node, input, outer, out),
        }
    }

    fn skip(&mut self, node: &SchemaNode, reason: impl Display) {
        self.skipped += 1;
        debug!(node = node.ordinal, reason = %reason, "skipping malformed record");
    }
}

/// Run `f` once on the whole input (`outer = None`) or once per chunk.
fn for_each_instance(
    input: &mut dyn BufRead,
    outer: Option<&[u8]>,
    mut f: impl FnMut(&mut dyn BufRead) -> Result<(), BuildError>,
) -> Result<(), BuildError> {
    let Some(sep) = outer else {
        return f(input);
    };
    let mut chunks = RecordReader::new(input, sep);
    while let Some(chunk) = chunks.next_record()? {
        f(&mut chunk.as_slice())?;
    }
    Ok(())
}

/// Stage `payload` followed by `delim`, unless the payload would not read
/// back as one record.
fn stage_delimited(area: &mut StagingArea, payload: &[u8], delim: &[u8]) -> Result<bool, BuildError> {
    if !records::delimits_cleanly(payload, delim) {
        return Ok(false);
    }
    area.write_raw(payload)?;
    area.write_raw(delim)?;
    Ok(true)
}

fn check_instances(node: &SchemaNode, expected: u64, actual: u64) -> Result<(), BuildError> {
    if expected != actual {
        return Err(BuildError::InstanceMismatch {
            ordinal: node.ordinal,
            expected,
            actual,
        });
    }
    Ok(())
}

fn wrong_kind(node: &SchemaNode) -> BuildError {
    BuildError::Encode(DecodeError::ShapeMismatch(node.ordinal))
}
