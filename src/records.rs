//! Record splitting over any `BufRead`.
//!
//! `RecordReader` generalizes `getline` to multi-byte delimiters: empty
//! records between two delimiters are yielded, an empty tail after the last
//! delimiter is not. `EntryReader` layers keyed-entry tokenization on top.

use std::io::{self, BufRead};

/// First occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// True when reading `payload` followed by `delim` back with a
/// `RecordReader` yields exactly `payload`.
pub fn delimits_cleanly(payload: &[u8], delim: &[u8]) -> bool {
    if delim.is_empty() {
        return true;
    }
    let mut joined = Vec::with_capacity(payload.len() + delim.len());
    joined.extend_from_slice(payload);
    joined.extend_from_slice(delim);
    find(&joined, delim) == Some(payload.len())
}

pub struct RecordReader<R> {
    inner: R,
    delim: Vec<u8>,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R, delim: &[u8]) -> Self {
        Self {
            inner,
            delim: delim.to_vec(),
            done: false,
        }
    }

    /// Next record without its delimiter, or `None` at end of input.
    /// An empty delimiter makes the whole input a single record.
    pub fn next_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = Vec::new();
        let Some(&last) = self.delim.last() else {
            self.done = true;
            self.inner.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        };

        loop {
            let n = self.inner.read_until(last, &mut buf)?;
            if n == 0 {
                self.done = true;
                return Ok((!buf.is_empty()).then_some(buf));
            }
            if buf.ends_with(&self.delim) {
                buf.truncate(buf.len() - self.delim.len());
                return Ok(Some(buf));
            }
        }
    }
}

/// One tokenized keyed entry. `value` is `None` for set entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

enum Tokenizing {
    Set,                       // key keysep
    Split { key_sep: Vec<u8> }, // key keysep value valsep, seps differ
    Alternating,               // key sep value sep, seps equal
}

/// Keyed-entry tokenizer.
pub struct EntryReader<R> {
    records: RecordReader<R>,
    mode: Tokenizing,
}

impl<R: BufRead> EntryReader<R> {
    pub fn new(inner: R, key_sep: &[u8], value_sep: Option<&[u8]>) -> Self {
        let (delim, mode) = match value_sep {
            None => (key_sep, Tokenizing::Set),
            Some(v) if v == key_sep => (v, Tokenizing::Alternating),
            Some(v) => (
                v,
                Tokenizing::Split {
                    key_sep: key_sep.to_vec(),
                },
            ),
        };
        Self {
            records: RecordReader::new(inner, delim),
            mode,
        }
    }

    /// `Ok(Some(Err(raw)))` is an entry that could not be tokenized.
    pub fn next_entry(&mut self) -> io::Result<Option<Result<RawEntry, Vec<u8>>>> {
        let Some(record) = self.records.next_record()? else {
            return Ok(None);
        };
        let entry = match &self.mode {
            Tokenizing::Set => Ok(RawEntry {
                key: record,
                value: None,
            }),
            Tokenizing::Split { key_sep } => match find(&record, key_sep) {
                Some(at) if !key_sep.is_empty() => Ok(RawEntry {
                    key: record[..at].to_vec(),
                    value: Some(record[at + key_sep.len()..].to_vec()),
                }),
                _ => Err(record),
            },
            Tokenizing::Alternating => match self.records.next_record()? {
                Some(value) => Ok(RawEntry {
                    key: record,
                    value: Some(value),
                }),
                None => Err(record),
            },
        };
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(input: &[u8], delim: &[u8]) -> Vec<Vec<u8>> {
        let mut reader = RecordReader::new(input, delim);
        let mut out = Vec::new();
        while let Some(r) = reader.next_record().unwrap() {
            out.push(r);
        }
        out
    }

    #[test]
    fn getline_semantics() {
        assert_eq!(records(b"a\nb\n", b"\n"), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(records(b"a\n\nb", b"\n"), vec![b"a".to_vec(), vec![], b"b".to_vec()]);
        assert_eq!(records(b"\n", b"\n"), vec![Vec::<u8>::new()]);
        assert!(records(b"", b"\n").is_empty());
    }

    #[test]
    fn multi_byte_delimiter() {
        assert_eq!(
            records(b"a\r\nb\rc\r\n", b"\r\n"),
            vec![b"a".to_vec(), b"b\rc".to_vec()]
        );
        // First occurrence wins on overlap.
        assert_eq!(records(b"xaaay", b"aa"), vec![b"x".to_vec(), b"ay".to_vec()]);
        assert_eq!(records(b"abc", b""), vec![b"abc".to_vec()]);
    }

    #[test]
    fn clean_delimiting() {
        assert!(delimits_cleanly(b"abc", b"\n"));
        assert!(!delimits_cleanly(b"a\nc", b"\n"));
        assert!(!delimits_cleanly(b"ba", b"aa"));
        assert_eq!(find(b"hello", b"ll"), Some(2));
        assert_eq!(find(b"hello", b"x"), None);
    }

    fn entries(input: &[u8], key_sep: &[u8], value_sep: Option<&[u8]>) -> Vec<Result<RawEntry, Vec<u8>>> {
        let mut reader = EntryReader::new(input, key_sep, value_sep);
        let mut out = Vec::new();
        while let Some(e) = reader.next_entry().unwrap() {
            out.push(e);
        }
        out
    }

    fn entry(key: &str, value: Option<&str>) -> Result<RawEntry, Vec<u8>> {
        Ok(RawEntry {
            key: key.as_bytes().to_vec(),
            value: value.map(|v| v.as_bytes().to_vec()),
        })
    }

    #[test]
    fn entry_tokenizing() {
        assert_eq!(
            entries(b"k\tv1\tv2\nbad\n", b"\t", Some(b"\n")),
            vec![entry("k", Some("v1\tv2")), Err(b"bad".to_vec())]
        );
        assert_eq!(
            entries(b"1\nabc\n2\ndef\n3\n", b"\n", Some(b"\n")),
            vec![entry("1", Some("abc")), entry("2", Some("def")), Err(b"3".to_vec())]
        );
        assert_eq!(entries(b"a b ", b" ", None), vec![entry("a", None), entry("b", None)]);
    }
}
