use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use fasttrie::{Archive, BuildConfig, BuildError, Builder, Scalar, StagingMode, Value, grammar};

fn build(format: &str, input: &[u8], outer: Option<&[u8]>, config: BuildConfig) -> (fasttrie::SchemaNode, Vec<u8>, u64) {
    let schema = grammar::parse(format).unwrap();
    let mut out = Vec::new();
    let summary = Builder::new(&schema, config).build(input, outer, &mut out).unwrap();
    assert_eq!(summary.bytes_written, out.len() as u64);
    (schema, out, summary.skipped)
}

fn disk_config(dir: &Path) -> BuildConfig {
    BuildConfig {
        staging: StagingMode::Disk,
        tmpdir: Some(dir.to_path_buf()),
    }
}

fn configs(dir: &Path) -> [BuildConfig; 2] {
    [BuildConfig::default(), disk_config(dir)]
}

fn int(v: i32) -> Value {
    Value::Scalar(Scalar::I32(v))
}

fn bytes(s: &str) -> Value {
    Value::Bytes(s.as_bytes().to_vec())
}

#[test]
fn map_lookup_scenario() {
    let (schema, out, skipped) = build("T(l)\n(c*)\n", b"1\nabc\n2\ndef\n", None, BuildConfig::default());
    assert_eq!(skipped, 0);
    let archive = Archive::open(&schema, &out).unwrap();
    assert_eq!(archive.lookup(b"1").unwrap(), Some(b"abc".to_vec()));
    assert_eq!(archive.lookup(b"2").unwrap(), Some(b"def".to_vec()));
    assert_eq!(archive.lookup(b"3").unwrap(), None);
}

#[test]
fn malformed_elements_are_skipped() {
    let (schema, out, skipped) = build("V(l)\n", b"1\nX\n3\n", None, BuildConfig::default());
    assert_eq!(skipped, 1);
    let archive = Archive::open(&schema, &out).unwrap();
    assert_eq!(archive.read(0).unwrap(), Value::Seq(vec![int(1), int(3)]));
}

#[test]
fn scrambled_keys_are_reordered() {
    let input = b"50\tfifty\n7\tseven\n-3\tminus three\n1000\tthousand\n7\tSEVEN\n0\tzero\n";
    let expected: BTreeMap<&str, &str> = [
        ("50", "fifty"),
        ("7", "SEVEN"),
        ("-3", "minus three"),
        ("1000", "thousand"),
        ("0", "zero"),
    ]
    .into_iter()
    .collect();

    let dir = tempfile::tempdir().unwrap();
    for format in ["T(l)\t(c*)\n", "H(l)\t(c*)\n"] {
        for config in configs(dir.path()) {
            let (schema, out, _) = build(format, input, None, config);
            let archive = Archive::open(&schema, &out).unwrap();
            for (key, value) in &expected {
                assert_eq!(
                    archive.lookup(key.as_bytes()).unwrap().as_deref(),
                    Some(value.as_bytes()),
                    "{format:?} key {key}"
                );
            }
            assert_eq!(archive.lookup(b"8").unwrap(), None);

            let Value::Keyed(entries) = archive.read(0).unwrap() else { panic!() };
            assert_eq!(entries.len(), expected.len());
            for (k, v) in entries {
                let Value::Scalar(Scalar::I32(k)) = k else { panic!("{k:?}") };
                let v = v.unwrap();
                assert_eq!(v, bytes(expected[k.to_string().as_str()]));
            }
        }
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn trie_stores_keys_in_byte_order() {
    let (schema, out, _) = build("T(c*)\n", b"pear\napple\nfig\n", None, BuildConfig::default());
    let archive = Archive::open(&schema, &out).unwrap();
    assert_eq!(archive.read_text(0).unwrap(), b"apple\nfig\npear\n");
    assert_eq!(archive.lookup(b"fig").unwrap(), Some(b"1".to_vec()));
    assert_eq!(archive.lookup(b"plum").unwrap(), None);
}

#[test]
fn nested_sequences_in_a_map() {
    let dir = tempfile::tempdir().unwrap();
    for config in configs(dir.path()) {
        let (schema, out, _) = build("T(c*)\t(V(l),)\n", b"b\t3,4,\na\t1,\n", None, config);
        let archive = Archive::open(&schema, &out).unwrap();
        assert_eq!(archive.lookup(b"b").unwrap(), Some(b"3,4,".to_vec()));
        assert_eq!(
            archive.read(0).unwrap(),
            Value::Keyed(vec![
                (bytes("a"), Some(Value::Seq(vec![int(1)]))),
                (bytes("b"), Some(Value::Seq(vec![int(3), int(4)]))),
            ])
        );
    }
}

#[test]
fn pairs_inside_a_sequence() {
    let (schema, out, skipped) = build("V(P(l)\t(c*))\n", b"1\tabc\n2\tdef\nno tab\n", None, BuildConfig::default());
    assert_eq!(skipped, 1);
    let archive = Archive::open(&schema, &out).unwrap();
    assert_eq!(
        archive.read(0).unwrap(),
        Value::Seq(vec![
            Value::pair(int(1), bytes("abc")),
            Value::pair(int(2), bytes("def")),
        ])
    );
    assert_eq!(archive.read_text(0).unwrap(), b"1\tabc\n2\tdef\n");
}

#[test]
fn pair_second_side_keeps_the_pair_separator() {
    let schema = grammar::parse("P(l)\t(c*)").unwrap();
    let decoded = fasttrie::codec::decode(&schema, b"5\tx\ty").unwrap();

    let (schema, out, skipped) = build("P(l)\t(c*)", b"5\tx\ty", None, BuildConfig::default());
    assert_eq!(skipped, 0);
    let archive = Archive::open(&schema, &out).unwrap();
    assert_eq!(archive.instances(), 1);
    assert_eq!(archive.read(0).unwrap(), decoded);
    assert_eq!(decoded, Value::pair(int(5), bytes("x\ty")));
}

#[test]
fn pairs_with_tabbed_values_inside_a_sequence() {
    let input = b"1\ta\tb\n2\tc\n";
    let dir = tempfile::tempdir().unwrap();
    for config in configs(dir.path()) {
        let (schema, out, skipped) = build("V(P(l)\t(c*))\n", input, None, config);
        assert_eq!(skipped, 0);
        let archive = Archive::open(&schema, &out).unwrap();
        assert_eq!(archive.read(0).unwrap(), fasttrie::codec::decode(&schema, input).unwrap());
        assert_eq!(archive.read_text(0).unwrap(), input);
    }
}

#[test]
fn root_pairs_split_by_outer_separator() {
    let (schema, out, skipped) = build("P(l)\t(c*)", b"1\ta\tb\n2\tc\nbad\n", Some(&b"\n"[..]), BuildConfig::default());
    assert_eq!(skipped, 1);
    let archive = Archive::open(&schema, &out).unwrap();
    assert_eq!(archive.instances(), 2);
    assert_eq!(archive.read(0).unwrap(), Value::pair(int(1), bytes("a\tb")));
    assert_eq!(archive.read(1).unwrap(), Value::pair(int(2), bytes("c")));
}

#[test]
fn malformed_root_pair_has_no_instances() {
    let (schema, out, skipped) = build("P(l)\t(c*)", b"no separator", None, BuildConfig::default());
    assert_eq!(skipped, 1);
    let archive = Archive::open(&schema, &out).unwrap();
    assert_eq!(archive.instances(), 0);
}

#[test]
fn root_instances_split_by_outer_separator() {
    let (schema, out, _) = build("T(c*)\n", b"a\nb\n\nc\n\n", Some(&b"\n\n"[..]), BuildConfig::default());
    let archive = Archive::open(&schema, &out).unwrap();
    assert_eq!(archive.instances(), 2);
    assert_eq!(archive.lookup_in(0, b"b").unwrap(), Some(b"1".to_vec()));
    assert_eq!(archive.lookup_in(0, b"c").unwrap(), None);
    assert_eq!(archive.lookup_in(1, b"c").unwrap(), Some(b"1".to_vec()));
    assert_eq!(archive.read_text(1).unwrap(), b"c\n");
}

#[test]
fn utf16_units() {
    let input = b"\xC3\xA9\n\xE2\x82\xAC\n\x80\n\xF0\x9F\x98\x80\n";
    let (schema, out, _) = build("V(u)\n", input, None, BuildConfig::default());
    let archive = Archive::open(&schema, &out).unwrap();
    let units = [0xE9, 0x20AC, 0xFFFD, 0xFFFD].map(|u| Value::Scalar(Scalar::Utf16(u)));
    assert_eq!(archive.read(0).unwrap(), Value::Seq(units.to_vec()));
    assert_eq!(
        archive.read_text(0).unwrap(),
        "é\n€\n\u{FFFD}\n\u{FFFD}\n".as_bytes()
    );
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
}

#[test]
fn disk_staging_is_removed_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let schema = grammar::parse("T(l)\n(c*)\n").unwrap();
    let result = Builder::new(&schema, disk_config(dir.path())).build(&b"1\nabc\n"[..], None, BrokenPipe);
    assert!(matches!(result, Err(BuildError::Io(_))));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn missing_tmpdir_is_a_staging_error() {
    let dir = tempfile::tempdir().unwrap();
    let schema = grammar::parse("V(l)\n").unwrap();
    let config = disk_config(&dir.path().join("does-not-exist"));
    let result = Builder::new(&schema, config).build(&b"1\n"[..], None, Vec::new());
    assert!(result.is_err());
}
