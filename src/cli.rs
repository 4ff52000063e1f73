//! Command line: build | read | lookup | schema
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use fasttrie::records::RecordReader;
use fasttrie::{Archive, BuildConfig, Builder, SchemaKind, SchemaNode, StagingMode, grammar};

const DEFAULT_FORMAT: &str = "T(c*)\n";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// build compact trie/hash containers from delimited text, and read them back
#[derive(Parser, Debug)]
#[command(version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// build a container from text records
    Build(BuildCmd),
    /// print instances of built containers as text
    Read(ReadCmd),
    /// look up keys from stdin in a built T(...) or H(...) container
    Lookup(LookupCmd),
    /// print the parsed schema tree as JSON
    Schema(SchemaCmd),
}

#[derive(Args, Debug, Clone)]
struct FormatArg {
    /// format string; separators may use escapes such as \n and \x1f
    #[arg(long, short)]
    format: Option<String>,
}

#[derive(Args, Debug)]
struct BuildCmd {
    #[command(flatten)]
    format: FormatArg,

    /// split the input into root instances at this separator (escaped like
    /// format separators); the whole input is one instance when omitted
    #[arg(long, short)]
    separator: Option<String>,

    /// stage intermediate payloads in temporary files instead of memory
    #[arg(long)]
    disk: bool,

    /// parent directory for disk staging (implies --disk)
    #[arg(long)]
    tmpdir: Option<PathBuf>,

    /// JSON build configuration; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// output container (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// input text (stdin if omitted)
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReadCmd {
    #[command(flatten)]
    format: FormatArg,

    /// print only this root instance
    #[arg(long)]
    instance: Option<u64>,

    /// containers to read; literal paths or quoted glob patterns
    #[arg(num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug)]
struct LookupCmd {
    #[command(flatten)]
    format: FormatArg,

    /// container to query
    archive: PathBuf,
}

#[derive(Args, Debug)]
struct SchemaCmd {
    #[command(flatten)]
    format: FormatArg,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl FormatArg {
    /// The flag, else the format stored in `stored`, else the default.
    fn resolve(&self, stored: Option<&[u8]>) -> Result<String> {
        match (&self.format, stored) {
            (Some(format), _) => Ok(format.clone()),
            (None, Some(bytes)) => Ok(fasttrie::embedded_format(bytes)?.to_string()),
            (None, None) => Ok(DEFAULT_FORMAT.to_string()),
        }
    }
}

impl BuildCmd {
    fn config(&self) -> Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::load(path)?,
            None => BuildConfig::default(),
        };
        if self.disk || self.tmpdir.is_some() {
            config.staging = StagingMode::Disk;
        }
        if let Some(dir) = &self.tmpdir {
            config.tmpdir = Some(dir.clone());
        }
        Ok(config)
    }

    fn run(&self) -> Result<()> {
        let schema = grammar::parse(&self.format.resolve(None)?)?;
        let separator = self
            .separator
            .as_deref()
            .map(grammar::unescape)
            .transpose()?;
        let builder = Builder::new(&schema, self.config()?);

        let input: Box<dyn BufRead> = match &self.input {
            Some(path) => Box::new(BufReader::new(
                File::open(path).with_context(|| format!("opening {}", path.display()))?,
            )),
            None => Box::new(io::stdin().lock()),
        };
        let outer = separator.as_ref().map(|s| s.as_bytes());

        let summary = match &self.out {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
                builder.build(input, outer, file)?
            }
            None => builder.build(input, outer, io::stdout().lock())?,
        };
        if summary.skipped > 0 {
            eprintln!("skipped {} malformed record(s)", summary.skipped);
        }
        Ok(())
    }
}

impl ReadCmd {
    fn run(&self) -> Result<()> {
        let mut stdout = BufWriter::new(io::stdout().lock());
        for path in resolve_file_path_patterns(&self.input)? {
            let bytes = read_file(&path)?;
            let schema = grammar::parse(&self.format.resolve(Some(&bytes))?)?;
            let archive =
                Archive::open(&schema, &bytes).with_context(|| format!("opening {}", path.display()))?;
            let instances = match self.instance {
                Some(i) => i..i + 1,
                None => 0..archive.instances(),
            };
            for i in instances {
                stdout.write_all(&archive.read_text(i)?)?;
            }
        }
        stdout.flush()?;
        Ok(())
    }
}

impl LookupCmd {
    fn run(&self) -> Result<()> {
        let bytes = read_file(&self.archive)?;
        let schema = grammar::parse(&self.format.resolve(Some(&bytes))?)?;
        let archive = Archive::open(&schema, &bytes)?;
        let delim = top_separator(&schema)?;

        let mut stdout = BufWriter::new(io::stdout().lock());
        let mut keys = RecordReader::new(io::stdin().lock(), delim);
        while let Some(key) = keys.next_record()? {
            // A key that does not parse is a miss.
            if let Ok(Some(hit)) = archive.lookup(&key) {
                stdout.write_all(&hit)?;
            }
            stdout.write_all(delim)?;
        }
        stdout.flush()?;
        Ok(())
    }
}

impl SchemaCmd {
    fn run(&self) -> Result<()> {
        let schema = grammar::parse(&self.format.resolve(None)?)?;
        println!("{}", serde_json::to_string_pretty(&schema)?);
        Ok(())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Build(cmd) => cmd.run(),
            Command::Read(cmd) => cmd.run(),
            Command::Lookup(cmd) => cmd.run(),
            Command::Schema(cmd) => cmd.run(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Keys are delimited like the root's entries: by the value separator of a
/// map, or by the key separator of a set.
fn top_separator(schema: &SchemaNode) -> Result<&[u8]> {
    match &schema.kind {
        SchemaKind::Keyed { value: Some(kv), .. } => Ok(kv.sep.as_bytes()),
        SchemaKind::Keyed { key_sep, .. } => Ok(key_sep.as_bytes()),
        _ => bail!("lookup needs a T(...) or H(...) format, got {:?}", schema.source),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(bytes)
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if !has_glob_chars(pattern) {
            out.push(PathBuf::from(pattern));
            continue;
        }
        let before = out.len();
        for entry in glob::glob(pattern)? {
            out.push(entry?);
        }
        if out.len() == before {
            bail!("glob pattern matched no files: {pattern}");
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_delimiter() {
        let map = grammar::parse(r"T(l)\n(c*)\t").unwrap();
        assert_eq!(top_separator(&map).unwrap(), b"\t");
        let set = grammar::parse("H(c*)\n").unwrap();
        assert_eq!(top_separator(&set).unwrap(), b"\n");
        assert!(top_separator(&grammar::parse("V(l)\n").unwrap()).is_err());
    }

    #[test]
    fn literal_and_glob_inputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.ft", "b.ft"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let pattern = format!("{}/*.ft", dir.path().display());
        let found = resolve_file_path_patterns([pattern.as_str(), "plain.ft"]).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[2], PathBuf::from("plain.ft"));

        let none = format!("{}/*.missing", dir.path().display());
        assert!(resolve_file_path_patterns([none]).is_err());
    }
}
