//! Line-oriented exchange format for a register's log.
//!
//! ```text
//! assert-root-hash\t<digest of the empty string>
//! add-item\t<canonical item payload>
//! append-entry\t<region>\t<key>\t<timestamp>\t<digest>[;<digest>...]
//! ```
//!
//! Every `append-entry` is preceded by the `add-item` lines of the payloads it
//! refers to, so a file can be replayed without any store.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::digest::Digest;
use crate::entry::{Entry, Region};

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("exchange stream does not start with assert-root-hash")]
    MissingRoot,
    #[error("root hash {0} is not the digest of the empty string")]
    RootMismatch(Digest),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("line {line}: invalid item payload: {source}")]
    InvalidPayload {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: entry refers to {digest}, which was never added")]
    UnknownItem { line: usize, digest: Digest },
}

/// A single line of an exchange stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    AssertRootHash(Digest),
    AddItem(String),
    AppendEntry(Entry),
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::AssertRootHash(digest) => write!(f, "assert-root-hash\t{}", digest),
            Line::AddItem(payload) => write!(f, "add-item\t{}", payload),
            Line::AppendEntry(entry) => write!(
                f,
                "append-entry\t{}\t{}\t{}\t{}",
                entry.region,
                entry.key,
                entry.timestamp_string(),
                entry.digest_list()
            ),
        }
    }
}

impl Line {
    /// Parses one line; `number` is only used for error reporting.
    pub fn parse(text: &str, number: usize) -> Result<Line, ExchangeError> {
        let malformed = |reason: String| ExchangeError::Malformed { line: number, reason };

        let (command, rest) = text
            .split_once('\t')
            .ok_or_else(|| malformed(format!("expected a tab-separated command, got {:?}", text)))?;

        match command {
            "assert-root-hash" => {
                let digest = rest.parse().map_err(|e| malformed(format!("{}", e)))?;
                Ok(Line::AssertRootHash(digest))
            }
            "add-item" => Ok(Line::AddItem(rest.to_string())),
            "append-entry" => {
                let parts: Vec<&str> = rest.split('\t').collect();
                let [region, key, timestamp, digests] = parts.as_slice() else {
                    return Err(malformed(format!(
                        "append-entry expects 4 fields, got {}",
                        parts.len()
                    )));
                };
                let region: Region = region.parse().map_err(|e| malformed(format!("{}", e)))?;
                let timestamp = DateTime::parse_from_rfc3339(timestamp)
                    .map_err(|e| malformed(format!("bad timestamp {:?}: {}", timestamp, e)))?
                    .with_timezone(&Utc);
                let digests = digests
                    .split(';')
                    .map(str::parse::<Digest>)
                    .collect::<Result<Vec<Digest>, _>>()
                    .map_err(|e| malformed(format!("{}", e)))?;
                Ok(Line::AppendEntry(Entry {
                    region,
                    key: key.to_string(),
                    timestamp,
                    digests,
                }))
            }
            other => Err(malformed(format!("unknown command {:?}", other))),
        }
    }
}

/// An in-memory exchange stream for one register.
///
/// Always begins with the root anchor, even when no data has been appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeLog {
    lines: Vec<Line>,
}

impl Default for ExchangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeLog {
    pub fn new() -> Self {
        ExchangeLog {
            lines: vec![Line::AssertRootHash(Digest::empty())],
        }
    }

    /// Records an entry together with the payloads it refers to.
    pub fn append<'a>(&mut self, entry: Entry, payloads: impl IntoIterator<Item = &'a str>) {
        self.lines
            .extend(payloads.into_iter().map(|p| Line::AddItem(p.to_string())));
        self.lines.push(Line::AppendEntry(entry));
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Entries in append order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.lines.iter().filter_map(|line| match line {
            Line::AppendEntry(entry) => Some(entry),
            _ => None,
        })
    }

    pub fn write_to(&self, mut writer: impl Write) -> io::Result<()> {
        for line in &self.lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.write_to(BufWriter::new(File::create(path)?))
    }

    /// Reads and checks an exchange stream.
    ///
    /// The first line must anchor the empty digest, every payload must be
    /// JSON, and every entry digest must name an item added earlier.
    pub fn parse(reader: impl BufRead) -> Result<Self, ExchangeError> {
        let mut lines = Vec::new();
        let mut known = HashSet::new();

        for (i, text) in reader.lines().enumerate() {
            let text = text?;
            let number = i + 1;
            if text.is_empty() {
                continue;
            }

            let line = Line::parse(&text, number)?;
            match (&line, lines.is_empty()) {
                (Line::AssertRootHash(root), true) => {
                    if *root != Digest::empty() {
                        return Err(ExchangeError::RootMismatch(*root));
                    }
                }
                (_, true) => return Err(ExchangeError::MissingRoot),
                (Line::AssertRootHash(_), false) => {
                    return Err(ExchangeError::Malformed {
                        line: number,
                        reason: "duplicate assert-root-hash".to_string(),
                    });
                }
                (Line::AddItem(payload), false) => {
                    serde_json::from_str::<serde_json::Value>(payload)
                        .map_err(|source| ExchangeError::InvalidPayload { line: number, source })?;
                    known.insert(Digest::of(payload.as_bytes()));
                }
                (Line::AppendEntry(entry), false) => {
                    if let Some(digest) = entry.digests.iter().find(|d| !known.contains(*d)) {
                        return Err(ExchangeError::UnknownItem {
                            line: number,
                            digest: *digest,
                        });
                    }
                }
            }
            lines.push(line);
        }

        if lines.is_empty() {
            return Err(ExchangeError::MissingRoot);
        }
        Ok(ExchangeLog { lines })
    }
}

impl fmt::Display for ExchangeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
