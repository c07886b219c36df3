//! The append-only text log behind the engine. One record per line,
//! `<id>,<word>,<flag>`, under a fixed header line. Every mutation of
//! the engine appends one line, so the file replays into the current
//! state: when several lines share an id, the last one wins.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::warn;

use crate::dictionary::WordId;
use crate::error::Result;

/// The literal first line of every log file.
pub const HEADER: &[u8] = "ID,単語,削除フラグ".as_bytes();

/// One parsed log line, before it reaches the dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: WordId,
    pub word: Vec<u8>,
    pub deleted: bool,
}

/// Parse one line into a record. The word is everything between the
/// first and the last comma, so it must be non-empty and the line
/// must hold at least two commas.
fn parse_line(line: &[u8]) -> Option<RawRecord> {
    // Tolerate files written on the other side of a CRLF world.
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let first = line.iter().position(|byte| *byte == b',')?;
    let last = line.iter().rposition(|byte| *byte == b',')?;

    if first == last {
        return None;
    }

    let id = std::str::from_utf8(&line[..first]).ok()?.parse().ok()?;

    let word = line[first + 1..last].to_vec();
    if word.is_empty() {
        return None;
    }

    let deleted = match &line[last + 1..] {
        b"0" => false,
        b"1" => true,
        _ => return None,
    };

    Some(RawRecord { id, word, deleted })
}

/// Replay the whole log into the set of current records, ascending by
/// id. A missing or empty file is an empty engine. Malformed lines
/// are reported and skipped, they never poison the rest of the file.
pub fn load(path: &Path) -> Result<Vec<RawRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };

    let mut latest: std::collections::BTreeMap<WordId, RawRecord> = std::collections::BTreeMap::new();
    let mut malformed = 0usize;

    for (number, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line?;

        if line.is_empty() || (number == 0 && line.strip_suffix(b"\r").unwrap_or(&line[..]) == HEADER) {
            continue;
        }

        match parse_line(&line) {
            Some(record) => {
                latest.insert(record.id, record);
            }
            None => {
                malformed += 1;
                warn!(
                    "skipping malformed log line {}: {:?}",
                    number + 1,
                    String::from_utf8_lossy(&line)
                );
            }
        }
    }

    if malformed > 0 {
        warn!("{} malformed line(s) skipped in {}", malformed, path.display());
    }

    // A surface form belongs to exactly one id. A file claiming
    // otherwise is damaged; the lowest id keeps the word.
    let mut seen: std::collections::HashSet<&[u8]> = std::collections::HashSet::new();
    let mut records = Vec::with_capacity(latest.len());
    for record in latest.values() {
        if seen.insert(&record.word) {
            records.push(record.clone());
        } else {
            warn!(
                "dropping record {}: word {:?} already owned by a lower id",
                record.id,
                String::from_utf8_lossy(&record.word)
            );
        }
    }

    Ok(records)
}

/// Writer half of the log. Opens in append mode, writes the header
/// when it creates the file, and flushes after every line so that a
/// crash loses at most the line being written.
#[derive(Debug)]
pub struct Appender {
    writer: BufWriter<File>,
}

impl Appender {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let fresh = file.metadata()?.len() == 0;

        let mut appender = Appender {
            writer: BufWriter::new(file),
        };

        if fresh {
            appender.writer.write_all(HEADER)?;
            appender.writer.write_all(b"\n")?;
            appender.writer.flush()?;
        }

        Ok(appender)
    }

    /// Append one record line and flush it.
    pub fn append(&mut self, id: WordId, word: &[u8], deleted: bool) -> Result<()> {
        write!(self.writer, "{},", id)?;
        self.writer.write_all(word)?;
        writeln!(self.writer, ",{}", if deleted { 1 } else { 0 })?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Write a whole fresh log, replacing anything at the path.
/// The generator uses this to lay out a synthetic corpus.
pub fn write_all<'a>(path: &Path, records: impl Iterator<Item = (WordId, &'a [u8], bool)>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    writer.write_all(HEADER)?;
    writer.write_all(b"\n")?;

    for (id, word, deleted) in records {
        write!(writer, "{},", id)?;
        writer.write_all(word)?;
        writeln!(writer, ",{}", if deleted { 1 } else { 0 })?;
    }

    writer.flush()?;
    Ok(())
}
