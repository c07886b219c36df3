//! Binary snapshot of the rebuildable indices, written next to the
//! text log as `<log>.cache`. Loading it back skips the expensive
//! part of a cold start; the dictionary and the BK-tree are always
//! replayed from the text anyway. Two format versions share the same
//! 4-byte magic scheme: v1 carries the two ordered sets, v2 adds the
//! 2-gram and length indices. All integers are little-endian so a
//! snapshot survives a machine change.
//!
//! A snapshot is only usable while it is strictly newer than the text
//! log. Anything else about it that does not add up (magic, short
//! read, counts) discards it and the caller falls back to a rebuild;
//! a bad snapshot can never corrupt the engine, the decoded state is
//! committed only once the whole file has been read.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};

use crate::error::{Error, Result};
use crate::idset::IdSet;
use crate::index::{GramIndex, Indexes, LengthIndex, OrderedIndex};
use crate::interner::Interner;

const MAGIC_V1: &[u8; 4] = b"LTC1";
const MAGIC_V2: &[u8; 4] = b"LTC2";

/// What a load call managed to bring back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loaded {
    /// No usable snapshot: build everything from the text log.
    Nothing,
    /// v1: prefix and suffix sets are in place.
    PrefixSuffix,
    /// v2: prefix, suffix, gram and length indices are in place.
    Full,
}

/// The snapshot sits next to its text log, same name plus `.cache`.
pub fn sibling_path(text_path: &Path) -> PathBuf {
    let mut path = text_path.as_os_str().to_os_string();
    path.push(".cache");
    PathBuf::from(path)
}

/// Save a v2 snapshot of the four rebuildable indices.
pub fn save(path: &Path, indexes: &Indexes) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    writer.write_all(MAGIC_V2)?;
    write_ordered(&mut writer, &indexes.prefix)?;
    write_ordered(&mut writer, &indexes.suffix)?;
    write_grams(&mut writer, &indexes.grams)?;
    write_lengths(&mut writer, &indexes.lengths)?;
    writer.flush()?;

    info!("snapshot saved to {}", path.display());
    Ok(())
}

/// Try to restore the indices from the snapshot next to `text_path`.
/// On any problem the indexes are left untouched and the caller is
/// told to rebuild; staleness and decode failures are only warnings.
pub fn load(text_path: &Path, interner: &mut Interner, indexes: &mut Indexes) -> Loaded {
    let path = sibling_path(text_path);

    if !is_fresh(&path, text_path) {
        return Loaded::Nothing;
    }

    match read_file(&path, interner) {
        Ok((loaded, prefix, suffix, grams, lengths)) => {
            indexes.prefix = prefix;
            indexes.suffix = suffix;
            if let (Some(grams), Some(lengths)) = (grams, lengths) {
                indexes.grams = grams;
                indexes.lengths = lengths;
            }
            info!("snapshot {} loaded ({:?})", path.display(), loaded);
            loaded
        }
        Err(error) => {
            warn!("discarding snapshot {}: {}", path.display(), error);
            Loaded::Nothing
        }
    }
}

/// Strictly newer than the text log, and both actually there.
fn is_fresh(snapshot_path: &Path, text_path: &Path) -> bool {
    let snapshot_time = match std::fs::metadata(snapshot_path).and_then(|meta| meta.modified()) {
        Ok(time) => time,
        Err(_) => return false,
    };
    let text_time = match std::fs::metadata(text_path).and_then(|meta| meta.modified()) {
        Ok(time) => time,
        Err(_) => return false,
    };

    snapshot_time > text_time
}

type Decoded = (
    Loaded,
    OrderedIndex,
    OrderedIndex,
    Option<GramIndex>,
    Option<LengthIndex>,
);

fn read_file(path: &Path, interner: &mut Interner) -> Result<Decoded> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;

    let full = match &magic {
        MAGIC_V1 => false,
        MAGIC_V2 => true,
        _ => return Err(Error::Snapshot("unknown magic")),
    };

    let prefix = read_ordered(&mut reader, interner)?;
    let suffix = read_ordered(&mut reader, interner)?;

    if !full {
        return Ok((Loaded::PrefixSuffix, prefix, suffix, None, None));
    }

    let grams = read_grams(&mut reader)?;
    let lengths = read_lengths(&mut reader)?;

    Ok((Loaded::Full, prefix, suffix, Some(grams), Some(lengths)))
}

fn write_string(writer: &mut impl Write, bytes: &[u8]) -> Result<()> {
    let length =
        u16::try_from(bytes.len()).map_err(|_| Error::Snapshot("string too long for u16"))?;
    writer.write_u16::<LittleEndian>(length)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_string(reader: &mut impl Read) -> Result<Vec<u8>> {
    let length = reader.read_u16::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn write_ordered(writer: &mut impl Write, index: &OrderedIndex) -> Result<()> {
    let count =
        u32::try_from(index.len()).map_err(|_| Error::Snapshot("too many words for u32"))?;
    writer.write_u32::<LittleEndian>(count)?;

    for word in index.iter() {
        write_string(writer, word)?;
    }
    Ok(())
}

fn read_ordered(reader: &mut impl Read, interner: &mut Interner) -> Result<OrderedIndex> {
    let count = reader.read_u32::<LittleEndian>()?;
    let mut index = OrderedIndex::new();

    for _ in 0..count {
        let bytes = read_string(reader)?;
        if bytes.is_empty() {
            return Err(Error::Snapshot("empty word in ordered set"));
        }
        index.insert(interner.intern(&bytes));
    }
    Ok(index)
}

fn write_ids(writer: &mut impl Write, ids: &IdSet) -> Result<()> {
    let count = u32::try_from(ids.len()).map_err(|_| Error::Snapshot("too many ids for u32"))?;
    writer.write_u32::<LittleEndian>(count)?;

    for id in ids.iter() {
        writer.write_u32::<LittleEndian>(id)?;
    }
    Ok(())
}

fn read_ids(reader: &mut impl Read) -> Result<IdSet> {
    let count = reader.read_u32::<LittleEndian>()?;
    let mut ids = IdSet::new();

    for _ in 0..count {
        ids.add(reader.read_u32::<LittleEndian>()?);
    }
    Ok(ids)
}

fn write_grams(writer: &mut impl Write, index: &GramIndex) -> Result<()> {
    let count =
        u32::try_from(index.len()).map_err(|_| Error::Snapshot("too many grams for u32"))?;
    writer.write_u32::<LittleEndian>(count)?;

    // The map iterates in hash order; sort so identical indices
    // serialize identically.
    let mut entries: Vec<_> = index.iter().collect();
    entries.sort_by_key(|(gram, _)| **gram);

    for (gram, ids) in entries {
        write_string(writer, &gram[..])?;
        write_ids(writer, ids)?;
    }
    Ok(())
}

fn read_grams(reader: &mut impl Read) -> Result<GramIndex> {
    let count = reader.read_u32::<LittleEndian>()?;
    let mut index = GramIndex::new();

    for _ in 0..count {
        let bytes = read_string(reader)?;
        let gram: [u8; 2] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Snapshot("gram key is not 2 bytes"))?;
        index.insert_raw(gram, read_ids(reader)?);
    }
    Ok(index)
}

fn write_lengths(writer: &mut impl Write, index: &LengthIndex) -> Result<()> {
    let count =
        u32::try_from(index.len()).map_err(|_| Error::Snapshot("too many buckets for u32"))?;
    writer.write_u32::<LittleEndian>(count)?;

    for (length, ids) in index.iter() {
        let length =
            u16::try_from(length).map_err(|_| Error::Snapshot("length too long for u16"))?;
        writer.write_u16::<LittleEndian>(length)?;
        write_ids(writer, ids)?;
    }
    Ok(())
}

fn read_lengths(reader: &mut impl Read) -> Result<LengthIndex> {
    let count = reader.read_u32::<LittleEndian>()?;
    let mut index = LengthIndex::new();

    for _ in 0..count {
        let length = reader.read_u16::<LittleEndian>()? as usize;
        index.insert_raw(length, read_ids(reader)?);
    }
    Ok(index)
}
