//! # Save Files
//!
//! A save stores the seed, the generator version and the diff log of every
//! edited chunk. Unedited chunks are regenerated on load.
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "LQSV"]
//! [4 bytes: format version]
//! [4 bytes: generator version]
//! [8 bytes: seed]
//! [4 bytes: record count]
//! [N bytes: LZ4 block (size prepended) of 16-byte edit records]
//! [4 bytes: CRC32 of everything above]
//! ```
//!
//! All integers are little-endian. Records are grouped by chunk, chunks in
//! ascending coordinate order, edits within a chunk in write order.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use lz4_flex::block::decompress;
use lz4_flex::compress_prepend_size;
use tracing::{info, warn};

use llamaquest_procedural::{Biome, ChunkCoord, LocalPos, TileMutation, WorldSeed, CHUNK_AREA, WORLDGEN_VERSION};

use crate::error::{WorldError, WorldResult};
use crate::store::{ChunkDiff, TileEdit};

/// Magic bytes identifying a save file.
const SAVE_MAGIC: &[u8; 4] = b"LQSV";

/// Current container format version.
pub const SAVE_FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 4;
const CRC_LEN: usize = 4;
const SIZE_PREFIX_LEN: usize = 4;

/// Upper bound on the LZ4 block expansion ratio.
const MAX_LZ4_RATIO: usize = 255;

const KIND_SET_BIOME: u8 = 0;
const KIND_SET_COST: u8 = 1;
const KIND_SET_OCCUPIED: u8 = 2;

/// One edit on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct EditRecord {
    chunk_x: i32,
    chunk_y: i32,
    tile: u16,
    kind: u8,
    flag: u8,
    value: u32,
}

impl EditRecord {
    fn encode(coord: ChunkCoord, edit: &TileEdit) -> Self {
        let (kind, flag, value) = match edit.mutation {
            TileMutation::SetBiome(biome) => (KIND_SET_BIOME, 0, u32::from(biome as u8)),
            TileMutation::SetCost(cost) => (KIND_SET_COST, 0, cost.to_bits()),
            TileMutation::SetOccupied(occupied) => (KIND_SET_OCCUPIED, u8::from(occupied), 0),
        };
        Self {
            chunk_x: coord.x.to_le(),
            chunk_y: coord.y.to_le(),
            tile: (edit.local.index() as u16).to_le(),
            kind,
            flag,
            value: value.to_le(),
        }
    }

    fn decode(self) -> WorldResult<(ChunkCoord, TileEdit)> {
        let coord = ChunkCoord::new(i32::from_le(self.chunk_x), i32::from_le(self.chunk_y));
        let tile = usize::from(u16::from_le(self.tile));
        if tile >= CHUNK_AREA {
            return Err(WorldError::CorruptSave(format!("tile index {tile} out of range")));
        }
        let value = u32::from_le(self.value);

        let mutation = match self.kind {
            KIND_SET_BIOME => {
                let biome = u8::try_from(value)
                    .ok()
                    .and_then(Biome::from_u8)
                    .ok_or_else(|| WorldError::CorruptSave(format!("unknown biome {value}")))?;
                TileMutation::SetBiome(biome)
            }
            KIND_SET_COST => TileMutation::SetCost(f32::from_bits(value))
                .validate()
                .map_err(|e| WorldError::CorruptSave(e.to_string()))?,
            KIND_SET_OCCUPIED => TileMutation::SetOccupied(self.flag != 0),
            other => return Err(WorldError::CorruptSave(format!("unknown edit kind {other}"))),
        };

        Ok((
            coord,
            TileEdit {
                local: LocalPos::from_index(tile),
                mutation,
            },
        ))
    }
}

/// Persisted world state.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveFile {
    /// World seed.
    pub seed: WorldSeed,
    /// Generator version the diffs were recorded against.
    pub version: u32,
    /// Edited chunks, in ascending coordinate order.
    pub chunks: Vec<ChunkDiff>,
}

impl SaveFile {
    /// A save for the current generator version.
    #[must_use]
    pub fn new(seed: WorldSeed, chunks: Vec<ChunkDiff>) -> Self {
        Self {
            seed,
            version: WORLDGEN_VERSION,
            chunks,
        }
    }

    /// Total recorded edits.
    #[must_use]
    pub fn edit_count(&self) -> usize {
        self.chunks.iter().map(|c| c.edits.len()).sum()
    }

    /// Serializes to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut diffs: Vec<&ChunkDiff> = self.chunks.iter().filter(|diff| !diff.edits.is_empty()).collect();
        diffs.sort_by_key(|diff| diff.coord);
        let records: Vec<EditRecord> = diffs
            .into_iter()
            .flat_map(|diff| diff.edits.iter().map(|edit| EditRecord::encode(diff.coord, edit)))
            .collect();
        let payload = compress_prepend_size(bytemuck::cast_slice(&records));

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
        buf.extend_from_slice(SAVE_MAGIC);
        buf.extend_from_slice(&SAVE_FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.seed.value().to_le_bytes());
        buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parses bytes produced by `encode`.
    ///
    /// # Errors
    ///
    /// `CorruptSave` for a bad magic, checksum or payload;
    /// `IncompatibleSave` for another format or generator version.
    pub fn decode(data: &[u8]) -> WorldResult<Self> {
        if data.len() < HEADER_LEN + CRC_LEN {
            return Err(WorldError::CorruptSave("file too short".to_string()));
        }
        if &data[0..4] != SAVE_MAGIC {
            return Err(WorldError::CorruptSave("bad magic".to_string()));
        }

        let (body, crc_bytes) = data.split_at(data.len() - CRC_LEN);
        let stored_crc = u32::from_le_bytes(read_array(crc_bytes));
        if crc32fast::hash(body) != stored_crc {
            return Err(WorldError::CorruptSave("checksum mismatch".to_string()));
        }

        let format = u32::from_le_bytes(read_array(&body[4..8]));
        if format != SAVE_FORMAT_VERSION {
            warn!(found = format, expected = SAVE_FORMAT_VERSION, "refusing save: unknown format");
            return Err(WorldError::IncompatibleSave {
                found: format,
                expected: SAVE_FORMAT_VERSION,
            });
        }
        let version = u32::from_le_bytes(read_array(&body[8..12]));
        if version != WORLDGEN_VERSION {
            warn!(found = version, expected = WORLDGEN_VERSION, "refusing save: generator version differs");
            return Err(WorldError::IncompatibleSave {
                found: version,
                expected: WORLDGEN_VERSION,
            });
        }
        let seed = WorldSeed::new(u64::from_le_bytes(read_array(&body[12..20])));
        let count = u32::from_le_bytes(read_array(&body[20..24])) as usize;

        let record_len = std::mem::size_of::<EditRecord>();
        let raw = Self::decompress_records(&body[HEADER_LEN..], count, record_len)?;

        let mut chunks: Vec<ChunkDiff> = Vec::new();
        for bytes in raw.chunks_exact(record_len) {
            let record: EditRecord = bytemuck::pod_read_unaligned(bytes);
            let (coord, edit) = record.decode()?;
            match chunks.last_mut() {
                Some(last) if last.coord == coord => last.edits.push(edit),
                Some(last) if last.coord > coord => {
                    return Err(WorldError::CorruptSave("chunks out of order".to_string()));
                }
                _ => chunks.push(ChunkDiff {
                    coord,
                    edits: vec![edit],
                }),
            }
        }

        Ok(Self { seed, version, chunks })
    }

    /// Checks the prepended size against the record count and the payload
    /// length before allocating anything.
    fn decompress_records(payload: &[u8], count: usize, record_len: usize) -> WorldResult<Vec<u8>> {
        if payload.len() < SIZE_PREFIX_LEN {
            return Err(WorldError::CorruptSave("missing payload size".to_string()));
        }
        let (prefix, block) = payload.split_at(SIZE_PREFIX_LEN);
        let declared = u32::from_le_bytes(read_array(prefix)) as usize;

        let expected = count
            .checked_mul(record_len)
            .ok_or_else(|| WorldError::CorruptSave(format!("record count {count} overflows")))?;
        if declared != expected {
            return Err(WorldError::CorruptSave(format!(
                "expected {count} records, payload declares {declared} bytes"
            )));
        }
        if expected > block.len().saturating_mul(MAX_LZ4_RATIO) {
            return Err(WorldError::CorruptSave(format!(
                "{} compressed bytes cannot hold {expected} bytes",
                block.len()
            )));
        }

        let raw = decompress(block, expected)
            .map_err(|e| WorldError::CorruptSave(format!("decompression failed: {e}")))?;
        if raw.len() != expected {
            return Err(WorldError::CorruptSave(format!(
                "expected {expected} bytes, payload holds {}",
                raw.len()
            )));
        }
        Ok(raw)
    }

    /// Writes the save to a file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> WorldResult<()> {
        let path = path.as_ref();
        let bytes = self.encode();
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(&bytes)?;
        file.flush()?;
        info!(
            path = %path.display(),
            chunks = self.chunks.len(),
            edits = self.edit_count(),
            bytes = bytes.len(),
            "world saved"
        );
        Ok(())
    }

    /// Reads a save from a file.
    ///
    /// # Errors
    ///
    /// `Io` if unreadable, otherwise as `decode`.
    pub fn read_from(path: impl AsRef<Path>) -> WorldResult<Self> {
        let path = path.as_ref();
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        let save = Self::decode(&data)?;
        info!(
            path = %path.display(),
            chunks = save.chunks.len(),
            edits = save.edit_count(),
            "world save read"
        );
        Ok(save)
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
