// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Chunk discovery for RIFF and IFF containers.
//!
//! Chunks are located by walking every byte offset and comparing four-byte
//! identifiers instead of hopping from header to header by declared size.
//! Files written by samplers and editors routinely carry chunk sizes that are
//! off by one or that ignore pad bytes, and the walk tolerates both.

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

/// Byte order of the size fields in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// RIFF (WAV)
    Little,
    /// IFF (AIFF)
    Big,
}

impl Endian {
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(bytes),
            Endian::Big => BigEndian::read_u32(bytes),
        }
    }
}

/// A chunk found in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub id: [u8; 4],
    /// Offset of the chunk identifier in the file.
    pub offset: usize,
    /// Size as declared by the chunk header.
    pub declared_size: u32,
    /// Chunk payload, clamped to the end of the file.
    pub data: &'a [u8],
}

impl Chunk<'_> {
    /// True when the declared size runs past the end of the file.
    pub fn is_truncated(&self) -> bool {
        self.data.len() < self.declared_size as usize
    }
}

/// Finds every occurrence of the given chunk identifiers at or after `start`.
/// Results are in file order.
pub fn scan<'a>(bytes: &'a [u8], start: usize, ids: &[&[u8; 4]], endian: Endian) -> Vec<Chunk<'a>> {
    let mut chunks = Vec::new();
    if bytes.len() < 8 {
        return chunks;
    }

    for offset in start..=bytes.len() - 8 {
        let window = &bytes[offset..offset + 4];
        if let Some(id) = ids.iter().find(|id| window == id.as_slice()) {
            let declared_size = endian.read_u32(&bytes[offset + 4..offset + 8]);
            let data_start = offset + 8;
            let data_end = data_start
                .saturating_add(declared_size as usize)
                .min(bytes.len());
            chunks.push(Chunk {
                id: **id,
                offset,
                declared_size,
                data: &bytes[data_start..data_end],
            });
        }
    }
    chunks
}

/// The first chunk with the given identifier.
pub fn first<'a, 'b>(chunks: &'b [Chunk<'a>], id: &[u8; 4]) -> Option<&'b Chunk<'a>> {
    chunks.iter().find(|chunk| &chunk.id == id)
}

/// Every chunk with the given identifier, in file order.
pub fn all<'a, 'b>(chunks: &'b [Chunk<'a>], id: &'b [u8; 4]) -> impl Iterator<Item = &'b Chunk<'a>> {
    chunks.iter().filter(move |chunk| &chunk.id == id)
}

/// Finds a sub-chunk inside a chunk payload (for example `ISBJ` inside `LIST`).
pub fn find_sub_chunk<'a>(data: &'a [u8], id: &[u8; 4], endian: Endian) -> Option<Chunk<'a>> {
    scan(data, 0, &[id], endian).into_iter().next()
}

/// Writes a chunk header followed by its payload and a pad byte when the payload is odd.
pub fn write_chunk<W: Write>(
    writer: &mut W,
    id: &[u8; 4],
    payload: &[u8],
    endian: Endian,
) -> std::io::Result<()> {
    writer.write_all(id)?;
    match endian {
        Endian::Little => writer.write_u32::<LittleEndian>(payload.len() as u32)?,
        Endian::Big => writer.write_u32::<BigEndian>(payload.len() as u32)?,
    }
    writer.write_all(payload)?;
    if payload.len() % 2 == 1 {
        writer.write_u8(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_ignores_declared_sizes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF\0\0\0\0WAVE");
        // A chunk claiming to be far larger than it is.
        write_chunk(&mut bytes, b"junk", &[1, 2, 3, 4], Endian::Little).unwrap();
        bytes[16..20].copy_from_slice(&1000u32.to_le_bytes());
        write_chunk(&mut bytes, b"fmt ", &[9; 16], Endian::Little).unwrap();

        let chunks = scan(&bytes, 12, &[b"junk", b"fmt "], Endian::Little);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_truncated());
        let fmt = first(&chunks, b"fmt ").unwrap();
        assert_eq!(fmt.offset, 24);
        assert_eq!(fmt.data, &[9; 16]);
    }

    #[test]
    fn test_big_endian_sizes() {
        let mut bytes = Vec::new();
        write_chunk(&mut bytes, b"COMM", &[0; 18], Endian::Big).unwrap();
        assert_eq!(&bytes[4..8], &[0, 0, 0, 18]);
        let chunks = scan(&bytes, 0, &[b"COMM"], Endian::Big);
        assert_eq!(chunks[0].declared_size, 18);
        assert_eq!(chunks[0].data.len(), 18);
    }

    #[test]
    fn test_odd_payload_is_padded() {
        let mut bytes = Vec::new();
        write_chunk(&mut bytes, b"data", &[1, 2, 3], Endian::Little).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
    }

    #[test]
    fn test_short_input() {
        assert!(scan(b"RIFF", 0, &[b"RIFF"], Endian::Little).is_empty());
        assert!(find_sub_chunk(b"INFOISBJ", b"ISBJ", Endian::Little).is_none());
    }
}
