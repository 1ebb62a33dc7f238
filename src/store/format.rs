// async-btree/src/store/format.rs

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TreeError};

// --- Constants ---
pub const FILE_SIGNATURE: &[u8; 8] = b"ABTPAGES";
pub const FORMAT_VERSION: u8 = 0x01;

pub const TAG_FREE: u8 = 0x00;
pub const TAG_NODE: u8 = 0x01;
pub const TAG_VALUE: u8 = 0x02;
/// Allocated, not yet written.
pub const TAG_RESERVED: u8 = 0x03;

/// Page number meaning "none" in the superblock; page 0 is the superblock.
pub const NULL_PAGE: u64 = 0;

pub const SUPERBLOCK_SIZE: usize = 8 + 1 + 4 + 8 + 8 + 8 + 4;
pub const PAGE_HEADER_SIZE: usize = 1 + 4 + 4;
pub const MIN_PAGE_SIZE: usize = 64;

// --- Structures ---

/// Contents of page 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub page_size: u32,
    pub root_page: u64,
    /// Pages in the file, superblock included.
    pub page_count: u64,
    pub free_head: u64,
}

impl Superblock {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            root_page: NULL_PAGE,
            page_count: 1,
            free_head: NULL_PAGE,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let body = self.body()?;
        writer.write_all(&body)?;
        writer.write_u32::<BigEndian>(calculate_crc32(&body))?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut body = vec![0u8; SUPERBLOCK_SIZE - 4];
        reader.read_exact(&mut body)?;
        let checksum = reader.read_u32::<BigEndian>()?;
        if checksum != calculate_crc32(&body) {
            return Err(TreeError::ChecksumMismatch {
                context: "superblock".to_string(),
            });
        }

        let mut cursor = body.as_slice();
        let mut signature = [0u8; 8];
        cursor.read_exact(&mut signature)?;
        if &signature != FILE_SIGNATURE {
            return Err(TreeError::InvalidFileFormat(format!(
                "bad signature {:?}",
                signature
            )));
        }
        let version = cursor.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(TreeError::InvalidFileFormat(format!(
                "unsupported format version {}",
                version
            )));
        }
        Ok(Self {
            page_size: cursor.read_u32::<BigEndian>()?,
            root_page: cursor.read_u64::<BigEndian>()?,
            page_count: cursor.read_u64::<BigEndian>()?,
            free_head: cursor.read_u64::<BigEndian>()?,
        })
    }

    fn body(&self) -> std::io::Result<Vec<u8>> {
        let mut body = Vec::with_capacity(SUPERBLOCK_SIZE - 4);
        body.write_all(FILE_SIGNATURE)?;
        body.write_u8(FORMAT_VERSION)?;
        body.write_u32::<BigEndian>(self.page_size)?;
        body.write_u64::<BigEndian>(self.root_page)?;
        body.write_u64::<BigEndian>(self.page_count)?;
        body.write_u64::<BigEndian>(self.free_head)?;
        Ok(body)
    }
}

/// Header in front of every record page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub tag: u8,
    pub payload_length: u32,
    pub payload_checksum: u32,
}

impl PageHeader {
    pub fn for_payload(tag: u8, payload: &[u8]) -> Result<Self> {
        let payload_length = u32::try_from(payload.len()).map_err(|_| TreeError::RecordTooLarge {
            size: payload.len(),
            capacity: u32::MAX as usize,
        })?;
        Ok(Self {
            tag,
            payload_length,
            payload_checksum: calculate_crc32(payload),
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(self.tag)?;
        writer.write_u32::<BigEndian>(self.payload_length)?;
        writer.write_u32::<BigEndian>(self.payload_checksum)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let tag = reader.read_u8()?;
        let payload_length = reader.read_u32::<BigEndian>()?;
        let payload_checksum = reader.read_u32::<BigEndian>()?;
        Ok(Self { tag, payload_length, payload_checksum })
    }
}

/// Lays out one full page: header, payload, zero padding.
pub fn encode_page(tag: u8, payload: &[u8], page_size: usize) -> Result<Vec<u8>> {
    let capacity = page_size - PAGE_HEADER_SIZE;
    if payload.len() > capacity {
        return Err(TreeError::RecordTooLarge {
            size: payload.len(),
            capacity,
        });
    }
    let mut page = Vec::with_capacity(page_size);
    PageHeader::for_payload(tag, payload)?.write_to(&mut page)?;
    page.write_all(payload)?;
    page.resize(page_size, 0);
    Ok(page)
}

/// Splits a page into its header and verified payload.
pub fn decode_page(page: &[u8], page_no: u64) -> Result<(PageHeader, &[u8])> {
    let mut cursor = page;
    let header = PageHeader::read_from(&mut cursor)?;
    let end = PAGE_HEADER_SIZE + header.payload_length as usize;
    if end > page.len() {
        return Err(TreeError::InvalidFileFormat(format!(
            "page {} claims {} payload bytes",
            page_no, header.payload_length
        )));
    }
    let payload = &page[PAGE_HEADER_SIZE..end];
    if calculate_crc32(payload) != header.payload_checksum {
        return Err(TreeError::ChecksumMismatch {
            context: format!("page {}", page_no),
        });
    }
    Ok((header, payload))
}

// Utility for checksums
pub fn calculate_crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
