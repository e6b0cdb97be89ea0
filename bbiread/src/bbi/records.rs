//! Decoders for the contents of (decompressed) data blocks.
//!
//! Offsets in errors returned from here are relative to the start of the
//! decompressed block.

use byteordered::Endianness;

use crate::bbi::codec::FieldBuf;
use crate::bbi::error::BBIReadError;
use crate::bbi::{BedEntry, Summary, Value, ZoomRecord};

const SECTION_HEADER_SIZE: usize = 24;
const ZOOM_RECORD_SIZE: usize = 32;

/// How the items of a bigWig section are encoded
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SectionType {
    /// Each item has its own start, end and value
    BedGraph,
    /// Each item has a start and value; all share the section's span
    VarStep,
    /// Each item is only a value; starts advance by the section's step
    FixedStep,
}

impl SectionType {
    pub fn from_tag(tag: u8) -> Option<SectionType> {
        match tag {
            1 => Some(SectionType::BedGraph),
            2 => Some(SectionType::VarStep),
            3 => Some(SectionType::FixedStep),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            SectionType::BedGraph => 1,
            SectionType::VarStep => 2,
            SectionType::FixedStep => 3,
        }
    }
}

/// A decoded bigWig data block
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub chrom_id: u32,
    pub chrom_start: u32,
    pub chrom_end: u32,
    pub item_step: u32,
    pub item_span: u32,
    pub section_type: SectionType,
    pub items: Vec<Value>,
}

fn add_bases(offset: u64, base: u32, add: u32) -> Result<u32, BBIReadError> {
    base.checked_add(add).ok_or_else(|| {
        BBIReadError::invalid(offset, format!("Item position overflows: {} + {}", base, add))
    })
}

/// Decodes a bigWig section: a 24 byte header followed by `itemCount` items
/// in one of three encodings.
pub fn decode_section(bytes: &[u8], endianness: Endianness) -> Result<Section, BBIReadError> {
    let mut data = FieldBuf::new(bytes, endianness);
    if data.remaining() < SECTION_HEADER_SIZE {
        return Err(BBIReadError::Truncated {
            offset: 0,
            needed: SECTION_HEADER_SIZE,
            available: data.remaining(),
        });
    }

    let chrom_id = data.get_u32()?;
    let chrom_start = data.get_u32()?;
    let chrom_end = data.get_u32()?;
    let item_step = data.get_u32()?;
    let item_span = data.get_u32()?;
    let tag_offset = data.offset();
    let tag = data.get_u8()?;
    let _reserved = data.get_u8()?;
    let item_count = data.get_u16()?;

    let section_type = SectionType::from_tag(tag).ok_or_else(|| {
        BBIReadError::invalid(tag_offset, format!("Unknown bigwig section type: {}", tag))
    })?;

    let mut items = Vec::with_capacity(item_count as usize);
    match section_type {
        SectionType::BedGraph => {
            for _ in 0..item_count {
                let start = data.get_u32()?;
                let end = data.get_u32()?;
                let value = data.get_f32()?;
                items.push(Value { start, end, value });
            }
        }
        SectionType::VarStep => {
            for _ in 0..item_count {
                let offset = data.offset();
                let start = data.get_u32()?;
                let value = data.get_f32()?;
                let end = add_bases(offset, start, item_span)?;
                items.push(Value { start, end, value });
            }
        }
        SectionType::FixedStep => {
            let mut curr_start = chrom_start;
            for i in 0..item_count {
                let offset = data.offset();
                let value = data.get_f32()?;
                let start = curr_start;
                let end = add_bases(offset, start, item_span)?;
                if i + 1 < item_count {
                    curr_start = add_bases(offset, curr_start, item_step)?;
                }
                items.push(Value { start, end, value });
            }
        }
    }

    Ok(Section {
        chrom_id,
        chrom_start,
        chrom_end,
        item_step,
        item_span,
        section_type,
        items,
    })
}

/// Decodes a block of fixed-size zoom records.
pub fn decode_zoom_records(
    bytes: &[u8],
    endianness: Endianness,
) -> Result<Vec<ZoomRecord>, BBIReadError> {
    if bytes.len() % ZOOM_RECORD_SIZE != 0 {
        return Err(BBIReadError::invalid(
            (bytes.len() - bytes.len() % ZOOM_RECORD_SIZE) as u64,
            format!(
                "Zoom block of {} bytes is not a whole number of {} byte records",
                bytes.len(),
                ZOOM_RECORD_SIZE
            ),
        ));
    }

    let itemcount = bytes.len() / ZOOM_RECORD_SIZE;
    let mut data = FieldBuf::new(bytes, endianness);
    let mut records = Vec::with_capacity(itemcount);
    for _ in 0..itemcount {
        let chrom = data.get_u32()?;
        let start = data.get_u32()?;
        let end = data.get_u32()?;
        let bases_covered = u64::from(data.get_u32()?);
        let min_val = f64::from(data.get_f32()?);
        let max_val = f64::from(data.get_f32()?);
        let sum = f64::from(data.get_f32()?);
        let sum_squares = f64::from(data.get_f32()?);
        records.push(ZoomRecord {
            chrom,
            start,
            end,
            summary: Summary {
                total_items: 0,
                bases_covered,
                min_val,
                max_val,
                sum,
                sum_squares,
            },
        });
    }
    Ok(records)
}

/// Decodes a bigBed block: back-to-back `(chromId, start, end, rest\0)`
/// entries. Returns each entry with its chromosome id.
pub fn decode_bed_entries(
    bytes: &[u8],
    endianness: Endianness,
) -> Result<Vec<(u32, BedEntry)>, BBIReadError> {
    let mut data = FieldBuf::new(bytes, endianness);
    let mut entries = vec![];
    while !data.is_empty() {
        let chrom_id = data.get_u32()?;
        let start = data.get_u32()?;
        let end = data.get_u32()?;
        let rest_offset = data.offset();
        let rest_len = bytes[rest_offset as usize..]
            .iter()
            .position(|b| *b == b'\0')
            .ok_or_else(|| BBIReadError::invalid(rest_offset, "Unterminated bed entry"))?;
        let rest = std::str::from_utf8(data.bytes(rest_len)?)
            .map_err(|_| BBIReadError::invalid(rest_offset, "Invalid utf-8 in bed entry"))?
            .to_owned();
        data.skip(1)?;
        entries.push((chrom_id, BedEntry { start, end, rest }));
    }
    Ok(entries)
}
