//! The fixed 64 byte container header and the zoom level directory that
//! follows it.

use std::io::{Read, Seek};

use byteordered::Endianness;

use crate::bbi::codec::{detect_endianness, read_at, FieldBuf};
use crate::bbi::error::BBIReadError;
use crate::bbi::{BBIFile, Summary, ZoomHeader, BIGBED_MAGIC, BIGWIG_MAGIC};

pub(crate) const HEADER_SIZE: usize = 64;
pub(crate) const ZOOM_HEADER_SIZE: usize = 24;
const TOTAL_SUMMARY_SIZE: usize = 40;

/// Header info for a bbi file
///
/// Note that info on internal properties like file offsets are not public.
/// Reading data is available through higher-level functions.
#[derive(Copy, Clone, Debug)]
pub struct BBIHeader {
    pub endianness: Endianness,
    pub version: u16,
    pub field_count: u16,
    pub defined_field_count: u16,

    pub(crate) zoom_levels: u16,
    pub(crate) chromosome_tree_offset: u64,
    pub(crate) full_data_offset: u64,
    pub(crate) full_index_offset: u64,
    pub(crate) auto_sql_offset: u64,
    pub(crate) total_summary_offset: u64,
    pub(crate) uncompress_buf_size: u32,
}

impl BBIHeader {
    pub fn zoom_levels(&self) -> u16 {
        self.zoom_levels
    }

    pub fn chromosome_tree_offset(&self) -> u64 {
        self.chromosome_tree_offset
    }

    pub fn full_data_offset(&self) -> u64 {
        self.full_data_offset
    }

    pub fn full_index_offset(&self) -> u64 {
        self.full_index_offset
    }

    pub fn auto_sql_offset(&self) -> u64 {
        self.auto_sql_offset
    }

    pub fn total_summary_offset(&self) -> u64 {
        self.total_summary_offset
    }

    /// The maximum size of a decompressed block, or 0 if blocks are stored
    /// uncompressed
    pub fn uncompress_buf_size(&self) -> u32 {
        self.uncompress_buf_size
    }

    pub fn is_compressed(&self) -> bool {
        self.uncompress_buf_size > 0
    }
}

/// Parses the container header at the start of `file`, along with the zoom
/// level directory immediately after it. Zoom headers are returned in file
/// order.
pub fn read_header<R: Read + Seek>(
    file: &mut R,
) -> Result<(BBIFile, BBIHeader, Vec<ZoomHeader>), BBIReadError> {
    let header_data = read_at(file, 0, HEADER_SIZE)?;

    let magic = [header_data[0], header_data[1], header_data[2], header_data[3]];
    let (filetype, endianness) = match (
        detect_endianness(magic, BIGWIG_MAGIC),
        detect_endianness(magic, BIGBED_MAGIC),
    ) {
        (Some(e), _) => (BBIFile::BigWig, e),
        (None, Some(e)) => (BBIFile::BigBed, e),
        (None, None) => {
            return Err(BBIReadError::UnknownMagic {
                what: "bigWig/bigBed",
                offset: 0,
                expected: BIGWIG_MAGIC,
                found: u32::from_be_bytes(magic),
            })
        }
    };

    let mut header_data = FieldBuf::with_offset(&header_data[4..], endianness, 4);
    let version = header_data.get_u16()?;
    let zoom_levels = header_data.get_u16()?;
    let chromosome_tree_offset = header_data.get_u64()?;
    let full_data_offset = header_data.get_u64()?;
    let full_index_offset = header_data.get_u64()?;
    let field_count = header_data.get_u16()?;
    let defined_field_count = header_data.get_u16()?;
    let auto_sql_offset = header_data.get_u64()?;
    let total_summary_offset = header_data.get_u64()?;
    let uncompress_buf_size = header_data.get_u32()?;
    let _reserved = header_data.get_u64()?;

    let header = BBIHeader {
        endianness,
        version,
        zoom_levels,
        chromosome_tree_offset,
        full_data_offset,
        full_index_offset,
        field_count,
        defined_field_count,
        auto_sql_offset,
        total_summary_offset,
        uncompress_buf_size,
    };

    let zoom_headers = read_zoom_headers(file, &header)?;

    Ok((filetype, header, zoom_headers))
}

fn read_zoom_headers<R: Read + Seek>(
    file: &mut R,
    header: &BBIHeader,
) -> Result<Vec<ZoomHeader>, BBIReadError> {
    let len = header.zoom_levels as usize * ZOOM_HEADER_SIZE;
    let data = read_at(file, HEADER_SIZE as u64, len)?;
    let mut data = FieldBuf::with_offset(&data, header.endianness, HEADER_SIZE as u64);

    let mut zoom_headers = Vec::with_capacity(header.zoom_levels as usize);
    for _ in 0..header.zoom_levels {
        let reduction_level = data.get_u32()?;
        let _reserved = data.get_u32()?;
        let data_offset = data.get_u64()?;
        let index_offset = data.get_u64()?;

        zoom_headers.push(ZoomHeader {
            reduction_level,
            data_offset,
            index_offset,
        });
    }

    Ok(zoom_headers)
}

/// Reads the whole-file summary block along with the data count at the start
/// of the full data section.
///
/// The summary block is always little-endian, whatever the byte order of the
/// rest of the file. For version 1 files there is no total summary; in that
/// case everything but `total_items` is 0.
pub fn read_total_summary<R: Read + Seek>(
    file: &mut R,
    header: &BBIHeader,
) -> Result<Summary, BBIReadError> {
    let mut summary = Summary::default();
    if header.total_summary_offset != 0 {
        let data = read_at(file, header.total_summary_offset, TOTAL_SUMMARY_SIZE)?;
        let mut data =
            FieldBuf::with_offset(&data, Endianness::Little, header.total_summary_offset);
        summary.bases_covered = data.get_u64()?;
        summary.min_val = data.get_f64()?;
        summary.max_val = data.get_f64()?;
        summary.sum = data.get_f64()?;
        summary.sum_squares = data.get_f64()?;
    }

    let data = read_at(file, header.full_data_offset, 8)?;
    summary.total_items =
        FieldBuf::with_offset(&data, header.endianness, header.full_data_offset).get_u64()?;

    Ok(summary)
}
