pub(crate) mod bbiread;
pub(crate) mod bigbedread;
pub(crate) mod bigwigread;
pub mod block;
pub mod chromtree;
pub mod cirtree;
pub mod codec;
pub(crate) mod error;
pub mod header;
pub mod records;

pub const BIGWIG_MAGIC: u32 = 0x888F_FC26;
pub const BIGBED_MAGIC: u32 = 0x8789_F2EB;

pub const CIR_TREE_MAGIC: u32 = 0x2468_ACE0;
pub const CHROM_TREE_MAGIC: u32 = 0x78CA_8C91;

/// Info on a specific zoom level in a bbi file
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ZoomHeader {
    /// The number of bases summarized by each record at this level
    pub reduction_level: u32,
    pub(crate) data_offset: u64,
    pub(crate) index_offset: u64,
}

impl ZoomHeader {
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn index_offset(&self) -> u64 {
        self.index_offset
    }
}

/// A single zoom item
///
/// `summary.bases_covered` holds the record's valid count and
/// `summary.total_items` is always 0.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ZoomRecord {
    pub chrom: u32,
    pub start: u32,
    pub end: u32,
    pub summary: Summary,
}

/// A summary of a section of data (may be an entire file)
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Summary {
    pub total_items: u64,
    pub bases_covered: u64,
    pub min_val: f64,
    pub max_val: f64,
    pub sum: f64,
    pub sum_squares: f64,
}

/// Represents a single value in a bigWig file
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Value {
    pub start: u32,
    pub end: u32,
    pub value: f32,
}

/// Represents a single entry in a bigBed file
#[derive(Clone, Debug, PartialEq)]
pub struct BedEntry {
    pub start: u32,
    pub end: u32,
    pub rest: String,
}

/// The type of bbi file
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BBIFile {
    BigWig,
    BigBed,
}

impl BBIFile {
    pub fn magic(&self) -> u32 {
        match self {
            BBIFile::BigWig => BIGWIG_MAGIC,
            BBIFile::BigBed => BIGBED_MAGIC,
        }
    }
}

pub use bbiread::*;
pub use bigbedread::*;
pub use bigwigread::*;
pub use block::{decompress, read_block};
pub use chromtree::{find_chrom, read_chrom_tree_header, read_chroms, ChromInfo, ChromTreeHeader};
pub use cirtree::{read_cir_tree_header, search_cir_tree, Block, CirTreeHeader};
pub use error::BBIReadError;
pub use header::{read_header, read_total_summary, BBIHeader};
pub use records::{decode_bed_entries, decode_section, decode_zoom_records, Section, SectionType};
