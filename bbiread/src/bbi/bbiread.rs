use std::collections::btree_set;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;

use log::debug;
use smallvec::SmallVec;

use crate::bbi::block::read_block_data;
use crate::bbi::chromtree::{find_chrom, read_chrom_tree_header, read_chroms};
use crate::bbi::cirtree::{
    nodes_overlapping, read_cir_tree_header, read_node, search_cir_tree, CirTreeNode,
};
use crate::bbi::header::{read_header, read_total_summary};
use crate::bbi::records::decode_zoom_records;
use crate::bbi::{
    BBIFile, BBIHeader, BBIReadError, BigBedRead, BigWigRead, Block, ChromInfo, ChromTreeHeader,
    CirTreeHeader, Summary, ZoomHeader, ZoomRecord,
};
use crate::utils::reopen::{Reopen, ReopenableFile, SeekableRead};

// Past this many entries, a cache is dropped wholesale
const MAX_CACHED_ENTRIES: usize = 5000;

/// Info on a bbi file
#[derive(Clone, Debug)]
pub struct BBIFileInfo {
    /// The type of the bbi file - either a bigBed or a bigWig
    pub filetype: BBIFile,
    /// Header info
    pub header: BBIHeader,
    /// Info on zooms in the bbi file, in file order
    pub zoom_headers: Vec<ZoomHeader>,
    /// The chromosome info the bbi file is based on, in tree order
    pub chrom_info: Vec<ChromInfo>,
    /// The header of the chromosome tree
    pub chrom_tree: ChromTreeHeader,
}

impl BBIFileInfo {
    pub(crate) fn chrom_id(&self, chrom_name: &str) -> Result<u32, BBIReadError> {
        self.chrom_info
            .iter()
            .find(|c| c.name == chrom_name)
            .map(|c| c.id)
            .ok_or_else(|| BBIReadError::InvalidChromosome(chrom_name.to_owned()))
    }
}

/// Reads the container header, the zoom directory, and every chromosome.
pub(crate) fn read_info<R: Read + Seek>(file: &mut R) -> Result<BBIFileInfo, BBIReadError> {
    let (filetype, header, zoom_headers) = read_header(file)?;
    let chrom_tree = read_chrom_tree_header(file, header.chromosome_tree_offset)?;
    let chrom_info = read_chroms(file, &chrom_tree)?;

    debug!(
        "Opened {:?} (version {}, {:?}): {} zoom levels, {} chromosomes",
        filetype,
        header.version,
        header.endianness,
        zoom_headers.len(),
        chrom_info.len()
    );

    Ok(BBIFileInfo {
        filetype,
        header,
        zoom_headers,
        chrom_info,
        chrom_tree,
    })
}

/// The source of bytes behind a bbi handle.
///
/// Any `Read + Seek + Send` type is a `BBIFileRead` that reads everything
/// straight from the source. `CachedBBIFileRead` keeps tree nodes and block
/// data around for the lifetime of the handle instead.
pub trait BBIFileRead {
    type Reader: Read + Seek;

    /// Reads a block, decompressing it if the file is compressed
    fn get_block_data(&mut self, info: &BBIFileInfo, block: &Block)
        -> Result<Vec<u8>, BBIReadError>;

    /// Reads the cir tree node at `node_offset`, returning the offsets of
    /// children to visit and the blocks that overlap the query.
    fn blocks_for_cir_tree_node(
        &mut self,
        header: &CirTreeHeader,
        node_offset: u64,
        chrom_ix: u32,
        start: u32,
        end: u32,
    ) -> Result<(SmallVec<[u64; 4]>, SmallVec<[Block; 4]>), BBIReadError>;

    fn raw_reader(&mut self) -> &mut Self::Reader;
}

impl<S: SeekableRead> BBIFileRead for S {
    type Reader = Self;

    fn get_block_data(
        &mut self,
        info: &BBIFileInfo,
        block: &Block,
    ) -> Result<Vec<u8>, BBIReadError> {
        read_block_data(self, block, info.header.uncompress_buf_size)
    }

    fn blocks_for_cir_tree_node(
        &mut self,
        header: &CirTreeHeader,
        node_offset: u64,
        chrom_ix: u32,
        start: u32,
        end: u32,
    ) -> Result<(SmallVec<[u64; 4]>, SmallVec<[Block; 4]>), BBIReadError> {
        let node = read_node(self, header, node_offset)?;
        Ok(nodes_overlapping(&node, chrom_ix, start, end))
    }

    fn raw_reader(&mut self) -> &mut Self::Reader {
        self
    }
}

/// A `BBIFileRead` that caches decoded cir tree nodes and decompressed
/// blocks.
///
/// The file is assumed not to change while cached; to pick up changes, open
/// a new handle.
pub struct CachedBBIFileRead<S: SeekableRead> {
    read: S,
    cir_tree_node_map: HashMap<u64, CirTreeNode>,
    block_data: HashMap<Block, Vec<u8>>,
}

impl<S: SeekableRead> CachedBBIFileRead<S> {
    pub fn new(read: S) -> Self {
        CachedBBIFileRead {
            read,
            cir_tree_node_map: HashMap::new(),
            block_data: HashMap::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.read
    }
}

impl<S: SeekableRead> BBIFileRead for CachedBBIFileRead<S> {
    type Reader = S;

    fn get_block_data(
        &mut self,
        info: &BBIFileInfo,
        block: &Block,
    ) -> Result<Vec<u8>, BBIReadError> {
        if let Some(data) = self.block_data.get(block) {
            return Ok(data.clone());
        }
        if self.block_data.len() >= MAX_CACHED_ENTRIES {
            self.block_data.clear();
        }
        let data = read_block_data(&mut self.read, block, info.header.uncompress_buf_size)?;
        self.block_data.insert(*block, data.clone());
        Ok(data)
    }

    fn blocks_for_cir_tree_node(
        &mut self,
        header: &CirTreeHeader,
        node_offset: u64,
        chrom_ix: u32,
        start: u32,
        end: u32,
    ) -> Result<(SmallVec<[u64; 4]>, SmallVec<[Block; 4]>), BBIReadError> {
        if self.cir_tree_node_map.len() >= MAX_CACHED_ENTRIES {
            self.cir_tree_node_map.clear();
        }
        let node = match self.cir_tree_node_map.entry(node_offset) {
            Entry::Occupied(node) => node.into_mut(),
            Entry::Vacant(e) => e.insert(read_node(&mut self.read, header, node_offset)?),
        };
        Ok(nodes_overlapping(node, chrom_ix, start, end))
    }

    fn raw_reader(&mut self) -> &mut Self::Reader {
        &mut self.read
    }
}

impl<R: Reopen + SeekableRead> Reopen for CachedBBIFileRead<R> {
    fn reopen(&self) -> io::Result<Self> {
        Ok(Self {
            read: self.read.reopen()?,
            cir_tree_node_map: self.cir_tree_node_map.clone(),
            block_data: self.block_data.clone(),
        })
    }
}

/// Generic methods for reading a bbi file
pub trait BBIRead {
    type Read: BBIFileRead;

    /// Get basic info about the bbi file
    fn info(&self) -> &BBIFileInfo;

    /// Gets a reader to the underlying file
    fn reader(&mut self) -> &mut Self::Read;

    fn reader_and_info(&mut self) -> (&mut Self::Read, &BBIFileInfo);

    /// The chromosomes in the file, in the order they are stored
    fn chroms(&self) -> &[ChromInfo] {
        &self.info().chrom_info
    }

    /// A mapping from chromosome name to id, ordered by name
    fn chrom_ids(&self) -> BTreeMap<String, u32> {
        self.chroms()
            .iter()
            .map(|c| (c.name.clone(), c.id))
            .collect()
    }

    /// Looks up a single chromosome in the file's chromosome tree, without
    /// using the chromosomes read when opening.
    fn find_chrom(&mut self, chrom_name: &str) -> Result<Option<ChromInfo>, BBIReadError> {
        let (read, info) = self.reader_and_info();
        find_chrom(read.raw_reader(), &info.chrom_tree, chrom_name)
    }

    /// Gets the summary of the whole file. `total_items` is the number of
    /// records in the full data section.
    fn get_summary(&mut self) -> Result<Summary, BBIReadError> {
        let (read, info) = self.reader_and_info();
        read_total_summary(read.raw_reader(), &info.header)
    }

    /// Reads the header of the index for the full data
    fn full_data_cir_tree(&mut self) -> Result<CirTreeHeader, BBIReadError> {
        let (read, info) = self.reader_and_info();
        read_cir_tree_header(read.raw_reader(), info.header.full_index_offset)
    }

    /// Reads the header of the index for the zoom level with the given
    /// reduction level
    fn zoom_cir_tree(&mut self, reduction_level: u32) -> Result<CirTreeHeader, BBIReadError> {
        let (read, info) = self.reader_and_info();
        let zoom_header = info
            .zoom_headers
            .iter()
            .find(|h| h.reduction_level == reduction_level)
            .ok_or(BBIReadError::ReductionLevelNotFound(reduction_level))?;
        read_cir_tree_header(read.raw_reader(), zoom_header.index_offset)
    }

    /// Gets the zoom records of the given reduction level that overlap
    /// `chrom_name:[start, end)`.
    fn get_zoom_interval<'a>(
        &'a mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
        reduction_level: u32,
    ) -> Result<ZoomIntervalIter<'a, Self>, BBIReadError>
    where
        Self: Sized,
    {
        let chrom = self.info().chrom_id(chrom_name)?;
        let header = self.zoom_cir_tree(reduction_level)?;
        let blocks = search_cir_tree(self.reader(), &header, chrom, start, end)?;
        Ok(ZoomIntervalIter {
            bbifile: self,
            blocks: blocks.into_iter(),
            vals: None,
            chrom,
            start,
            end,
        })
    }
}

/// Finds the blocks of the full data that overlap `chrom_name:[start, end)`.
pub(crate) fn get_overlapping_blocks<B: BBIRead>(
    bbifile: &mut B,
    chrom_name: &str,
    start: u32,
    end: u32,
) -> Result<(u32, btree_set::IntoIter<Block>), BBIReadError> {
    let chrom = bbifile.info().chrom_id(chrom_name)?;
    let header = bbifile.full_data_cir_tree()?;
    let blocks = search_cir_tree(bbifile.reader(), &header, chrom, start, end)?;
    Ok((chrom, blocks.into_iter()))
}

fn get_zoom_block_values<B: BBIRead>(
    bbifile: &mut B,
    block: &Block,
    chrom: u32,
    start: u32,
    end: u32,
) -> Result<Vec<ZoomRecord>, BBIReadError> {
    let (read, info) = bbifile.reader_and_info();
    let data = read.get_block_data(info, block)?;
    let mut records = decode_zoom_records(&data, info.header.endianness)?;
    records.retain(|r| r.chrom == chrom && r.end > start && r.start < end);
    Ok(records)
}

/// Zoom records overlapping a query, one block at a time
pub struct ZoomIntervalIter<'a, B: BBIRead> {
    bbifile: &'a mut B,
    blocks: btree_set::IntoIter<Block>,
    vals: Option<std::vec::IntoIter<ZoomRecord>>,
    chrom: u32,
    start: u32,
    end: u32,
}

impl<'a, B: BBIRead> Iterator for ZoomIntervalIter<'a, B> {
    type Item = Result<ZoomRecord, BBIReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.vals {
                Some(vals) => match vals.next() {
                    Some(v) => {
                        return Some(Ok(v));
                    }
                    None => {
                        self.vals = None;
                    }
                },
                None => {
                    let current_block = self.blocks.next()?;
                    match get_zoom_block_values(
                        self.bbifile,
                        &current_block,
                        self.chrom,
                        self.start,
                        self.end,
                    ) {
                        Ok(vals) => {
                            self.vals = Some(vals.into_iter());
                        }
                        Err(e) => {
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

/// Either a bigWig or a bigBed, as determined by the file's magic
pub enum GenericBBIRead<R> {
    BigWig(BigWigRead<R>),
    BigBed(BigBedRead<R>),
}

impl<R: BBIFileRead> BBIRead for GenericBBIRead<R> {
    type Read = R;

    fn info(&self) -> &BBIFileInfo {
        match self {
            GenericBBIRead::BigWig(b) => b.info(),
            GenericBBIRead::BigBed(b) => b.info(),
        }
    }

    fn reader(&mut self) -> &mut Self::Read {
        match self {
            GenericBBIRead::BigWig(b) => b.reader(),
            GenericBBIRead::BigBed(b) => b.reader(),
        }
    }

    fn reader_and_info(&mut self) -> (&mut Self::Read, &BBIFileInfo) {
        match self {
            GenericBBIRead::BigWig(b) => b.reader_and_info(),
            GenericBBIRead::BigBed(b) => b.reader_and_info(),
        }
    }
}

impl<R> GenericBBIRead<R> {
    pub fn bigwig(self) -> Option<BigWigRead<R>> {
        match self {
            GenericBBIRead::BigWig(b) => Some(b),
            GenericBBIRead::BigBed(_) => None,
        }
    }

    pub fn bigbed(self) -> Option<BigBedRead<R>> {
        match self {
            GenericBBIRead::BigBed(b) => Some(b),
            GenericBBIRead::BigWig(_) => None,
        }
    }
}

impl<R: BBIFileRead> GenericBBIRead<R> {
    /// Opens a generic bbi file for a given type that implements both `Read` and `Seek`
    pub fn open(mut read: R) -> Result<Self, BBIReadError> {
        let info = read_info(read.raw_reader())?;
        match info.filetype {
            BBIFile::BigWig => Ok(GenericBBIRead::BigWig(BigWigRead { info, read })),
            BBIFile::BigBed => Ok(GenericBBIRead::BigBed(BigBedRead { info, read })),
        }
    }
}

impl GenericBBIRead<ReopenableFile> {
    /// Opens a generic bbi file
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, BBIReadError> {
        let path = path.as_ref();
        let reopen = ReopenableFile {
            path: path.to_owned(),
            file: File::open(path)?,
        };
        let b = GenericBBIRead::open(reopen);
        if let Err(e) = &b {
            debug!("Error when opening {}: {}", path.display(), e);
        }
        b
    }
}

impl<R: Reopen> Reopen for GenericBBIRead<R> {
    fn reopen(&self) -> io::Result<Self> {
        Ok(match self {
            GenericBBIRead::BigWig(b) => GenericBBIRead::BigWig(b.reopen()?),
            GenericBBIRead::BigBed(b) => GenericBBIRead::BigBed(b.reopen()?),
        })
    }
}
