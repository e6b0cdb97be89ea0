//! The chromosome R ("cir") tree, mapping (chromosome id, base) ranges to the
//! data blocks that cover them.
//!
//! Node keys are ordered first by chromosome id and then by base. They are
//! only an ordering: a key spanning `1:500` to `3:20` says nothing about
//! positions on chromosome 2 beyond "everything in between".

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::io::{Read, Seek, SeekFrom};

use byteordered::Endianness;
use log::{debug, trace};
use smallvec::{smallvec, SmallVec};

use crate::bbi::bbiread::BBIFileRead;
use crate::bbi::codec::{read_at, read_magic, FieldBuf};
use crate::bbi::error::BBIReadError;
use crate::bbi::CIR_TREE_MAGIC;

pub(crate) const CIR_TREE_HEADER_SIZE: u64 = 48;
const NODE_HEADER_SIZE: u64 = 4;
const LEAF_ITEM_SIZE: usize = 32;
const NON_LEAF_ITEM_SIZE: usize = 24;

/// The header of a cir tree index, either for the full data or for a zoom
/// level.
#[derive(Copy, Clone, Debug)]
pub struct CirTreeHeader {
    pub endianness: Endianness,
    /// The maximum number of children in any node
    pub block_size: u32,
    pub item_count: u64,
    pub start_chrom_ix: u32,
    pub start_base: u32,
    pub end_chrom_ix: u32,
    pub end_base: u32,
    pub end_file_offset: u64,
    pub items_per_slot: u32,
    pub(crate) root_offset: u64,
    pub(crate) file_len: u64,
}

/// A compressed (or not) block of data in a bbi file, along with the key of
/// the leaf that points to it.
///
/// Blocks sort by `(start_chrom_ix, end_chrom_ix, start_base, end_base)`,
/// then by location in the file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pub start_chrom_ix: u32,
    pub start_base: u32,
    pub end_chrom_ix: u32,
    pub end_base: u32,
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

impl Block {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        (
            self.start_chrom_ix,
            self.end_chrom_ix,
            self.start_base,
            self.end_base,
            self.offset,
            self.size,
        )
            .cmp(&(
                other.start_chrom_ix,
                other.end_chrom_ix,
                other.start_base,
                other.end_base,
                other.offset,
                other.size,
            ))
    }
}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct CirTreeNodeLeaf {
    start_chrom_ix: u32,
    start_base: u32,
    end_chrom_ix: u32,
    end_base: u32,
    data_offset: u64,
    data_size: u64,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct CirTreeNodeNonLeaf {
    start_chrom_ix: u32,
    start_base: u32,
    end_chrom_ix: u32,
    end_base: u32,
    node_offset: u64,
}

#[derive(Clone, Debug)]
pub(crate) enum CirTreeNode {
    Leaf(Vec<CirTreeNodeLeaf>),
    NonLeaf(Vec<CirTreeNodeNonLeaf>),
}

/// Reads the cir tree header at `offset`. The byte order is detected from the
/// tree's own magic; the root node immediately follows the header.
pub fn read_cir_tree_header<R: Read + Seek>(
    file: &mut R,
    offset: u64,
) -> Result<CirTreeHeader, BBIReadError> {
    let endianness = read_magic(file, offset, CIR_TREE_MAGIC, "cir tree")?;
    let data = read_at(file, offset + 4, CIR_TREE_HEADER_SIZE as usize - 4)?;
    let mut data = FieldBuf::with_offset(&data, endianness, offset + 4);

    let block_size = data.get_u32()?;
    let item_count = data.get_u64()?;
    let start_chrom_ix = data.get_u32()?;
    let start_base = data.get_u32()?;
    let end_chrom_ix = data.get_u32()?;
    let end_base = data.get_u32()?;
    let end_file_offset = data.get_u64()?;
    let items_per_slot = data.get_u32()?;
    let _reserved = data.get_u32()?;

    if block_size == 0 {
        return Err(BBIReadError::invalid(offset + 4, "Cir tree block size is 0"));
    }

    let file_len = file.seek(SeekFrom::End(0))?;

    Ok(CirTreeHeader {
        endianness,
        block_size,
        item_count,
        start_chrom_ix,
        start_base,
        end_chrom_ix,
        end_base,
        end_file_offset,
        items_per_slot,
        root_offset: offset + CIR_TREE_HEADER_SIZE,
        file_len,
    })
}

/// Reads and validates the node at `node_offset`.
pub(crate) fn read_node<R: Read + Seek>(
    file: &mut R,
    header: &CirTreeHeader,
    node_offset: u64,
) -> Result<CirTreeNode, BBIReadError> {
    let data = read_at(file, node_offset, NODE_HEADER_SIZE as usize)?;
    let mut data = FieldBuf::with_offset(&data, header.endianness, node_offset);
    let isleaf = data.get_u8()?;
    let _reserved = data.get_u8()?;
    let count = data.get_u16()?;

    if isleaf > 1 {
        return Err(BBIReadError::invalid(
            node_offset,
            format!("Unexpected isleaf: {}", isleaf),
        ));
    }
    if u32::from(count) > header.block_size {
        return Err(BBIReadError::invalid(
            node_offset,
            format!(
                "Node has {} children, more than the block size of {}",
                count, header.block_size
            ),
        ));
    }
    trace!(
        "Cir tree node at {}: isleaf={} count={}",
        node_offset,
        isleaf,
        count
    );

    let items_offset = node_offset + NODE_HEADER_SIZE;
    let item_size = if isleaf == 1 {
        LEAF_ITEM_SIZE
    } else {
        NON_LEAF_ITEM_SIZE
    };
    let data = read_at(file, items_offset, item_size * count as usize)?;
    let mut data = FieldBuf::with_offset(&data, header.endianness, items_offset);

    let node = if isleaf == 1 {
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let item_offset = data.offset();
            let item = CirTreeNodeLeaf {
                start_chrom_ix: data.get_u32()?,
                start_base: data.get_u32()?,
                end_chrom_ix: data.get_u32()?,
                end_base: data.get_u32()?,
                data_offset: data.get_u64()?,
                data_size: data.get_u64()?,
            };
            let in_file = item
                .data_offset
                .checked_add(item.data_size)
                .map_or(false, |end| end <= header.file_len);
            if !in_file {
                return Err(BBIReadError::invalid(
                    item_offset,
                    format!(
                        "Data block ({} bytes at {}) lies outside the file ({} bytes)",
                        item.data_size, item.data_offset, header.file_len
                    ),
                ));
            }
            items.push(item);
        }
        CirTreeNode::Leaf(items)
    } else {
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let item_offset = data.offset();
            let item = CirTreeNodeNonLeaf {
                start_chrom_ix: data.get_u32()?,
                start_base: data.get_u32()?,
                end_chrom_ix: data.get_u32()?,
                end_base: data.get_u32()?,
                node_offset: data.get_u64()?,
            };
            let in_file = item
                .node_offset
                .checked_add(NODE_HEADER_SIZE)
                .map_or(false, |end| end <= header.file_len);
            if !in_file {
                return Err(BBIReadError::invalid(
                    item_offset,
                    format!(
                        "Child node at {} lies outside the file ({} bytes)",
                        item.node_offset, header.file_len
                    ),
                ));
            }
            items.push(item);
        }
        CirTreeNode::NonLeaf(items)
    };
    Ok(node)
}

#[inline]
fn compare_position(chrom1: u32, chrom1_base: u32, chrom2: u32, chrom2_base: u32) -> Ordering {
    (chrom1, chrom1_base).cmp(&(chrom2, chrom2_base))
}

/// Whether the half-open query `chromq:[start, end)` overlaps a node key
/// spanning `chromb1:start_base` to `chromb2:end_base`.
#[inline]
pub fn overlaps(
    chromq: u32,
    chromq_start: u32,
    chromq_end: u32,
    chromb1: u32,
    chromb1_start: u32,
    chromb2: u32,
    chromb2_end: u32,
) -> bool {
    compare_position(chromq, chromq_end, chromb1, chromb1_start) == Ordering::Greater
        && compare_position(chromq, chromq_start, chromb2, chromb2_end) == Ordering::Less
}

/// Splits a node into the child nodes to visit next and the blocks to emit.
pub(crate) fn nodes_overlapping(
    node: &CirTreeNode,
    chrom_ix: u32,
    start: u32,
    end: u32,
) -> (SmallVec<[u64; 4]>, SmallVec<[Block; 4]>) {
    match node {
        CirTreeNode::Leaf(items) => {
            let mut blocks: SmallVec<[_; 4]> = smallvec![];
            for child in items {
                let block_overlaps = overlaps(
                    chrom_ix,
                    start,
                    end,
                    child.start_chrom_ix,
                    child.start_base,
                    child.end_chrom_ix,
                    child.end_base,
                );
                if block_overlaps {
                    blocks.push(Block {
                        start_chrom_ix: child.start_chrom_ix,
                        start_base: child.start_base,
                        end_chrom_ix: child.end_chrom_ix,
                        end_base: child.end_base,
                        offset: child.data_offset,
                        size: child.data_size,
                    });
                }
            }
            (smallvec![], blocks)
        }
        CirTreeNode::NonLeaf(items) => {
            let mut new_childblocks: SmallVec<[_; 4]> = smallvec![];
            for child in items {
                let block_overlaps = overlaps(
                    chrom_ix,
                    start,
                    end,
                    child.start_chrom_ix,
                    child.start_base,
                    child.end_chrom_ix,
                    child.end_base,
                );
                if block_overlaps {
                    new_childblocks.push(child.node_offset);
                }
            }
            (new_childblocks, smallvec![])
        }
    }
}

/// Finds every data block whose leaf key overlaps `chrom_ix:[start, end)`.
///
/// Every overlapping child of an internal node is visited, since sibling
/// keys may overlap. A chromosome outside the header's bounds gives an empty
/// result.
pub fn search_cir_tree<R: BBIFileRead>(
    file: &mut R,
    header: &CirTreeHeader,
    chrom_ix: u32,
    start: u32,
    end: u32,
) -> Result<BTreeSet<Block>, BBIReadError> {
    let mut blocks = BTreeSet::new();
    if header.item_count == 0
        || chrom_ix < header.start_chrom_ix
        || chrom_ix > header.end_chrom_ix
    {
        return Ok(blocks);
    }

    let mut visited = HashSet::new();
    let mut remaining_childblocks = VecDeque::with_capacity(64);
    remaining_childblocks.push_front(header.root_offset);
    while let Some(node_offset) = remaining_childblocks.pop_front() {
        if !visited.insert(node_offset) {
            return Err(BBIReadError::invalid(
                node_offset,
                "Cir tree node is reachable more than once",
            ));
        }
        let (new_childblocks, new_blocks) =
            file.blocks_for_cir_tree_node(header, node_offset, chrom_ix, start, end)?;
        for child in new_childblocks.into_iter().rev() {
            remaining_childblocks.push_front(child);
        }
        blocks.extend(new_blocks);
    }

    debug!(
        "Found {} blocks overlapping {}:{}-{} ({} nodes visited)",
        blocks.len(),
        chrom_ix,
        start,
        end,
        visited.len()
    );
    Ok(blocks)
}
