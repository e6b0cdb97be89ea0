//! The chromosome B+ tree, mapping chromosome names to the numeric ids used
//! everywhere else in the file.

use std::io::{Read, Seek};

use byteordered::Endianness;
use itertools::Itertools;
use log::trace;

use crate::bbi::codec::{read_at, read_magic, FieldBuf};
use crate::bbi::error::BBIReadError;
use crate::bbi::CHROM_TREE_MAGIC;

const CHROM_TREE_HEADER_SIZE: u64 = 32;
const NODE_HEADER_SIZE: u64 = 4;
// Trees deeper than this can't come from any sane block size
const MAX_DEPTH: usize = 64;
const MAX_KEY_SIZE: u32 = 255;

/// Information on a chromosome in a bbi file
#[derive(Clone, Debug)]
pub struct ChromInfo {
    pub name: String,
    pub length: u32,
    pub(crate) id: u32,
}

impl ChromInfo {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl PartialEq for ChromInfo {
    fn eq(&self, other: &ChromInfo) -> bool {
        self.name == other.name
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ChromTreeHeader {
    pub endianness: Endianness,
    /// The maximum number of children in any node
    pub block_size: u32,
    pub key_size: u32,
    pub val_size: u32,
    pub item_count: u64,
    pub(crate) root_offset: u64,
}

#[derive(Clone, Debug)]
struct ChromTreeLeafItem {
    key: Vec<u8>,
    chrom_id: u32,
    chrom_size: u32,
}

#[derive(Clone, Debug)]
struct ChromTreeNonLeafItem {
    key: Vec<u8>,
    child_offset: u64,
}

#[derive(Clone, Debug)]
enum ChromTreeNode {
    Leaf(Vec<ChromTreeLeafItem>),
    NonLeaf(Vec<ChromTreeNonLeafItem>),
}

/// Reads the B+ tree header at `offset`. The byte order is detected from the
/// tree's own magic.
pub fn read_chrom_tree_header<R: Read + Seek>(
    file: &mut R,
    offset: u64,
) -> Result<ChromTreeHeader, BBIReadError> {
    let endianness = read_magic(file, offset, CHROM_TREE_MAGIC, "chromosome tree")?;
    let data = read_at(file, offset + 4, CHROM_TREE_HEADER_SIZE as usize - 4)?;
    let mut data = FieldBuf::with_offset(&data, endianness, offset + 4);

    let block_size = data.get_u32()?;
    let key_size = data.get_u32()?;
    let val_size = data.get_u32()?;
    let item_count = data.get_u64()?;
    let _reserved = data.get_u64()?;

    if block_size == 0 {
        return Err(BBIReadError::invalid(offset + 4, "Chromosome tree block size is 0"));
    }
    if key_size == 0 {
        return Err(BBIReadError::invalid(offset + 8, "Chromosome tree key size is 0"));
    }
    if key_size > MAX_KEY_SIZE {
        return Err(BBIReadError::invalid(
            offset + 8,
            format!(
                "Chromosome tree key size of {} is larger than the maximum of {}",
                key_size, MAX_KEY_SIZE
            ),
        ));
    }
    if val_size != 8 {
        return Err(BBIReadError::invalid(
            offset + 12,
            format!("Expected chromosome tree value size of 8, found {}", val_size),
        ));
    }

    Ok(ChromTreeHeader {
        endianness,
        block_size,
        key_size,
        val_size,
        item_count,
        root_offset: offset + CHROM_TREE_HEADER_SIZE,
    })
}

fn read_node<R: Read + Seek>(
    file: &mut R,
    header: &ChromTreeHeader,
    node_offset: u64,
) -> Result<ChromTreeNode, BBIReadError> {
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
        "Chromosome tree node at {}: isleaf={} count={}",
        node_offset,
        isleaf,
        count
    );

    let key_size = header.key_size as usize;
    let items_offset = node_offset + NODE_HEADER_SIZE;
    let data = read_at(file, items_offset, (key_size + 8) * count as usize)?;
    let mut data = FieldBuf::with_offset(&data, header.endianness, items_offset);

    let node = if isleaf == 1 {
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = data.bytes(key_size)?.to_vec();
            let chrom_id = data.get_u32()?;
            let chrom_size = data.get_u32()?;
            items.push(ChromTreeLeafItem {
                key,
                chrom_id,
                chrom_size,
            });
        }
        ChromTreeNode::Leaf(items)
    } else {
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = data.bytes(key_size)?.to_vec();
            let child_offset = data.get_u64()?;
            items.push(ChromTreeNonLeafItem { key, child_offset });
        }
        ChromTreeNode::NonLeaf(items)
    };
    Ok(node)
}

fn key_to_name(key: &[u8], offset: u64) -> Result<String, BBIReadError> {
    match std::str::from_utf8(key) {
        Ok(s) => Ok(s.trim_matches(char::from(0)).to_owned()),
        Err(_) => Err(BBIReadError::invalid(
            offset,
            "Invalid file format: Invalid utf-8 string.",
        )),
    }
}

/// Visits the whole tree, left to right, and returns every chromosome in it.
///
/// The number of chromosomes found must match the header's item count, and
/// names must be unique.
pub fn read_chroms<R: Read + Seek>(
    file: &mut R,
    header: &ChromTreeHeader,
) -> Result<Vec<ChromInfo>, BBIReadError> {
    let mut chroms = Vec::with_capacity(header.item_count.min(1 << 16) as usize);
    read_chrom_tree_block(file, header, header.root_offset, &mut chroms, 0)?;

    if chroms.len() as u64 != header.item_count {
        return Err(BBIReadError::invalid(
            header.root_offset,
            format!(
                "Chromosome tree has {} items, but the header declares {}",
                chroms.len(),
                header.item_count
            ),
        ));
    }
    if let Some(name) = chroms.iter().map(|c| c.name.as_str()).duplicates().next() {
        return Err(BBIReadError::invalid(
            header.root_offset,
            format!("Duplicate chromosome in chromosome tree: {}", name),
        ));
    }

    Ok(chroms)
}

fn read_chrom_tree_block<R: Read + Seek>(
    file: &mut R,
    header: &ChromTreeHeader,
    node_offset: u64,
    chroms: &mut Vec<ChromInfo>,
    depth: usize,
) -> Result<(), BBIReadError> {
    if depth > MAX_DEPTH {
        return Err(BBIReadError::invalid(
            node_offset,
            "Chromosome tree is too deep (possible cycle)",
        ));
    }
    match read_node(file, header, node_offset)? {
        ChromTreeNode::Leaf(items) => {
            for item in items {
                chroms.push(ChromInfo {
                    name: key_to_name(&item.key, node_offset)?,
                    length: item.chrom_size,
                    id: item.chrom_id,
                });
            }
        }
        ChromTreeNode::NonLeaf(items) => {
            for item in items {
                read_chrom_tree_block(file, header, item.child_offset, chroms, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Looks up a single chromosome by following, at each internal node, the one
/// child whose key range can contain `name`.
pub fn find_chrom<R: Read + Seek>(
    file: &mut R,
    header: &ChromTreeHeader,
    name: &str,
) -> Result<Option<ChromInfo>, BBIReadError> {
    let key_size = header.key_size as usize;
    if name.len() > key_size {
        return Ok(None);
    }
    let mut key = vec![0u8; key_size];
    key[..name.len()].copy_from_slice(name.as_bytes());

    let mut node_offset = header.root_offset;
    for _ in 0..=MAX_DEPTH {
        match read_node(file, header, node_offset)? {
            ChromTreeNode::Leaf(items) => {
                return items
                    .into_iter()
                    .find(|item| item.key == key)
                    .map(|item| {
                        Ok(ChromInfo {
                            name: key_to_name(&item.key, node_offset)?,
                            length: item.chrom_size,
                            id: item.chrom_id,
                        })
                    })
                    .transpose();
            }
            ChromTreeNode::NonLeaf(items) => {
                // Each key is the smallest key in its subtree
                let child = items
                    .iter()
                    .take_while(|item| item.key.as_slice() <= key.as_slice())
                    .last();
                match child {
                    Some(child) => node_offset = child.child_offset,
                    None => return Ok(None),
                }
            }
        }
    }
    Err(BBIReadError::invalid(
        node_offset,
        "Chromosome tree is too deep (possible cycle)",
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn tree_header(key_size: u32, block_size: u32, item_count: u64) -> Vec<u8> {
        let mut out = vec![];
        out.extend_from_slice(&CHROM_TREE_MAGIC.to_le_bytes());
        out.extend_from_slice(&block_size.to_le_bytes());
        out.extend_from_slice(&key_size.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&item_count.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out
    }

    fn key(name: &str, key_size: usize) -> Vec<u8> {
        let mut key = name.as_bytes().to_vec();
        key.resize(key_size, 0);
        key
    }

    // A two level tree: root at 32 pointing to leaves at 64 and 64 + 4 + 2 * 14
    fn two_level_tree() -> Vec<u8> {
        let key_size = 6;
        let mut out = tree_header(key_size as u32, 2, 4);
        let first_leaf = 32 + 4 + 2 * (key_size as u64 + 8);
        let second_leaf = first_leaf + 4 + 2 * (key_size as u64 + 8);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend(key("chr1", key_size));
        out.extend_from_slice(&first_leaf.to_le_bytes());
        out.extend(key("chr3", key_size));
        out.extend_from_slice(&second_leaf.to_le_bytes());
        assert_eq!(out.len() as u64, first_leaf);
        for (leaf, names) in [[("chr1", 0u32), ("chr2", 1)], [("chr3", 2), ("chrX", 3)]]
            .iter()
            .enumerate()
        {
            out.extend_from_slice(&[1, 0]);
            out.extend_from_slice(&2u16.to_le_bytes());
            for (name, id) in names {
                out.extend(key(name, key_size));
                out.extend_from_slice(&id.to_le_bytes());
                out.extend_from_slice(&(1000 * (leaf as u32 + 1) + id).to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn test_read_chroms() {
        let mut file = Cursor::new(two_level_tree());
        let header = read_chrom_tree_header(&mut file, 0).unwrap();
        assert_eq!(header.key_size, 6);
        assert_eq!(header.item_count, 4);
        let chroms = read_chroms(&mut file, &header).unwrap();
        let names: Vec<_> = chroms.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["chr1", "chr2", "chr3", "chrX"]);
        assert_eq!(chroms[3].id(), 3);
        assert_eq!(chroms[3].length, 2003);
    }

    #[test]
    fn test_find_chrom() {
        let mut file = Cursor::new(two_level_tree());
        let header = read_chrom_tree_header(&mut file, 0).unwrap();
        for (name, id) in [("chr1", 0), ("chr2", 1), ("chr3", 2), ("chrX", 3)] {
            let chrom = find_chrom(&mut file, &header, name).unwrap().unwrap();
            assert_eq!(chrom.name, name);
            assert_eq!(chrom.id(), id);
        }
        assert!(find_chrom(&mut file, &header, "chr0").unwrap().is_none());
        assert!(find_chrom(&mut file, &header, "chr25").unwrap().is_none());
        assert!(find_chrom(&mut file, &header, "chrY").unwrap().is_none());
        assert!(find_chrom(&mut file, &header, "chromosome1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_bad_isleaf() {
        let mut data = two_level_tree();
        data[32] = 2;
        let mut file = Cursor::new(data);
        let header = read_chrom_tree_header(&mut file, 0).unwrap();
        let err = read_chroms(&mut file, &header).unwrap_err();
        assert!(err.is_format_error());
        let err = find_chrom(&mut file, &header, "chr1").unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_count_over_block_size() {
        let mut data = two_level_tree();
        data[34..36].copy_from_slice(&3u16.to_le_bytes());
        let mut file = Cursor::new(data);
        let header = read_chrom_tree_header(&mut file, 0).unwrap();
        assert!(read_chroms(&mut file, &header).unwrap_err().is_format_error());
    }

    #[test]
    fn test_huge_key_size() {
        let mut data = tree_header(0xFFFF_FFF0, 65535, 65535);
        data.extend_from_slice(&[1, 0]);
        data.extend_from_slice(&65535u16.to_le_bytes());
        data.resize(100, 0);
        let err = read_chrom_tree_header(&mut Cursor::new(data), 0).unwrap_err();
        assert!(err.is_format_error());

        // A large but allowed key size with too little data is truncated
        let mut data = tree_header(255, 65535, 65535);
        data.extend_from_slice(&[1, 0]);
        data.extend_from_slice(&65535u16.to_le_bytes());
        data.resize(100, 0);
        let mut file = Cursor::new(data);
        let header = read_chrom_tree_header(&mut file, 0).unwrap();
        assert!(read_chroms(&mut file, &header).unwrap_err().is_truncation());
    }

    #[test]
    fn test_item_count_mismatch() {
        let mut data = two_level_tree();
        data[16..24].copy_from_slice(&5u64.to_le_bytes());
        let mut file = Cursor::new(data);
        let header = read_chrom_tree_header(&mut file, 0).unwrap();
        assert!(read_chroms(&mut file, &header).unwrap_err().is_format_error());
    }

    #[test]
    fn test_swapped_tree_header() {
        let mut data = vec![];
        data.extend_from_slice(&CHROM_TREE_MAGIC.to_be_bytes());
        data.extend_from_slice(&256u32.to_be_bytes());
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(&8u32.to_be_bytes());
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&[1, 0, 0, 0]);
        let mut file = Cursor::new(data);
        let header = read_chrom_tree_header(&mut file, 0).unwrap();
        assert!(matches!(header.endianness, Endianness::Big));
        assert_eq!(header.block_size, 256);
        assert_eq!(header.key_size, 5);
        assert!(read_chroms(&mut file, &header).unwrap().is_empty());
    }
}
