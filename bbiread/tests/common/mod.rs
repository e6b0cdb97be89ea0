//! Writes small bbi files in memory for the integration tests.
//!
//! Trees are built bottom-up by chunking, then laid out level by level with
//! the root first, in the same shape a real writer produces.
#![allow(dead_code)]

use byteordered::{ByteOrdered, Endianness};
use itertools::Itertools;
use libdeflater::{CompressionLvl, Compressor};

use bbiread::{Summary, ZoomRecord, BIGWIG_MAGIC, CHROM_TREE_MAGIC, CIR_TREE_MAGIC};

pub struct FieldWriter {
    buf: Vec<u8>,
    endianness: Endianness,
}

impl FieldWriter {
    pub fn new(endianness: Endianness) -> Self {
        FieldWriter {
            buf: vec![],
            endianness,
        }
    }

    fn ordered(&mut self) -> ByteOrdered<&mut Vec<u8>, Endianness> {
        ByteOrdered::runtime(&mut self.buf, self.endianness)
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.ordered().write_u16(v).unwrap();
    }

    pub fn u32(&mut self, v: u32) {
        self.ordered().write_u32(v).unwrap();
    }

    pub fn u64(&mut self, v: u64) {
        self.ordered().write_u64(v).unwrap();
    }

    pub fn f32(&mut self, v: f32) {
        self.ordered().write_f32(v).unwrap();
    }

    pub fn f64(&mut self, v: f64) {
        self.ordered().write_f64(v).unwrap();
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// A leaf of a cir tree: the key of a block and where it lives
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeItem {
    pub start_chrom: u32,
    pub start_base: u32,
    pub end_chrom: u32,
    pub end_base: u32,
    pub offset: u64,
    pub size: u64,
}

/// Groups `count` things into nodes of at most `block_size`, then those nodes
/// into parents, until there is a single root. Level 0 holds the leaves.
fn tree_levels(count: usize, block_size: u32) -> Vec<Vec<Vec<usize>>> {
    let block_size = block_size as usize;
    let mut leaves: Vec<Vec<usize>> = (0..count)
        .chunks(block_size)
        .into_iter()
        .map(|chunk| chunk.collect())
        .collect();
    if leaves.is_empty() {
        leaves.push(vec![]);
    }
    let mut levels = vec![leaves];
    while levels[levels.len() - 1].len() > 1 {
        let below = levels[levels.len() - 1].len();
        let level = (0..below)
            .chunks(block_size)
            .into_iter()
            .map(|chunk| chunk.collect())
            .collect();
        levels.push(level);
    }
    levels
}

/// Offsets of each node, laying out levels from the root down starting at
/// `start`.
fn node_offsets(
    levels: &[Vec<Vec<usize>>],
    start: u64,
    leaf_item_size: u64,
    non_leaf_item_size: u64,
) -> Vec<Vec<u64>> {
    let mut offsets = vec![vec![]; levels.len()];
    let mut next = start;
    for (level, nodes) in levels.iter().enumerate().rev() {
        let item_size = if level == 0 {
            leaf_item_size
        } else {
            non_leaf_item_size
        };
        for node in nodes {
            offsets[level].push(next);
            next += 4 + item_size * node.len() as u64;
        }
    }
    offsets
}

/// Writes a chromosome B+ tree for `chroms`; each chromosome's id is its
/// index. `base` is the offset the tree will be placed at.
pub fn chrom_tree_bytes(
    endianness: Endianness,
    base: u64,
    chroms: &[(&str, u32)],
    block_size: u32,
) -> Vec<u8> {
    let key_size = chroms.iter().map(|c| c.0.len()).max().unwrap_or(1).max(1);
    let items: Vec<(Vec<u8>, u32, u32)> = chroms
        .iter()
        .enumerate()
        .map(|(id, (name, size))| {
            let mut key = name.as_bytes().to_vec();
            key.resize(key_size, 0);
            (key, id as u32, *size)
        })
        .sorted()
        .collect();

    let levels = tree_levels(items.len(), block_size);
    let key_item_size = key_size as u64 + 8;
    let offsets = node_offsets(&levels, base + 32, key_item_size, key_item_size);

    fn first_key<'a>(
        levels: &[Vec<Vec<usize>>],
        items: &'a [(Vec<u8>, u32, u32)],
        level: usize,
        node: usize,
    ) -> &'a [u8] {
        let first = levels[level][node][0];
        if level == 0 {
            &items[first].0
        } else {
            first_key(levels, items, level - 1, first)
        }
    }

    let mut out = FieldWriter::new(endianness);
    out.u32(CHROM_TREE_MAGIC);
    out.u32(block_size);
    out.u32(key_size as u32);
    out.u32(8);
    out.u64(items.len() as u64);
    out.u64(0);
    for (level, nodes) in levels.iter().enumerate().rev() {
        for node in nodes {
            out.u8(if level == 0 { 1 } else { 0 });
            out.u8(0);
            out.u16(node.len() as u16);
            for &child in node {
                if level == 0 {
                    let (key, id, size) = &items[child];
                    out.bytes(key);
                    out.u32(*id);
                    out.u32(*size);
                } else {
                    out.bytes(first_key(&levels, &items, level - 1, child));
                    out.u64(offsets[level - 1][child]);
                }
            }
        }
    }
    out.into_inner()
}

type Key = (u32, u32, u32, u32);

/// Writes a cir tree over `items` (sorted by start first). Each internal key
/// spans the smallest start and largest end below it.
pub fn cir_tree_bytes(
    endianness: Endianness,
    base: u64,
    items: &[TreeItem],
    block_size: u32,
    end_file_offset: u64,
) -> Vec<u8> {
    let items: Vec<TreeItem> = items
        .iter()
        .copied()
        .sorted_by_key(|i| (i.start_chrom, i.start_base, i.end_chrom, i.end_base))
        .collect();
    let levels = tree_levels(items.len(), block_size);
    let offsets = node_offsets(&levels, base + 48, 32, 24);

    // Keys of every node, level by level
    let mut keys: Vec<Vec<Key>> = vec![];
    for (level, nodes) in levels.iter().enumerate() {
        let child_keys: Vec<Key> = if level == 0 {
            items
                .iter()
                .map(|i| (i.start_chrom, i.start_base, i.end_chrom, i.end_base))
                .collect()
        } else {
            keys[level - 1].clone()
        };
        let level_keys = nodes
            .iter()
            .map(|node| {
                let start = node
                    .iter()
                    .map(|&c| (child_keys[c].0, child_keys[c].1))
                    .min()
                    .unwrap_or((0, 0));
                let end = node
                    .iter()
                    .map(|&c| (child_keys[c].2, child_keys[c].3))
                    .max()
                    .unwrap_or((0, 0));
                (start.0, start.1, end.0, end.1)
            })
            .collect();
        keys.push(level_keys);
    }
    let root_key = keys[keys.len() - 1][0];

    let mut out = FieldWriter::new(endianness);
    out.u32(CIR_TREE_MAGIC);
    out.u32(block_size);
    out.u64(items.len() as u64);
    out.u32(root_key.0);
    out.u32(root_key.1);
    out.u32(root_key.2);
    out.u32(root_key.3);
    out.u64(end_file_offset);
    out.u32(1024);
    out.u32(0);
    for (level, nodes) in levels.iter().enumerate().rev() {
        for node in nodes {
            out.u8(if level == 0 { 1 } else { 0 });
            out.u8(0);
            out.u16(node.len() as u16);
            for &child in node {
                if level == 0 {
                    let item = &items[child];
                    out.u32(item.start_chrom);
                    out.u32(item.start_base);
                    out.u32(item.end_chrom);
                    out.u32(item.end_base);
                    out.u64(item.offset);
                    out.u64(item.size);
                } else {
                    let key = keys[level - 1][child];
                    out.u32(key.0);
                    out.u32(key.1);
                    out.u32(key.2);
                    out.u32(key.3);
                    out.u64(offsets[level - 1][child]);
                }
            }
        }
    }
    out.into_inner()
}

/// The uncompressed contents of a data block, along with its key
#[derive(Clone, Debug)]
pub struct BlockSpec {
    pub chrom: u32,
    pub start: u32,
    pub end: u32,
    pub data: Vec<u8>,
}

fn section_header(
    out: &mut FieldWriter,
    chrom: u32,
    start: u32,
    end: u32,
    step: u32,
    span: u32,
    tag: u8,
    count: usize,
) {
    out.u32(chrom);
    out.u32(start);
    out.u32(end);
    out.u32(step);
    out.u32(span);
    out.u8(tag);
    out.u8(0);
    out.u16(count as u16);
}

pub fn bedgraph_section(endianness: Endianness, chrom: u32, items: &[(u32, u32, f32)]) -> BlockSpec {
    let start = items.iter().map(|i| i.0).min().unwrap_or(0);
    let end = items.iter().map(|i| i.1).max().unwrap_or(0);
    let mut out = FieldWriter::new(endianness);
    section_header(&mut out, chrom, start, end, 0, 0, 1, items.len());
    for &(start, end, value) in items {
        out.u32(start);
        out.u32(end);
        out.f32(value);
    }
    BlockSpec {
        chrom,
        start,
        end,
        data: out.into_inner(),
    }
}

pub fn varstep_section(
    endianness: Endianness,
    chrom: u32,
    span: u32,
    items: &[(u32, f32)],
) -> BlockSpec {
    let start = items.iter().map(|i| i.0).min().unwrap_or(0);
    let end = items.iter().map(|i| i.0 + span).max().unwrap_or(0);
    let mut out = FieldWriter::new(endianness);
    section_header(&mut out, chrom, start, end, 0, span, 2, items.len());
    for &(start, value) in items {
        out.u32(start);
        out.f32(value);
    }
    BlockSpec {
        chrom,
        start,
        end,
        data: out.into_inner(),
    }
}

pub fn fixedstep_section(
    endianness: Endianness,
    chrom: u32,
    start: u32,
    step: u32,
    span: u32,
    values: &[f32],
) -> BlockSpec {
    let end = start + step * (values.len().max(1) as u32 - 1) + span;
    let mut out = FieldWriter::new(endianness);
    section_header(&mut out, chrom, start, end, step, span, 3, values.len());
    for &value in values {
        out.f32(value);
    }
    BlockSpec {
        chrom,
        start,
        end,
        data: out.into_inner(),
    }
}

pub fn bed_block(endianness: Endianness, chrom: u32, entries: &[(u32, u32, &str)]) -> BlockSpec {
    let start = entries.iter().map(|e| e.0).min().unwrap_or(0);
    let end = entries.iter().map(|e| e.1).max().unwrap_or(0);
    let mut out = FieldWriter::new(endianness);
    for &(start, end, rest) in entries {
        out.u32(chrom);
        out.u32(start);
        out.u32(end);
        out.bytes(rest.as_bytes());
        out.u8(0);
    }
    BlockSpec {
        chrom,
        start,
        end,
        data: out.into_inner(),
    }
}

pub fn zoom_block(endianness: Endianness, records: &[ZoomRecord]) -> BlockSpec {
    let mut out = FieldWriter::new(endianness);
    for record in records {
        out.u32(record.chrom);
        out.u32(record.start);
        out.u32(record.end);
        out.u32(record.summary.bases_covered as u32);
        out.f32(record.summary.min_val as f32);
        out.f32(record.summary.max_val as f32);
        out.f32(record.summary.sum as f32);
        out.f32(record.summary.sum_squares as f32);
    }
    BlockSpec {
        chrom: records.first().map(|r| r.chrom).unwrap_or(0),
        start: records.first().map(|r| r.start).unwrap_or(0),
        end: records.iter().map(|r| r.end).max().unwrap_or(0),
        data: out.into_inner(),
    }
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut compressor = Compressor::new(CompressionLvl::default());
    let mut out = vec![0; compressor.zlib_compress_bound(data.len())];
    let len = compressor.zlib_compress(data, &mut out).unwrap();
    out.truncate(len);
    out
}

/// Everything needed to write a complete bbi file
pub struct TestFile {
    pub magic: u32,
    pub endianness: Endianness,
    /// The byte order of the cir trees, if different from the rest of the file
    pub index_endianness: Option<Endianness>,
    pub version: u16,
    pub field_count: u16,
    pub chroms: Vec<(&'static str, u32)>,
    pub chrom_block_size: u32,
    pub index_block_size: u32,
    pub compress: bool,
    pub blocks: Vec<BlockSpec>,
    pub zooms: Vec<(u32, Vec<BlockSpec>)>,
    /// Written as the total summary, unless `None`
    pub summary: Option<Summary>,
    pub data_count: u64,
    pub autosql: Option<&'static str>,
}

impl TestFile {
    pub fn bigwig(endianness: Endianness) -> Self {
        TestFile {
            magic: BIGWIG_MAGIC,
            endianness,
            index_endianness: None,
            version: 4,
            field_count: 0,
            chroms: vec![("chr1", 10_000), ("chr2", 5_000), ("chrM", 200)],
            chrom_block_size: 256,
            index_block_size: 256,
            compress: true,
            blocks: vec![],
            zooms: vec![],
            summary: Some(Summary::default()),
            data_count: 0,
            autosql: None,
        }
    }

    fn write_blocks(&self, out: &mut FieldWriter, blocks: &[BlockSpec]) -> Vec<TreeItem> {
        blocks
            .iter()
            .map(|block| {
                let data = if self.compress {
                    compress(&block.data)
                } else {
                    block.data.clone()
                };
                let offset = out.len();
                out.bytes(&data);
                TreeItem {
                    start_chrom: block.chrom,
                    start_base: block.start,
                    end_chrom: block.chrom,
                    end_base: block.end,
                    offset,
                    size: data.len() as u64,
                }
            })
            .collect()
    }

    fn write_index(&self, out: &mut FieldWriter, items: &[TreeItem]) {
        let base = out.len();
        let endianness = self.index_endianness.unwrap_or(self.endianness);
        out.bytes(&cir_tree_bytes(
            endianness,
            base,
            items,
            self.index_block_size,
            base,
        ));
    }

    pub fn build(&self) -> Vec<u8> {
        let zoom_dir_size = 24 * self.zooms.len();
        let mut out = FieldWriter::new(self.endianness);
        out.bytes(&vec![0; 64 + zoom_dir_size]);

        // Always little-endian
        let total_summary_offset = match &self.summary {
            Some(summary) => {
                let offset = out.len();
                out.bytes(&summary.bases_covered.to_le_bytes());
                out.bytes(&summary.min_val.to_le_bytes());
                out.bytes(&summary.max_val.to_le_bytes());
                out.bytes(&summary.sum.to_le_bytes());
                out.bytes(&summary.sum_squares.to_le_bytes());
                offset
            }
            None => 0,
        };

        let auto_sql_offset = match self.autosql {
            Some(autosql) => {
                let offset = out.len();
                out.bytes(autosql.as_bytes());
                out.u8(0);
                offset
            }
            None => 0,
        };

        let chrom_tree_offset = out.len();
        out.bytes(&chrom_tree_bytes(
            self.endianness,
            chrom_tree_offset,
            &self.chroms,
            self.chrom_block_size,
        ));

        let full_data_offset = out.len();
        out.u64(self.data_count);
        let items = self.write_blocks(&mut out, &self.blocks);
        let full_index_offset = out.len();
        self.write_index(&mut out, &items);

        let mut zoom_headers = vec![];
        for (reduction_level, blocks) in self.zooms.iter() {
            let data_offset = out.len();
            out.u32(blocks.len() as u32);
            let items = self.write_blocks(&mut out, blocks);
            let index_offset = out.len();
            self.write_index(&mut out, &items);
            zoom_headers.push((*reduction_level, data_offset, index_offset));
        }

        let uncompress_buf_size = if self.compress {
            self.blocks
                .iter()
                .chain(self.zooms.iter().flat_map(|z| z.1.iter()))
                .map(|b| b.data.len() as u32)
                .max()
                .unwrap_or(0)
                .max(1)
        } else {
            0
        };

        let mut header = FieldWriter::new(self.endianness);
        header.u32(self.magic);
        header.u16(self.version);
        header.u16(self.zooms.len() as u16);
        header.u64(chrom_tree_offset);
        header.u64(full_data_offset);
        header.u64(full_index_offset);
        header.u16(self.field_count);
        header.u16(self.field_count);
        header.u64(auto_sql_offset);
        header.u64(total_summary_offset);
        header.u32(uncompress_buf_size);
        header.u64(0);
        for (reduction_level, data_offset, index_offset) in zoom_headers {
            header.u32(reduction_level);
            header.u32(0);
            header.u64(data_offset);
            header.u64(index_offset);
        }
        let header = header.into_inner();

        let mut data = out.into_inner();
        data[..header.len()].copy_from_slice(&header);
        data
    }
}
