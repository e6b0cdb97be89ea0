use std::io::{Read, Seek};

use libdeflater::{DecompressionError, Decompressor};

use crate::bbi::cirtree::Block;
use crate::bbi::codec::read_at;
use crate::bbi::error::BBIReadError;

/// Reads the raw (possibly compressed) bytes of a block.
pub fn read_block<R: Read + Seek>(file: &mut R, block: &Block) -> Result<Vec<u8>, BBIReadError> {
    read_at(file, block.offset, block.size as usize)
}

fn inflate(raw_data: &[u8], max_size: usize) -> Result<Vec<u8>, String> {
    let mut decompressor = Decompressor::new();
    let mut outbuf = vec![0; max_size];
    match decompressor.zlib_decompress(raw_data, &mut outbuf) {
        Ok(decompressed) => {
            outbuf.truncate(decompressed);
            Ok(outbuf)
        }
        Err(DecompressionError::InsufficientSpace) => Err(format!(
            "Decompressed data is larger than the maximum of {} bytes",
            max_size
        )),
        Err(DecompressionError::BadData) => Err("Invalid or incomplete zlib stream".to_owned()),
    }
}

/// Inflates a zlib-compressed block. Output larger than `max_size` is an
/// error.
pub fn decompress(raw_data: &[u8], max_size: usize) -> Result<Vec<u8>, BBIReadError> {
    inflate(raw_data, max_size).map_err(|reason| BBIReadError::Decompression { offset: 0, reason })
}

/// Gets the data (uncompressed, if applicable) from a given block
///
/// `uncompress_buf_size` comes from the container header; 0 means blocks are
/// stored as-is.
pub(crate) fn read_block_data<R: Read + Seek>(
    file: &mut R,
    block: &Block,
    uncompress_buf_size: u32,
) -> Result<Vec<u8>, BBIReadError> {
    let raw_data = read_block(file, block)?;
    if uncompress_buf_size == 0 {
        return Ok(raw_data);
    }
    inflate(&raw_data, uncompress_buf_size as usize).map_err(|reason| {
        BBIReadError::Decompression {
            offset: block.offset,
            reason,
        }
    })
}
