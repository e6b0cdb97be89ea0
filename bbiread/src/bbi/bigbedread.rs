use std::collections::btree_set;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::bbi::bbiread::{
    get_overlapping_blocks, read_info, BBIFileInfo, BBIFileRead, BBIRead, CachedBBIFileRead,
};
use crate::bbi::records::decode_bed_entries;
use crate::bbi::{BBIFile, BBIReadError, BedEntry, Block};
use crate::utils::reopen::{Reopen, ReopenableFile, SeekableRead};

/// Possible errors encountered when opening a bigBed file to read
#[derive(Error, Debug)]
pub enum BigBedReadOpenError {
    #[error("File is not a bigBed.")]
    NotABigBed,
    #[error("{}", .0)]
    BBIReadError(#[from] BBIReadError),
    #[error("Error occurred: {}", .0)]
    IoError(#[from] io::Error),
}

/// The struct used to read a bigBed file
pub struct BigBedRead<R> {
    pub(crate) info: BBIFileInfo,
    pub(crate) read: R,
}

impl<R: Reopen> Reopen for BigBedRead<R> {
    fn reopen(&self) -> io::Result<Self> {
        Ok(BigBedRead {
            info: self.info.clone(),
            read: self.read.reopen()?,
        })
    }
}

impl<R: BBIFileRead> BBIRead for BigBedRead<R> {
    type Read = R;

    fn info(&self) -> &BBIFileInfo {
        &self.info
    }

    fn reader(&mut self) -> &mut R {
        &mut self.read
    }

    fn reader_and_info(&mut self) -> (&mut Self::Read, &BBIFileInfo) {
        (&mut self.read, &self.info)
    }
}

impl BigBedRead<ReopenableFile> {
    /// Opens a new `BigBedRead` from a given path as a file.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, BigBedReadOpenError> {
        let path = path.as_ref();
        let reopen = ReopenableFile {
            path: path.to_owned(),
            file: File::open(path)?,
        };
        let b = BigBedRead::open(reopen);
        if let Err(e) = &b {
            debug!("Error when opening {}: {}", path.display(), e);
        }
        b
    }
}

impl<R> BigBedRead<R> {
    /// Gives back the underlying reader
    pub fn into_inner(self) -> R {
        self.read
    }
}

impl<R: SeekableRead> BigBedRead<R> {
    /// Converts this `BigBedRead` to one that caches tree nodes and block data
    pub fn cached(self) -> BigBedRead<CachedBBIFileRead<R>> {
        BigBedRead {
            info: self.info,
            read: CachedBBIFileRead::new(self.read),
        }
    }
}

impl<R: BBIFileRead> BigBedRead<R> {
    /// Opens a new `BigBedRead` for a given type that implements both `Read` and `Seek`
    pub fn open(mut read: R) -> Result<Self, BigBedReadOpenError> {
        let info = read_info(read.raw_reader())?;
        match info.filetype {
            BBIFile::BigBed => {}
            _ => return Err(BigBedReadOpenError::NotABigBed),
        }

        Ok(BigBedRead { info, read })
    }

    /// Reads the raw autoSql declaration, if the file has one. The text is
    /// not parsed.
    pub fn autosql(&mut self) -> Result<Option<String>, BBIReadError> {
        let auto_sql_offset = self.info.header.auto_sql_offset;
        if auto_sql_offset == 0 {
            return Ok(None);
        }
        let reader = self.read.raw_reader();
        reader.seek(SeekFrom::Start(auto_sql_offset))?;
        let mut buffer = Vec::new();
        BufReader::new(reader).read_until(b'\0', &mut buffer)?;
        if buffer.pop() != Some(b'\0') {
            return Err(BBIReadError::invalid(
                auto_sql_offset,
                "Unterminated autoSql declaration",
            ));
        }
        String::from_utf8(buffer)
            .map(Some)
            .map_err(|_| BBIReadError::invalid(auto_sql_offset, "Invalid utf-8 in autoSql"))
    }

    /// Returns the entries that overlap `chrom_name:[start, end)`.
    pub fn get_interval<'a>(
        &'a mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
    ) -> Result<BedEntryIter<'a, R>, BBIReadError> {
        let (chrom, blocks) = get_overlapping_blocks(self, chrom_name, start, end)?;
        Ok(BedEntryIter {
            bigbed: self,
            blocks,
            vals: None,
            chrom,
            start,
            end,
        })
    }
}

fn get_block_entries<R: BBIFileRead>(
    bigbed: &mut BigBedRead<R>,
    block: &Block,
    chrom: u32,
    start: u32,
    end: u32,
) -> Result<Vec<BedEntry>, BBIReadError> {
    let data = bigbed.read.get_block_data(&bigbed.info, block)?;
    let entries = decode_bed_entries(&data, bigbed.info.header.endianness)?
        .into_iter()
        .filter(|(chrom_id, entry)| *chrom_id == chrom && entry.end > start && entry.start < end)
        .map(|(_, entry)| entry)
        .collect();
    Ok(entries)
}

/// Entries of a bigBed that overlap a query
pub struct BedEntryIter<'a, R: BBIFileRead> {
    bigbed: &'a mut BigBedRead<R>,
    blocks: btree_set::IntoIter<Block>,
    vals: Option<std::vec::IntoIter<BedEntry>>,
    chrom: u32,
    start: u32,
    end: u32,
}

impl<'a, R: BBIFileRead> Iterator for BedEntryIter<'a, R> {
    type Item = Result<BedEntry, BBIReadError>;

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
                    match get_block_entries(
                        self.bigbed,
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
