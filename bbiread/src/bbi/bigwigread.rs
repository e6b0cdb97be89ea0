use std::collections::btree_set;
use std::fs::File;
use std::io;
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::bbi::bbiread::{
    get_overlapping_blocks, read_info, BBIFileInfo, BBIFileRead, BBIRead, CachedBBIFileRead,
};
use crate::bbi::records::{decode_section, Section};
use crate::bbi::{BBIFile, BBIReadError, Block, Value};
use crate::utils::reopen::{Reopen, ReopenableFile, SeekableRead};

/// Possible errors encountered when opening a bigWig file to read
#[derive(Error, Debug)]
pub enum BigWigReadOpenError {
    #[error("File is not a bigWig.")]
    NotABigWig,
    #[error("{}", .0)]
    BBIReadError(#[from] BBIReadError),
    #[error("Error occurred: {}", .0)]
    IoError(#[from] io::Error),
}

/// The struct used to read a bigWig file
pub struct BigWigRead<R> {
    pub(crate) info: BBIFileInfo,
    pub(crate) read: R,
}

impl<R: Reopen> Reopen for BigWigRead<R> {
    fn reopen(&self) -> io::Result<Self> {
        Ok(BigWigRead {
            info: self.info.clone(),
            read: self.read.reopen()?,
        })
    }
}

impl<R: BBIFileRead> BBIRead for BigWigRead<R> {
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

impl BigWigRead<ReopenableFile> {
    /// Opens a new `BigWigRead` from a given path as a file.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, BigWigReadOpenError> {
        let path = path.as_ref();
        let reopen = ReopenableFile {
            path: path.to_owned(),
            file: File::open(path)?,
        };
        let b = BigWigRead::open(reopen);
        if let Err(e) = &b {
            debug!("Error when opening {}: {}", path.display(), e);
        }
        b
    }
}

impl<R> BigWigRead<R> {
    /// Gives back the underlying reader
    pub fn into_inner(self) -> R {
        self.read
    }
}

impl<R: SeekableRead> BigWigRead<R> {
    /// Converts this `BigWigRead` to one that caches tree nodes and block data
    pub fn cached(self) -> BigWigRead<CachedBBIFileRead<R>> {
        BigWigRead {
            info: self.info,
            read: CachedBBIFileRead::new(self.read),
        }
    }
}

impl<R: BBIFileRead> BigWigRead<R> {
    /// Opens a new `BigWigRead` for a given type that implements both `Read` and `Seek`
    pub fn open(mut read: R) -> Result<Self, BigWigReadOpenError> {
        let info = read_info(read.raw_reader())?;
        match info.filetype {
            BBIFile::BigWig => {}
            _ => return Err(BigWigReadOpenError::NotABigWig),
        }

        Ok(BigWigRead { info, read })
    }

    /// Returns the sections of every block that overlaps
    /// `chrom_name:[start, end)`, in block order. Sections are returned
    /// whole, including items outside the query.
    pub fn get_sections<'a>(
        &'a mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
    ) -> Result<SectionIter<'a, R>, BBIReadError> {
        let (_, blocks) = get_overlapping_blocks(self, chrom_name, start, end)?;
        Ok(SectionIter {
            bigwig: self,
            blocks,
        })
    }

    /// Returns the values that overlap `chrom_name:[start, end)`, clipped to
    /// the query.
    pub fn get_interval<'a>(
        &'a mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
    ) -> Result<IntervalIter<'a, R>, BBIReadError> {
        let (chrom, blocks) = get_overlapping_blocks(self, chrom_name, start, end)?;
        Ok(IntervalIter {
            sections: SectionIter {
                bigwig: self,
                blocks,
            },
            vals: None,
            chrom,
            start,
            end,
        })
    }
}

fn get_block_section<R: BBIFileRead>(
    bigwig: &mut BigWigRead<R>,
    block: &Block,
) -> Result<Section, BBIReadError> {
    let data = bigwig.read.get_block_data(&bigwig.info, block)?;
    decode_section(&data, bigwig.info.header.endianness)
}

/// Sections of a bigWig, one per block
pub struct SectionIter<'a, R: BBIFileRead> {
    bigwig: &'a mut BigWigRead<R>,
    blocks: btree_set::IntoIter<Block>,
}

impl<'a, R: BBIFileRead> Iterator for SectionIter<'a, R> {
    type Item = Result<Section, BBIReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let current_block = self.blocks.next()?;
        Some(get_block_section(self.bigwig, &current_block))
    }
}

/// Values of a bigWig that overlap a query
pub struct IntervalIter<'a, R: BBIFileRead> {
    sections: SectionIter<'a, R>,
    vals: Option<std::vec::IntoIter<Value>>,
    chrom: u32,
    start: u32,
    end: u32,
}

impl<'a, R: BBIFileRead> Iterator for IntervalIter<'a, R> {
    type Item = Result<Value, BBIReadError>;

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
                    let section = match self.sections.next()? {
                        Ok(section) => section,
                        Err(e) => return Some(Err(e)),
                    };
                    if section.chrom_id != self.chrom {
                        continue;
                    }
                    let (start, end) = (self.start, self.end);
                    let vals: Vec<_> = section
                        .items
                        .into_iter()
                        .filter(|v| v.end > start && v.start < end)
                        .map(|mut v| {
                            v.start = v.start.max(start);
                            v.end = v.end.min(end);
                            v
                        })
                        .collect();
                    self.vals = Some(vals.into_iter());
                }
            }
        }
    }
}
