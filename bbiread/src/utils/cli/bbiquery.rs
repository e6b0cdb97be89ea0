use std::error::Error;
use std::io::{self, BufWriter, Write};

use clap::Parser;

use crate::{BBIRead, GenericBBIRead};

#[derive(Clone, Debug, PartialEq, Parser)]
#[command(
    name = "query",
    about = "Prints the data of a bigWig or bigBed that overlaps a region.",
    long_about = None,
)]
pub struct BBIQueryArgs {
    /// The bigWig or bigBed to read from.
    pub file: String,

    /// The chromosome to query.
    pub chrom: String,

    /// The start of the region (0-based).
    pub start: u32,

    /// The end of the region (exclusive).
    pub end: u32,

    /// If set, prints the zoom records of the given reduction level instead of the full data.
    #[arg(long)]
    pub zoom: Option<u32>,
}

pub fn bbiquery(args: BBIQueryArgs) -> Result<(), Box<dyn Error>> {
    let mut bbi = GenericBBIRead::open_file(&args.file)?;
    let chrom = args.chrom.as_str();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if let Some(reduction_level) = args.zoom {
        for record in bbi.get_zoom_interval(chrom, args.start, args.end, reduction_level)? {
            let record = record?;
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                chrom,
                record.start,
                record.end,
                record.summary.bases_covered,
                record.summary.min_val,
                record.summary.max_val,
                record.summary.sum,
                record.summary.sum_squares
            )?;
        }
        out.flush()?;
        return Ok(());
    }

    match bbi {
        GenericBBIRead::BigWig(mut bigwig) => {
            for value in bigwig.get_interval(chrom, args.start, args.end)? {
                let value = value?;
                writeln!(out, "{}\t{}\t{}\t{}", chrom, value.start, value.end, value.value)?;
            }
        }
        GenericBBIRead::BigBed(mut bigbed) => {
            for entry in bigbed.get_interval(chrom, args.start, args.end)? {
                let entry = entry?;
                if entry.rest.is_empty() {
                    writeln!(out, "{}\t{}\t{}", chrom, entry.start, entry.end)?;
                } else {
                    writeln!(out, "{}\t{}\t{}\t{}", chrom, entry.start, entry.end, entry.rest)?;
                }
            }
        }
    }
    out.flush()?;

    Ok(())
}
