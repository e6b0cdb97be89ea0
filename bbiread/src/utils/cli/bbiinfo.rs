use std::error::Error;

use byteordered::Endianness;
use clap::Parser;
use itertools::Itertools;

use crate::utils::cli::num_with_commas;
use crate::{BBIFile, BBIRead, GenericBBIRead};

#[derive(Clone, Debug, PartialEq, Parser)]
#[command(
    name = "info",
    about = "Gets information about a bigWig or bigBed.",
    long_about = None,
)]
pub struct BBIInfoArgs {
    /// The bigWig or bigBed to get info for.
    pub file: String,

    /// If set, will print out the list of chromosomes in the file and their sizes.
    #[arg(long)]
    #[arg(default_value_t = false)]
    pub chroms: bool,

    /// If set, will print out the list of all zoom levels.
    #[arg(long)]
    #[arg(default_value_t = false)]
    pub zooms: bool,

    /// If set, will print out the minimum and maximum on a single line.
    #[arg(long)]
    #[arg(default_value_t = false)]
    pub minmax: bool,
}

pub fn bbiinfo(args: BBIInfoArgs) -> Result<(), Box<dyn Error>> {
    let mut bbi = GenericBBIRead::open_file(&args.file)?;
    let summary = bbi.get_summary()?;
    if args.minmax {
        println!("{:.6} {:.6}", summary.min_val, summary.max_val);
        return Ok(());
    }

    let info = bbi.info();
    let header = info.header;
    println!(
        "type: {}",
        match info.filetype {
            BBIFile::BigWig => "bigWig",
            BBIFile::BigBed => "bigBed",
        }
    );
    println!("version: {}", header.version);
    println!(
        "isCompressed: {}",
        header.is_compressed().then(|| "yes").unwrap_or("no")
    );
    println!(
        "isSwapped: {}",
        (matches!(header.endianness, Endianness::Big))
            .then(|| "1")
            .unwrap_or("0")
    );
    if info.filetype == BBIFile::BigBed {
        println!("fieldCount: {}", header.field_count);
        println!("definedFieldCount: {}", header.defined_field_count);
    }
    println!(
        "primaryDataSize: {}",
        num_with_commas(
            header
                .full_index_offset
                .saturating_sub(header.full_data_offset)
        )
    );
    println!("zoomLevels: {}", info.zoom_headers.len());
    if args.zooms {
        for zoom in info.zoom_headers.iter() {
            println!(
                "\t{}\t{}",
                zoom.reduction_level,
                zoom.index_offset.saturating_sub(zoom.data_offset)
            );
        }
    }
    println!("chromCount: {}", info.chrom_info.len());
    if args.chroms {
        for chrom in info.chrom_info.iter() {
            println!("\t{} {} {}", chrom.name, chrom.id, chrom.length);
        }
    }
    println!("itemCount: {}", num_with_commas(summary.total_items));
    println!("basesCovered: {}", num_with_commas(summary.bases_covered));
    if summary.bases_covered > 0 {
        let n = summary.bases_covered as f64;
        println!("mean: {:.6}", summary.sum / n);
        println!("min: {:.6}", summary.min_val);
        println!("max: {:.6}", summary.max_val);
        let var = (summary.sum_squares - (summary.sum * summary.sum) / n) / (n - 1.0);
        println!("std: {:.6}", var.sqrt());
    }
    if !info.zoom_headers.is_empty() {
        println!(
            "reductions: {}",
            info.zoom_headers.iter().map(|z| z.reduction_level).join(",")
        );
    }

    Ok(())
}
