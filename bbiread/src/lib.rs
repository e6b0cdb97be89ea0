/*!
bbiread provides read-only access to bigWig and bigBed files.

The file format is defined in this paper: <https://doi.org/10.1093/bioinformatics/btq351>

## Reading

The entrypoint to reading bigWigs and bigBeds is [`BigWigRead::open`] and
[`BigBedRead::open`], respectively. These take any type that implements both
[`Read`][std::io::Read] and [`Seek`][std::io::Seek]. There are also
[`BigWigRead::open_file`] and [`BigBedRead::open_file`], which take a path
and will open a `File`. If the type of file isn't known ahead of time,
[`GenericBBIRead::open`] will pick based on the file's magic.

Once opened, the info (in the form of [`BBIFileInfo`]) is available through
[`BBIRead::info`], and the chromosomes through [`BBIRead::chroms`]. Data is
read with [`BigWigRead::get_sections`] (whole decoded blocks),
[`BigWigRead::get_interval`] or [`BigBedRead::get_interval`] (items clipped
or filtered to a region), and [`BBIRead::get_zoom_interval`] for the
pre-computed summaries.

Handles read straight from the underlying source. To keep tree nodes and
decompressed blocks in memory between queries, convert a handle with
`cached()`. Handles over a [`ReopenableFile`][utils::reopen::ReopenableFile]
can be [reopened][utils::reopen::Reopen] to get another handle with an
independent cursor, for example to read from several threads.

## Lower level

Each on-disk structure can also be parsed on its own: [`read_header`],
[`read_chrom_tree_header`] and [`read_chroms`]/[`find_chrom`],
[`read_cir_tree_header`] and [`search_cir_tree`], [`read_block`] and
[`decompress`], and [`decode_section`], [`decode_zoom_records`] and
[`decode_bed_entries`] for block contents.
*/

mod bbi;
pub mod utils;

pub use bbi::*;
