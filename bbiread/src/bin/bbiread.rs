use std::error::Error;

use bbiread::utils::cli::bbiinfo::{bbiinfo, BBIInfoArgs};
use bbiread::utils::cli::bbiquery::{bbiquery, BBIQueryArgs};
use clap::{Parser, Subcommand};

#[derive(Clone, Debug, PartialEq, Subcommand)]
#[command(version)]
enum SubCommands {
    #[command(name = "info", version)]
    Info {
        #[command(flatten)]
        args: BBIInfoArgs,
    },
    #[command(name = "query", version)]
    Query {
        #[command(flatten)]
        args: BBIQueryArgs,
    },
}

#[derive(Debug, Parser)]
#[command(name = "bbiread", about = "Reads bigWig and bigBed files.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: SubCommands,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        SubCommands::Info { args } => bbiinfo(args),
        SubCommands::Query { args } => bbiquery(args),
    }
}
