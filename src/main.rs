use clap::Parser;
use gcskew_tools::cli::{Args, Commands};
use gcskew_tools::commands;
use gcskew_tools::config::SkewConfig;
use log::LevelFilter;

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbose, args.quiet);
    let config = args.apply(SkewConfig::load());

    let result = match args.command {
        Commands::Skew {
            identifier,
            overwrite,
            summary,
        } => commands::skew::run(config, identifier, overwrite, summary),
        Commands::Batch {
            fasta,
            sources,
            render,
            output_file,
            ..
        } => commands::batch::run(config, fasta, sources, render, output_file),
        Commands::Purge { identifier } => commands::purge::run(config, identifier),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
