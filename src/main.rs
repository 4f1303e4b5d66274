use std::fs;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use casl2::assembler::assemble;

#[derive(Parser)]
#[command(name = "casl2", about = "CASL II assembler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a CASL II source file and print its symbol table.
    Assemble { file: String },
}

fn main() -> ExitCode {
    init_logging(LevelFilter::Info);

    let cli = Cli::parse();
    match cli.command {
        Command::Assemble { file } => assemble_file(&file),
    }
}

fn assemble_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(err) => {
            log::error!("failed to read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = assemble(&source);
    if !result.errors.is_empty() {
        for err in &result.errors {
            eprintln!("{err}");
        }
        return ExitCode::FAILURE;
    }

    result.symbol_table.print_table();
    ExitCode::SUCCESS
}

fn init_logging(level: LevelFilter) {
    let encoder = PatternEncoder::new("[{l}] {m}{n}");
    let stdout = ConsoleAppender::builder().encoder(Box::new(encoder)).build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .unwrap();
    let _handle = log4rs::init_config(config).unwrap();
}
