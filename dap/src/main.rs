use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use tokio::net::TcpListener;

use casl2_dap::handle_connection;

/// Debug Adapter Protocol server for the CASL II / COMET II virtual machine.
#[derive(Parser)]
#[command(name = "casl2-dap")]
struct Cli {
    /// TCP port to listen on, bound to 127.0.0.1.
    #[arg(long)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging(LevelFilter::Info);

    let cli = Cli::parse();
    let addr = format!("127.0.0.1:{}", cli.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(err) => {
            log::error!("failed to bind {addr}: {err}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("listening on {addr}");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::info!("accepted connection from {peer}");
                tokio::spawn(handle_connection(stream));
            }
            Err(err) => {
                log::warn!("accept failed: {err}");
            }
        }
    }
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
