//! dapbridge - Debug Adapter Protocol bridge.
//!
//! Serves a single DAP session over stdio (default) or a single TCP client. The debugger engine
//! replays a scenario file.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dapbridge::config::AdapterConfig;
use dapbridge::dap::logger::DapLogger;
use dapbridge::dap::protocol::Inbound;
use dapbridge::dap::session::{self, EngineBuilder, Session};
use dapbridge::dap::tracer::FileTracer;
use dapbridge::dap::transport::{self, MessageWriter};
use dapbridge::engine::script::{Scenario, ScriptedEngine};
use dapbridge::engine::Engine;
use log::{info, warn};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one debug session.
    Run {
        /// Scenario replayed by the debugger engine.
        #[clap(long, env = "DAPBRIDGE_SCENARIO")]
        scenario: PathBuf,

        /// Accept a single client on this address instead of using stdio.
        #[clap(long)]
        listen: Option<String>,

        /// Adapter config file (default: ~/.config/dapbridge/config.toml).
        #[clap(long)]
        config: Option<PathBuf>,

        /// Optional log file for adapter diagnostics (no output to stdout).
        #[clap(long)]
        log_file: Option<PathBuf>,

        /// Trace DAP traffic (requests/responses/events) into the log file.
        /// Requires --log-file.
        #[clap(long)]
        trace_dap: bool,

        /// Forward adapter logs to the client debug console.
        #[clap(long)]
        console_log: bool,
    },
    /// List target platforms supported by the engine.
    Platforms {
        #[clap(long, env = "DAPBRIDGE_SCENARIO")]
        scenario: PathBuf,
    },
}

fn main() {
    let logger = env_logger::Logger::from_default_env();
    let filter = logger.filter();
    dapbridge::log::LOGGER_SWITCHER.switch(logger, filter);

    let args = Args::parse();
    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            log::error!(target: "dap", "{err:#}");
            eprintln!("dapbridge: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> anyhow::Result<i32> {
    match args.command {
        Command::Platforms { scenario } => {
            let engine = ScriptedEngine::new(Scenario::from_file(&scenario)?);
            for platform in engine.platforms() {
                println!("{}: {}", platform.name, platform.description);
            }
            Ok(0)
        }
        Command::Run {
            scenario,
            listen,
            config,
            log_file,
            trace_dap,
            console_log,
        } => {
            // fail early on a broken scenario instead of on `initialize`
            Scenario::from_file(&scenario)?;
            let builder: EngineBuilder = Box::new(move || {
                let engine: Box<dyn Engine> =
                    Box::new(ScriptedEngine::new(Scenario::from_file(&scenario)?));
                Ok(engine)
            });

            let tracer = match &log_file {
                Some(path) => Some(FileTracer::new(path, trace_dap)?),
                None => None,
            };
            if trace_dap && tracer.is_none() {
                warn!(target: "dap", "--trace-dap requires --log-file; tracing disabled");
            }

            let config = AdapterConfig::from_file(config.as_deref());
            let (queue, inbound) = mpsc::channel();

            if console_log {
                let logger = DapLogger::new(queue.clone());
                let filter = logger.filter();
                dapbridge::log::LOGGER_SWITCHER.switch(logger, filter);
            }

            {
                let queue = queue.clone();
                ctrlc::set_handler(move || {
                    let _ = queue.send(Inbound::Shutdown);
                })
                .context("install signal handler")?;
            }

            let writer: Box<dyn MessageWriter> = match listen {
                None => {
                    info!(target: "dap", "serving DAP over stdio");
                    let (reader, writer) = transport::stdio(tracer.clone());
                    transport::spawn_reader(reader, queue.clone());
                    Box::new(writer)
                }
                Some(addr) => {
                    let addr: SocketAddr = addr.parse().context("Invalid listen address")?;
                    let listener =
                        TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
                    info!(target: "dap", "listening on {addr}");
                    let (stream, peer) = listener.accept().context("accept DAP client")?;
                    info!(target: "dap", "DAP client connected: {peer}");
                    if let Some(t) = &tracer {
                        t.line(&format!("client connected: {peer}"));
                    }
                    let (reader, writer) = transport::tcp(stream, tracer.clone())?;
                    transport::spawn_reader(reader, queue.clone());
                    Box::new(writer)
                }
            };

            let code = session::run(Session::new(config, builder, writer, queue), inbound)?;
            if let Some(t) = &tracer {
                t.line(&format!("session finished with code {code}"));
            }
            Ok(code)
        }
    }
}
