//! taglight binary.
//!
//! Runs as a Neovim remote plugin: the host either spawns it and talks over
//! stdin/stdout, or hands it the path of its RPC socket.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use taglight_engine::{Analyzers, Config, Dispatcher, ExternalUpdate, Session, Shutdown, Workers};
use taglight_rpc::{Connection, CorrelationTable, Nvim};
use tracing::info;

/// taglight command line arguments.
#[derive(Parser, Debug)]
#[command(name = "taglight", version)]
#[command(about = "Buffer-synchronizing highlight backend for Neovim")]
struct Args {
	/// Connect to the host's RPC socket instead of using stdin/stdout
	#[arg(short, long, value_name = "PATH")]
	socket: Option<PathBuf>,

	/// Settings file (default: <config dir>/taglight/taglight.toml, if present)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Write logs to this file instead of stderr
	#[arg(long, value_name = "PATH")]
	log_file: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

type Channel = (Box<dyn Read + Send>, Box<dyn Write + Send>);

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose, args.log_file.as_deref())?;

	info!(version = env!("CARGO_PKG_VERSION"), "starting taglight");

	let config = load_config(args.config.as_deref())?;
	let (reader, writer) = match &args.socket {
		Some(path) => connect(path)?,
		None => stdio(),
	};

	let table = Arc::new(CorrelationTable::new());
	let conn = Arc::new(Connection::new(table, writer).with_timeout(config.request_timeout()));
	let nvim = Nvim::new(Arc::clone(&conn));
	let analyzers = Analyzers::from_keywords(&config.keywords);
	if analyzers.is_empty() {
		tracing::warn!("no analyzers configured; buffers will not be attached");
	}
	let session = Session::new(Arc::new(nvim.clone()), config, analyzers, Workers::Threaded)?;

	let reader_thread = {
		let session = Arc::clone(&session);
		let dispatcher = Dispatcher::new(Arc::clone(&session));
		tracing::trace!(worker_class = "rpc.reader", "worker.spawn_named_thread");
		std::thread::Builder::new()
			.name("taglight-rpc-reader".into())
			.spawn(move || {
				let result = conn.run_reader(reader, &dispatcher);
				session.signal_shutdown(Shutdown::Disconnected);
				result
			})
			.context("spawning the RPC reader")?
	};

	if let Err(e) = nvim.set_client_info("taglight", env!("CARGO_PKG_VERSION")) {
		tracing::warn!(error = %e, "nvim_set_client_info failed");
	}
	if let Err(e) = session.handle_update(ExternalUpdate::BufNew) {
		tracing::warn!(error = %e, "attaching the current buffer failed");
	}

	let reason = session.wait_for_shutdown();
	info!(?reason, "taglight stopping");
	session.close_all();

	match reason {
		Shutdown::Disconnected => match reader_thread.join() {
			Ok(result) => result.context("RPC connection failed")?,
			Err(_) => bail!("RPC reader thread panicked"),
		},
		// The reader is blocked on the host; it ends with the process.
		Shutdown::Stop | Shutdown::Exit => {}
	}
	Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
	if let Some(path) = path {
		return Ok(Config::load(path)?);
	}
	let default = dirs::config_dir().map(|d| d.join("taglight").join("taglight.toml"));
	match default {
		Some(path) if path.exists() => {
			info!(path = %path.display(), "loading settings");
			Ok(Config::load(&path)?)
		}
		_ => Ok(Config::default()),
	}
}

fn stdio() -> Channel {
	(Box::new(std::io::stdin()), Box::new(std::io::stdout()))
}

#[cfg(unix)]
fn connect(path: &Path) -> anyhow::Result<Channel> {
	let stream = std::os::unix::net::UnixStream::connect(path)
		.with_context(|| format!("connecting to {}", path.display()))?;
	info!(socket = %path.display(), "connected to host");
	let reader = stream.try_clone().context("cloning the socket")?;
	Ok((Box::new(reader), Box::new(stream)))
}

#[cfg(not(unix))]
fn connect(path: &Path) -> anyhow::Result<Channel> {
	bail!("socket connections are not supported on this platform: {}", path.display())
}

/// Logs go to stderr or `log_file`. stdout may be the RPC channel and is never written.
fn setup_tracing(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = EnvFilter::try_from_env("TAGLIGHT_LOG").unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("taglight=trace,taglight_engine=trace,taglight_rpc=debug,info")
		} else {
			EnvFilter::new("taglight=info,taglight_engine=info,warn")
		}
	});

	if let Some(path) = log_file {
		if let Some(parent) = path.parent()
			&& !parent.as_os_str().is_empty()
		{
			std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
		}
		let file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(path)
			.with_context(|| format!("opening log file {}", path.display()))?;
		let file_layer = tracing_subscriber::fmt::layer()
			.with_writer(file)
			.with_ansi(false)
			.with_target(true)
			.with_thread_names(true);
		tracing_subscriber::registry().with(filter).with(file_layer).init();
		tracing::info!(path = %path.display(), "tracing initialized");
		return Ok(());
	}

	let stderr_layer = tracing_subscriber::fmt::layer()
		.with_writer(std::io::stderr)
		.with_target(false);
	tracing_subscriber::registry().with(filter).with(stderr_layer).init();
	Ok(())
}
