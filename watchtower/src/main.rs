
#[macro_use] extern crate anyhow;
#[macro_use] extern crate log;

use std::{fs, process};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bitcoin::Network;
use bitcoin_ext::rpc::BitcoinRpcClient;
use clap::Parser;

use watchtower::{Config, Tower};
use watchtower::database::TowerDb;
use watchtower_log::{RecordSerializeWrapper, SLOG_FILENAME, SLOG_TARGET};

#[derive(Parser)]
#[command(name = "watchtowerd", version, about)]
struct Cli {
	/// the data directory of the tower
	#[arg(long, global = true, env = "WATCHTOWER_DATADIR", default_value = "./watchtower")]
	datadir: PathBuf,
	#[command(subcommand)]
	command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
	/// Create a new data directory
	#[command()]
	Create(CreateOpts),
	/// Start the tower and follow the chain until interrupted
	#[command()]
	Start,
	/// Print everything the store holds as JSON
	#[command()]
	GetState,
	/// Print the effective configuration
	#[command()]
	Config,
}

#[derive(clap::Args)]
struct CreateOpts {
	#[arg(long, default_value = "regtest")]
	network: Network,
	/// the URL of the bitcoind RPC
	#[arg(long)]
	bitcoind_url: String,
	/// the path of the cookie file for the bitcoind RPC
	#[arg(long)]
	bitcoind_cookie: Option<PathBuf>,
	#[arg(long)]
	bitcoind_rpc_user: Option<String>,
	#[arg(long)]
	bitcoind_rpc_pass: Option<String>,
}

#[tokio::main]
async fn main() {
	if let Err(e) = inner_main().await {
		eprintln!("An error occurred: {}", e);
		eprintln!("");
		eprintln!("{:?}", e);
		process::exit(1);
	}
}

fn init_logging(slog_dir: Option<&Path>) -> anyhow::Result<()> {
	let mut dispatch = fern::Dispatch::new()
		.level(log::LevelFilter::Trace)
		.level_for("bitcoincore_rpc", log::LevelFilter::Warn)
		.level_for("h2", log::LevelFilter::Info)
		.level_for("hyper", log::LevelFilter::Info)
		.level_for("tonic", log::LevelFilter::Info)
		// regular logging dispatch
		.chain(fern::Dispatch::new()
			.format(|out, msg, rec| {
				let now = chrono::Local::now();
				let stamp = now.format("%Y-%m-%d %H:%M:%S.%3f");
				out.finish(format_args!(
					"[{} {: >5} {}] {}",
					stamp, rec.level(), rec.module_path().unwrap_or(""), msg,
				))
			})
			.chain(std::io::stdout())
		);

	if let Some(dir) = slog_dir {
		fs::create_dir_all(dir).context("failed to create log dir")?;
		// structured logging dispatch, one JSON record per line
		let slog_file = fern::log_file(dir.join(SLOG_FILENAME))
			.context("failed to open structured log file")?;
		dispatch = dispatch.chain(fern::Dispatch::new()
			.filter(|m| m.target() == SLOG_TARGET)
			.format(|out, _msg, rec| {
				match serde_json::to_string(&RecordSerializeWrapper(rec)) {
					Ok(line) => out.finish(format_args!("{}", line)),
					Err(e) => out.finish(format_args!("{{\"json_error\":\"{}\"}}", e)),
				}
			})
			.chain(slog_file)
		);
	}

	dispatch.apply().context("error setting up logging")?;
	Ok(())
}

async fn inner_main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	match cli.command {
		Command::Create(opts) => {
			init_logging(None)?;
			let cfg = Config {
				data_dir: cli.datadir.clone(),
				network: opts.network,
				bitcoind: watchtower::config::Bitcoind {
					url: opts.bitcoind_url,
					cookie: opts.bitcoind_cookie,
					rpc_user: opts.bitcoind_rpc_user,
					rpc_pass: opts.bitcoind_rpc_pass,
				},
				..Default::default()
			};
			cfg.validate().context("invalid configuration")?;
			Tower::create(&cli.datadir, &cfg)?;
			println!("Created watchtower in {}", cli.datadir.display());
		},
		Command::Start => {
			let cfg = Config::load_from_datadir(&cli.datadir)?;
			cfg.validate().context("invalid configuration")?;
			init_logging(cfg.log_dir.as_deref())?;
			info!("Running with config: {:#?}", cfg);
			run(cfg).await?;
		},
		Command::GetState => {
			let cfg = Config::load_from_datadir(&cli.datadir)?;
			let store = Tower::open_store(&cfg.data_dir)?;
			let state = TowerDb::new(Arc::new(store), cfg.persistence).dump()?;
			println!("{}", serde_json::to_string_pretty(&state)?);
		},
		Command::Config => {
			let cfg = Config::load_from_datadir(&cli.datadir)?;
			cfg.write_into(&mut std::io::stdout())?;
		},
	}

	Ok(())
}

async fn run(cfg: Config) -> anyhow::Result<()> {
	let bitcoind = BitcoinRpcClient::new(&cfg.bitcoind.url, cfg.bitcoind_auth()?)
		.context("failed to create bitcoind rpc client")?;
	let store = Tower::open_store(&cfg.data_dir)?;
	let tower_key = Tower::load_tower_key(&cfg.data_dir)?;

	// bitcoind has no push feed we can subscribe to, so we only poll
	let tower = Tower::start(cfg, Arc::new(bitcoind), Arc::new(store), tower_key, None).await
		.context("failed to start watchtower")?;
	info!("Watchtower public key: {}", tower.public_key());

	let interrupted = tokio::select! {
		res = tokio::signal::ctrl_c() => {
			res.context("failed to listen for ctrl-c")?;
			info!("Received ctrl-c, shutting down...");
			true
		},
		_ = tower.runtime().shutdown_signal() => false,
	};
	tower.shutdown().await;

	if !interrupted {
		error!("Watchtower stopped after a critical failure");
		process::exit(1);
	}
	Ok(())
}
