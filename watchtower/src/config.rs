use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use bitcoin_ext::rpc::bitcoincore_rpc::Auth;
use config::{Environment, File};

use crate::{chain_monitor, database, responder, watcher};

/// Name of the config file in the data directory.
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bitcoind {
	/// the URL of the bitcoind RPC (mandatory)
	pub url: String,
	/// the path of the cookie file for the bitcoind RPC
	/// It is mandatory to configure exactly one authentication method
	/// This could either be [bitcoind.cookie] or [bitcoind.rpc_user] and [bitcoind.rpc_pass]
	pub cookie: Option<PathBuf>,
	/// the user for the bitcoind RPC
	/// If a [bitcoind.rpc_pass] is provided [bitcoind.rpc_user] must be provided
	pub rpc_user: Option<String>,
	/// the password for the bitcoind RPC
	/// If a [bitcoind.rpc_user] is provided [bitcoind.rpc_pass] must be provided
	pub rpc_pass: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub data_dir: PathBuf,
	/// Directory to place structured log files.
	pub log_dir: Option<PathBuf>,
	pub network: bitcoin::Network,

	pub otel_collector_endpoint: Option<String>,

	/// Config for the Watcher process.
	pub watcher: watcher::Config,
	/// Config for the Responder process.
	pub responder: responder::Config,
	pub chain_monitor: chain_monitor::Config,
	/// Retry policy of store writes.
	pub persistence: database::Config,

	pub bitcoind: Bitcoind,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			data_dir: "./watchtower".into(),
			log_dir: None,
			network: bitcoin::Network::Regtest,
			otel_collector_endpoint: None,
			watcher: Default::default(),
			responder: Default::default(),
			chain_monitor: Default::default(),
			persistence: Default::default(),
			bitcoind: Bitcoind {
				url: "http://127.0.0.1:18443".into(),
				cookie: None,
				rpc_user: None,
				rpc_pass: None,
			},
		}
	}
}

impl Config {
	fn load_with_custom_env(
		config_file: Option<&Path>,
		#[cfg(test)]
		custom_env: Option<std::collections::HashMap<String, String>>,
	) -> anyhow::Result<Self> {
		let default = config::Config::try_from(&Self::default())
			.context("default config failed to deconstruct")?;

		// We'll add three layers of config:
		// - the defaults defined in Config's Default impl
		// - the config file passed in this function, if any
		// - environment variables (prefixed with `WATCHTOWER__`)

		let mut builder = config::Config::builder()
			.add_source(default);
		if let Some(file) = config_file {
			builder = builder.add_source(File::from(file));
		}

		let env = Environment::with_prefix("WATCHTOWER")
			.separator("__");
		#[cfg(test)]
		let env = env.source(custom_env);
		builder = builder.add_source(env);

		let cfg = builder.build().context("error building config")?;
		cfg.try_deserialize().context("error parsing config")
	}

	pub fn load(config_file: Option<&Path>) -> anyhow::Result<Self> {
		Self::load_with_custom_env(config_file, #[cfg(test)] None)
	}

	/// Load the config from the data directory, if it has a config file.
	pub fn load_from_datadir(datadir: &Path) -> anyhow::Result<Self> {
		let path = datadir.join(CONFIG_FILE);
		let mut cfg = if path.exists() {
			Self::load(Some(&path))?
		} else {
			Self::load(None)?
		};
		cfg.data_dir = datadir.to_path_buf();
		Ok(cfg)
	}

	/// Verifies if the specified configuration is valid
	///
	/// It also checks if all required configurations are available
	pub fn validate(&self) -> anyhow::Result<()> {
		let with_user_pass = match (&self.bitcoind.rpc_user, &self.bitcoind.rpc_pass) {
			(Some(_), None) => bail!("Missing configuration bitcoind.rpc_pass. \
				This is required if bitcoind.rpc_user is provided"),
			(None, Some(_)) => bail!("Missing configuration bitcoind.rpc_user. \
				This is required if bitcoind.rpc_pass is provided"),
			(None, None) => false,
			(Some(_),Some(_)) => true,
		};

		if !with_user_pass && self.bitcoind.cookie.is_none() {
			bail!("Configuring authentication to bitcoind is mandatory. \
				Specify either bitcoind.cookie or (bitcoind.rpc_user and bitcoind.rpc_pass).")
		} else if with_user_pass && self.bitcoind.cookie.is_some() {
			bail!("Invalid configuration for authentication to bitcoind. Use either \
				bitcoind.cookie or (bitcoind.rpc_user and bitcoind.rpc_pass) but not both.")
		}

		if self.watcher.max_appointments == 0 {
			bail!("watcher.max_appointments must be at least 1");
		}
		if self.responder.confirmations_before_retry == 0 {
			bail!("responder.confirmations_before_retry must be at least 1");
		}
		if self.responder.min_confirmations == 0 {
			bail!("responder.min_confirmations must be at least 1");
		}
		if self.chain_monitor.polling_interval.is_zero() {
			bail!("chain_monitor.polling_interval can't be zero");
		}
		if self.chain_monitor.last_tips_size == 0 {
			bail!("chain_monitor.last_tips_size must be at least 1");
		}
		if self.persistence.write_attempts == 0 {
			bail!("persistence.write_attempts must be at least 1");
		}

		Ok(())
	}

	pub fn bitcoind_auth(&self) -> anyhow::Result<Auth> {
		match (&self.bitcoind.rpc_user, &self.bitcoind.rpc_pass) {
			(Some(user), Some(pass)) => Ok(Auth::UserPass(user.into(), pass.into())),
			(Some(_), None) => bail!("Missing configuration for bitcoind.rpc_pass."),
			(None, Some(_)) => bail!("Missing configuration for bitcoind.rpc_user."),
			(None, None) => {
				let cookie = self.bitcoind.cookie.as_ref()
					.context("The bitcoind.cookie must be set if username and password aren't provided")?;
				Ok(Auth::CookieFile(cookie.into()))
			},
		}
	}

	/// Write the config into the writer.
	pub fn write_into(&self, writer: &mut dyn io::Write) -> anyhow::Result<()> {
		let s = toml::to_string_pretty(self).context("config serialization error")?;
		writer.write_all(s.as_bytes()).context("error writing config to writer")?;
		Ok(())
	}
}
