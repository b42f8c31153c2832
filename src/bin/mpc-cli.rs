// Micropayment channel library built on bitcoin scripts
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;

use std::fs;
use std::io::{self, stdin, Read};
use std::path::PathBuf;

use amplify::IoError;
use bitcoin::{Network, Script};
use clap::{Parser, Subcommand};
use colored::Colorize;
use electrum_client as electrum;
use mpc::scripts::{script_to_address, Secret, TemplateError};
use mpc::{Api, Config, TxBuilder};

/// Command-line arguments
#[derive(Parser)]
#[derive(Clone, Eq, PartialEq, Debug)]
#[clap(
    author,
    version,
    name = "mpc-cli",
    about = "Command-line tool for unidirectional bitcoin micropayment channels"
)]
pub struct Args {
    /// Command to execute
    #[clap(subcommand)]
    pub command: Command,

    /// YAML file with channel configuration (network and fee policy).
    ///
    /// Values given with command-line options take precedence.
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Bitcoin network to operate on
    #[clap(short, long, global = true)]
    pub network: Option<Network>,

    /// Fee rate for channel transactions, in satoshis per kilobyte
    #[clap(long, global = true)]
    pub fee_per_kb: Option<u64>,

    /// Minimal value of an output, in satoshis
    #[clap(long, global = true)]
    pub dust_size: Option<u64>,

    /// Electrum server to use.
    ///
    /// Used only by `call` command
    #[clap(short, long, global = true, default_value("electrum.blockstream.info"))]
    pub electrum_server: String,

    /// Customize electrum server port number. By default the tool will use
    /// port matching the selected network.
    #[clap(short = 'p', global = true)]
    pub electrum_port: Option<u16>,
}

/// Command to execute
#[derive(Subcommand)]
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Command {
    /// Generate new random secret and print it together with its hash
    Secret,

    /// Print P2SH address of a channel script
    Address {
        /// Hex-encoded deposit or commit script
        script: Script,
    },

    /// Execute channel API request against the Electrum server.
    ///
    /// Request is a JSON object `{"method": "mpc_...", "params": {...}}`. If
    /// the file is not provided the request is read from STDIN.
    Call {
        /// File containing JSON request
        file: Option<PathBuf>,
    },
}

impl Args {
    fn config(&self) -> Result<Config, Error> {
        let mut config = match &self.config {
            Some(path) => serde_yaml::from_str(&fs::read_to_string(path)?)?,
            None => Config::default(),
        };
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(fee_per_kb) = self.fee_per_kb {
            config.fee.fee_per_kb = fee_per_kb;
        }
        if let Some(dust_size) = self.dust_size {
            config.fee.dust_size = dust_size;
        }
        debug!("Using configuration {}", config);
        Ok(config)
    }

    fn electrum_client(&self, network: Network) -> Result<electrum::Client, electrum::Error> {
        let electrum_url = format!(
            "{}:{}",
            self.electrum_server,
            self.electrum_port
                .unwrap_or_else(|| default_electrum_port(network))
        );
        eprintln!(
            "Connecting to network {} using {}",
            network.to_string().yellow(),
            electrum_url.yellow()
        );
        electrum::Client::new(&electrum_url)
    }

    pub fn exec(&self) -> Result<(), Error> {
        let config = self.config()?;
        match &self.command {
            Command::Secret => {
                let secret = Secret::random();
                println!("{} {}", "Secret:".bright_white(), secret);
                println!("{}   {}", "Hash:".bright_white(), secret.hash());
            }
            Command::Address { script } => {
                println!("{}", script_to_address(script, config.network)?);
            }
            Command::Call { file } => {
                let request = match file {
                    Some(path) => fs::read_to_string(path)?,
                    None => {
                        let mut request = String::new();
                        stdin().read_to_string(&mut request)?;
                        request
                    }
                };
                let client = self.electrum_client(config.network)?;
                let api = Api::new(TxBuilder::with(config), client);
                let response = api.handle_json(&request);
                if response.get("error").is_some() {
                    eprintln!("{}", "Request failed".bright_red());
                }
                println!("{:#}", response);
            }
        }
        Ok(())
    }
}

fn default_electrum_port(network: Network) -> u16 {
    match network {
        Network::Bitcoin => 50001,
        Network::Testnet => 60001,
        Network::Signet | Network::Regtest => 60601,
    }
}

#[derive(Debug, Display, Error, From)]
#[display(inner)]
pub enum Error {
    #[from(io::Error)]
    Io(IoError),

    #[from]
    Electrum(electrum::Error),

    #[from]
    Yaml(serde_yaml::Error),

    #[from]
    Script(TemplateError),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if let Err(err) = args.exec() {
        eprintln!("{}: {}\n", "Error".bright_red(), err);
    }
}
