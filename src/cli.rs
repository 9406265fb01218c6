use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
	name = "ethsim-harness",
	about = "Drive and test an Ethereum simulator service over its JSON-RPC interface.",
	version
)]
pub struct Cli {
	/// Override the service host.
	#[arg(long, global = true)]
	pub host: Option<String>,

	/// Override the service port.
	#[arg(long, global = true)]
	pub port: Option<u16>,

	/// Override the per-call timeout, in milliseconds.
	#[arg(long, global = true)]
	pub timeout_ms: Option<u64>,

	/// Config file to use instead of ~/.ethsim-harness/config.toml.
	#[arg(long = "config", global = true, value_name = "FILE")]
	pub config_file: Option<PathBuf>,

	/// Print results as JSON.
	#[arg(long, global = true)]
	pub json: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
	/// Create and list simulator accounts.
	Account {
		#[command(subcommand)]
		command: AccountCommand,
	},

	/// Deploy and call contracts.
	Contract {
		#[command(subcommand)]
		command: ContractCommand,
	},

	/// Send raw transactions.
	Tx {
		#[command(subcommand)]
		command: TxCommand,
	},

	/// List and run the built-in scenarios.
	Scenario {
		#[command(subcommand)]
		command: ScenarioCommand,
	},

	/// Inspect or create the config file.
	Config {
		#[command(subcommand)]
		command: ConfigCommand,
	},
}

// -- Account subcommands --

#[derive(Subcommand)]
pub enum AccountCommand {
	/// Create an account whose address is derived from its name.
	Add {
		/// Account name.
		name: String,
	},

	/// List every account the service knows.
	List,
}

// -- Contract subcommands --

#[derive(Subcommand)]
pub enum ContractCommand {
	/// Compile and deploy a contract source file.
	Deploy {
		/// Deploying account address (0x-prefixed).
		#[arg(long)]
		from: String,

		/// Contract source path, as the service sees it.
		#[arg(long)]
		file: String,
	},

	/// Call a deployed contract.
	Call {
		/// Calling account address (0x-prefixed).
		#[arg(long)]
		from: String,

		/// Contract address (0x-prefixed).
		#[arg(long)]
		contract: String,

		#[command(flatten)]
		input: CallInput,

		/// Argument as TYPE:VALUE, e.g. address:0xc86e... or uint256:100.
		#[arg(long = "arg", requires = "selector")]
		args: Vec<String>,
	},
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct CallInput {
	/// Pre-encoded call input, bare hex.
	#[arg(long)]
	pub input: Option<String>,

	/// Function selector (4 bytes hex); arguments come from --arg.
	#[arg(long)]
	pub selector: Option<String>,
}

// -- Tx subcommands --

#[derive(Subcommand)]
pub enum TxCommand {
	/// Send a transaction; without --to it creates a contract from --data.
	Send {
		/// Sender address (0x-prefixed).
		#[arg(long)]
		from: String,

		/// Recipient address; empty for contract creation.
		#[arg(long, default_value = "")]
		to: String,

		/// Value in wei.
		#[arg(long, default_value = "0")]
		value: String,

		/// Call data or init code, hex.
		#[arg(long, default_value = "")]
		data: String,
	},
}

// -- Scenario subcommands --

#[derive(Subcommand)]
pub enum ScenarioCommand {
	/// Show the built-in scenarios.
	List,

	/// Run scenarios by name.
	Run {
		/// Scenario names.
		#[arg(required_unless_present = "all")]
		names: Vec<String>,

		/// Run every built-in scenario.
		#[arg(long, conflicts_with = "names")]
		all: bool,

		/// Run scenarios concurrently.
		#[arg(long)]
		parallel: bool,

		/// Retry network failures at least this many times per step.
		#[arg(long)]
		retries: Option<u32>,
	},
}

// -- Config subcommands --

#[derive(Subcommand)]
pub enum ConfigCommand {
	/// Print the effective configuration.
	Show,

	/// Write a default config file if none exists.
	Init,
}
