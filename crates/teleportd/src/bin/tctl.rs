//! The cluster admin CLI: runs on the Auth host and talks
//! directly to its backend, the same storage Auth itself uses, rather than
//! over the control channel — there's no RPC for user provisioning, only
//! for the RPCs Proxy/Node need at runtime.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use teleport_auth::token::TokenService;
use teleport_auth::userauth::{add_user, LocalUserStore, SignupTokenService};
use teleport_core::{Config, Role};

#[derive(Parser)]
#[command(name = "tctl", about = "Administer a teleport cluster")]
struct Cli {
	/// Path to the cluster's YAML config, used to locate the backend.
	#[arg(long, default_value = "/etc/teleport/teleport.yaml")]
	config: PathBuf,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Manage provisioning tokens.
	Tokens {
		#[command(subcommand)]
		action: TokensAction,
	},
	/// Manage user accounts.
	Users {
		#[command(subcommand)]
		action: UsersAction,
	},
}

#[derive(Subcommand)]
enum TokensAction {
	/// Mint a provisioning token good for one or more roles.
	Add {
		#[arg(long, value_delimiter = ',')]
		role: Vec<Role>,
		#[arg(long, default_value = "30m")]
		ttl: String,
		/// Use a fixed token value instead of generating one.
		#[arg(long)]
		token: Option<String>,
	},
}

#[derive(Subcommand)]
enum UsersAction {
	/// Provision a passwordless account and print its one-time sign-up URL.
	Add {
		login: String,
		#[arg(long, default_value = "24h")]
		signup_ttl: String,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt().with_target(false).init();
	let cli = Cli::parse();

	let raw = fs_err::read_to_string(&cli.config).context("reading cluster config")?;
	let config = Config::from_yaml(&raw).context("parsing cluster config")?;
	let backend = teleport::backend::build_backend(&config.backend);

	match cli.command {
		Command::Tokens {
			action: TokensAction::Add { role, ttl, token },
		} => {
			if role.is_empty() {
				anyhow::bail!("bad-parameter: --role is required and must name at least one role");
			}
			let ttl = teleport_core::duration::parse_human(&ttl).context("bad-parameter: invalid --ttl")?;
			let service = TokenService::new(backend);
			let issued = match token {
				Some(value) => service.add_named_token(value, role, ttl).await?,
				None => service.add_token(role, ttl).await?,
			};
			println!("{}", issued.token);
		},
		Command::Users {
			action: UsersAction::Add { login, signup_ttl },
		} => {
			let ttl = teleport_core::duration::parse_human(&signup_ttl).context("bad-parameter: invalid --signup-ttl")?;
			let user_store = LocalUserStore::new(backend.clone());
			let signup_tokens = SignupTokenService::new(backend);
			let (signup, totp_secret) = add_user(&signup_tokens, &user_store, login.clone(), ttl).await?;
			println!(
				"https://{}/signup?token={}",
				config.cluster_domain, signup.token
			);
			println!("totp secret (for the operator to hand the user out of band): {totp_secret}");
		},
	}

	Ok(())
}
