use clap::{Args, Parser, Subcommand};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "gateplane")]
#[command(about = "CLI for GatePlane - Just-In-Time Access Management")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Vault server address
    #[arg(short = 'a', long, global = true, value_name = "URL")]
    pub vault_addr: Option<String>,

    /// Vault token for authentication
    #[arg(short = 't', long, global = true, value_name = "TOKEN")]
    pub vault_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authentication operations
    Auth {
        #[command(subcommand)]
        target: AuthTarget,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuthTarget {
    /// GatePlane Service authentication operations
    #[command(alias = "svc")]
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    /// Authenticate with GatePlane Services using OIDC
    #[command(alias = "signin")]
    Login {
        /// OIDC client ID
        #[arg(long)]
        client_id: Option<String>,

        /// Print the authorization URL and read the code from the terminal
        #[arg(long)]
        skip_browser: bool,
    },
    /// Clear service authentication
    #[command(alias = "signout")]
    Logout,
    /// Show service authentication status
    #[command(alias = "whoami")]
    Status,
}
