use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use crate::push::{
    translate_message, ConnectionConfig, CredentialProvider, HttpCredentialProvider,
    MessagePayload,
};

/// mailpulse - push notification connection for mail accounts
#[derive(Parser)]
#[command(name = "mailpulse")]
#[command(about = "Persistent push connection to a mail backend")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Connection config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show or reset the connection configuration
    Config(ConfigArgs),

    /// Run the notification rule on a server payload
    Translate(TranslateArgs),

    /// Fetch push credentials once from the backend
    Credentials(CredentialsArgs),
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Validate the configuration file
    #[arg(long)]
    pub validate: bool,

    /// Show configuration file location
    #[arg(long)]
    pub paths: bool,

    /// Reset configuration to defaults
    #[arg(long)]
    pub reset: bool,
}

#[derive(Args)]
pub struct TranslateArgs {
    /// JSON payload file, `-` for stdin
    pub payload: PathBuf,
}

#[derive(Args)]
pub struct CredentialsArgs {
    /// Credentials endpoint URL
    #[arg(long)]
    pub endpoint: String,

    /// Bearer session token for the request
    #[arg(long)]
    pub session_token: Option<String>,
}

/// Runs CLI commands against a resolved config path
pub struct CliHandler {
    config_path: PathBuf,
}

impl CliHandler {
    /// Create a new CLI handler
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => ConnectionConfig::default_path()
                .ok_or_else(|| anyhow!("Cannot find config directory"))?,
        };

        Ok(Self { config_path })
    }

    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Config(args) => self.handle_config(args),
            Commands::Translate(args) => self.handle_translate(args),
            Commands::Credentials(args) => self.handle_credentials(args).await,
        }
    }

    fn handle_config(&self, args: ConfigArgs) -> Result<()> {
        if args.paths {
            println!("{}", self.config_path.display());
        }

        if args.reset {
            ConnectionConfig::default().save(&self.config_path)?;
            println!("Wrote default configuration to {}", self.config_path.display());
        }

        if args.validate {
            ConnectionConfig::load(&self.config_path)?;
            println!("Configuration is valid");
        }

        if args.show || !(args.paths || args.reset || args.validate) {
            let config = ConnectionConfig::load_or_default(&self.config_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }

        Ok(())
    }

    fn handle_translate(&self, args: TranslateArgs) -> Result<()> {
        let content = if args.payload.as_os_str() == "-" {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        } else {
            std::fs::read_to_string(&args.payload)?
        };

        let payload: MessagePayload = serde_json::from_str(&content)?;
        let intents = translate_message(&payload)?;
        println!("{}", serde_json::to_string_pretty(&intents)?);
        Ok(())
    }

    async fn handle_credentials(&self, args: CredentialsArgs) -> Result<()> {
        let mut provider = HttpCredentialProvider::new(&args.endpoint)?;
        if let Some(token) = args.session_token {
            provider = provider.with_session_token(token);
        }

        let credentials = provider.fetch_credentials().await?;
        println!("{:#?}", credentials);
        Ok(())
    }
}
