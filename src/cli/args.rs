//! Command line argument parsing
//!
//! Subcommands:
//! - `up`: Start a side-car and keep it running until Ctrl+C
//! - `build`: Provision the application image and print its ID
//! - `config`: Print the resolved settings as TOML

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Up(UpConfig),
    Build(BuildConfig),
    ShowConfig { config: Option<PathBuf> },
}

#[derive(Debug)]
pub struct UpConfig {
    pub profile: ProfileKind,
    pub config_override: Option<PathBuf>,
    pub network: Option<String>,
    pub edge_port: Option<u16>,
    /// Image for the `tomodachi` profile
    pub image: Option<String>,
    /// DynamoDB endpoint for the `dynamodb-admin` profile
    pub dynamo_endpoint: Option<String>,
}

#[derive(Debug)]
pub struct BuildConfig {
    pub config_override: Option<PathBuf>,
    pub dockerfile: Option<PathBuf>,
    pub context: Option<PathBuf>,
    pub target: Option<String>,
    pub buildkit: Option<bool>,
}

/// Side-car profiles the binary can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileKind {
    Localstack,
    Moto,
    Minio,
    #[cfg(feature = "postgres")]
    Postgres,
    #[cfg(feature = "mysql")]
    Mysql,
    Wiremock,
    Sftp,
    Tomodachi,
    DynamodbAdmin,
}

#[derive(Debug, Parser)]
#[command(name = "tomodachi-testcontainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Start ephemeral side-car containers for integration tests")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a side-car, print its connection info and wait for Ctrl+C
    Up {
        /// Side-car profile
        #[arg(value_enum)]
        profile: ProfileKind,
        /// Settings file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Docker network to attach to
        #[arg(short = 'n', long = "network")]
        network: Option<String>,
        /// Host port for the main container port (default: a free port)
        #[arg(short = 'p', long = "port")]
        edge_port: Option<u16>,
        /// Image to run (tomodachi profile)
        #[arg(long = "image")]
        image: Option<String>,
        /// DynamoDB endpoint to browse (dynamodb-admin profile)
        #[arg(long = "dynamo-endpoint")]
        dynamo_endpoint: Option<String>,
    },
    /// Build or resolve the application image and print its ID
    Build {
        /// Settings file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Dockerfile path
        #[arg(short = 'f', long = "file")]
        dockerfile: Option<PathBuf>,
        /// Build context directory
        context: Option<PathBuf>,
        /// Multi-stage build target
        #[arg(long = "target")]
        target: Option<String>,
        /// Build with the BuildKit CLI
        #[arg(long = "buildkit", conflicts_with = "classic")]
        buildkit: bool,
        /// Build through the daemon API
        #[arg(long = "classic")]
        classic: bool,
    },
    /// Show the resolved settings
    Config {
        /// Settings file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Up {
                profile,
                config,
                network,
                edge_port,
                image,
                dynamo_endpoint,
            }) => {
                if *profile == ProfileKind::Tomodachi && image.is_none() {
                    return Err("The tomodachi profile requires --image".to_string());
                }
                if *profile == ProfileKind::DynamodbAdmin && dynamo_endpoint.is_none() {
                    return Err("The dynamodb-admin profile requires --dynamo-endpoint".to_string());
                }
                Ok(ExecutionMode::Up(UpConfig {
                    profile: *profile,
                    config_override: config.clone(),
                    network: network.clone(),
                    edge_port: *edge_port,
                    image: image.clone(),
                    dynamo_endpoint: dynamo_endpoint.clone(),
                }))
            }
            Some(Commands::Build {
                config,
                dockerfile,
                context,
                target,
                buildkit,
                classic,
            }) => Ok(ExecutionMode::Build(BuildConfig {
                config_override: config.clone(),
                dockerfile: dockerfile.clone(),
                context: context.clone(),
                target: target.clone(),
                buildkit: match (buildkit, classic) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            })),
            Some(Commands::Config { config }) => Ok(ExecutionMode::ShowConfig {
                config: config.clone(),
            }),
            None => Err(
                "No command specified. Use 'tomodachi-testcontainers --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}
