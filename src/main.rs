mod config;
mod error;
mod inventory;
mod jobs;
mod multipart_upload;
mod report;
mod service;
mod upload;

#[cfg(test)]
mod testing;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crate::config::{VaultConfig, DEFAULT_ACCOUNT};
use crate::error::{ConfigError, RetrieveError, UploadError};
use crate::inventory::{
    InventoryRetriever, PollPolicy, RetrievalRequest, DEFAULT_INTERVAL_MINUTES, DEFAULT_PREFIX,
};
use crate::jobs::InventoryFormat;
use crate::service::GlacierVault;
use crate::upload::{UploadRequest, Uploader};

pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const PARSE: i32 = -1;
    pub const MISSING_FILE: i32 = -2;
    pub const CONFIG: i32 = -3;
    pub const UPLOAD: i32 = -4;
    pub const LIST: i32 = -5;
}

#[derive(Args)]
struct VaultArgs {
    /// The AWS region, e.g. eu-west-1
    #[arg(long, short)]
    region: String,
    /// The AWS account id, "-" means the account owning the credentials
    #[arg(long, short, default_value = DEFAULT_ACCOUNT)]
    account: String,
    /// The Glacier vault name
    #[arg(long, short)]
    vault: String,
}

impl VaultArgs {
    fn config(&self) -> Result<VaultConfig, ConfigError> {
        let config = VaultConfig::new(&self.region, &self.account, &self.vault)?;
        log::info!("region: {}", config.region);
        log::info!("account: {}", config.account);
        log::info!("vault: {}", config.vault);
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an archive file to a Glacier vault
    Upload {
        #[command(flatten)]
        vault: VaultArgs,
        /// The archive file to upload
        #[arg(long, short)]
        file: Option<String>,
        /// Directory containing the archive file
        #[arg(long, short)]
        path: Option<String>,
        /// Archive description, defaults to "<file> on <date>"
        #[arg(long, short)]
        description: Option<String>,
    },
    /// Retrieve the inventory of a Glacier vault into a file
    List {
        #[command(flatten)]
        vault: VaultArgs,
        /// Inventory format, CSV or JSON
        #[arg(long = "format", short = 'f', default_value = "CSV")]
        format: InventoryFormat,
        /// Minutes to wait between job status checks
        #[arg(long, short, default_value_t = DEFAULT_INTERVAL_MINUTES)]
        interval: u64,
        /// Give up polling after this many minutes
        #[arg(long)]
        max_wait: Option<u64>,
        /// Fetch the output of this job instead of looking for one
        #[arg(long, short)]
        job_id: Option<String>,
        /// Description attached to a newly submitted job
        #[arg(long, short)]
        description: Option<String>,
        /// Where to write the inventory
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// File name prefix used when no output path is given
        #[arg(long, default_value = DEFAULT_PREFIX)]
        prefix: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    debug: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn init_logging(debug: u8) {
    let level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(config) = err.downcast_ref::<ConfigError>() {
        return match config {
            ConfigError::MissingUploadFile => exit_codes::MISSING_FILE,
            ConfigError::Blank(_) | ConfigError::UnsupportedFormat(_) => exit_codes::CONFIG,
        };
    }
    if err.downcast_ref::<UploadError>().is_some() {
        return exit_codes::UPLOAD;
    }
    if err.downcast_ref::<RetrieveError>().is_some() {
        return exit_codes::LIST;
    }
    exit_codes::PARSE
}

async fn do_upload(
    vault: &VaultArgs,
    file: Option<String>,
    path: Option<String>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let file = file.ok_or(ConfigError::MissingUploadFile)?;
    let config = vault.config()?;
    let request = UploadRequest {
        file,
        dir: path,
        description,
    };

    let archive_id = Uploader::new(GlacierVault::connect(config).await)
        .upload(&request)
        .await
        .with_context(|| format!("uploading {}", request.path().display()))?;

    println!("{}: {}", "upload confirmed".green(), archive_id.yellow());
    Ok(())
}

async fn do_list(
    vault: &VaultArgs,
    request: RetrievalRequest,
    prefix: String,
) -> anyhow::Result<()> {
    let config = vault.config()?;
    let vault_name = config.vault.clone();

    let retrieval = InventoryRetriever::new(GlacierVault::connect(config).await)
        .with_prefix(prefix)
        .retrieve(&request)
        .await
        .with_context(|| format!("retrieving inventory of vault {}", vault_name))?;

    println!(
        "{}: {} ({} job {}, {} bytes)",
        "inventory written".green(),
        retrieval.path.display(),
        retrieval.source,
        retrieval.job_id.yellow(),
        retrieval.bytes_written
    );
    if let Some(summary) = retrieval.summary {
        println!("{}: {}", "summary".green(), summary);
    }
    Ok(())
}

#[::tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::PARSE
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_logging(cli.debug);

    let outcome = match cli.command {
        Some(Commands::Upload {
            vault,
            file,
            path,
            description,
        }) => do_upload(&vault, file, path, description).await,
        Some(Commands::List {
            vault,
            format,
            interval,
            max_wait,
            job_id,
            description,
            output,
            prefix,
        }) => match PollPolicy::from_minutes(interval, max_wait) {
            Ok(poll) => {
                let request = RetrievalRequest {
                    format,
                    description,
                    job_id,
                    output_path: output,
                    poll,
                };
                do_list(&vault, request, prefix).await
            }
            Err(err) => Err(anyhow::Error::from(err).context("reading the poll interval")),
        },
        None => {
            println!("Nothing to do, exiting");
            Ok(())
        }
    };

    if let Err(err) = outcome {
        eprintln!("{}: {:#}", "error".red(), err);
        std::process::exit(exit_code(&err));
    }
}
