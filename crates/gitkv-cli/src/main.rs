//! Operator CLI: run single storage operations against a remote.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gitkv_backend::{Backend, Config, Credentials, OpContext};

#[derive(Parser)]
#[command(name = "gitkv", about = "Key/blob storage backed by a remote Git repository")]
struct Cli {
    /// Remote repository URL (https, ssh, git://, or a local path).
    #[arg(long)]
    endpoint: String,

    /// Bearer token credential.
    #[arg(long, conflicts_with_all = ["username", "password"])]
    token: Option<String>,

    /// Basic-auth username (hosted forges accept a token as the password).
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Basic-auth password.
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Committer identity as "Name <email>".
    #[arg(long)]
    committer: Option<String>,

    /// Disable the in-process write serializer.
    #[arg(long)]
    no_serialize_writes: bool,

    /// Overall operation timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read the blob at a path and write it to stdout.
    Get { path: String },
    /// Create a new entry; fails if the path exists.
    Create {
        path: String,
        #[arg(long, conflicts_with = "data_file")]
        data: Option<String>,
        /// Read the body from a file ("-" for stdin).
        #[arg(long)]
        data_file: Option<PathBuf>,
    },
    /// Overwrite an existing entry.
    Update {
        path: String,
        #[arg(long, conflicts_with = "data_file")]
        data: Option<String>,
        #[arg(long)]
        data_file: Option<PathBuf>,
    },
    /// Remove an existing entry.
    Delete { path: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("gitkv: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let credentials = match (cli.token, cli.username, cli.password) {
        (Some(token), _, _) => Credentials::Bearer(token),
        (None, Some(username), Some(password)) => Credentials::Basic { username, password },
        _ => Credentials::None,
    };

    let mut config = Config::new(&cli.endpoint)
        .credentials(credentials)
        .serialize_writes(!cli.no_serialize_writes);
    if let Some(ref committer) = cli.committer {
        let (name, email) = parse_identity(committer)?;
        config = config.committer(name, email);
    }

    let backend = Backend::open(config).context("opening backend")?;
    let ctx = match cli.timeout {
        Some(secs) => OpContext::with_timeout(Duration::from_secs(secs)),
        None => OpContext::background(),
    };

    match cli.command {
        Command::Get { path } => {
            let (data, receipt) = backend.get(&ctx, &path)?;
            std::io::stdout().write_all(&data)?;
            eprintln!("retries: {}", receipt.retries);
        }
        Command::Create { path, data, data_file } => {
            let body = read_body(data, data_file)?;
            let receipt = backend.create(&ctx, &path, &body)?;
            eprintln!("created {path} (retries: {})", receipt.retries);
        }
        Command::Update { path, data, data_file } => {
            let body = read_body(data, data_file)?;
            let receipt = backend.update(&ctx, &path, &body)?;
            eprintln!("updated {path} (retries: {})", receipt.retries);
        }
        Command::Delete { path } => {
            let receipt = backend.delete(&ctx, &path)?;
            eprintln!("deleted {path} (retries: {})", receipt.retries);
        }
    }
    Ok(())
}

fn read_body(data: Option<String>, data_file: Option<PathBuf>) -> anyhow::Result<Vec<u8>> {
    match (data, data_file) {
        (Some(data), None) => Ok(data.into_bytes()),
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut body = Vec::new();
            std::io::stdin().read_to_end(&mut body)?;
            Ok(body)
        }
        (None, Some(path)) => {
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
        }
        (None, None) => bail!("provide a body with --data or --data-file"),
        (Some(_), Some(_)) => unreachable!("clap enforces exclusivity"),
    }
}

fn parse_identity(input: &str) -> anyhow::Result<(String, String)> {
    let (name, rest) = input
        .split_once('<')
        .context("committer must look like \"Name <email>\"")?;
    let email = rest
        .strip_suffix('>')
        .context("committer must look like \"Name <email>\"")?;
    let name = name.trim();
    if name.is_empty() || email.is_empty() {
        bail!("committer must look like \"Name <email>\"");
    }
    Ok((name.to_string(), email.to_string()))
}
