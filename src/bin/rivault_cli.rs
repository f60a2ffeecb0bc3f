// ===================================================================================================
// rivault-cli - thin HTTP client exercising the dispatcher's external interface
// ===================================================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rivault::commands::{self, CliContext};

#[derive(Parser, Debug)]
#[command(name = "rivault-cli", about = "Command-line client for a rivault server")]
struct Cli {
    /// Base URL of the rivault server (env: API_URL).
    #[arg(long, env = "API_URL", default_value = "http://127.0.0.1:8080")]
    api_url: String,

    /// User id to act as (env: RIVAULT_USER).
    #[arg(long, env = "RIVAULT_USER", default_value = "default")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the contents of a folder ("root" for the top level).
    Ls { folder_id: String },
    /// Encrypt and upload a local file into a folder.
    Upload {
        folder_id: String,
        path: PathBuf,
        #[arg(long, env = "RIVAULT_PASSWORD")]
        password: String,
    },
    /// Download and decrypt a file to a local path.
    Download {
        file_id: String,
        path: PathBuf,
        #[arg(long, env = "RIVAULT_PASSWORD")]
        password: String,
    },
    /// Delete a node (recursively, for folders/drives).
    Rm { id: String },
    /// Rename a node.
    Rename { id: String, name: String },
    /// Move a node to a new parent.
    Mv { id: String, new_parent_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let ctx = CliContext::new(cli.api_url, cli.user);

    let result = match cli.command {
        Command::Ls { folder_id } => commands::ls(&ctx, &folder_id).await,
        Command::Upload { folder_id, path, password } => commands::upload(&ctx, &folder_id, &path, &password).await,
        Command::Download { file_id, path, password } => commands::download(&ctx, &file_id, &path, &password).await,
        Command::Rm { id } => commands::rm(&ctx, &id).await,
        Command::Rename { id, name } => commands::rename(&ctx, &id, &name).await,
        Command::Mv { id, new_parent_id } => commands::mv(&ctx, &id, &new_parent_id).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
