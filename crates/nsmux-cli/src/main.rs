//! nsmux command-line inspector.
//!
//! Runs single namespace operations against the real workspace, which is
//! handy for checking a config before pointing a filesystem driver at it.
//!
//! Usage:
//!   nsmux ls /
//!   nsmux resolve github.com/acme/app/pkg/x.go --write
//!   nsmux --config ./nsmux.toml cat golang.org/x/net/http2/frame.go

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use nsmux_kernel::{
    FileType, LocalBackend, MutationKind, Namespace, NamespaceConfig, OpenFlags, VfsError,
    default_config_path,
};

/// Bytes requested per read by `cat`.
const CAT_CHUNK: u32 = 64 * 1024;

/// Inspect a virtual directory namespace.
#[derive(Parser, Debug)]
#[command(name = "nsmux")]
#[command(about = "Inspect and exercise an nsmux namespace")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log routing decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Refuse every mutation at the backing store
    #[arg(long, global = true)]
    read_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a virtual directory
    Ls { path: String },
    /// Show attributes of a virtual path
    Stat { path: String },
    /// Print the backing location an operation would use
    Resolve {
        path: String,
        /// Resolve as an open for writing
        #[arg(long)]
        write: bool,
        /// Resolve as a create instead of an open
        #[arg(long, conflicts_with = "write")]
        create: bool,
    },
    /// Create a directory
    Mkdir {
        path: String,
        #[arg(long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },
    /// Remove a directory tree
    Rmdir { path: String },
    /// Create or truncate a file
    Touch {
        path: String,
        #[arg(long, default_value = "644", value_parser = parse_mode)]
        mode: u32,
    },
    /// Remove a file
    Rm { path: String },
    /// Rename within one backing root
    Mv { from: String, to: String },
    /// Print a file
    Cat { path: String },
}

fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode {s:?}: {e}"))
}

fn load_config(path: Option<PathBuf>) -> Result<NamespaceConfig> {
    let path = match path {
        Some(path) => path,
        None => default_config_path().context("no config directory on this platform")?,
    };
    NamespaceConfig::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn kind_marker(kind: FileType) -> char {
    match kind {
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
        FileType::File => '-',
    }
}

async fn run(ns: &Namespace, command: Command) -> Result<(), VfsError> {
    let mut out = std::io::stdout().lock();
    match command {
        Command::Ls { path } => {
            for entry in ns.list_directory(&path).await? {
                writeln!(out, "{} {}", kind_marker(entry.kind), entry.name)?;
            }
        }
        Command::Stat { path } => {
            let attr = ns.stat(&path).await?;
            writeln!(
                out,
                "{} {:o} {} bytes",
                kind_marker(attr.kind),
                attr.perm,
                attr.size
            )?;
        }
        Command::Resolve {
            path,
            write,
            create,
        } => {
            let location = if create {
                ns.resolve_mutation(&path, MutationKind::Create)?
            } else {
                let flags = if write {
                    OpenFlags::write()
                } else {
                    OpenFlags::read()
                };
                ns.resolve_read(&path, flags).await?
            };
            writeln!(out, "{}\t{}", location.kind, location.path.display())?;
        }
        Command::Mkdir { path, mode } => ns.make_directory(&path, mode).await?,
        Command::Rmdir { path } => ns.remove_directory(&path).await?,
        Command::Touch { path, mode } => {
            let file = ns
                .create_file(&path, OpenFlags::create_truncate(), mode)
                .await?;
            writeln!(out, "{}", file.location.path.display())?;
        }
        Command::Rm { path } => ns.unlink_file(&path).await?,
        Command::Mv { from, to } => ns.rename_file(&from, &to).await?,
        Command::Cat { path } => {
            let file = ns.open_file(&path, OpenFlags::read()).await?;
            let mut offset = 0u64;
            loop {
                let chunk = ns.read(&file, offset, CAT_CHUNK).await?;
                if chunk.is_empty() {
                    break;
                }
                out.write_all(&chunk)?;
                offset += chunk.len() as u64;
            }
        }
    }
    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config)?;
    tracing::debug!(?config, "loaded config");

    let store = if args.read_only {
        LocalBackend::read_only()
    } else {
        LocalBackend::new()
    };
    let ns = Namespace::new(Arc::new(config), Arc::new(store));

    if let Err(e) = run(&ns, args.command).await {
        #[cfg(unix)]
        tracing::debug!(errno = e.errno(), "operation failed");
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert_eq!(parse_mode("0o600").unwrap(), 0o600);
        assert!(parse_mode("9").is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["nsmux", "-v", "resolve", "lib/x.go", "--write"]).unwrap();
        assert!(args.verbose);
        assert!(matches!(
            args.command,
            Command::Resolve {
                write: true,
                create: false,
                ..
            }
        ));

        let args = Args::try_parse_from(["nsmux", "mkdir", "src/pkg", "--mode", "700"]).unwrap();
        assert!(matches!(args.command, Command::Mkdir { mode: 0o700, .. }));

        assert!(
            Args::try_parse_from(["nsmux", "resolve", "x", "--write", "--create"]).is_err()
        );
    }

    #[test]
    fn test_kind_marker() {
        assert_eq!(kind_marker(FileType::Directory), 'd');
        assert_eq!(kind_marker(FileType::File), '-');
    }
}
