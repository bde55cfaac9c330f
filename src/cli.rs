//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fetch, list, check and publish artifacts in an HTTP repository.
#[derive(Parser, Debug)]
#[command(name = "artifact-transport")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON transport configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository base URL
    #[arg(short = 'R', long)]
    pub repository: String,

    /// Repository user name
    #[arg(long)]
    pub username: Option<String>,

    /// Repository password
    #[arg(long)]
    pub password: Option<String>,

    /// HTTP proxy host
    #[arg(long)]
    pub proxy_host: Option<String>,

    /// HTTP proxy port (defaults to 80)
    #[arg(long, requires = "proxy_host")]
    pub proxy_port: Option<u16>,

    /// HTTP proxy user name
    #[arg(long, requires = "proxy_host")]
    pub proxy_username: Option<String>,

    /// HTTP proxy password
    #[arg(long, requires = "proxy_host")]
    pub proxy_password: Option<String>,

    /// Hosts that bypass the proxy, separated by `|`
    #[arg(long, requires = "proxy_host")]
    pub non_proxy_hosts: Option<String>,

    /// Extra request header as NAME=VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Allow intermediate caches to answer downloads
    #[arg(long)]
    pub use_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Transfer operations.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Download a resource
    Get {
        /// Resource path relative to the repository
        resource: String,
        /// Destination file (defaults to the resource's file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload a file as a resource
    Put {
        /// Local file to upload
        file: PathBuf,
        /// Resource path relative to the repository
        resource: String,
    },
    /// Check whether a resource exists
    Exists {
        /// Resource path relative to the repository
        resource: String,
    },
    /// List a directory of the repository
    Ls {
        /// Directory path relative to the repository (defaults to the root)
        directory: Option<String>,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(format!("expected NAME=VALUE, got '{raw}'"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const REPO: &str = "http://repo.example.com/maven2";

    #[test]
    fn test_cli_get_parses_with_defaults() {
        let args = Args::try_parse_from(["artifact-transport", "-R", REPO, "get", "a/b.jar"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.use_cache);
        assert!(args.headers.is_empty());
        assert_eq!(
            args.command,
            Command::Get {
                resource: "a/b.jar".to_string(),
                output: None
            }
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["artifact-transport", "-R", REPO, "-vv", "exists", "a"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_headers_are_repeatable() {
        let args = Args::try_parse_from([
            "artifact-transport",
            "-R",
            REPO,
            "-H",
            "X-Build=42",
            "--header",
            "Pragma = public",
            "ls",
            "org/acme",
        ])
        .unwrap();
        assert_eq!(
            args.headers,
            vec![
                ("X-Build".to_string(), "42".to_string()),
                ("Pragma".to_string(), "public".to_string())
            ]
        );
        assert_eq!(
            args.command,
            Command::Ls {
                directory: Some("org/acme".to_string())
            }
        );
    }

    #[test]
    fn test_cli_rejects_malformed_header() {
        let result = Args::try_parse_from(["artifact-transport", "-R", REPO, "-H", "oops", "ls"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_proxy_options_require_host() {
        let result = Args::try_parse_from([
            "artifact-transport",
            "-R",
            REPO,
            "--proxy-username",
            "u",
            "ls",
        ]);
        assert!(result.is_err());

        let args = Args::try_parse_from([
            "artifact-transport",
            "-R",
            REPO,
            "--proxy-host",
            "proxy.corp",
            "--proxy-port",
            "3128",
            "put",
            "local.jar",
            "a/b.jar",
        ])
        .unwrap();
        assert_eq!(args.proxy_host.as_deref(), Some("proxy.corp"));
        assert_eq!(args.proxy_port, Some(3128));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["artifact-transport", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
