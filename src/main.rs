//! CLI entry point for the artifact transport.

use std::path::PathBuf;

use anyhow::{Context, Result};
use artifact_transport::{
    AuthenticationInfo, HttpTransport, ProxyInfo, Repository, TransportConfig,
};
use clap::Parser;
use tracing::{debug, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(command = ?args.command, "CLI arguments parsed");

    let config = load_config(&args)?;
    let mut transport = HttpTransport::new(config);
    transport.open(
        Repository::new("cli", args.repository.clone()),
        proxy_info(&args),
        auth_info(&args),
    )?;

    let outcome = run(&mut transport, args.command).await;
    transport.close();
    outcome
}

fn load_config(args: &Args) -> Result<TransportConfig> {
    let mut config = match &args.config {
        Some(path) => TransportConfig::from_json_file(path)?,
        None => TransportConfig::default(),
    };
    if args.use_cache {
        config.use_cache = true;
    }
    for (name, value) in &args.headers {
        config.http_headers.insert(name.clone(), value.clone());
    }
    config.validate()?;
    Ok(config)
}

fn proxy_info(args: &Args) -> Option<ProxyInfo> {
    let host = args.proxy_host.clone()?;
    let mut proxy = ProxyInfo::new(
        host,
        args.proxy_port
            .unwrap_or(artifact_transport::proxy::DEFAULT_PROXY_PORT),
    );
    proxy.username = args.proxy_username.clone();
    proxy.password = args.proxy_password.clone();
    proxy.non_proxy_hosts = args.non_proxy_hosts.clone();
    Some(proxy)
}

fn auth_info(args: &Args) -> Option<AuthenticationInfo> {
    args.username.as_ref().map(|username| AuthenticationInfo {
        username: Some(username.clone()),
        password: args.password.clone(),
        ..AuthenticationInfo::default()
    })
}

async fn run(transport: &mut HttpTransport, command: Command) -> Result<()> {
    match command {
        Command::Get { resource, output } => {
            let destination = output.unwrap_or_else(|| default_destination(&resource));
            let fetched = transport
                .get(&resource, &destination)
                .await
                .with_context(|| format!("Failed to download '{resource}'"))?;
            info!(
                path = %destination.display(),
                content_length = ?fetched.content_length,
                "saved resource"
            );
        }
        Command::Put { file, resource } => {
            transport
                .put(&file, &resource)
                .await
                .with_context(|| format!("Failed to upload '{}'", file.display()))?;
            info!(%resource, "uploaded resource");
        }
        Command::Exists { resource } => {
            let exists = transport.exists(&resource).await?;
            println!("{exists}");
        }
        Command::Ls { directory } => {
            let directory = directory.unwrap_or_default();
            for entry in transport.list_files(&directory).await? {
                println!("{entry}");
            }
        }
    }
    Ok(())
}

fn default_destination(resource: &str) -> PathBuf {
    let name = resource
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or("download");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_destination_uses_last_segment() {
        assert_eq!(default_destination("org/acme/a-1.0.jar"), PathBuf::from("a-1.0.jar"));
        assert_eq!(default_destination(r"org\acme\b.pom"), PathBuf::from("b.pom"));
        assert_eq!(default_destination("org/acme/"), PathBuf::from("acme"));
        assert_eq!(default_destination(""), PathBuf::from("download"));
    }
}
