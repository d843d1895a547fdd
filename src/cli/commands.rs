use crate::config::ClientConfig;
use crate::copy::CopyState;
use crate::error::{FileShareError, Result};
use crate::file::{EntryKind, FileClient, FileServiceClient};
use crate::sas::{
    IpAddressOrRange, SharedAccessPermissions, SharedAccessPolicy, SharedAccessProtocol,
    SharedAccessSignature,
};
use crate::stream::{OpenReadOptions, OpenWriteOptions};
use crate::utils::datetime::parse_datetime_or_duration;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;
use url::Url;

const TRANSFER_CHUNK: usize = 1024 * 1024;

#[derive(Parser)]
#[command(name = "fshare")]
#[command(about = "Tokens, server-side copies and transfers for cloud file shares")]
#[command(version, author)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Connection string; overrides the account settings of the config file
    #[arg(long, global = true, env = "FILESHARE_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mint a shared access signature for a share or a file, or decode one
    Sas {
        /// Share or share/path to sign for
        #[arg(required_unless_present = "inspect")]
        target: Option<String>,

        /// Permissions, any of r c w d l
        #[arg(short, long, default_value = "r")]
        permissions: String,

        /// Expiry: an ISO 8601 time or a duration from now (30min, 1h, 7d)
        #[arg(short, long, default_value = "1h")]
        expiry: String,

        /// Start time, same formats as --expiry
        #[arg(long)]
        start: Option<String>,

        /// Only allow use over HTTPS
        #[arg(long)]
        https_only: bool,

        /// Allowed client address or range (a.b.c.d or a.b.c.d-e.f.g.h)
        #[arg(long)]
        ip: Option<IpAddressOrRange>,

        /// Print the full resource URL instead of the bare token
        #[arg(long)]
        url: bool,

        /// Decode TOKEN instead of minting one
        #[arg(long, value_name = "TOKEN", conflicts_with = "target")]
        inspect: Option<String>,
    },

    /// Show properties, metadata and copy state of a file
    Stat {
        /// share/path
        target: String,
    },

    /// List a directory
    #[command(alias = "ls")]
    List {
        /// share or share/directory
        target: String,
    },

    /// Upload a local file
    #[command(alias = "up")]
    Upload {
        local: PathBuf,

        /// share/path
        target: String,

        /// Content type; guessed from the local file name when omitted
        #[arg(long)]
        content_type: Option<String>,

        /// Store the content MD5 on the remote file
        #[arg(long)]
        md5: bool,
    },

    /// Download a file
    #[command(alias = "down")]
    Download {
        /// share/path
        target: String,

        /// Local path; defaults to the remote file name
        local: Option<PathBuf>,

        /// Overwrite an existing local file
        #[arg(short, long)]
        force: bool,
    },

    /// Server-side copy operations
    Copy {
        #[command(subcommand)]
        command: CopyCommands,
    },
}

#[derive(Subcommand)]
pub enum CopyCommands {
    /// Start copying SOURCE (a URL, with its own token if needed) into TARGET
    Start {
        source: String,

        /// Destination share/path
        target: String,

        /// Metadata for the destination (replaces the source's)
        #[arg(long = "meta", value_parser = parse_key_val::<String, String>)]
        metadata: Vec<(String, String)>,
    },

    /// Show the copy state of a destination
    Status { target: String },

    /// Abort a pending copy
    Abort { target: String, copy_id: String },

    /// Poll until the copy of a destination finishes
    Wait {
        target: String,

        /// Seconds between polls
        #[arg(long, default_value = "2")]
        interval: u64,
    },
}

impl Cli {
    /// Fold the command-line account settings into `config`.
    pub fn apply_overrides(&self, config: &mut ClientConfig) -> Result<()> {
        if let Some(connection_string) = &self.connection_string {
            let parsed = ClientConfig::from_connection_string(connection_string)?;
            config.account_name = parsed.account_name;
            config.account_key = parsed.account_key;
            config.sas_token = parsed.sas_token;
            config.file_endpoint = parsed.file_endpoint;
            config.secondary_endpoint = parsed.secondary_endpoint;
        }
        Ok(())
    }

    /// Whether the command talks to the service (and so needs a valid config).
    pub fn needs_service(&self) -> bool {
        !matches!(&self.command, Commands::Sas { inspect: Some(_), .. })
    }

    pub async fn execute(self, config: ClientConfig) -> Result<()> {
        let json = self.json;

        if let Commands::Sas {
            inspect: Some(token),
            ..
        } = &self.command
        {
            return execute_sas_inspect(token, json);
        }

        let client = config.build_client()?;
        match self.command {
            Commands::Sas {
                target,
                permissions,
                expiry,
                start,
                https_only,
                ip,
                url,
                inspect: _,
            } => {
                let target = target.ok_or_else(|| {
                    FileShareError::invalid_argument("A share or share/path is required")
                })?;
                let request = SasRequest {
                    permissions: SharedAccessPermissions::parse(&permissions)?,
                    expiry: parse_datetime_or_duration(&expiry)?,
                    start: start.as_deref().map(parse_datetime_or_duration).transpose()?,
                    protocol: https_only.then_some(SharedAccessProtocol::HttpsOnly),
                    ip,
                    url,
                };
                execute_sas(&client, &target, request)
            }
            Commands::Stat { target } => execute_stat(&client, &target, json).await,
            Commands::List { target } => execute_list(&client, &target, json).await,
            Commands::Upload {
                local,
                target,
                content_type,
                md5,
            } => execute_upload(&client, &local, &target, content_type, md5).await,
            Commands::Download {
                target,
                local,
                force,
            } => execute_download(&client, &target, local, force).await,
            Commands::Copy { command } => execute_copy(&client, command, json).await,
        }
    }
}

struct SasRequest {
    permissions: SharedAccessPermissions,
    expiry: chrono::DateTime<chrono::Utc>,
    start: Option<chrono::DateTime<chrono::Utc>>,
    protocol: Option<SharedAccessProtocol>,
    ip: Option<IpAddressOrRange>,
    url: bool,
}

/// Split `share[/path]`.
pub fn split_target(target: &str) -> Result<(&str, Option<&str>)> {
    let target = target.trim_matches('/');
    match target.split_once('/') {
        Some((share, path)) if !share.is_empty() && !path.is_empty() => Ok((share, Some(path))),
        None if !target.is_empty() => Ok((target, None)),
        _ => Err(FileShareError::invalid_argument(format!(
            "Invalid target '{target}', expected share or share/path"
        ))),
    }
}

fn file_target(client: &FileServiceClient, target: &str) -> Result<FileClient> {
    match split_target(target)? {
        (share, Some(path)) => client.share(share)?.file(path),
        (_, None) => Err(FileShareError::invalid_argument(format!(
            "'{target}' names a share, expected share/path"
        ))),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn execute_sas(client: &FileServiceClient, target: &str, request: SasRequest) -> Result<()> {
    let mut policy = SharedAccessPolicy::new(request.permissions, request.expiry);
    if let Some(start) = request.start {
        policy = policy.with_start(start);
    }

    let share = client.share(split_target(target)?.0)?;
    let (token, uri) = match split_target(target)? {
        (_, Some(path)) => {
            let file = share.file(path)?;
            let token = file.shared_access_signature(policy, None, request.protocol, request.ip)?;
            (token, file.uri().primary.clone())
        }
        (_, None) => {
            let token = share.shared_access_signature(policy, None, request.protocol, request.ip)?;
            let mut uri = share.uri().primary.clone();
            uri.set_query(Some("restype=share"));
            (token, uri)
        }
    };

    if request.url {
        let mut uri = uri;
        let query = match uri.query() {
            Some(existing) => format!("{existing}&{token}"),
            None => token,
        };
        uri.set_query(Some(&query));
        println!("{uri}");
    } else {
        println!("{token}");
    }
    Ok(())
}

fn execute_sas_inspect(token: &str, json: bool) -> Result<()> {
    let sas = SharedAccessSignature::parse(token)?;
    let permissions = sas.parsed_permissions()?;

    if json {
        return print_json(&json!({
            "version": sas.version,
            "resource": sas.resource,
            "permissions": permissions.to_permission_string(),
            "start": sas.start_time()?,
            "expiry": sas.expiry_time()?,
            "ip": sas.ip,
            "protocol": sas.protocol,
            "headers": sas.headers,
        }));
    }

    println!("Version:      {}", sas.version);
    println!("Resource:     {}", sas.resource);
    println!("Permissions:  {}", permissions.to_permission_string());
    if let Some(start) = sas.start_time()? {
        println!("Start:        {start}");
    }
    if let Some(expiry) = sas.expiry_time()? {
        println!("Expiry:       {expiry}");
    }
    if let Some(ip) = &sas.ip {
        println!("IP:           {ip}");
    }
    if let Some(protocol) = &sas.protocol {
        println!("Protocol:     {protocol}");
    }
    Ok(())
}

async fn execute_stat(client: &FileServiceClient, target: &str, json: bool) -> Result<()> {
    let mut file = file_target(client, target)?;
    file.fetch_attributes().await?;

    if json {
        return print_json(&json!({
            "share": file.share_name(),
            "path": file.path(),
            "properties": file.properties,
            "metadata": file.metadata,
            "copy": file.copy_state(),
        }));
    }

    let properties = &file.properties;
    println!("{}/{}", file.share_name(), file.path());
    println!("  Size:           {}", properties.content_length);
    if let Some(etag) = &properties.etag {
        println!("  ETag:           {etag}");
    }
    if let Some(last_modified) = properties.last_modified {
        println!("  Last modified:  {last_modified}");
    }
    if let Some(content_type) = &properties.content.content_type {
        println!("  Content type:   {content_type}");
    }
    if let Some(md5) = &properties.content_md5 {
        println!("  Content MD5:    {md5}");
    }
    println!("  Encrypted:      {}", properties.is_server_encrypted);
    for (key, value) in file.metadata.iter() {
        println!("  meta {key}: {value}");
    }
    if let Some(copy) = file.copy_state() {
        print_copy_state(copy);
    }
    Ok(())
}

async fn execute_list(client: &FileServiceClient, target: &str, json: bool) -> Result<()> {
    let (share, path) = split_target(target)?;
    let share = client.share(share)?;
    let directory = match path {
        Some(path) => share.directory(path)?,
        None => share.root_directory(),
    };
    let entries = directory.list().await?;

    if json {
        return print_json(&entries);
    }

    for entry in &entries {
        match entry.kind {
            EntryKind::Directory => println!("{:>12}  {}/", "<dir>", entry.name),
            EntryKind::File => println!(
                "{:>12}  {}",
                entry.content_length.unwrap_or_default(),
                entry.name
            ),
        }
    }
    Ok(())
}

async fn execute_upload(
    client: &FileServiceClient,
    local: &Path,
    target: &str,
    content_type: Option<String>,
    md5: bool,
) -> Result<()> {
    let mut source = tokio::fs::File::open(local).await.map_err(|e| {
        FileShareError::invalid_argument(format!("Failed to open {}: {e}", local.display()))
    })?;
    let size = source.metadata().await?.len();

    let mut file = file_target(client, target)?;
    file.properties.content.content_type = content_type
        .or_else(|| mime_guess::from_path(local).first().map(|mime| mime.to_string()));

    let options = OpenWriteOptions {
        store_content_md5: md5,
        ..OpenWriteOptions::default()
    };
    let mut stream = file.open_write(Some(size), options).await?;
    let mut chunk = vec![0u8; TRANSFER_CHUNK];
    loop {
        let read = source.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        stream.write(&chunk[..read]).await?;
    }
    stream.close().await?;

    info!(path = %local.display(), target, size, "uploaded file");
    println!("Uploaded {} ({size} bytes) to {target}", local.display());
    Ok(())
}

async fn execute_download(
    client: &FileServiceClient,
    target: &str,
    local: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let file = file_target(client, target)?;
    let output = local.unwrap_or_else(|| PathBuf::from(file.name()));
    if output.exists() && !force {
        return Err(FileShareError::invalid_argument(format!(
            "File '{}' already exists. Use --force to overwrite.",
            output.display()
        )));
    }

    let mut stream = file.open_read(OpenReadOptions::default()).await?;
    let mut sink = tokio::fs::File::create(&output).await?;
    let mut chunk = vec![0u8; TRANSFER_CHUNK];
    let mut total = 0u64;
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        sink.write_all(&chunk[..read]).await?;
        total += read as u64;
    }
    sink.flush().await?;

    println!("Downloaded {target} ({total} bytes) to {}", output.display());
    Ok(())
}

async fn execute_copy(client: &FileServiceClient, command: CopyCommands, json: bool) -> Result<()> {
    match command {
        CopyCommands::Start {
            source,
            target,
            metadata,
        } => {
            let source = Url::parse(&source)?;
            let mut file = file_target(client, &target)?;
            for (key, value) in metadata {
                file.metadata.insert(key, value);
            }
            let copy_id = file.start_copy(&source).await?;
            let status = file.copy_state().map(|state| state.status.to_string());
            if json {
                return print_json(&json!({ "copy_id": copy_id, "status": status }));
            }
            println!("Copy {copy_id} started ({})", status.unwrap_or_default());
            Ok(())
        }
        CopyCommands::Status { target } => {
            let mut file = file_target(client, &target)?;
            file.fetch_attributes().await?;
            if json {
                return print_json(&file.copy_state());
            }
            match file.copy_state() {
                Some(state) => print_copy_state(state),
                None => println!("{target} has never been a copy destination"),
            }
            Ok(())
        }
        CopyCommands::Abort { target, copy_id } => {
            let mut file = file_target(client, &target)?;
            file.abort_copy(&copy_id).await?;
            println!("Copy {copy_id} aborted");
            Ok(())
        }
        CopyCommands::Wait { target, interval } => {
            let mut file = file_target(client, &target)?;
            file.fetch_attributes().await?;
            let state = file
                .wait_for_copy(Duration::from_secs(interval.max(1)))
                .await?;
            if json {
                return print_json(&state);
            }
            print_copy_state(&state);
            Ok(())
        }
    }
}

fn print_copy_state(state: &CopyState) {
    println!("  Copy ID:        {}", state.copy_id);
    println!("  Copy status:    {}", state.status);
    if let Some(source) = &state.source {
        println!("  Copy source:    {source}");
    }
    if let (Some(copied), Some(total)) = (state.bytes_copied, state.total_bytes) {
        println!("  Copy progress:  {copied}/{total}");
    }
    if let Some(completed) = state.completion_time {
        println!("  Completed:      {completed}");
    }
    if let Some(description) = &state.status_description {
        println!("  Description:    {description}");
    }
}

fn parse_key_val<T, U>(
    s: &str,
) -> std::result::Result<(T, U), Box<dyn std::error::Error + Send + Sync + 'static>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: std::error::Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("share").unwrap(), ("share", None));
        assert_eq!(split_target("/share/a/b.txt").unwrap(), ("share", Some("a/b.txt")));
        assert!(split_target("").is_err());
        assert!(split_target("/").is_err());
    }

    #[test]
    fn test_parse_sas_command() {
        let cli = Cli::try_parse_from([
            "fshare", "sas", "share/dir/file.txt", "-p", "rw", "-e", "2h", "--https-only", "--ip",
            "10.0.0.1-10.0.0.9",
        ])
        .unwrap();
        match cli.command {
            Commands::Sas {
                target,
                permissions,
                https_only,
                ip,
                ..
            } => {
                assert_eq!(target.as_deref(), Some("share/dir/file.txt"));
                assert_eq!(permissions, "rw");
                assert!(https_only);
                assert_eq!(ip.unwrap().to_string(), "10.0.0.1-10.0.0.9");
            }
            _ => panic!("expected sas"),
        }
    }

    #[test]
    fn test_inspect_needs_no_service() {
        let cli = Cli::try_parse_from(["fshare", "sas", "--inspect", "sv=2019-02-02&sig=x"]).unwrap();
        assert!(!cli.needs_service());

        let cli = Cli::try_parse_from(["fshare", "copy", "start", "https://a/b", "s/f", "--meta", "k=v"])
            .unwrap();
        assert!(cli.needs_service());
    }
}
