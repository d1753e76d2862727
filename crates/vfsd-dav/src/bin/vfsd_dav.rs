//! vfsd-dav: Inspect and modify a WebDAV share from the terminal.
//!
//! Mounts the share the way the daemon would (root discovery, prompts,
//! certificate overrides) and runs one operation against it.
//!
//! # Usage
//!
//! ```bash
//! vfsd-dav davs://alice@dav.example.test/remote.php/dav/files/alice/ ls /
//! vfsd-dav https://dav.example.test/share/ put ./report.pdf /docs/report.pdf
//! ```

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use secrecy::SecretString;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use url::Url;
use vfsd_backend::{
    AskPasswordFlags, AttributeMatcher, Backend, BackendRegistry, CopyFlags, FileType, JobContext,
    MemoryKeyring, MountSource, MountSpec, PasswordReply, PasswordSave, QueryInfoFlags, VfsError,
};
use vfsd_dav::{DavConfig, ReqwestTransport};

/// Inspect and modify a WebDAV share.
#[derive(Parser, Debug)]
#[command(name = "vfsd-dav")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Share location (dav://, davs://, http:// or https://)
    #[arg(value_name = "URI")]
    uri: String,

    /// Settings file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show metadata of a file or directory
    Info { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file to stdout
    Cat { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file or an empty directory
    Rm { path: String },
    /// Move or rename
    Mv {
        source: String,
        destination: String,
        /// Replace an existing destination
        #[arg(short, long)]
        force: bool,
    },
    /// Upload a local file
    Put {
        local: PathBuf,
        destination: String,
        /// Replace an existing destination
        #[arg(short, long)]
        force: bool,
    },
    /// Show filesystem usage
    Df,
}

/// Prompts on the controlling terminal.
struct TerminalSource;

fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).ok()?;
    Some(line.trim().to_string())
}

#[async_trait]
impl MountSource for TerminalSource {
    async fn ask_password(
        &self,
        message: &str,
        default_user: Option<&str>,
        _default_domain: Option<&str>,
        flags: AskPasswordFlags,
    ) -> PasswordReply {
        let message = message.to_string();
        let default_user = default_user.map(str::to_string);
        let answer = tokio::task::spawn_blocking(move || {
            println!("{}", message);
            let username = if flags.contains(AskPasswordFlags::NEED_USERNAME) {
                let entered = read_line("Username: ")?;
                if entered.is_empty() {
                    default_user
                } else {
                    Some(entered)
                }
            } else {
                None
            };
            let password = rpassword::prompt_password("Password: ").ok()?;
            Some((username, password))
        })
        .await;

        match answer {
            Ok(Some((username, password))) => PasswordReply::Answered {
                username,
                password: SecretString::new(password),
                save: PasswordSave::ForSession,
            },
            _ => PasswordReply::Aborted,
        }
    }

    async fn ask_certificate(&self, host: &str, _certificate: &[u8], errors: &[&str]) -> bool {
        let mut text = format!("The certificate of {} is not trusted:\n", host);
        for reason in errors {
            text.push_str(&format!("  - {}\n", reason));
        }
        text.push_str("Connect anyway? [y/N] ");
        let answer = tokio::task::spawn_blocking(move || read_line(&text)).await;
        matches!(answer, Ok(Some(a)) if a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes"))
    }
}

/// Turns a share URI into a mount spec.
fn spec_from_location(location: &str) -> Result<MountSpec, String> {
    let uri = Url::parse(location).map_err(|e| format!("Invalid URI {}: {}", location, e))?;
    let ssl = match uri.scheme() {
        "dav" | "http" => false,
        "davs" | "https" => true,
        other => return Err(format!("Unsupported scheme: {}", other)),
    };
    let host = uri
        .host_str()
        .ok_or_else(|| format!("No host in {}", location))?;
    let mut spec = MountSpec::new("dav")
        .with("host", host)
        .with("ssl", if ssl { "true" } else { "false" });
    if !uri.username().is_empty() {
        spec.set("user", uri.username());
    }
    if let Some(port) = uri.port() {
        spec.set("port", port.to_string());
    }
    let prefix = vfsd_dav::path::decode_path(uri.path())
        .ok_or_else(|| format!("Invalid path in {}", location))?;
    Ok(spec.with_prefix(&prefix))
}

fn type_label(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Directory => "directory",
        FileType::Regular => "file",
        FileType::SymbolicLink => "link",
        FileType::Unknown => "unknown",
    }
}

async fn run(backend: Arc<dyn Backend>, job: &JobContext, command: Command) -> Result<(), VfsError> {
    let all = AttributeMatcher::all();
    match command {
        Command::Info { path } => {
            let info = backend
                .query_info(job, &path, QueryInfoFlags::default(), &all)
                .await?;
            println!("name: {}", info.name);
            println!("display name: {}", info.display_name);
            println!("type: {}", type_label(info.file_type));
            if let Some(size) = info.size {
                println!("size: {}", size);
            }
            if let Some(content_type) = &info.content_type {
                println!("content type: {}", content_type);
            }
            if let Some(modified) = info.modified {
                println!("modified: {}", modified.to_rfc3339());
            }
            if let Some(etag) = &info.etag {
                println!("etag: {}", etag);
            }
        }
        Command::Ls { path } => {
            for entry in backend
                .enumerate(job, &path, QueryInfoFlags::default(), &all)
                .await?
            {
                let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
                let marker = if entry.is_dir() { "/" } else { "" };
                println!("{:>12}  {}{}", size, entry.display_name, marker);
            }
        }
        Command::Cat { path } => {
            let mut handle = backend.open_for_read(job, &path).await?;
            let mut stdout = std::io::stdout().lock();
            loop {
                let chunk = handle.read(job, 64 * 1024).await?;
                if chunk.is_empty() {
                    break;
                }
                stdout.write_all(&chunk)?;
            }
            stdout.flush()?;
            handle.close(job).await?;
        }
        Command::Mkdir { path } => backend.make_directory(job, &path).await?,
        Command::Rm { path } => backend.delete(job, &path).await?,
        Command::Mv {
            source,
            destination,
            force,
        } => {
            let flags = CopyFlags {
                overwrite: force,
                ..CopyFlags::default()
            };
            backend.move_to(job, &source, &destination, flags).await?;
        }
        Command::Put {
            local,
            destination,
            force,
        } => {
            let flags = CopyFlags {
                overwrite: force,
                ..CopyFlags::default()
            };
            backend
                .push(job, &destination, &local, flags, false)
                .await?;
            info!("Uploaded {} to {}", local.display(), destination);
        }
        Command::Df => {
            let fs = backend.query_fs_info(job, "/", &all).await?;
            println!("type: {}", fs.fs_type);
            let show = |v: Option<u64>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
            println!("size: {}", show(fs.size));
            println!("used: {}", show(fs.used));
            println!("free: {}", show(fs.free));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let config = match &args.config {
        Some(path) => match DavConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => DavConfig::default(),
    };

    let spec = match spec_from_location(&args.uri) {
        Ok(spec) => spec,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let transport = match ReqwestTransport::shared(&config) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to set up HTTP client: {}", e);
            process::exit(1);
        }
    };
    let mut registry = BackendRegistry::new();
    vfsd_dav::register(
        &mut registry,
        transport,
        Arc::new(MemoryKeyring::new()),
        config,
    );

    let backend = match registry.create(&spec) {
        Ok(b) => b,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    // Cancel outstanding requests on Ctrl+C
    let job = JobContext::new();
    let cancel = job.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match backend.mount(&job, &spec, Arc::new(TerminalSource), false).await {
        Ok(mounted) => info!("Mounted {} ({})", mounted.display_name, mounted.spec),
        Err(e) => {
            error!("Mount failed: {}", e);
            process::exit(1);
        }
    }

    let result = run(backend.clone(), &job, args.command).await;
    let _ = backend.unmount(&job).await;
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
