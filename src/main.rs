use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::warn;

use casita_evidence::cli::{Args, Commands, Provider, UrlProvider};
use casita_evidence::{
    cloudinary_thumbnail_url, collect_image_files, compress_to_dir, get_original_cloudinary_url,
    logger, optimize_cloudinary_url, optimize_imagekit_url, status, verbose, AuthService,
    BatchReport, BatchUploader, CloudinaryClient, CompressOptions, Config, EvidenceError,
    ImageHost, ImageKitClient, LocalStore, ProxyUploadClient, QueueWorker, RecoveryPrompt,
    RecoverySummary, SupabaseClient, UploadPersistence, UploadRequest, WorkerMessage,
};

const DEFAULT_PROXY_URL: &str = "http://localhost:3000";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logger::set_quiet_mode(args.quiet);
    logger::set_verbose_mode(args.verbose);
    logger::init_tracing(args.verbose);

    let mut config = Config::from_env()?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    match args.command {
        Commands::Compress {
            input,
            output,
            width,
            quality,
            format,
            recursive,
        } => {
            let options = CompressOptions::new(
                width.or(Some(config.compression.max_width)),
                quality.or(Some(config.compression.quality)),
                format.as_deref(),
            )?;
            compress_all(&input, &output, &options, recursive)?;
        }
        Commands::Upload {
            input,
            record,
            field,
            provider,
            proxy_url,
            custom_name,
            recursive,
            width,
            quality,
        } => {
            let persistence = open_persistence(&config)?;
            announce_pending(&persistence)?;

            let files = collect_inputs(&input, recursive)?;
            if files.len() > 1 && custom_name.is_some() {
                bail!("--custom-name only applies to a single file");
            }
            let requests: Vec<UploadRequest> = files
                .iter()
                .map(|path| {
                    let request = UploadRequest::new(path, &record, &field);
                    match &custom_name {
                        Some(name) => request.with_custom_name(name),
                        None => request,
                    }
                })
                .collect();

            let options = CompressOptions::new(
                width.or(Some(config.compression.max_width)),
                quality.or(Some(config.compression.quality)),
                None,
            )?;
            let uploader = build_uploader(&config, provider, proxy_url, options)?
                .with_persistence(persistence);

            status!(
                "📤 Uploading {} file(s) to {} for record {}",
                requests.len(),
                uploader.provider(),
                record
            );
            let report = uploader.upload_batch(&requests).await;
            print_report(&report);
            if report.failed() > 0 {
                bail!("{} of {} uploads failed", report.failed(), report.files.len());
            }
        }
        Commands::Resume {
            yes,
            dismiss,
            provider,
            proxy_url,
        } => {
            let persistence = open_persistence(&config)?;
            persistence.clear_expired()?;

            let Some(summary) = RecoveryPrompt::check(&persistence)? else {
                status!("✅ No pending uploads");
                return Ok(());
            };
            print_summary(&summary);

            if dismiss {
                RecoveryPrompt::dismiss(&persistence)?;
                status!("🗑️  Discarded {} pending session(s)", summary.sessions.len());
                return Ok(());
            }
            if !yes && !confirm("Resume these uploads?")? {
                status!("Left pending uploads untouched");
                return Ok(());
            }

            let options = CompressOptions::new(
                Some(config.compression.max_width),
                Some(config.compression.quality),
                None,
            )?;
            let uploader = build_uploader(&config, provider, proxy_url, options)?;
            let (handle, worker) = QueueWorker::spawn(uploader, persistence);
            RecoveryPrompt::resume(&handle);
            handle.post_message(WorkerMessage::Shutdown);

            let stats = worker.await.context("queue worker panicked")?;
            status!(
                "📊 Resumed uploads: {} succeeded, {} failed",
                stats.uploaded,
                stats.failed
            );
            if stats.failed > 0 {
                bail!("{} resumed uploads failed", stats.failed);
            }
        }
        Commands::OptimizeUrl {
            url,
            provider,
            width,
            height,
            endpoint,
            original,
        } => {
            let optimized = match provider {
                UrlProvider::Cloudinary if original => get_original_cloudinary_url(&url),
                UrlProvider::Cloudinary => match (width, height) {
                    (Some(w), Some(h)) => cloudinary_thumbnail_url(&url, w, h),
                    (None, None) => optimize_cloudinary_url(&url),
                    _ => bail!("--width and --height must be given together"),
                },
                UrlProvider::Imagekit => {
                    let endpoint = endpoint
                        .or_else(|| config.imagekit.url_endpoint.clone())
                        .context("--endpoint or IMAGEKIT_URL_ENDPOINT is required for ImageKit")?;
                    let (Some(w), Some(h)) = (width, height) else {
                        bail!("ImageKit transformations need --width and --height");
                    };
                    optimize_imagekit_url(&url, &endpoint, w, h)
                }
            };
            println!("{}", optimized);
        }
        Commands::Revision { id, json } => {
            let supabase = SupabaseClient::from_config(&config)?;
            let Some(revision) = supabase.get_revision(id).await? else {
                bail!("revision {} not found", id);
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&revision)?);
            } else {
                println!(
                    "📋 Revision {} ({})",
                    revision.id,
                    revision.casita().unwrap_or_else(|| "sin casita".to_string())
                );
                let urls = revision.evidence_urls();
                if urls.is_empty() {
                    println!("   no evidence uploaded");
                }
                for (field, url) in urls {
                    println!("   {}: {}", field, url);
                }
            }
        }
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_line("Password: ")?,
            };
            let auth = AuthService::new(
                Arc::new(SupabaseClient::from_config(&config)?),
                LocalStore::open(&config.data_dir)?,
            );
            let session = auth.login(&username, &password).await?;
            status!("✅ Logged in as {} ({})", session.username, session.role);
        }
        Commands::Logout => {
            AuthService::local(LocalStore::open(&config.data_dir)?).logout()?;
            status!("👋 Logged out");
        }
        Commands::Whoami => {
            let auth = AuthService::local(LocalStore::open(&config.data_dir)?);
            match auth.current_session()? {
                Some(session) => println!("{} ({})", session.username, session.role),
                None => println!("Not logged in"),
            }
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            casita_evidence::server::serve(&config).await?;
        }
    }

    Ok(())
}

fn compress_all(input: &str, output: &Path, options: &CompressOptions, recursive: bool) -> Result<()> {
    let files = collect_inputs(input, recursive)?;
    verbose!("Found {} image(s) under {}", files.len(), input);

    let mut failed = 0;
    for file in &files {
        if let Err(e) = compress_to_dir(file, output, options) {
            warn!(file = %file.display(), error = %e, "compression failed");
            status!("❌ {}: {}", file.display(), e);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} images failed to compress", failed, files.len());
    }
    Ok(())
}

fn collect_inputs(input: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let files = collect_image_files(input, recursive)?;
    if files.is_empty() {
        return Err(EvidenceError::NoImageFilesFound(input.to_string()).into());
    }
    Ok(files)
}

fn open_persistence(config: &Config) -> Result<UploadPersistence> {
    let store = LocalStore::open(&config.data_dir)
        .with_context(|| format!("cannot open local store in {}", config.data_dir.display()))?;
    Ok(UploadPersistence::new(store))
}

fn build_uploader(
    config: &Config,
    provider: Provider,
    proxy_url: Option<String>,
    options: CompressOptions,
) -> Result<BatchUploader> {
    let host: Arc<dyn ImageHost> = match provider {
        Provider::Cloudinary => Arc::new(CloudinaryClient::from_config(&config.cloudinary)?),
        Provider::Imagekit => Arc::new(ImageKitClient::from_config(&config.imagekit)?),
        Provider::Proxy => Arc::new(ProxyUploadClient::new(
            proxy_url.unwrap_or_else(|| DEFAULT_PROXY_URL.to_string()),
        )),
    };

    let uploader = BatchUploader::new(host, options);
    Ok(match SupabaseClient::from_config(config) {
        Ok(supabase) => uploader.with_recorder(Arc::new(supabase)),
        Err(e) => {
            verbose!("URLs will not be recorded: {}", e);
            uploader
        }
    })
}

/// Mentions sessions left over from an earlier run before starting a new one.
fn announce_pending(persistence: &UploadPersistence) -> Result<()> {
    persistence.clear_expired()?;
    if let Some(summary) = RecoveryPrompt::check(persistence)? {
        status!(
            "⚠️  {} unfinished upload(s) from an earlier run; `casita-evidence resume` picks them up",
            summary.unfinished_files()
        );
    }
    Ok(())
}

fn print_summary(summary: &RecoverySummary) {
    status!("⏸️  Pending upload sessions:");
    for session in &summary.sessions {
        let when = session
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        status!(
            "   {} ({}): {} of {} file(s) unfinished",
            session.session_id,
            when,
            session.unfinished,
            session.total
        );
    }
}

fn print_report(report: &BatchReport) {
    for file in &report.files {
        match (&file.url, &file.error) {
            (Some(url), _) => status!("✅ {} → {}", file.file_name, url),
            (None, Some(error)) => status!("❌ {}: {}", file.file_name, error),
            (None, None) => status!("⏸️  {}: {:?}", file.file_name, file.status),
        }
    }
    status!(
        "📊 Batch complete: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt_line(&format!("{} [y/N] ", question))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "si" | "sí"))
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
