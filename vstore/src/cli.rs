//! This module implements the CLI interface for vstore: command parsing, config
//! resolution, and orchestration of the upload pipeline in [`vstore-core`].
//!
//! All pipeline logic (resolution, metadata merging, batching) lives in the core
//! crate. This module is glue: it maps arguments to an [`UploadRequest`], builds
//! the HTTP client and completion cache, and prints results.
//!
//! ## How To Use
//! - For command-line users: run the `vstore` binary with `--help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
//!
//! [`vstore-core`]: ../../vstore-core/

use crate::completion_cache::FileCompletionCache;
use crate::load_config::resolve_config;
use crate::upload::ApiClient;
use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use vstore_core::batch::{upload_files, BatchOptions, UploadOutcome};
use vstore_core::config::Config;
use vstore_core::contract::{CompletionCache, StoreClient, Strategy, TargetKind, UploadTarget};
use vstore_core::existing::build_existing_index;
use vstore_core::pipeline::{
    prepare_uploads, render_preview, resolve_parallel, PreparedUpload, UploadRequest,
};

/// CLI for vstore: upload local files to hosted stores and vector stores.
#[derive(Parser, Debug)]
#[clap(
    name = "vstore",
    version,
    about = "Upload local files to hosted stores and vector stores"
)]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// API key (overrides VSTORE_API_KEY and the config file)
    #[clap(long, global = true)]
    pub api_key: Option<String>,

    /// API base URL (overrides VSTORE_BASE_URL and the config file)
    #[clap(long, global = true)]
    pub base_url: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage stores
    Stores {
        #[clap(subcommand)]
        command: StoreCommands,
    },
    /// Manage vector stores
    VectorStores {
        #[clap(subcommand)]
        command: StoreCommands,
    },
    /// Inspect the resolved configuration
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
    /// Shell completion helpers
    Completion {
        #[clap(subcommand)]
        command: CompletionCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum StoreCommands {
    /// Upload files matching patterns (or listed in a manifest)
    Upload(UploadArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the resolved configuration (API key redacted)
    Show,
}

#[derive(Subcommand, Debug)]
pub enum CompletionCommands {
    /// Fetch store names from the API into the completion cache
    Refresh,
    /// Print cached names, most recently used first
    List {
        #[clap(value_enum)]
        kind: CompletionKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionKind {
    Stores,
    VectorStores,
}

impl From<CompletionKind> for TargetKind {
    fn from(kind: CompletionKind) -> Self {
        match kind {
            CompletionKind::Stores => TargetKind::Store,
            CompletionKind::VectorStores => TargetKind::VectorStore,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct UploadArgs {
    /// Store name or id
    pub store: String,

    /// Glob patterns, relative to the current directory
    pub patterns: Vec<String>,

    /// JSON/YAML manifest listing files and per-entry settings
    #[clap(long)]
    pub manifest: Option<PathBuf>,

    /// JSON/YAML file mapping file paths to metadata objects
    #[clap(long)]
    pub metadata_map: Option<PathBuf>,

    /// Parsing strategy: fast or high_quality
    #[clap(long)]
    pub strategy: Option<Strategy>,

    /// Enable contextualization (stores only); `--contextualization=false` disables it
    #[clap(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub contextualization: Option<bool>,

    /// Metadata JSON object applied to every file
    #[clap(long)]
    pub metadata: Option<String>,

    /// Show what would be uploaded without uploading
    #[clap(long)]
    pub dry_run: bool,

    /// Number of concurrent uploads per window
    #[clap(long)]
    pub parallel: Option<usize>,

    /// Replace files previously uploaded from the same path
    #[clap(long)]
    pub unique: bool,
}

impl UploadArgs {
    /// Rejects `--contextualization false` written with a space: clap reads the
    /// flag as `true` and the bare word as a file pattern.
    pub fn check_contextualization_value(&self) -> Result<()> {
        if self.contextualization.is_none() {
            return Ok(());
        }
        if let Some(word) = self
            .patterns
            .iter()
            .find(|p| matches!(p.as_str(), "true" | "false") && !std::path::Path::new(p).exists())
        {
            anyhow::bail!(
                "`{word}` was read as a file pattern; write --contextualization={word} to set the flag"
            );
        }
        Ok(())
    }

    pub fn to_request(&self) -> UploadRequest {
        UploadRequest {
            patterns: self.patterns.clone(),
            manifest: self.manifest.clone(),
            metadata_map: self.metadata_map.clone(),
            strategy: self.strategy,
            contextualization: self.contextualization,
            metadata: self.metadata.clone(),
            parallel: self.parallel,
        }
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(key) = cli.api_key {
        config.api_key = Some(key);
    }
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }
    config.trace_loaded();

    let cache = FileCompletionCache::default_location();
    let cache = cache.as_ref().map(|c| c as &dyn CompletionCache);

    match cli.command {
        Commands::Stores {
            command: StoreCommands::Upload(args),
        } => upload(args, TargetKind::Store, &config, cache).await,
        Commands::VectorStores {
            command: StoreCommands::Upload(args),
        } => upload(args, TargetKind::VectorStore, &config, cache).await,
        Commands::Config {
            command: ConfigCommands::Show,
        } => {
            print!("{}", render_config(&config)?);
            Ok(())
        }
        Commands::Completion {
            command: CompletionCommands::Refresh,
        } => {
            let cache = cache.context("cannot locate the completion cache: $HOME is not set")?;
            let client = ApiClient::from_config(&config)?;
            refresh_completions(&client, cache).await
        }
        Commands::Completion {
            command: CompletionCommands::List { kind },
        } => {
            if let Some(cache) = cache {
                for name in cache.get(kind.into()) {
                    println!("{name}");
                }
            }
            Ok(())
        }
    }
}

/// The `upload` subcommand for either target kind.
pub async fn upload(
    args: UploadArgs,
    kind: TargetKind,
    config: &Config,
    cache: Option<&dyn CompletionCache>,
) -> Result<()> {
    let target = UploadTarget::new(kind, args.store.clone());
    let request = args.to_request();
    tracing::info!(command = "upload", store = %target, patterns = request.patterns.len(), "Starting upload command");

    if args.contextualization.is_some() && !kind.supports_contextualization() {
        tracing::warn!(store = %target, "--contextualization is ignored for vector stores");
    }

    args.check_contextualization_value()?;

    let base_dir = std::env::current_dir().context("failed to read the current directory")?;
    let prepared = prepare_uploads(&request, &base_dir, &config.defaults)?;
    if prepared.is_empty() {
        println!("No files found matching the given patterns.");
        return Ok(());
    }

    if args.dry_run {
        print!("{}", render_preview(&prepared, &target));
        return Ok(());
    }

    let parallel = resolve_parallel(request.parallel, &config.defaults, kind)?;
    let client = ApiClient::from_config(config)?;
    let outcome = upload_prepared(&client, &target, &prepared, parallel, args.unique, cache).await?;
    if outcome.has_failures() {
        tracing::warn!(
            store = %target,
            failed = outcome.failed,
            total = outcome.total(),
            "Some files failed to upload"
        );
    }
    tracing::info!(
        command = "upload",
        total = outcome.total(),
        uploaded = outcome.uploaded,
        updated = outcome.updated,
        skipped = outcome.skipped,
        failed = outcome.failed,
        "Upload command complete"
    );
    Ok(())
}

/// Uploads already prepared descriptors and records the store as recently used.
///
/// With `unique`, the existing-file index is built first; a listing failure
/// aborts before anything is uploaded.
pub async fn upload_prepared<C>(
    client: &C,
    target: &UploadTarget,
    prepared: &PreparedUpload,
    parallel: usize,
    unique: bool,
    cache: Option<&dyn CompletionCache>,
) -> Result<UploadOutcome>
where
    C: StoreClient + ?Sized,
{
    let existing = if unique {
        let index = build_existing_index(client, target, &prepared.files).await?;
        let replacing = prepared
            .files
            .iter()
            .filter(|f| index.contains(&f.relative_path))
            .count();
        tracing::info!(store = %target, replacing, "Existing copies will be replaced");
        Some(index)
    } else {
        None
    };

    let options = BatchOptions {
        parallel,
        inline_config: prepared.from_manifest,
    };
    let outcome = upload_files(client, target, &prepared.files, existing.as_ref(), &options).await;

    if let Some(cache) = cache {
        if let Err(e) = cache.update(target.kind, &target.id) {
            tracing::warn!(error = %e, store = %target, "Failed to update completion cache");
        }
    }
    Ok(outcome)
}

/// Replaces the cached names of both target kinds with the API's current lists.
pub async fn refresh_completions<C>(client: &C, cache: &dyn CompletionCache) -> Result<()>
where
    C: StoreClient + ?Sized,
{
    for kind in [TargetKind::Store, TargetKind::VectorStore] {
        let names = client
            .list_store_names(kind)
            .await
            .with_context(|| format!("failed to list {} names", kind.label()))?;
        let count = names.len();
        cache
            .refresh(kind, names)
            .with_context(|| format!("failed to write {} completions", kind.label()))?;
        println!("Cached {count} {} name(s)", kind.label());
    }
    Ok(())
}

/// YAML rendering of the config with the API key masked.
pub fn render_config(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    shown.api_key = shown.api_key.as_deref().map(redact_key);
    serde_yaml::to_string(&shown).context("failed to render config")
}

fn redact_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
