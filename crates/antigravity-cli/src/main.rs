//! Antigravity CLI - run the evidence-locked analysis pipeline from a shell.
//!
//! stdout carries only JSON (the envelope, crash log, concept set or claim
//! comparison); logs go to stderr. `analyze` exits 0 on a success envelope and 2 on a crash log.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use antigravity_core::{
    DeterministicAnalyzer, EvidenceRegistry, EvidenceSource, PipelineOutput, RawAnalysisRequest,
};
use antigravity_runtime::audit::{self, AuditLogger, JsonlFileAuditSink};
use antigravity_runtime::supplier::{StaticEvidenceSupplier, SuppliedEvidence};
use antigravity_runtime::{Pipeline, PipelineConfig, ProviderRegistry, ReplayProvider};

/// Exit code for a run that ended in a crash log.
const CRASH_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "antigravity")]
#[command(about = "Evidence-locked prior-art analysis", long_about = None)]
#[command(version)]
struct Cli {
    /// Pipeline configuration (YAML, or JSON with a .json extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a request file
    Analyze {
        /// Request with `text`, `title` and `project_type`
        request: PathBuf,

        /// Plain-text prior art, registered as retrieved evidence
        #[arg(short, long = "evidence")]
        evidence: Vec<PathBuf>,

        /// Plain-text material from other sources, registered as external evidence
        #[arg(long = "external")]
        external: Vec<PathBuf>,

        /// Recorded reasoner responses to replay instead of the configured provider
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Append the audit record to this JSONL file
        #[arg(long)]
        audit: Option<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the deterministic concept set of a request
    Concepts {
        request: PathBuf,

        /// Plain-text prior art; concepts found in it are marked as known
        #[arg(short, long = "evidence")]
        evidence: Vec<PathBuf>,
    },

    /// Compare claims one by one against prior art
    Claims {
        /// JSON array of claims (.json), or one claim per line
        claims: PathBuf,

        /// Plain-text prior art, registered as retrieved evidence
        #[arg(short, long = "evidence")]
        evidence: Vec<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate the configuration and check the provider is ready, then
    /// print the configuration with defaults filled in
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Analyze {
            request,
            evidence,
            external,
            replay,
            audit,
            pretty,
        } => {
            analyze(
                config,
                &request,
                &evidence,
                &external,
                replay.as_deref(),
                audit,
                pretty,
            )
            .await
        }
        Commands::Concepts { request, evidence } => concepts(&config, &request, &evidence),
        Commands::Claims {
            claims: path,
            evidence,
            pretty,
        } => claims(&config, &path, &evidence, pretty),
        Commands::CheckConfig => check_config(&config).await,
    }
}

async fn analyze(
    config: PipelineConfig,
    request_path: &Path,
    evidence: &[PathBuf],
    external: &[PathBuf],
    replay: Option<&Path>,
    audit_path: Option<PathBuf>,
    pretty: bool,
) -> Result<ExitCode> {
    let request: RawAnalysisRequest = read_structured(request_path)?;

    let mut supplied = Vec::new();
    for path in evidence {
        supplied.push(SuppliedEvidence::retrieved(read_text(path)?));
    }
    for path in external {
        supplied.push(SuppliedEvidence::external(read_text(path)?));
    }

    if let Some(path) = audit_path.or_else(|| config.audit.path.clone()) {
        let sink = JsonlFileAuditSink::new(&path)
            .await
            .with_context(|| format!("opening audit log {}", path.display()))?;
        audit::init_global(AuditLogger::new(Arc::new(sink)))?;
    }

    let mut builder = Pipeline::builder().config(config);
    if !supplied.is_empty() {
        builder = builder.evidence_supplier(Arc::new(StaticEvidenceSupplier::new(
            "cli_files",
            supplied,
        )));
    }
    if let Some(path) = replay {
        let provider = ReplayProvider::from_file(path)
            .with_context(|| format!("loading replay file {}", path.display()))?;
        builder = builder.provider(Arc::new(provider));
    }
    let pipeline = builder.build()?;

    tracing::info!(provider = pipeline.provider_name(), "Running analysis");
    let output = pipeline.run(&request).await;

    if let Err(e) = audit::shutdown_global().await {
        tracing::error!(error = %e, "Failed to flush audit log");
    }

    print_json(&output, pretty)?;
    Ok(match output {
        PipelineOutput::Success(_) => ExitCode::SUCCESS,
        PipelineOutput::Crash(_) => ExitCode::from(CRASH_EXIT),
    })
}

fn concepts(config: &PipelineConfig, request_path: &Path, evidence: &[PathBuf]) -> Result<ExitCode> {
    let raw: RawAnalysisRequest = read_structured(request_path)?;
    let request = config.input_validator().validate(&raw)?;
    let analyzer = DeterministicAnalyzer::new(config.analyzer_config());
    let mut concepts = analyzer.analyze_request(&request)?;

    if !evidence.is_empty() {
        let registry = evidence_registry(request.text(), evidence)?;
        concepts.mark_known(&analyzer.candidate_overlaps(&concepts, &registry));
    }

    print_json(&concepts, true)?;
    Ok(ExitCode::SUCCESS)
}

fn claims(
    config: &PipelineConfig,
    claims_path: &Path,
    evidence: &[PathBuf],
    pretty: bool,
) -> Result<ExitCode> {
    let claims = read_claims(claims_path)?;
    let registry = evidence_registry(&claims.join("\n"), evidence)?;
    let comparison =
        DeterministicAnalyzer::new(config.analyzer_config()).compare_claims(&claims, &registry)?;
    print_json(&comparison, pretty)?;
    Ok(ExitCode::SUCCESS)
}

/// A sealed registry holding `user_text` and each evidence file as retrieved prior art.
fn evidence_registry(user_text: &str, evidence: &[PathBuf]) -> Result<EvidenceRegistry> {
    let mut registry = EvidenceRegistry::new();
    registry.register(EvidenceSource::UserInput, user_text)?;
    for path in evidence {
        registry.register(EvidenceSource::Retrieved, read_text(path)?)?;
    }
    registry.seal();
    Ok(registry)
}

fn read_claims(path: &Path) -> Result<Vec<String>> {
    let content = read_text(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
        }
        _ => Ok(split_claims(&content)),
    }
}

/// One claim per non-blank line.
fn split_claims(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

async fn check_config(config: &PipelineConfig) -> Result<ExitCode> {
    config.validate()?;

    let providers = ProviderRegistry::with_defaults();
    if !providers.has_provider(&config.provider.kind) {
        let available: Vec<String> = providers
            .summaries()
            .into_iter()
            .map(|(kind, summary)| format!("  {:<8} {}", kind, summary))
            .collect();
        bail!(
            "provider '{}' is not available in this build; available:\n{}",
            config.provider.kind,
            available.join("\n")
        );
    }
    let provider = providers
        .create_ready(&config.provider.kind, &config.provider.options)
        .await?;
    tracing::info!(provider = provider.name(), "Provider ready");

    print!("{}", serde_yaml::to_string(config)?);
    Ok(ExitCode::SUCCESS)
}

/// Read a JSON or YAML file, chosen by extension.
fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = read_text(path)?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?,
    };
    Ok(parsed)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}
