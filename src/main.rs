//! Command-line front end: HTML (+ CSS) files in, clipboard JSON out.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use weft_config::WeftConfig;
use weft_io::AnthropicAssistant;
use weft_ir::html::{HtmlBackend, collect_inline_styles};
use weft_ir::schema::validate_xscp_data;
use weft_ir::{RepairLoop, SemanticAssistant, Transcoder, TranscodeOutput};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Transcode static HTML and CSS into a page-builder clipboard graph")]
struct Args {
    /// HTML files to transcode; each one is processed on its own
    #[arg(required = true)]
    html: Vec<PathBuf>,

    /// Stylesheets, concatenated in order. Inline <style> blocks are used when none is given
    #[arg(long = "css")]
    css: Vec<PathBuf>,

    /// Clipboard JSON output (a directory when several HTML files are given)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Embed CSS output (single input only)
    #[arg(long)]
    embed_out: Option<PathBuf>,

    /// Report JSON output (single input only)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Id prefix for nodes and styles
    #[arg(long)]
    prefix: Option<String>,

    /// Configuration file (defaults to ./weft.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the semantic repair service
    #[arg(long)]
    no_repair: bool,

    /// Parse markup with the built-in tokenizer instead of html5ever
    #[arg(long)]
    fallback_parser: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => WeftConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => WeftConfig::load_or_default(),
    };
    config.merge_with_env();
    if let Some(prefix) = &args.prefix {
        config.pipeline.id_prefix = Some(prefix.clone());
    }
    if args.no_repair {
        config.repair.enabled = false;
    }

    let css = read_stylesheets(&args.css)?;
    let backend = if args.fallback_parser {
        HtmlBackend::Tokenizer
    } else {
        HtmlBackend::Dom
    };

    if config.repair.is_usable() {
        match AnthropicAssistant::from_config(&config.repair) {
            Ok(assistant) => {
                let repair = RepairLoop::new(&config.repair, assistant);
                let transcoder = Transcoder::with_repair(&config.pipeline, repair).with_backend(backend);
                return run_batch(&transcoder, &args, css.as_deref()).await;
            }
            Err(err) => warn!(error = %err, "semantic repair disabled"),
        }
    } else if config.repair.enabled {
        info!("no API key configured; running deterministic passes only");
    }
    let transcoder = Transcoder::new(&config.pipeline).with_backend(backend);
    run_batch(&transcoder, &args, css.as_deref()).await
}

fn read_stylesheets(paths: &[PathBuf]) -> Result<Option<String>> {
    if paths.is_empty() {
        return Ok(None);
    }
    let mut sheets = Vec::with_capacity(paths.len());
    for path in paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read stylesheet {}", path.display()))?;
        sheets.push(text);
    }
    Ok(Some(sheets.join("\n")))
}

/// Transcode every input. A file that cannot be read or written is logged
/// and skipped; the batch goes on.
async fn run_batch<A: SemanticAssistant>(
    transcoder: &Transcoder<A>,
    args: &Args,
    css: Option<&str>,
) -> Result<()> {
    let batch = args.html.len() > 1;
    if batch {
        if let Some(dir) = &args.out {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        }
    }

    let mut failed = 0usize;
    for path in &args.html {
        if let Err(err) = transcode_file(transcoder, args, css, path, batch).await {
            error!(file = %path.display(), error = %format!("{err:#}"), "skipping file");
            failed += 1;
        }
    }
    if failed > 0 {
        warn!(failed, total = args.html.len(), "some files were skipped");
    }
    Ok(())
}

async fn transcode_file<A: SemanticAssistant>(
    transcoder: &Transcoder<A>,
    args: &Args,
    css: Option<&str>,
    path: &Path,
    batch: bool,
) -> Result<()> {
    let html = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let inline;
    let css = match css {
        Some(css) => css,
        None => {
            inline = collect_inline_styles(&html);
            inline.as_str()
        }
    };

    let output = transcoder.transcode(&html, css).await;
    for warning in &output.warnings {
        warn!(file = %path.display(), kind = ?warning.kind, "{}", warning.message);
    }
    if let Some(data) = &output.data {
        if let Err(err) = validate_xscp_data(data) {
            warn!(file = %path.display(), error = %err, "output does not match the clipboard schema");
        }
    }
    info!(
        file = %path.display(),
        status = ?output.report.status,
        prefix = %output.prefix,
        "transcoded"
    );
    write_outputs(&output, args, path, batch)
}

fn write_outputs(output: &TranscodeOutput, args: &Args, source: &Path, batch: bool) -> Result<()> {
    let graph = match &output.data {
        Some(data) => data.to_json_pretty()?,
        None => "null".to_string(),
    };
    let report = serde_json::to_string_pretty(&output.report)?;

    if batch {
        let Some(dir) = &args.out else {
            println!("{graph}");
            return Ok(());
        };
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        write(&dir.join(format!("{stem}.json")), &graph)?;
        write(&dir.join(format!("{stem}.embed.css")), &output.routed.embed)?;
        write(&dir.join(format!("{stem}.report.json")), &report)?;
        return Ok(());
    }

    match &args.out {
        Some(path) => write(path, &graph)?,
        None => println!("{graph}"),
    }
    if let Some(path) = &args.embed_out {
        write(path, &output.routed.embed)?;
    }
    if let Some(path) = &args.report {
        write(path, &report)?;
    }
    Ok(())
}

fn write(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
