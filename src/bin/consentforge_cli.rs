//! ConsentForge CLI - Bridge interface for the dashboard backend
//!
//! Commands: validate, generate, preview
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation failure

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use consentforge_core::{
    BannerTemplate, EngineConfig, GeneratedArtifacts, GenerationOptions, GenerationPipeline,
    OutputFormat, PipelineError,
};

#[derive(Parser)]
#[command(name = "consentforge-cli")]
#[command(about = "ConsentForge CLI - Consent Banner Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a banner template
    Validate {
        /// Template file (JSON)
        #[arg(short, long)]
        template: PathBuf,
    },

    /// Generate markup, stylesheet, panel and script
    Generate {
        /// Template file (JSON)
        #[arg(short, long)]
        template: PathBuf,

        /// Generation options (JSON object)
        #[arg(short, long, default_value = "{}")]
        options: String,

        /// Also write the artifacts as files into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Write a standalone HTML page that runs the banner
    Preview {
        /// Template file (JSON)
        #[arg(short, long)]
        template: PathBuf,

        /// Output HTML file
        #[arg(short = 'O', long, default_value = "preview.html")]
        out: PathBuf,

        /// Language to render
        #[arg(short, long)]
        language: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "consentforge_core=debug" } else { "consentforge_core=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn emit(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => println!(r#"{{"success": false, "error": "{}"}}"#, e),
    }
}

fn failure(error: &PipelineError) -> ExitCode {
    match error.validation() {
        Some(result) => {
            emit(&json!({ "success": false, "error": error.to_string(), "validation": result }));
            ExitCode::from(2)
        }
        None => {
            emit(&json!({ "success": false, "error": error.to_string() }));
            ExitCode::FAILURE
        }
    }
}

/// Files written by `generate --out-dir`, named after the banner id.
fn write_artifacts(dir: &Path, artifacts: &GeneratedArtifacts) -> std::io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let id = &artifacts.banner_id;
    let mut files = vec![
        (dir.join(format!("{id}.js")), artifacts.script.as_str()),
        (dir.join(format!("{id}.css")), artifacts.stylesheet.as_str()),
        (dir.join(format!("{id}.markup.html")), artifacts.markup.as_str()),
        (dir.join(format!("{id}.panel.html")), artifacts.panel.as_str()),
    ];
    if let Some(html) = &artifacts.html {
        files.push((dir.join(format!("{id}.preview.html")), html.as_str()));
    }
    for (path, content) in &files {
        fs::write(path, content)?;
    }
    Ok(files.into_iter().map(|(path, _)| path).collect())
}

fn run(cli: Cli) -> Result<ExitCode, PipelineError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let pipeline = GenerationPipeline::new(config)?;

    match cli.command {
        Commands::Validate { template } => {
            let template = BannerTemplate::load(&template)?;
            let result = pipeline.validate(&template);
            emit(&serde_json::to_value(&result)?);
            Ok(if result.is_valid { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }

        Commands::Generate { template, options, out_dir } => {
            let template = BannerTemplate::load(&template)?;
            let options: GenerationOptions = serde_json::from_str(&options)?;
            let artifacts = pipeline.generate(&template, &options)?;
            let files = match &out_dir {
                Some(dir) => write_artifacts(dir, &artifacts)?,
                None => vec![],
            };
            emit(&json!({ "success": true, "artifacts": artifacts, "files": files }));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Preview { template, out, language } => {
            let template = BannerTemplate::load(&template)?;
            let options = GenerationOptions {
                format: OutputFormat::Html,
                minify: false,
                language,
                ..GenerationOptions::default()
            };
            let artifacts = pipeline.generate(&template, &options)?;
            fs::write(&out, artifacts.html.as_deref().unwrap_or_default())?;
            emit(&json!({
                "success": true,
                "preview": out,
                "scriptIntegrity": artifacts.script_integrity,
                "fallbacks": artifacts.fallbacks,
            }));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => failure(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"{
        "id": "cli-banner",
        "layout": {
            "desktop": { "type": "floating", "position": "bottom-right" },
            "tablet": { "type": "floating", "position": "bottom-right" },
            "mobile": { "type": "banner", "position": "bottom" }
        },
        "components": [
            { "id": "msg", "type": "text", "content": "Cookies?" },
            { "id": "yes", "type": "button", "content": "Yes", "action": { "type": "accept_all" } },
            { "id": "no", "type": "button", "content": "No", "action": { "type": "reject_all" } }
        ]
    }"#;

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::parse_from([
            "consentforge-cli", "--verbose", "generate", "-t", "banner.json", "--out-dir", "dist",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Generate { template, options, out_dir } => {
                assert_eq!(template, PathBuf::from("banner.json"));
                assert_eq!(options, "{}");
                assert_eq!(out_dir, Some(PathBuf::from("dist")));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = GenerationPipeline::new(EngineConfig::default()).unwrap();
        let options = GenerationOptions { format: OutputFormat::Html, ..GenerationOptions::default() };
        let artifacts = pipeline.generate_json(TEMPLATE, &options).unwrap();

        let files = write_artifacts(dir.path(), &artifacts).unwrap();
        assert_eq!(files.len(), 5);
        let script = fs::read_to_string(dir.path().join("cli-banner.js")).unwrap();
        assert_eq!(script, artifacts.script);
        assert!(dir.path().join("cli-banner.preview.html").exists());
    }

    #[test]
    fn test_preview_writes_html() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("banner.json");
        let out = dir.path().join("preview.html");
        fs::write(&template, TEMPLATE).unwrap();

        let cli = Cli::parse_from([
            "consentforge-cli",
            "preview",
            "-t",
            template.to_str().unwrap(),
            "-O",
            out.to_str().unwrap(),
        ]);
        run(cli).unwrap();
        let html = fs::read_to_string(&out).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_invalid_template_exits_2() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("banner.json");
        fs::write(&template, TEMPLATE.replace("reject_all", "close")).unwrap();

        let cli = Cli::parse_from(["consentforge-cli", "generate", "-t", template.to_str().unwrap()]);
        let err = run(cli).unwrap_err();
        let result = err.validation().unwrap();
        assert!(result.errors.iter().any(|v| v.message.contains("reject_all")));
    }

    #[test]
    fn test_path_like_banner_id_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("banner.json");
        let out_dir = dir.path().join("dist");
        fs::write(&template, TEMPLATE.replace("cli-banner", "../../tmp/evil; x=y")).unwrap();

        let cli = Cli::parse_from([
            "consentforge-cli",
            "generate",
            "-t",
            template.to_str().unwrap(),
            "--out-dir",
            out_dir.to_str().unwrap(),
        ]);
        let err = run(cli).unwrap_err();
        assert!(err.validation().unwrap().errors.iter().any(|v| v.rule == "banner_id"));
        assert!(!out_dir.exists());
    }
}
