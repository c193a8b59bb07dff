use anyhow::{Context, Result};
use beyond_core::{Answer, Config, SafeSearch};
use beyond_local::Beyond;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "beyond")]
#[command(about = "Answer questions from live web search results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the web for a query and answer it from the results.
    Ask(AskCmd),
    /// Report which settings are present and whether they validate (no secret values).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct AskCmd {
    /// The question. Multiple words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,
    /// Number of search results to ground on (1-10).
    #[arg(long)]
    limit: Option<usize>,
    /// Safe search: off|active|default. Anything but `off` also moderates the answer.
    #[arg(long, default_value = "off", value_parser = parse_safe_search)]
    safe_search: SafeSearch,
    /// Prepend the full text of the top result's page to the context.
    #[arg(long)]
    full_page: bool,
    /// JSON config file (keys as in `OPENAI_API_KEY`, `GOOGLE_SEARCH_API_KEY`, ...).
    /// When omitted, configuration is read from the environment.
    #[arg(long, env = "BEYOND_CONFIG")]
    config: Option<std::path::PathBuf>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    #[arg(long, env = "BEYOND_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn parse_safe_search(s: &str) -> std::result::Result<SafeSearch, String> {
    s.parse::<SafeSearch>().map_err(|e| e.to_string())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading config file {}", p.display()))?;
            Ok(Config::from_json(&raw)?)
        }
        None => Ok(Config::from_env()),
    }
}

fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_env("BEYOND_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// What `BEYOND_ENV_FILE` contributed: variables it set, and ones it left alone because the
/// process already had them.
#[derive(Debug, Default)]
struct EnvFileReport {
    path: Option<String>,
    applied: Vec<String>,
    shadowed: Vec<String>,
}

/// `KEY=value` pairs from an env file. Comments, blank lines and lines without `=` are skipped;
/// surrounding quotes on the value are dropped.
fn parse_env_file(txt: &str) -> Vec<(String, String)> {
    txt.lines()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .filter_map(|s| s.split_once('='))
        .map(|(k, v)| {
            let k = k.trim().trim_start_matches("export ").trim();
            (k.to_string(), v.trim().trim_matches('"').trim_matches('\'').to_string())
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Opt-in env-file loader. Never overrides variables already set.
fn load_env_file() -> EnvFileReport {
    let mut report = EnvFileReport::default();
    let Some(path) = std::env::var("BEYOND_ENV_FILE")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
    else {
        return report;
    };
    let Ok(txt) = std::fs::read_to_string(&path) else {
        report.path = Some(path);
        return report;
    };
    for (k, v) in parse_env_file(&txt) {
        if std::env::var_os(&k).is_some() {
            report.shadowed.push(k);
        } else {
            std::env::set_var(&k, v);
            report.applied.push(k);
        }
    }
    report.path = Some(path);
    report
}

fn log_env_file(report: &EnvFileReport) {
    if let Some(path) = &report.path {
        info!(
            path = %path,
            applied = report.applied.len(),
            shadowed = report.shadowed.len(),
            "env file loaded"
        );
    }
}

fn print_answer(answer: &Answer, output: &str) -> Result<()> {
    match output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("{}", answer.content);
            if let Some(urls) = &answer.urls {
                for u in urls {
                    println!("  {u}");
                }
            }
        }
        _ => println!("{}", serde_json::to_string(answer)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = load_env_file();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ask(args) => {
            let mut cfg = load_config(args.config.as_deref())?;
            let verbose = cfg.logger.log_requests || cfg.logger.log_responses;
            init_tracing(if verbose { "info" } else { "warn" });
            log_env_file(&env_file);
            info!(
                source = if args.config.is_some() { "file" } else { "env" },
                search_keys = cfg.search_keys().len(),
                "configuration loaded"
            );
            if args.full_page {
                cfg.fetch_full_page = true;
            }
            let beyond = Beyond::new(cfg).inspect_err(|e| {
                warn!(error = %e, "configuration rejected");
            })?;
            let query = args.query.join(" ");
            let answer = beyond
                .search(&query, args.limit, Some(args.safe_search))
                .await;
            print_answer(&answer, &args.output)?;
        }
        Commands::Doctor(args) => {
            init_tracing("warn");
            log_env_file(&env_file);
            let cfg = load_config(args.config.as_deref())?;
            let present = |s: &str| !s.trim().is_empty();
            let validation = cfg.validate();
            if let Err(e) = &validation {
                warn!(error = %e, "configuration invalid");
            }
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": validation.is_ok(),
                "name": "beyond",
                "version": env!("CARGO_PKG_VERSION"),
                "configured": {
                    "openai_api_key": present(&cfg.openai_api_key),
                    "openai_organization_id": cfg.organization().is_some(),
                    "google_search_api_key": present(&cfg.google_search_api_key),
                    "google_search_engine_id": present(&cfg.google_search_engine_id),
                    "search_api_keys": cfg.search_keys().len(),
                },
                "model": cfg.model,
                "fetch_full_page": cfg.fetch_full_page,
                "timeout_ms": cfg.timeout_ms(),
                "error": validation.as_ref().err().map(|e| e.to_string()),
                "env_file": {
                    "path": env_file.path,
                    "applied": env_file.applied,
                    "shadowed": env_file.shadowed,
                },
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    match &validation {
                        Ok(()) => println!(
                            "ok: {} search key(s), model {}",
                            cfg.search_keys().len(),
                            cfg.model
                        ),
                        Err(e) => println!("not ok: {e}"),
                    }
                    if let Some(path) = &env_file.path {
                        println!("env file {path}");
                        if !env_file.applied.is_empty() {
                            println!("  applied: {}", env_file.applied.join(", "));
                        }
                        if !env_file.shadowed.is_empty() {
                            println!("  kept from process: {}", env_file.shadowed.join(", "));
                        }
                    }
                }
                _ => println!("{}", v),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "beyond",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("beyond {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }

    Ok(())
}
