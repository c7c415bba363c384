use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tributary::cli::{Cli, Commands, ConfigAction, Corpus};
use tributary::config::{Config, ConfigValidator};
use tributary::federation::{Federator, QueryContext, SearchResponse, SourceStatus};
use tributary::retrieval::{checked_page, SearchRequest};
use tributary::TributaryError;
use tokio_util::sync::CancellationToken;

/// Characters of content shown per result in table output
const PREVIEW_CHARS: usize = 120;

/// Options of the `search` command after parsing
struct SearchOptions {
    query: String,
    corpus: PathBuf,
    vector: Option<Vec<f32>>,
    limit: Option<i64>,
    offset: i64,
    alpha: Option<f32>,
    min_score: Option<f32>,
    filters: Vec<(String, String)>,
    disable: Vec<String>,
    timeout_ms: Option<u64>,
    index_dir: Option<PathBuf>,
    profile: Option<String>,
    json: bool,
}

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Search {
            query,
            corpus,
            vector,
            limit,
            offset,
            alpha,
            min_score,
            filters,
            disable,
            timeout_ms,
            index_dir,
            profile,
            json,
        } => {
            let options = SearchOptions {
                query,
                corpus,
                vector,
                limit,
                offset,
                alpha,
                min_score,
                filters,
                disable,
                timeout_ms,
                index_dir,
                profile,
                json,
            };
            cmd_search(cli.config, options)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so `--json` output stays machine-readable.
/// `TRIBUTARY_LOG` takes precedence over `RUST_LOG`.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "tributary=debug"
    } else {
        "tributary=info"
    };
    let filter = EnvFilter::try_from_env("TRIBUTARY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_search(config_path: Option<PathBuf>, options: SearchOptions) -> anyhow::Result<()> {
    let config = load_config(config_path, options.profile.as_deref())?;

    let corpus = Corpus::load(&options.corpus)
        .with_context(|| format!("Failed to load corpus {}", options.corpus.display()))?;
    tracing::info!(
        "Corpus has {} sources and {} documents",
        corpus.sources.len(),
        corpus.document_count()
    );

    let registry = corpus.build_registry(&config.retrieval, options.index_dir.as_deref())?;
    for id in &options.disable {
        if !registry.disable(id) {
            tracing::warn!("Unknown source '{}' in --disable", id);
        }
    }

    let limit = options
        .limit
        .unwrap_or(config.federation.default_limit as i64);
    let (offset, limit) = checked_page(options.offset, limit, config.federation.max_limit)?;
    let mut request = SearchRequest::new(options.query)
        .with_page(offset, limit)
        .with_alpha(options.alpha.unwrap_or(config.retrieval.default_alpha));
    if let Some(vector) = options.vector {
        request = request.with_vector(vector);
    }
    if let Some(min_score) = options.min_score {
        request = request.with_min_score(min_score);
    }
    for (key, value) in options.filters {
        request = request.with_filter(key, value);
    }

    let federator = Federator::new(Arc::new(registry), &config)?;

    let cancellation = CancellationToken::new();
    let mut ctx = QueryContext::new().with_cancellation(cancellation.clone());
    if let Some(timeout_ms) = options.timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(timeout_ms));
    }

    let rt = tokio::runtime::Runtime::new().map_err(|e| TributaryError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let response = rt.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling search");
                cancellation.cancel();
            }
        });
        federator.federate(request, &ctx).await
    })?;

    if options.json {
        let json = serde_json::to_string_pretty(&response).map_err(|e| TributaryError::Json {
            source: e,
            context: "Failed to serialize response".to_string(),
        })?;
        println!("{}", json);
    } else {
        print_response(&response);
    }

    Ok(())
}

fn print_response(response: &SearchResponse) {
    if response.items.is_empty() {
        println!(
            "No results (total {}, offset {})",
            response.total_count, response.offset
        );
    } else {
        println!(
            "Found {} results (showing {}-{}) in {}ms",
            response.total_count,
            response.offset + 1,
            response.offset + response.items.len(),
            response.query_time_ms
        );
    }
    println!();

    for (i, item) in response.items.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {}  ({})",
            response.offset + i + 1,
            item.score,
            item.document_id,
            item.source_id
        );
        println!("     {}", preview(&item.content));
        for relationship in &item.relationships {
            println!(
                "     ↳ {} {} ({:.2})",
                relationship.relation_type, relationship.target_id, relationship.strength
            );
        }
    }

    println!();
    for outcome in &response.sources {
        let status = match outcome.status {
            SourceStatus::Ok => format!("✓ {} results", outcome.result_count),
            SourceStatus::Error => format!(
                "✗ {}",
                outcome.error.as_deref().unwrap_or("failed")
            ),
            SourceStatus::TimedOut => "⏱ timed out".to_string(),
            SourceStatus::Cancelled => "✗ cancelled".to_string(),
        };
        println!("  {:<16} {} ({}ms)", outcome.source_id, status, outcome.elapsed_ms);
    }

    if response.has_more {
        println!();
        println!(
            "More results available: --offset {}",
            response.offset + response.limit
        );
    }
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let truncated: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", truncated)
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, None)?;
            let value = toml::Value::try_from(&config)?;

            let shown = match section {
                Some(section) => lookup(&value, &section)
                    .cloned()
                    .with_context(|| format!("Unknown config section '{}'", section))?,
                None => value,
            };
            println!("{}", render(&shown)?);
        }
        ConfigAction::Set { key, value } => {
            let path = resolve_path(config_path)?;
            let mut config = Config::load_or_default(&path)?;

            let current = toml::Value::try_from(&config)?;
            let settable = key.split('.').count() == 2
                && !key.starts_with("_meta.")
                && !key.starts_with("profiles.");
            if !settable || lookup(&current, &key).is_none() {
                bail!("Unknown config key '{}'", key);
            }

            config.set_value(&key.replace('.', "__"), &value)?;
            ConfigValidator::validate(&config)?;
            config.save(&path)?;

            println!("✓ Set {} = {}", key, value);
        }
        ConfigAction::Get { key } => {
            let config = load_config(config_path, None)?;
            let value = toml::Value::try_from(&config)?;
            let found =
                lookup(&value, &key).with_context(|| format!("Unknown config key '{}'", key))?;
            println!("{}", render(found)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(file) => file,
                None => resolve_path(config_path)?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = resolve_path(config_path)?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Profiles => {
            let config = load_config(config_path, None)?;
            let mut names: Vec<&String> = config.profiles.keys().collect();
            names.sort();

            if names.is_empty() {
                println!("No profiles configured");
            }
            for name in names {
                println!("  {}", name);
            }
        }
    }

    Ok(())
}

fn resolve_path(config_path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => Ok(Config::default_path()?),
    }
}

fn load_config(config_path: Option<PathBuf>, profile: Option<&str>) -> anyhow::Result<Config> {
    let path = resolve_path(config_path)?;

    if !path.exists() {
        tracing::debug!(
            "Config file not found, using defaults. Run 'tributary config init' to create one."
        );
    }

    let mut config = Config::load_or_default(&path)?;
    if let Some(profile) = profile {
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
    }
    Ok(config)
}

fn lookup<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(value, |current, part| current.get(part))
}

fn render(value: &toml::Value) -> anyhow::Result<String> {
    Ok(match value {
        toml::Value::Table(_) => toml::to_string_pretty(value)?,
        other => other.to_string(),
    })
}
