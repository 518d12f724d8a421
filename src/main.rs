//! Parrot - Korean/Japanese/English translation service
//!
//! Command-line entry point: one-off translations, batch files, the HTTP
//! service, and cache/terminology maintenance.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parrot::cache::{scope_for, ResultCache};
use parrot::cli::{Args, CacheAction, CacheScopeArgs, Commands};
use parrot::config::Config;
use parrot::inference::HttpInferenceBackend;
use parrot::language::Direction;
use parrot::registry::Registry;
use parrot::server;
use parrot::terminology::{configured_glossary, FlatIpIndex, OllamaEmbedder, Retriever};
use parrot::translator::Translator;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Translate {
            text,
            direction,
            model,
            no_cache,
            generation,
        } => {
            let direction: Direction = direction.parse()?;
            let overrides = generation.overrides();

            let mut translator = Translator::from_config(config).await?;
            translator.load_model(model.as_deref(), true).await?;

            if no_cache {
                let translated = translator
                    .translate_direction(&text, direction, &overrides)
                    .await?;
                println!("{}", translated);
            } else {
                let outcome = translator
                    .get_or_translate(&text, direction, &overrides)
                    .await?;
                println!("{}", outcome.translated);
                info!(
                    "{} in {}{}",
                    direction.label(),
                    outcome.translate_time,
                    if outcome.cached { " (cached)" } else { "" }
                );
            }
        }
        Commands::Batch {
            input,
            output,
            direction,
            model,
            generation,
        } => {
            let direction: Direction = direction.parse()?;
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let texts: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();

            info!("Translating {} lines from {}", texts.len(), input.display());

            let mut translator = Translator::from_config(config).await?;
            translator.load_model(model.as_deref(), true).await?;

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            pb.set_message(format!("Translating {} texts ({})", texts.len(), direction.label()));
            pb.enable_steady_tick(Duration::from_millis(120));

            let results = translator
                .translate_batch(
                    &texts,
                    direction.source.as_str(),
                    direction.target.as_str(),
                    &generation.overrides(),
                )
                .await;
            pb.finish_and_clear();
            let results = results?;

            let rendered = results.join("\n");
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered + "\n")
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Wrote {} translations to {}", results.len(), path.display());
                }
                None => println!("{}", rendered),
            }
        }
        Commands::Serve { host, port, model } => {
            let mut server_config = config.server.clone();
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }

            let mut translator = Translator::from_config(config).await?;
            translator.load_model(model.as_deref(), true).await?;

            server::serve(translator, &server_config).await?;
        }
        Commands::Models => {
            let registry = Registry::with_extra(&config.model.extra_models)?;

            println!("\nAvailable Models:");
            println!("{:<18} {:<20} {:<55}", "Key", "Strategy", "Backing model");
            println!("{}", "-".repeat(93));
            for model in registry.models() {
                let marker = if model.key == config.model.default_model { "*" } else { "" };
                println!(
                    "{:<18} {:<20} {:<55}",
                    format!("{}{}", model.key, marker),
                    model.strategy_kind.to_string(),
                    model.backing_id
                );
            }
            println!("\n* default model");
        }
        Commands::Info { model } => {
            let registry = Registry::with_extra(&config.model.extra_models)?;
            let backend = Arc::new(HttpInferenceBackend::new(&config.inference)?);
            let cache = ResultCache::connect(&config.cache).await;

            let mut translator = Translator::new(config, registry, backend, None, cache);
            translator.load_model(model.as_deref(), false).await?;

            println!("{}", serde_json::to_string_pretty(&translator.describe())?);
        }
        Commands::Terms {
            text,
            direction,
            replacement,
        } => {
            let direction: Direction = direction.parse()?;
            let embedder = Arc::new(OllamaEmbedder::new(&config.terminology)?);
            let mut retriever = Retriever::new(embedder, Box::new(FlatIpIndex::new()))
                .with_config(&config.terminology);
            retriever.load(configured_glossary(&config.terminology)?).await?;

            let domain = Retriever::domain_for(
                direction.source.as_str(),
                direction.target.as_str(),
                replacement,
            );
            let params = retriever.params();
            let matches = retriever
                .retrieve(&text, Some(&domain), params.k, params.threshold)
                .await?;

            println!("\nTerminology matches ({}):", domain);
            if matches.is_empty() {
                println!("No matching terms.");
            }
            for m in &matches {
                println!("{:<20} {:<30} {:.3}", m.source_term, m.target_term, m.score);
            }

            if replacement {
                println!("\nNormalized: {}", retriever.replace_terms(&text, &domain).await?);
            } else {
                let hint = retriever
                    .render_hint(&text, &domain, retriever.max_hint_terms())
                    .await?;
                println!("\nHint: {}", hint);
            }
        }
        Commands::Cache { action } => {
            let cache = ResultCache::connect(&config.cache)
                .await
                .context("Result cache is disabled or unreachable")?;

            match action {
                CacheAction::Get { text, scope } => {
                    let cache = scoped_cache(&cache, &config, &scope)?;
                    match cache.get(&text).await {
                        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                        None => println!("No cached translation for this text."),
                    }
                }
                CacheAction::Delete { text, scope } => {
                    let cache = scoped_cache(&cache, &config, &scope)?;
                    if cache.invalidate(&text).await {
                        println!("Deleted {}", cache.key_for(&text));
                    } else {
                        println!("No cached translation for this text.");
                    }
                }
                CacheAction::Clear => {
                    let count = cache.clear_all().await;
                    println!("Cleared {} cached translations", count);
                }
                CacheAction::Stats => {
                    let stats = cache.stats().await;
                    println!("\nCache Statistics:");
                    println!("Namespace: {}", stats.namespace);
                    println!("Records: {}", stats.total_keys);
                    println!("TTL: {}s", cache.ttl().as_secs());
                    for key in &stats.sample_keys {
                        println!("  {}", key);
                    }
                }
            }
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    output.display()
                );
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

/// The cache view the translator uses for this model and direction
fn scoped_cache(cache: &ResultCache, config: &Config, scope: &CacheScopeArgs) -> Result<ResultCache> {
    let direction: Direction = scope.direction.parse()?;
    let registry = Registry::with_extra(&config.model.extra_models)?;
    let model = registry.resolve(scope.model.as_deref().unwrap_or(&config.model.default_model))?;
    Ok(cache.scoped(&scope_for(&model.key, direction)))
}

/// Config from `--config`, else `./config.toml`, else defaults; then
/// environment overrides.
fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    config.apply_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".parrot").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "parrot.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("parrot.log").display()
    );

    Ok(())
}
