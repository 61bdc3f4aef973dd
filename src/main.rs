mod cli;

use mediamill::service::{ConversionRequest, ConversionService};
use mm_av::{supported_formats, CompressionKind, ConversionOptions, ToolRegistry};
use mm_core::config::{self, Config};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

/// Smallest byte budget the compress command accepts.
const MIN_TARGET_BYTES: u64 = 10 * 1024;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediamill=trace,mm_av=trace,mm_queue=debug,mm_core=debug".to_string()
        } else {
            "mediamill=info,mm_av=info,mm_queue=warn,mm_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            input,
            format,
            options,
            target_size,
            json,
        } => {
            let config = load(cli.config.as_deref(), cli.concurrency)?;
            let mut options = parse_options(options.as_deref())?;
            if target_size.is_some() {
                options.target_file_size = target_size;
            }
            block_on(convert_file(config, input, format, options, json))
        }
        Commands::Compress {
            input,
            target,
            json,
        } => {
            let config = load(cli.config.as_deref(), cli.concurrency)?;
            block_on(compress_file(config, input, target, json))
        }
        Commands::Batch {
            format,
            options,
            inputs,
        } => {
            let config = load(cli.config.as_deref(), cli.concurrency)?;
            let options = parse_options(options.as_deref())?;
            block_on(convert_batch(config, inputs, format, options))
        }
        Commands::Formats { json } => list_formats(json),
        Commands::CheckTools { json } => {
            let config = load(cli.config.as_deref(), cli.concurrency)?;
            block_on(check_tools(config, json))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediamill {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(fut: F) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(fut)
}

fn load(path: Option<&Path>, concurrency: Option<usize>) -> Result<Config> {
    let mut config = config::load_config_or_default(path)?;
    if let Some(n) = concurrency {
        config.queue.concurrency = n;
    }
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }
    Ok(config)
}

fn parse_options(raw: Option<&str>) -> Result<ConversionOptions> {
    match raw.map(str::trim) {
        None | Some("") | Some("{}") => Ok(ConversionOptions::default()),
        Some(text) => ConversionOptions::from_json(text)
            .context(r#"invalid options. Try: {"quality": 80}"#),
    }
}

async fn convert_file(
    config: Config,
    input: PathBuf,
    format: String,
    options: ConversionOptions,
    json: bool,
) -> Result<()> {
    let service = ConversionService::from_config(&config)?;
    let request = ConversionRequest::new(input, format).with_options(options);
    let result = service.submit_conversion(request)?.await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.output.display());
    if let Some(ref outcome) = result.compression {
        eprintln!(
            "Compressed {} -> {} bytes in {} trial(s)",
            outcome.original_size, outcome.final_size, outcome.trials
        );
        if let Some(ref warning) = outcome.warning {
            eprintln!("Warning: {warning}");
        }
    }
    Ok(())
}

async fn compress_file(config: Config, input: PathBuf, target: u64, json: bool) -> Result<()> {
    if target < MIN_TARGET_BYTES {
        anyhow::bail!("target is required (minimum {MIN_TARGET_BYTES} bytes / 10 KB)");
    }
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }
    let kind = CompressionKind::from_path(&input).with_context(|| {
        format!(
            "{} is not a compressible image, GIF or video",
            input.display()
        )
    })?;

    let service = ConversionService::from_config(&config)?;
    let outcome = service.submit_compression(input, target, kind)?.await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("File: {}", outcome.path.display());
    println!(
        "Size: {} -> {} bytes (target {target})",
        outcome.original_size, outcome.final_size
    );
    println!("Trials: {}", outcome.trials);
    if let Some(ref warning) = outcome.warning {
        println!("Warning: {warning}");
    }
    Ok(())
}

async fn convert_batch(
    config: Config,
    inputs: Vec<PathBuf>,
    format: String,
    options: ConversionOptions,
) -> Result<()> {
    let service = ConversionService::from_config(&config)?;
    let entries = service.convert_batch(inputs, &format, &options).await;

    let mut failed = 0;
    for entry in &entries {
        match entry.outcome {
            Ok(ref result) => {
                println!("✓ {} -> {}", entry.input.display(), result.output.display())
            }
            Err(ref e) => {
                failed += 1;
                println!("✗ {}: {e}", entry.input.display());
            }
        }
    }

    println!();
    println!("{} converted, {} failed", entries.len() - failed, failed);
    if failed > 0 {
        anyhow::bail!("{failed} of {} conversions failed", entries.len());
    }
    Ok(())
}

fn list_formats(json: bool) -> Result<()> {
    let families = supported_formats();

    if json {
        let map: serde_json::Map<String, serde_json::Value> = families
            .iter()
            .map(|(family, formats)| (family.as_str().to_string(), serde_json::json!(formats)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for (family, formats) in &families {
        println!("{:<10} {}", family.as_str(), formats.join(", "));
    }
    Ok(())
}

async fn check_tools(config: Config, json: bool) -> Result<()> {
    let registry = ToolRegistry::discover(&config.tools);
    let summary = registry.summary().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Checking external tools...\n");
    for tool in &summary.tools {
        let status = if tool.available { "✓" } else { "✗" };
        print!("{} {}", status, tool.name);
        if !tool.required {
            print!(" (optional)");
        }
        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if summary.all_required_available {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
            for warning in config.validate() {
                println!("  Warning: {warning}");
            }
        }
        None => {
            println!("No config file specified, using defaults");
            println!("Default config:");
            print_config(&Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &Config) {
    println!("  Concurrency: {}", config.queue.concurrency);
    match config.queue.max_pending {
        Some(n) => println!("  Max pending: {n}"),
        None => println!("  Max pending: unbounded"),
    }
    println!("  Tool timeout: {}s", config.tools.timeout_secs);
    println!(
        "  Image probe qualities: {:?}",
        config.compression.image_probe_qualities
    );
}
