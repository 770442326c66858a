use anyhow::Context;
use clap::Parser;
use sigtree::config::Settings;
use sigtree::rules::Ingestor;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sigtree")]
#[command(author = "Sigtree Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Rule ingestion engine for a signature-based IDS", long_about = None)]
struct Cli {
    /// Rule files to ingest
    #[arg(value_name = "FILE", required_unless_present = "generate_config")]
    rules: Vec<PathBuf>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate default configuration file
    #[arg(long)]
    generate_config: bool,

    /// Verbose logging (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress most output)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.generate_config {
        generate_default_config()?;
        return Ok(());
    }

    // Load configuration first so its logging level is available
    let settings = load_config(&cli)?;
    init_logging(&cli, &settings);

    info!("Starting sigtree v{}", env!("CARGO_PKG_VERSION"));

    let mut ingestor = Ingestor::new(&settings).context("Failed to initialise ingestion")?;

    let mut loaded = 0;
    for path in &cli.rules {
        loaded += load_rules_file(&mut ingestor, path)
            .with_context(|| format!("Failed to load rules from {:?}", path))?;
    }

    info!("Loaded {} rules from {} file(s)", loaded, cli.rules.len());
    print!("{}", ingestor.stats());

    Ok(())
}

/// Read one rules file into the ingestor. Handles comments, trailing
/// backslash continuations, and var/ipvar/portvar definition lines;
/// any rule error is fatal and aborts the load.
fn load_rules_file(ingestor: &mut Ingestor, path: &Path) -> anyhow::Result<usize> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut pending = String::new();
    let mut loaded = 0;

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_num + 1))?;
        let line = line.trim();

        if pending.is_empty() && (line.is_empty() || line.starts_with('#')) {
            continue;
        }

        // a trailing '\' continues the rule on the next line
        if let Some(stripped) = line.strip_suffix('\\') {
            pending.push_str(stripped);
            pending.push(' ');
            continue;
        }

        pending.push_str(line);
        let text = std::mem::take(&mut pending);

        if process_line(ingestor, &text)
            .with_context(|| format!("{}:{}", path.display(), line_num + 1))?
        {
            loaded += 1;
        }
    }

    if !pending.is_empty() {
        warn!("rule continued past end of file: {}", pending.trim());
    }

    Ok(loaded)
}

/// Feed one logical line to the ingestor. Returns true when the line
/// was a rule (as opposed to a variable definition).
fn process_line(ingestor: &mut Ingestor, text: &str) -> sigtree::Result<bool> {
    if let Some(rest) = text.strip_prefix("ipvar ") {
        let (name, value) = split_var_def(rest)?;
        ingestor.define_ip_var(name, value)?;
        return Ok(false);
    }
    if let Some(rest) = text.strip_prefix("portvar ") {
        let (name, value) = split_var_def(rest)?;
        ingestor.define_port_var(name, value)?;
        return Ok(false);
    }
    if let Some(rest) = text.strip_prefix("var ") {
        let (name, value) = split_var_def(rest)?;
        ingestor.define_var(name, value)?;
        return Ok(false);
    }

    ingestor.parse_rule(text)?;
    Ok(true)
}

fn split_var_def(rest: &str) -> sigtree::Result<(&str, &str)> {
    rest.trim()
        .split_once(char::is_whitespace)
        .map(|(name, value)| (name.trim(), value.trim()))
        .ok_or_else(|| {
            sigtree::RuleError::Config(format!("invalid variable definition: {}", rest))
        })
}

fn init_logging(cli: &Cli, settings: &Settings) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => settings.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    // RUST_LOG overrides the configured level when explicitly set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new(format!("sigtree={}", level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Settings> {
    if let Some(config_path) = &cli.config {
        return Settings::from_file(config_path).context("Failed to load configuration file");
    }

    // Try default locations
    let default_paths = vec![
        PathBuf::from("sigtree.yaml"),
        PathBuf::from("config/sigtree.yaml"),
        PathBuf::from("/etc/sigtree/sigtree.yaml"),
    ];

    for path in default_paths {
        if path.exists() {
            return Settings::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {:?}", path));
        }
    }

    Ok(Settings::default_config())
}

fn generate_default_config() -> anyhow::Result<()> {
    let config = Settings::default_config();
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;

    let output_path = PathBuf::from("sigtree.yaml");
    std::fs::write(&output_path, yaml).context("Failed to write config file")?;

    println!("Generated default configuration at: {:?}", output_path);
    Ok(())
}
