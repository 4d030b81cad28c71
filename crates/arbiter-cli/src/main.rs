//! Arbiter CLI
//!
//! Runs the HTTP gateway, or compiles, runs and judges single files locally.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arbiter::gateway::wire::{ExecuteResponse, JudgeResponse};
use arbiter::{
    Config, EXAMPLE_CONFIG, ExecutionRequest, JudgeRequest, Runner, TestCase, TestCasePayload,
    WorkspaceManager,
};
use clap::{Parser, Subcommand};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arbiter")]
#[command(about = "A tool for compiling, running and judging untrusted code")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs and results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Listen address, overriding `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (default: inferred from the file extension)
        #[arg(short, long)]
        language: Option<String>,

        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Run time limit in milliseconds
        #[arg(short, long)]
        time_limit_ms: Option<u64>,
    },

    /// Judge a program against a JSON file of test cases
    Judge {
        /// Source file to judge
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// JSON array of `{"input", "expectedOutput", "points"}` objects
        #[arg(value_name = "TESTS")]
        tests: PathBuf,

        /// Language ID (default: inferred from the file extension)
        #[arg(short, long)]
        language: Option<String>,

        /// Per-case time limit in milliseconds
        #[arg(short, long)]
        time_limit_ms: Option<u64>,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,

    /// Initialize a new configuration file
    Init {
        /// Output path (default: arbiter.toml)
        #[arg(short, long, default_value = "arbiter.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Remove orphaned workspace directories once
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Logs go to stderr so that program output on stdout stays pipeable
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            arbiter::serve(Runner::new(config))
                .await
                .context("gateway failed")
        }
        Commands::Run {
            source,
            language,
            input,
            time_limit_ms,
        } => {
            run_execute(
                config,
                &source,
                language.as_deref(),
                input.as_deref(),
                time_limit_ms,
                cli.json,
            )
            .await
        }
        Commands::Judge {
            source,
            tests,
            language,
            time_limit_ms,
        } => {
            run_judge(
                config,
                &source,
                &tests,
                language.as_deref(),
                time_limit_ms,
                cli.json,
            )
            .await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Commands::Sweep => run_sweep(&config).await,
    }
}

/// Pick the language from `--language`, or from the source file's extension
fn language_for(config: &Config, source: &Path, explicit: Option<&str>) -> Result<String> {
    if let Some(id) = explicit {
        config.resolve(id).context("unknown language")?;
        return Ok(id.to_owned());
    }

    let extension = source
        .extension()
        .and_then(|ext| ext.to_str())
        .context("source file has no extension; pass --language")?;

    config
        .sorted_languages()
        .into_iter()
        .find(|(_, lang)| lang.extension.as_str() == extension)
        .map(|(id, _)| id.to_owned())
        .with_context(|| format!("no language configured for '.{extension}' files"))
}

async fn read_source(source: &Path) -> Result<String> {
    tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))
}

async fn run_execute(
    config: Config,
    source: &Path,
    language: Option<&str>,
    input: Option<&Path>,
    time_limit_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let language = language_for(&config, source, language)?;
    let code = read_source(source).await?;

    let stdin = match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .context("failed to read input file")?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    info!(%language, "running program");

    let mut request = ExecutionRequest::new(language, code).with_stdin(stdin);
    request.timeout_ms = time_limit_ms;

    let runner = Runner::new(config);
    let outcome = runner.execute(&request).await.context("execution failed")?;
    let exit_code = outcome.exit_code;
    let response = ExecuteResponse::from(outcome);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", response.output);
        if let Some(ref error) = response.error {
            eprintln!("{error}");
        }
    }

    info!(
        status = response.status,
        runtime_ms = response.runtime_ms,
        exit_code,
        "execution result"
    );

    if response.success {
        Ok(())
    } else {
        std::process::exit(exit_code.filter(|&code| code != 0).unwrap_or(1));
    }
}

async fn run_judge(
    config: Config,
    source: &Path,
    tests: &Path,
    language: Option<&str>,
    time_limit_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let language = language_for(&config, source, language)?;
    let code = read_source(source).await?;

    let raw = tokio::fs::read_to_string(tests)
        .await
        .context("failed to read test case file")?;
    let cases: Vec<TestCasePayload> =
        serde_json::from_str(&raw).context("test case file is not a JSON array of test cases")?;
    let cases: Vec<TestCase> = cases.into_iter().map(Into::into).collect();

    info!(%language, cases = cases.len(), "judging program");

    let mut request = JudgeRequest::new(language, code, cases);
    request.timeout_ms = time_limit_ms;

    let runner = Runner::new(config);
    let verdict = runner.judge(&request).await.context("judging failed")?;
    let response = JudgeResponse::from(verdict);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_verdict(&response);
    }

    if response.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn print_verdict(response: &JudgeResponse) {
    if let Some(ref diagnostics) = response.error {
        println!("Compilation failed:\n{diagnostics}\n");
    }

    for case in &response.test_case_results {
        println!(
            "  #{:<3} {:<20} {:>3} pts {:>6} ms",
            case.test_case_index, case.status, case.points, case.runtime_ms
        );
        if let Some(ref error) = case.error {
            println!("        {error}");
        }
    }

    println!();
    println!("Status: {}", response.status);
    println!(
        "Passed: {}/{}",
        response.test_cases_passed, response.total_test_cases
    );
    println!("Score: {}/{}", response.total_score, response.max_score);
    println!("Average runtime: {} ms", response.average_runtime_ms);
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for (id, lang) in config.sorted_languages() {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!(
            "  {:<15} {:<24} .{:<6} ({})",
            id,
            lang.name,
            lang.extension.as_str(),
            lang_type
        );
    }
}

fn show_config(config: &Config) {
    println!("Workspace root: {}", config.workspace_root.display());
    println!(
        "Max concurrent executions: {}",
        config.max_concurrent_executions
    );
    println!();
    println!("Limits:");
    println!("  stdout: {} bytes", config.limits.stdout_limit_bytes);
    println!("  stderr: {} bytes", config.limits.stderr_limit_bytes);
    println!(
        "  Compiler output: {} bytes",
        config.limits.compile_output_limit_bytes
    );
    println!("  Max run timeout: {} ms", config.limits.max_run_timeout_ms);
    println!();
    println!("Sweep:");
    println!("  Retention: {} s", config.sweep.retention_secs);
    println!("  Interval: {} s", config.sweep.interval_secs);
    println!();
    println!("Server:");
    println!("  Bind: {}", config.server.bind);
    println!(
        "  API key: {}",
        if config.server.api_key.is_some() {
            "set"
        } else {
            "not set (authentication disabled)"
        }
    );
    println!("  Max body: {} bytes", config.server.max_body_bytes);
    println!("  Max source: {} bytes", config.server.max_source_bytes);
    println!(
        "  Rate limit: {} requests / {} s",
        config.server.rate_limit_requests, config.server.rate_limit_window_secs
    );
    println!(
        "  Trust x-forwarded-for: {}",
        config.server.trust_forwarded_for
    );
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn run_sweep(config: &Config) -> Result<()> {
    let manager = WorkspaceManager::from_config(config);
    let report = manager
        .sweep()
        .await
        .context("failed to sweep workspace root")?;

    println!(
        "Scanned {} workspace(s), removed {}, failed {}",
        report.scanned, report.removed, report.failed
    );
    Ok(())
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
