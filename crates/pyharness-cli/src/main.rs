use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pyharness::{
    BackendClient, Coordinator, ExecutionRequest, HarnessConfig, LegacyJudge, QuestionPage, QuestionSession,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Run learner Python code and question test suites in the sandbox.
#[derive(Parser, Debug)]
#[command(name = "pyharness-cli", about = "Run Python code and question tests in a sandbox, emitting JSON")]
struct Cli {
    /// Per-run timeout in milliseconds (overrides PYHARNESS_TIMEOUT_MS)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,

    /// Backend base URL (overrides PYHARNESS_BACKEND_URL)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// CSRF token sent with backend requests (overrides PYHARNESS_CSRF_TOKEN)
    #[arg(long, global = true)]
    csrf_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute one snippet and print the execution result
    Exec {
        /// Read Python source from file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,

        /// Run as a program, feeding this file's lines to input()
        #[arg(long)]
        stdin_file: Option<PathBuf>,
    },

    /// Run a question page's test cases and print the run report
    Run {
        /// Question page JSON
        #[arg(long)]
        question: PathBuf,

        /// Answer file: editor code, or an indented layout for Parsons questions
        #[arg(long)]
        answer: Option<PathBuf>,

        /// Record the attempt with the backend after running
        #[arg(long, default_value = "false")]
        submit: bool,
    },

    /// Send code to the style checker
    Style {
        /// Read Python source from file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Evaluate code on the remote judge used by older question pages
    Judge {
        /// Question id on the site
        #[arg(long)]
        question_id: u64,

        /// Read the submission from file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,

        /// The submission is an input: run the reference solution on it and
        /// judge the question's buggy program against the result
        #[arg(long, default_value = "false")]
        against_solution: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = HarnessConfig::from_env().context("Failed to load configuration from environment")?;
    if let Some(timeout_ms) = cli.timeout_ms {
        config.sandbox.timeout_ms = timeout_ms;
    }
    if let Some(url) = cli.backend_url {
        config.backend_url = Some(url);
    }
    if let Some(token) = cli.csrf_token {
        config.csrf_token = Some(token);
    }
    debug!(sandbox = ?config.sandbox, backend = ?config.backend_url, "configuration loaded");

    match cli.command {
        Commands::Exec { file, stdin_file } => exec(&config, file.as_deref(), stdin_file.as_deref()),
        Commands::Run {
            question,
            answer,
            submit,
        } => run(&config, &question, answer.as_deref(), submit),
        Commands::Style { file } => style(&config, file.as_deref()),
        Commands::Judge {
            question_id,
            file,
            against_solution,
        } => judge(&config, question_id, file.as_deref(), against_solution),
    }
}

fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read Python source from stdin")?;
            Ok(buf)
        }
    }
}

fn backend(config: &HarnessConfig) -> Result<BackendClient> {
    let Some(url) = config.backend_url.as_deref() else {
        bail!("No backend configured; set PYHARNESS_BACKEND_URL or pass --backend-url");
    };
    let token = config.csrf_token.clone().unwrap_or_default();
    BackendClient::new(url, token).context("Failed to create backend client")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Errors in the learner's code are part of the JSON, never the exit code.
fn exec(config: &HarnessConfig, file: Option<&Path>, stdin_file: Option<&Path>) -> Result<()> {
    let code = read_source(file)?;
    let timeout_ms = config.sandbox.timeout_ms;
    let request = match stdin_file {
        Some(path) => {
            let input = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ExecutionRequest::program(code, input.lines().map(str::to_owned).collect(), timeout_ms)
        }
        None => ExecutionRequest::function(code, timeout_ms),
    };

    let mut coordinator = Coordinator::new(config.sandbox.clone());
    let result = coordinator.run_one(&request);
    print_json(&result)
}

fn run(config: &HarnessConfig, question: &Path, answer: Option<&Path>, submit: bool) -> Result<()> {
    let page_json = std::fs::read_to_string(question)
        .with_context(|| format!("Failed to read {}", question.display()))?;
    let page: QuestionPage = serde_json::from_str(&page_json).context("Failed to parse question page")?;

    let coordinator = Coordinator::new(config.sandbox.clone());
    let mut session = QuestionSession::open(page, coordinator, config.sandbox.timeout_ms)
        .context("Failed to load question")?;
    if submit {
        session = session.with_recorder(Box::new(backend(config)?));
    }
    if let Some(path) = answer {
        let text = read_source(Some(path))?;
        session.set_answer_text(&text).context("Answer rejected")?;
    }

    let report = if submit {
        session.on_submit()
    } else {
        session.on_run_clicked()
    };
    info!(tests = report.rows.len(), banner = report.banner_text, "run finished");
    print_json(report)
}

fn style(config: &HarnessConfig, file: Option<&Path>) -> Result<()> {
    let code = read_source(file)?;
    let client = backend(config)?;
    let report = client.check_style(&code).context("Style check failed")?;
    print_json(&report)
}

fn judge(config: &HarnessConfig, question_id: u64, file: Option<&Path>, against_solution: bool) -> Result<()> {
    let submission = read_source(file)?;
    let judge = LegacyJudge::new(backend(config)?, question_id);
    let outcome = if against_solution {
        judge.check_against_solution(&submission)
    } else {
        judge.evaluate(&submission)
    }
    .context("Remote evaluation failed")?;
    info!(question = question_id, passed = outcome.all_correct(), "remote evaluation finished");
    print_json(&outcome)
}
