use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use rootcause::backend::{HttpEventSource, QueryRunRequest};
use rootcause::cli::{Cli, Command, ExplainArgs};
use rootcause::config::{self, Config};
use rootcause::explain::{ExplanationStreamer, OutputMode};
use rootcause::fetch::RetryingFetcher;
use rootcause::output::{self, format_error};
use rootcause::providers::OpenAIProvider;
use rootcause::select::{
    load_and_select_event, DialoguerPrompter, PaginatedSelector, RunSelection, SearchRequest,
    Selection,
};
use rootcause::timeframe::Timeframe;

fn init_logging(debug: bool) {
    let default = if debug { "rootcause=debug" } else { "rootcause=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rootcause", &mut io::stdout());
}

fn event_source(config: &Config) -> Result<HttpEventSource> {
    HttpEventSource::from_env(
        config.backend.endpoint.clone(),
        Duration::from_secs(config.backend.request_timeout_secs),
    )
    .map_err(|e| {
        anyhow::anyhow!(format_error(
            &e.to_string(),
            Some("Create an API key for your environment and export ROOTCAUSE_API_KEY")
        ))
    })
}

fn completion_provider(config: &Config, args: &ExplainArgs) -> Result<OpenAIProvider> {
    let mut params = config.explain.completion_params();
    if let Some(model) = &args.model {
        params.model = model.clone();
    }
    OpenAIProvider::from_env(config.explain.base_url.clone(), params).map_err(|e| {
        anyhow::anyhow!(format_error(
            &e.to_string(),
            Some("Export OPENAI_API_KEY to enable explanations")
        ))
    })
}

async fn explain_error(config: &Config, args: &ExplainArgs, error: &str) -> Result<()> {
    let provider = completion_provider(config, args)?;
    let mode = if args.live {
        OutputMode::Live
    } else {
        OutputMode::Simulated
    };
    let streamer = ExplanationStreamer::new(
        &provider,
        Duration::from_millis(config.explain.word_delay_ms),
        Duration::from_secs(config.explain.timeout_secs),
    )
    .with_mode(mode);

    let mut stdout = io::stdout();
    if args.live {
        streamer
            .explain(error, &mut stdout)
            .await
            .context("Failed to explain the selected error")?;
        return Ok(());
    }

    let spinner = output::Spinner::start("Explaining");
    let text = match streamer.request(error).await {
        Ok(text) => {
            spinner.succeed();
            text
        }
        Err(err) => {
            spinner.fail("Explanation failed");
            return Err(err).context("Failed to explain the selected error");
        }
    };
    streamer.replay(&text, &mut stdout).await?;
    Ok(())
}

async fn search(
    config: &Config,
    from: Option<String>,
    to: Option<String>,
    datasets: Vec<String>,
    page_size: Option<usize>,
    args: &ExplainArgs,
) -> Result<()> {
    // Fail on missing keys before the operator starts paging
    completion_provider(config, args)?;
    let source = event_source(config)?;

    let from = from.unwrap_or_else(|| config.search.from.clone());
    let to = to.unwrap_or_else(|| config.search.to.clone());
    let timeframe = Timeframe::parse(&from, &to, chrono::Utc::now())?;

    let request = SearchRequest {
        timeframe,
        datasets: if datasets.is_empty() {
            config.search.datasets.clone()
        } else {
            datasets
        },
        filters: config.search.filters(),
        service: config.backend.service.clone(),
        page_size: page_size.unwrap_or(config.search.page_size).max(1),
    };

    let fetcher = RetryingFetcher::new(config.fetch.retry_policy());
    let mut selector = PaginatedSelector::new(&source, DialoguerPrompter::new(), fetcher, request);

    match selector.run().await? {
        Selection::Chosen(issue) => explain_error(config, args, &issue.error).await,
        Selection::NoIssues => Ok(()),
        Selection::Cancelled => {
            output::print_cancelled();
            Ok(())
        }
    }
}

async fn run(
    config: &Config,
    query_id: String,
    run_id: String,
    limit: Option<usize>,
    args: &ExplainArgs,
) -> Result<()> {
    completion_provider(config, args)?;
    let source = event_source(config)?;

    let request = QueryRunRequest {
        query_id,
        run_id,
        service: config.backend.service.clone(),
        limit: limit.unwrap_or(config.fetch.run_limit),
    };
    let mut fetcher = RetryingFetcher::new(config.fetch.retry_policy());
    let mut prompter = DialoguerPrompter::new();

    match load_and_select_event(&source, &mut prompter, &mut fetcher, &request).await? {
        RunSelection::Chosen(error) => explain_error(config, args, &error).await,
        RunSelection::NoIssues => Ok(()),
        RunSelection::Cancelled => {
            output::print_cancelled();
            Ok(())
        }
        RunSelection::FetchFailed => bail!("Could not load events for query run {}", request.run_id),
    }
}

fn get_input(error: &[String]) -> Result<String> {
    // If error args provided, use them
    if !error.is_empty() {
        return Ok(error.join(" "));
    }

    // Otherwise read from stdin if piped
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        for line in io::stdin().lock().lines() {
            input.push_str(&line?);
            input.push('\n');
        }
        let trimmed = input.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(trimmed);
        }
    }

    let tip = "Pipe an error in: tail -n 20 app.log | rootcause explain"
        .dimmed()
        .to_string();
    bail!(format_error(
        "No input provided. Usage: rootcause explain <error message>",
        Some(&tip)
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    // Dialoguer hides the cursor while a prompt is open
    ctrlc::set_handler(|| {
        let _ = console::Term::stderr().show_cursor();
        std::process::exit(130);
    })
    .context("Failed to install Ctrl-C handler")?;

    if let Some(shell) = cli.completions {
        print_completions(shell);
        return Ok(());
    }

    let mut config = Config::load();
    config.apply_env_overrides();

    match cli.command {
        Some(Command::Search {
            from,
            to,
            datasets,
            page_size,
            explain,
        }) => search(&config, from, to, datasets, page_size, &explain).await,
        Some(Command::Run {
            query_id,
            run_id,
            limit,
            explain,
        }) => run(&config, query_id, run_id, limit, &explain).await,
        Some(Command::Explain { error, explain }) => {
            let input = get_input(&error)?;
            explain_error(&config, &explain, &input).await
        }
        Some(Command::Config) => {
            config::print_default_config();
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
