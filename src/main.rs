use std::io;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use search_api::{CancellationSignal, SearchApiClient, SearchApiError};
use searchterm::{logging, AnswerRenderer, EnvConfig};
use signal_hook::consts::SIGINT;

fn main() -> ExitCode {
    let config = EnvConfig::from_env();
    logging::init(config.log_filter.as_deref());

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("usage: searchterm <query...>");
        return ExitCode::from(2);
    }

    match run(&config, query.trim()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("searchterm: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &EnvConfig, query: &str) -> io::Result<()> {
    let cancel: CancellationSignal = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&cancel))?;

    let client = SearchApiClient::new(config.search_config()).map_err(io::Error::other)?;
    let request = config.ask_request(query);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let stdout = io::stdout();
    let mut renderer = AnswerRenderer::new(stdout.lock());
    let mut write_error: Option<io::Error> = None;

    let result = runtime.block_on(client.stream_with_handler(&request, Some(&cancel), |update| {
        if write_error.is_some() {
            return;
        }
        if let Err(error) = renderer.on_update(update) {
            write_error = Some(error);
        }
    }));

    if let Some(error) = write_error {
        return Err(error);
    }
    let response = match result {
        Ok(response) => response,
        Err(SearchApiError::Cancelled) => {
            renderer.finish(&[])?;
            return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
        }
        Err(error) => return Err(io::Error::other(error)),
    };

    renderer.finish(&response.sources)?;
    tracing::debug!(
        uuid = response.entry.uuid.as_deref().unwrap_or(""),
        sources = response.sources.len(),
        "answer complete"
    );
    Ok(())
}
