use std::sync::Arc;

use clap::{ArgMatches, CommandFactory, FromArgMatches};
use tracing::{error, info};

use crate::args::{Cli, Command, RunArgs, ServeArgs};
use crate::config::{apply_config, load_config};
use crate::endpoint::{ClientSettings, EndpointConfig, HttpInvokerFactory};
use crate::engine::{EngineSettings, RunController, RunStatus, StartRunRequest, StdoutSink, TestConfig};
use crate::error::{AppError, AppResult, ValidationError};
use crate::shutdown::{setup_signal_shutdown_handler, shutdown_channel, stop_channel};

const AUTH_TOKEN_ENV: &str = "INFERLOAD_AUTH_TOKEN";

/// Binary entry point: parses arguments, applies the config file, and runs
/// the selected command on a multi-threaded runtime.
///
/// # Errors
///
/// Returns an error when arguments or config are invalid, the server cannot
/// start, or a `run` ends with an `error` event.
pub fn run() -> AppResult<()> {
    let (mut cli, matches) = parse_args()?;

    crate::logger::init_logging(cli.verbose, cli.no_color);

    if cli.command.is_none() {
        cli.command = Some(Command::Serve(ServeArgs {
            auth_token: std::env::var(AUTH_TOKEN_ENV).ok(),
            ..ServeArgs::default()
        }));
    }
    if let Some(config) = load_config(cli.config.as_deref())? {
        apply_config(&mut cli, &matches, &config)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_async(cli))
}

fn parse_args() -> AppResult<(Cli, ArgMatches)> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;
    Ok((cli, matches))
}

async fn run_async(cli: Cli) -> AppResult<()> {
    let settings = EngineSettings::new(cli.drain_timeout, cli.progress_every);
    let client = ClientSettings {
        connect_timeout: cli.connect_timeout,
        request_timeout: cli.request_timeout,
    };
    let controller = RunController::new(settings, Arc::new(HttpInvokerFactory::new(client)));

    match cli.command {
        Some(Command::Run(args)) => run_once(args, &controller).await,
        Some(Command::Serve(args)) => serve(args, controller).await,
        None => serve(ServeArgs::default(), controller).await,
    }
}

async fn serve(args: ServeArgs, controller: RunController) -> AppResult<()> {
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);
    if args.auth_token.is_some() {
        info!("Bearer token required on run and stop routes");
    }
    let result = crate::server::serve(args.listen, args.auth_token, controller, shutdown_rx).await;
    signal_handle.abort();
    result
}

async fn run_once(args: RunArgs, controller: &RunController) -> AppResult<()> {
    let request = start_request(args)?;
    let (stop_tx, stop_rx) = stop_channel();
    let signal_handle = setup_signal_shutdown_handler(&stop_tx);

    let report = controller
        .run(request, Box::new(StdoutSink::new()), stop_rx)
        .await;
    signal_handle.abort();

    if report.status == RunStatus::Error {
        error!(
            "Run failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
        return Err(AppError::validation(ValidationError::RunFailed));
    }
    Ok(())
}

fn start_request(args: RunArgs) -> AppResult<StartRunRequest> {
    let payload = match (args.payload, args.payload_file) {
        (Some(payload), _) => Some(payload),
        (None, Some(path)) => Some(std::fs::read_to_string(&path).map_err(|err| {
            AppError::validation(ValidationError::ReadPayloadFile { path, source: err })
        })?),
        (None, None) => None,
    };

    Ok(StartRunRequest {
        test_config: TestConfig {
            requests_per_second: args.rate,
            duration: args.duration,
        },
        endpoint_config: Some(EndpointConfig {
            endpoint_name: args.endpoint_name.unwrap_or_default(),
            region: args.region,
            content_type: args.content_type,
            aws_access_key_id: args.access_key_id,
            aws_secret_access_key: args.secret_access_key,
            aws_session_token: args.session_token,
            endpoint_url: args.endpoint_url,
        }),
        single_test_payload: payload.map(serde_json::Value::String),
    })
}
