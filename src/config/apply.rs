use std::time::Duration;

use clap::ArgMatches;
use clap::parser::ValueSource;

use crate::args::parsers::parse_listen_addr;
use crate::args::{Cli, Command, PositiveU64, RunArgs, ServeArgs};
use crate::error::{AppError, AppResult, ConfigError};

use super::types::{ConfigFile, DurationValue, EndpointDefaults};

/// Applies configuration values to CLI arguments. Values given on the
/// command line (or through their environment variable) win; fields without
/// a CLI default are only filled when still unset.
///
/// # Errors
///
/// Returns an error when a config value is invalid.
pub fn apply_config(cli: &mut Cli, matches: &ArgMatches, config: &ConfigFile) -> AppResult<()> {
    if !is_cli(matches, "connect_timeout")
        && let Some(timeout) = config.connect_timeout.as_ref()
    {
        cli.connect_timeout = to_duration(timeout, "connect_timeout")?;
    }

    if cli.request_timeout.is_none()
        && let Some(timeout) = config.request_timeout.as_ref()
    {
        cli.request_timeout = Some(to_duration(timeout, "request_timeout")?);
    }

    if !is_cli(matches, "drain_timeout")
        && let Some(timeout) = config.drain_timeout.as_ref()
    {
        cli.drain_timeout = to_duration(timeout, "drain_timeout")?;
    }

    if !is_cli(matches, "progress_every")
        && let Some(every) = config.progress_every
    {
        cli.progress_every = ensure_positive_u64(every, "progress_every")?;
    }

    match cli.command.as_mut() {
        Some(Command::Serve(args)) => {
            apply_serve(args, matches.subcommand_matches("serve"), config)
        }
        Some(Command::Run(args)) => {
            if let Some(endpoint) = config.endpoint.as_ref() {
                apply_endpoint(args, endpoint);
            }
            Ok(())
        }
        None => Ok(()),
    }
}

fn apply_serve(
    args: &mut ServeArgs,
    matches: Option<&ArgMatches>,
    config: &ConfigFile,
) -> AppResult<()> {
    let listen_from_cli = matches.is_some_and(|matches| is_cli(matches, "listen"));
    if !listen_from_cli && let Some(listen) = config.listen.as_deref() {
        args.listen = parse_listen_addr(listen).map_err(|err| {
            AppError::config(ConfigError::InvalidField {
                field: "listen",
                source: err,
            })
        })?;
    }

    if args.auth_token.is_none() {
        args.auth_token.clone_from(&config.auth_token);
    }
    Ok(())
}

fn apply_endpoint(args: &mut RunArgs, endpoint: &EndpointDefaults) {
    fill(&mut args.endpoint_name, endpoint.endpoint_name.as_ref());
    fill(&mut args.region, endpoint.region.as_ref());
    fill(&mut args.content_type, endpoint.content_type.as_ref());
    fill(&mut args.endpoint_url, endpoint.endpoint_url.as_ref());
}

fn fill(target: &mut Option<String>, value: Option<&String>) {
    if target.is_none() {
        *target = value.cloned();
    }
}

fn is_cli(matches: &ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(ValueSource::CommandLine | ValueSource::EnvVariable)
    )
}

fn to_duration(value: &DurationValue, field: &'static str) -> AppResult<Duration> {
    value
        .to_duration()
        .map_err(|err| AppError::config(ConfigError::InvalidField { field, source: err }))
}

fn ensure_positive_u64(value: u64, field: &'static str) -> AppResult<PositiveU64> {
    PositiveU64::new(value)
        .ok_or_else(|| AppError::config(ConfigError::FieldMustBePositive { field }))
}
