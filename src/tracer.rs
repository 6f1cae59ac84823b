use tracing_appender::rolling;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use std::fs;

/// Attaches a `msg file:line` context frame to any error (or missing
/// `Option`) and mirrors it to the log before propagating.
pub trait ContextExt<T> {
  fn cwl(self, msg: &str) -> anyhow::Result<T>;
}

impl<T, E> ContextExt<T> for Result<T, E>
where
  E: Into<anyhow::Error>,
{
  #[track_caller]
  fn cwl(self, msg: &str) -> anyhow::Result<T> {
    let location = std::panic::Location::caller();
    let file_name = std::path::Path::new(location.file())
      .file_name()
      .and_then(|name| name.to_str())
      .unwrap_or("unknown");

    match self {
      Ok(value) => Ok(value),
      Err(e) => {
        let error_info = format!("{} {}:{}", msg, file_name, location.line());
        let anyhow_error = e.into();
        tracing::error!("{} - underlying error: {}", error_info, anyhow_error);
        Err(anyhow_error.context(error_info))
      }
    }
  }
}

impl<T> ContextExt<T> for Option<T> {
  #[track_caller]
  fn cwl(self, msg: &str) -> anyhow::Result<T> {
    let location = std::panic::Location::caller();
    let file_name = std::path::Path::new(location.file())
      .file_name()
      .and_then(|name| name.to_str())
      .unwrap_or("unknown");

    match self {
      Some(value) => Ok(value),
      None => {
        let error_info = format!("{} {}:{}", msg, file_name, location.line());
        tracing::error!("cwl error: {}", error_info);
        Err(anyhow::anyhow!(error_info))
      }
    }
  }
}

pub fn format_error_chain(error: &anyhow::Error) -> String {
  let mut chain = Vec::new();
  chain.push(error.to_string());

  let mut source = error.source();
  while let Some(err) = source {
    chain.push(err.to_string());
    source = err.source();
  }

  chain.join("\n-> ")
}

/// Initializes tracing with a stderr layer plus a per-run log file
/// (`logs/log_<start-timestamp>.log`). The returned guard must stay
/// alive for the duration of the run or buffered lines are lost.
pub fn init_logging(run_stamp: &str) -> Option<WorkerGuard> {
  let crate_name = env!("CARGO_PKG_NAME");
  let crate_name_target = crate_name.replace('-', "_");

  let env_filter_var_name =
    format!("{}_LOG", crate_name.to_uppercase().replace('-', "_"));
  let default_filter = format!("{crate_name_target}=info");

  let env_filter = EnvFilter::new(
    std::env::var(&env_filter_var_name).unwrap_or(default_filter),
  );

  // NOTE diagnostics go to stderr so stdout stays a clean report stream
  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_ansi(true)
    .with_target(true)
    .with_level(true)
    .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339());

  let mut file_layer_option = None;
  let mut log_guard: Option<WorkerGuard> = None;

  let log_dir = "logs";
  match fs::create_dir_all(log_dir) {
    Ok(_) => {
      // one file per run, stamped with the run start time so repeated
      // runs never collide
      let log_file_name = format!("log_{run_stamp}.log");
      let file_appender = rolling::never(log_dir, log_file_name);
      let (non_blocking_writer, guard) = non_blocking(file_appender);

      let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

      file_layer_option = Some(file_layer);
      log_guard = Some(guard);
    }
    Err(e) => {
      eprintln!(
        "[{crate_name}] Failed to create log directory '{log_dir}'. \
         File logging disabled. Error: {e}"
      );
    }
  }

  let registry = tracing_subscriber::registry()
    .with(env_filter)
    .with(ErrorLayer::default())
    .with(stderr_layer);

  let init_result = match file_layer_option {
    Some(file_layer) => registry.with(file_layer).try_init(),
    None => registry.try_init(),
  };

  if init_result.is_err() {
    eprintln!("Failed to initialize tracing subscriber.");
    if log_guard.is_some() {
      drop(log_guard.take());
    }
    return None;
  }

  eprintln!(
    "[{crate_name}] Logging initialized. Override level with env var \
     '{env_filter_var_name}'"
  );

  log_guard
}
