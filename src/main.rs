mod apis;
mod config;
mod directory;
mod drive;
mod error_utils;
mod goauth;
mod limiters;
mod report;
mod sink;
mod tracer;

use config::Config;
use directory::GoogleDirectory;
use drive::GoogleDrive;
use goauth::{DIRECTORY_SCOPES, authorize_as, load_credentials};
use report::run_report;
use sink::ReportSink;
use tracer::{ContextExt, format_error_chain, init_logging};

use chrono::Local;
use tracing::{error, info};

pub type AppResult<T, E = anyhow::Error> = std::result::Result<T, E>;

#[tokio::main]
async fn main() {
  println!(" -*- STARTING DRIVE USAGE ANALYSIS -*-");
  println!("(... This process may take hours ...)\n");

  let run_stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
  let _log_guard = init_logging(&run_stamp);

  if let Err(e) = run_app(&run_stamp).await {
    error!("Report run aborted");
    eprintln!("{}", format_error_chain(&e));
    std::process::exit(1);
  }
}

async fn run_app(run_stamp: &str) -> AppResult<()> {
  let config = Config::from_env().cwl("Invalid configuration")?;
  info!(
    domain = %config.domain,
    admin = %config.admin_email,
    "Configuration loaded"
  );

  let creds = load_credentials(&config.key_path)
    .await
    .cwl("Unable to load the service account key")?;

  // admin authorization failure is fatal: without the directory
  // session there is nothing to report on
  let admin_session =
    authorize_as(&creds, &config.admin_email, &DIRECTORY_SCOPES)
      .await
      .cwl("Unable to authorize the admin session")?;

  let directory = GoogleDirectory::new(
    admin_session,
    config.domain.clone(),
    config.user_query.clone(),
  );
  let storage = GoogleDrive::new(creds);
  let mut sink = ReportSink::new(&config.report_dir, run_stamp);

  let outcome = run_report(&directory, &storage, &mut sink).await?;

  // CSV trouble is logged and swallowed: the console output above is
  // the best-effort record and per-user results are already complete
  match sink.persist(&outcome.rows) {
    Ok(()) => info!("Report written to {}", sink.csv_path().display()),
    Err(e) => {
      error!("Unable to generate CSV: {}", format_error_chain(&e));
    }
  }

  let summary = ReportSink::summary_text(&outcome.summary, &outcome.errored);
  println!("\n{summary}");
  info!("{}", summary);

  Ok(())
}
