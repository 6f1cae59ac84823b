use crate::AppResult;
use crate::report::{ErroredUser, ReportRow, Summary};
use crate::tracer::ContextExt;

use std::path::{Path, PathBuf};
use tracing::debug;

pub const CSV_HEADER: [&str; 7] = [
  "EMAIL",
  "NAME",
  "STATUS",
  "N_FILES",
  "USED_STORAGE_Mbytes",
  "TOTAL_STORAGE_Mbytes",
  "DATE_CREATED",
];

// flush to disk at least this often; a crash loses at most the tail
const FLUSH_EVERY: usize = 100;

/// Streaming console mirror used while rows are built.
pub trait RowSink {
  fn write_row(&mut self, row: &ReportRow);
}

/// Console + CSV destination. Rows hit the console as they are built;
/// the CSV is a second pass over the buffered rows so the header lands
/// first. The file name embeds the run start timestamp so repeated
/// runs never collide.
pub struct ReportSink {
  csv_path: PathBuf,
}

impl ReportSink {
  pub fn new(report_dir: &Path, run_stamp: &str) -> Self {
    ReportSink {
      csv_path: report_dir.join(format!("report_{run_stamp}.csv")),
    }
  }

  pub fn csv_path(&self) -> &Path {
    &self.csv_path
  }

  pub fn persist(&self, rows: &[ReportRow]) -> AppResult<()> {
    let mut writer = csv::Writer::from_path(&self.csv_path).cwl(&format!(
      "Unable to open the CSV file: {}",
      self.csv_path.display()
    ))?;

    writer
      .write_record(CSV_HEADER)
      .cwl("Unable to write the CSV header")?;

    for (i, row) in rows.iter().enumerate() {
      writer
        .write_record(row.record())
        .cwl("Unable to write a CSV row")?;

      if (i + 1) % FLUSH_EVERY == 0 {
        writer.flush().cwl("Unable to flush the CSV file")?;
        debug!("Flushed {} CSV rows", i + 1);
      }
    }

    writer.flush().cwl("Unable to flush the CSV file")?;
    Ok(())
  }

  pub fn summary_text(summary: &Summary, errored: &[ErroredUser]) -> String {
    let mut text = format!(
      "END OF REPORT:\n \
       - USERS WITH AT LEAST 1 FILE: {}\n \
       - USERS WITH NO FILES: {}\n \
       - SUSPENDED USERS: {}\n \
       - ERRORS: {}",
      summary.active_with_files,
      summary.active_without_files,
      summary.suspended,
      summary.errors
    );

    if !errored.is_empty() {
      text.push_str("\n\nThe following users caused trouble:");
      for e_user in errored {
        text.push_str(&format!("\n{},{}", e_user.email, e_user.full_name));
      }
    }

    text
  }
}

impl RowSink for ReportSink {
  fn write_row(&mut self, row: &ReportRow) {
    println!("{}", row.record().join(","));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::report::{SENTINEL, Status};

  fn row(
    email: &str,
    name: &str,
    status: Status,
    files: i64,
    used: i64,
    total: i64,
    date: &str,
  ) -> ReportRow {
    ReportRow {
      email: email.to_string(),
      full_name: name.to_string(),
      status,
      file_count: files,
      used_storage_mb: used,
      total_storage_mb: total,
      creation_date: date.to_string(),
    }
  }

  #[test]
  fn persisted_file_matches_the_expected_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ReportSink::new(dir.path(), "2020-01-03_09-00-00");

    let rows = vec![
      row("a@x.com", "A", Status::Active, 3, 10, 100, "2020-01-01"),
      row(
        "b@x.com",
        "B",
        Status::Suspended,
        SENTINEL,
        SENTINEL,
        SENTINEL,
        "2020-01-02",
      ),
    ];

    sink.persist(&rows).unwrap();

    let written = std::fs::read_to_string(sink.csv_path()).unwrap();
    assert_eq!(
      written,
      "EMAIL,NAME,STATUS,N_FILES,USED_STORAGE_Mbytes,\
       TOTAL_STORAGE_Mbytes,DATE_CREATED\n\
       a@x.com,A,ACTIVE,3,10,100,2020-01-01\n\
       b@x.com,B,SUSPENDED,-1,-1,-1,2020-01-02\n"
    );
  }

  #[test]
  fn file_name_embeds_the_run_stamp() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ReportSink::new(dir.path(), "2021-06-01_12-30-45");
    assert!(
      sink
        .csv_path()
        .ends_with("report_2021-06-01_12-30-45.csv")
    );
  }

  #[test]
  fn large_report_keeps_every_row_past_the_flush_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ReportSink::new(dir.path(), "stamp");

    let rows: Vec<ReportRow> = (0..250)
      .map(|i| {
        row(
          &format!("u{i}@x.com"),
          &format!("U{i}"),
          Status::Active,
          i,
          1,
          2,
          "2020-01-01",
        )
      })
      .collect();

    sink.persist(&rows).unwrap();

    let written = std::fs::read_to_string(sink.csv_path()).unwrap();
    // header + 250 rows, each newline-terminated
    assert_eq!(written.lines().count(), 251);
    assert!(written.ends_with("u249@x.com,U249,ACTIVE,249,1,2,2020-01-01\n"));
  }

  #[test]
  fn persist_fails_when_the_directory_is_missing() {
    let sink =
      ReportSink::new(Path::new("/no/such/directory"), "stamp");
    assert!(sink.persist(&[]).is_err());
  }

  #[test]
  fn summary_lists_errored_users() {
    let summary = Summary {
      active_with_files: 1,
      active_without_files: 0,
      suspended: 1,
      errors: 1,
    };
    let errored = vec![ErroredUser {
      email: "broken@x.com".to_string(),
      full_name: "Broken".to_string(),
    }];

    let text = ReportSink::summary_text(&summary, &errored);
    assert!(text.contains("USERS WITH AT LEAST 1 FILE: 1"));
    assert!(text.contains("SUSPENDED USERS: 1"));
    assert!(text.contains("ERRORS: 1"));
    assert!(text.contains("broken@x.com,Broken"));
  }

  #[test]
  fn summary_without_errors_has_no_trouble_block() {
    let text = ReportSink::summary_text(&Summary::default(), &[]);
    assert!(!text.contains("caused trouble"));
  }
}
