//! CLI command handlers, one file per command.

mod cancel;
mod jobs;
mod run;
mod stats;
mod status;
mod submit;
mod user_stats;

pub use cancel::run_cancel;
pub use jobs::run_jobs;
pub use run::run_workers;
pub use stats::run_stats;
pub use status::run_status;
pub use submit::run_submit;
pub use user_stats::run_user_stats;

use courier_core::JobRecord;

fn job_table_header() -> String {
    format!(
        "{:<6} {:<10} {:<8} {:<8} {:<10} {}",
        "ID", "STATE", "ATTEMPT", "QUALITY", "SIZE", "URL"
    )
}

fn print_job_row(job: &JobRecord) {
    let size = job
        .result_size_bytes
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<6} {:<10} {:<8} {:<8} {:<10} {}",
        job.id,
        job.state.as_str(),
        job.attempt,
        job.quality.as_str(),
        size,
        job.source_url
    );
}
