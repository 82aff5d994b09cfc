//! `courier jobs <owner>` – list a user's jobs, newest first.

use anyhow::Result;
use courier_core::Courier;

use super::{job_table_header, print_job_row};

pub async fn run_jobs(courier: &Courier, owner: &str) -> Result<()> {
    let jobs = courier.list_user_jobs(owner).await;
    if jobs.is_empty() {
        println!("No jobs for {owner}.");
        return Ok(());
    }
    println!("{}", job_table_header());
    for job in &jobs {
        print_job_row(job);
    }
    Ok(())
}
