//! `courier status <id>` – show one job.

use anyhow::Result;
use courier_core::Courier;

use super::{job_table_header, print_job_row};

pub async fn run_status(courier: &Courier, id: u64) -> Result<()> {
    match courier.job_status(id).await {
        None => println!("No such job: {id}"),
        Some(job) => {
            println!("{}", job_table_header());
            print_job_row(&job);
            if let Some(reason) = &job.failure_reason {
                println!("reason: {}", reason.summary());
            }
        }
    }
    Ok(())
}
