//! `courier cancel <id>` – cancel a queued or running job.

use anyhow::Result;
use courier_core::{CancelError, Courier, JobState};

pub async fn run_cancel(courier: &Courier, id: u64) -> Result<()> {
    match courier.cancel_job(id).await {
        Ok(JobState::Cancelled) => println!("Job {id} cancelled."),
        Ok(_) => println!("Job {id} is running; cancellation requested."),
        Err(CancelError::NotFound(_)) => println!("No such job: {id}"),
        Err(CancelError::AlreadyTerminal(_)) => println!("Job {id} already finished."),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
