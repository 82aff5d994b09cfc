//! `courier submit` – validate, admit, and enqueue a download job.

use anyhow::Result;
use courier_core::{Courier, QualitySpec, SubmitError};

pub async fn run_submit(
    courier: &Courier,
    owner: &str,
    name: Option<&str>,
    url: &str,
    quality: QualitySpec,
) -> Result<()> {
    match courier.submit_job(owner, name, url, quality).await {
        Ok(job) => println!("Submitted job {} for {owner}: {url}", job.id),
        Err(SubmitError::InvalidUrl(detail)) => println!("Invalid URL: {detail}"),
        Err(SubmitError::Rejected(reason)) => println!("Rejected: {reason}"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
