//! `courier run` – run the worker pool until the queue drains.

use std::time::Duration;

use anyhow::Result;
use courier_core::Courier;

pub async fn run_workers(courier: &Courier) -> Result<()> {
    if !courier.has_live_jobs().await {
        println!("No queued jobs.");
        return Ok(());
    }

    let pool = courier.spawn_workers();
    // Jobs waiting out a retry backoff still count as live, so this drains
    // the queue through retries rather than exiting between attempts.
    while courier.has_live_jobs().await {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    pool.shutdown().await;

    let stats = courier.global_stats().await;
    println!(
        "Queue drained. {} download(s) delivered in total.",
        stats.total_downloads
    );
    Ok(())
}
