//! `courier stats` – global usage counters.

use anyhow::Result;
use courier_core::Courier;

pub async fn run_stats(courier: &Courier) -> Result<()> {
    let stats = courier.global_stats().await;
    println!("Users:           {}", stats.total_users);
    println!("Active users:    {}", stats.active_users);
    println!("Downloads:       {}", stats.total_downloads);
    println!("Bytes delivered: {}", stats.total_bytes);
    Ok(())
}
