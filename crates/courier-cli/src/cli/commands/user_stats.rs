//! `courier user-stats <owner>` – one user's counters.

use anyhow::Result;
use courier_core::Courier;

pub async fn run_user_stats(courier: &Courier, owner: &str) -> Result<()> {
    match courier.user_stats(owner).await {
        None => println!("No such user: {owner}"),
        Some(profile) => {
            if let Some(name) = &profile.display_name {
                println!("User:            {owner} ({name})");
            } else {
                println!("User:            {owner}");
            }
            println!("Downloads:       {}", profile.downloads_completed);
            println!("Bytes delivered: {}", profile.bytes_delivered);
            match profile.last_download_at {
                Some(at) => println!("Last download:   {at} (unix ms)"),
                None => println!("Last download:   never"),
            }
        }
    }
    Ok(())
}
