//! Build status command.

use anyhow::Result;

use super::client::ApiClient;

pub async fn show(client: &ApiClient, image_name: &str, with_logs: bool) -> Result<()> {
    let report = client.status(image_name).await?;

    println!("Image:    {}", image_name);
    println!("Status:   {}", report.status_string);
    println!("Started:  {}", report.start_time.to_rfc3339());
    if let Some(end) = report.end_time {
        println!("Finished: {}", end.to_rfc3339());
    }
    if !report.error.is_empty() {
        println!("Error:    {}", report.error);
    }
    if with_logs {
        println!();
        print!("{}", report.logs);
    }
    Ok(())
}
