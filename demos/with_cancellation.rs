//! Waiting for an SMS code that can be cancelled from another task.
//!
//! # Running
//!
//! ```bash
//! VAK_SMS_API_KEY=your_api_key cargo run --example with_cancellation
//! ```

use std::env;
use std::time::Duration;
use vak_sms::{CancellationToken, NumberRequest, NumberStatus, VakSms, VakSmsError, WaitConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let api_key =
        env::var("VAK_SMS_API_KEY").expect("VAK_SMS_API_KEY environment variable must be set");

    let client = VakSms::with_api_key(api_key)?;

    println!("Requesting phone number...");
    let purchase = client.get_number(&NumberRequest::new("tg")).await?;
    let Some(number) = purchase.single() else {
        return Err("expected a single number".into());
    };

    println!("Got phone number: {}", number.tel.with_plus_prefix());
    if let Some(base) = client.pinned_base_url() {
        println!("Using mirror: {base}");
    }

    let cancel_token = CancellationToken::new();
    let token_clone = cancel_token.clone();

    let cancel_handle = tokio::spawn(async move {
        println!("\nWaiting up to 30s before cancelling...");
        tokio::time::sleep(Duration::from_secs(30)).await;
        println!("Cancelling operation...");
        token_clone.cancel();
    });

    println!("\nWaiting for SMS code (cancellable)...");
    match client
        .wait_sms_code_cancellable(number, &WaitConfig::patient(), cancel_token)
        .await
    {
        Ok(Some(code)) => {
            cancel_handle.abort();
            println!("Received SMS code: {code}");
            return Ok(());
        }
        Ok(None) => println!("No SMS code before the timeout"),
        Err(VakSmsError::Cancelled {
            elapsed,
            poll_count,
            ..
        }) => {
            println!(
                "Operation was cancelled after {:.1}s ({} polls)",
                elapsed.as_secs_f64(),
                poll_count
            );
        }
        Err(e) => return Err(e.into()),
    }

    let status = client.set_status(number, NumberStatus::End).await?;
    println!("Number released: {status}");

    Ok(())
}
