use market_holdings_sdk::{logging, Config, MarketTracker};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&path)?;
    logging::init_from_config(&config.logging)?;

    let tracker = MarketTracker::from_config(&config)?;

    let count = tracker.refresh_prices(&config.listings()).await?;
    println!("Cached {} listings", count);

    let refresher = tracker.start_refresh_loop();

    match tracker.refresh_address(&config.api.wallet_address).await {
        Ok(_) => {
            let holdings = tracker.holdings();
            println!("{:-<60}", "");
            for symbol in holdings.get_token_list().await {
                println!(
                    "{:<8} {:<24} {:>16.4}  ${:>12.2}  {}",
                    symbol,
                    holdings.get_token_name(&symbol).await,
                    holdings.get_token_balance(&symbol).await,
                    tracker.prices().get_price(&symbol).await,
                    holdings.get_token_image_url(&symbol).await,
                );
            }
            println!("{:-<60}", "");
            println!("Total: ${:.2}", holdings.get_address_balance().await);
        }
        Err(e) => eprintln!("Could not load holdings: {}", e),
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    let health = tracker.health_check().await;
    println!("Health: {:?} ({})", health.status, health.message.unwrap_or_default());

    refresher.stop().await;
    Ok(())
}
