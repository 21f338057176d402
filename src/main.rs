#[tokio::main]
async fn main() -> demonio::error::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("demonio=info,serenity=warn"),
    )
    .init();

    // Panics inside spawned tasks only take down that task; keep a log line.
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Unhandled panic: {panic_info}");
    }));

    log::info!("Starting demonio Discord bot");

    match demonio::run().await {
        Ok(()) => {
            log::info!("Bot shut down successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Bot encountered an error: {e}");
            Err(e)
        }
    }
}
