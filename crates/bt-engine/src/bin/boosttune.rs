use bt_engine::TuningPipeline;
use bt_types::TuneConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = TuneConfig::from_env()?;
    let pipeline = TuningPipeline::new(config)?;
    let outcome = pipeline.run().await?;

    println!("{outcome}");
    Ok(())
}
