#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = sga_engine::run().await {
        eprintln!("sga-engine fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
