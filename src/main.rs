#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = meded_rust::run().await {
        eprintln!("meded-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
