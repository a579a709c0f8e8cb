#[tokio::main]
async fn main() -> anyhow::Result<()> {
    genie_match_lib::run().await?;
    Ok(())
}
