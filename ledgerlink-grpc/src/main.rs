use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    ledgerlink_grpc::run().await?;
    Ok(())
}
