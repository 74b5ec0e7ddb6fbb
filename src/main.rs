use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    overlayroot::run().await
}
