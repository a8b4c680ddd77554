use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tea_dashboard::run().await
}
