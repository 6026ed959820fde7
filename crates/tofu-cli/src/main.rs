//! tofu - trust-on-first-use certificate store operator tool.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tofu_cli::run().await
}
