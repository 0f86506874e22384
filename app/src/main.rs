#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vaultd_lib::run().await
}
