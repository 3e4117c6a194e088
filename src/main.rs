//! Personhood gateway server binary.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    personhood_gateway::server::run().await
}
