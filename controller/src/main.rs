mod devices;
mod history;
mod host;
mod price_feed;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
