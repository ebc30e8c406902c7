#[tokio::main]
async fn main() {
    if let Err(e) = screenscout::run().await {
        eprintln!("screenscout failed to start: {e}");
        std::process::exit(1);
    }
}
