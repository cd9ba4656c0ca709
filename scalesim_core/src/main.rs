mod api_controller;
mod db;
mod lifecycle_manager;

#[tokio::main]
async fn main() {
    if let Err(e) = api_controller::start_server().await {
        eprintln!("scalesim-core failed to start: {e}");
        std::process::exit(1);
    }
}
