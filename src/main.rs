#[tokio::main]
async fn main() {
    let code = metaingest::app::startup::startup().await;
    std::process::exit(code);
}
