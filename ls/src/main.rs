#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), async_lsp::Error> {
    // Logs go to stderr, stdout is used by the protocol.
    env_logger::init();
    yarals::serve_stdio().await
}
