use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match leafwise::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", leafwise::config::APP_NAME);
            ExitCode::FAILURE
        }
    }
}
