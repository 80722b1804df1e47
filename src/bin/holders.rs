use console::style;
use holders_lib::{cli::Cli, log};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args(std::env::args_os()).unwrap_or_else(|e| e.exit());

    if let Err(error) = log::init(cli.log_level.as_deref()) {
        eprintln!("{} {error}", style("error:").red());
        std::process::exit(1);
    }

    if let Err(error) = cli.run().await {
        eprintln!("{} {error}", style("error:").red());
        std::process::exit(1);
    }
}
