use clap::Parser;

use visionsnap::cli::{self, Args, Command, CommandError};
use visionsnap::config::Config;
use visionsnap::logging::{self, LogTarget};
use visionsnap::ui;

/// Load .env file without overriding existing environment variables.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

fn load_config(args: &Args) -> Result<Config, CommandError> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    Ok(config)
}

async fn dispatch(args: Args) -> Result<(), CommandError> {
    let config = load_config(&args)?;

    match args.command {
        None => Ok(ui::run(config).await?),
        Some(Command::ListCameras) => cli::list_cameras(),
        Some(Command::Config { action }) => {
            cli::handle_config_action(action, &config, args.config.as_deref())
        }
        Some(Command::CreateProject { .. }) => cli::create_project(&config).await,
        Some(Command::Upload { .. }) => cli::upload(&config).await,
        Some(Command::Train { .. }) => cli::train(&config).await,
        Some(Command::Predict { image, .. }) => cli::predict(&config, image.as_deref()).await,
        Some(Command::Snapshot { predict }) => cli::snapshot(&config, predict).await,
    }
}

#[tokio::main]
async fn main() {
    load_env();

    let args = Args::parse();

    let target = if args.command.is_none() {
        LogTarget::File(logging::default_log_file())
    } else {
        LogTarget::Stderr
    };
    if let Err(e) = logging::init(&target, args.verbose) {
        eprintln!("Warning: {}", e);
    }

    if let Err(e) = dispatch(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
