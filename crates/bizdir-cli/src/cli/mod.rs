//! CLI entry and dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use bizdir_core::backend::{RestBackend, RestConfig};
use bizdir_core::config::{self, paths};
use bizdir_core::logging;
use bizdir_core::media::ImageKind;
use bizdir_core::session::SessionStore;
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "bizdir")]
#[command(version = "0.1")]
#[command(about = "Business directory client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Create an account with email and password
    Signup {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long = "full-name")]
        full_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },

    /// Log in (email/password, Google id token, or Facebook in the browser)
    Login {
        #[arg(long, requires = "password")]
        email: Option<String>,
        #[arg(long, requires = "email")]
        password: Option<String>,
        /// Id token obtained from Google sign-in on the device
        #[arg(long = "google-id-token", value_name = "TOKEN")]
        google_id_token: Option<String>,
        /// Log in with Facebook through the browser
        #[arg(long)]
        facebook: bool,
    },

    /// Log out and clear the local session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Deliver an inbound link (e.g. the OAuth redirect) to the app
    Link {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// List categories, or select one for the current user
    Categories {
        /// Category id or name to select
        #[arg(long, value_name = "CATEGORY")]
        select: Option<String>,
    },

    /// Browse and manage directory profiles
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Store the backend URL and/or anon key
    SetBackend {
        #[arg(long)]
        url: Option<String>,
        #[arg(long = "anon-key")]
        anon_key: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum ProfileCommands {
    /// Lists every profile
    List,
    /// Creates the current user's profile
    Create(commands::profiles::CreateArgs),
    /// Uploads a profile picture or cover image
    UploadImage {
        #[arg(value_name = "PATH")]
        path: String,
        #[arg(long, value_enum, default_value_t = ImageKindArg::Profile)]
        kind: ImageKindArg,
        /// Also store the URL on the current user's profile
        #[arg(long)]
        set: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageKindArg {
    Profile,
    Cover,
}

impl From<ImageKindArg> for ImageKind {
    fn from(arg: ImageKindArg) -> Self {
        match arg {
            ImageKindArg::Profile => ImageKind::Profile,
            ImageKindArg::Cover => ImageKind::Cover,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

/// Builds the backend client shared by the commands that need one.
fn connect(config: &config::Config) -> Result<Arc<RestBackend>> {
    let rest = RestConfig::from_config(config)?;
    let sessions = Arc::new(SessionStore::new(paths::session_path()));
    Ok(Arc::new(RestBackend::new(rest, sessions)))
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config.log).context("init logging")?;

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetBackend { url, anon_key } => {
                commands::config::set_backend(url.as_deref(), anon_key.as_deref())
            }
        },

        Commands::Signup {
            email,
            password,
            full_name,
            phone,
        } => {
            let form = bizdir_core::profile::SignUpForm {
                email: email.unwrap_or_default(),
                password: password.unwrap_or_default(),
                full_name: full_name.unwrap_or_default(),
                phone: phone.unwrap_or_default(),
            };
            form.validate()?;
            let backend = connect(&config)?;
            commands::auth::signup(&backend, &form).await
        }

        Commands::Login {
            email,
            password,
            google_id_token,
            facebook,
        } => match (email, password, google_id_token, facebook) {
            (Some(email), Some(password), None, false) => {
                let backend = connect(&config)?;
                commands::auth::login_password(&backend, &email, &password).await
            }
            (None, None, Some(token), false) => {
                let backend = connect(&config)?;
                commands::auth::login_google(&backend, &token).await
            }
            (None, None, None, true) => {
                let backend = connect(&config)?;
                commands::auth::login_facebook(&backend, &config.callback_pattern()).await
            }
            _ => anyhow::bail!(
                "Please choose one login method: --email/--password, --google-id-token, or --facebook"
            ),
        },

        Commands::Logout => {
            let backend = connect(&config)?;
            commands::auth::logout(&backend).await
        }
        Commands::Whoami => {
            let backend = connect(&config)?;
            commands::auth::whoami(&backend).await
        }

        Commands::Link { url } => {
            let backend = connect(&config)?;
            commands::link::deliver(Arc::clone(&backend), config.callback_pattern(), &url).await
        }

        Commands::Categories { select } => {
            let backend = connect(&config)?;
            match select {
                Some(choice) => commands::profiles::select_category(&backend, &choice).await,
                None => commands::profiles::categories(&backend).await,
            }
        }

        Commands::Profiles { command } => {
            let backend = connect(&config)?;
            match command {
                ProfileCommands::List => commands::profiles::list(&backend).await,
                ProfileCommands::Create(args) => commands::profiles::create(&backend, args).await,
                ProfileCommands::UploadImage { path, kind, set } => {
                    commands::profiles::upload_image(&backend, &path, kind.into(), set).await
                }
            }
        }
    }
}
