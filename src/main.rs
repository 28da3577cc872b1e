//! The `eris` command line

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eris::{
    api_docker::DockerRuntime,
    config::GlobalConfig,
    data::{DataEngine, TransferRequest},
    initialize::{initialize, DefinitionSource, InitOptions},
    inspect::{inspect, ports},
    list::{list_containers, ListFormat, ListType},
    naming::LABEL_SHORT_NAME,
    update::{update, UpdateOptions},
    version::{
        ErisImage, ACTION_DEFINITIONS, CHAIN_DEFINITIONS, CONTAINER_OS, SERVICE_DEFINITIONS,
        VERSION,
    },
    DefinitionLoader, ErisPaths, ERIS_ROOT_ENV_VAR_NAME,
};
use stacked_errors::{Result, StackableErr};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Manage eris development environments: services, chains and data containers
#[derive(Parser, Debug)]
#[command(name = "eris", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The eris root, `$HOME/.eris` if unset
    #[arg(long, global = true, env = ERIS_ROOT_ENV_VAR_NAME)]
    root: Option<PathBuf>,

    /// Log progress
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log everything
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the eris root, pull the default images and write the default
    /// definition files
    Init {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        pull_images: bool,
        #[arg(long, value_enum, default_value_t = DefinitionSource::Rawgit)]
        source: DefinitionSource,
        #[arg(long, hide = true)]
        testing: bool,
    },
    /// List eris containers
    Ls {
        /// `service`, `chain`, `data` or `all`
        #[arg(short, long, default_value = "all")]
        r#type: String,
        /// `standard`, `extended`, `json`, or a `{{.Field}}` template
        #[arg(short, long, default_value = "standard")]
        format: String,
        /// Only running containers (data containers are always listed)
        #[arg(short, long)]
        running: bool,
    },
    /// Manage data containers
    #[command(subcommand)]
    Data(DataCommands),
    /// Show a field of a container, `line` or `all`
    Inspect {
        container: String,
        #[arg(default_value = "all")]
        field: String,
    },
    /// Show the host bindings of container ports
    Ports {
        container: String,
        ports: Vec<String>,
    },
    /// Rebuild and replace this binary
    Update {
        #[arg(short, long, default_value = "master")]
        branch: String,
        /// The checkout used if eris was installed with `cargo install`
        #[arg(long, env = "ERIS_CHECKOUT")]
        checkout: Option<PathBuf>,
    },
    /// Show the version and the images it goes with
    Version,
}

#[derive(Subcommand, Debug)]
enum DataCommands {
    /// Copy a host directory into a data container, creating the container if
    /// needed
    Import {
        name: String,
        source: String,
        destination: String,
        #[arg(long)]
        skip_root_check: bool,
        #[arg(short, long, default_value_t = 1)]
        number: u32,
    },
    /// Copy a path of a data container into a host directory
    Export {
        name: String,
        source: String,
        destination: String,
        #[arg(long)]
        skip_root_check: bool,
        #[arg(short, long, default_value_t = 1)]
        number: u32,
    },
    /// Run a command with the volumes of a data container
    Exec {
        name: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// List data containers
    Ls,
    /// Remove a data container
    Rm {
        name: String,
        #[arg(short = 'x', long)]
        rm_volumes: bool,
        #[arg(short, long, default_value_t = 1)]
        number: u32,
    },
}

fn init_tracing(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn version_report(registry: &str) -> String {
    let mut s = format!("eris {VERSION}\ncontainer os: {CONTAINER_OS}\nimages:\n");
    for image in ErisImage::ALL {
        s.push_str(&format!("  {}\n", image.reference(registry)));
    }
    s.push_str(&format!(
        "definitions:\n  services: {}\n  actions: {}\n  chains: {}\n",
        SERVICE_DEFINITIONS.join(", "),
        ACTION_DEFINITIONS.join(", "),
        CHAIN_DEFINITIONS.join(", ")
    ));
    s
}

async fn run_data(
    cmd: DataCommands,
    runtime: &DockerRuntime,
    loader: &DefinitionLoader,
) -> Result<()> {
    let engine = DataEngine::new(runtime, loader);
    match cmd {
        DataCommands::Import {
            name,
            source,
            destination,
            skip_root_check,
            number,
        } => {
            let mut req =
                TransferRequest::new(name, source, destination).skip_root_check(skip_root_check);
            req.container_number = number;
            engine.import(&req).await.stack()?;
        }
        DataCommands::Export {
            name,
            source,
            destination,
            skip_root_check,
            number,
        } => {
            let mut req =
                TransferRequest::new(name, source, destination).skip_root_check(skip_root_check);
            req.container_number = number;
            engine.export(&req).await.stack()?;
        }
        DataCommands::Exec { name, args } => {
            print!("{}", engine.exec(&name, &args).await.stack()?);
        }
        DataCommands::Ls => {
            for info in engine.list().await.stack()? {
                println!("{}", info.label(LABEL_SHORT_NAME).unwrap_or(&info.name));
            }
        }
        DataCommands::Rm {
            name,
            rm_volumes,
            number,
        } => {
            engine.remove(&name, number, rm_volumes).await.stack()?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let paths = match cli.root {
        Some(root) => ErisPaths::new(root),
        None => ErisPaths::from_env().stack()?,
    };
    let config = GlobalConfig::load(&paths).await.stack()?;

    if let Commands::Version = cli.command {
        print!("{}", version_report(&config.image_registry));
        return Ok(())
    }

    let loader = DefinitionLoader::new(paths.clone(), config.image_registry.clone());
    let runtime = DockerRuntime::connect().await.stack()?;
    match cli.command {
        Commands::Init {
            yes,
            pull_images,
            source,
            testing,
        } => {
            let opts = InitOptions {
                yes,
                pull_images,
                source,
                testing,
            };
            initialize(&runtime, &paths, &opts).await.stack()?;
        }
        Commands::Ls {
            r#type,
            format,
            running,
        } => {
            let t: ListType = r#type.parse().stack()?;
            let format: ListFormat = format.parse().stack()?;
            print!("{}", list_containers(&runtime, t, &format, running).await.stack()?);
        }
        Commands::Data(cmd) => run_data(cmd, &runtime, &loader).await?,
        Commands::Inspect { container, field } => {
            print!("{}", inspect(&runtime, &container, &field).await.stack()?);
        }
        Commands::Ports { container, ports: requested } => {
            println!("{}", ports(&runtime, &container, &requested).await.stack()?);
        }
        Commands::Update { branch, checkout } => {
            let checkout = match checkout {
                Some(checkout) => checkout,
                None => paths.root.join("src").join("eris-cli"),
            };
            update(&runtime, &loader, &UpdateOptions { branch, checkout })
                .await
                .stack()?;
        }
        Commands::Version => (),
    }
    Ok(())
}
