//! Imports a directory tree into a real data container, reads it back through
//! `eris data exec`, exports it again and compares. Needs a running Docker
//! daemon and pulls the data image if it is missing.

use std::path::Path;

use clap::Parser;
use eris::{
    api_docker::DockerRuntime,
    data::{DataEngine, TransferRequest},
    inspect::inspect,
    list::{list_containers, ListFormat, ListType},
    naming::data_container_name,
    runtime::{ContainerInfo, ContainerRuntime},
    version::{ErisImage, DEFAULT_REGISTRY},
    DefinitionLoader, ErisPaths,
};
use stacked_errors::{ensure, ensure_eq, Result, StackableErr};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    #[arg(long, default_value_t = String::from("round_trip"))]
    name: String,
    #[arg(long, default_value_t = String::from(DEFAULT_REGISTRY))]
    registry: String,
}

fn write_tree(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir.join("sub/deeper")).stack()?;
    std::fs::write(dir.join("genesis.json"), b"{\"chain_id\": \"round_trip\"}").stack()?;
    std::fs::write(dir.join("sub/priv_validator.json"), b"secret").stack()?;
    std::fs::write(dir.join("sub/deeper/empty"), b"").stack()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();
    let args = Args::parse();

    let root = tempfile::tempdir().stack()?;
    let loader = DefinitionLoader::new(ErisPaths::new(root.path()), args.registry.clone());
    let runtime = DockerRuntime::connect().await.stack()?;
    runtime
        .pull_image(&loader.image(ErisImage::Data))
        .await
        .stack()?;
    let engine = DataEngine::new(&runtime, &loader);

    let src = tempfile::tempdir().stack()?;
    write_tree(src.path())?;

    info!("\n\nimport\n");
    let req = TransferRequest::new(
        args.name.as_str(),
        src.path().to_string_lossy(),
        "chains/round_trip",
    );
    engine.import(&req).await.stack()?;
    // a second import into the same destination must not create another
    // container
    engine.import(&req).await.stack()?;
    let container = data_container_name(&args.name);
    let count = |infos: Vec<ContainerInfo>| infos.iter().filter(|c| c.name == container).count();
    ensure_eq!(count(engine.list().await.stack()?), 1);

    let out = engine
        .exec(&args.name, &[
            "cat".to_owned(),
            "/home/eris/.eris/chains/round_trip/sub/priv_validator.json".to_owned(),
        ])
        .await
        .stack()?;
    ensure_eq!(out.trim(), "secret");

    info!("\n\nlisting\n");
    let listing = list_containers(&runtime, ListType::Data, &ListFormat::Standard, false)
        .await
        .stack()?;
    print!("{listing}");
    ensure!(listing.contains(&args.name));
    print!("{}", inspect(&runtime, &args.name, "line").await.stack()?);

    info!("\n\nexport\n");
    let dest = tempfile::tempdir().stack()?;
    let export = TransferRequest::new(
        args.name.as_str(),
        "chains/round_trip",
        dest.path().to_string_lossy(),
    );
    engine.export(&export).await.stack()?;
    ensure_eq!(
        std::fs::read(dest.path().join("genesis.json")).stack()?,
        std::fs::read(src.path().join("genesis.json")).stack()?
    );
    ensure_eq!(
        std::fs::read(dest.path().join("sub/priv_validator.json")).stack()?,
        b"secret".to_vec()
    );
    ensure!(dest.path().join("sub/deeper/empty").is_file());
    ensure!(!dest.path().join("round_trip").exists());

    let missing = TransferRequest::new(
        "definitely_not_imported",
        "chains",
        dest.path().to_string_lossy(),
    );
    ensure!(engine.export(&missing).await.unwrap_err().is_not_found());

    info!("\n\ncleanup\n");
    engine.remove(&args.name, 1, true).await.stack()?;
    ensure!(engine
        .remove(&args.name, 1, true)
        .await
        .unwrap_err()
        .is_not_found());
    Ok(())
}
