use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use structopt::StructOpt;

use filedepot::{
    discovery,
    repository::Repositories,
    service::{self, ServiceState},
    visibility::GroupFilter,
};
use filedepot_revision::links;

#[derive(Debug, StructOpt)]
struct Opt {
    #[structopt(
        long,
        default_value = "/var/lib/depot",
        help = "parent directory scanned for repositories at startup"
    )]
    root: PathBuf,

    #[structopt(
        long = "repo",
        number_of_values = 1,
        help = "an additional repository, as <name>:<path>"
    )]
    repo: Vec<String>,

    #[structopt(long, help = "comma-separated group names shown in listings")]
    whitelist: Option<String>,

    #[structopt(long, help = "comma-separated group names hidden from listings")]
    blacklist: Option<String>,

    #[structopt(long, default_value = "0.0.0.0:8083", help = "address to listen on")]
    listen: SocketAddr,

    #[structopt(
        long,
        help = "host name reported in responses (defaults to the system host name)"
    )]
    host_name: Option<String>,

    #[structopt(long, help = "proxy name reported in responses")]
    proxy: Option<String>,

    #[structopt(long, help = "enable debug logging")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    let _logger = flexi_logger::Logger::try_with_env_or_str(if opt.debug {
        "debug"
    } else {
        "info"
    })?
    .start()?;

    let host = match &opt.host_name {
        Some(host) => host.clone(),
        None => hostname::get()?.to_string_lossy().into_owned(),
    };

    let filter = match (&opt.whitelist, &opt.blacklist) {
        (Some(csv), _) => GroupFilter::whitelist(csv),
        (None, Some(csv)) => GroupFilter::blacklist(csv),
        (None, None) => GroupFilter::all(),
    };

    // Register every repository found under the parent directory, then
    // the explicit mappings, which may override discovered names.
    let mut repositories = Repositories::new();
    for repo in discovery::discover(&opt.root)? {
        repositories.route(&repo.name, repo.root, repo.depth);
    }
    for value in &opt.repo {
        match discovery::parse_repo_option(value) {
            Some(repo) => repositories.route(&repo.name, repo.root, repo.depth),
            None => anyhow::bail!("malformed --repo value: {}", value),
        }
    }

    // One-shot maintenance: bring legacy references back to the relative
    // form before serving anything.
    for repo in repositories.iter() {
        let repaired = links::repair_tree(&repo.root)?;
        if repaired > 0 {
            log::info!("{}: repaired {} legacy links", repo.root.display(), repaired);
        }
    }

    let state = Arc::new(ServiceState::new(
        repositories,
        filter,
        &host,
        opt.proxy.as_deref(),
    ));

    log::info!("SERVICE STARTED ON {}", host);

    let listener = tokio::net::TcpListener::bind(opt.listen).await?;
    axum::serve(listener, service::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("cannot listen for the shutdown signal: {}", err);
    }
}
