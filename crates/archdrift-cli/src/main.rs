use std::path::PathBuf;

use archdrift_core::config::LoggingConfig;
use archdrift_core::Config;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::WrapErr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "archdrift")]
#[command(about = "Architecture diagrams and drift reports for every commit", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Analyse local directories as they are on disk instead of cloning them
    #[arg(long, global = true)]
    working_tree: bool,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tracked repositories
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage architecture rules
    #[command(subcommand)]
    Ontology(OntologyCommand),

    /// Analyse a commit of a project
    Analyze {
        /// Project id or name
        project: String,
        /// Commit hash, branch or tag
        #[arg(long, default_value = "HEAD")]
        commit: String,
        /// Re-analyse even if the commit already has a version
        #[arg(long)]
        force: bool,
        /// Return as soon as the request is accepted
        #[arg(long)]
        no_wait: bool,
    },

    /// Submit a commit hook or CI payload
    Trigger {
        /// JSON payload file, or `-` for stdin
        #[arg(long, default_value = "-")]
        payload: String,
        /// Where the payload came from
        #[arg(long, value_enum, default_value_t = Source::Hook)]
        source: Source,
        /// Return as soon as the request is answered
        #[arg(long)]
        no_wait: bool,
    },

    /// Show scheduling state of a project
    Status {
        project: String,
        #[arg(long)]
        json: bool,
    },

    /// List analysed versions, newest first
    Versions {
        project: String,
        #[arg(long)]
        json: bool,
    },

    /// Show one version
    Show {
        project: String,
        /// Commit hash, unambiguous prefix, or `latest`
        #[arg(default_value = "latest")]
        version: String,
        #[arg(long)]
        json: bool,
    },

    /// Write a Markdown report of the latest version
    Report {
        project: String,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Poll remotes for new commits until interrupted
    Poll {
        /// Seconds between polls (overrides config)
        #[arg(long)]
        interval: Option<u64>,
        /// Poll once and exit
        #[arg(long)]
        once: bool,
    },

    /// Print the default configuration file
    Config,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Register a repository
    Add {
        name: String,
        /// Clone URL or local path
        repo_url: String,
    },
    /// List registered projects
    List,
    /// Delete a project with all of its versions
    Remove { project: String },
}

#[derive(Subcommand)]
enum OntologyCommand {
    /// Install rules for a project
    Set { project: String, file: PathBuf },
    /// Validate a rules file without installing it
    Check { file: PathBuf },
    /// Print the rules installed for a project
    Show { project: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Source {
    Hook,
    Webhook,
    Manual,
}

fn init_tracing(logging: &LoggingConfig, force_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json || force_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).wrap_err_with(|| format!("loading {}", path.display()))?,
        None => Config::load().wrap_err("loading configuration")?,
    };
    init_tracing(&config.logging, cli.log_json);

    if let Commands::Config = cli.command {
        print!("{}", Config::default_config_string());
        return Ok(());
    }
    if let Commands::Ontology(OntologyCommand::Check { file }) = &cli.command {
        return commands::check_ontology(file);
    }

    let app = commands::App::build(&config, cli.working_tree)?;
    match cli.command {
        Commands::Project(ProjectCommand::Add { name, repo_url }) => app.add_project(&name, &repo_url),
        Commands::Project(ProjectCommand::List) => app.list_projects(),
        Commands::Project(ProjectCommand::Remove { project }) => app.remove_project(&project).await,
        Commands::Ontology(OntologyCommand::Set { project, file }) => app.set_ontology(&project, &file).await,
        Commands::Ontology(OntologyCommand::Show { project }) => app.show_ontology(&project).await,
        Commands::Ontology(OntologyCommand::Check { .. }) | Commands::Config => Ok(()),
        Commands::Analyze {
            project,
            commit,
            force,
            no_wait,
        } => app.analyze(&project, &commit, force, !no_wait).await,
        Commands::Trigger {
            payload,
            source,
            no_wait,
        } => app.trigger(&payload, source.into(), !no_wait).await,
        Commands::Status { project, json } => app.status(&project, json),
        Commands::Versions { project, json } => app.versions(&project, json),
        Commands::Show { project, version, json } => app.show(&project, &version, json),
        Commands::Report { project, out } => app.report(&project, out.as_deref()),
        Commands::Poll { interval, once } => app.poll(&config, interval, once).await,
    }
}

impl From<Source> for archdrift_core::TriggerSource {
    fn from(source: Source) -> Self {
        match source {
            Source::Hook => Self::PostCommitHook,
            Source::Webhook => Self::Webhook,
            Source::Manual => Self::Manual,
        }
    }
}
