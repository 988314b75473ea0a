//! rql - command-line client for the RedDot / OpenText CMS

use std::io::{self, Read};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reddot_cms::{Guid, Named, Project, Session, SessionConfig};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rql")]
#[command(author, version, about = "Query a RedDot / OpenText CMS over RQL")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// URL of the RQL web service
    #[arg(long, env = "REDDOT_URL", global = true)]
    url: Option<String>,

    /// Login name
    #[arg(short, long, env = "REDDOT_USER", global = true)]
    user: Option<String>,

    /// Password
    #[arg(long, env = "REDDOT_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// GUID of the project to work in
    #[arg(short, long, env = "REDDOT_PROJECT", global = true)]
    project: Option<Guid>,

    /// Request timeout in seconds
    #[arg(long, env = "REDDOT_TIMEOUT_SECS", global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the projects visible to the user
    Projects,

    /// List the pages of the project
    Pages {
        /// Load every page to show status and change date
        #[arg(short, long)]
        details: bool,
    },

    /// List the content classes of the project
    #[command(alias = "templates")]
    ContentClasses,

    /// List the workflows of the project
    Workflows,

    /// List the categories of the project
    Categories {
        /// Also list the keywords of every category
        #[arg(short, long)]
        keywords: bool,
    },

    /// Show the logged-in user
    Whoami,

    /// Send a raw RQL request body and print the reply
    Raw {
        /// Request body, or `-` to read it from stdin
        body: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = session_config(&cli.connection)?;
    let mut session = Session::login(&config)
        .await
        .with_context(|| format!("Failed to log in to '{}'", config.url))?;

    let result = run(&cli, &mut session).await;
    if let Err(e) = session.logout().await {
        tracing::warn!("Logout failed: {e}");
    }
    result
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "reddot_rql=debug,reddot_cms=debug,rql=debug",
        _ => "reddot_rql=trace,reddot_cms=trace,rql=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn session_config(args: &ConnectionArgs) -> Result<SessionConfig> {
    let mut config = SessionConfig::default();
    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    let user = args.user.clone().context("No user given (--user or REDDOT_USER)")?;
    config = config.with_credentials(user, args.password.clone().unwrap_or_default());
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

async fn run(cli: &Cli, session: &mut Session) -> Result<()> {
    match &cli.command {
        Commands::Projects => list_projects(session, cli.json).await,
        Commands::Pages { details } => {
            let mut project = project(cli, session)?;
            list_pages(&mut project, *details, cli.json).await
        }
        Commands::ContentClasses => {
            let mut project = project(cli, session)?;
            list_content_classes(&mut project, cli.json).await
        }
        Commands::Workflows => {
            let mut project = project(cli, session)?;
            list_workflows(&mut project, cli.json).await
        }
        Commands::Categories { keywords } => {
            let mut project = project(cli, session)?;
            list_categories(&mut project, *keywords, cli.json).await
        }
        Commands::Whoami => whoami(session, cli.json).await,
        Commands::Raw { body } => raw(cli, session, body).await,
    }
}

fn project(cli: &Cli, session: &Session) -> Result<Project> {
    match cli.connection.project {
        Some(guid) => Ok(session.project(guid)),
        None => bail!("No project given (--project or REDDOT_PROJECT)"),
    }
}

// ============================================================================
// Output
// ============================================================================

/// A result line, printed tab-separated or as JSON.
trait Row: Serialize {
    fn columns(&self) -> Vec<String>;
}

fn print_rows<R: Row>(rows: &[R], json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(rows).context("Failed to encode JSON")?;
        println!("{text}");
    } else {
        for row in rows {
            println!("{}", row.columns().join("\t"));
        }
    }
    Ok(())
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ============================================================================
// Commands
// ============================================================================

/// GUID and name of a listed object.
#[derive(Serialize)]
struct NamedRow {
    guid: Guid,
    name: String,
}

impl Row for NamedRow {
    fn columns(&self) -> Vec<String> {
        vec![self.guid.to_string(), self.name.clone()]
    }
}

async fn list_projects(session: &mut Session, json: bool) -> Result<()> {
    let projects = session.projects().items().await.context("Failed to list projects")?;
    let rows: Vec<NamedRow> = projects
        .iter()
        .map(|p| NamedRow {
            guid: p.guid(),
            name: Named::name(p).to_string(),
        })
        .collect();
    print_rows(&rows, json)
}

#[derive(Serialize)]
struct PageRow {
    guid: Guid,
    id: Option<u32>,
    headline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed_at: Option<String>,
}

impl Row for PageRow {
    fn columns(&self) -> Vec<String> {
        let mut columns = vec![opt(self.id), self.guid.to_string(), self.headline.clone()];
        if self.status.is_some() || self.changed_at.is_some() {
            columns.push(opt(self.status));
            columns.push(self.changed_at.clone().unwrap_or_default());
        }
        columns
    }
}

async fn list_pages(project: &mut Project, details: bool, json: bool) -> Result<()> {
    let pages = project.pages().items_mut().await.context("Failed to list pages")?;
    let mut rows = Vec::with_capacity(pages.len());
    for page in pages.iter_mut() {
        let (status, changed_at) = if details {
            let status = page.status().await?;
            let changed_at = page.changed_at().await?;
            (status, changed_at.map(|d| d.to_string()))
        } else {
            (None, None)
        };
        rows.push(PageRow {
            guid: page.guid(),
            id: page.known_id(),
            headline: page.known().headline.clone().unwrap_or_default(),
            status,
            changed_at,
        });
    }
    print_rows(&rows, json)
}

async fn list_content_classes(project: &mut Project, json: bool) -> Result<()> {
    let classes = project
        .content_classes()
        .items()
        .await
        .context("Failed to list content classes")?;
    let rows: Vec<NamedRow> = classes
        .iter()
        .map(|c| NamedRow {
            guid: c.guid(),
            name: Named::name(c).to_string(),
        })
        .collect();
    print_rows(&rows, json)
}

async fn list_workflows(project: &mut Project, json: bool) -> Result<()> {
    let workflows = project.workflows().items().await.context("Failed to list workflows")?;
    let rows: Vec<NamedRow> = workflows
        .iter()
        .map(|w| NamedRow {
            guid: w.guid(),
            name: Named::name(w).to_string(),
        })
        .collect();
    print_rows(&rows, json)
}

#[derive(Serialize)]
struct CategoryRow {
    guid: Guid,
    name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    keywords: Vec<NamedRow>,
}

impl Row for CategoryRow {
    fn columns(&self) -> Vec<String> {
        let keywords: Vec<&str> = self.keywords.iter().map(|k| k.name.as_str()).collect();
        vec![self.guid.to_string(), self.name.clone(), keywords.join(", ")]
    }
}

async fn list_categories(project: &mut Project, with_keywords: bool, json: bool) -> Result<()> {
    let categories = project
        .categories()
        .items_mut()
        .await
        .context("Failed to list categories")?;
    let mut rows = Vec::with_capacity(categories.len());
    for category in categories.iter_mut() {
        let name = Named::name(&*category).to_string();
        let keywords = if with_keywords {
            category
                .keywords()
                .items()
                .await
                .with_context(|| format!("Failed to load keywords of '{name}'"))?
                .iter()
                .map(|k| NamedRow {
                    guid: k.guid(),
                    name: k.name().to_string(),
                })
                .collect()
        } else {
            Vec::new()
        };
        rows.push(CategoryRow {
            guid: category.guid(),
            name,
            keywords,
        });
    }
    print_rows(&rows, json)
}

#[derive(Serialize)]
struct UserRow {
    guid: Guid,
    name: String,
    full_name: Option<String>,
    email: Option<String>,
    language: Option<String>,
}

impl Row for UserRow {
    fn columns(&self) -> Vec<String> {
        vec![
            self.guid.to_string(),
            self.name.clone(),
            opt(self.full_name.as_deref()),
            opt(self.email.as_deref()),
            opt(self.language.as_deref()),
        ]
    }
}

async fn whoami(session: &mut Session, json: bool) -> Result<()> {
    let user = session.current_user();
    let row = UserRow {
        guid: user.guid(),
        name: user.name().await?.to_string(),
        full_name: user.full_name().await?.map(str::to_string),
        email: user.email().await?.map(str::to_string),
        language: user.language().await?.map(str::to_string),
    };
    print_rows(&[row], json)
}

async fn raw(cli: &Cli, session: &Session, body: &str) -> Result<()> {
    let body = if body == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read request from stdin")?;
        text
    } else {
        body.to_string()
    };

    if let Some(project) = cli.connection.project {
        session.select_project(project).await?;
    }
    let reply = session.execute_raw(body.trim()).await?;
    println!("{}", reply.response());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_args_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rql",
            "pages",
            "--details",
            "--user",
            "editor",
            "--project",
            "0123456789abcdef0123456789abcdef",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Pages { details: true }));
        assert_eq!(
            cli.connection.project.map(|g| g.to_string()).as_deref(),
            Some("0123456789ABCDEF0123456789ABCDEF")
        );
    }

    #[test]
    fn test_session_config_requires_user() {
        let args = ConnectionArgs {
            url: Some("http://cms".into()),
            user: None,
            password: None,
            project: None,
            timeout: Some(3),
        };
        assert!(session_config(&args).is_err());

        let args = ConnectionArgs {
            user: Some("editor".into()),
            ..args
        };
        let config = session_config(&args).unwrap();
        assert_eq!(config.url, "http://cms");
        assert_eq!(config.timeout, Duration::from_secs(3));
    }
}
