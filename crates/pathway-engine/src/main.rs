//! CLI entry point for the Pathway graph-integrity engine.
//!
//! Runs one mutation or query against Neo4j and prints the result as JSON
//! on stdout. Domain errors are printed as
//! `{code, status, message, retryable}` and exit with a non-zero status.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use pathway_core::{PathwayConfig, PointId, PointPlacement, ProjectId, UserId};
use pathway_engine::{validate, GraphMutationService, PathError};
use pathway_graph::{GraphClient, Neo4jStore};

#[derive(Parser)]
#[command(name = "pathway")]
#[command(about = "Graph-integrity engine for the Pathway point graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: pathway).
    #[arg(short, long, default_value = "pathway", global = true)]
    config: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create the Neo4j schema constraints.
    InitSchema,
    /// Create an empty project.
    CreateProject {
        #[arg(long)]
        user: i64,
    },
    /// Create a point. An origin alone attaches the point after it, a
    /// destination alone before it, and both split the edge between them.
    CreatePoint {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        user: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        origin: Option<String>,
        #[arg(long)]
        destination: Option<String>,
    },
    /// Add an edge from origin to destination.
    Connect {
        #[arg(long)]
        origin: Option<String>,
        #[arg(long)]
        destination: Option<String>,
    },
    /// Remove the edge from origin to destination.
    Disconnect {
        #[arg(long)]
        origin: Option<String>,
        #[arg(long)]
        destination: Option<String>,
    },
    /// Route the edge from origin to destination through an existing point.
    SplitEdge {
        #[arg(long)]
        origin: Option<String>,
        #[arg(long)]
        destination: Option<String>,
        #[arg(long)]
        middle: i64,
    },
    /// Change a point's title and/or summary.
    UpdatePoint {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Delete a point with no edges or items.
    DeletePoint {
        #[arg(long)]
        id: i64,
    },
    /// Show a point with its attached item ids.
    ShowPoint {
        #[arg(long)]
        id: i64,
    },
    /// Show every point and edge.
    ShowGraph,
    /// Show a project's points and their edges.
    ShowProject {
        #[arg(long)]
        project: i64,
    },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    status: u16,
    message: String,
    retryable: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let config = PathwayConfig::load(&cli.config)?;
    let client = GraphClient::connect(&config.neo4j).await?;

    if let Command::InitSchema = cli.command {
        client.ensure_schema().await?;
        println!("{}", serde_json::json!({ "schema": "ok" }));
        return Ok(ExitCode::SUCCESS);
    }

    let service = GraphMutationService::new(Neo4jStore::new(client), &config.graph);
    match run(&service, cli.command).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let err = err.downcast::<PathError>()?;
            let body = ErrorBody {
                code: err.code().as_str(),
                status: err.code().status(),
                message: err.to_string(),
                retryable: err.is_retryable(),
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(
    service: &GraphMutationService<Neo4jStore>,
    command: Command,
) -> anyhow::Result<serde_json::Value> {
    match command {
        Command::InitSchema => Ok(serde_json::Value::Null),
        Command::CreateProject { user } => {
            let project = service.create_project(UserId(user)).await?;
            render(&project)
        }
        Command::CreatePoint {
            project,
            user,
            title,
            origin,
            destination,
        } => {
            let origin = validate::parse_optional_point(origin.as_deref(), "origin")?;
            let destination =
                validate::parse_optional_point(destination.as_deref(), "destination")?;
            let placement = PointPlacement::from_endpoints(origin, destination);
            let point = service
                .create_point(ProjectId(project), UserId(user), &title, placement)
                .await?;
            render(&point)
        }
        Command::Connect {
            origin,
            destination,
        } => {
            let (origin, destination) =
                validate::parse_point_pair(origin.as_deref(), destination.as_deref())?;
            let edge = service.connect(origin, destination).await?;
            render(&edge)
        }
        Command::Disconnect {
            origin,
            destination,
        } => {
            let (origin, destination) =
                validate::parse_point_pair(origin.as_deref(), destination.as_deref())?;
            service.disconnect(origin, destination).await?;
            Ok(serde_json::json!({ "origin": origin, "destination": destination, "removed": true }))
        }
        Command::SplitEdge {
            origin,
            destination,
            middle,
        } => {
            let (origin, destination) =
                validate::parse_point_pair(origin.as_deref(), destination.as_deref())?;
            let edges = service
                .split_edge(origin, destination, PointId(middle))
                .await?;
            render(&edges)
        }
        Command::UpdatePoint { id, title, summary } => {
            let point = service
                .update_point(PointId(id), title.as_deref(), summary.as_deref())
                .await?;
            render(&point)
        }
        Command::DeletePoint { id } => {
            service.delete_point(PointId(id)).await?;
            Ok(serde_json::json!({ "id": id, "deleted": true }))
        }
        Command::ShowPoint { id } => {
            let view = service.get_point(PointId(id)).await?;
            render(&view)
        }
        Command::ShowGraph => {
            let graph = service.full_graph().await?;
            render(&graph)
        }
        Command::ShowProject { project } => {
            let graph = service.project_graph(ProjectId(project)).await?;
            render(&graph)
        }
    }
}

fn render<T: Serialize>(value: &T) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}
