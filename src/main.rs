use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kroolo_authz::{
    config::Config,
    domain::{Module, PermissionName, ProfileRole, Session, StringUuid},
    migration,
    policy::{catalog, Capabilities, PageAccessGate},
    repository::RbacRepositoryImpl,
    service::PermissionResolver,
    telemetry,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "kroolo-authz",
    about = "Permission resolution and page access administration"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print Prometheus metrics to stderr after the command finishes.
    #[arg(long, global = true)]
    dump_metrics: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database, run migrations, and seed the permission catalog.
    Migrate,

    /// Seed the system roles for an organisation.
    SeedRoles {
        #[arg(long)]
        organization: Uuid,
    },

    /// List catalog permissions.
    Catalog {
        /// Only list one module (e.g. "tickets").
        #[arg(long)]
        module: Option<String>,
    },

    /// Resolve a user's effective permissions from the database.
    Resolve {
        #[arg(long)]
        user: Uuid,
    },

    /// Decide page access for a profile role and a set of held permissions.
    CheckPage {
        #[arg(long)]
        path: String,

        /// Profile role; omit to check as an unauthenticated visitor.
        #[arg(long)]
        role: Option<String>,

        /// Held permission (repeatable), e.g. "administration.view".
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },

    /// List the pages a profile role can open.
    Pages {
        #[arg(long)]
        role: String,

        /// Held permission (repeatable). Without any, permission
        /// requirements are ignored.
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },

    /// Report page rules that can never match under first-match.
    LintPages,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if cli.dump_metrics {
        config.telemetry.metrics_enabled = true;
    }
    let metrics = telemetry::init(&config.telemetry)?;

    run(cli.command, &config).await?;

    if cli.dump_metrics {
        if let Some(handle) = metrics {
            eprintln!("{}", handle.render());
        }
    }
    Ok(())
}

async fn run(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Migrate => {
            migration::run_migrations(config.require_database()?).await?;
        }
        Command::SeedRoles { organization } => {
            let pool = migration::connect(config.require_database()?).await?;
            let created = migration::seed_system_roles(&pool, organization.into()).await?;
            info!(created, organization = %organization, "System roles seeded");
            pool.close().await;
        }
        Command::Catalog { module } => {
            let entries = match module {
                Some(module) => {
                    let module: Module = module.parse()?;
                    catalog().list_by_module(module)
                }
                None => catalog().all().iter().collect(),
            };
            print_json(&entries)?;
        }
        Command::Resolve { user } => {
            let pool = migration::connect(config.require_database()?).await?;
            let resolver = PermissionResolver::new(Arc::new(RbacRepositoryImpl::new(pool)));
            let permissions = resolver.resolve(user.into()).await?;
            let modules: Vec<_> = Module::ALL
                .into_iter()
                .map(|m| permissions.module_access(m))
                .filter(|access| access.can_view || access.can_edit || access.can_full_edit)
                .collect();
            print_json(&serde_json::json!({
                "user_id": user,
                "permissions": permissions.to_rows(),
                "effective": permissions,
                "modules": modules,
            }))?;
        }
        Command::CheckPage {
            path,
            role,
            permissions,
        } => {
            let gate = config.page_access.build_gate()?;
            let held = parse_permissions(&permissions)?;
            let session = role
                .map(|r| r.parse::<ProfileRole>().map(offline_session))
                .transpose()?;
            let decision = gate.decide(&path, session.as_ref(), &held);
            print_json(&serde_json::json!({
                "path": path,
                "decision": decision.as_str(),
                "rule": gate.matching_rule(&path),
                "strategy": gate.strategy(),
            }))?;
        }
        Command::Pages { role, permissions } => {
            let gate = config.page_access.build_gate()?;
            let role: ProfileRole = role.parse()?;
            let pages = if permissions.is_empty() {
                gate.accessible_pages(role)
            } else {
                gate.accessible_pages_for(role, &parse_permissions(&permissions)?)
            };
            print_json(&pages)?;
        }
        Command::LintPages => {
            let gate: PageAccessGate = config.page_access.build_gate()?;
            print_json(&gate.shadowed_rules())?;
        }
    }
    Ok(())
}

fn parse_permissions(raw: &[String]) -> Result<BTreeSet<PermissionName>> {
    raw.iter()
        .map(|name| {
            name.parse::<PermissionName>()
                .with_context(|| format!("Invalid --permission '{}'", name))
        })
        .collect()
}

/// Session for checks that do not touch the store; only the role matters.
fn offline_session(role: ProfileRole) -> Session {
    Session {
        user_id: StringUuid::nil(),
        organization_id: StringUuid::nil(),
        role,
        team_ids: vec![],
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{}", out);
    Ok(())
}
