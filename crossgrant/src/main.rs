//! Interactive CLI: `crossgrant deploy` and `crossgrant teardown`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crossgrant::config::{collect_session, collect_teardown_scope, StdinPrompt};
use crossgrant::identity::StsIdentityResolver;
use crossgrant::orchestrator::{DeploymentOrchestrator, Providers, Resolvers};
use crossgrant::provider::CfnStackProvider;
use crossgrant::teardown::{TeardownEngine, TeardownOutcome};

#[derive(Parser)]
#[command(name = "crossgrant")]
#[command(about = "Provision cross-account S3 access via CloudFormation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the producer and consumer stacks and generate the
    /// verification script
    Deploy,

    /// Delete both stacks (consumer first) and remove generated artifacts
    Teardown,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crossgrant=info")),
        )
        .with_target(false)
        .init();
}

async fn deploy() -> Result<()> {
    let prompt = StdinPrompt;
    let session = collect_session(&prompt)?;

    let producer_provider = CfnStackProvider::from_profile(&session.profile_producer).await;
    let consumer_provider = CfnStackProvider::from_profile(&session.profile_consumer).await;
    let producer_sts = StsIdentityResolver::from_profile(&session.profile_producer).await;
    let consumer_sts = StsIdentityResolver::from_profile(&session.profile_consumer).await;

    let orchestrator = DeploymentOrchestrator::new(
        &session,
        Providers {
            producer: &producer_provider,
            consumer: &consumer_provider,
        },
        Resolvers {
            producer: &producer_sts,
            consumer: &consumer_sts,
        },
        &prompt,
    )
    .with_artifact_dir(std::env::current_dir()?);

    let result = orchestrator.run().await?;

    println!("producer stack: {} ({})", result.producer.name, result.producer.status);
    println!("consumer stack: {} ({})", result.consumer.name, result.consumer.status);
    println!("role ARN:       {}", result.role_arn);
    println!("verify with:    {}", result.artifact_path.display());
    Ok(())
}

async fn teardown() -> Result<()> {
    let prompt = StdinPrompt;
    let scope = collect_teardown_scope(&prompt)?;

    let producer_provider = CfnStackProvider::from_profile(&scope.profile_producer).await;
    let consumer_provider = CfnStackProvider::from_profile(&scope.profile_consumer).await;

    let engine = TeardownEngine::new(
        Providers {
            producer: &producer_provider,
            consumer: &consumer_provider,
        },
        &prompt,
    )
    .with_artifact_dir(std::env::current_dir()?);

    let report = engine.teardown(&scope).await?;

    if !report.confirmed {
        println!("teardown declined, nothing deleted");
        return Ok(());
    }
    for (stack, outcome) in &report.stacks {
        let text = match outcome {
            TeardownOutcome::Deleted => "deleted".to_string(),
            TeardownOutcome::NotFound => "not found, nothing to delete".to_string(),
            TeardownOutcome::TimedOut => "delete issued, wait timed out (re-run to check)".to_string(),
            TeardownOutcome::Failed(reason) => format!("failed: {reason}"),
        };
        println!("{stack}: {text}");
    }
    for path in &report.removed_artifacts {
        println!("removed {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Deploy => deploy().await,
        Commands::Teardown => teardown().await,
    };

    if let Err(err) = outcome {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
