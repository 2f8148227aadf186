//! Remove LocalStack fixture containers left behind by aborted test runs.
//!
//! Usage:
//!   cleanup-orphans [--prefix local-stack] [--min-age-minutes 60]
//!
//! Talks to the local Docker daemon (`DOCKER_HOST` or the default socket).

use std::time::Duration;

use clap::Parser;
use localstack_fixture::config::DEFAULT_NAME_PREFIX;
use localstack_fixture::{remove_orphaned_containers, DockerRuntime};

#[derive(Debug, Parser)]
#[command(name = "cleanup-orphans", about = "Remove orphaned LocalStack fixture containers")]
struct Args {
    /// Container name prefix to match
    #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
    prefix: String,

    /// Only remove containers at least this old
    #[arg(long, default_value_t = 60)]
    min_age_minutes: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    localstack_fixture::init_logging();

    let args = Args::parse();

    println!("🧹 LocalStack Fixture Container Cleanup");
    println!("======================================");
    println!("   Prefix: {}", args.prefix);
    println!("   Min age: {} minutes", args.min_age_minutes);
    println!();

    let runtime = DockerRuntime::connect()?;
    let removed = remove_orphaned_containers(
        &runtime,
        &args.prefix,
        Duration::from_secs(args.min_age_minutes.saturating_mul(60)),
    )
    .await?;

    if removed.is_empty() {
        println!("✅ No orphaned containers found");
    } else {
        println!("✅ Removed {} containers:", removed.len());
        for name in &removed {
            println!("   - {}", name);
        }
    }

    Ok(())
}
