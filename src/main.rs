use ringtree::loader;
use ringtree::{RingBuildConfig, RingTreeBuilder, RingTreeRecipe};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "<topology> <weights> <exclusionList> <ringParentID> <storagePolicyGroup> \
<storagePolicyName> <HostGroupTableFile> <HostGroup,...>";

fn run(args: &[String]) -> ringtree::Result<()> {
    let topology = Arc::new(loader::load_topology(Path::new(&args[0]))?);
    let weights = loader::load_weights(Path::new(&args[1]))?;
    let exclusions = loader::load_exclusions(Path::new(&args[2]))?;
    let ring_parent = args[3].as_str();
    let policy_group = Arc::new(loader::load_policy_group(Path::new(&args[4]))?);
    let policy_name = args[5].as_str();
    let host_group_table = loader::load_host_group_table(Path::new(&args[6]))?;
    let host_groups = loader::parse_host_groups(&args[7]);

    let recipe = RingTreeRecipe::new(topology, ring_parent, policy_group, policy_name)?
        .with_weights(weights)
        .with_exclusions(exclusions)
        .with_host_groups(host_group_table, host_groups)?;

    let builder = RingTreeBuilder::new(RingBuildConfig::default())?;
    let tree = builder.build(&recipe, None)?;
    println!("{}", tree);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ringtree=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 8 {
        eprintln!("usage: ringtree {}", USAGE);
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Ring tree build failed");
            ExitCode::FAILURE
        }
    }
}
