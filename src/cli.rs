use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "tomcat-jar")]
#[command(version)]
#[command(about = "Declarative deployment of JAR files into Tomcat servers", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest file (default: ~/.config/tomcat-jar/jars.toml)
    #[arg(short, long, global = true, env = "TOMCAT_JAR_MANIFEST")]
    pub file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check every declaration in the manifest
    Validate,

    /// Show the resolved deployment plans
    Plan(PlanArgs),

    /// Show current vs desired state
    Status(TargetArgs),

    /// Preview what apply would change
    Diff(TargetArgs),

    /// Make the filesystem match the manifest
    Apply(ApplyArgs),

    /// Deploy a single jar without a manifest
    Deploy(DeployArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Target filter: a jar name, a step type (jars, files) or type.name
    pub target: Option<String>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Target filter: a jar name, a step type (jars, files) or type.name
    pub target: Option<String>,

    /// Print plans as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Target filter: a jar name, a step type (jars, files) or type.name
    pub target: Option<String>,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of jars deployed in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,
}

#[derive(Args)]
pub struct DeployArgs {
    /// Jar name, e.g. sample.jar
    pub name: String,

    /// Parameter as key=value (repeatable), e.g. -p jar_source=/tmp/sample.jar
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}
