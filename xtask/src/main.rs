use anyhow::{
    Context,
    Result,
    ensure,
};
use clap::{
    Parser,
    Subcommand,
};
use std::{
    path::Path,
    process::Command,
};

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "dream-ops helper tasks (clippy, fmt, tests)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Check formatting against rustfmt.toml
    Fmt,
    /// Run the workspace tests with the mock connection enabled
    Test {
        /// Only run tests of this package
        #[arg(short, long)]
        package: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root()?;

    match cli.command {
        Commands::Clippy => run_clippy(&root)?,
        Commands::Fmt => run_fmt(&root)?,
        Commands::Test { package } => run_tests(&root, package.as_deref())?,
    }

    Ok(())
}

fn repo_root() -> Result<std::path::PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--all-features")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")
}

fn run_fmt(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("fmt").arg("--all").arg("--check").current_dir(root);
    run_command(cmd, "cargo fmt --check")
}

fn run_tests(root: &Path, package: Option<&str>) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test").arg("--all-features").current_dir(root);
    let label = match package {
        Some(package) => {
            cmd.arg("-p").arg(package);
            format!("cargo test -p {package}")
        }
        None => {
            cmd.arg("--workspace");
            "cargo test --workspace".to_string()
        }
    };
    run_command(cmd, &label)
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {label}");
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}
