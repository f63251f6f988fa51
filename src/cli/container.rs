//! `portunix container ...`: container run/exec/logs/cp/rm/ps/compose.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::container::runtime::{ContainerRuntime, Runtime};
use crate::container::{compose, install, PodmanHints, RunRequest};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ContainerArgs {
    #[command(subcommand)]
    pub command: ContainerCommand,
}

#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
    Run(RunArgs),
    Exec(ExecArgs),
    Logs(LogsArgs),
    Cp(CpArgs),
    Rm(RmArgs),
    Ps,
    Start { container: String },
    Stop { container: String },
    Compose(ComposeArgs),
    /// Runs `portunix install <pkg>` inside a disposable container built
    /// from `image`
    RunInContainer(RunInContainerArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    pub image: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(short = 'd', long)]
    pub detach: bool,
    #[arg(short = 'i', long)]
    pub interactive: bool,
    #[arg(short = 't', long)]
    pub tty: bool,
    #[arg(short = 'p', long = "publish")]
    pub publish: Vec<String>,
    #[arg(short = 'v', long = "volume")]
    pub volumes: Vec<String>,
    #[arg(short = 'e', long = "env")]
    pub env: Vec<String>,
    #[arg(long)]
    pub rootless: bool,
    #[arg(long)]
    pub pod: Option<String>,
    /// Publishes 22/tcp and sets a random root password on the guest
    ///
    #[arg(long = "enable-ssh")]
    pub enable_ssh: bool,
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    pub container: String,
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    pub container: String,
    #[arg(short = 'f', long)]
    pub follow: bool,
}

#[derive(Args, Debug)]
pub struct CpArgs {
    pub src: String,
    pub dst: String,
}

#[derive(Args, Debug)]
pub struct RmArgs {
    pub container: String,
    #[arg(short = 'f', long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    #[arg(long = "project-dir", default_value = ".")]
    pub project_dir: PathBuf,
    #[arg(trailing_var_arg = true, required = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RunInContainerArgs {
    pub image: String,
    pub pkg: String,
    #[arg(long)]
    pub portunix_binary: Option<PathBuf>,
}

pub async fn execute(args: ContainerArgs) -> Result<()> {
    match args.command {
        ContainerCommand::Run(a) => run(a).await,
        ContainerCommand::Exec(a) => {
            let runtime = Runtime::detect().await?;
            let cmd: Vec<&str> = a.command.iter().map(String::as_str).collect();
            let out = runtime.as_trait().exec(&a.container, &cmd).await?;
            print!("{}", out.stdout_str());
            eprint!("{}", out.stderr_str());
            Ok(())
        }
        ContainerCommand::Logs(a) => {
            let runtime = Runtime::detect().await?;
            let out = runtime.as_trait().logs(&a.container, a.follow).await?;
            print!("{}", out.stdout_str());
            Ok(())
        }
        ContainerCommand::Cp(a) => {
            let runtime = Runtime::detect().await?;
            runtime.as_trait().cp(&a.src, &a.dst).await
        }
        ContainerCommand::Rm(a) => {
            let runtime = Runtime::detect().await?;
            runtime.as_trait().rm(&a.container, a.force).await
        }
        ContainerCommand::Ps => ps().await,
        ContainerCommand::Start { container } => {
            let runtime = Runtime::detect().await?;
            runtime.as_trait().start(&container).await
        }
        ContainerCommand::Stop { container } => {
            let runtime = Runtime::detect().await?;
            runtime.as_trait().stop(&container).await
        }
        ContainerCommand::Compose(a) => compose_cmd(a).await,
        ContainerCommand::RunInContainer(a) => run_in_container(a).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let runtime = Runtime::detect().await?;
    let mut publish = args.publish;
    if args.enable_ssh {
        publish.push("2222:22".to_string());
        let password = crate::container::ssh::generate_password();
        println!("ssh root password: {password}");
    }
    let req = RunRequest {
        image: args.image,
        name: args.name,
        detach: args.detach,
        interactive: args.interactive,
        tty: args.tty,
        publish,
        volumes: args.volumes,
        env: args.env,
        command: args.command,
        podman_hints: PodmanHints {
            rootless: args.rootless,
            pod: args.pod,
        },
        extra_args: Vec::new(),
    };
    let id = runtime.as_trait().run(&req).await?;
    println!("{id}");
    Ok(())
}

async fn ps() -> Result<()> {
    let runtime = Runtime::detect().await?;
    let containers = runtime.as_trait().ps().await?;
    if containers.is_empty() {
        println!("no containers");
        return Ok(());
    }
    for c in containers {
        println!("{}\t{}\t{}\t{}", c.id, c.name, c.image, c.status);
    }
    Ok(())
}

async fn compose_cmd(args: ComposeArgs) -> Result<()> {
    let cmd = compose::detect().await?;
    let arg_refs: Vec<&str> = args.args.iter().map(String::as_str).collect();
    let out = compose::run(cmd, &arg_refs, &args.project_dir).await?;
    print!("{}", out.stdout_str());
    eprint!("{}", out.stderr_str());
    Ok(())
}

async fn run_in_container(args: RunInContainerArgs) -> Result<()> {
    let runtime = Runtime::detect().await?;
    let binary = match args.portunix_binary {
        Some(path) => path,
        None => std::env::current_exe().map_err(|e| crate::error::Error::io("current_exe", e))?,
    };
    install::install_in_container(runtime.as_trait(), &args.image, &args.pkg, &binary).await?;
    println!("{} installed in a container built from {}", args.pkg, args.image);
    Ok(())
}
