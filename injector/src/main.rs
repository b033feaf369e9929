use std::{
    io::{IsTerminal, Read, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use injector::{Injector, options::InjectOptions, ports::PortRanges, reslist::List};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version, about)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Reads a `kind: List` of driver resources on stdin and prints the objects to apply.
    Inject(InjectArgs),
}

#[derive(Parser)]
struct InjectArgs {
    /// Image of the sidecar proxy.
    #[clap(long, env = "KARAVI_IMAGE_ADDR", default_value = "")]
    image_addr: String,
    /// Host of the authorization server.
    #[clap(long, env = "KARAVI_PROXY_HOST", default_value = "")]
    proxy_host: String,
    /// Skip TLS verification of the authorization server.
    #[clap(long, env = "KARAVI_INSECURE")]
    insecure: bool,
    /// Root CA of the authorization server.
    #[clap(long, env = "KARAVI_ROOT_CERTIFICATE")]
    root_certificate: Option<PathBuf>,
    /// Starting local port of a driver family, e.g. `powerflex=9000`.
    #[clap(long = "proxy-port", env = "KARAVI_PROXY_PORTS", value_delimiter = ',')]
    proxy_ports: Vec<String>,
    #[clap(long, value_enum, default_value_t = Output::Yaml)]
    output: Output,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    Yaml,
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::Inject(args) => inject(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn inject(args: InjectArgs) -> anyhow::Result<()> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!(
            "inject reads resources from stdin, e.g.\n  \
             kubectl get deploy,ds,secrets,cm -n <namespace> -o yaml | injector inject --proxy-host <host> | kubectl apply -f -"
        );
        return Ok(());
    }

    let options = InjectOptions {
        image_addr: args.image_addr,
        proxy_host: args.proxy_host,
        insecure: args.insecure,
        root_certificate: args.root_certificate,
        port_ranges: PortRanges::parse(&args.proxy_ports).context("parsing proxy ports")?,
    };

    let mut input = vec![];
    stdin.read_to_end(&mut input).context("reading stdin")?;

    let outputs = Injector::new(options).inject(&input)?;
    let rendered = outputs
        .iter()
        .map(|list| render(list, args.output))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut stdout = std::io::stdout().lock();
    for (i, document) in rendered.iter().enumerate() {
        if i > 0 {
            writeln!(stdout, "---")?;
        }
        stdout.write_all(document.as_bytes())?;
        if !document.ends_with('\n') {
            writeln!(stdout)?;
        }
    }
    stdout.flush()?;
    Ok(())
}

fn render(list: &List, output: Output) -> anyhow::Result<String> {
    match output {
        Output::Yaml => list.to_yaml(),
        Output::Json => list.to_json(),
    }
}
