use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use microceph_fixture::{Config, Provisioner};
use tracing::debug;

mod progress;

/// Provision microceph on a CI runner and print S3 credentials for the test suite
#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_CARGO_TARGET_TRIPLE"), ")"),
    about,
    long_about = None
)]
struct Args {
    /// Operation to perform
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    globals: Globals,
}

/// Arguments that apply regardless of command
#[derive(Parser, Debug)]
struct Globals {
    /// Enable verbose log output
    #[clap(short = 'v', long, conflicts_with = "quiet", global = true)]
    verbose: bool,

    /// Be quiet, suppress almost all output (except errors)
    #[clap(short = 'q', long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[clap(flatten)]
    config: Config,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make sure microceph is installed and running, and print credentials for it.
    ///
    /// On a runner that doesn't have microceph yet, this installs the snap, bootstraps a cluster,
    /// adds a loop-backed disk, enables the RADOS gateway, creates the `test` user and the
    /// `testbucket` bucket.  If microceph is already installed only a new key pair is created.
    ///
    /// Refuses to run unless the CI environment variable is exactly `true`.
    Provision {
        /// How to print the connection information
        #[clap(long, value_enum, default_value = "env")]
        format: OutputFormat,
    },

    /// Print one randomly generated key, the same way access keys are generated
    GenKey,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// `export VAR=value` lines, for `eval` in a shell step
    Env,

    /// A JSON object with `access_key_id`, `secret_access_key` and `bucket`
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    init_logging(&args.globals)?;

    debug!(?args, "Parsed command line");

    match args.command {
        Command::Provision { format } => {
            let mut provisioner = Provisioner::new(args.globals.config.clone());

            let info = progress::with_spinner(
                &args.globals,
                "Provisioning microceph",
                provisioner.provision(),
            )
            .await?;

            match format {
                OutputFormat::Env => print!("{}", info.to_env_exports()),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
            }
        }
        Command::GenKey => {
            println!(
                "{}",
                microceph_fixture::gen_random_string(&mut rand::thread_rng(), 10)
            );
        }
    }

    Ok(())
}

/// Log to stderr, so that stdout only ever contains the connection information
fn init_logging(globals: &Globals) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = if globals.verbose {
        "debug"
    } else if globals.quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("h2=warn,hyper=info,rustls=info,aws=warn,{level}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
