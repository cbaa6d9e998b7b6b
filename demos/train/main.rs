//! # structfig training demo
//!
//! A pretend training launcher that parses its settings with structfig and
//! prints the resolved config. Nothing is trained.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example train -- --help
//! cargo run --example train -- --steps 50 --compute.device cuda
//! cargo run --example train -- --config_path base.yaml override.yaml -n 2
//! RUST_LOG=structfig=debug cargo run --example train -- --warmup.steps 10
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature                  | How to exercise it                                      |
//! |--------------------------|---------------------------------------------------------|
//! | Schema defaults          | `cargo run --example train`                             |
//! | Dotted nested options    | `--log.exp_name run7 --compute.workers 4`               |
//! | Aliases                  | `-n 4`, `--workers 4`, `-v true`                        |
//! | Config files             | `--config_path a.yaml b.yaml` (later files win)         |
//! | Optional record group    | `--warmup.steps 10` creates the warmup section          |
//! | Custom scalar type       | `--timeout 15m`                                         |
//! | Post-init derived field  | `log.exp_dir` follows `exp_folder` and `exp_name`       |
//! | Other formats            | `STRUCTFIG_FORMAT=toml cargo run --example train`       |

mod config;

use structfig::{ConfigFormat, Context, DumpOptions, Structfig, StructfigError};
use tracing_subscriber::EnvFilter;

use config::TrainConfig;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        match err {
            StructfigError::Cli(err) => err.exit(),
            err => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
    }
}

fn run() -> Result<(), StructfigError> {
    let ctx = Context::global();
    config::register(ctx);

    if let Ok(name) = std::env::var("STRUCTFIG_FORMAT") {
        let format: ConfigFormat = name.parse()?;
        ctx.set_config_format(format);
    }

    let config = Structfig::builder::<TrainConfig>().app_name("train").parse()?;
    println!("# Resolved config");
    print!("{}", structfig::dump(&config, DumpOptions::default())?);
    println!();
    println!("# Changed from defaults");
    print!("{}", structfig::dump(&config, DumpOptions::omit_defaults())?);
    Ok(())
}
