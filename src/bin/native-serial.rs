use clap::{Parser, Subcommand};
use native_serial::config::{ConfigLoader, ConfigResult};
use native_serial::{logging, native, HostKey, SerialPort};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Inspect serial devices and the native driver backing them.",
    long_about = "Non-interactive diagnostics: host key, driver version, device list and current line settings of a port."
)]
struct Args {
    /// Configuration file (default: standard resolution order)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial devices visible to the driver.
    Ports,
    /// Show the host key used to select native artifacts.
    Host,
    /// Show the driver library version.
    Version,
    /// Open a port and print its current settings.
    Info {
        /// Device name or configured alias; falls back to `serial.default_port`
        port: Option<String>,
    },
    /// Print the effective configuration as TOML.
    Config {
        /// Also save it to the loaded file, or to the per-user config path
        #[arg(long)]
        write: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let loader = match load_config(args.config.as_deref()) {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&loader.config().logging);

    match run(&args, &loader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if args.json {
                println!("{}", json!({ "error": e.to_string() }));
            } else {
                eprintln!("error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> ConfigResult<ConfigLoader> {
    match path {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    }
}

fn run(args: &Args, loader: &ConfigLoader) -> Result<(), Box<dyn std::error::Error>> {
    let config = loader.config();
    match &args.command {
        Command::Host => {
            let host = HostKey::resolve()?;
            if args.json {
                println!("{}", json!({ "host": host.to_string() }));
            } else {
                println!("{host}");
            }
        }
        Command::Version => {
            let version = native::init(&config.native)?.library_version();
            if args.json {
                println!("{}", json!({ "version": version }));
            } else {
                println!("{version}");
            }
        }
        Command::Ports => {
            native::init(&config.native)?;
            let names = native::port_names()?;
            if args.json {
                println!("{}", json!({ "ports": names }));
            } else if names.is_empty() {
                println!("No serial ports found");
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
        Command::Info { port } => {
            let requested = port
                .as_deref()
                .or(config.serial.default_port.as_deref())
                .ok_or("no port given and serial.default_port is not set")?;
            let name = config.serial.resolve_port(requested);

            let bridge = native::init(&config.native)?;
            let port = SerialPort::open_with(bridge, name)?;
            let settings = port.settings()?;
            if args.json {
                println!(
                    "{}",
                    json!({ "port": port.name(), "settings": settings })
                );
            } else {
                println!("{port}");
                println!("read timeout: {} ms", settings.read_timeout_ms);
            }
            port.close()?;
        }
        Command::Config { write } => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                print!("{}", toml::to_string_pretty(config)?);
            }
            if *write {
                let path = loader.save()?;
                eprintln!("saved to {}", path.display());
            }
        }
    }
    Ok(())
}
