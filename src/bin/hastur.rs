//! hastur - zero-conf systemd container manager.
//!
//! A wrapper around systemd-nspawn that starts containers with
//! overlayfs, pre-installed packages and a bridged network out of the
//! box. Operates over a root directory holding base images keyed by
//! package-set fingerprint and the containers derived from them.
//!
//! ## Usage
//!
//! ```sh
//! hastur -S [-n <name>] [-a <addr>] [--] [<command>...]
//! hastur -Q [-j] [<name>...]
//! hastur -Q -i
//! hastur -Q (--rootfs|--ip) <name>
//! hastur -D [-f] <name>
//! hastur --free
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use hastur::lifecycle::{self, StartOptions};
use hastur::{bootstrap, query, signals, storage};

/// Default root directory holding images and containers.
const DEFAULT_ROOT: &str = "/var/lib/hastur/";

/// Default bridge spec.
const DEFAULT_BRIDGE: &str = "br0:10.0.0.1/8";

/// Default storage spec.
const DEFAULT_STORAGE: &str = "autodetect";

/// Packages installed into a base image when `-p` is not given.
const DEFAULT_PACKAGES: &str = "bash,coreutils,iproute2,iputils,libidn,nettle";

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Command {
    Start,
    Query {
        json: bool,
        images: bool,
        rootfs: bool,
        ip: bool,
    },
    Destroy,
    Free,
    Help,
}

#[derive(Debug)]
struct Args {
    command: Command,
    root_dir: String,
    storage_spec: String,
    bridge: String,
    packages: Vec<String>,
    name: Option<String>,
    address: Option<String>,
    host_interface: Option<String>,
    copy_dir: Option<PathBuf>,
    keep: bool,
    keep_failed: bool,
    quiet: bool,
    force: bool,
    positional: Vec<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            command: Command::Help,
            root_dir: DEFAULT_ROOT.to_string(),
            storage_spec: DEFAULT_STORAGE.to_string(),
            bridge: DEFAULT_BRIDGE.to_string(),
            packages: Vec::new(),
            name: None,
            address: None,
            host_interface: None,
            copy_dir: None,
            keep: false,
            keep_failed: false,
            quiet: false,
            force: false,
            positional: Vec::new(),
        }
    }
}

fn parse_args(argv: &[String]) -> Result<Args, String> {
    let mut args = Args::default();
    let mut command = None;
    let mut json = false;
    let mut images = false;
    let mut rootfs = false;
    let mut ip = false;

    fn value_of(i: &mut usize, flag: &str, argv: &[String]) -> Result<String, String> {
        *i += 1;
        argv.get(*i)
            .cloned()
            .ok_or_else(|| format!("{} requires a value", flag))
    }

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "-S" => command = Some(Command::Start),
            "-Q" => command = Some(Command::Query { json: false, images: false, rootfs: false, ip: false }),
            "-D" => command = Some(Command::Destroy),
            "--free" => command = Some(Command::Free),
            "-h" | "--help" => command = Some(Command::Help),

            "-r" => args.root_dir = value_of(&mut i, "-r", argv)?,
            "-s" => args.storage_spec = value_of(&mut i, "-s", argv)?,
            "-b" => args.bridge = value_of(&mut i, "-b", argv)?,
            "-p" => args.packages.push(value_of(&mut i, "-p", argv)?),
            "-n" => args.name = Some(value_of(&mut i, "-n", argv)?),
            "-a" => args.address = Some(value_of(&mut i, "-a", argv)?),
            "-t" => args.host_interface = Some(value_of(&mut i, "-t", argv)?),
            "-x" => args.copy_dir = Some(PathBuf::from(value_of(&mut i, "-x", argv)?)),

            "-k" => args.keep = true,
            "-e" => args.keep_failed = true,
            "-q" => args.quiet = true,
            "-f" => args.force = true,
            "-j" => json = true,
            "-i" => images = true,
            "--rootfs" => rootfs = true,
            "--ip" => ip = true,

            "--" => {
                args.positional.extend(argv[i + 1..].iter().cloned());
                break;
            }

            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("unknown option: {}", flag));
            }

            positional => args.positional.push(positional.to_string()),
        }

        i += 1;
    }

    args.command = match command {
        Some(Command::Query { .. }) => Command::Query { json, images, rootfs, ip },
        Some(command) => command,
        None => Command::Help,
    };

    if args.packages.is_empty() {
        args.packages.push(DEFAULT_PACKAGES.to_string());
    }

    Ok(args)
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_start(args: Args) -> hastur::Result<()> {
    let storage = storage::from_spec(&args.root_dir, &args.storage_spec)?;

    let options = StartOptions {
        root_dir: args.root_dir,
        bridge: args.bridge,
        packages: args.packages,
        name: args.name,
        address: args.address,
        host_interface: args.host_interface,
        copy_dir: args.copy_dir,
        keep: args.keep,
        keep_failed: args.keep_failed,
        quiet: args.quiet,
        force: args.force,
        command: args.positional,
    };

    lifecycle::create_and_start(&options, storage.as_ref())
}

fn cmd_query(args: Args, json: bool, images: bool, rootfs: bool, ip: bool) -> hastur::Result<()> {
    let storage = storage::from_spec(&args.root_dir, &args.storage_spec)?;

    if images {
        print!("{}", query::render_images(&args.root_dir)?);
        return Ok(());
    }

    if rootfs || ip {
        let name = args.positional.first().ok_or_else(|| {
            hastur::Error::Config("query needs a container name".to_string())
        })?;

        if rootfs {
            println!("{}", query::container_rootfs(storage.as_ref(), name));
        } else {
            println!("{}", query::container_ip(&args.root_dir, name)?);
        }
        return Ok(());
    }

    let containers = query::collect_containers(&args.root_dir, storage.as_ref(), &args.positional)?;

    if json {
        println!("{}", query::render_json(&containers)?);
    } else {
        print!("{}", query::render_table(&containers));
    }

    Ok(())
}

fn cmd_destroy(args: Args) -> hastur::Result<()> {
    let storage = storage::from_spec(&args.root_dir, &args.storage_spec)?;

    let name = args.positional.first().ok_or_else(|| {
        hastur::Error::Config("destroy needs a container name".to_string())
    })?;

    lifecycle::destroy_container(storage.as_ref(), name, args.force)
}

fn cmd_free(args: Args) -> hastur::Result<()> {
    let storage = storage::from_spec(&args.root_dir, &args.storage_spec)?;
    lifecycle::destroy_root(storage.as_ref())
}

fn print_usage() {
    println!(
        r#"hastur the unspeakable - zero-conf systemd container manager.

hastur is a simple wrapper around systemd-nspawn that starts containers
with overlayfs, pre-installed packages and bridged network available out
of the box.

Usage:
    hastur -h | --help
    hastur [options] [-b <bridge>] [-p <packages>]... [-n <name>]
                     [-a <address>] -S [--] [<command>...]
    hastur [options] -Q [-j] [<name>...]
    hastur [options] -Q -i
    hastur [options] -Q (--rootfs|--ip) <name>
    hastur [options] -D [-f] <name>
    hastur [options] --free

Options:
    -h --help        Show this help.
    -r <root>        Root directory which will hold containers.
                      [default: {root}]
    -q               Be quiet. Do not report status messages.
    -f               Force operation.
    -s <storage>     Storage backend for base images and containers:
                      autodetect, overlayfs, overlayfs:<size> or
                      zfs:<pool>. [default: {storage}]

Create options:
    -S               Create and start container.
    -b <bridge>      Bridge device and, optionally, an address, separated
                      by colon. Created automatically when missing.
                      [default: {bridge}]
    -t <iface>       Enrol the given host interface into the bridge and
                      migrate its addresses and routes.
    -p <packages>    Packages to install, comma-separated; repeatable.
                      [default: {packages}]
    -n <name>        Container name. Without it a generated name is used
                      and the container is ephemeral.
    -a <address>     IP address/netmask. Without it an address from
                      10.0.0.0/8 is generated.
    -k               Keep the container after exit even if its name was
                      generated.
    -x <dir>         Copy entries of the directory into the container
                      root before start.
    -e               Keep the container after exit if <command> failed.

Query options:
    -Q               Show containers in the root directory.
    -j               Output JSON.
    -i               Show base images instead of containers.
    --rootfs <name>  Print the container's root FS path.
    --ip <name>      Print the container's IP address.

Destroy options:
    -D <name>        Destroy the given container.
    --free           Remove all containers and base images in <root>.
"#,
        root = DEFAULT_ROOT,
        storage = DEFAULT_STORAGE,
        bridge = DEFAULT_BRIDGE,
        packages = DEFAULT_PACKAGES,
    );
}

// =============================================================================
// Main
// =============================================================================

fn init_tracing(quiet: bool) {
    let level = if quiet { Level::WARN } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();

    // The in-container entrypoint; must run before any CLI parsing.
    if bootstrap::is_bootstrap_invocation(&argv) {
        // Returns only on failure: on success the process is replaced.
        if let Err(err) = bootstrap::run_bootstrap(&argv) {
            eprintln!("ERROR: {}", err);
        }
        return ExitCode::FAILURE;
    }

    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    init_tracing(args.quiet);
    signals::install();

    let result = match args.command {
        Command::Start => cmd_start(args),
        Command::Query { json, images, rootfs, ip } => cmd_query(args, json, images, rootfs, ip),
        Command::Destroy => cmd_destroy(args),
        Command::Free => cmd_free(args),
        Command::Help => {
            print_usage();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(hastur::Error::LauncherExitNonzero { code }) => {
            // The user command's status is the manager's status.
            ExitCode::from((code & 0xff) as u8)
        }
        Err(err) => {
            eprintln!("ERROR: {}", err);
            ExitCode::FAILURE
        }
    }
}
