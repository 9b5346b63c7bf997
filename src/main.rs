/// modloader - Module Graph Runner
use modloader::host::EntryOutcome;
use modloader::{CompletionOrder, GraphManifest, Loader, ScriptHost, Status};
use std::env;
use std::path::Path;
use std::process;
use std::rc::Rc;
use tracing::Level;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("modloader v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    modloader [OPTIONS] <MANIFEST>");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help           Print this help message");
    eprintln!("    -V, --version        Print version information");
    eprintln!("    -v, --verbose        Log loader activity (repeat for more detail)");
    eprintln!("    --lifo               Complete the newest fetch first");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <MANIFEST>           TOML graph manifest");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    modloader graph.toml");
    eprintln!("    modloader -vv --lifo graph.toml");
}

fn print_version() {
    println!("modloader {}", VERSION);
}

struct Options {
    manifest: String,
    verbosity: u8,
    order: CompletionOrder,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut manifest = None;
    let mut verbosity = 0u8;
    let mut order = CompletionOrder::Fifo;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                process::exit(0);
            }
            "-v" | "--verbose" => verbosity = verbosity.saturating_add(1),
            "--lifo" => order = CompletionOrder::Lifo,
            // -vv, -vvv
            flag if flag.len() > 2 && flag.starts_with('-') && flag[1..].chars().all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((flag.len() - 1) as u8);
            }
            flag if flag.starts_with('-') => {
                return Err(format!("Unknown option: {}", flag));
            }
            path => {
                if manifest.is_some() {
                    return Err("Multiple manifests specified".to_string());
                }
                manifest = Some(path.to_string());
            }
        }
    }

    let manifest = manifest.ok_or_else(|| "Missing manifest".to_string())?;
    Ok(Options {
        manifest,
        verbosity,
        order,
    })
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// One line per module: name, status, and export or error.
fn format_modules(loader: &Loader<String>) -> Vec<String> {
    loader.inspect(|ctx| {
        ctx.registry()
            .modules()
            .map(|module| {
                let detail = match (module.export(), module.error()) {
                    (Some(export), _) => export.clone(),
                    (None, Some(err)) => err.to_string(),
                    (None, None) => String::new(),
                };
                format!("{:<16} {:<9} {}", module.name(), module.status().to_string(), detail)
                    .trim_end()
                    .to_string()
            })
            .collect()
    })
}

/// Report the run and return whether everything the entry asked for loaded.
fn report(loader: &Loader<String>, outcome: &EntryOutcome) -> bool {
    for line in format_modules(loader) {
        println!("{}", line);
    }
    println!();

    let mut ok = true;
    match outcome.get() {
        Some(Ok(values)) => println!("entry: [{}]", values.join(", ")),
        Some(Err(err)) => {
            println!("entry failed: {}", err);
            ok = false;
        }
        None => {
            println!("entry: still waiting");
            ok = false;
        }
    }

    for err in loader.take_unhandled_errors() {
        println!("unhandled: {}", err);
        ok = false;
    }

    let stalled = loader.inspect(|ctx| {
        ctx.registry()
            .modules()
            .filter(|module| module.status().is_pending())
            .count()
    });
    if stalled > 0 {
        println!("{} module(s) never resolved", stalled);
        ok = false;
    }
    ok
}

fn main() {
    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    init_logging(options.verbosity);

    let manifest = match GraphManifest::load(Path::new(&options.manifest)) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let host: Rc<ScriptHost<String>> = Rc::new(ScriptHost::new());
    let (entry, outcome) = match manifest.install(&host) {
        Ok(installed) => installed,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let loader = Loader::with_entry(&entry, host.clone());
    let completed = host.run_to_idle(options.order);
    tracing::debug!(target: "modloader::host", completed, "Host idle");

    let ok = report(&loader, &outcome);
    let failed = loader.inspect(|ctx| {
        ctx.registry()
            .modules()
            .any(|module| module.status() == Status::Error)
    });
    if !ok || failed {
        process::exit(1);
    }
}
