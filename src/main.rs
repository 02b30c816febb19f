//! codegraph CLI - live structural code-graph daemon and query tool
//!
//! Usage: codegraph <command> [arguments]

mod control_cmd;
mod daemon_cmd;
mod query_cmd;
mod scan_cmd;
mod serve_cmd;

use codegraph::Config;
use std::path::PathBuf;
use std::process::ExitCode;

fn print_usage() {
    eprintln!("codegraph - live structural code-graph daemon");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  codegraph daemon [--root <DIR>] [--quiescence-ms <N>] [--batch-size <N>]");
    eprintln!("  codegraph scan [--root <DIR>]");
    eprintln!("  codegraph status [--root <DIR>]");
    eprintln!("  codegraph stop [--root <DIR>]");
    eprintln!("  codegraph refresh [--root <DIR>]");
    eprintln!("  codegraph related --file <PATH> [--root <DIR>] [--depth <N>] [--types <T,..>] [--reverse]");
    eprintln!("  codegraph symbols <KEYWORD>... [--root <DIR>]");
    eprintln!("  codegraph cycles [--root <DIR>]");
    eprintln!("  codegraph hot-paths [--root <DIR>] [--limit <N>]");
    eprintln!("  codegraph overview [--root <DIR>]");
    eprintln!("  codegraph clusters [--root <DIR>]");
    eprintln!("  codegraph serve [--root <DIR>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  daemon     Watch the repository and keep the graph fresh");
    eprintln!("  scan       One-shot scan and snapshot, then exit");
    eprintln!("  status     Daemon liveness and store statistics");
    eprintln!("  stop       Signal a running daemon to stop");
    eprintln!("  refresh    Signal a running daemon to re-scan everything");
    eprintln!("  related    Files related to a file by dependency edges");
    eprintln!("  symbols    Keyword search over paths and symbols");
    eprintln!("  cycles     Dependency cycles");
    eprintln!("  hot-paths  Paths between well-connected files");
    eprintln!("  overview   Composite architecture report");
    eprintln!("  clusters   The cluster-level super-graph");
    eprintln!("  serve      Answer JSON requests on stdin until EOF");
    eprintln!();
    eprintln!("Common arguments:");
    eprintln!("  --root <DIR>   Repository root (default: current directory)");
    eprintln!();
    eprintln!("Edge types: import, include, require, call, inheritance");
    eprintln!();
    eprintln!("Exit codes: 0 ok, 2 lock held, 3 snapshot I/O failure, 4 invalid configuration");
}

enum Command {
    Daemon,
    Scan,
    Status,
    Stop,
    Refresh,
    Related {
        file: String,
        depth: usize,
        types: Option<Vec<String>>,
        reverse: bool,
    },
    Symbols {
        keywords: Vec<String>,
    },
    Cycles,
    HotPaths {
        limit: usize,
    },
    Overview,
    Clusters,
    Serve,
}

struct Parsed {
    command: Command,
    root: PathBuf,
    quiescence_ms: Option<u64>,
    batch_size: Option<usize>,
}

fn parse_args(args: &[String]) -> Result<Parsed, String> {
    let Some(command_name) = args.first() else {
        return Err("missing command".to_string());
    };

    let mut root = PathBuf::from(".");
    let mut quiescence_ms = None;
    let mut batch_size = None;
    let mut file = None;
    let mut depth = 3usize;
    let mut types = None;
    let mut reverse = false;
    let mut limit = 10usize;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--root" => root = PathBuf::from(required_value(&mut iter, "--root")?),
            "--quiescence-ms" => {
                quiescence_ms = Some(parse_number(&mut iter, "--quiescence-ms")?)
            }
            "--batch-size" => batch_size = Some(parse_number(&mut iter, "--batch-size")?),
            "--file" => file = Some(required_value(&mut iter, "--file")?),
            "--depth" => depth = parse_number(&mut iter, "--depth")?,
            "--types" => {
                let raw = required_value(&mut iter, "--types")?;
                types = Some(raw.split(',').map(|s| s.trim().to_string()).collect());
            }
            "--reverse" => reverse = true,
            "--limit" => limit = parse_number(&mut iter, "--limit")?,
            other if other.starts_with("--") => {
                return Err(format!("unknown flag: {}", other));
            }
            other => positional.push(other.to_string()),
        }
    }

    let command = match command_name.as_str() {
        "daemon" => Command::Daemon,
        "scan" => Command::Scan,
        "status" => Command::Status,
        "stop" => Command::Stop,
        "refresh" => Command::Refresh,
        "related" => Command::Related {
            file: file.ok_or("related requires --file")?,
            depth,
            types,
            reverse,
        },
        "symbols" => {
            if positional.is_empty() {
                return Err("symbols requires at least one keyword".to_string());
            }
            Command::Symbols {
                keywords: positional,
            }
        }
        "cycles" => Command::Cycles,
        "hot-paths" => Command::HotPaths { limit },
        "overview" => Command::Overview,
        "clusters" => Command::Clusters,
        "serve" => Command::Serve,
        other => return Err(format!("unknown command: {}", other)),
    };

    Ok(Parsed {
        command,
        root,
        quiescence_ms,
        batch_size,
    })
}

fn required_value(iter: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<String, String> {
    iter.next()
        .map(|s| s.to_string())
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn parse_number<T: std::str::FromStr>(
    iter: &mut std::slice::Iter<'_, String>,
    flag: &str,
) -> Result<T, String> {
    required_value(iter, flag)?
        .parse()
        .map_err(|_| format!("{} requires a number", flag))
}

/// Load the config file and apply CLI overrides, validating the result.
fn load_config(parsed: &Parsed) -> Result<Config, String> {
    let graph_dir = codegraph::GraphDir::for_repo(&parsed.root);
    let mut config = Config::load(graph_dir.path()).map_err(|e| e.to_string())?;
    if let Some(ms) = parsed.quiescence_ms {
        config.quiescence_delay_ms = ms;
    }
    if let Some(size) = parsed.batch_size {
        config.batch_size = size;
    }
    let problems = config.validate();
    if !problems.is_empty() {
        return Err(problems.join("; "));
    }
    Ok(config)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0] == "--help" || args[0] == "-h" || args[0] == "help" {
        print_usage();
        return ExitCode::from(if args.is_empty() { 4 } else { 0 });
    }

    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!();
            print_usage();
            return ExitCode::from(4);
        }
    };

    let config = match load_config(&parsed) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("Error: invalid configuration: {}", message);
            return ExitCode::from(4);
        }
    };

    let root = parsed.root.clone();
    let code = match parsed.command {
        Command::Daemon => daemon_cmd::run(&root, config),
        Command::Scan => scan_cmd::run(&root, config),
        Command::Status => query_cmd::status(&root),
        Command::Stop => control_cmd::stop(&root),
        Command::Refresh => control_cmd::refresh(&root),
        Command::Related {
            file,
            depth,
            types,
            reverse,
        } => query_cmd::related(&root, &file, depth, types, reverse),
        Command::Symbols { keywords } => query_cmd::symbols(&root, keywords),
        Command::Cycles => query_cmd::cycles(&root),
        Command::HotPaths { limit } => query_cmd::hot_paths(&root, limit),
        Command::Overview => query_cmd::overview(&root),
        Command::Clusters => query_cmd::clusters(&root),
        Command::Serve => serve_cmd::run(&root),
    };

    ExitCode::from(code)
}
