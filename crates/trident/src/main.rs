//! trident - host telemetry daemon.
//!
//! Samples process groups, CPU utilization, CPU frequency and thermal zones,
//! and writes pipe-delimited records to the local syslog.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use trident_core::collector::{
    Cadence, CpuCollector, CpuFreqCollector, ProcSource, ProcessCollector, RealFs, SysSource,
    ThermalCollector, run_periodic,
};
use trident_core::config::NamerSource;
use trident_core::sink::{FreqStore, HostIdentity, SyslogWriter};

const DEFAULT_STORE_PATH: &str = "/userdata/log/sqlite/exporter.db";
const PASSWD_PATH: &str = "/etc/passwd";

/// Long options that may be spelled with a single dash (`-procfs /proc`).
const LONG_FLAGS: &[&str] = &[
    "procfs",
    "sysfs",
    "children",
    "config.path",
    "procnames",
    "namemapping",
    "store.path",
    "gather-smaps",
    "man",
    "help",
    "version",
];

const MANUAL: &str = r#"Usage:
  trident [options] -config.path filename.yml

or

  trident [options] -procnames name1,...,nameN [-namemapping k1,v1,...,kN,vN]

The config file is the recommended way to select processes; -procnames and
-namemapping are a shorthand for simple setups. The two cannot be combined.

-children (default true) puts any process that does not match a group of its
own into the group of its nearest matched ancestor. Resource usage of
subprocesses is thus added to their parent's group.

Command-line process selection (procnames/namemapping):

  Processes whose name is not in the -procnames list are ignored. The name is
  the second field of /proc/<pid>/stat, truncated at 15 characters.

  -namemapping refines the name with the command line. With

    -namemapping "python2,([^/]+)\.py,java,-jar\s+([^/]+).jar"

  every python2 script and every java -jar invocation becomes its own group,
  e.g. "python2:worker". Remapped names must be listed in -procnames too.

Config file process selection (filename.yml):

  process_names:
    - name: "{{.Matches.Script}}"
      comm: [python3]
      cmdline: ['(?P<Script>[^/ ]+)\.py']
    - comm: [bash]

  Each rule may use comm, exe, cmdline and environ matchers; the first rule
  that matches names the process. Name templates may use {{.Comm}},
  {{.ExeBase}}, {{.ExeFull}}, {{.Username}}, {{.PID}}, {{.StartTime}} and
  {{.Matches.<capture>}}.

Records (syslog facility USER, severity INFO):

  procinfo  <group>|<user%>|<sys%>|<total%>|<rss bytes>|<vsz bytes>
  cpu       <cpu|cpuN>|<user%>|<sys%>|<idle%>|<total%>
  cpufreq   <cpu>:<hz>|<cpu>:<hz>|...
  thermal   seven zone temperatures in degrees Celsius
"#;

/// Host telemetry daemon.
#[derive(Parser, Debug)]
#[command(name = "trident", version, about = "Host telemetry daemon")]
struct Args {
    /// Path to read process data from.
    #[arg(long, default_value = "/proc")]
    procfs: PathBuf,

    /// Path to read CPU frequency and thermal data from.
    #[arg(long, default_value = "/sys")]
    sysfs: PathBuf,

    /// Track unmatched children with their nearest matched ancestor.
    #[arg(
        long,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    children: bool,

    /// Path to YAML config file.
    #[arg(long = "config.path", value_name = "FILE")]
    config_path: Option<PathBuf>,

    /// Comma-separated list of process names to monitor.
    #[arg(long)]
    procnames: Option<String>,

    /// Comma-separated list of name,regex pairs remapping process names.
    #[arg(long)]
    namemapping: Option<String>,

    /// SQLite database for CPU frequency samples.
    #[arg(
        long = "store.path",
        value_name = "FILE",
        default_value = DEFAULT_STORE_PATH
    )]
    store_path: PathBuf,

    /// Read /proc/[pid]/smaps_rollup for proportional memory.
    #[arg(
        long = "gather-smaps",
        default_value_t = false,
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    gather_smaps: bool,

    /// Print the manual and exit.
    #[arg(long)]
    man: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Rewrites single-dash long options (`-config.path x`, `-children=false`)
/// to their double-dash form so clap accepts them.
fn normalize_args<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
    let mut out = Vec::new();
    let mut passthrough = false;

    for (i, arg) in args.into_iter().enumerate() {
        if i == 0 || passthrough {
            out.push(arg);
            continue;
        }
        let Some(s) = arg.to_str() else {
            out.push(arg);
            continue;
        };
        if s == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }

        let is_long = s
            .strip_prefix('-')
            .filter(|rest| !rest.starts_with('-'))
            .map(|rest| rest.split('=').next().unwrap_or(rest))
            .is_some_and(|name| LONG_FLAGS.contains(&name));
        if is_long {
            out.push(OsString::from(format!("-{}", s)));
        } else {
            out.push(arg);
        }
    }

    out
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["trident", "trident_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn syslog(tag: &str) -> Result<SyslogWriter> {
    SyslogWriter::connect(tag).with_context(|| format!("failed to connect syslog for {}", tag))
}

/// Acquires every collector's resources and runs the collectors until a
/// shutdown signal arrives.
async fn run(args: Args) -> Result<()> {
    info!("trident {} starting", env!("CARGO_PKG_VERSION"));

    let namer_source = NamerSource::select(
        args.config_path.clone(),
        args.procnames.clone(),
        args.namemapping.clone(),
    )?;
    let namer = namer_source
        .build(&RealFs::new(), Path::new(PASSWD_PATH))
        .context("invalid process selection")?;

    let source = ProcSource::open(RealFs::new(), &args.procfs)
        .with_context(|| format!("failed to open procfs at {}", args.procfs.display()))?
        .with_smaps(args.gather_smaps);
    let process = ProcessCollector::new(
        source,
        namer,
        args.children,
        syslog("procinfo")?,
        Cadence::PROCESS,
    );

    let cpu = CpuCollector::new(RealFs::new(), &args.procfs, syslog("cpu")?, Cadence::CPU)
        .with_context(|| format!("failed to read {}/stat", args.procfs.display()))?;

    let open_sysfs = || {
        SysSource::open(RealFs::new(), &args.sysfs)
            .with_context(|| format!("failed to open sysfs at {}", args.sysfs.display()))
    };

    let host = HostIdentity::resolve();
    info!(hostname = %host.hostname, ip = %host.ip, pid = host.pid, "host identity");
    let store = FreqStore::open(&args.store_path, host)
        .with_context(|| format!("failed to open store {}", args.store_path.display()))?;
    let cpufreq = CpuFreqCollector::new(
        open_sysfs()?,
        syslog("cpufreq")?,
        Some(store),
        Cadence::CPUFREQ,
    );

    let thermal = ThermalCollector::new(open_sysfs()?, syslog("thermal")?, Cadence::THERMAL);

    let mut tasks = JoinSet::new();
    tasks.spawn(run_periodic(process, Cadence::PROCESS.period));
    tasks.spawn(run_periodic(cpu, Cadence::CPU.period));
    tasks.spawn(run_periodic(cpufreq, Cadence::CPUFREQ.period));
    tasks.spawn(run_periodic(thermal, Cadence::THERMAL.period));
    info!(
        procfs = %args.procfs.display(),
        sysfs = %args.sysfs.display(),
        children = args.children,
        "collectors started"
    );

    let mut sigterm = signal(SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for SIGINT")?;
                break;
            }
            _ = sigterm.recv() => break,
            Some(finished) = tasks.join_next() => {
                if let Err(e) = finished {
                    warn!(error = %e, "collector task ended");
                }
            }
        }
    }

    info!("received shutdown signal");
    tasks.shutdown().await;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse_from(normalize_args(std::env::args_os()));

    if args.man {
        print!("{}", MANUAL);
        return ExitCode::SUCCESS;
    }

    init_logging(args.verbose, args.quiet);

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
        .and_then(|runtime| runtime.block_on(run(args)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let argv = std::iter::once("trident")
            .chain(args.iter().copied())
            .map(OsString::from);
        Args::try_parse_from(normalize_args(argv)).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["-procnames", "bash"]);
        assert_eq!(args.procfs, PathBuf::from("/proc"));
        assert_eq!(args.sysfs, PathBuf::from("/sys"));
        assert!(args.children);
        assert!(!args.gather_smaps);
        assert_eq!(args.store_path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(args.procnames.as_deref(), Some("bash"));
    }

    #[test]
    fn test_go_style_flags() {
        let args = parse(&[
            "-procfs",
            "/host/proc",
            "-children=false",
            "-config.path",
            "/etc/trident.yml",
            "-gather-smaps",
            "-vv",
        ]);
        assert_eq!(args.procfs, PathBuf::from("/host/proc"));
        assert!(!args.children);
        assert_eq!(args.config_path, Some(PathBuf::from("/etc/trident.yml")));
        assert!(args.gather_smaps);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_double_dash_flags_still_work() {
        let args = parse(&["--store.path=/tmp/x.db", "--man", "-q"]);
        assert_eq!(args.store_path, PathBuf::from("/tmp/x.db"));
        assert!(args.man);
        assert!(args.quiet);
    }

    #[test]
    fn test_normalize_leaves_values_alone() {
        let argv = ["trident", "-namemapping", "-x,-jar", "--", "-procfs"].map(OsString::from);
        let out = normalize_args(argv);
        let expected = ["trident", "--namemapping", "-x,-jar", "--", "-procfs"];
        assert_eq!(out, expected.map(OsString::from));
    }
}
