use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use twintrap::attack::{AttackReport, EvilTwinAttack};
use twintrap::cancel::CancelFlag;
use twintrap::cleanup::check_conflicting_processes;
use twintrap::config::{AttackConfig, ConflictPolicy};
use twintrap::process::tool_available;
use twintrap::session::{JsonFileSession, SessionStore};
use twintrap::target::Target;

#[derive(Parser, Debug)]
#[command(
    name = "twintrap",
    author,
    version,
    about = "Rogue AP (Evil Twin) attack orchestrator for authorized wireless audits"
)]
struct Cli {
    /// Output format for command results
    #[arg(long = "output", value_enum, default_value = "text", global = true)]
    output_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an Evil Twin attack against a target network
    Run(RunArgs),
    /// Resume an interrupted attack from a session snapshot
    Resume(ResumeArgs),
    /// Check tool availability and conflicting services
    Check,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Target BSSID (e.g. AA:BB:CC:DD:EE:FF)
    #[arg(long)]
    bssid: String,

    /// Target network name to impersonate
    #[arg(long)]
    essid: String,

    /// Target channel
    #[arg(long)]
    channel: u8,

    /// Interface for the rogue AP
    #[arg(long = "ap-interface")]
    ap_interface: String,

    /// Interface for deauth injection (omit to disable deauth)
    #[arg(long = "deauth-interface")]
    deauth_interface: Option<String>,

    /// Known client MAC on the target network (repeat per client)
    #[arg(long = "known-client")]
    known_clients: Vec<String>,

    /// Overall attack timeout in seconds (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Optional JSON config file; CLI flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// What to do about conflicting services (fail, kill, ignore)
    #[arg(long = "conflict-policy")]
    conflict_policy: Option<ConflictPolicyArg>,

    /// Confirm you are authorized to test this network
    #[arg(long)]
    authorized: bool,
}

#[derive(Args, Debug)]
struct ResumeArgs {
    /// Path to a session.json written by a previous run
    #[arg(long)]
    session: PathBuf,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConflictPolicyArg {
    Fail,
    Kill,
    Ignore,
}

impl From<ConflictPolicyArg> for ConflictPolicy {
    fn from(value: ConflictPolicyArg) -> Self {
        match value {
            ConflictPolicyArg::Fail => ConflictPolicy::Fail,
            ConflictPolicyArg::Kill => ConflictPolicy::Kill,
            ConflictPolicyArg::Ignore => ConflictPolicy::Ignore,
        }
    }
}

static SIGINT_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signum: i32) {
    SIGINT_SEEN.store(true, Ordering::SeqCst);
}

/// Route Ctrl+C into the attack's cancellation token. The handler itself
/// only flips a flag; a watcher thread raises the token so the run loop
/// returns a Cancelled result instead of unwinding.
fn install_sigint(cancel: CancelFlag) -> Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGINT, &action).context("installing SIGINT handler")?;
        sigaction(Signal::SIGTERM, &action).context("installing SIGTERM handler")?;
    }

    std::thread::spawn(move || loop {
        if SIGINT_SEEN.load(Ordering::SeqCst) {
            cancel.store(true, Ordering::SeqCst);
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    });
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let format = cli.output_format;
    if let Err(err) = run(cli) {
        emit_error(format, &err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let report = run_attack(&args, None)?;
            let ok = report.success();
            emit_report(cli.output_format, &report);
            if !ok {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Resume(args) => {
            let store = JsonFileSession::new(&args.session);
            let snapshot = store.load().context("loading session snapshot")?;
            if !snapshot.can_resume() {
                bail!("session at {} cannot be resumed", args.session.display());
            }
            let report = run_attack(&args.run, Some(snapshot))?;
            let ok = report.success();
            emit_report(cli.output_format, &report);
            if !ok {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Check => {
            let tools = ["hostapd", "dnsmasq", "wpa_supplicant", "aireplay-ng", "iw", "ip", "iptables"];
            let missing: Vec<&str> = tools
                .iter()
                .copied()
                .filter(|tool| !tool_available(tool))
                .collect();
            let conflicting = check_conflicting_processes();
            emit_payload(
                cli.output_format,
                if missing.is_empty() { "ok" } else { "missing-tools" },
                json!({
                    "missing_tools": missing,
                    "conflicting_processes": conflicting
                        .iter()
                        .map(|(name, pid)| json!({"name": name, "pid": pid}))
                        .collect::<Vec<_>>(),
                }),
            );
            Ok(())
        }
    }
}

fn run_attack(
    args: &RunArgs,
    snapshot: Option<twintrap::session::AttackSnapshot>,
) -> Result<AttackReport> {
    let mut config = match &args.config {
        Some(path) => AttackConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AttackConfig::default(),
    };

    config.ap_interface = args.ap_interface.clone();
    config.deauth_interface = args.deauth_interface.clone();
    config.attack_timeout_secs = args.timeout;
    if let Some(policy) = args.conflict_policy {
        config.conflict_policy = policy.into();
    }
    if args.authorized {
        config.authorized = true;
    }

    let target = Target::new(&args.bssid, &args.essid, args.channel)?
        .with_known_clients(args.known_clients.clone());

    let mut attack = EvilTwinAttack::new(target, &config)?;
    if let Some(snapshot) = snapshot {
        attack.restore_from_snapshot(&snapshot)?;
    }
    install_sigint(attack.cancel_flag())?;

    Ok(attack.run())
}

fn emit_report(format: OutputFormat, report: &AttackReport) {
    let data = json!({
        "outcome": format!("{:?}", report.outcome),
        "captured_password": report.credential.as_ref().map(|c| c.key.clone()),
        "essid": report.credential.as_ref().map(|c| c.essid.clone()),
        "clients_connected": report.clients_connected,
        "unique_clients": report.unique_clients,
        "credential_attempts": report.credential_attempts,
        "successful_validations": report.successful_validations,
        "deauth_bursts": report.deauth_bursts,
        "duration_secs": report.duration.as_secs_f64(),
        "error": report.error,
        "cleanup_errors": report.cleanup_errors,
    });
    let status = if report.success() { "ok" } else { "no-capture" };
    emit_payload(format, status, data);
}

fn emit_payload(format: OutputFormat, status: &str, data: Value) {
    let payload = json!({
        "status": status,
        "data": data,
    });
    match format {
        OutputFormat::Json => println!("{payload}"),
        OutputFormat::Text => {
            println!("status: {status}");
            if let Ok(pretty) = serde_json::to_string_pretty(&payload["data"]) {
                println!("{pretty}");
            }
        }
    }
}

fn emit_error(format: OutputFormat, err: &anyhow::Error) {
    let details: Vec<String> = err.chain().map(|cause| cause.to_string()).collect();
    match format {
        OutputFormat::Json => {
            let payload = json!({
                "status": "error",
                "message": err.to_string(),
                "details": details,
            });
            println!("{payload}");
        }
        OutputFormat::Text => {
            eprintln!("Error: {err}");
            for detail in details.iter().skip(1) {
                eprintln!("  -> {detail}");
            }
        }
    }
}
