//! Command-line front end for the enclave-isolation RISC-V simulator.
//!
//! Parses the flag surface with `clap`'s derive API, turns it into a
//! validated [`Config`], loads the program and management binaries, and
//! drives a [`Simulator`] to completion. Exit codes follow §6: `0` on a
//! normal halt, `1` on a fatal configuration or I/O error, `2` on an internal
//! invariant violation.

use std::process::ExitCode;

use clap::Parser;
use enclave_sim_core::config::{CacheGeometry, Config, PartitioningMode, SimError};
use enclave_sim_core::sim::loader;
use enclave_sim_core::Simulator;
use tracing::info;

/// Multi-core RISC-V simulator with hardware-enforced enclave isolation.
#[derive(Parser, Debug)]
#[command(name = "enclave-sim", author, version, about)]
struct Cli {
    /// Number of normal-world cores.
    #[arg(short = 'p', long, default_value_t = 1)]
    procs: usize,

    /// Number of enclave-designated cores; reserves one more core for the
    /// management shim whenever this is non-zero.
    #[arg(long, default_value_t = 0)]
    enclave: usize,

    /// Memory size: `N` (MiB). `base:size,...` multi-region layouts are
    /// rejected; this crate only implements the single-region form.
    #[arg(short = 'm', long, default_value = "2048")]
    mem: String,

    /// L1 instruction cache geometry, `sets:ways:linesize`.
    #[arg(long, default_value = "64:4:64")]
    ic: String,

    /// L1 data cache geometry, `sets:ways:linesize`.
    #[arg(long, default_value = "64:4:64")]
    dc: String,

    /// L2 cache geometry, `sets:ways:linesize`.
    #[arg(long, default_value = "64:4:64")]
    l2: String,

    /// L2 partitioning scheme: `0` none, `1` RMT, `2` static.
    #[arg(long, default_value = "0")]
    l2_partitioning: String,

    /// Informational ISA string.
    #[arg(long, default_value = "rv64ima")]
    isa: String,

    /// Override the reset PC (decimal, or hex with a `0x` prefix).
    #[arg(long)]
    pc: Option<String>,

    /// Explicit hart id assignment, comma-separated; must have exactly one
    /// entry per configured core.
    #[arg(long)]
    hartids: Option<String>,

    /// Print a placeholder device-tree note and exit; device-tree emission
    /// itself is out of scope for this crate.
    #[arg(long, default_value_t = false)]
    dump_dts: bool,

    /// Accepted and ignored: no DTB is ever written into memory here.
    #[arg(long, default_value_t = false)]
    disable_dtb: bool,

    /// Reserved for interactive debug; currently only emits a startup log
    /// line (no JTAG/debug module is modeled).
    #[arg(short = 'd', long, default_value_t = false)]
    debug: bool,

    /// Enable PC-histogram collection and reporting on exit.
    #[arg(short = 'g', long, default_value_t = false)]
    histogram: bool,

    /// Enable per-instruction execution tracing via `tracing`.
    #[arg(short = 'l', long, default_value_t = false)]
    log: bool,

    /// Start every core halted.
    #[arg(short = 'H', long, default_value_t = false)]
    halted: bool,

    /// Path to the precompiled management-shim binary image.
    #[arg(long, default_value = "management.bin")]
    manage_path: String,

    /// The flat binary to load at the reset PC for the non-enclave core(s).
    /// Not required with `--dump-dts`.
    file: Option<String>,
}

fn parse_mem(spec: &str) -> Result<u64, SimError> {
    if spec.contains(':') || spec.contains(',') {
        return Err(SimError::UnsupportedMemoryLayout(spec.to_string()));
    }
    spec.parse::<u64>()
        .map_err(|_| SimError::UnsupportedMemoryLayout(spec.to_string()))
}

fn parse_pc(spec: &str) -> Result<u64, SimError> {
    let parsed = spec.strip_prefix("0x").map_or_else(
        || spec.parse::<u64>().ok(),
        |hex| u64::from_str_radix(hex, 16).ok(),
    );
    parsed.ok_or_else(|| SimError::BadCacheGeometry {
        spec: spec.to_string(),
        reason: "expected a decimal or 0x-prefixed hexadecimal address",
    })
}

fn parse_hartids(spec: &str) -> Result<Vec<u32>, SimError> {
    spec.split(',')
        .map(|s| {
            s.trim().parse::<u32>().map_err(|_| SimError::BadCacheGeometry {
                spec: spec.to_string(),
                reason: "hartids must be a comma-separated list of integers",
            })
        })
        .collect()
}

fn build_config(cli: &Cli) -> Result<Config, SimError> {
    let mem_mib = parse_mem(&cli.mem)?;
    let ic = CacheGeometry::parse(&cli.ic)?;
    let dc = CacheGeometry::parse(&cli.dc)?;
    let l2 = CacheGeometry::parse(&cli.l2)?;
    let l2_partitioning = PartitioningMode::parse(&cli.l2_partitioning)?;
    let start_pc = cli.pc.as_deref().map(parse_pc).transpose()?;
    let hartids = cli
        .hartids
        .as_deref()
        .map(parse_hartids)
        .transpose()?
        .unwrap_or_default();

    let config = Config {
        procs: cli.procs,
        enclave_cores: cli.enclave,
        mem_mib,
        ic,
        dc,
        l2,
        l2_partitioning,
        isa: cli.isa.clone(),
        start_pc,
        hartids,
        histogram: cli.histogram,
        log: cli.log,
        start_halted: cli.halted,
        debug: cli.debug,
        manage_path: cli.manage_path.clone(),
        tlb_entries: enclave_sim_core::common::constants::DEFAULT_TLB_ENTRIES,
    };
    config.validate()?;
    Ok(config)
}

fn install_tracing(log: bool) {
    let filter = if log {
        tracing_subscriber::EnvFilter::new("info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.dump_dts {
        println!("device-tree emission is out of scope for this simulator; no DTS was generated.");
        return ExitCode::SUCCESS;
    }

    install_tracing(cli.log);

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if config.debug {
        info!("--debug set; interactive stepping is not implemented, running free-running instead");
    }

    let Some(file) = cli.file.as_deref() else {
        tracing::error!("no program binary given; pass a FILE argument (or --dump-dts to exit early)");
        return ExitCode::FAILURE;
    };

    let program = match loader::read_program_binary(file) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let management = if config.enclave_cores > 0 {
        match loader::read_management_binary(&config.manage_path) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        loader::read_management_binary(&config.manage_path).unwrap_or_default()
    };

    let mut simulator = Simulator::new(&config, &program, &management);
    let code = simulator.run();
    #[allow(clippy::cast_sign_loss)]
    ExitCode::from(code as u8)
}
