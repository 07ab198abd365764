use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};

use avrsim::devices::{Device, POWER_UP_CYCLES};
use avrsim::errors::Result;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Intel HEX firmware image to program into flash
    firmware: PathBuf,

    /// Cycles to run before stopping
    #[arg(short, long, default_value_t = POWER_UP_CYCLES)]
    cycles: u64,

    /// Trace every executed instruction
    #[arg(short, long)]
    debug: bool,
}

fn simulate(args: &Args) -> Result<()> {
    info!("[FIRMWARE] {}.", args.firmware.display());
    let mut mcu = Device::from_hex(&args.firmware)?;
    mcu.reset()?;

    info!("[RUN] Cycle limit is {}.", args.cycles);
    let outcome = mcu.run(args.cycles);
    match &outcome {
        Ok(cycles) => info!("[END] Cycle limit reached after {} cycles.", cycles),
        Err(_) => error!("[END] Stopped at PC 0x{:04X}.", mcu.core.pc()),
    }

    mcu.dump_regs()?;
    mcu.dump_stack()?;
    outcome.map(|_| ())
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    match simulate(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
