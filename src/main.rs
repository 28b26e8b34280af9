use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;

use common::cli::GlobalOpts;
use vfpu::addressing::StaticGprMap;
use vfpu::exec::Executor;
use vfpu::instructions::VfpuOp;
use vfpu::regs::NUM_SLOTS;
use vfpu::state::{GuestRam, GuestState, DEFAULT_RAM_SIZE, RAM_BASE};
use vfpu::{compile_block, HostFeatures, JitConfig, VecReg, VectorSize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Host {
    Armv7,
    Aarch64,
}

impl Host {
    fn features(self) -> HostFeatures {
        match self {
            Host::Armv7 => HostFeatures::armv7(),
            Host::Aarch64 => HostFeatures::aarch64(),
        }
    }
}

/// Compile a block of VFPU instructions and print the host code
#[derive(Debug, Parser)]
#[clap(name = "vfpu-jit", version)]
struct Cli {
    /// Instruction words in hex
    words: Vec<String>,

    /// Read instruction words from a file, whitespace separated, `#` starts a comment
    #[arg(long, short)]
    input: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "aarch64")]
    host: Host,

    /// Bounds check guest memory accesses instead of masking them
    #[arg(long)]
    safe_memory: bool,

    /// Host vector registers to allocate from
    #[arg(long)]
    registers: Option<u8>,

    /// Don't assume the prefixes hold their defaults at block entry
    #[arg(long)]
    unknown_prefix: bool,

    /// Execute the block on seeded state and print the registers it changed
    #[arg(long)]
    run: bool,

    #[command(flatten)]
    global: GlobalOpts,
}

fn parse_word(text: &str) -> anyhow::Result<u32> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).with_context(|| format!("bad instruction word {:?}", text))
}

fn read_words(cli: &Cli) -> anyhow::Result<Vec<u32>> {
    let mut words = Vec::new();
    if let Some(path) = &cli.input {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        for line in text.lines() {
            let code = line.split('#').next().unwrap_or("");
            for token in code.split_whitespace() {
                words.push(parse_word(token)?);
            }
        }
    }
    for token in &cli.words {
        words.push(parse_word(token)?);
    }
    Ok(words)
}

/// Slot `i` holds `i`, `$aN` and friends point 0x100 apart into RAM
fn seeded_state() -> GuestState {
    let mut state = GuestState::new();
    for (slot, value) in state.vfpr.iter_mut().enumerate() {
        *value = slot as f32;
    }
    for (i, gpr) in state.gpr.iter_mut().enumerate().skip(1) {
        *gpr = RAM_BASE + i as u32 * 0x100;
    }
    state
}

fn run_block(block: &vfpu::Block, ram_size: u32) -> anyhow::Result<()> {
    let before = seeded_state();
    let mut state = before.clone();
    let mut ram = GuestRam::new(ram_size);

    let mut exec = Executor::new();
    exec.run(block, &mut state, &mut ram).context("running block")?;
    info!("{} host ops executed, {} interpreter calls", exec.steps, exec.interpreter_calls);

    println!("changed:");
    for slot in 0..NUM_SLOTS {
        let (old, new) = (before.vfpr[slot], state.vfpr[slot]);
        if old.to_bits() != new.to_bits() {
            // a single's register index is its slot
            let reg = VecReg::new(slot as u8, VectorSize::Single);
            println!("  {}: {} -> {}", reg, old, new);
        }
    }
    for (i, (old, new)) in before.vpfx.iter().zip(state.vpfx.iter()).enumerate() {
        if old != new {
            println!("  vpfx{}: {:#x} -> {:#x}", ['s', 't', 'd'][i], old, new);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    common::init_logging(&cli.global)?;

    let words = read_words(&cli)?;
    if words.is_empty() {
        anyhow::bail!("no instructions given");
    }

    let config = JitConfig {
        features: cli.host.features(),
        fast_memory: !cli.safe_memory,
        start_default_prefix: !cli.unknown_prefix,
        ram_size: DEFAULT_RAM_SIZE,
        register_limit: cli.registers,
    };
    info!("{:?}, {} host vector registers", cli.host, config.host_regs());

    for &word in &words {
        println!("{:08x}  {}", word, VfpuOp(word).disassemble());
    }
    println!();

    let block = compile_block(config.clone(), StaticGprMap::new(), &words);
    for (word, outcome) in &block.outcomes {
        if let Some(reason) = outcome.fallback() {
            println!("; {:08x} interpreted: {}", word, reason);
        }
    }
    print!("{}", block.disassemble());
    info!(
        "{} native, {} interpreted, {} loads, {} writebacks, {} spills",
        block.native_count(),
        block.fallback_count(),
        block.stats.loads,
        block.stats.writebacks,
        block.stats.spills
    );

    if cli.run {
        println!();
        run_block(&block, config.ram_size)?;
    }
    Ok(())
}
