#![allow(dead_code)]

use vfpu::addressing::StaticGprMap;
use vfpu::exec::Executor;
use vfpu::reference;
use vfpu::regs::NUM_SLOTS;
use vfpu::state::{GuestRam, GuestState, RAM_BASE};
use vfpu::{compile_block, Block, HostFeatures, JitConfig, VecReg, VectorSize};

pub const RAM_SIZE: u32 = 0x1000;

pub fn config(features: HostFeatures) -> JitConfig {
    JitConfig {
        features,
        ram_size: RAM_SIZE,
        ..JitConfig::default()
    }
}

/// Registers hold small distinct values, $a0..$t3 point 0x100 apart into RAM
pub fn seeded_state() -> GuestState {
    let mut state = GuestState::new();
    for slot in 0..NUM_SLOTS {
        state.vfpr[slot] = (slot as f32 - 40.0) * 0.25;
    }
    for (i, reg) in (4..12).enumerate() {
        state.gpr[reg] = RAM_BASE + i as u32 * 0x100;
    }
    state
}

pub fn seeded_ram() -> GuestRam {
    let mut ram = GuestRam::new(RAM_SIZE);
    for word in 0..RAM_SIZE / 4 {
        ram.write_f32(RAM_BASE + word * 4, word as f32 * 0.5 - 100.0);
    }
    ram
}

pub fn set(state: &mut GuestState, index: u8, size: VectorSize, values: &[f32]) {
    for (slot, value) in VecReg::new(index, size).slots().zip(values) {
        state.vfpr[slot] = *value;
    }
}

pub fn get(state: &GuestState, index: u8, size: VectorSize) -> Vec<f32> {
    VecReg::new(index, size).slots().map(|slot| state.vfpr[slot]).collect()
}

pub fn get_bits(state: &GuestState, index: u8, size: VectorSize) -> Vec<u32> {
    get(state, index, size).into_iter().map(f32::to_bits).collect()
}

pub struct Run {
    pub block: Block,
    pub exec: Executor,
    pub state: GuestState,
    pub ram: GuestRam,
}

/// Compile `words` as one block and run it
pub fn run_jit(config: JitConfig, gpr: StaticGprMap, words: &[u32], state: &GuestState, ram: &GuestRam) -> Run {
    let block = compile_block(config, gpr, words);
    let mut state = state.clone();
    let mut ram = ram.clone();
    let mut exec = Executor::new();
    if let Err(err) = exec.run(&block, &mut state, &mut ram) {
        panic!("block failed: {}\n{}", err, block.disassemble());
    }
    Run { block, exec, state, ram }
}

/// Interpret `words` one at a time
pub fn run_reference(words: &[u32], state: &GuestState, ram: &GuestRam) -> (GuestState, GuestRam) {
    let mut state = state.clone();
    let mut ram = ram.clone();
    for &word in words {
        reference::step(&mut state, &mut ram, word).expect("reference step");
    }
    (state, ram)
}

pub fn assert_same_state(jit: &GuestState, reference: &GuestState) {
    for slot in 0..NUM_SLOTS {
        // NaN sign and payload included
        assert_eq!(
            jit.vfpr[slot].to_bits(),
            reference.vfpr[slot].to_bits(),
            "slot {}: compiled {:?}, reference {:?}",
            slot,
            jit.vfpr[slot],
            reference.vfpr[slot],
        );
    }
    assert_eq!(jit.vpfx, reference.vpfx, "prefix registers");
    assert_eq!(jit.vcc, reference.vcc, "vcc");
}

pub fn assert_same_ram(jit: &GuestRam, reference: &GuestRam) {
    for word in 0..RAM_SIZE / 4 {
        let addr = RAM_BASE + word * 4;
        assert_eq!(jit.read_u32(addr), reference.read_u32(addr), "ram at {:#010x}", addr);
    }
}

/// Compile and interpret the same words and require the same outcome
pub fn check_against_reference(config: JitConfig, words: &[u32], state: &GuestState, ram: &GuestRam) -> Run {
    let run = run_jit(config, StaticGprMap::new(), words, state, ram);
    let (expected, expected_ram) = run_reference(words, state, ram);
    assert_same_state(&run.state, &expected);
    assert_same_ram(&run.ram, &expected_ram);
    run
}
