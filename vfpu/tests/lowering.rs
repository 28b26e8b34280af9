mod common;

use common::*;
use vfpu::addressing::StaticGprMap;
use vfpu::emitter::HostOp;
use vfpu::instructions::encode::*;
use vfpu::float::DEFAULT_NAN;
use vfpu::state::{GuestRam, RAM_BASE};
use vfpu::{CompileOutcome, Fallback, HostFeatures, JitConfig, VectorSize};

const C000: u8 = 0x00;
const S010: u8 = 0x01;
const R000: u8 = 0x20;
const R100: u8 = 0x24;
const R200: u8 = 0x28;

fn aarch64() -> JitConfig {
    config(HostFeatures::aarch64())
}

fn armv7() -> JitConfig {
    config(HostFeatures::armv7())
}

fn all_native(run: &Run) -> bool {
    run.block.fallback_count() == 0 && run.exec.interpreter_calls == 0
}

#[test]
fn reciprocal_of_zero_is_infinite() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Quad, &[2.0, 0.0, -0.0, 4.0]);

    let run = check_against_reference(aarch64(), &[vrcp(VectorSize::Quad, R000, R100)], &state, &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(
        get_bits(&run.state, R000, VectorSize::Quad),
        vec![0.5f32.to_bits(), 0x7f80_0000, 0xff80_0000, 0.25f32.to_bits()]
    );

    let run = check_against_reference(aarch64(), &[vnrcp(VectorSize::Quad, R000, R100)], &state, &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(get(&run.state, R000, VectorSize::Quad), vec![-0.5, f32::NEG_INFINITY, f32::INFINITY, -0.25]);
}

#[test]
fn division_without_simd_divide_falls_back() {
    let state = seeded_state();
    for word in [vrcp(VectorSize::Quad, R000, R100), vdiv(VectorSize::Triple, R000, R100, R200)] {
        let run = check_against_reference(armv7(), &[word], &state, &seeded_ram());
        assert_eq!(run.block.outcomes[0].1, CompileOutcome::Fallback(Fallback::NoSimdDivide));
        assert_eq!(run.exec.interpreter_calls, 1);
    }

    let run = check_against_reference(aarch64(), &[vdiv(VectorSize::Triple, R000, R100, R200)], &state, &seeded_ram());
    assert!(all_native(&run));
}

#[test]
fn square_root_of_negative_zero_is_positive() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Quad, &[4.0, -0.0, 0.25, 9.0]);

    let run = check_against_reference(armv7(), &[vsqrt(VectorSize::Quad, R000, R100)], &state, &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(
        get_bits(&run.state, R000, VectorSize::Quad),
        [2.0f32, 0.0, 0.5, 3.0].map(f32::to_bits).to_vec()
    );
}

#[test]
fn stored_nans_from_square_roots_are_positive() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Quad, &[-7.05411, f32::from_bits(0xffc0_0000), -0.0, 4.0]);
    let words = [vsqrt(VectorSize::Quad, R000, R100), sv_q(R000, 4, 0)];

    for config in [aarch64(), JitConfig { fast_memory: false, ..armv7() }] {
        let run = check_against_reference(config, &words, &state, &seeded_ram());
        assert!(all_native(&run));
        let stored: Vec<_> = (0..4).map(|lane| run.ram.read_u32(RAM_BASE + lane * 4)).collect();
        assert_eq!(stored, vec![Some(DEFAULT_NAN), Some(DEFAULT_NAN), Some(0), Some(2.0f32.to_bits())]);
    }
}

#[test]
fn nan_payloads_survive_a_chain_of_operations() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Quad, &[-7.05411, 1.5, 2.0, -3.0]);
    set(&mut state, R200, VectorSize::Quad, &[f32::NAN, 0.5, f32::from_bits(0xff80_0042), f32::INFINITY]);
    state.vfpr[33] = f32::NAN;
    let words = [
        vadd(VectorSize::Triple, R000, R100, R200),
        vneg(VectorSize::Pair, R100, R000),
        vsqrt(VectorSize::Pair, 0x08, R100),
        vscl(VectorSize::Pair, 0x08, 0x08, 0x21),
        vmul(VectorSize::Quad, 0x0c, R200, R200),
        sv_q(0x08, 4, 0),
        sv_q(0x0c, 4, 0x10),
        sv_q(R000, 5, 0),
    ];
    let config = JitConfig { fast_memory: false, ..aarch64() };
    check_against_reference(config, &words, &state, &seeded_ram());
}

#[test]
fn tiny_ram_interprets_quad_accesses() {
    let config = JitConfig { fast_memory: false, ram_size: 8, ..aarch64() };
    let words = [lv_q(R000, 5, 0), sv_s(S010, 4, 4)];
    let state = seeded_state();
    let ram = GuestRam::new(8);

    let run = check_against_reference(config, &words, &state, &ram);
    assert_eq!(run.block.outcomes[0].1, CompileOutcome::Fallback(Fallback::AccessLargerThanRam(16)));
    assert!(run.block.outcomes[1].1.is_generated());
    assert_eq!(run.ram.read_f32(RAM_BASE + 4), Some(state.vfpr[1]));
}

#[test]
fn comparisons_produce_ones_and_zeros() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Quad, &[1.0, f32::NAN, 2.0, -0.0]);
    set(&mut state, R200, VectorSize::Quad, &[1.0, 1.0, 3.0, 0.0]);

    let run = check_against_reference(armv7(), &[vsge(VectorSize::Quad, R000, R100, R200)], &state, &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(get(&run.state, R000, VectorSize::Quad), vec![1.0, 0.0, 0.0, 1.0]);

    let run = check_against_reference(armv7(), &[vslt(VectorSize::Quad, R000, R100, R200)], &state, &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(get(&run.state, R000, VectorSize::Quad), vec![0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn min_and_max_order_signed_zeros() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Pair, &[0.0, -0.0]);
    set(&mut state, R200, VectorSize::Pair, &[-0.0, 0.0]);

    let run = check_against_reference(armv7(), &[vmin(VectorSize::Pair, R000, R100, R200)], &state, &seeded_ram());
    assert_eq!(get_bits(&run.state, R000, VectorSize::Pair), vec![0x8000_0000, 0x8000_0000]);

    let run = check_against_reference(armv7(), &[vmax(VectorSize::Pair, R000, R100, R200)], &state, &seeded_ram());
    assert_eq!(get_bits(&run.state, R000, VectorSize::Pair), vec![0, 0]);
}

#[test]
fn arithmetic_on_every_size() {
    let sizes = [VectorSize::Single, VectorSize::Pair, VectorSize::Triple, VectorSize::Quad];
    for size in sizes {
        let words = [
            vadd(size, R000, R100, R200),
            vsub(size, C000, R000, R100),
            vmul(size, R200, C000, R000),
            vabs(size, R100, C000),
            vneg(size, C000, R200),
            vsat0(size, 0x08, R100),
            vsat1(size, 0x0c, R200),
            vscl(size, 0x10, C000, S010),
        ];
        let run = check_against_reference(armv7(), &words, &seeded_state(), &seeded_ram());
        assert!(all_native(&run), "{:?}\n{}", size, run.block.disassemble());
    }
}

#[test]
fn scale_multiplies_by_one_lane() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Triple, &[1.0, -2.0, 3.0]);
    set(&mut state, S010, VectorSize::Single, &[0.5]);

    let run = check_against_reference(aarch64(), &[vscl(VectorSize::Triple, R000, R100, S010)], &state, &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(get(&run.state, R000, VectorSize::Triple), vec![0.5, -1.0, 1.5]);
}

#[test]
fn vector_initializers() {
    let words = [
        vzero(VectorSize::Triple, R000),
        vone(VectorSize::Quad, R100),
        vidt(VectorSize::Quad, 0x22),
        vidt(VectorSize::Pair, 0x01),
        viim(0x45, -7),
        vfim(0x46, 0xc100),
    ];
    let run = check_against_reference(aarch64(), &words, &seeded_state(), &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(get(&run.state, R000, VectorSize::Triple), vec![0.0; 3]);
    assert_eq!(get(&run.state, R100, VectorSize::Quad), vec![1.0; 4]);
    assert_eq!(get(&run.state, 0x22, VectorSize::Quad), vec![0.0, 0.0, 1.0, 0.0]);
    assert_eq!(get(&run.state, 0x01, VectorSize::Pair), vec![0.0, 1.0]);
    assert_eq!(get(&run.state, 0x45, VectorSize::Single), vec![-7.0]);
    assert_eq!(get(&run.state, 0x46, VectorSize::Single), vec![-2.5]);
}

#[test]
fn fallbacks_see_and_publish_current_values() {
    let words = [
        vadd(VectorSize::Quad, R000, R100, R200),
        vdot(VectorSize::Quad, S010, R000, R100),
        vscl(VectorSize::Quad, R200, R000, S010),
        vnop(),
    ];
    let run = check_against_reference(armv7(), &words, &seeded_state(), &seeded_ram());
    assert_eq!(run.block.native_count(), 3);
    assert_eq!(run.block.outcomes[1].1, CompileOutcome::Fallback(Fallback::Unimplemented("vdot")));
    assert_eq!(run.exec.interpreter_calls, 1);
}

#[test]
fn quad_load_and_store_fast_memory() {
    // $a0 = RAM_BASE, $a1 = RAM_BASE + 0x100
    let words = [
        lv_q(R000, 4, 0x40),
        lv_q(C000, 5, -0x10),
        vadd(VectorSize::Quad, R100, R000, C000),
        sv_q(R100, 6, 0x20),
        sv_q(C000, 4, 0),
    ];
    let run = check_against_reference(aarch64(), &words, &seeded_state(), &seeded_ram());
    assert!(all_native(&run));
    assert!(!run.block.ops.iter().any(|op| matches!(op, HostOp::CmpImm { .. })));
    assert_eq!(
        run.ram.read_f32(RAM_BASE + 0x220),
        Some(get(&run.state, R100, VectorSize::Quad)[0])
    );
}

#[test]
fn quad_load_and_store_safe_memory() {
    let config = JitConfig { fast_memory: false, ..armv7() };
    let words = [lv_q(R000, 4, 0x40), sv_q(R000, 5, 0x30), lv_s(0x45, 6, 0x8), sv_s(0x45, 7, 0xc)];
    let run = check_against_reference(config, &words, &seeded_state(), &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(run.block.ops.iter().filter(|op| matches!(op, HostOp::CmpImm { .. })).count(), 4);
}

#[test]
fn safe_memory_skips_accesses_outside_ram() {
    let mut state = seeded_state();
    state.gpr[4] = 0x0400_0000;
    state.gpr[5] = RAM_BASE + RAM_SIZE;
    let config = JitConfig { fast_memory: false, ..aarch64() };
    let words = [lv_q(R000, 4, 0), sv_q(R100, 5, 0), lv_q(R200, 5, -0x10)];

    let run = check_against_reference(config, &words, &state, &seeded_ram());
    assert!(all_native(&run));
    assert_eq!(get(&run.state, R000, VectorSize::Quad), get(&state, R000, VectorSize::Quad));
    // the last quad of RAM is still in range
    assert_eq!(run.ram.read_f32(RAM_BASE + RAM_SIZE - 16), Some(get(&run.state, R200, VectorSize::Quad)[0]));
}

#[test]
fn known_addresses_are_folded() {
    let words = [lv_q(R000, 4, 0x40), sv_q(R000, 4, 0x80)];
    let state = seeded_state();
    let ram = seeded_ram();

    let gpr = StaticGprMap::new().with_imm(4, RAM_BASE);
    let run = run_jit(aarch64(), gpr, &words, &state, &ram);
    let (expected, expected_ram) = run_reference(&words, &state, &ram);
    assert_same_state(&run.state, &expected);
    assert_same_ram(&run.ram, &expected_ram);
    assert!(run.block.ops.contains(&HostOp::MovImm { rd: vfpu::emitter::Gpr::R0, imm: RAM_BASE + 0x40 }));
}

#[test]
fn known_invalid_address_falls_back() {
    // $zero + 0x40 is not RAM
    let words = [lv_q(R000, 0, 0x40)];
    let run = check_against_reference(aarch64(), &words, &seeded_state(), &seeded_ram());
    assert_eq!(run.block.outcomes[0].1, CompileOutcome::Fallback(Fallback::InvalidAddress(0x40)));
    assert_eq!(run.exec.interpreter_calls, 1);
}
