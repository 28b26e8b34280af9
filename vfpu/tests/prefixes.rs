mod common;

use common::*;
use vfpu::addressing::StaticGprMap;
use vfpu::emitter::HostOp;
use vfpu::instructions::encode::*;
use vfpu::prefix::PrefixError;
use vfpu::{CompileOutcome, Fallback, HostFeatures, Jit, JitConfig, VectorSize};

const R000: u8 = 0x20;
const R100: u8 = 0x24;
const R200: u8 = 0x28;

fn aarch64() -> JitConfig {
    config(HostFeatures::aarch64())
}

#[test]
fn identity_prefixes_change_nothing() {
    let state = seeded_state();
    let ram = seeded_ram();
    let add = vadd(VectorSize::Quad, R000, R100, R200);

    let plain = check_against_reference(aarch64(), &[add], &state, &ram);
    let explicit = check_against_reference(aarch64(), &[vpfxs(0xe4), vpfxt(0xe4), vpfxd(0), add], &state, &ram);

    assert_eq!(explicit.block.native_count(), 4);
    assert_eq!(
        get_bits(&plain.state, R000, VectorSize::Quad),
        get_bits(&explicit.state, R000, VectorSize::Quad)
    );
}

#[test]
fn constant_sources_ignore_the_register() {
    let sizes = [VectorSize::Single, VectorSize::Pair, VectorSize::Triple, VectorSize::Quad];
    for size in sizes {
        let n = size.lanes();
        // lane i takes constant i (0, 1, 2, 1/2), the lanes past the operand stay identity
        let prefix = 0xe4 | (((1 << n) - 1) << 12);
        let words = [vpfxs(prefix), vmov(size, 0x08, 0x04)];

        let mut poisoned = seeded_state();
        set(&mut poisoned, 0x04, VectorSize::Quad, &[f32::NAN; 4]);

        let a = check_against_reference(aarch64(), &words, &seeded_state(), &seeded_ram());
        let b = check_against_reference(aarch64(), &words, &poisoned, &seeded_ram());

        assert!(a.block.outcomes.iter().all(|(_, outcome)| outcome.is_generated()), "{:?}", size);
        assert_eq!(get(&a.state, 0x08, size), [0.0, 1.0, 2.0, 0.5][..n].to_vec());
        assert_eq!(get_bits(&a.state, 0x08, size), get_bits(&b.state, 0x08, size));
    }
}

#[test]
fn self_move_emits_nothing() {
    let mut jit = Jit::new(aarch64(), StaticGprMap::new());
    assert!(jit.compile_op(vmov(VectorSize::Quad, R000, R000)).is_generated());
    assert!(jit.code().is_empty());

    // with a pending prefix it is a real operation
    jit.compile_op(vpfxs(0x1b));
    jit.compile_op(vmov(VectorSize::Quad, R000, R000));
    assert!(!jit.code().is_empty());
}

#[test]
fn write_mask_keeps_masked_lanes() {
    let state = seeded_state();
    // lanes 1 and 3 masked
    let words = [vpfxd((1 << 9) | (1 << 11)), vadd(VectorSize::Quad, R000, R100, R200)];
    let run = check_against_reference(aarch64(), &words, &state, &seeded_ram());

    assert_eq!(run.block.native_count(), 2);
    let before = get(&state, R000, VectorSize::Quad);
    let s = get(&state, R100, VectorSize::Quad);
    let t = get(&state, R200, VectorSize::Quad);
    let after = get(&run.state, R000, VectorSize::Quad);
    assert_eq!(after, vec![s[0] + t[0], before[1], s[2] + t[2], before[3]]);
}

#[test]
fn saturation_clamps_written_lanes() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Quad, &[-2.0, 0.3, 1.0, 5.0]);

    let run = check_against_reference(aarch64(), &[vpfxd(0x55), vmov(VectorSize::Quad, R000, R100)], &state, &seeded_ram());
    assert_eq!(get(&run.state, R000, VectorSize::Quad), vec![0.0, 0.3, 1.0, 1.0]);

    let run = check_against_reference(aarch64(), &[vpfxd(0xff), vmov(VectorSize::Quad, R000, R100)], &state, &seeded_ram());
    assert_eq!(get(&run.state, R000, VectorSize::Quad), vec![-1.0, 0.3, 1.0, 1.0]);
}

#[test]
fn partial_saturation_leaves_other_lanes_bit_exact() {
    let snan = f32::from_bits(0x7f80_0001);
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Quad, &[5.0, snan, -3.0, -0.0]);

    let run = check_against_reference(aarch64(), &[vpfxd(0x1), vmov(VectorSize::Quad, R000, R100)], &state, &seeded_ram());
    assert_eq!(run.block.native_count(), 2);
    assert_eq!(
        get_bits(&run.state, R000, VectorSize::Quad),
        vec![1.0f32.to_bits(), 0x7f80_0001, (-3.0f32).to_bits(), 0x8000_0000]
    );
}

#[test]
fn mixed_saturation_falls_back() {
    // lane 0 to [0, 1], lane 1 to [-1, 1]
    let words = [vpfxd(0b11_01), vadd(VectorSize::Quad, R000, R100, R200)];
    let run = check_against_reference(aarch64(), &words, &seeded_state(), &seeded_ram());

    assert_eq!(
        run.block.outcomes[1].1,
        CompileOutcome::Fallback(Fallback::InvalidPrefix(PrefixError::MixedSaturation))
    );
    assert_eq!(run.exec.interpreter_calls, 1);
}

#[test]
fn partial_abs_and_negate_are_lane_exact() {
    let mut state = seeded_state();
    set(&mut state, R100, VectorSize::Quad, &[-1.5, 2.0, -0.0, -3.25]);

    // abs on lanes 0 and 2, negate on lanes 1 and 2
    let prefix = 0xe4 | (0b0101 << 8) | (0b0110 << 16);
    let run = check_against_reference(aarch64(), &[vpfxs(prefix), vmov(VectorSize::Quad, R000, R100)], &state, &seeded_ram());

    assert_eq!(run.block.native_count(), 2);
    assert_eq!(
        get_bits(&run.state, R000, VectorSize::Quad),
        [1.5f32, -2.0, -0.0, -3.25].map(f32::to_bits).to_vec()
    );
    // the source register itself is untouched
    assert_eq!(get(&run.state, R100, VectorSize::Quad), vec![-1.5, 2.0, -0.0, -3.25]);
}

#[test]
fn swizzles_match_the_interpreter() {
    let prefixes = [
        0x1b,                         // reversed
        0x55,                         // broadcast lane 1
        0xe4 | (0xf << 16),           // negate all
        0xe4 | (0xf << 8),            // abs all
        0x24 | (1 << 11) | (1 << 15) | (1 << 19), // lane 3 is -3, constant 0 with abs
        0x4e | (0b0011 << 8),
    ];
    for prefix in prefixes {
        let words = [vpfxs(prefix), vpfxt(prefix ^ 0x10_000), vmul(VectorSize::Quad, R000, R100, R200)];
        let run = check_against_reference(aarch64(), &words, &seeded_state(), &seeded_ram());
        assert_eq!(run.block.native_count(), 3, "prefix {:#x}", prefix);
    }
}

#[test]
fn prefix_reaching_past_the_operand_falls_back() {
    // a pair reading lane 3
    let words = [vpfxs(0xe4 | 0b11), vadd(VectorSize::Pair, R000, R100, R200)];
    let run = check_against_reference(aarch64(), &words, &seeded_state(), &seeded_ram());
    assert!(matches!(
        run.block.outcomes[1].1,
        CompileOutcome::Fallback(Fallback::InvalidPrefix(PrefixError::LaneMismatch { .. }))
    ));
}

#[test]
fn unknown_prefixes_at_entry_are_honoured() {
    let mut state = seeded_state();
    state.vpfx[0] = 0x1b;
    let config = JitConfig { start_default_prefix: false, ..aarch64() };
    let add = vadd(VectorSize::Quad, R000, R100, R200);

    let run = check_against_reference(config, &[add, add], &state, &seeded_ram());
    assert_eq!(run.block.outcomes[0].1, CompileOutcome::Fallback(Fallback::UnknownPrefix));
    assert!(run.block.outcomes[1].1.is_generated());
    assert_eq!(run.exec.interpreter_calls, 1);
}

#[test]
fn prefix_values_reach_the_context_before_interpreter_calls() {
    let words = [vpfxs(0x1b), vdot(VectorSize::Quad, 0x00, R100, R200)];
    let run = check_against_reference(aarch64(), &words, &seeded_state(), &seeded_ram());

    let ops = &run.block.ops;
    let call = ops
        .iter()
        .position(|op| matches!(op, HostOp::CallInterpreter { .. }))
        .expect("interpreter call");
    assert!(ops[..call].iter().any(|op| matches!(op, HostOp::Str { offset: 512, .. })));
}
