//! CHIP-8 disassembler.
//!
//! Reconstructs assembly source from a ROM image by walking the control
//! flow instead of sweeping linearly: starting at the program origin, the
//! walk follows jumps, recurses into call targets and both arms of the
//! skip-then-jump idiom, and stops at returns or already-visited addresses
//! (which also guarantees termination on self-loops).
//!
//! Jump targets are named `J0, J1, …` and call targets `call_0, call_1, …`
//! in first-seen order. Bytes the walk never reaches are preserved as
//! `db` literal runs under `dataN` labels, so an incomplete reachability
//! analysis still re-exports every byte. Each instruction line carries a
//! `;address opcode` comment for traceability.
//!
//! `disassemble` is total: invalid words are skipped exactly as the
//! interpreter skips them, and out-of-range control flow ends the branch.

use crate::opcodes::{self, Fields, Op};
use crate::PROGRAM_START;

/// One reconstructed instruction.
struct Line {
    addr: u16,
    opcode: u16,
    text: String,
}

#[derive(Default)]
struct Walk {
    lines: Vec<Line>,
    calls: Vec<u16>,
    jumps: Vec<u16>,
}

/// Render a single instruction word with literal operands, e.g.
/// `"DRW V0, V1, #5"`. Unknown words render as a `db` pair.
pub fn render_word(word: u16) -> String {
    match opcodes::lookup(word) {
        Some(info) => substitute(info.template, word, None),
        None => format!("db #{:02x}, #{:02x}", word >> 8, word & 0xFF),
    }
}

/// Fill a mnemonic template's placeholders from an instruction word.
/// `addr_text` overrides the `addr` placeholder (synthesized label names).
fn substitute(template: &str, word: u16, addr_text: Option<&str>) -> String {
    let Fields { nnn, x, y, kk, n } = Fields::of(word);
    let addr = match addr_text {
        Some(label) => label.to_string(),
        None => format!("#{nnn:x}"),
    };
    template
        .replace("byte", &format!("#{kk:x}"))
        .replace("addr", &addr)
        .replace("nibble", &format!("#{n:x}"))
        .replace('x', &format!("{x:x}"))
        .replace('y', &format!("{y:x}"))
}

/// Decompile a ROM image into re-assemblable source text.
pub fn disassemble(rom: &[u8]) -> String {
    let mut walk = Walk::default();
    walk_from(rom, PROGRAM_START, &mut walk);
    render(rom, walk)
}

/// Conditional-skip mnemonics; a jump right after one is the
/// "skip-then-branch" idiom rather than a straight-line redirect.
fn is_conditional(text: &str) -> bool {
    ["SE", "SNE", "SKP", "SKNP"].iter().any(|m| text.starts_with(m))
}

fn walk_from(rom: &[u8], start: u16, walk: &mut Walk) {
    let mut pc = start;

    loop {
        let Some(offset) = (pc as usize).checked_sub(PROGRAM_START as usize) else {
            return;
        };
        if offset + 1 >= rom.len() {
            return;
        }
        if walk.lines.iter().any(|line| line.addr == pc) {
            return;
        }

        let opcode = (rom[offset] as u16) << 8 | rom[offset + 1] as u16;
        let Some(info) = opcodes::lookup(opcode) else {
            // The interpreter skips invalid words, so do we; they surface
            // later as data bytes.
            pc = pc.wrapping_add(2);
            continue;
        };
        let fields = Fields::of(opcode);
        let addr = pc;

        let mut branch_target = None;
        let mut text = match info.op {
            Op::Jp => {
                let conditional = walk.lines.last().map_or(false, |l| is_conditional(&l.text));
                if !walk.jumps.contains(&fields.nnn) {
                    walk.jumps.push(fields.nnn);
                }
                let index = walk.jumps.iter().position(|&a| a == fields.nnn).unwrap_or(0);
                let label = format!("J{index}");
                let rendered = substitute(info.template, opcode, Some(&label));
                if conditional {
                    // Alternate arm: disassemble both continuations.
                    branch_target = Some(fields.nnn);
                    format!("\t{rendered}")
                } else {
                    // Straight-line redirect of the cursor.
                    pc = fields.nnn.wrapping_sub(2);
                    rendered
                }
            }
            Op::Call => {
                if !walk.calls.contains(&fields.nnn) {
                    walk.calls.push(fields.nnn);
                }
                let index = walk.calls.iter().position(|&a| a == fields.nnn).unwrap_or(0);
                let rendered =
                    substitute(info.template, opcode, Some(&format!("call_{index}")));
                if walk.lines.iter().all(|line| line.addr != fields.nnn) {
                    walk_from(rom, fields.nnn, walk);
                }
                rendered
            }
            _ => substitute(info.template, opcode, None),
        };

        if info.op == Op::Ret {
            text.push('\n');
        }

        walk.lines.push(Line { addr, opcode, text });

        if info.op == Op::Ret {
            return;
        }
        if let Some(target) = branch_target {
            walk_from(rom, target, walk);
        }

        pc = pc.wrapping_add(2);
    }
}

/// Sort by address, emit labels, instructions with traceability comments,
/// and `db` runs for the gaps.
fn render(rom: &[u8], mut walk: Walk) -> String {
    walk.lines.sort_by_key(|line| line.addr);

    let mut out = String::new();
    let mut data_count = 0;

    for (i, line) in walk.lines.iter().enumerate() {
        if let Some(index) = walk.calls.iter().position(|&a| a == line.addr) {
            out.push_str(&format!("\ncall_{index}:\n"));
        }
        if let Some(index) = walk.jumps.iter().position(|&a| a == line.addr) {
            out.push_str(&format!("\nJ{index}:\n"));
        }

        out.push_str(&format!("{:<25}", line.text));
        out.push_str(&format!(";{:x} {:x}\n", line.addr, line.opcode));

        // Preserve unreached bytes between this instruction and the next.
        let after = (line.addr as usize + 2).saturating_sub(PROGRAM_START as usize);
        let until = walk
            .lines
            .get(i + 1)
            .map(|next| (next.addr as usize).saturating_sub(PROGRAM_START as usize))
            .unwrap_or(rom.len());
        if after < until {
            out.push_str(&format!("data{data_count}:\ndb"));
            data_count += 1;
            let mut column = 1;
            for &byte in &rom[after..until.min(rom.len())] {
                if column % 0xF == 0 {
                    out.push_str("\ndb");
                }
                column += 1;
                out.push_str(&format!(" #{byte:02x},"));
            }
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm;

    #[test]
    fn test_render_word() {
        assert_eq!(render_word(0x00E0), "CLS");
        assert_eq!(render_word(0x6200), "LD V2, #0");
        assert_eq!(render_word(0xD125), "DRW V1, V2, #5");
        assert_eq!(render_word(0xF30A), "LD V3, K");
        assert_eq!(render_word(0x5121), "db #51, #21"); // invalid word
    }

    #[test]
    fn test_straight_line_program() {
        let text = disassemble(&[0x60, 0x05, 0x00, 0xEE]);
        assert!(text.contains("LD V0, #5"));
        assert!(text.contains("RET"));
        assert!(text.contains(";200 6005"));
    }

    #[test]
    fn test_jump_synthesizes_label() {
        // 0x200: LD V0,#1  0x202: JP 0x200 (self loop via label)
        let text = disassemble(&[0x60, 0x01, 0x12, 0x00]);
        assert!(text.contains("J0:"));
        assert!(text.contains("JP J0"));
    }

    #[test]
    fn test_call_synthesizes_routine_label() {
        // CALL 0x206; self-loop; padding; routine: RET
        let rom = [0x22, 0x06, 0x12, 0x02, 0x00, 0x00, 0x00, 0xEE];
        let text = disassemble(&rom);
        assert!(text.contains("call_0:"));
        assert!(text.contains("CALL call_0"));
        assert!(text.contains("RET"));
    }

    #[test]
    fn test_skip_then_jump_walks_both_arms() {
        // SNE V1,#0 ; JP 0x206 ; RET ; LD V0,#7 ; RET
        let rom = [0x41, 0x00, 0x12, 0x06, 0x00, 0xEE, 0x60, 0x07, 0x00, 0xEE];
        let text = disassemble(&rom);
        // the jump is rendered indented and both arms appear
        assert!(text.contains("\tJP J0"));
        assert!(text.contains("LD V0, #7"));
        assert!(text.contains(";204 ee")); // fall-through RET reached
    }

    #[test]
    fn test_unreached_bytes_become_data() {
        // JP 0x206 skips over two raw bytes
        let rom = [0x12, 0x06, 0xAB, 0xCD, 0xEF, 0x99, 0x00, 0xEE];
        let text = disassemble(&rom);
        assert!(text.contains("data0:"));
        assert!(text.contains("#ab,"));
        assert!(text.contains("#cd,"));
        // and the data re-assembles into place
        let rebuilt = asm::assemble(&text).unwrap();
        assert_eq!(rebuilt, rom);
    }

    #[test]
    fn test_self_loop_terminates() {
        let text = disassemble(&[0x12, 0x00]);
        assert!(text.contains("JP J0"));
    }

    #[test]
    fn test_empty_rom() {
        assert_eq!(disassemble(&[]), "");
    }

    #[test]
    fn test_odd_trailing_byte_preserved() {
        let rom = [0x00, 0xEE, 0x7F];
        let text = disassemble(&rom);
        assert!(text.contains("#7f,"));
    }

    #[test]
    fn test_data_run_wraps_lines() {
        let mut rom = vec![0x00, 0xEE];
        rom.extend(std::iter::repeat(0x11).take(40));
        let text = disassemble(&rom);
        let db_lines = text.lines().filter(|l| l.starts_with("db")).count();
        assert!(db_lines >= 3, "long data runs should wrap: {text}");
    }
}
