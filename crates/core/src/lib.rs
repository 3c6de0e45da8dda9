//! # chip8ide-core
//!
//! Toolchain and execution core for the CHIP-8 virtual machine: 35 opcodes,
//! 4 KB address space, 64×32 monochrome display. Designed as the engine
//! behind an IDE frontend, which stays outside this crate and talks to it
//! through [`ide::Ide`] and the runner callbacks.
//!
//! ## Architecture
//!
//! - [`opcodes`] — Instruction table: shape patterns, mnemonic templates,
//!   per-opcode COSMAC VIP timing
//! - [`Chip8`] — Machine state (CPU, memory, display) and the two timing
//!   disciplines
//! - [`Cpu`] — Register file (V0–VF, I, PC, DT/ST, call stack)
//! - [`Memory`] — 4 KB address space with digit font and program regions
//! - [`Display`] — 64×32 framebuffer with clipping XOR blit
//! - [`Keypad`] — Atomic 16-key state, the one cross-thread mutation point
//! - [`asm`] — Two-pass assembler (labels, `db`/`equ` directives, expressions)
//! - [`disasm`] — Control-flow-directed disassembler with label synthesis
//! - [`savestate`] — Machine snapshots as compressed byte buffers
//! - [`runner`] — 60 Hz worker thread with display/sound callbacks
//! - [`ide`] — Collaborator-facing session (source text, ROM, CPU controls)
//!
//! ## Timing
//!
//! The machine runs one [`Chip8::run_frame`] per 60 Hz tick. In the default
//! approximate mode a fixed `clock_rate / 60` instructions execute per tick.
//! In cycle-accurate mode each tick replenishes a microsecond budget
//! (capped at one frame, so there is no catch-up backlog) and instructions
//! are charged their reference-hardware durations until it runs out.

pub mod asm;
pub mod cpu;
pub mod disasm;
pub mod display;
pub mod ide;
pub mod keypad;
pub mod memory;
pub mod opcodes;
pub mod runner;
pub mod savestate;

pub use cpu::Cpu;
pub use display::Display;
pub use ide::Ide;
pub use keypad::{Keypad, KEY_COUNT};
pub use memory::Memory;

/// Display width in pixels
pub const SCREEN_WIDTH: usize = 64;
/// Display height in pixels
pub const SCREEN_HEIGHT: usize = 32;
/// Address space size: 4 KB
pub const RAM_SIZE: usize = 0x1000;
/// First program address; everything below is interpreter territory
pub const PROGRAM_START: u16 = 0x200;
/// Largest loadable program in bytes
pub const MAX_PROGRAM_SIZE: usize = RAM_SIZE - PROGRAM_START as usize;
/// Frame tick rate in Hz (timers, display publication)
pub const FRAME_RATE: u32 = 60;
/// Instruction-time budget replenished per frame tick, in microseconds
pub const FRAME_MICROS: f64 = 16_666.666;
/// Default instruction clock for the approximate timing mode
pub const DEFAULT_CLOCK_HZ: u32 = 500;

/// The CHIP-8 machine: CPU, memory, and display, plus the program image and
/// timing-discipline state.
///
/// `run_frame` is the only execution entry point; everything it mutates is
/// owned here, so a `Chip8` is single-threaded by construction and the
/// [`runner`] wraps it in a mutex for background execution.
pub struct Chip8 {
    pub cpu: Cpu,
    pub mem: Memory,
    pub display: Display,
    /// Key snapshot sampled at the top of the current frame tick.
    pub(crate) keys: [bool; KEY_COUNT],
    /// Lowest-numbered held key this frame, for the key-wait instruction.
    pub(crate) key_pressed: Option<u8>,
    pub(crate) rom: Vec<u8>,
    pub(crate) loaded: bool,
    pub(crate) cycle_accurate: bool,
    pub(crate) clock_hz: u32,
    /// Remaining instruction-time budget this frame (cycle-accurate mode).
    pub(crate) budget_micros: f64,
    pub(crate) rng_state: u32,
    /// Enable unknown-opcode diagnostics on stderr.
    pub debug: bool,
}

impl Chip8 {
    pub fn new() -> Self {
        Chip8 {
            cpu: Cpu::new(),
            mem: Memory::new(),
            display: Display::new(),
            keys: [false; KEY_COUNT],
            key_pressed: None,
            rom: Vec::new(),
            loaded: false,
            cycle_accurate: false,
            clock_hz: DEFAULT_CLOCK_HZ,
            budget_micros: 0.0,
            rng_state: 0xDEAD_BEEF,
            debug: false,
        }
    }

    /// Store a program image and reset the machine around it.
    ///
    /// Programs longer than [`MAX_PROGRAM_SIZE`] are truncated to the
    /// available space.
    pub fn load(&mut self, rom: &[u8]) {
        let len = rom.len().min(MAX_PROGRAM_SIZE);
        self.rom = rom[..len].to_vec();
        self.loaded = true;
        self.reset();
    }

    /// Re-enter the paused start state: registers zeroed, `PC` at 0x200,
    /// font and program copied back into memory, display and keys cleared.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.mem.reset(&self.rom);
        self.display.clear();
        self.keys = [false; KEY_COUNT];
        self.key_pressed = None;
        self.budget_micros = 0.0;
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// Switch between the approximate and cycle-accurate timing
    /// disciplines. Always re-applies [`reset`](Self::reset).
    pub fn set_timing_mode(&mut self, cycle_accurate: bool) {
        self.cycle_accurate = cycle_accurate;
        self.reset();
    }

    pub fn cycle_accurate(&self) -> bool {
        self.cycle_accurate
    }

    /// Set the instruction clock for the approximate mode.
    pub fn set_clock_rate(&mut self, hz: u32) -> Result<(), String> {
        if hz == 0 {
            return Err("clock rate must be positive and nonzero".into());
        }
        self.clock_hz = hz;
        Ok(())
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_hz
    }

    /// True while the sound timer is running; the frontend's tone should be
    /// audible exactly when this is.
    pub fn sound_on(&self) -> bool {
        self.cpu.st > 0
    }

    /// Run one 60 Hz frame tick: decrement the timers, latch the key
    /// snapshot, then execute this tick's share of instructions under the
    /// active timing discipline.
    ///
    /// Timer decrement precedes execution, so an instruction reading `DT`
    /// in the same tick observes the decremented value.
    pub fn run_frame(&mut self, keys: [bool; KEY_COUNT]) {
        if self.cpu.dt > 0 {
            self.cpu.dt -= 1;
        }
        if self.cpu.st > 0 {
            self.cpu.st -= 1;
        }

        self.keys = keys;
        self.key_pressed = keys.iter().position(|&k| k).map(|i| i as u8);

        if !self.loaded {
            return;
        }

        if !self.cycle_accurate {
            let per_frame = self.clock_hz / FRAME_RATE;
            for _ in 0..per_frame {
                self.step();
            }
        } else {
            self.budget_micros = (self.budget_micros + FRAME_MICROS).min(FRAME_MICROS);
            while self.budget_micros > 0.0 {
                let word = self.mem.read_word(self.cpu.pc & 0x0FFF);
                let micros = self.execute(word);
                if micros == 0.0 && self.key_pressed.is_none() {
                    // Stalled on the key wait; nothing more can run this
                    // frame, so drop the rest of the budget.
                    self.budget_micros = 0.0;
                    self.cpu.pc = self.cpu.pc.wrapping_add(2);
                    return;
                }
                self.budget_micros -= micros;
                self.cpu.pc = self.cpu.pc.wrapping_add(2);
            }
        }
    }

    /// Decode-execute the instruction at `PC` and advance past it.
    fn step(&mut self) {
        let word = self.mem.read_word(self.cpu.pc & 0x0FFF);
        self.execute(word);
        self.cpu.pc = self.cpu.pc.wrapping_add(2);
    }

    /// Execute a single instruction and return its rendered form, e.g.
    /// `"0x200: LD V2, #0"`. Debugger hook for step-by-step execution.
    pub fn step_one(&mut self) -> String {
        let pc = self.cpu.pc & 0x0FFF;
        let word = self.mem.read_word(pc);
        let text = disasm::render_word(word);
        self.step();
        format!("0x{:03X}: {}", pc, text)
    }

    /// xorshift32, seeded at construction; feeds the RND instruction.
    pub(crate) fn rand_byte(&mut self) -> u8 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 17;
        self.rng_state ^= self.rng_state << 5;
        (self.rng_state & 0xFF) as u8
    }

    /// Format a register dump with V0–VF, I, PC, DT, ST, and stack depth.
    pub fn dump_regs(&self) -> String {
        let mut s = String::new();
        for (i, v) in self.cpu.v.iter().enumerate() {
            if i == 8 {
                s.push('\n');
            } else if i > 0 {
                s.push(' ');
            }
            s.push_str(&format!("V{:X}={:02X}", i, v));
        }
        s.push_str(&format!(
            "\nI={:03X} PC={:03X} DT={:02X} ST={:02X} stack={}",
            self.cpu.i,
            self.cpu.pc,
            self.cpu.dt,
            self.cpu.st,
            self.cpu.stack.len()
        ));
        s
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}
