//! Machine snapshots (quick save / quick load).
//!
//! Captures the complete machine — registers, stack, RAM, display, program
//! image, and timing-discipline state — into a self-describing byte buffer
//! using bincode serialization with deflate compression. Frontends decide
//! where the buffer goes; the core never touches the filesystem.
//!
//! ## Buffer format
//!
//! ```text
//! +------------------+
//! | Magic "C8SV"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Deserialize, Serialize};

use crate::keypad::KEY_COUNT;
use crate::{Chip8, RAM_SIZE, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Magic bytes identifying a snapshot buffer.
const MAGIC: &[u8; 4] = b"C8SV";
/// Current snapshot format version.
const FORMAT_VERSION: u32 = 1;

/// Complete machine state, detached from the live `Chip8`.
#[derive(Serialize, Deserialize)]
pub struct SaveState {
    // CPU
    pub v: [u8; 16],
    pub i: u16,
    pub pc: u16,
    pub dt: u8,
    pub st: u8,
    pub stack: Vec<u16>,

    // Memory & display
    pub ram: Vec<u8>,
    pub pixels: Vec<bool>,

    // Program image & machine configuration
    pub rom: Vec<u8>,
    pub loaded: bool,
    pub cycle_accurate: bool,
    pub clock_hz: u32,
    pub budget_micros: f64,
    pub rng_state: u32,
}

/// Capture the machine's current state.
pub fn capture(machine: &Chip8) -> SaveState {
    SaveState {
        v: machine.cpu.v,
        i: machine.cpu.i,
        pc: machine.cpu.pc,
        dt: machine.cpu.dt,
        st: machine.cpu.st,
        stack: machine.cpu.stack.clone(),
        ram: machine.mem.ram.to_vec(),
        pixels: machine.display.snapshot(),
        rom: machine.rom.clone(),
        loaded: machine.loaded,
        cycle_accurate: machine.cycle_accurate,
        clock_hz: machine.clock_hz,
        budget_micros: machine.budget_micros,
        rng_state: machine.rng_state,
    }
}

/// Restore a captured state into the machine.
///
/// Rejects snapshots whose RAM or display size does not match this machine.
pub fn restore(machine: &mut Chip8, state: &SaveState) -> Result<(), String> {
    if state.ram.len() != RAM_SIZE {
        return Err(format!("snapshot RAM size {} does not match", state.ram.len()));
    }
    if state.pixels.len() != SCREEN_WIDTH * SCREEN_HEIGHT {
        return Err(format!("snapshot display size {} does not match", state.pixels.len()));
    }

    machine.cpu.v = state.v;
    machine.cpu.i = state.i;
    machine.cpu.pc = state.pc;
    machine.cpu.dt = state.dt;
    machine.cpu.st = state.st;
    machine.cpu.stack = state.stack.clone();
    machine.mem.ram.copy_from_slice(&state.ram);
    machine.rom = state.rom.clone();
    machine.loaded = state.loaded;
    machine.cycle_accurate = state.cycle_accurate;
    machine.clock_hz = state.clock_hz;
    machine.budget_micros = state.budget_micros;
    machine.rng_state = state.rng_state;
    machine.keys = [false; KEY_COUNT];
    machine.key_pressed = None;
    machine.display.load_pixels(&state.pixels);

    Ok(())
}

/// Encode a snapshot as a headed, compressed byte buffer.
pub fn to_bytes(state: &SaveState) -> Result<Vec<u8>, String> {
    let payload = bincode::serialize(state).map_err(|e| format!("serialize error: {e}"))?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(8 + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a snapshot buffer, verifying magic and version.
pub fn from_bytes(data: &[u8]) -> Result<SaveState, String> {
    if data.len() < 8 {
        return Err("snapshot buffer too small".into());
    }
    if &data[0..4] != MAGIC {
        return Err("invalid snapshot buffer (bad magic)".into());
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(format!(
            "unsupported snapshot version {version} (expected {FORMAT_VERSION})"
        ));
    }

    let payload = miniz_oxide::inflate::decompress_to_vec(&data[8..])
        .map_err(|e| format!("decompress error: {e:?}"))?;
    bincode::deserialize(&payload).map_err(|e| format!("deserialize error: {e}"))
}
