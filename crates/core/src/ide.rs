//! IDE session facade.
//!
//! The one object a frontend holds: it owns the editor's source text, the
//! most recent ROM image, and the background [`Runner`]. Editors, file
//! pickers, and keypads all talk to the core through these operations —
//! nothing else in the crate is aware a frontend exists.
//!
//! Source text and ROM travel in both directions: `assemble` turns the
//! editor buffer into a ROM and loads it, `import_rom` disassembles an
//! external ROM back into the editor buffer.

use crate::asm::{self, ParseError};
use crate::runner::{DisplayCallback, Runner, SoundCallback};
use crate::{disasm, Chip8};

/// An IDE editing/execution session.
pub struct Ide {
    code: String,
    rom: Vec<u8>,
    runner: Runner,
}

impl Ide {
    /// Create a session. `on_display` receives a framebuffer snapshot per
    /// executed frame, `on_sound` the tone on/off transitions.
    pub fn new(on_display: DisplayCallback, on_sound: SoundCallback) -> Self {
        Ide {
            code: String::new(),
            rom: Vec::new(),
            runner: Runner::new(Chip8::new(), on_display, on_sound),
        }
    }

    /// Load assembly source into the session, replacing the editor buffer.
    pub fn load(&mut self, text: &str) {
        self.runner.stop();
        self.code = text.to_string();
        self.reset();
    }

    /// Import an external ROM: load it into the machine and disassemble it
    /// into the editor buffer.
    pub fn import_rom(&mut self, bytes: &[u8]) {
        self.runner.stop();
        self.rom = bytes.to_vec();
        self.code = disasm::disassemble(bytes);
        self.runner.with_machine(|m| m.load(bytes));
    }

    /// Current editor buffer.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Replace the editor buffer without touching the machine.
    pub fn update(&mut self, code: &str) {
        self.code = code.to_string();
    }

    /// Assemble the editor buffer and load the result into the machine.
    /// On error nothing changes; the error carries its source line.
    pub fn assemble(&mut self) -> Result<Vec<u8>, ParseError> {
        let rom = asm::assemble(&self.code)?;
        self.rom = rom.clone();
        self.runner.with_machine(|m| m.load(&rom));
        Ok(rom)
    }

    /// Bytes of the most recently assembled or imported ROM.
    pub fn export(&self) -> Vec<u8> {
        self.rom.clone()
    }

    /// Editor buffer for saving as an assembly file.
    pub fn save(&self) -> String {
        self.code.clone()
    }

    /// Pause into the start state.
    pub fn reset(&mut self) {
        self.runner.pause(true);
        self.runner.with_machine(|m| m.reset());
    }

    pub fn pause(&mut self, flag: bool) {
        self.runner.pause(flag);
    }

    pub fn stop(&mut self) {
        self.runner.stop();
    }

    pub fn paused(&self) -> bool {
        self.runner.paused()
    }

    /// Forward one key transition from the frontend's input layer.
    pub fn set_key(&self, index: usize, pressed: bool) {
        self.runner.set_key(index, pressed);
    }

    pub fn set_clock_rate(&mut self, hz: u32) -> Result<(), String> {
        self.runner.with_machine(|m| m.set_clock_rate(hz))
    }

    /// Toggle cycle-accurate timing; pauses and resets the machine.
    pub fn set_timing_mode(&mut self, cycle_accurate: bool) {
        self.runner.pause(true);
        self.runner.with_machine(|m| m.set_timing_mode(cycle_accurate));
    }

    /// Run a closure against the machine, e.g. for debugger views.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut Chip8) -> R) -> R {
        self.runner.with_machine(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Ide {
        Ide::new(Box::new(|_| {}), Box::new(|_| {}))
    }

    #[test]
    fn test_assemble_loads_machine() {
        let mut ide = session();
        ide.load("ld v0, #42\nret");
        let rom = ide.assemble().unwrap();
        assert_eq!(rom, vec![0x60, 0x42, 0x00, 0xEE]);
        assert_eq!(ide.export(), rom);
        assert!(ide.with_machine(|m| m.loaded()));
        assert_eq!(ide.with_machine(|m| m.mem.read(0x200)), 0x60);
    }

    #[test]
    fn test_assemble_error_keeps_previous_rom() {
        let mut ide = session();
        ide.load("cls");
        let first = ide.assemble().unwrap();
        ide.update("bogus line");
        let err = ide.assemble().unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(ide.export(), first);
    }

    #[test]
    fn test_import_rom_disassembles_into_editor() {
        let mut ide = session();
        ide.import_rom(&[0x60, 0x05, 0x00, 0xEE]);
        assert!(ide.code().contains("LD V0, #5"));
        // the imported program is executable right away
        assert!(ide.with_machine(|m| m.loaded()));
    }

    #[test]
    fn test_import_then_assemble_round_trips() {
        let rom = vec![0x60, 0x05, 0x12, 0x02];
        let mut ide = session();
        ide.import_rom(&rom);
        assert_eq!(ide.assemble().unwrap(), rom);
    }

    #[test]
    fn test_save_returns_editor_buffer() {
        let mut ide = session();
        ide.load("cls ; wipe");
        assert_eq!(ide.save(), "cls ; wipe");
    }

    #[test]
    fn test_clock_rate_validation_propagates() {
        let mut ide = session();
        assert!(ide.set_clock_rate(0).is_err());
        assert!(ide.set_clock_rate(700).is_ok());
    }

    #[test]
    fn test_timing_mode_switch_pauses() {
        let mut ide = session();
        ide.load("jp start\nstart: cls");
        ide.assemble().unwrap();
        ide.pause(false);
        ide.set_timing_mode(true);
        assert!(ide.paused());
        assert!(ide.with_machine(|m| m.cycle_accurate()));
    }
}
