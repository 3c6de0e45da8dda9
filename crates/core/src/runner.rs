//! Background execution worker.
//!
//! One dedicated thread owns the machine's run loop and is its exclusive
//! mutator while running. Each 60 Hz tick executes one
//! [`Chip8::run_frame`], then publishes a display snapshot and any
//! sound-state transition through the callbacks — always a consistent
//! post-decode state, never a display mid-mutation.
//!
//! Cancellation is cooperative: the worker checks its liveness flag once
//! per tick, so a frame (and therefore a decode step) always completes
//! before pause or stop take effect. The only cross-thread input is the
//! atomic [`Keypad`], sampled at the top of each frame.
//!
//! Like the machine it drives, pausing tears the worker thread down and
//! unpausing spawns a fresh one; the callbacks and sound state live in the
//! shared block so they survive across workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::keypad::Keypad;
use crate::{Chip8, FRAME_RATE};

/// Receives a framebuffer snapshot after every executed frame.
pub type DisplayCallback = Box<dyn FnMut(&[bool]) + Send>;
/// Receives `true`/`false` when the sound timer starts/stops running.
pub type SoundCallback = Box<dyn FnMut(bool) + Send>;

struct Callbacks {
    on_display: DisplayCallback,
    on_sound: SoundCallback,
    /// Last published sound state, for edge detection across workers.
    sound_on: bool,
}

struct Shared {
    machine: Mutex<Chip8>,
    keypad: Keypad,
    running: AtomicBool,
    callbacks: Mutex<Callbacks>,
}

/// Drives a [`Chip8`] from a worker thread with pause/stop control.
pub struct Runner {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Runner {
    /// Wrap a machine for background execution. The runner starts paused.
    pub fn new(machine: Chip8, on_display: DisplayCallback, on_sound: SoundCallback) -> Self {
        Runner {
            shared: Arc::new(Shared {
                machine: Mutex::new(machine),
                keypad: Keypad::new(),
                running: AtomicBool::new(false),
                callbacks: Mutex::new(Callbacks { on_display, on_sound, sound_on: false }),
            }),
            worker: None,
        }
    }

    /// Pause or resume the run loop. Resuming spawns a fresh worker;
    /// pausing requests cooperative termination and joins it.
    pub fn pause(&mut self, flag: bool) {
        if flag {
            self.halt_worker();
        } else if self.worker.is_none() {
            self.spawn_worker();
        }
    }

    /// Stop the run loop; equivalent to `pause(true)`.
    pub fn stop(&mut self) {
        self.halt_worker();
    }

    pub fn paused(&self) -> bool {
        self.worker.is_none()
    }

    /// Write one key switch; observed by the worker on the current or next
    /// frame.
    pub fn set_key(&self, index: usize, pressed: bool) {
        self.shared.keypad.set(index, pressed);
    }

    /// Run a closure against the machine. Blocks for at most one frame if
    /// the worker is mid-tick.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut Chip8) -> R) -> R {
        f(&mut lock(&self.shared.machine))
    }

    fn spawn_worker(&mut self) {
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        self.worker = Some(std::thread::spawn(move || worker_loop(shared)));
    }

    fn halt_worker(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.halt_worker();
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn worker_loop(shared: Arc<Shared>) {
    let frame = Duration::from_nanos(1_000_000_000 / FRAME_RATE as u64);

    while shared.running.load(Ordering::SeqCst) {
        let started = Instant::now();

        let keys = shared.keypad.snapshot();
        let (pixels, sound) = {
            let mut machine = lock(&shared.machine);
            machine.run_frame(keys);
            (machine.display.snapshot(), machine.sound_on())
        };

        {
            let mut callbacks = lock(&shared.callbacks);
            (callbacks.on_display)(&pixels);
            if sound != callbacks.sound_on {
                callbacks.sound_on = sound;
                (callbacks.on_sound)(sound);
            }
        }

        spin_sleep::sleep(frame.saturating_sub(started.elapsed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_runner(rom: &[u8]) -> (Runner, Arc<AtomicUsize>) {
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&frames);
        let mut machine = Chip8::new();
        machine.load(rom);
        let runner = Runner::new(
            machine,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(|_| {}),
        );
        (runner, frames)
    }

    #[test]
    fn test_starts_paused() {
        let (runner, frames) = counting_runner(&[0x12, 0x00]);
        assert!(runner.paused());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(frames.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unpause_runs_frames_and_pause_halts() {
        let (mut runner, frames) = counting_runner(&[0x12, 0x00]);
        runner.pause(false);
        assert!(!runner.paused());
        std::thread::sleep(Duration::from_millis(120));
        runner.pause(true);
        let seen = frames.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected frames to run, saw {seen}");
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(frames.load(Ordering::SeqCst), seen, "paused runner kept going");
    }

    #[test]
    fn test_machine_state_advances_under_worker() {
        let (mut runner, _) = counting_runner(&[0x70, 0x01, 0x12, 0x00]);
        runner.pause(false);
        std::thread::sleep(Duration::from_millis(120));
        runner.stop();
        let count = runner.with_machine(|m| m.cpu.v[0]);
        assert!(count > 0);
    }

    #[test]
    fn test_sound_callback_fires_on_transition() {
        let sound_events = Arc::new(AtomicUsize::new(0));
        let events = Arc::clone(&sound_events);
        let mut machine = Chip8::new();
        // ST := 3 then spin
        machine.load(&[0x60, 0x03, 0xF0, 0x18, 0x12, 0x04]);
        let mut runner = Runner::new(
            machine,
            Box::new(|_| {}),
            Box::new(move |_| {
                events.fetch_add(1, Ordering::SeqCst);
            }),
        );
        runner.pause(false);
        std::thread::sleep(Duration::from_millis(250));
        runner.stop();
        // one on-transition and one off-transition
        assert!(sound_events.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_keypad_reaches_machine() {
        let (mut runner, _) = counting_runner(&[0xF5, 0x0A, 0x12, 0x02]);
        runner.pause(false);
        std::thread::sleep(Duration::from_millis(60));
        runner.set_key(0xA, true);
        std::thread::sleep(Duration::from_millis(100));
        runner.stop();
        assert_eq!(runner.with_machine(|m| m.cpu.v[5]), 0xA);
    }
}
