// Forward `tracing` events to Godot's output.
//
// The core crate logs through `tracing`. Inside the editor or a game there is
// no terminal to read, so a fmt subscriber is installed whose writer hands
// each formatted line to `godot_print!`. Debug-level events (mapping changes,
// accepted sessions) only show when Godot runs with `--verbose`.

use std::io;

use godot::classes::Os;
use godot::prelude::*;
use tracing::Level;

struct GodotOutput;

impl io::Write for GodotOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        let line = line.trim_end();
        if !line.is_empty() {
            godot_print!("{line}");
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Install the subscriber. Safe to call more than once; only the first call
/// takes effect.
pub fn init() {
    let level = if Os::singleton().is_stdout_verbose() {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(|| GodotOutput)
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .try_init();
}
