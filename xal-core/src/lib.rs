//! Source scheduler and playback state machine for `xal`.
//!
//! [`AudioManager`] owns every [`Category`], [`sound_buffer::SoundBuffer`]
//! and [`source::Source`] in a process; everything else refers to them by
//! [`ids::SoundId`]/[`ids::SourceId`] and resolves through the manager. The
//! manager drives two trait objects it never names concretely:
//! `xal_backend::MixerBackend` for the hardware/mixer side and
//! `xal_assets::Decoder` for codecs, so this crate has no dependency on
//! `cpal` or `symphonia` itself.

pub mod category;
pub mod config;
pub mod error;
pub mod ids;
pub mod manager;
pub mod sound_buffer;
pub mod source;

pub use category::Category;
pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use ids::{SoundId, SourceId};
pub use manager::{AudioManager, SoundInfo};
pub use source::Source;

use std::io;
use std::sync::Arc;

struct CallbackWriter(Arc<dyn Fn(&str) + Send + Sync>);

impl io::Write for CallbackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(line) = std::str::from_utf8(buf) {
            (self.0)(line.trim_end_matches('\n'));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct CallbackMakeWriter(Arc<dyn Fn(&str) + Send + Sync>);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CallbackMakeWriter {
    type Writer = CallbackWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CallbackWriter(self.0.clone())
    }
}

/// Compatibility shim for embedders that want a single `Fn(&str)` log sink
/// (matching spec.md §6's `Logger` interface) instead of configuring
/// `tracing` themselves: installs a `tracing_subscriber` formatter that
/// writes each record through `sink` as the process-wide default
/// subscriber. Only the first call in a process takes effect — `tracing`
/// allows exactly one global default — later calls are silently ignored.
pub fn set_log_function<F>(sink: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_writer(CallbackMakeWriter(Arc::new(sink)))
        .with_target(false)
        .without_time()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[test]
    fn callback_writer_strips_trailing_newline_and_forwards() {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let mut writer = CallbackWriter(Arc::new(move |line: &str| {
            captured.lock().unwrap().push(line.to_string());
        }));

        writer.write_all(b"xal-core: test message\n").unwrap();

        assert_eq!(lines.lock().unwrap().as_slice(), ["xal-core: test message"]);
    }
}
