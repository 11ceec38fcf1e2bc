use arboard::Clipboard;
use passwatch_exposure::{ExposureError, SecretSink};
use tracing::debug;

/// System clipboard as a place to expose secrets.
#[derive(Debug, Default)]
pub struct ClipboardSink;

impl SecretSink for ClipboardSink {
    fn expose(&self, secret: &str) -> Result<(), ExposureError> {
        open()?.set_text(secret.to_owned()).map_err(sink_error)?;
        debug!("secret placed on clipboard");
        Ok(())
    }

    fn purge(&self) -> Result<(), ExposureError> {
        open()?.clear().map_err(sink_error)?;
        debug!("clipboard cleared");
        Ok(())
    }
}

/// Open a clipboard handle. On X11 the copied text is only served while at
/// least one handle is alive, so callers hold one for the exposure window.
pub fn open() -> Result<Clipboard, ExposureError> {
    Clipboard::new().map_err(sink_error)
}

fn sink_error(err: arboard::Error) -> ExposureError {
    ExposureError::Sink {
        reason: err.to_string(),
    }
}
