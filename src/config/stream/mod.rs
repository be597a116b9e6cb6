mod event;
mod line;

pub use event::{EventPayload, InstallEvent};
pub use line::{StreamLine, StreamSource};
