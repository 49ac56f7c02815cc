// Capsesc Output Layer
// Substitute key emission on the virtual device

mod emitter;

#[cfg(feature = "platform")]
mod uinput;

pub use emitter::{EmitError, Emitter, EventSink, OutputEvent};

#[cfg(feature = "platform")]
pub use uinput::{UInputError, VirtualKeyboard};
