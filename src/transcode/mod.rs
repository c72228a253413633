pub mod cmd;
pub mod invoker;

pub use cmd::{CommandRunner, FfmpegRunner};
pub use invoker::{verify_output, Codec, InvocationError, ToolOutput, TranscodeInvoker};
