pub mod nal;
pub mod psi;

pub use nal::{FrameInfo, NalScanner};
pub use psi::{StreamAnalyzer, StreamInfo};
