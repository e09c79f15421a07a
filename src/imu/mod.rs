pub mod buffer;
pub mod sample;

pub use buffer::ImuBuffer;
pub use sample::ImuSample;
