pub mod buffer_ops;

pub use buffer_ops::remap_channels;
