pub mod algorithm_registry;
pub mod detection;
pub mod detector;
pub mod frame_stats;
pub mod image_ops;
pub mod options;
pub mod overlay;
pub mod proximity;
