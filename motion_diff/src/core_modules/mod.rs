pub mod baseline;
pub mod cluster_detector;
pub mod diff_algorithm;
pub mod frame;
pub mod grid_manager;
pub mod mask;
pub mod pixel;
pub mod visualizer;

pub mod utils {
    pub mod image_helper;
}
