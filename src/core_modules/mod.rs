pub mod geometry;
pub mod ground_truth;
pub mod group;
pub mod mesh_warp;
pub mod operation;
pub mod ops;
pub mod raster;
pub mod registry;
pub mod remap;
pub mod state;
