//! # kdforest
//!
//! `kdforest` builds forests of randomized k-d trees for approximate and exact
//! nearest-neighbor search, and packs them so that a separate, massively
//! parallel search routine can run on another memory space (a GPU, a WebGPU
//! buffer, a worker).
//!
//! ## Features
//!
//! - **Randomized splits**: each node splits on one of the highest-variance
//!   dimensions, estimated from a small sample, at the sampled mean.
//! - **Arena packing**: all nodes of all trees live in one pre-sized block and
//!   reference each other by ordinal, so the block can be copied as is.
//! - **Transfer contract**: a validated packed view plus the root ordinals is
//!   all a device needs. [`EmulatedDevice`] runs a reference kernel in host
//!   memory.
//! - **WASM-ready**: packed forests can be built from JavaScript.
//!
//! ## Main Interface
//!
//! [`KdForest`] builds the trees; [`KdTreeDeviceIndex`] ties building,
//! transfer, search and teardown together.

mod arena;
mod device;
mod distance;
mod error;
mod forest;
mod index;
mod matrix;
mod node;
mod params;
pub mod split;
mod tree;
mod wasm;

pub use arena::Arena;
pub use device::Device;
pub use device::DeviceForest;
pub use device::EmulatedDevice;
pub use device::KnnResult;
pub use device::NO_NEIGHBOR;
pub use distance::Distance;
pub use error::ForestError;
pub use forest::KdForest;
pub use forest::ForestStats;
pub use forest::forest_capacity;
pub use index::KdTreeDeviceIndex;
pub use matrix::PointMatrix;
pub use node::KdNode;
pub use node::NO_CHILD;
pub use params::HostRetention;
pub use params::IndexParams;
pub use params::SearchParams;
pub use split::SplitScratch;
pub use tree::TreeBuilder;
pub use wasm::ForestIndex;
pub use wasm::PackedForest;
