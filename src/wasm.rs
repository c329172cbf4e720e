use wasm_bindgen::prelude::*;

use crate::device::{DeviceForest, EmulatedDevice, NO_NEIGHBOR};
use crate::error::ForestError;
use crate::forest::KdForest;
use crate::index::KdTreeDeviceIndex;
use crate::matrix::PointMatrix;
use crate::params::{IndexParams, SearchParams};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_rayon::init_thread_pool;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init_threads(n: usize) -> js_sys::Promise {
    init_thread_pool(n)
}

/// A packed forest handed to JavaScript, e.g. for upload into a WebGPU buffer.
///
/// `nodes` holds `nodeCount` records of `stride` bytes each: an `f64`
/// threshold followed by `u32` split dimension (or point index for leaves),
/// `u32` first child, `u32` second child and 4 padding bytes. Leaves have
/// both children set to `0xFFFFFFFF`.
#[wasm_bindgen]
pub struct PackedForest {
    nodes: Vec<u8>,
    roots: Vec<u32>,
    stride: usize,
}

#[wasm_bindgen]
impl PackedForest {
    /// Builds `trees` randomized trees over a flat point array with `cols`
    /// coordinates per point.
    pub fn build(points: &[f64], cols: usize, trees: usize, seed: Option<u64>) -> Result<PackedForest, JsError> {
        let points = PointMatrix::from_flat(points, cols)?;
        let params = IndexParams { trees, seed, ..Default::default() };
        let forest = KdForest::build_parallel(&points, &params)?;
        let snapshot = DeviceForest::from_forest(&forest)?;
        Ok(PackedForest {
            nodes: snapshot.node_bytes().to_vec(),
            roots: snapshot.roots().to_vec(),
            stride: snapshot.stride(),
        })
    }

    #[wasm_bindgen(getter)]
    pub fn nodes(&self) -> Vec<u8> {
        self.nodes.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn roots(&self) -> Vec<u32> {
        self.roots.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[wasm_bindgen(getter, js_name = nodeCount)]
    pub fn node_count(&self) -> usize {
        self.nodes.len() / self.stride
    }
}

/// Nearest-neighbor index backed by the emulated device.
#[wasm_bindgen]
pub struct ForestIndex {
    inner: KdTreeDeviceIndex<EmulatedDevice>,
}

#[wasm_bindgen]
impl ForestIndex {
    #[wasm_bindgen(constructor)]
    pub fn new(trees: usize, seed: Option<u64>) -> Result<ForestIndex, JsError> {
        let params = IndexParams { trees, seed, ..Default::default() };
        Ok(ForestIndex {
            inner: KdTreeDeviceIndex::new(params, EmulatedDevice::new())?,
        })
    }

    pub fn build(&mut self, points: &[f64], cols: usize) -> Result<(), JsError> {
        let points = PointMatrix::from_flat(points, cols)?;
        self.inner.build_index(&points)?;
        Ok(())
    }

    /// Indices of the `knn` nearest points per query, row-major. Missing
    /// neighbors are reported as `0xFFFFFFFF`.
    pub fn knn(&self, queries: &[f64], knn: usize, checks: usize) -> Result<Vec<u32>, JsError> {
        Ok(self.neighbors(queries, knn, checks)?)
    }

    #[wasm_bindgen(js_name = freeIndex)]
    pub fn free_index(&mut self) {
        self.inner.free_index();
    }

    #[wasm_bindgen(getter, js_name = isOnDevice)]
    pub fn is_on_device(&self) -> bool {
        self.inner.is_on_device()
    }
}

impl ForestIndex {
    fn neighbors(&self, queries: &[f64], knn: usize, checks: usize) -> Result<Vec<u32>, ForestError> {
        // The query width is only known once an index is resident.
        if !self.inner.is_on_device() {
            return Err(ForestError::NotOnDevice);
        }
        let queries = PointMatrix::from_flat(queries, self.inner.dim())?;
        let search = SearchParams { checks, ..Default::default() };
        let result = self.inner.knn_search(&queries, knn, &search)?;
        Ok(result
            .indices
            .iter()
            .map(|&i| if i == NO_NEIGHBOR { u32::MAX } else { i as u32 })
            .collect())
    }
}
