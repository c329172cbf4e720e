use std::io::{Read, Write};

use log::{debug, error, info, warn};

use crate::device::{Device, DeviceForest, KnnResult};
use crate::error::ForestError;
use crate::forest::KdForest;
use crate::matrix::PointMatrix;
use crate::params::{HostRetention, IndexParams, SearchParams};

/// A randomized k-d forest index whose search runs on a [`Device`].
///
/// The lifecycle is strictly build, then transfer, then query. Building
/// again frees the previous forest first. The host arena and the device
/// buffers are released together by [`KdTreeDeviceIndex::free_index`], which
/// also runs on drop.
pub struct KdTreeDeviceIndex<D: Device> {
    params: IndexParams,
    device: D,
    forest: Option<KdForest>,
    on_device: bool,
    point_count: usize,
    dim: usize,
}

impl<D: Device> KdTreeDeviceIndex<D> {
    pub fn new(params: IndexParams, device: D) -> Result<Self, ForestError> {
        params.validate()?;
        Ok(KdTreeDeviceIndex {
            params,
            device,
            forest: None,
            on_device: false,
            point_count: 0,
            dim: 0,
        })
    }

    /// Builds the forest over `points` and makes it resident on the device.
    ///
    /// On error nothing stays allocated, on the host or on the device.
    pub fn build_index<T>(&mut self, points: &PointMatrix<'_, T>) -> Result<(), ForestError>
    where
        T: Copy + Into<f64>,
    {
        self.free_index();

        let forest = KdForest::build(points, &self.params)?;
        let snapshot = DeviceForest::from_forest(&forest)?;
        if let Err(e) = snapshot.transfer(points, &mut self.device) {
            error!("forest transfer failed: {}", e);
            return Err(e);
        }

        self.on_device = true;
        self.point_count = points.rows();
        self.dim = points.cols();
        info!(
            "index resident on device: {} trees, {} nodes, {} points",
            forest.tree_count(),
            forest.node_count(),
            self.point_count
        );

        match self.params.host_retention {
            HostRetention::Retain => self.forest = Some(forest),
            HostRetention::Release => debug!("releasing host arena of {} bytes", forest.arena().used_bytes()),
        }
        Ok(())
    }

    /// Releases the host arena and the device buffers.
    pub fn free_index(&mut self) {
        if self.on_device {
            debug!("freeing device-resident forest");
            self.device.release();
            self.on_device = false;
        }
        self.forest = None;
        self.point_count = 0;
        self.dim = 0;
    }

    pub fn is_on_device(&self) -> bool {
        self.on_device
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// The host copy of the forest, kept only under [`HostRetention::Retain`].
    pub fn host_forest(&self) -> Option<&KdForest> {
        self.forest.as_ref()
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Bytes held by the host arena.
    pub fn used_memory(&self) -> usize {
        self.forest.as_ref().map_or(0, |f| f.arena().used_bytes())
    }

    /// Finds the `knn` nearest points for every row of `queries` on the device.
    pub fn knn_search<T>(
        &self,
        queries: &PointMatrix<'_, T>,
        knn: usize,
        search: &SearchParams,
    ) -> Result<KnnResult, ForestError>
    where
        T: Copy + Into<f64>,
    {
        if !self.on_device {
            warn!("knn search on an index that is not resident on the device");
            return Err(ForestError::NotOnDevice);
        }
        if queries.cols() != self.dim {
            return Err(ForestError::DimensionMismatch { expected: self.dim, actual: queries.cols() });
        }
        if knn == 0 {
            return Err(ForestError::InvalidParams("knn must be at least 1".into()));
        }
        search.validate()?;
        self.device.knn_search(&queries.to_f64_vec(), knn, self.params.distance, search)
    }

    /// Host-side search is not implemented; queries go through [`Self::knn_search`].
    pub fn find_neighbors(&self, _query: &[f64], _knn: usize) -> Result<KnnResult, ForestError> {
        Err(ForestError::Unsupported("host-side search"))
    }

    pub fn save_index<W: Write>(&self, _stream: &mut W) -> Result<(), ForestError> {
        Err(ForestError::Unsupported("index saving"))
    }

    pub fn load_index<R: Read>(&mut self, _stream: &mut R) -> Result<(), ForestError> {
        Err(ForestError::Unsupported("index loading"))
    }
}

impl<D: Device> Drop for KdTreeDeviceIndex<D> {
    fn drop(&mut self) {
        if !self.on_device && self.forest.is_none() {
            return;
        }
        self.free_index();
    }
}

impl<D: Device> std::fmt::Debug for KdTreeDeviceIndex<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdTreeDeviceIndex")
            .field("params", &self.params)
            .field("on_device", &self.on_device)
            .field("host_forest", &self.forest.is_some())
            .field("point_count", &self.point_count)
            .field("dim", &self.dim)
            .finish()
    }
}
