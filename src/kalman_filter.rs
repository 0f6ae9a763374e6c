use nalgebra::{SMatrix, SVector};

use crate::detection::BBox;

/// Smallest width/height a predicted box may shrink to.
pub const MIN_EXTENT: f32 = 1.0;

/// Per-track motion estimator. `predict` is called once per frame for every
/// live track; `update` at most once per frame, only after a match.
pub trait MotionModel {
    /// Start a new estimate from the first observed box.
    fn initiate(bbox: &BBox) -> Self
    where
        Self: Sized;

    /// Advance one time step and return the predicted box.
    fn predict(&mut self) -> BBox;

    /// Fuse an observed box into the estimate.
    fn update(&mut self, observed: &BBox);

    /// Current box estimate.
    fn bbox(&self) -> BBox;

    /// Estimated velocity of the box center, in units per frame.
    fn velocity(&self) -> (f32, f32);

    /// Scalar summary of the positional uncertainty.
    fn uncertainty(&self) -> f32;
}

/// Kalman filter matrices for an 8-dimensional constant-velocity model.
///
/// State is (cx, cy, w, h, vx, vy, vw, vh); the measurement is (cx, cy, w, h).
/// Process and measurement noise scale with the current box size.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: SMatrix<f32, 8, 8>,
    update_mat: SMatrix<f32, 4, 8>,
    std_weight_position: f32,
    std_weight_velocity: f32,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    /// Initialize motion and update matrices.
    pub fn new() -> Self {
        let ndim = 4;
        let dt = 1.0;
        let mut motion_mat = SMatrix::<f32, 8, 8>::identity();
        for i in 0..ndim {
            motion_mat[(i, ndim + i)] = dt;
        }
        KalmanFilter {
            motion_mat,
            update_mat: SMatrix::<f32, 4, 8>::identity(),
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Create track state from measurement [cx, cy, w, h].
    pub fn initiate(&self, measurement: &SVector<f32, 4>) -> (SVector<f32, 8>, SMatrix<f32, 8, 8>) {
        let mut mean = SVector::<f32, 8>::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(measurement);
        let (w, h) = (measurement[2], measurement[3]);
        let p = 2.0 * self.std_weight_position;
        let v = 10.0 * self.std_weight_velocity;
        let std = SVector::<f32, 8>::from_column_slice(&[
            p * w,
            p * h,
            p * w,
            p * h,
            v * w,
            v * h,
            v * w,
            v * h,
        ]);
        let covariance = SMatrix::<f32, 8, 8>::from_diagonal(&std.component_mul(&std));
        (mean, covariance)
    }

    /// Predict step: x' = F x, P' = F P F^T + Q
    pub fn predict(
        &self,
        mean: &SVector<f32, 8>,
        covariance: &SMatrix<f32, 8, 8>,
    ) -> (SVector<f32, 8>, SMatrix<f32, 8, 8>) {
        let (w, h) = (mean[2], mean[3]);
        let p = self.std_weight_position;
        let v = self.std_weight_velocity;
        let q_vec = SVector::<f32, 8>::from_column_slice(&[
            p * w,
            p * h,
            p * w,
            p * h,
            v * w,
            v * h,
            v * w,
            v * h,
        ]);
        let q = SMatrix::<f32, 8, 8>::from_diagonal(&q_vec.component_mul(&q_vec));

        let new_mean = self.motion_mat * mean;
        let new_cov = self.motion_mat * covariance * self.motion_mat.transpose() + q;
        (new_mean, new_cov)
    }

    /// Measurement noise R for the current box size.
    fn measurement_noise(&self, mean: &SVector<f32, 8>) -> SMatrix<f32, 4, 4> {
        let (w, h) = (mean[2], mean[3]);
        let p = self.std_weight_position;
        let std = SVector::<f32, 4>::new(p * w, p * h, p * w, p * h);
        SMatrix::<f32, 4, 4>::from_diagonal(&std.component_mul(&std))
    }

    /// Project state to measurement space: z = Hx, S = H P H^T + R
    pub fn project(
        &self,
        mean: &SVector<f32, 8>,
        covariance: &SMatrix<f32, 8, 8>,
    ) -> (SVector<f32, 4>, SMatrix<f32, 4, 4>) {
        let r = self.measurement_noise(mean);
        let z_mean = self.update_mat * mean;
        let s_cov = self.update_mat * covariance * self.update_mat.transpose() + r;
        (z_mean, s_cov)
    }

    /// Update state with measurement: Kalman filter correction step
    pub fn update(
        &self,
        mean: &SVector<f32, 8>,
        covariance: &SMatrix<f32, 8, 8>,
        measurement: &SVector<f32, 4>,
    ) -> (SVector<f32, 8>, SMatrix<f32, 8, 8>) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        // S is symmetric, so K^T = S^-1 (H P)
        let hp = self.update_mat * covariance;
        let k_t = match projected_cov.cholesky() {
            Some(chol) => chol.solve(&hp),
            None => {
                // Regularize the diagonal and fall back to LU
                let s_regularized = projected_cov + SMatrix::<f32, 4, 4>::identity() * 1e-6;
                match s_regularized.lu().solve(&hp) {
                    Some(k_t) => k_t,
                    None => return (*mean, *covariance),
                }
            }
        };
        let k = k_t.transpose();

        let innovation = measurement - projected_mean;
        let new_mean = mean + k * innovation;

        // Joseph form keeps the covariance symmetric positive semi-definite
        let r = self.measurement_noise(mean);
        let i_kh = SMatrix::<f32, 8, 8>::identity() - k * self.update_mat;
        let new_cov = i_kh * covariance * i_kh.transpose() + k * r * k.transpose();

        (new_mean, new_cov)
    }
}

/// Constant-velocity Kalman estimate of one track's box.
#[derive(Debug, Clone)]
pub struct ConstantVelocity {
    kalman: KalmanFilter,
    /// Track state vector (cx, cy, w, h, vx, vy, vw, vh)
    mean: SVector<f32, 8>,
    /// Track covariance matrix
    covariance: SMatrix<f32, 8, 8>,
}

impl ConstantVelocity {
    /// Keep width and height positive; a collapsing extent stops shrinking.
    fn clamp_extent(&mut self) {
        for i in 2..4 {
            if !(self.mean[i] >= MIN_EXTENT) {
                self.mean[i] = MIN_EXTENT;
                if !(self.mean[i + 4] >= 0.0) {
                    self.mean[i + 4] = 0.0;
                }
            }
        }
    }
}

impl MotionModel for ConstantVelocity {
    fn initiate(bbox: &BBox) -> Self {
        let kalman = KalmanFilter::new();
        let (mean, covariance) = kalman.initiate(&bbox.to_cxcywh());
        let mut model = ConstantVelocity {
            kalman,
            mean,
            covariance,
        };
        model.clamp_extent();
        model
    }

    fn predict(&mut self) -> BBox {
        let (mean, covariance) = self.kalman.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
        self.clamp_extent();
        self.bbox()
    }

    fn update(&mut self, observed: &BBox) {
        let (mean, covariance) =
            self.kalman
                .update(&self.mean, &self.covariance, &observed.to_cxcywh());
        self.mean = mean;
        self.covariance = covariance;
        self.clamp_extent();
    }

    fn bbox(&self) -> BBox {
        BBox::from_center(self.mean[0], self.mean[1], self.mean[2], self.mean[3])
    }

    fn velocity(&self) -> (f32, f32) {
        (self.mean[4], self.mean[5])
    }

    fn uncertainty(&self) -> f32 {
        (0..4).map(|i| self.covariance[(i, i)]).sum()
    }
}
