use crate::Result;
use ndarray::*;
use ndarray_linalg::*;

/// Process noise variance placed on the diagonal of the motion covariance.
pub const PROCESS_NOISE: f32 = 1e-4;
/// Measurement noise variance placed on the diagonal of the innovation covariance.
pub const MEASUREMENT_NOISE: f32 = 1e-1;
/// Diagonal of the error covariance a new state starts with.
pub const INITIAL_ERROR: f32 = 1.0;

/**
A Kalman filter for tracking a single point in normalized image space.

The 4-dimensional state space:
    x, y, vx, vy
contains the point position (x, y) and its velocity per processed frame.

Object motion follows a constant velocity model. The position (x, y) is taken as direct observation of the state space (linear observation model), velocity is never measured.
*/
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f32>,
    update_mat: Array2<f32>,
    process_noise: f32,
    measurement_noise: f32,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    /// Returns a new KalmanFilter
    pub fn new() -> KalmanFilter {
        let ndim = 2;

        // Create Kalman filter model matrices and set initial values
        let mut motion_mat = Array2::from_diag(&Array1::<f32>::ones(2 * ndim));
        for i in 0..ndim {
            motion_mat[[i, ndim + i]] = 1.0;
        }

        let update_mat = concatenate!(
            Axis(1),
            Array2::from_diag(&Array1::<f32>::ones(ndim)),
            Array2::zeros((ndim, ndim))
        );

        KalmanFilter {
            motion_mat,
            update_mat,
            process_noise: PROCESS_NOISE,
            measurement_noise: MEASUREMENT_NOISE,
        }
    }

    /// Set process_noise
    pub fn with_process_noise(&mut self, process_noise: f32) -> &mut Self {
        self.process_noise = process_noise;
        self
    }

    /// Set measurement_noise
    pub fn with_measurement_noise(&mut self, measurement_noise: f32) -> &mut Self {
        self.measurement_noise = measurement_noise;
        self
    }

    /// Create a state from a first measurement.
    ///
    /// # Arguments
    ///
    /// - `measurement`: The 2 dimensional position `(x, y)`.
    ///
    /// # Returns
    ///
    /// A tuple with the following two entries of the new state:
    /// - The mean vector (4 dimensional).
    /// - The covariance matrix (4x4 dimensional).
    ///
    /// Unobserved velocities are initialized to 0 mean.
    pub fn initiate(&self, measurement: &Array1<f32>) -> (Array1<f32>, Array2<f32>) {
        let mean_vel = Array1::<f32>::zeros(measurement.raw_dim());
        let mean = concatenate![Axis(0), measurement.view(), mean_vel];
        let covariance = Array2::from_diag(&Array1::from_elem(4, INITIAL_ERROR));

        (mean, covariance)
    }

    /// Run Kalman filter prediction step.
    ///
    /// # Arguments
    ///
    /// - `mean`: The 4 dimensional mean vector of the state at the previous time step.
    /// - `covariance`: The 4x4 dimensional covariance matrix of the state at the previous time step.
    ///
    /// # Returns
    ///
    /// A tuple with the following two entries of the predicted state:
    /// - The mean vector (4 dimensional).
    /// - The covariance matrix (4x4 dimensional).
    pub fn predict(
        &self,
        mean: &Array1<f32>,
        covariance: &Array2<f32>,
    ) -> (Array1<f32>, Array2<f32>) {
        let motion_cov = Array2::from_diag(&Array1::from_elem(4, self.process_noise));

        let mean = self.motion_mat.dot(mean);
        let covariance = self.motion_mat.dot(covariance).dot(&self.motion_mat.t()) + motion_cov;

        (mean, covariance)
    }

    /// Project state distribution to measurement space.
    ///
    /// # Arguments
    ///
    /// - `mean`: The state's mean vector (4 dimensional array).
    /// - `covariance`: The state's covariance matrix (4x4 dimensional).
    ///
    /// # Returns
    ///
    /// A tuple with the following two entries of the given state estimate:
    /// - The mean vector (2 dimensional).
    /// - The covariance matrix (2x2 dimensional).
    pub fn project(
        &self,
        mean: &Array1<f32>,
        covariance: &Array2<f32>,
    ) -> (Array1<f32>, Array2<f32>) {
        let innovation_cov = Array2::from_diag(&Array1::from_elem(2, self.measurement_noise));

        let mean = self.update_mat.dot(mean);
        let covariance = self.update_mat.dot(covariance).dot(&self.update_mat.t()) + innovation_cov;

        (mean, covariance)
    }

    /// Run Kalman filter correction step.
    ///
    /// # Arguments
    ///
    /// - `mean`: The predicted state's mean vector (4 dimensional array).
    /// - `covariance`: The predicted state's covariance matrix (4x4 dimensional).
    /// - `measurement`: The 2 dimensional measurement vector `(x, y)`.
    ///
    /// # Returns
    ///
    /// A tuple with the following two entries of the measurement-corrected state distribution:
    /// - The mean vector (4 dimensional).
    /// - The covariance matrix (4x4 dimensional).
    pub fn update(
        &self,
        mean: &Array1<f32>,
        covariance: &Array2<f32>,
        measurement: &Array1<f32>,
    ) -> Result<(Array1<f32>, Array2<f32>)> {
        let (projected_mean, projected_cov) = &self.project(mean, covariance);

        let cholesky_factor = projected_cov.factorizec(UPLO::Lower)?;

        let covariance_dot = covariance.dot(&self.update_mat.t());
        let mut kalman_gain = Array2::<f32>::zeros((0, 2));
        for i in 0..covariance_dot.nrows() {
            kalman_gain.push_row(cholesky_factor.solvec(&covariance_dot.row(i))?.view())?;
        }

        let innovation = measurement - projected_mean;

        let new_mean = mean + innovation.dot(&kalman_gain.t());
        let new_covariance = covariance - kalman_gain.dot(projected_cov).dot(&kalman_gain.t());

        Ok((new_mean, new_covariance))
    }
}
