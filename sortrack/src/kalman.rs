//! Linear Kalman filter on single-precision state.

use nalgebra::{DMatrix, DVector};

use crate::error::TrackError;

/// Model matrices handed to [`KalmanFilter::new`].
#[derive(Debug, Clone)]
pub struct KalmanFilterParams {
    /// Initial state
    pub x: DVector<f32>,
    /// Initial state covariance
    pub p: DMatrix<f32>,
    /// State transition matrix
    pub f: DMatrix<f32>,
    /// Observation matrix
    pub h: DMatrix<f32>,
    /// Observation noise covariance
    pub r: DMatrix<f32>,
    /// Process noise covariance
    pub q: DMatrix<f32>,
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    /// State vector
    pub x: DVector<f32>,
    /// State covariance matrix
    pub p: DMatrix<f32>,
    f: DMatrix<f32>,
    h: DMatrix<f32>,
    r: DMatrix<f32>,
    q: DMatrix<f32>,
}

impl KalmanFilter {
    pub fn new(params: KalmanFilterParams) -> Self {
        Self {
            x: params.x,
            p: params.p,
            f: params.f,
            h: params.h,
            r: params.r,
            q: params.q,
        }
    }

    /// Advance the state: x = F * x, P = F * P * F^T + Q.
    pub fn predict(&mut self) {
        self.x = &self.f * &self.x;
        self.p = &self.f * &self.p * self.f.transpose() + &self.q;
    }

    /// Fold a measurement into the state.
    ///
    /// K = P * H^T * (H * P * H^T + R)^-1, then x += K * (z - H * x) and
    /// P = (I - K * H) * P.
    pub fn update(&mut self, z: &DVector<f32>) -> Result<(), TrackError> {
        let y = z - &self.h * &self.x;
        let s = &self.h * &self.p * self.h.transpose() + &self.r;
        let s_inv = s.try_inverse().ok_or(TrackError::SingularInnovation)?;
        let k = &self.p * self.h.transpose() * s_inv;

        self.x += &k * y;
        let i = DMatrix::identity(self.x.len(), self.x.len());
        self.p = (i - &k * &self.h) * &self.p;
        Ok(())
    }

    /// Current state estimate.
    pub fn state(&self) -> &DVector<f32> {
        &self.x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn position_velocity_filter() -> KalmanFilter {
        KalmanFilter::new(KalmanFilterParams {
            x: DVector::from_vec(vec![0.0, 1.0]),
            p: DMatrix::from_diagonal(&DVector::from_vec(vec![1000.0, 1000.0])),
            f: DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
            h: DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            r: DMatrix::from_element(1, 1, 0.1),
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.01])),
        })
    }

    #[test]
    fn test_predict_advances_position() {
        let mut kf = position_velocity_filter();
        kf.predict();
        assert_abs_diff_eq!(kf.x[0], 1.0, epsilon = 0.001);
    }

    #[test]
    fn test_update_pulls_toward_measurement() {
        let mut kf = position_velocity_filter();
        kf.predict();
        kf.update(&DVector::from_vec(vec![0.9])).unwrap();
        // posterior sits between the prediction and the measurement
        assert!(kf.x[0] > 0.8 && kf.x[0] < 1.0);
    }

    #[test]
    fn test_singular_innovation_is_reported() {
        let mut kf = position_velocity_filter();
        kf.p = DMatrix::zeros(2, 2);
        kf.r = DMatrix::zeros(1, 1);
        let result = kf.update(&DVector::from_vec(vec![1.0]));
        assert_eq!(result, Err(TrackError::SingularInnovation));
    }
}
