//! Fusion black boxes used by virtual sensors
//!
//! A [`Fusion`] receives the latest event of every upstream (in the order
//! the virtual sensor declared them) and produces the values of one derived
//! event, or nothing. Gravity uses a complementary filter, attitude the
//! usual tilt-compensated compass solution.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use crate::event::{Event, SensorType};

/// Standard gravity in m/s^2
pub const STANDARD_GRAVITY: f32 = 9.806_65;

/// Fuse one set of upstream samples into one derived sample
pub trait Fusion: Send {
    /// `inputs[i]` is the latest event of upstream `i`; `trigger` is the
    /// index of the upstream whose event caused this call.
    fn fuse(&mut self, inputs: &[&Event], trigger: usize) -> Option<Vec<f32>>;

    /// Forget filter state, called when the virtual sensor stops
    fn reset(&mut self) {}
}

/// Upstream types a built-in virtual sensor subscribes to, in order
pub fn upstreams_for(sensor_type: SensorType) -> &'static [SensorType] {
    match sensor_type {
        SensorType::Gravity => &[SensorType::Accelerometer, SensorType::Gyroscope],
        SensorType::LinearAcceleration => &[SensorType::Accelerometer, SensorType::Gravity],
        SensorType::Orientation | SensorType::RotationVector => {
            &[SensorType::Accelerometer, SensorType::Magnetometer]
        }
        _ => &[],
    }
}

/// Built-in fusion for a virtual sensor type
pub fn fusion_for(sensor_type: SensorType) -> Option<Box<dyn Fusion>> {
    match sensor_type {
        SensorType::Gravity => Some(Box::new(GravityFusion::default())),
        SensorType::LinearAcceleration => Some(Box::new(LinearAccelerationFusion)),
        SensorType::Orientation => Some(Box::new(OrientationFusion)),
        SensorType::RotationVector => Some(Box::new(RotationVectorFusion)),
        _ => None,
    }
}

fn vec3(event: &Event) -> Option<Vector3<f32>> {
    match event.values.as_slice() {
        [x, y, z, ..] => Some(Vector3::new(*x, *y, *z)),
        _ => None,
    }
}

/// Gravity from accelerometer + gyroscope (complementary filter)
#[derive(Debug, Clone)]
pub struct GravityFusion {
    /// Weight of the gyro-propagated estimate, 0..1
    pub alpha: f32,
    gravity: Option<Vector3<f32>>,
    last_gyro_us: Option<u64>,
}

impl GravityFusion {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            gravity: None,
            last_gyro_us: None,
        }
    }
}

impl Default for GravityFusion {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl Fusion for GravityFusion {
    fn fuse(&mut self, inputs: &[&Event], trigger: usize) -> Option<Vec<f32>> {
        let accel = vec3(inputs.first()?)?;
        let gyro_event = inputs.get(1)?;
        let gyro = vec3(gyro_event)?.map(f32::to_radians);

        let dt = if trigger == 1 {
            let dt = self
                .last_gyro_us
                .map(|prev| gyro_event.timestamp_us.saturating_sub(prev) as f32 / 1e6)
                .unwrap_or(0.0);
            self.last_gyro_us = Some(gyro_event.timestamp_us);
            dt.min(0.1)
        } else {
            0.0
        };

        let predicted = match self.gravity {
            // Body-frame gravity turns opposite to the device rotation
            Some(g) => g - gyro.cross(&g) * dt,
            None => accel,
        };
        let blended = predicted * self.alpha + accel * (1.0 - self.alpha);
        let gravity = if blended.norm() > f32::EPSILON {
            blended.normalize() * STANDARD_GRAVITY
        } else {
            accel
        };
        self.gravity = Some(gravity);
        Some(vec![gravity.x, gravity.y, gravity.z])
    }

    fn reset(&mut self) {
        self.gravity = None;
        self.last_gyro_us = None;
    }
}

/// Linear acceleration from accelerometer - gravity
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearAccelerationFusion;

impl Fusion for LinearAccelerationFusion {
    fn fuse(&mut self, inputs: &[&Event], _trigger: usize) -> Option<Vec<f32>> {
        let accel = vec3(inputs.first()?)?;
        let gravity = vec3(inputs.get(1)?)?;
        let linear = accel - gravity;
        Some(vec![linear.x, linear.y, linear.z])
    }
}

/// Device-to-world rotation from gravity and the geomagnetic field.
///
/// Rows are east, north, up expressed in device coordinates.
fn rotation_matrix(accel: Vector3<f32>, mag: Vector3<f32>) -> Option<Matrix3<f32>> {
    let east = mag.cross(&accel);
    if east.norm() < 0.1 || accel.norm() < 0.1 {
        // free fall, or field parallel to gravity
        return None;
    }
    let east = east.normalize();
    let up = accel.normalize();
    let north = up.cross(&east);
    Some(Matrix3::from_rows(&[
        east.transpose(),
        north.transpose(),
        up.transpose(),
    ]))
}

/// Azimuth, pitch and roll in degrees from accelerometer + magnetometer
#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationFusion;

impl Fusion for OrientationFusion {
    fn fuse(&mut self, inputs: &[&Event], _trigger: usize) -> Option<Vec<f32>> {
        let r = rotation_matrix(vec3(inputs.first()?)?, vec3(inputs.get(1)?)?)?;
        let mut azimuth = r[(0, 1)].atan2(r[(1, 1)]).to_degrees();
        if azimuth < 0.0 {
            azimuth += 360.0;
        }
        let pitch = (-r[(2, 1)]).clamp(-1.0, 1.0).asin().to_degrees();
        let roll = (-r[(2, 0)]).atan2(r[(2, 2)]).to_degrees();
        Some(vec![azimuth, pitch, roll])
    }
}

/// Attitude quaternion `[x, y, z, w]` from accelerometer + magnetometer
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationVectorFusion;

impl Fusion for RotationVectorFusion {
    fn fuse(&mut self, inputs: &[&Event], _trigger: usize) -> Option<Vec<f32>> {
        let r = rotation_matrix(vec3(inputs.first()?)?, vec3(inputs.get(1)?)?)?;
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
        Some(vec![q.i, q.j, q.k, q.w])
    }
}
