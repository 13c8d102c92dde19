use serde::{Deserialize, Serialize};

///Represents a vector in 3D space.
///Axes follow the device convention: X right, Y up, Z forward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    #[serde(default)]
    pub x: f32,
    ///Positive direction is up.
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        self.dot(self).sqrt()
    }

    ///Returns the normalized vector, or zero for a zero-length vector.
    pub fn normalize(&self) -> Vec3 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec3::ZERO
        } else {
            self.scale(1.0 / mag)
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3 {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        self.add(&other.scale(-1.0))
    }

    pub fn dot(&self, other: &Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    ///Returns the unsigned angle between two vectors in radians.
    ///Zero-length inputs yield zero.
    pub fn angle_to(&self, other: &Vec3) -> f32 {
        let denom = self.magnitude() * other.magnitude();
        if denom == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(-1.0, 1.0).acos()
    }

    ///Returns the unsigned angle between two vectors in degrees.
    pub fn angle_degrees_to(&self, other: &Vec3) -> f32 {
        self.angle_to(other).to_degrees()
    }

    ///Rotates the vector by a rotation vector (axis scaled by angle in radians)
    ///using Rodrigues' formula.
    pub fn rotate(&self, rotation: &Vec3) -> Vec3 {
        let angle = rotation.magnitude();
        if angle == 0.0 {
            return *self;
        }
        let k = rotation.scale(1.0 / angle);
        let (sin, cos) = angle.sin_cos();
        self.scale(cos)
            .add(&k.cross(self).scale(sin))
            .add(&k.scale(k.dot(self) * (1.0 - cos)))
    }

    ///Returns the projection onto the horizontal (X/Z) plane.
    pub fn horizontal(&self) -> Vec3 {
        Vec3 {
            x: self.x,
            y: 0.0,
            z: self.z,
        }
    }
}
