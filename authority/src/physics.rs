use crate::config::{BodyConfig, LaunchConfig};
use rand::Rng;
use shared::Vec3;

/// Initial motion of a thrown bottle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Launch {
    pub velocity: Vec3,
    ///Rotation vector in radians per second.
    pub angular_velocity: Vec3,
}

///Maps a device acceleration to the bottle's launch velocity and spin.
///The only randomness is the sideways tilt of the spin axis.
pub fn derive_launch<R: Rng + ?Sized>(accel: Vec3, config: &LaunchConfig, rng: &mut R) -> Launch {
    let magnitude = accel.magnitude();

    let upward = (config.base_upward + magnitude * config.upward_multiplier)
        .clamp(config.base_upward, config.max_vertical.max(config.base_upward));

    let planar = accel
        .horizontal()
        .scale(config.horizontal_scale * config.accel_to_vel_scale);
    let horizontal = if planar.magnitude() > config.max_horizontal {
        planar.normalize().scale(config.max_horizontal.max(0.0))
    } else {
        planar
    };

    let half_range = config.random_range / 2.0;
    let tilt = if half_range > 0.0 {
        rng.gen_range(-half_range..half_range)
    } else {
        0.0
    };

    Launch {
        velocity: Vec3::new(horizontal.x, upward, horizontal.z),
        angular_velocity: Vec3::new(
            config.base_rotation + magnitude * config.rotation_multiplier,
            accel.x * config.random_range,
            tilt,
        ),
    }
}

/// What the judge observes about the body after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySample {
    pub grounded: bool,
    pub up: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

///A bottle reduced to its bottom point and its up axis.
///
///The body flies ballistically with drag, bounces on the ground plane at
///height 0, and once on the ground rotates toward standing upright or lying
///on its side depending on how far it is tipped.
#[derive(Debug, Clone)]
pub struct BottleBody {
    config: BodyConfig,
    ///Position of the bottom of the bottle. The ground is `y == 0`.
    pub position: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    ///Unit vector along the bottle from bottom to cap.
    pub up: Vec3,
    settle_velocity: Vec3,
}

impl BottleBody {
    ///Creates a body standing still on the ground.
    pub fn new(config: BodyConfig) -> Self {
        Self {
            config,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            up: Vec3::UP,
            settle_velocity: Vec3::ZERO,
        }
    }

    ///Resets the body upright at spawn height with the given motion.
    pub fn launch(&mut self, launch: &Launch) {
        self.position = Vec3::new(0.0, self.config.spawn_height, 0.0);
        self.velocity = launch.velocity;
        self.angular_velocity = launch.angular_velocity;
        self.up = Vec3::UP;
        self.settle_velocity = Vec3::ZERO;
    }

    ///Places the body motionless at `height` with the given orientation.
    pub fn drop_from(&mut self, height: f32, up: Vec3) {
        self.position = Vec3::new(0.0, height, 0.0);
        self.velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        let up = up.normalize();
        self.up = if up == Vec3::ZERO { Vec3::UP } else { up };
        self.settle_velocity = Vec3::ZERO;
    }

    pub fn is_grounded(&self) -> bool {
        self.position.y < self.config.contact_threshold
    }

    ///Tilt from vertical in degrees.
    pub fn tilt_degrees(&self) -> f32 {
        self.up.angle_degrees_to(&Vec3::UP)
    }

    pub fn sample(&self) -> BodySample {
        BodySample {
            grounded: self.is_grounded(),
            up: self.up,
            linear_velocity: self.velocity,
            angular_velocity: self.angular_velocity.add(&self.settle_velocity),
        }
    }

    ///Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let c = &self.config;

        self.velocity.y -= c.gravity * dt;
        self.velocity = self.velocity.scale(decay(c.linear_drag, dt));
        self.angular_velocity = self.angular_velocity.scale(decay(c.angular_drag, dt));

        self.position = self.position.add(&self.velocity.scale(dt));
        self.up = self.up.rotate(&self.angular_velocity.scale(dt)).normalize();

        if self.position.y > 0.0 {
            return;
        }

        // Ground contact
        self.position.y = 0.0;
        if self.velocity.y < 0.0 {
            let bounce = -self.velocity.y * c.restitution;
            self.velocity.y = if bounce < c.rest_speed { 0.0 } else { bounce };
        }

        let friction = decay(c.ground_friction, dt);
        self.velocity.x = snap(self.velocity.x * friction);
        self.velocity.z = snap(self.velocity.z * friction);

        self.angular_velocity = self
            .angular_velocity
            .scale(decay(c.ground_spin_damping, dt));
        if self.angular_velocity.magnitude() < 0.01 {
            self.angular_velocity = Vec3::ZERO;
        }

        self.settle(dt);
    }

    ///Turns the up axis toward upright, or toward the ground when tipped past
    ///the tip angle. The turn rate is exposed through the sampled angular
    ///velocity and holds until the next contact, so a bottle bouncing while
    ///it settles never reads as at rest.
    fn settle(&mut self, dt: f32) {
        let c = &self.config;
        let tilt = self.up.angle_to(&Vec3::UP);

        let target = if tilt <= c.tip_angle_degrees.to_radians() {
            Vec3::UP
        } else {
            let flat = self.up.horizontal().normalize();
            if flat == Vec3::ZERO {
                Vec3::new(1.0, 0.0, 0.0)
            } else {
                flat
            }
        };

        let remaining = self.up.angle_to(&target);
        if remaining < 1e-6 {
            self.settle_velocity = Vec3::ZERO;
            return;
        }

        let mut axis = self.up.cross(&target).normalize();
        if axis == Vec3::ZERO {
            axis = Vec3::new(0.0, 0.0, 1.0);
        }
        let turn = axis.scale(remaining * (c.settle_gain * dt).min(1.0));

        self.up = self.up.rotate(&turn).normalize();
        self.settle_velocity = turn.scale(1.0 / dt);
    }
}

///Multiplier that removes `rate` of a quantity per second over `dt`.
fn decay(rate: f32, dt: f32) -> f32 {
    (1.0 - rate * dt).max(0.0)
}

fn snap(value: f32) -> f32 {
    if value.abs() < 0.01 {
        0.0
    } else {
        value
    }
}
