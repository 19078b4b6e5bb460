//! Synthetic driving telemetry.
//!
//! The simulated car drives a slow circle: speed oscillates between roughly
//! 30 and 70 km/h, the engine speed follows it, and the heading turns a few
//! degrees per second. Position is integrated from speed and heading.

use std::time::Duration;

use tracing::{debug, info};

use crate::producer::Producer;

/// Idle engine speed.
const IDLE_RPM: f32 = 800.0;
/// Engine speed added per km/h of vehicle speed.
const RPM_PER_KMH: f32 = 35.0;
/// Heading change per simulated second.
const YAW_RATE_DEG: f32 = 3.0;

/// Stateful generator of telemetry frames.
#[derive(Debug, Clone)]
pub struct DriveSimulator {
    producer: Producer,
    elapsed: f32,
    x: f32,
    y: f32,
    yaw: f32,
}

/// One frame of simulated telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub speed_kmh: f32,
    pub rpm: u32,
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
}

impl DriveSimulator {
    pub fn new(producer: Producer) -> Self {
        Self {
            producer,
            elapsed: 0.0,
            x: 0.0,
            y: 0.0,
            yaw: 0.0,
        }
    }

    /// Advance the simulation by `dt` and return the next frame.
    pub fn advance(&mut self, dt: Duration) -> Frame {
        let dt = dt.as_secs_f32();
        self.elapsed += dt;

        let speed_kmh = 50.0 + 20.0 * (self.elapsed / 10.0).sin();
        self.yaw = (self.yaw + YAW_RATE_DEG * dt) % 360.0;

        let distance = speed_kmh / 3.6 * dt;
        let heading = self.yaw.to_radians();
        self.x += distance * heading.cos();
        self.y += distance * heading.sin();

        Frame {
            speed_kmh,
            rpm: (IDLE_RPM + speed_kmh * RPM_PER_KMH).round() as u32,
            x: self.x,
            y: self.y,
            yaw: self.yaw,
        }
    }

    /// Advance by `dt` and write the frame to the store.
    ///
    /// Each signal group is written on its own, so a client holding a lock
    /// on one signal only suppresses that signal. Returns how many groups
    /// were rejected.
    pub fn step(&mut self, dt: Duration) -> usize {
        let frame = self.advance(dt);
        let outcomes = [
            self.producer.update_vehicle_speed(frame.speed_kmh).map(|_| ()),
            self.producer.update_engine_rpm(frame.rpm).map(|_| ()),
            self.producer.update_vehicle_position(frame.x, frame.y, 0.0),
            self.producer.update_vehicle_orientation(frame.yaw).map(|_| ()),
        ];

        let mut rejected = 0;
        for err in outcomes.into_iter().filter_map(Result::err) {
            debug!("Simulator write skipped: {}", err);
            rejected += 1;
        }
        rejected
    }
}

/// Push a simulator frame every `period`, forever.
pub async fn run_demo(producer: Producer, period: Duration) {
    info!("Demo drive running every {:?}", period);

    let mut simulator = DriveSimulator::new(producer);
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        simulator.step(period);
    }
}
