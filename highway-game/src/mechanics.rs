use parry2d::na::{Isometry2, Vector2};
use parry2d::query;
use parry2d::shape::Cuboid;
use rand::Rng;

/// Lane 0 is the leftmost lane; lane centers are at `lane * LANE_WIDTH`
pub const LANES_COUNT: usize = 4;
pub const LANE_WIDTH: f32 = 4.0;

/// Physics ticks per simulated second
pub const SIMULATION_FREQUENCY: u32 = 15;

pub const VEHICLE_LENGTH: f32 = 5.0;
pub const VEHICLE_WIDTH: f32 = 2.0;

const VEHICLES_COUNT: usize = 20;
const VEHICLE_SPACING: (f32, f32) = (15.0, 45.0);
const OTHER_SPEED_RANGE: (f32, f32) = (21.0, 24.0);

/// Speeds the ego vehicle can be asked to hold via FASTER / SLOWER
pub const TARGET_SPEEDS: [f32; 3] = [20.0, 25.0, 30.0];
const INITIAL_TARGET_SPEED_INDEX: usize = 1;

/// Proportional gain of the ego speed controller [1/s]
const KP_SPEED: f32 = 1.0 / 0.6;
const MAX_ACCELERATION: f32 = 5.0;
const LATERAL_SPEED: f32 = 4.0;

// intelligent driver model of the other vehicles
const IDM_COMFORT_ACC_MAX: f32 = 3.0;
const IDM_COMFORT_ACC_MIN: f32 = -5.0;
const IDM_DISTANCE_WANTED: f32 = 5.0 + VEHICLE_LENGTH;
const IDM_TIME_WANTED: f32 = 1.5;
const IDM_DELTA: i32 = 4;

pub const COLLISION_REWARD: f32 = -1.0;
pub const RIGHT_LANE_REWARD: f32 = 0.1;
pub const HIGH_SPEED_REWARD: f32 = 0.4;
pub const REWARD_SPEED_RANGE: (f32, f32) = (20.0, 30.0);

/// High-level driving decisions of the ego vehicle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaAction {
    LaneLeft,
    Idle,
    LaneRight,
    Faster,
    Slower,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vehicle {
    /// x = longitudinal position along the road; y = lateral position
    pub position: Vector2<f32>,
    pub speed: f32,
    pub heading: f32,
    /// lane the vehicle is heading for
    pub target_lane: usize,
    pub target_speed: f32,
    pub crashed: bool,
}

impl Vehicle {
    pub fn on_lane(
        lane: usize,
        x: f32,
        speed: f32,
    ) -> Self {
        Self {
            position: Vector2::new(x, lane_center(lane)),
            speed,
            heading: 0.0,
            target_lane: lane,
            target_speed: speed,
            crashed: false,
        }
    }

    /// Lane the vehicle center is currently on
    pub fn lane(&self) -> usize {
        (self.position.y / LANE_WIDTH).round().clamp(0.0, (LANES_COUNT - 1) as f32) as usize
    }

    pub fn forward_speed(&self) -> f32 { self.speed * self.heading.cos() }

    fn pose(&self) -> Isometry2<f32> {
        Isometry2::new(self.position, self.heading)
    }

    pub fn collides_with(
        &self,
        other: &Vehicle,
    ) -> bool {
        let shape = Cuboid::new(Vector2::new(VEHICLE_LENGTH / 2.0, VEHICLE_WIDTH / 2.0));
        // cuboid vs cuboid is always supported
        query::intersection_test(&self.pose(), &shape, &other.pose(), &shape).unwrap_or(false)
    }

    /// Moves `dt` seconds forward with longitudinal acceleration `acceleration`,
    /// steering towards the center of the target lane
    fn proceed(
        &mut self,
        acceleration: f32,
        dt: f32,
    ) {
        if self.crashed {
            return;
        }
        self.speed = (self.speed + acceleration * dt).max(0.0);
        let lateral_offset = lane_center(self.target_lane) - self.position.y;
        let lateral_speed = (lateral_offset / dt).clamp(-LATERAL_SPEED, LATERAL_SPEED);
        self.heading = lateral_speed.atan2(self.speed.max(1.0));
        self.position += Vector2::new(self.speed * dt, lateral_speed * dt);
    }
}

pub fn lane_center(lane: usize) -> f32 { lane as f32 * LANE_WIDTH }

/// Linear map of `v` from range `x` to range `y`
fn lmap(
    v: f32,
    x: (f32, f32),
    y: (f32, f32),
) -> f32 {
    y.0 + (v - x.0) * (y.1 - y.0) / (x.1 - x.0)
}

/// A straight multi-lane highway with one controlled (ego) vehicle and surrounding traffic
#[derive(Clone, Debug)]
pub struct HighwayMechanics {
    pub ego: Vehicle,
    pub others: Vec<Vehicle>,
    target_speed_index: usize,
    /// simulated seconds since episode start
    pub time: f32,
}

impl HighwayMechanics {
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        let ego_lane = rng.gen_range(0..LANES_COUNT);
        let ego = Vehicle::on_lane(ego_lane, 0.0, TARGET_SPEEDS[INITIAL_TARGET_SPEED_INDEX]);

        let mut others = Vec::with_capacity(VEHICLES_COUNT);
        let mut x = ego.position.x;
        for _ in 0..VEHICLES_COUNT {
            x += rng.gen_range(VEHICLE_SPACING.0..VEHICLE_SPACING.1) / LANES_COUNT as f32 * 2.0;
            let lane = rng.gen_range(0..LANES_COUNT);
            let speed = rng.gen_range(OTHER_SPEED_RANGE.0..OTHER_SPEED_RANGE.1);
            let vehicle = Vehicle::on_lane(lane, x + VEHICLE_LENGTH * 2.0, speed);
            if !others.iter().any(|o: &Vehicle| o.lane() == lane && (o.position.x - vehicle.position.x).abs() < IDM_DISTANCE_WANTED) {
                others.push(vehicle);
            }
        }

        Self {
            ego,
            others,
            target_speed_index: INITIAL_TARGET_SPEED_INDEX,
            time: 0.0,
        }
    }

    pub fn crashed(&self) -> bool { self.ego.crashed }

    pub fn target_speed(&self) -> f32 { TARGET_SPEEDS[self.target_speed_index] }

    /// Applies a decision; lane changes off the road and speed changes beyond the speed range are ignored
    pub fn apply(
        &mut self,
        action: MetaAction,
    ) {
        let lane = self.ego.target_lane;
        match action {
            MetaAction::LaneLeft if lane > 0 => self.ego.target_lane = lane - 1,
            MetaAction::LaneRight if lane + 1 < LANES_COUNT => self.ego.target_lane = lane + 1,
            MetaAction::Faster => self.target_speed_index = (self.target_speed_index + 1).min(TARGET_SPEEDS.len() - 1),
            MetaAction::Slower => self.target_speed_index = self.target_speed_index.saturating_sub(1),
            MetaAction::LaneLeft | MetaAction::LaneRight | MetaAction::Idle => (),
        }
        self.ego.target_speed = self.target_speed();
    }

    /// Physically moves one tick of `1 / SIMULATION_FREQUENCY` seconds forward
    pub fn time_step(&mut self) {
        let dt = 1.0 / SIMULATION_FREQUENCY as f32;

        let accelerations: Vec<f32> = (0..self.others.len())
            .map(|i| self.idm_acceleration(i))
            .collect();
        for (vehicle, acceleration) in self.others.iter_mut().zip(accelerations) {
            vehicle.proceed(acceleration, dt);
        }
        let ego_acceleration = (KP_SPEED * (self.ego.target_speed - self.ego.speed)).clamp(-MAX_ACCELERATION, MAX_ACCELERATION);
        self.ego.proceed(ego_acceleration, dt);
        self.time += dt;

        if self.others.iter().any(|o| self.ego.collides_with(o)) {
            log::trace!("ego crashed at {:?}", self.ego.position);
            self.ego.crashed = true;
            self.ego.speed = 0.0;
        }
    }

    /// Applies `action` and simulates until the next decision at `policy_frequency`
    pub fn decision_step(
        &mut self,
        action: MetaAction,
        policy_frequency: u32,
    ) {
        self.apply(action);
        let ticks = (SIMULATION_FREQUENCY / policy_frequency).max(1);
        for _ in 0..ticks {
            self.time_step();
            if self.crashed() {
                break;
            }
        }
    }

    /// Acceleration of vehicle `idx` after the intelligent driver model, following the nearest vehicle ahead on its lane
    fn idm_acceleration(
        &self,
        idx: usize,
    ) -> f32 {
        let vehicle = &self.others[idx];
        let lane = vehicle.lane();
        let front = self.others.iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, o)| o)
            .chain(std::iter::once(&self.ego))
            .filter(|o| o.lane() == lane && o.position.x > vehicle.position.x)
            .min_by(|a, b| a.position.x.total_cmp(&b.position.x));

        let mut acceleration = IDM_COMFORT_ACC_MAX * (1.0 - (vehicle.speed / vehicle.target_speed).powi(IDM_DELTA));
        if let Some(front) = front {
            let gap = (front.position.x - vehicle.position.x - VEHICLE_LENGTH).max(0.1);
            let closing_speed = vehicle.speed - front.speed;
            let desired_gap = IDM_DISTANCE_WANTED
                + vehicle.speed * IDM_TIME_WANTED
                + vehicle.speed * closing_speed / (2.0 * (IDM_COMFORT_ACC_MAX * -IDM_COMFORT_ACC_MIN).sqrt());
            acceleration -= IDM_COMFORT_ACC_MAX * (desired_gap.max(0.0) / gap).powi(2);
        }
        acceleration.clamp(-MAX_ACCELERATION * 2.0, IDM_COMFORT_ACC_MAX)
    }

    /// Reward of the current state normalized to `[0, 1]`:
    /// fast driving on the right lanes without collision
    pub fn reward(&self) -> f32 {
        let collision = if self.crashed() { 1.0 } else { 0.0 };
        let right_lane = self.ego.target_lane as f32 / (LANES_COUNT - 1) as f32;
        let high_speed = lmap(self.ego.forward_speed(), REWARD_SPEED_RANGE, (0.0, 1.0)).clamp(0.0, 1.0);
        let reward = COLLISION_REWARD * collision + RIGHT_LANE_REWARD * right_lane + HIGH_SPEED_REWARD * high_speed;
        lmap(reward, (COLLISION_REWARD, HIGH_SPEED_REWARD + RIGHT_LANE_REWARD), (0.0, 1.0))
    }
}
