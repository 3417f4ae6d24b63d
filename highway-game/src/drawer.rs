use image::Rgb;
use pg::prelude::RgbFrame;

use crate::mechanics::{HighwayMechanics, Vehicle, LANES_COUNT, LANE_WIDTH, VEHICLE_LENGTH, VEHICLE_WIDTH};

pub const FRAME_SIZE_X: u32 = 600;
pub const FRAME_SIZE_Y: u32 = 150;

/// Pixels per meter
const SCALING: f32 = 5.5;
/// Relative frame position of the ego vehicle
const CENTERING_POSITION: (f32, f32) = (0.3, 0.5);

const STRIPE_LENGTH: f32 = 5.0;
const STRIPE_SPACING: f32 = 10.0;

const BACKGROUND: Rgb<u8> = Rgb([100, 100, 100]);
const LANE_MARKING: Rgb<u8> = Rgb([255, 255, 255]);
const EGO: Rgb<u8> = Rgb([50, 200, 0]);
const OTHER: Rgb<u8> = Rgb([100, 200, 255]);
const CRASHED: Rgb<u8> = Rgb([255, 100, 100]);
const OUTLINE: Rgb<u8> = Rgb([60, 60, 60]);

/// Draws a top view of the road around the ego vehicle
pub struct FrameDrawer {
    frame_size_x: u32,
    frame_size_y: u32,
}

impl Default for FrameDrawer {
    fn default() -> Self { Self::new(FRAME_SIZE_X, FRAME_SIZE_Y) }
}

impl FrameDrawer {
    pub fn new(
        frame_size_x: u32,
        frame_size_y: u32,
    ) -> Self {
        Self {
            frame_size_x,
            frame_size_y,
        }
    }

    pub fn draw(
        &self,
        mechanics: &HighwayMechanics,
    ) -> RgbFrame {
        let origin = mechanics.ego.position;
        let to_px = |x: f32, y: f32| -> (f32, f32) {
            (
                (x - origin.x) * SCALING + CENTERING_POSITION.0 * self.frame_size_x as f32,
                (y - origin.y) * SCALING + CENTERING_POSITION.1 * self.frame_size_y as f32,
            )
        };
        let to_world_x = |px: u32| px as f32 / SCALING - CENTERING_POSITION.0 * self.frame_size_x as f32 / SCALING + origin.x;

        let mut frame = RgbFrame::from_pixel(self.frame_size_x, self.frame_size_y, BACKGROUND);

        // lane borders: solid at the road edges, striped in between
        for border in 0..=LANES_COUNT {
            let (_, y) = to_px(0.0, (border as f32 - 0.5) * LANE_WIDTH);
            let y = y.round();
            if y < 0.0 || y >= self.frame_size_y as f32 {
                continue;
            }
            let solid = border == 0 || border == LANES_COUNT;
            for px in 0..self.frame_size_x {
                if solid || to_world_x(px).rem_euclid(STRIPE_LENGTH + STRIPE_SPACING) < STRIPE_LENGTH {
                    frame.put_pixel(px, y as u32, LANE_MARKING);
                }
            }
        }

        for other in &mechanics.others {
            self.draw_vehicle(&mut frame, other, OTHER, &to_px);
        }
        let ego_color = if mechanics.crashed() { CRASHED } else { EGO };
        self.draw_vehicle(&mut frame, &mechanics.ego, ego_color, &to_px);
        frame
    }

    fn draw_vehicle(
        &self,
        frame: &mut RgbFrame,
        vehicle: &Vehicle,
        color: Rgb<u8>,
        to_px: &impl Fn(f32, f32) -> (f32, f32),
    ) {
        let (min_x, min_y) = to_px(vehicle.position.x - VEHICLE_LENGTH / 2.0, vehicle.position.y - VEHICLE_WIDTH / 2.0);
        let (max_x, max_y) = to_px(vehicle.position.x + VEHICLE_LENGTH / 2.0, vehicle.position.y + VEHICLE_WIDTH / 2.0);
        let clip = |v: f32, len: u32| v.round().clamp(0.0, len as f32) as u32;
        let (x0, x1) = (clip(min_x, self.frame_size_x), clip(max_x, self.frame_size_x));
        let (y0, y1) = (clip(min_y, self.frame_size_y), clip(max_y, self.frame_size_y));
        for y in y0..y1 {
            for x in x0..x1 {
                let edge = x == x0 || x + 1 == x1 || y == y0 || y + 1 == y1;
                frame.put_pixel(x, y, if edge { OUTLINE } else { color });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_draws_ego_at_its_centering_position() {
        let mut mechanics = HighwayMechanics::new(&mut StdRng::seed_from_u64(1));
        mechanics.others.clear();
        let frame = FrameDrawer::default().draw(&mechanics);
        assert_eq!(frame.dimensions(), (FRAME_SIZE_X, FRAME_SIZE_Y));
        assert_eq!(*frame.get_pixel(180, 75), EGO);
        assert_eq!(*frame.get_pixel(FRAME_SIZE_X - 1, 75), BACKGROUND);
    }

    #[test]
    fn test_crashed_ego_color() {
        let mut mechanics = HighwayMechanics::new(&mut StdRng::seed_from_u64(1));
        mechanics.others.clear();
        mechanics.ego.crashed = true;
        let frame = FrameDrawer::default().draw(&mechanics);
        assert_eq!(*frame.get_pixel(180, 75), CRASHED);
    }

    #[test]
    fn test_road_edges_are_solid() {
        let mut mechanics = HighwayMechanics::new(&mut StdRng::seed_from_u64(1));
        mechanics.others.clear();
        // ego on lane 0: the left road edge is 2m above the frame center
        mechanics.ego = Vehicle::on_lane(0, 0.0, 20.0);
        let frame = FrameDrawer::default().draw(&mechanics);
        let edge_y = 75 - 11;
        assert!((0..FRAME_SIZE_X).all(|x| *frame.get_pixel(x, edge_y) == LANE_MARKING));
    }
}
