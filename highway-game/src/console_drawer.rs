use std::io::Write;

use anyhow::Result;
use console_engine::pixel;
use console_engine::screen::Screen;

use crate::mechanics::{HighwayMechanics, LANES_COUNT};

/// Meters per console column
const METERS_PER_COLUMN: f32 = 2.0;
const COLUMNS: u32 = 100;
/// Columns shown behind the ego vehicle
const COLUMNS_BEHIND: u32 = 20;

/// Text rendering of the road around the ego vehicle: one row per lane, lane markings in between
pub struct ConsoleDrawer;

impl ConsoleDrawer {
    pub fn rows() -> u32 { LANES_COUNT as u32 * 2 + 1 }

    pub fn render_to_console(mechanics: &HighwayMechanics) -> Screen {
        let mut screen = Screen::new_empty(COLUMNS, Self::rows());
        screen.clear();

        for x in 0..COLUMNS as i32 {
            screen.set_pxl(x, 0, pixel::pxl('='));
            screen.set_pxl(x, Self::rows() as i32 - 1, pixel::pxl('='));
            if x % 3 == 0 {
                for lane in 1..LANES_COUNT as i32 {
                    screen.set_pxl(x, lane * 2, pixel::pxl('-'));
                }
            }
        }

        let column = |x: f32| -> Option<i32> {
            let col = ((x - mechanics.ego.position.x) / METERS_PER_COLUMN).round() as i32 + COLUMNS_BEHIND as i32;
            (0..COLUMNS as i32).contains(&col).then_some(col)
        };
        for other in &mechanics.others {
            if let Some(col) = column(other.position.x) {
                screen.set_pxl(col, other.lane() as i32 * 2 + 1, pixel::pxl('o'));
            }
        }
        let ego = if mechanics.crashed() { 'X' } else { '>' };
        screen.set_pxl(COLUMNS_BEHIND as i32, mechanics.ego.lane() as i32 * 2 + 1, pixel::pxl(ego));
        screen
    }

    /// Draws the road and a status line to stdout
    pub fn render(
        mechanics: &HighwayMechanics,
        steps: usize,
        reward: f32,
    ) -> Result<()> {
        let stdout = std::io::stdout();
        writeln!(
            &stdout,
            "t={:.1}s step {}: speed {:.1} m/s (target {:.0}), lane {}, reward {:.2}",
            mechanics.time,
            steps,
            mechanics.ego.speed,
            mechanics.target_speed(),
            mechanics.ego.lane(),
            reward
        )?;
        Self::render_to_console(mechanics).draw();
        writeln!(&stdout, "\n-----")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::mechanics::Vehicle;

    #[test]
    fn test_vehicles_on_their_lane_rows() {
        let mut mechanics = HighwayMechanics::new(&mut StdRng::seed_from_u64(1));
        mechanics.ego = Vehicle::on_lane(2, 0.0, 25.0);
        mechanics.others = vec![Vehicle::on_lane(0, 20.0, 22.0), Vehicle::on_lane(3, 1000.0, 22.0)];

        let screen = ConsoleDrawer::render_to_console(&mechanics);
        assert_eq!(screen.get_pxl(COLUMNS_BEHIND as i32, 5).unwrap().chr, '>');
        assert_eq!(screen.get_pxl(COLUMNS_BEHIND as i32 + 10, 1).unwrap().chr, 'o');
        // out of view
        assert!((0..COLUMNS as i32).all(|x| screen.get_pxl(x, 7).unwrap().chr != 'o'));
    }
}
