pub type PixelCoord = (i64, i64);

/// 8-connected pixels on the segment `from..=to`, walked with an integer
/// error term so each step moves at most one pixel on either axis.
pub fn line_pixels(from: PixelCoord, to: PixelCoord) -> LinePixels {
    let dx = (to.0 - from.0).abs();
    let dy = -(to.1 - from.1).abs();
    LinePixels {
        at: Some(from),
        to,
        dx,
        dy,
        step: ((to.0 - from.0).signum(), (to.1 - from.1).signum()),
        err: dx + dy,
    }
}

pub struct LinePixels {
    at: Option<PixelCoord>,
    to: PixelCoord,
    dx: i64,
    dy: i64,
    step: (i64, i64),
    err: i64,
}

impl Iterator for LinePixels {
    type Item = PixelCoord;

    fn next(&mut self) -> Option<PixelCoord> {
        let current = self.at?;
        if current == self.to {
            self.at = None;
            return Some(current);
        }

        let (mut x, mut y) = current;
        let doubled = 2 * self.err;
        if doubled >= self.dy {
            self.err += self.dy;
            x += self.step.0;
        }
        if doubled <= self.dx {
            self.err += self.dx;
            y += self.step.1;
        }
        self.at = Some((x, y));
        Some(current)
    }
}
