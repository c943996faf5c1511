//! Waypoint matching while link geometry is decoded

/// Metres per microdegree along a meridian
const METRES_PER_MICRODEGREE: f64 = 0.111_319_49;

/// Receives link geometry as it streams out of the tile decoder
///
/// For every forward link the decoder calls `start` with both endpoints; when
/// it returns true, each shape point and finally the far endpoint are passed to
/// `transfer_node`, then `end` closes the link. `has_match` is asked once per
/// decoded node position.
pub trait WaypointMatcher {
    fn start(&mut self, ilon_start: i32, ilat_start: i32, ilon_target: i32, ilat_target: i32) -> bool;
    fn transfer_node(&mut self, ilon: i32, ilat: i32);
    fn end(&mut self);
    fn has_match(&self, ilon: i32, ilat: i32) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub ilon: i32,
    pub ilat: i32,
}

/// Best segment found for one waypoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaypointMatch {
    /// Closest point on the segment
    pub ilon: i32,
    pub ilat: i32,
    /// Distance from the waypoint in metres
    pub distance: f64,
    /// Endpoints of the link the segment belongs to
    pub link_start: (i32, i32),
    pub link_target: (i32, i32),
}

/// Snaps each waypoint to the nearest geometry segment within a radius
#[derive(Debug, Clone)]
pub struct ProximityMatcher {
    waypoints: Vec<Waypoint>,
    radius: f64,
    matches: Vec<Option<WaypointMatch>>,
    link: Option<((i32, i32), (i32, i32))>,
    last: (i32, i32),
}

impl ProximityMatcher {
    /// `radius` in metres
    pub fn new(waypoints: Vec<Waypoint>, radius: f64) -> Self {
        let matches = vec![None; waypoints.len()];
        Self {
            waypoints,
            radius,
            matches,
            link: None,
            last: (0, 0),
        }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn matches(&self) -> &[Option<WaypointMatch>] {
        &self.matches
    }

    pub fn all_matched(&self) -> bool {
        self.matches.iter().all(Option::is_some)
    }

    fn lon_scale(ilat: i32) -> f64 {
        let lat = (ilat as f64 / 1e6 - 90.0).to_radians();
        lat.cos() * METRES_PER_MICRODEGREE
    }

    /// Distance in metres between two positions, equirectangular
    pub fn distance(a: (i32, i32), b: (i32, i32)) -> f64 {
        let mid = ((a.1 as i64 + b.1 as i64) / 2) as i32;
        let dx = (b.0 as f64 - a.0 as f64) * Self::lon_scale(mid);
        let dy = (b.1 as f64 - a.1 as f64) * METRES_PER_MICRODEGREE;
        dx.hypot(dy)
    }

    fn offer_segment(&mut self, from: (i32, i32), to: (i32, i32)) {
        let Some((link_start, link_target)) = self.link else {
            return;
        };
        for (waypoint, best) in self.waypoints.iter().zip(self.matches.iter_mut()) {
            let kx = Self::lon_scale(waypoint.ilat);
            let ky = METRES_PER_MICRODEGREE;
            // segment in metres relative to the waypoint
            let (wlon, wlat) = (waypoint.ilon as i64, waypoint.ilat as i64);
            let (ax, ay) = ((from.0 as i64 - wlon) as f64 * kx, (from.1 as i64 - wlat) as f64 * ky);
            let (bx, by) = ((to.0 as i64 - wlon) as f64 * kx, (to.1 as i64 - wlat) as f64 * ky);
            let (dx, dy) = (bx - ax, by - ay);
            let len2 = dx * dx + dy * dy;
            let t = if len2 > 0.0 {
                (-(ax * dx + ay * dy) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (px, py) = (ax + t * dx, ay + t * dy);
            let distance = px.hypot(py);
            if distance > self.radius || best.is_some_and(|m| m.distance <= distance) {
                continue;
            }
            *best = Some(WaypointMatch {
                ilon: waypoint.ilon.saturating_add((px / kx).round() as i32),
                ilat: waypoint.ilat.saturating_add((py / ky).round() as i32),
                distance,
                link_start,
                link_target,
            });
        }
    }
}

impl WaypointMatcher for ProximityMatcher {
    fn start(&mut self, ilon_start: i32, ilat_start: i32, ilon_target: i32, ilat_target: i32) -> bool {
        if self.waypoints.is_empty() {
            return false;
        }
        self.link = Some(((ilon_start, ilat_start), (ilon_target, ilat_target)));
        self.last = (ilon_start, ilat_start);
        true
    }

    fn transfer_node(&mut self, ilon: i32, ilat: i32) {
        let from = self.last;
        self.offer_segment(from, (ilon, ilat));
        self.last = (ilon, ilat);
    }

    fn end(&mut self) {
        self.link = None;
    }

    fn has_match(&self, ilon: i32, ilat: i32) -> bool {
        self.waypoints
            .iter()
            .any(|w| Self::distance((w.ilon, w.ilat), (ilon, ilat)) <= self.radius)
    }
}
