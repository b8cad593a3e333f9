//! 经纬度到平面坐标的投影。
//!
//! `local` 模式使用以原点为切点的等距近似，适用于几公里范围内的数据；`utm` 模式为
//! WGS84 椭球上的横轴墨卡托正/反算（Snyder 级数展开）。

use geocad_core::conversion::ProjectionMode;
use geocad_core::geo::GeoLocation;
use geocad_core::geometry::Point2;
use serde::{Deserialize, Serialize};

/// 局部投影使用的地球半径（米）。
pub const EARTH_RADIUS: f64 = 6_378_137.0;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// 投影结果。UTM 模式下附带分带号。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
    pub zone: Option<u8>,
}

impl ProjectedPoint {
    #[inline]
    pub fn point(self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// UTM 分带：编号与南北半球标志。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmZone {
    pub number: u8,
    pub south: bool,
}

impl UtmZone {
    pub fn for_location(location: &GeoLocation, zone_override: Option<u8>) -> Self {
        Self {
            number: zone_override.unwrap_or_else(|| utm_zone_number(location.lng)),
            south: location.lat < 0.0,
        }
    }

    /// 中央经线（度）。
    #[inline]
    pub fn central_meridian(self) -> f64 {
        f64::from(self.number) * 6.0 - 183.0
    }

    /// 图面标注文字，例如 `UTM Zone 23S (WGS84)`。
    pub fn label(self) -> String {
        let hemisphere = if self.south { 'S' } else { 'N' };
        format!("UTM Zone {}{hemisphere} (WGS84)", self.number)
    }
}

/// 由经度推算分带号（1..=60）。
pub fn utm_zone_number(lng: f64) -> u8 {
    let zone = ((lng + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u8
}

struct Ellipsoid {
    e2: f64,
    ep2: f64,
}

impl Ellipsoid {
    fn wgs84() -> Self {
        let e2 = WGS84_F * (2.0 - WGS84_F);
        Self {
            e2,
            ep2: e2 / (1.0 - e2),
        }
    }

    /// 子午线弧长。
    fn meridian_arc(&self, phi: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }
}

/// UTM 正算，返回 (东坐标, 北坐标)。
pub fn utm_project(lat: f64, lng: f64, zone: UtmZone) -> (f64, f64) {
    let ellipsoid = Ellipsoid::wgs84();
    let phi = lat.to_radians();
    let lambda = lng.to_radians();
    let lambda0 = zone.central_meridian().to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();
    let n = WGS84_A / (1.0 - ellipsoid.e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ellipsoid.ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lambda - lambda0);
    let m = ellipsoid.meridian_arc(phi);
    let ep2 = ellipsoid.ep2;

    let x = UTM_FALSE_EASTING
        + UTM_K0
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0);
    let mut y = UTM_K0
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if zone.south {
        y += UTM_FALSE_NORTHING_SOUTH;
    }
    (x, y)
}

/// UTM 反算，返回 (纬度, 经度)。
pub fn utm_unproject(easting: f64, northing: f64, zone: UtmZone) -> (f64, f64) {
    let ellipsoid = Ellipsoid::wgs84();
    let e2 = ellipsoid.e2;
    let ep2 = ellipsoid.ep2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let false_northing = if zone.south {
        UTM_FALSE_NORTHING_SOUTH
    } else {
        0.0
    };
    let m = (northing - false_northing) / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let root = (1.0 - e2).sqrt();
    let e1 = (1.0 - root) / (1.0 + root);

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();
    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - e2 * sin_phi1 * sin_phi1;
    let n1 = WGS84_A / denom.sqrt();
    let r1 = WGS84_A * (1.0 - e2) / denom.powf(1.5);
    let d = (easting - UTM_FALSE_EASTING) / (n1 * UTM_K0);

    let phi = phi1
        - (n1 * tan_phi1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lambda = zone.central_meridian().to_radians()
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    (phi.to_degrees(), lambda.to_degrees())
}

/// 无状态的投影函数。UTM 模式下南北半球由原点决定，保证同一文档使用同一坐标系。
pub fn project(
    lat: f64,
    lng: f64,
    origin: &GeoLocation,
    mode: ProjectionMode,
    zone_override: Option<u8>,
) -> ProjectedPoint {
    match mode {
        ProjectionMode::Local => {
            let (x, y) = local_project(lat, lng, origin);
            ProjectedPoint { x, y, zone: None }
        }
        ProjectionMode::Utm => {
            let zone = UtmZone::for_location(origin, zone_override);
            let (x, y) = utm_project(lat, lng, zone);
            ProjectedPoint {
                x,
                y,
                zone: Some(zone.number),
            }
        }
    }
}

fn local_project(lat: f64, lng: f64, origin: &GeoLocation) -> (f64, f64) {
    let d_lat = (lat - origin.lat).to_radians();
    let d_lng = (lng - origin.lng).to_radians();
    let x = EARTH_RADIUS * d_lng * origin.lat.to_radians().cos();
    let y = EARTH_RADIUS * d_lat;
    (x, y)
}

/// 为一次转换固定原点、模式与分带的投影器。
#[derive(Debug, Clone)]
pub struct Projector {
    origin: GeoLocation,
    mode: ProjectionMode,
    zone: Option<UtmZone>,
}

impl Projector {
    pub fn new(origin: GeoLocation, mode: ProjectionMode, zone_override: Option<u8>) -> Self {
        let zone = match mode {
            ProjectionMode::Local => None,
            ProjectionMode::Utm => Some(UtmZone::for_location(&origin, zone_override)),
        };
        Self { origin, mode, zone }
    }

    #[inline]
    pub fn mode(&self) -> ProjectionMode {
        self.mode
    }

    #[inline]
    pub fn origin(&self) -> &GeoLocation {
        &self.origin
    }

    #[inline]
    pub fn zone(&self) -> Option<UtmZone> {
        self.zone
    }

    pub fn project(&self, location: &GeoLocation) -> Point2 {
        self.project_lat_lng(location.lat, location.lng)
    }

    pub fn project_lat_lng(&self, lat: f64, lng: f64) -> Point2 {
        match self.zone {
            Some(zone) => {
                let (x, y) = utm_project(lat, lng, zone);
                Point2::new(x, y)
            }
            None => {
                let (x, y) = local_project(lat, lng, &self.origin);
                Point2::new(x, y)
            }
        }
    }

    pub fn project_all(&self, locations: &[GeoLocation]) -> Vec<Point2> {
        locations.iter().map(|location| self.project(location)).collect()
    }

    /// 原点在平面上的位置。
    pub fn origin_point(&self) -> Point2 {
        self.project(&self.origin)
    }

    /// 平面坐标反算回经纬度。
    pub fn unproject(&self, point: Point2) -> GeoLocation {
        match self.zone {
            Some(zone) => {
                let (lat, lng) = utm_unproject(point.x(), point.y(), zone);
                GeoLocation::new(lat, lng)
            }
            None => {
                let lat = self.origin.lat + (point.y() / EARTH_RADIUS).to_degrees();
                let cos_lat = self.origin.lat.to_radians().cos();
                let lng = self.origin.lng + (point.x() / (EARTH_RADIUS * cos_lat)).to_degrees();
                GeoLocation::new(lat, lng)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_projection_is_zero_at_origin_and_scales_by_latitude() {
        let origin = GeoLocation::new(-23.5505, -46.6333);
        let at_origin = project(origin.lat, origin.lng, &origin, ProjectionMode::Local, None);
        assert!(at_origin.x.abs() < 1e-9 && at_origin.y.abs() < 1e-9);
        assert_eq!(at_origin.zone, None);

        let east = project(origin.lat, origin.lng + 0.001, &origin, ProjectionMode::Local, None);
        let expected = EARTH_RADIUS * 0.001_f64.to_radians() * origin.lat.to_radians().cos();
        assert!((east.x - expected).abs() < 1e-6);
    }

    #[test]
    fn utm_matches_known_coordinates() {
        // 赤道与 3°E 中央经线交点：东坐标恰为假东偏。
        let origin = GeoLocation::new(0.0, 3.0);
        let point = project(0.0, 3.0, &origin, ProjectionMode::Utm, None);
        assert_eq!(point.zone, Some(31));
        assert!((point.x - 500_000.0).abs() < 1e-6);
        assert!(point.y.abs() < 1e-6);
    }

    #[test]
    fn southern_origin_receives_false_northing() {
        let origin = GeoLocation::new(-23.5505, -46.6333);
        let point = project(origin.lat, origin.lng, &origin, ProjectionMode::Utm, None);
        assert_eq!(point.zone, Some(23));
        assert!(point.y > 7_000_000.0 && point.y < 7_500_000.0);
        assert!(point.x > 300_000.0 && point.x < 700_000.0);
    }

    #[test]
    fn zone_override_is_honoured() {
        let origin = GeoLocation::new(10.0, 5.9);
        let natural = project(10.0, 6.1, &origin, ProjectionMode::Utm, None);
        let forced = project(10.0, 6.1, &origin, ProjectionMode::Utm, Some(31));
        assert_eq!(natural.zone, Some(31));
        assert_eq!(forced.zone, Some(31));
        let neighbour = project(10.0, 6.1, &origin, ProjectionMode::Utm, Some(32));
        assert_eq!(neighbour.zone, Some(32));
        assert!((forced.x - neighbour.x).abs() > 1_000.0);
        assert_eq!(utm_zone_number(180.0), 60);
        assert_eq!(utm_zone_number(-180.0), 1);
    }

    #[test]
    fn utm_round_trip_within_zone_span() {
        for &(lat, lng) in &[
            (-23.5505, -46.6333),
            (48.8566, 2.3522),
            (0.5, -44.9),
            (-60.0, -43.1),
            (70.0, 17.9),
            (35.0, 139.0),
        ] {
            let origin = GeoLocation::new(lat, lng);
            let zone = UtmZone::for_location(&origin, None);
            let (x, y) = utm_project(lat, lng, zone);
            let (back_lat, back_lng) = utm_unproject(x, y, zone);
            assert!(
                (back_lat - lat).abs() < 1e-7 && (back_lng - lng).abs() < 1e-7,
                "往返误差过大: ({lat}, {lng}) -> ({back_lat}, {back_lng})"
            );
        }
    }

    #[test]
    fn projector_unprojects_local_points() {
        let origin = GeoLocation::new(40.0, -3.7);
        let projector = Projector::new(origin.clone(), ProjectionMode::Local, None);
        let target = GeoLocation::new(40.003, -3.698);
        let back = projector.unproject(projector.project(&target));
        assert!((back.lat - target.lat).abs() < 1e-12);
        assert!((back.lng - target.lng).abs() < 1e-12);
        assert_eq!(
            Projector::new(origin, ProjectionMode::Utm, None)
                .zone()
                .map(UtmZone::label),
            Some("UTM Zone 30N (WGS84)".to_string())
        );
    }
}
