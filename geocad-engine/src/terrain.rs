//! 地形采样与等高线。

use std::collections::HashMap;

use geocad_core::conversion::OptionError;
use geocad_core::geo::ElevationGrid;
use geocad_core::geometry::{Point2, Point3};

use crate::projection::Projector;

/// 单次转换允许生成的等高线层数上限。
pub const MAX_CONTOUR_LEVELS: usize = 2_000;

/// 投影到平面后的高程网格，行优先存储。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectedGrid {
    rows: usize,
    columns: usize,
    points: Vec<Point3>,
}

impl ProjectedGrid {
    pub fn from_grid(grid: &ElevationGrid, projector: &Projector) -> Self {
        let points = grid
            .samples()
            .map(|sample| {
                projector
                    .project_lat_lng(sample.lat, sample.lng)
                    .with_z(sample.elevation)
            })
            .collect();
        Self {
            rows: grid.row_count(),
            columns: grid.column_count(),
            points,
        }
    }

    /// 直接由平面采样构造，`points.len()` 必须等于 `rows * columns`。
    pub fn from_points(rows: usize, columns: usize, points: Vec<Point3>) -> Option<Self> {
        (rows * columns == points.len()).then_some(Self {
            rows,
            columns,
            points,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 调用方保证索引在范围内。
    #[inline]
    pub fn point(&self, row: usize, column: usize) -> Point3 {
        self.points[row * self.columns + column]
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn elevation_range(&self) -> Option<(f64, f64)> {
        self.points.iter().fold(None, |range, point| {
            let z = point.z();
            Some(match range {
                None => (z, z),
                Some((low, high)) => (low.min(z), high.max(z)),
            })
        })
    }

    /// 每个单元一个 3D 面，顶点顺序 (r,c) → (r,c+1) → (r+1,c+1) → (r+1,c)。
    pub fn mesh_faces(&self) -> Vec<[Point3; 4]> {
        let mut faces = Vec::new();
        if self.rows < 2 || self.columns < 2 {
            return faces;
        }
        for row in 0..self.rows - 1 {
            for column in 0..self.columns - 1 {
                faces.push([
                    self.point(row, column),
                    self.point(row, column + 1),
                    self.point(row + 1, column + 1),
                    self.point(row + 1, column),
                ]);
            }
        }
        faces
    }
}

/// 最近采样点高程查询。没有地形时一律返回 0。
#[derive(Debug, Clone, Default)]
pub struct TerrainSampler {
    grid: ProjectedGrid,
}

impl TerrainSampler {
    pub fn new(grid: &ElevationGrid, projector: &Projector) -> Self {
        Self {
            grid: ProjectedGrid::from_grid(grid, projector),
        }
    }

    pub fn from_projected(grid: ProjectedGrid) -> Self {
        Self { grid }
    }

    #[inline]
    pub fn grid(&self) -> &ProjectedGrid {
        &self.grid
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    pub fn elevation_at(&self, x: f64, y: f64) -> f64 {
        let target = Point2::new(x, y);
        self.grid
            .points()
            .iter()
            .map(|sample| (sample.xy().distance(target), sample.z()))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map_or(0.0, |(_, z)| z)
    }
}

/// `[ceil(min/interval)*interval, max]` 内的等高线条数。按浮点计算，
/// 极小间距得到的是一个很大的数而不会溢出。
pub fn contour_level_count(range: Option<(f64, f64)>, interval: f64) -> f64 {
    let Some((min, max)) = range else {
        return 0.0;
    };
    if interval <= 0.0 || !interval.is_finite() || !min.is_finite() || !max.is_finite() {
        return 0.0;
    }
    let first = (min / interval).ceil();
    let last = (max / interval).floor();
    if !first.is_finite() || !last.is_finite() {
        return ((max - min) / interval).floor() + 1.0;
    }
    if last < first { 0.0 } else { last - first + 1.0 }
}

/// 条数超过 [`MAX_CONTOUR_LEVELS`] 时报错，不做截断。
pub fn check_contour_levels(range: Option<(f64, f64)>, interval: f64) -> Result<usize, OptionError> {
    let count = contour_level_count(range, interval);
    if count > MAX_CONTOUR_LEVELS as f64 {
        return Err(OptionError::ContourLevels {
            interval,
            count,
            limit: MAX_CONTOUR_LEVELS,
        });
    }
    Ok(count as usize)
}

/// `[ceil(min/interval)*interval, max]` 内的等高线高程。
pub fn contour_levels(range: Option<(f64, f64)>, interval: f64) -> Result<Vec<f64>, OptionError> {
    let count = check_contour_levels(range, interval)?;
    let Some((min, _)) = range else {
        return Ok(Vec::new());
    };
    let first = (min / interval).ceil();
    Ok((0..count).map(|step| (first + step as f64) * interval).collect())
}

/// 等高线层号是否为计曲线（每 5 条一条）。
pub fn is_index_level(level: f64, interval: f64) -> bool {
    let step = (level / interval).round() as i64;
    step.rem_euclid(5) == 0
}

/// 一条等高线：高程、点序列与是否闭合（闭合时首尾不重复）。
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub level: f64,
    pub points: Vec<Point2>,
    pub closed: bool,
}

/// 网格边：水平边 (r,c)-(r,c+1) 或竖直边 (r,c)-(r+1,c)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKey {
    Horizontal(usize, usize),
    Vertical(usize, usize),
}

/// Marching squares 追踪指定高程的等高线。
pub fn trace_contours(grid: &ProjectedGrid, level: f64) -> Vec<Contour> {
    if grid.rows() < 2 || grid.columns() < 2 {
        return Vec::new();
    }

    let mut segments: Vec<(EdgeKey, EdgeKey)> = Vec::new();
    for row in 0..grid.rows() - 1 {
        for column in 0..grid.columns() - 1 {
            let z = [
                grid.point(row, column).z(),
                grid.point(row, column + 1).z(),
                grid.point(row + 1, column + 1).z(),
                grid.point(row + 1, column).z(),
            ];
            let case = z
                .iter()
                .enumerate()
                .fold(0u8, |acc, (bit, value)| {
                    if *value >= level { acc | (1 << bit) } else { acc }
                });
            let e0 = EdgeKey::Horizontal(row, column);
            let e1 = EdgeKey::Vertical(row, column + 1);
            let e2 = EdgeKey::Horizontal(row + 1, column);
            let e3 = EdgeKey::Vertical(row, column);
            let center_high = z.iter().sum::<f64>() / 4.0 >= level;
            match case {
                1 | 14 => segments.push((e3, e0)),
                2 | 13 => segments.push((e0, e1)),
                3 | 12 => segments.push((e3, e1)),
                4 | 11 => segments.push((e1, e2)),
                6 | 9 => segments.push((e0, e2)),
                7 | 8 => segments.push((e3, e2)),
                5 => {
                    if center_high {
                        segments.push((e0, e1));
                        segments.push((e2, e3));
                    } else {
                        segments.push((e3, e0));
                        segments.push((e1, e2));
                    }
                }
                10 => {
                    if center_high {
                        segments.push((e3, e0));
                        segments.push((e1, e2));
                    } else {
                        segments.push((e0, e1));
                        segments.push((e2, e3));
                    }
                }
                _ => {}
            }
        }
    }

    stitch(grid, level, &segments)
}

fn edge_point(grid: &ProjectedGrid, edge: EdgeKey, level: f64) -> Point2 {
    let (a, b) = match edge {
        EdgeKey::Horizontal(row, column) => (grid.point(row, column), grid.point(row, column + 1)),
        EdgeKey::Vertical(row, column) => (grid.point(row, column), grid.point(row + 1, column)),
    };
    let dz = b.z() - a.z();
    let t = if dz.abs() <= f64::EPSILON {
        0.5
    } else {
        ((level - a.z()) / dz).clamp(0.0, 1.0)
    };
    a.xy().lerp(b.xy(), t)
}

fn stitch(grid: &ProjectedGrid, level: f64, segments: &[(EdgeKey, EdgeKey)]) -> Vec<Contour> {
    let mut by_edge: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (index, (a, b)) in segments.iter().enumerate() {
        by_edge.entry(*a).or_default().push(index);
        by_edge.entry(*b).or_default().push(index);
    }

    let mut used = vec![false; segments.len()];
    let next_from = |key: EdgeKey, used: &mut Vec<bool>| -> Option<EdgeKey> {
        let candidates = by_edge.get(&key)?;
        let index = candidates.iter().copied().find(|index| !used[*index])?;
        used[index] = true;
        let (a, b) = segments[index];
        Some(if a == key { b } else { a })
    };

    let mut contours = Vec::new();
    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (head, tail) = segments[start];
        let mut chain = vec![head, tail];
        let mut closed = false;

        while let Some(next) = next_from(chain[chain.len() - 1], &mut used) {
            if next == chain[0] {
                closed = true;
                break;
            }
            chain.push(next);
        }
        if !closed {
            let mut backward = Vec::new();
            let mut cursor = chain[0];
            while let Some(previous) = next_from(cursor, &mut used) {
                backward.push(previous);
                cursor = previous;
            }
            backward.reverse();
            backward.extend(chain);
            chain = backward;
        }

        contours.push(Contour {
            level,
            points: chain
                .into_iter()
                .map(|edge| edge_point(grid, edge, level))
                .collect(),
            closed,
        });
    }
    contours
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_from(values: &[&[f64]]) -> ProjectedGrid {
        let rows = values.len();
        let columns = values[0].len();
        let points = values
            .iter()
            .enumerate()
            .flat_map(|(row, line)| {
                line.iter()
                    .enumerate()
                    .map(move |(column, z)| Point3::new(column as f64 * 10.0, row as f64 * 10.0, *z))
            })
            .collect();
        ProjectedGrid::from_points(rows, columns, points).expect("grid dimensions")
    }

    #[test]
    fn levels_span_ceil_min_to_max() {
        assert_eq!(contour_levels(Some((3.2, 7.0)), 1.0), Ok(vec![4.0, 5.0, 6.0, 7.0]));
        assert_eq!(contour_levels(Some((-2.5, 2.5)), 2.0), Ok(vec![-2.0, 0.0, 2.0]));
        assert_eq!(contour_levels(None, 1.0), Ok(Vec::new()));
        assert_eq!(contour_levels(Some((1.1, 1.9)), 1.0), Ok(Vec::new()));
        assert!(is_index_level(10.0, 2.0));
        assert!(!is_index_level(4.0, 2.0));
    }

    #[test]
    fn too_many_levels_are_rejected() {
        let err = contour_levels(Some((0.0, 1_000.0)), 0.01).expect_err("超过上限");
        assert!(matches!(err, OptionError::ContourLevels { limit: MAX_CONTOUR_LEVELS, .. }));

        let exact = contour_levels(Some((0.0, 1_999.0)), 1.0).expect("恰好达到上限");
        assert_eq!(exact.len(), MAX_CONTOUR_LEVELS);
        assert_eq!(exact.last().copied(), Some(1_999.0));
    }

    #[test]
    fn tiny_interval_does_not_overflow() {
        let count = contour_level_count(Some((-5.0, 5.0)), 1e-300);
        assert!(count > MAX_CONTOUR_LEVELS as f64);
        assert!(contour_levels(Some((-5.0, 5.0)), 1e-300).is_err());
        assert_eq!(contour_level_count(Some((-5.0, 5.0)), f64::MIN_POSITIVE), f64::INFINITY);
        assert!(contour_levels(Some((-5.0, 5.0)), f64::MIN_POSITIVE).is_err());
    }

    #[test]
    fn nearest_sample_lookup() {
        let sampler = TerrainSampler::from_projected(grid_from(&[&[1.0, 2.0], &[3.0, 4.0]]));
        assert_eq!(sampler.elevation_at(1.0, 1.0), 1.0);
        assert_eq!(sampler.elevation_at(9.0, 9.0), 4.0);
        assert_eq!(TerrainSampler::default().elevation_at(5.0, 5.0), 0.0);
    }

    #[test]
    fn peak_produces_closed_contour() {
        let grid = grid_from(&[
            &[0.0, 0.0, 0.0],
            &[0.0, 10.0, 0.0],
            &[0.0, 0.0, 0.0],
        ]);
        let contours = trace_contours(&grid, 5.0);
        assert_eq!(contours.len(), 1);
        let contour = &contours[0];
        assert!(contour.closed);
        assert_eq!(contour.points.len(), 4);
        for point in &contour.points {
            let d = point.distance(Point2::new(10.0, 10.0));
            assert!((d - 5.0).abs() < 1e-9, "交点应位于中点: {point:?}");
        }
    }

    #[test]
    fn slope_produces_single_open_contour() {
        let grid = grid_from(&[
            &[0.0, 1.0, 2.0, 3.0],
            &[0.0, 1.0, 2.0, 3.0],
            &[0.0, 1.0, 2.0, 3.0],
        ]);
        let contours = trace_contours(&grid, 1.5);
        assert_eq!(contours.len(), 1);
        let contour = &contours[0];
        assert!(!contour.closed);
        assert_eq!(contour.points.len(), 3);
        for point in &contour.points {
            assert!((point.x() - 15.0).abs() < 1e-9);
        }
    }

    #[test]
    fn mesh_has_one_face_per_cell() {
        let grid = grid_from(&[&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0]]);
        let faces = grid.mesh_faces();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[1][2], Point3::new(20.0, 10.0, 3.0));
    }
}
