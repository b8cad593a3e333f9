//! 投影后几何的加工：简化、正交化、偏移、拉伸、里程桩与坡面流向。

use std::f64::consts::{FRAC_PI_2, PI};

use geocad_core::geo::Tags;
use geocad_core::geometry::{Point2, Point3, Vector2};

use crate::errors::FeatureError;
use crate::terrain::ProjectedGrid;

/// 无高度信息时的默认建筑高度（米）。
pub const DEFAULT_BUILDING_HEIGHT: f64 = 3.5;
/// 每层高度（米）。
pub const LEVEL_HEIGHT: f64 = 3.2;
/// 里程桩刻度半长（米）。
pub const STATION_TICK_HALF_LENGTH: f64 = 2.0;
/// 坡面流向的最小高差（米）。
pub const FLOW_RELIEF_THRESHOLD: f64 = 0.1;
/// 正交化吸附允许的最大轴向偏差（度）。
const SNAP_TOLERANCE_DEG: f64 = 15.0;
const EPSILON: f64 = 1e-9;

/// 去掉相邻重复点。
pub fn dedup_points(points: &[Point2]) -> Vec<Point2> {
    let mut result: Vec<Point2> = Vec::with_capacity(points.len());
    for point in points {
        if result
            .last()
            .is_none_or(|last| last.distance(*point) > EPSILON)
        {
            result.push(*point);
        }
    }
    result
}

/// 闭合环的独立顶点（去掉与首点重复的末点）。
pub fn ring_vertices(ring: &[Point2]) -> Vec<Point2> {
    let mut vertices = dedup_points(ring);
    if vertices.len() > 1 {
        if let (Some(first), Some(last)) = (vertices.first(), vertices.last()) {
            if first.distance(*last) <= EPSILON {
                vertices.pop();
            }
        }
    }
    vertices
}

/// 由独立顶点构造首尾相同的闭合环。
pub fn close_ring(vertices: &[Point2]) -> Vec<Point2> {
    let mut ring = vertices.to_vec();
    if let Some(first) = vertices.first() {
        ring.push(*first);
    }
    ring
}

/// 校验线要素至少有 2 个不同顶点。
pub fn validate_line(points: &[Point2]) -> Result<Vec<Point2>, FeatureError> {
    let points = dedup_points(points);
    if points.len() < 2 {
        return Err(FeatureError::TooFewPoints {
            kind: "线",
            found: points.len(),
            required: 2,
        });
    }
    Ok(points)
}

/// 校验面要素至少有 3 个不同顶点，返回闭合环。
pub fn validate_ring(points: &[Point2]) -> Result<Vec<Point2>, FeatureError> {
    let vertices = ring_vertices(points);
    if vertices.len() < 3 {
        return Err(FeatureError::TooFewPoints {
            kind: "面",
            found: vertices.len(),
            required: 3,
        });
    }
    Ok(close_ring(&vertices))
}

fn perpendicular_distance(point: Point2, start: Point2, end: Point2) -> f64 {
    let segment = start.vector_to(end);
    let length = segment.length();
    if length <= EPSILON {
        return point.distance(start);
    }
    let offset = start.vector_to(point);
    (segment.x() * offset.y() - segment.y() * offset.x()).abs() / length
}

/// Douglas-Peucker 简化。容差不大于 0 时原样返回。
pub fn simplify(points: &[Point2], tolerance: f64) -> Vec<Point2> {
    if tolerance <= 0.0 || points.len() <= 2 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let mut farthest = first;
        let mut max_distance = 0.0;
        for index in first + 1..last {
            let distance = perpendicular_distance(points[index], points[first], points[last]);
            if distance > max_distance {
                max_distance = distance;
                farthest = index;
            }
        }
        if max_distance > tolerance {
            keep[farthest] = true;
            stack.push((first, farthest));
            stack.push((farthest, last));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(point, kept)| kept.then_some(*point))
        .collect()
}

/// 对闭合环做简化，保证结果仍闭合且至少 3 个独立顶点，否则退回原环。
pub fn simplify_ring(ring: &[Point2], tolerance: f64) -> Vec<Point2> {
    if tolerance <= 0.0 {
        return ring.to_vec();
    }
    let vertices = ring_vertices(ring);
    if vertices.len() <= 3 {
        return ring.to_vec();
    }
    // 以离首点最远的顶点切分，两段分别简化。
    let split = vertices
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| {
            vertices[0]
                .distance(*a.1)
                .total_cmp(&vertices[0].distance(*b.1))
        })
        .map_or(vertices.len() / 2, |(index, _)| index);

    let mut first_half = simplify(&vertices[..=split], tolerance);
    let mut second: Vec<Point2> = vertices[split..].to_vec();
    second.push(vertices[0]);
    let second_half = simplify(&second, tolerance);

    first_half.pop();
    first_half.extend(second_half);
    let simplified = ring_vertices(&first_half);
    if simplified.len() < 3 {
        return ring.to_vec();
    }
    close_ring(&simplified)
}

/// 边长加权的主方向角（弧度，折叠到 (-45°, 45°]）。
///
/// 角度乘 4 后做圆周平均，互相垂直的边方向一致而不是相互抵消。
pub fn dominant_angle(ring: &[Point2]) -> Option<f64> {
    let mut sum_sin = 0.0;
    let mut sum_cos = 0.0;
    for pair in ring.windows(2) {
        let edge = pair[0].vector_to(pair[1]);
        let length = edge.length();
        if length <= EPSILON {
            continue;
        }
        let angle = edge.angle() * 4.0;
        sum_sin += length * angle.sin();
        sum_cos += length * angle.cos();
    }
    if sum_sin.abs() <= EPSILON && sum_cos.abs() <= EPSILON {
        return None;
    }
    Some(sum_sin.atan2(sum_cos) / 4.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Orthogonalized {
    pub ring: Vec<Point2>,
    /// 主方向角（弧度）。
    pub angle: f64,
    /// 顶点是否已吸附到直角。
    pub snapped: bool,
}

fn rotate(point: Point2, pivot: Point2, angle: f64) -> Point2 {
    let (sin, cos) = angle.sin_cos();
    let dx = point.x() - pivot.x();
    let dy = point.y() - pivot.y();
    Point2::new(
        pivot.x() + dx * cos - dy * sin,
        pivot.y() + dx * sin + dy * cos,
    )
}

fn centroid(vertices: &[Point2]) -> Point2 {
    let count = vertices.len().max(1) as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), point| (sx + point.x(), sy + point.y()));
    Point2::new(sx / count, sy / count)
}

/// 闭合环顶点的几何中心，用于高程采样与标注。
pub fn ring_centroid(ring: &[Point2]) -> Point2 {
    centroid(&ring_vertices(ring))
}

#[derive(Clone, Copy, PartialEq)]
enum Axis {
    Horizontal,
    Vertical,
}

/// 正交化：求主方向角，并在所有边都接近轴向时把环吸附成直角多边形。
pub fn orthogonalize(ring: &[Point2]) -> Orthogonalized {
    let Some(angle) = dominant_angle(ring) else {
        return Orthogonalized {
            ring: ring.to_vec(),
            angle: 0.0,
            snapped: false,
        };
    };
    match snap_to_axes(ring, angle) {
        Some(snapped) => Orthogonalized {
            ring: snapped,
            angle,
            snapped: true,
        },
        None => Orthogonalized {
            ring: ring.to_vec(),
            angle,
            snapped: false,
        },
    }
}

fn snap_to_axes(ring: &[Point2], angle: f64) -> Option<Vec<Point2>> {
    let vertices = ring_vertices(ring);
    if vertices.len() < 4 {
        return None;
    }
    let pivot = centroid(&vertices);
    let local: Vec<Point2> = vertices
        .iter()
        .map(|point| rotate(*point, pivot, -angle))
        .collect();

    let tolerance = SNAP_TOLERANCE_DEG.to_radians();
    // (方向, 加权坐标和, 权重)
    let mut runs: Vec<(Axis, f64, f64)> = Vec::new();
    for index in 0..local.len() {
        let start = local[index];
        let end = local[(index + 1) % local.len()];
        let edge = start.vector_to(end);
        let length = edge.length();
        if length <= EPSILON {
            continue;
        }
        let folded = edge.angle().rem_euclid(FRAC_PI_2);
        let deviation = folded.min(FRAC_PI_2 - folded);
        if deviation > tolerance {
            return None;
        }
        let (axis, coordinate) = if edge.x().abs() >= edge.y().abs() {
            (Axis::Horizontal, (start.y() + end.y()) * 0.5)
        } else {
            (Axis::Vertical, (start.x() + end.x()) * 0.5)
        };
        match runs.last_mut() {
            Some(run) if run.0 == axis => {
                run.1 += coordinate * length;
                run.2 += length;
            }
            _ => runs.push((axis, coordinate * length, length)),
        }
    }
    if runs.len() > 1 {
        let first_axis = runs[0].0;
        if let Some(&(axis, sum, weight)) = runs.last() {
            if axis == first_axis {
                runs.pop();
                runs[0].1 += sum;
                runs[0].2 += weight;
            }
        }
    }
    if runs.len() < 4 || runs.len() % 2 != 0 {
        return None;
    }

    let lines: Vec<(Axis, f64)> = runs
        .iter()
        .map(|(axis, sum, weight)| (*axis, sum / weight))
        .collect();
    let mut snapped = Vec::with_capacity(lines.len() + 1);
    for index in 0..lines.len() {
        let (axis, value) = lines[index];
        let (_, next_value) = lines[(index + 1) % lines.len()];
        let corner = match axis {
            Axis::Horizontal => Point2::new(next_value, value),
            Axis::Vertical => Point2::new(value, next_value),
        };
        snapped.push(rotate(corner, pivot, angle));
    }
    let snapped = ring_vertices(&snapped);
    if snapped.len() < 4 {
        return None;
    }
    Some(close_ring(&snapped))
}

/// 平行偏移：每个顶点沿相邻两段左法线的平均方向移动 `distance`（正值向左）。
pub fn offset_polyline(points: &[Point2], distance: f64) -> Vec<Point2> {
    let points = dedup_points(points);
    if points.len() < 2 {
        return points;
    }
    let normals: Vec<Option<Vector2>> = points
        .windows(2)
        .map(|pair| pair[0].vector_to(pair[1]).normalize().map(Vector2::perp))
        .collect();

    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let previous = index.checked_sub(1).and_then(|i| normals[i]);
            let next = normals.get(index).copied().flatten();
            shift(*point, previous, next, distance)
        })
        .collect()
}

/// 闭合环的平行偏移，首尾衔接处同样取两段法线的平均。返回独立顶点。
pub fn offset_ring(ring: &[Point2], distance: f64) -> Vec<Point2> {
    let vertices = ring_vertices(ring);
    let count = vertices.len();
    if count < 3 {
        return vertices;
    }
    let normals: Vec<Option<Vector2>> = (0..count)
        .map(|i| {
            vertices[i]
                .vector_to(vertices[(i + 1) % count])
                .normalize()
                .map(Vector2::perp)
        })
        .collect();

    vertices
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let previous = normals[(index + count - 1) % count];
            shift(*point, previous, normals[index], distance)
        })
        .collect()
}

fn shift(point: Point2, previous: Option<Vector2>, next: Option<Vector2>, distance: f64) -> Point2 {
    let normal = match (previous, next) {
        (Some(a), Some(b)) => Vector2(a.0 + b.0).normalize().or(Some(a)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    match normal {
        Some(normal) => point.translate(normal.scale(distance)),
        None => point,
    }
}

/// 闭合环的有向面积（逆时针为正）。
pub fn signed_area(ring: &[Point2]) -> f64 {
    ring.windows(2)
        .map(|pair| pair[0].x() * pair[1].y() - pair[1].x() * pair[0].y())
        .sum::<f64>()
        * 0.5
}

/// 从属性推算建筑高度：`height` 标签优先，其次楼层数，最后默认值。
pub fn building_height(tags: &Tags) -> f64 {
    if let Some(height) = tags.get("height").and_then(|raw| parse_leading_number(raw)) {
        if height > 0.0 {
            return height;
        }
    }
    if let Some(levels) = tags
        .get("building:levels")
        .and_then(|raw| parse_leading_number(raw))
    {
        if levels > 0.0 {
            return levels * LEVEL_HEIGHT;
        }
    }
    DEFAULT_BUILDING_HEIGHT
}

/// 解析形如 `12`、`12.5 m`、`7,5` 的数值。
pub fn parse_leading_number(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    let end = normalized
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_digit() || *ch == '.' || *ch == '-'))
        .map_or(normalized.len(), |(index, _)| index);
    normalized[..end].parse::<f64>().ok().filter(|value| value.is_finite())
}

/// 把闭合环拉伸成墙面，顶点数不超过 4 时附加顶面。
pub fn extrude_ring(ring: &[Point2], base: f64, height: f64) -> Vec<[Point3; 4]> {
    let vertices = ring_vertices(ring);
    if vertices.len() < 3 {
        return Vec::new();
    }
    let top = base + height;
    let mut faces: Vec<[Point3; 4]> = (0..vertices.len())
        .map(|index| {
            let a = vertices[index];
            let b = vertices[(index + 1) % vertices.len()];
            [a.with_z(base), b.with_z(base), b.with_z(top), a.with_z(top)]
        })
        .collect();
    if vertices.len() <= 4 {
        let last = vertices[vertices.len() - 1];
        faces.push([
            vertices[0].with_z(top),
            vertices[1].with_z(top),
            vertices[2].with_z(top),
            last.with_z(top),
        ]);
    }
    faces
}

fn polyline_length(points: &[Point2]) -> f64 {
    points.windows(2).map(|pair| pair[0].distance(pair[1])).sum()
}

/// 里程桩：位置、所在段的切线方向与累计距离。
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub distance: f64,
    pub position: Point2,
    /// 切线方向角（弧度）。
    pub tangent: f64,
}

impl Station {
    /// 垂直于切线的刻度线两端。
    pub fn tick(&self, half_length: f64) -> (Point2, Point2) {
        let normal = Vector2::new(-self.tangent.sin(), self.tangent.cos()).scale(half_length);
        (
            self.position.translate(normal.scale(-1.0)),
            self.position.translate(normal),
        )
    }

    /// 沿切线方向、保持文字朝上的旋转角（度）。
    pub fn label_rotation(&self) -> f64 {
        readable_rotation(self.tangent)
    }

    pub fn label(&self) -> String {
        station_label(self.distance)
    }
}

/// 把弧度方向转换为不倒置的文字旋转角（度，(-90°, 90°]）。
pub fn readable_rotation(angle: f64) -> f64 {
    let mut degrees = angle.to_degrees();
    while degrees > 90.0 {
        degrees -= 180.0;
    }
    while degrees <= -90.0 {
        degrees += 180.0;
    }
    degrees
}

/// `km+米` 格式，如 1250 m → `1+250`。
pub fn station_label(distance: f64) -> String {
    let meters = distance.round().max(0.0) as u64;
    format!("{}+{:03}", meters / 1000, meters % 1000)
}

/// 沿中心线每隔 `interval` 米取一个内部里程桩（不含起点与终点）。
pub fn stations(points: &[Point2], interval: f64) -> Vec<Station> {
    if interval <= 0.0 || !interval.is_finite() {
        return Vec::new();
    }
    let points = dedup_points(points);
    let total = polyline_length(&points);
    let mut result = Vec::new();
    let mut walked = 0.0;
    let mut step = 1u64;
    for pair in points.windows(2) {
        let segment = pair[0].vector_to(pair[1]);
        let length = segment.length();
        loop {
            let target = step as f64 * interval;
            if target >= total - EPSILON || target > walked + length {
                break;
            }
            let t = (target - walked) / length;
            result.push(Station {
                distance: target,
                position: pair[0].lerp(pair[1], t),
                tangent: segment.angle(),
            });
            step += 1;
        }
        walked += length;
    }
    result
}

/// 单个网格单元的坡度分析结果。
#[derive(Debug, Clone, PartialEq)]
pub struct CellSlope {
    pub corners: [Point2; 4],
    pub center: Point2,
    /// 坡度（度）。
    pub slope_deg: f64,
    /// 单元内的高差（米）。
    pub relief: f64,
    /// 平面梯度（高程随 x/y 的变化率）。
    pub gradient: Option<Vector2>,
    /// 单元较短边的长度，用于确定箭头尺寸。
    pub size: f64,
}

/// 流向箭头：主干加两个箭头翼。
#[derive(Debug, Clone, PartialEq)]
pub struct FlowArrow {
    pub tail: Point2,
    pub tip: Point2,
    pub left_wing: Point2,
    pub right_wing: Point2,
}

/// 逐单元计算离散梯度与坡度。
pub fn cell_slopes(grid: &ProjectedGrid) -> Vec<CellSlope> {
    let mut cells = Vec::new();
    if grid.rows() < 2 || grid.columns() < 2 {
        return cells;
    }
    for row in 0..grid.rows() - 1 {
        for column in 0..grid.columns() - 1 {
            let p00 = grid.point(row, column);
            let p01 = grid.point(row, column + 1);
            let p10 = grid.point(row + 1, column);
            let p11 = grid.point(row + 1, column + 1);

            let u = Vector2::new(
                (p01.x() - p00.x() + p11.x() - p10.x()) * 0.5,
                (p01.y() - p00.y() + p11.y() - p10.y()) * 0.5,
            );
            let v = Vector2::new(
                (p10.x() - p00.x() + p11.x() - p01.x()) * 0.5,
                (p10.y() - p00.y() + p11.y() - p01.y()) * 0.5,
            );
            let dz_du = (p01.z() - p00.z() + p11.z() - p10.z()) * 0.5;
            let dz_dv = (p10.z() - p00.z() + p11.z() - p01.z()) * 0.5;

            let det = u.x() * v.y() - u.y() * v.x();
            let gradient = (det.abs() > EPSILON).then(|| {
                Vector2::new(
                    (dz_du * v.y() - dz_dv * u.y()) / det,
                    (u.x() * dz_dv - v.x() * dz_du) / det,
                )
            });
            let slope_deg = gradient.map_or(0.0, |g| g.length().atan().to_degrees());
            let corners = [p00.xy(), p01.xy(), p11.xy(), p10.xy()];
            cells.push(CellSlope {
                corners,
                center: centroid(&corners),
                slope_deg,
                relief: (dz_du * dz_du + dz_dv * dz_dv).sqrt(),
                gradient,
                size: u.length().min(v.length()),
            });
        }
    }
    cells
}

/// 为高差超过阈值的单元生成指向最速下降方向的箭头。
pub fn flow_vectors(cells: &[CellSlope], threshold: f64) -> Vec<FlowArrow> {
    cells
        .iter()
        .filter(|cell| cell.relief > threshold)
        .filter_map(|cell| {
            let descent = cell.gradient?.scale(-1.0).normalize()?;
            let length = cell.size * 0.4;
            if length <= EPSILON {
                return None;
            }
            let tail = cell.center.translate(descent.scale(-length * 0.5));
            let tip = cell.center.translate(descent.scale(length * 0.5));
            let wing = length * 0.3;
            let back = descent.angle() + PI;
            let left = back - PI / 6.0;
            let right = back + PI / 6.0;
            Some(FlowArrow {
                tail,
                tip,
                left_wing: tip.translate(Vector2::new(left.cos(), left.sin()).scale(wing)),
                right_wing: tip.translate(Vector2::new(right.cos(), right.sin()).scale(wing)),
            })
        })
        .collect()
}
