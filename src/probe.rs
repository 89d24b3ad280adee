//! Listener probe and probe cache (C9): ray tracing a listener position
//! against the world BVH to derive room-geometry statistics, with a small
//! LRU of recent probes so nearby listener movement doesn't re-trace.

use crate::trace::bvh::{Material, WorldBvh};
use crate::math::ray::Ray;
use futures::executor::ThreadPool;
use nalgebra::Vector3;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const SPEED_OF_SOUND_M_PER_S: f32 = 343.0;
const MAX_SEGMENTS_PER_RAY: usize = 16;

#[derive(Clone, Debug)]
pub struct RaySegment {
    pub origin: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub length: f32,
    pub material: Material,
    /// Sub-ray continuing straight through the hit surface, present when
    /// the material transmits enough energy to bother tracing it and
    /// transmit budget remains.
    pub transmitted: Vec<RaySegment>,
}

#[derive(Clone, Debug, Default)]
pub struct TracedRay {
    pub segments: Vec<RaySegment>,
}

#[derive(Copy, Clone, Debug)]
pub struct RoomStatistics {
    pub volume: f32,
    pub surface: f32,
    pub sabine: [f32; 3],
    pub reverb_time: [f32; 3],
    pub mean_free_path: f32,
    pub echo_delay: f32,
    pub absorption: [f32; 3],
    pub min_extent: Vector3<f32>,
    pub max_extent: Vector3<f32>,
}

#[derive(Clone, Debug)]
pub struct Probe {
    pub position: Vector3<f32>,
    pub range: f32,
    pub rays: Vec<TracedRay>,
    pub stats: RoomStatistics,
}

fn fibonacci_sphere_direction(index: u32, count: u32) -> Vector3<f32> {
    let count = count.max(1) as f32;
    let golden_angle = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
    let y = 1.0 - (index as f32 / (count - 1.0).max(1.0)) * 2.0;
    let radius = (1.0 - y * y).max(0.0).sqrt();
    let theta = golden_angle * index as f32;
    Vector3::new(theta.cos() * radius, y, theta.sin() * radius)
}

fn trace_ray_recursive(
    bvh: &WorldBvh,
    origin: Vector3<f32>,
    direction: Vector3<f32>,
    remaining_range: f32,
    bounces_left: u32,
    transmits_left: u32,
    depth: usize,
) -> Vec<RaySegment> {
    if depth >= MAX_SEGMENTS_PER_RAY || remaining_range <= 0.0 {
        return Vec::new();
    }

    let ray = Ray::new(origin, direction.scale(remaining_range));
    let Some(hit) = bvh.first_hit(&ray, 1.0) else {
        return vec![RaySegment {
            origin,
            direction,
            length: remaining_range,
            material: Material::default(),
            transmitted: Vec::new(),
        }];
    };

    let length = remaining_range * hit.t;
    let hit_point = origin + direction.scale(length);

    let transmits_energy = hit.material.transmission.iter().any(|t| *t > 0.01);
    let transmitted = if transmits_left > 0 && transmits_energy {
        trace_ray_recursive(
            bvh,
            hit_point + direction.scale(1.0e-3),
            direction,
            remaining_range - length,
            bounces_left,
            transmits_left - 1,
            depth + 1,
        )
    } else {
        Vec::new()
    };

    let mut segments = vec![RaySegment {
        origin,
        direction,
        length,
        material: hit.material,
        transmitted,
    }];

    if bounces_left > 0 {
        let verts = bvh.triangle_vertices(hit.triangle);
        let normal = (verts[1] - verts[0]).cross(&(verts[2] - verts[0])).normalize();
        let reflected = (direction - normal.scale(2.0 * direction.dot(&normal))).normalize();
        segments.extend(trace_ray_recursive(
            bvh,
            hit_point + reflected.scale(1.0e-3),
            reflected,
            remaining_range - length,
            bounces_left - 1,
            transmits_left,
            depth + 1,
        ));
    }

    segments
}

fn build_probe_from_rays(position: Vector3<f32>, range: f32, rays: Vec<TracedRay>) -> Probe {
    let mut distance_sum = 0.0f32;
    let mut distance_count = 0u32;
    let mut absorption_acc = [0.0f32; 3];

    for ray in &rays {
        if let Some(first) = ray.segments.first() {
            distance_sum += first.length;
            distance_count += 1;
            for band in 0..3 {
                absorption_acc[band] += first.material.absorption[band];
            }
        }
    }

    let avg_distance = if distance_count > 0 {
        distance_sum / distance_count as f32
    } else {
        range
    };
    let absorption = if distance_count > 0 {
        let n = distance_count as f32;
        [absorption_acc[0] / n, absorption_acc[1] / n, absorption_acc[2] / n]
    } else {
        [0.1, 0.1, 0.1]
    };

    // Cheap room estimate: treat the average first-hit distance as an
    // effective room radius (§4.9's "volume from first-hit distances").
    let volume = (4.0 / 3.0) * std::f32::consts::PI * avg_distance.powi(3);
    let surface = 4.0 * std::f32::consts::PI * avg_distance.powi(2);

    let mut sabine = [0.0f32; 3];
    let mut reverb_time = [0.0f32; 3];
    for band in 0..3 {
        sabine[band] = surface * absorption[band];
        // Sabine reverberation time: RT60 = 0.161 * V / (S * alpha).
        reverb_time[band] = if sabine[band] > 0.0 { 0.161 * volume / sabine[band] } else { 0.0 };
    }

    let mean_free_path = if surface > 0.0 { 4.0 * volume / surface } else { 0.0 };
    let echo_delay = mean_free_path / SPEED_OF_SOUND_M_PER_S;
    let half = Vector3::new(avg_distance, avg_distance, avg_distance);

    Probe {
        position,
        range,
        rays,
        stats: RoomStatistics {
            volume,
            surface,
            sabine,
            reverb_time,
            mean_free_path,
            echo_delay,
            absorption,
            min_extent: position - half,
            max_extent: position + half,
        },
    }
}

/// Synchronous trace, used directly by tests and by callers with no thread
/// pool available.
pub fn trace_probe(bvh: &WorldBvh, position: Vector3<f32>, range: f32, ray_count: u32, max_bounces: u32, max_transmits: u32) -> Probe {
    let rays = (0..ray_count)
        .map(|i| {
            let direction = fibonacci_sphere_direction(i, ray_count);
            TracedRay {
                segments: trace_ray_recursive(bvh, position, direction, range, max_bounces, max_transmits, 0),
            }
        })
        .collect();
    build_probe_from_rays(position, range, rays)
}

/// Parallel trace across a `futures` thread pool (§4.9, §5). `cancel` is
/// polled between rays so a listener disappearing mid-compute can abandon
/// the probe; on cancellation this returns `None` and any partial work is
/// dropped, matching the cooperative-cancellation contract of §5.
pub fn trace_probe_parallel(
    pool: &ThreadPool,
    bvh: Arc<WorldBvh>,
    position: Vector3<f32>,
    range: f32,
    ray_count: u32,
    max_bounces: u32,
    max_transmits: u32,
    cancel: Arc<AtomicBool>,
) -> Option<Probe> {
    let worker_count = 4u32.min(ray_count.max(1));
    let rays_per_worker = ray_count.div_ceil(worker_count);
    let (tx, rx) = std::sync::mpsc::channel::<Vec<TracedRay>>();

    for worker in 0..worker_count {
        let bvh = bvh.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        let start = worker * rays_per_worker;
        let end = (start + rays_per_worker).min(ray_count);
        pool.spawn_ok(async move {
            let mut rays = Vec::new();
            for i in start..end {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let direction = fibonacci_sphere_direction(i, ray_count);
                rays.push(TracedRay {
                    segments: trace_ray_recursive(&bvh, position, direction, range, max_bounces, max_transmits, 0),
                });
            }
            let _ = tx.send(rays);
        });
    }
    drop(tx);

    let mut all_rays = Vec::new();
    while let Ok(batch) = rx.recv() {
        all_rays.extend(batch);
    }

    if cancel.load(Ordering::Relaxed) {
        return None;
    }

    Some(build_probe_from_rays(position, range, all_rays))
}

/// Small LRU of recent probes: linear scan beats a hash map at the expected
/// scale (≤ 32 entries per listener/meter), matching `deoalASoundLevelMeter`.
pub struct ProbeCache {
    capacity: usize,
    reuse_distance: f32,
    entries: Vec<Probe>,
}

impl ProbeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            reuse_distance: 0.25,
            entries: Vec::new(),
        }
    }

    /// Returns a cached probe within `reuse_distance` of `position`,
    /// promoting it to most-recently-used.
    pub fn find_reusable(&mut self, position: Vector3<f32>) -> Option<&Probe> {
        let index = self
            .entries
            .iter()
            .position(|probe| (probe.position - position).norm() <= self.reuse_distance)?;
        let probe = self.entries.remove(index);
        self.entries.insert(0, probe);
        self.entries.first()
    }

    /// Inserts a freshly traced probe, evicting the least-recently-used
    /// entry if the cache is at capacity.
    pub fn insert(&mut self, probe: Probe) {
        self.entries.insert(0, probe);
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invalidates every cached probe, used when the octree's nearby-component
    /// set changes enough to make cached room statistics stale.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::trace::bvh::TaggedTriangle;

    fn enclosing_box_bvh(half_size: f32) -> WorldBvh {
        let mut triangles = Vec::new();
        let faces = [
            (Vector3::new(0.0, 0.0, -half_size), Vector3::new(0.0, 0.0, 1.0)),
            (Vector3::new(0.0, 0.0, half_size), Vector3::new(0.0, 0.0, -1.0)),
            (Vector3::new(-half_size, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
            (Vector3::new(half_size, 0.0, 0.0), Vector3::new(-1.0, 0.0, 0.0)),
            (Vector3::new(0.0, -half_size, 0.0), Vector3::new(0.0, 1.0, 0.0)),
            (Vector3::new(0.0, half_size, 0.0), Vector3::new(0.0, -1.0, 0.0)),
        ];
        for (center, normal) in faces {
            let tangent = if normal.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
            let u = normal.cross(&tangent).normalize().scale(half_size * 2.0);
            let v = normal.cross(&u).normalize().scale(half_size * 2.0);
            triangles.push(TaggedTriangle {
                vertices: [center - u - v, center + u - v, center + u + v],
                component: 0,
                material: Material::default(),
            });
            triangles.push(TaggedTriangle {
                vertices: [center - u - v, center + u + v, center - u + v],
                component: 0,
                material: Material::default(),
            });
        }
        WorldBvh::build(triangles, 2)
    }

    #[test]
    fn trace_probe_inside_box_estimates_positive_reverb_time() {
        let bvh = enclosing_box_bvh(5.0);
        let probe = trace_probe(&bvh, Vector3::new(0.0, 0.0, 0.0), 20.0, 32, 1, 0);
        assert!(probe.stats.volume > 0.0);
        assert!(probe.stats.reverb_time.iter().all(|t| *t >= 0.0));
    }

    #[test]
    fn probe_cache_reuses_within_threshold_and_evicts_lru() {
        let mut cache = ProbeCache::new(2);
        let p1 = Probe {
            position: Vector3::new(0.0, 0.0, 0.0),
            range: 10.0,
            rays: Vec::new(),
            stats: build_probe_from_rays(Vector3::zeros(), 10.0, Vec::new()).stats,
        };
        cache.insert(p1);
        assert!(cache.find_reusable(Vector3::new(0.1, 0.0, 0.0)).is_some());
        assert!(cache.find_reusable(Vector3::new(10.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn probe_cache_respects_capacity() {
        let mut cache = ProbeCache::new(1);
        cache.insert(build_probe_from_rays(Vector3::new(0.0, 0.0, 0.0), 10.0, Vec::new()));
        cache.insert(build_probe_from_rays(Vector3::new(100.0, 0.0, 0.0), 10.0, Vec::new()));
        assert_eq!(cache.len(), 1);
    }
}
