//! CPU rasterization primitives used by the software backend
//!
//! Clip space follows the `[0, 1]` depth convention of glam's `*_rh`
//! projections. Screen space has row 0 at the top.

use crate::backend::types::*;
use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

/// A color plane stored as linear floats
#[derive(Debug, Clone)]
pub struct ColorBuffer {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<Vec4>,
}

impl ColorBuffer {
    pub fn new(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            data: vec![Vec4::ZERO; (width * height) as usize],
        }
    }

    pub fn from_rgba8(format: TextureFormat, width: u32, height: u32, bytes: &[u8]) -> Self {
        let mut buffer = Self::new(format, width, height);
        for (texel, rgba) in buffer.data.iter_mut().zip(bytes.chunks_exact(4)) {
            *texel = Vec4::new(
                rgba[0] as f32,
                rgba[1] as f32,
                rgba[2] as f32,
                rgba[3] as f32,
            ) / 255.0;
        }
        buffer
    }

    pub fn to_rgba8(&self) -> Vec<u8> {
        self.data
            .iter()
            .flat_map(|c| {
                c.clamp(Vec4::ZERO, Vec4::ONE)
                    .to_array()
                    .map(|v| (v * 255.0 + 0.5) as u8)
            })
            .collect()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.data[self.index(x, y)]
    }

    /// Store a value, masking channels the format does not have
    pub fn set(&mut self, x: u32, y: u32, value: Vec4) {
        let mut value = if self.format.is_normalized() {
            value.clamp(Vec4::ZERO, Vec4::ONE)
        } else {
            value
        };
        match self.format.channels() {
            1 => value = Vec4::new(value.x, 0.0, 0.0, 1.0),
            2 => value = Vec4::new(value.x, value.y, 0.0, 1.0),
            _ => {}
        }
        let index = self.index(x, y);
        self.data[index] = value;
    }

    pub fn fill(&mut self, value: Vec4) {
        self.data.fill(value);
    }

    /// Sample at normalized coordinates with the given sampler
    pub fn sample(&self, uv: Vec2, sampler: &SamplerDescriptor) -> Vec4 {
        if self.width == 0 || self.height == 0 {
            return Vec4::ZERO;
        }
        let px = uv.x * self.width as f32 - 0.5;
        let py = uv.y * self.height as f32 - 0.5;
        let fetch = |x: i64, y: i64| {
            let x = sampler.address_mode_u.wrap(x, self.width);
            let y = sampler.address_mode_v.wrap(y, self.height);
            self.get(x, y)
        };

        match sampler.mag_filter {
            FilterMode::Nearest => fetch(px.round() as i64, py.round() as i64),
            FilterMode::Linear => {
                let (x0, y0) = (px.floor(), py.floor());
                let (tx, ty) = (px - x0, py - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = fetch(x0, y0).lerp(fetch(x0 + 1, y0), tx);
                let bottom = fetch(x0, y0 + 1).lerp(fetch(x0 + 1, y0 + 1), tx);
                top.lerp(bottom, ty)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepthStencilBuffer {
    pub width: u32,
    pub height: u32,
    pub depth: Vec<f32>,
    pub stencil: Vec<u8>,
}

impl DepthStencilBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            depth: vec![1.0; len],
            stencil: vec![0; len],
        }
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }
}

/// Color attachments plus optional depth-stencil
#[derive(Debug, Clone)]
pub struct Framebuffer {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub colors: Vec<ColorBuffer>,
    pub depth_stencil: Option<DepthStencilBuffer>,
}

impl Framebuffer {
    pub fn new(desc: &RenderTargetDescriptor) -> Self {
        Self {
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            colors: desc
                .color_formats
                .iter()
                .map(|f| ColorBuffer::new(*f, desc.width, desc.height))
                .collect(),
            depth_stencil: desc
                .depth_stencil
                .then(|| DepthStencilBuffer::new(desc.width, desc.height)),
        }
    }

    /// Reallocate every attachment at a new size; contents are lost
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        for color in &mut self.colors {
            *color = ColorBuffer::new(color.format, width, height);
        }
        if self.depth_stencil.is_some() {
            self.depth_stencil = Some(DepthStencilBuffer::new(width, height));
        }
    }
}

/// Vertex after the vertex stage
#[derive(Debug, Clone, Copy)]
pub struct ClipVertex {
    pub clip: Vec4,
    pub world: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl ClipVertex {
    fn lerp(&self, other: &ClipVertex, t: f32) -> ClipVertex {
        ClipVertex {
            clip: self.clip.lerp(other.clip, t),
            world: self.world.lerp(other.world, t),
            normal: self.normal.lerp(other.normal, t),
            uv: self.uv.lerp(other.uv, t),
        }
    }
}

/// Clip a polygon against the near plane `z >= 0`.
pub fn clip_near(polygon: &[ClipVertex]) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for i in 0..polygon.len() {
        let current = &polygon[i];
        let next = &polygon[(i + 1) % polygon.len()];
        let (dc, dn) = (current.clip.z, next.clip.z);

        if dc >= 0.0 {
            out.push(*current);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            let t = dc / (dc - dn);
            out.push(current.lerp(next, t));
        }
    }
    out
}

/// Vertex in pixel coordinates with perspective-divided attributes
#[derive(Debug, Clone, Copy)]
pub struct ScreenVertex {
    pub position: Vec2,
    pub depth: f32,
    pub inv_w: f32,
    pub world_w: Vec3,
    pub normal_w: Vec3,
    pub uv_w: Vec2,
}

impl ScreenVertex {
    pub fn from_clip(v: &ClipVertex, width: u32, height: u32) -> Self {
        let inv_w = 1.0 / v.clip.w;
        let ndc = v.clip.xyz() * inv_w;
        Self {
            position: Vec2::new(
                (ndc.x * 0.5 + 0.5) * width as f32,
                (0.5 - ndc.y * 0.5) * height as f32,
            ),
            depth: ndc.z,
            inv_w,
            world_w: v.world * inv_w,
            normal_w: v.normal * inv_w,
            uv_w: v.uv * inv_w,
        }
    }
}

/// Interpolated values for one covered pixel
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    pub world: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub front_facing: bool,
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let e = b - a;
    (e.y == 0.0 && e.x > 0.0) || e.y < 0.0
}

/// Signed area in screen space; negative for counter-clockwise NDC winding
pub fn screen_area(v: &[ScreenVertex; 3]) -> f32 {
    edge(v[0].position, v[1].position, v[2].position)
}

/// Rasterize one triangle with the top-left fill rule
pub fn rasterize_triangle<F>(
    vertices: [ScreenVertex; 3],
    front_facing: bool,
    width: u32,
    height: u32,
    mut emit: F,
) where
    F: FnMut(Fragment),
{
    let mut v = vertices;
    let mut area = screen_area(&v);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        v.swap(1, 2);
        area = -area;
    }

    let (p0, p1, p2) = (v[0].position, v[1].position, v[2].position);
    let min = p0.min(p1).min(p2).max(Vec2::ZERO);
    let max = p0.max(p1).max(p2).min(Vec2::new(width as f32, height as f32));
    if min.x >= max.x || min.y >= max.y {
        return;
    }

    let edges = [(p1, p2), (p2, p0), (p0, p1)];
    let bias = edges.map(|(a, b)| is_top_left(a, b));

    for y in (min.y.floor() as u32)..(max.y.ceil() as u32).min(height) {
        for x in (min.x.floor() as u32)..(max.x.ceil() as u32).min(width) {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w = edges.map(|(a, b)| edge(a, b, p));
            let inside = (0..3).all(|i| w[i] > 0.0 || (w[i] == 0.0 && bias[i]));
            if !inside {
                continue;
            }

            let (b0, b1, b2) = (w[0] / area, w[1] / area, w[2] / area);
            let depth = b0 * v[0].depth + b1 * v[1].depth + b2 * v[2].depth;
            if !(0.0..=1.0).contains(&depth) {
                continue;
            }

            let inv_w = b0 * v[0].inv_w + b1 * v[1].inv_w + b2 * v[2].inv_w;
            let w_correct = 1.0 / inv_w;
            emit(Fragment {
                x,
                y,
                depth,
                world: (v[0].world_w * b0 + v[1].world_w * b1 + v[2].world_w * b2) * w_correct,
                normal: (v[0].normal_w * b0 + v[1].normal_w * b1 + v[2].normal_w * b2)
                    * w_correct,
                uv: (v[0].uv_w * b0 + v[1].uv_w * b1 + v[2].uv_w * b2) * w_correct,
                front_facing,
            });
        }
    }
}

/// Rasterize a line segment one pixel wide
pub fn rasterize_line<F>(a: ScreenVertex, b: ScreenVertex, width: u32, height: u32, mut emit: F)
where
    F: FnMut(Fragment),
{
    let delta = b.position - a.position;
    let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as u32;
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let p = a.position + delta * t;
        if p.x < 0.0 || p.y < 0.0 || p.x >= width as f32 || p.y >= height as f32 {
            continue;
        }
        let depth = a.depth + (b.depth - a.depth) * t;
        if !(0.0..=1.0).contains(&depth) {
            continue;
        }
        let inv_w = a.inv_w + (b.inv_w - a.inv_w) * t;
        let w_correct = 1.0 / inv_w;
        emit(Fragment {
            x: p.x as u32,
            y: p.y as u32,
            depth,
            world: a.world_w.lerp(b.world_w, t) * w_correct,
            normal: a.normal_w.lerp(b.normal_w, t) * w_correct,
            uv: a.uv_w.lerp(b.uv_w, t) * w_correct,
            front_facing: true,
        });
    }
}

fn blend_factor(factor: BlendFactor, src: Vec4, dst: Vec4) -> Vec4 {
    match factor {
        BlendFactor::Zero => Vec4::ZERO,
        BlendFactor::One => Vec4::ONE,
        BlendFactor::Src => src,
        BlendFactor::OneMinusSrc => Vec4::ONE - src,
        BlendFactor::SrcAlpha => Vec4::splat(src.w),
        BlendFactor::OneMinusSrcAlpha => Vec4::splat(1.0 - src.w),
        BlendFactor::Dst => dst,
        BlendFactor::OneMinusDst => Vec4::ONE - dst,
        BlendFactor::DstAlpha => Vec4::splat(dst.w),
        BlendFactor::OneMinusDstAlpha => Vec4::splat(1.0 - dst.w),
    }
}

fn blend_component(component: &BlendComponent, src: Vec4, dst: Vec4) -> Vec4 {
    let s = src * blend_factor(component.src_factor, src, dst);
    let d = dst * blend_factor(component.dst_factor, src, dst);
    match component.operation {
        BlendOperation::Add => s + d,
        BlendOperation::Subtract => s - d,
        BlendOperation::ReverseSubtract => d - s,
        BlendOperation::Min => src.min(dst),
        BlendOperation::Max => src.max(dst),
    }
}

pub fn blend(state: &BlendState, src: Vec4, dst: Vec4) -> Vec4 {
    let color = blend_component(&state.color, src, dst);
    let alpha = blend_component(&state.alpha, src, dst);
    color.xyz().extend(alpha.w)
}

pub fn apply_color_writes(mask: ColorWrites, new: Vec4, old: Vec4) -> Vec4 {
    Vec4::new(
        if mask.contains(ColorWrites::RED) { new.x } else { old.x },
        if mask.contains(ColorWrites::GREEN) { new.y } else { old.y },
        if mask.contains(ColorWrites::BLUE) { new.z } else { old.z },
        if mask.contains(ColorWrites::ALPHA) { new.w } else { old.w },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(x: f32, y: f32) -> ScreenVertex {
        ScreenVertex {
            position: Vec2::new(x, y),
            depth: 0.5,
            inv_w: 1.0,
            world_w: Vec3::ZERO,
            normal_w: Vec3::Y,
            uv_w: Vec2::ZERO,
        }
    }

    #[test]
    fn test_shared_edge_is_covered_once() {
        let mut hits = vec![0u32; 16 * 16];
        let quad = [screen(0.0, 0.0), screen(16.0, 0.0), screen(16.0, 16.0), screen(0.0, 16.0)];
        for tri in [[quad[0], quad[1], quad[2]], [quad[0], quad[2], quad[3]]] {
            rasterize_triangle(tri, true, 16, 16, |f| hits[(f.y * 16 + f.x) as usize] += 1);
        }
        assert!(hits.iter().all(|h| *h == 1));
    }

    #[test]
    fn test_clip_near_splits_triangle() {
        let vertex = |z: f32| ClipVertex {
            clip: Vec4::new(0.0, 0.0, z, 1.0),
            world: Vec3::ZERO,
            normal: Vec3::Y,
            uv: Vec2::ZERO,
        };
        assert_eq!(clip_near(&[vertex(0.5), vertex(0.5), vertex(0.5)]).len(), 3);
        assert_eq!(clip_near(&[vertex(0.5), vertex(0.5), vertex(-0.5)]).len(), 4);
        assert_eq!(clip_near(&[vertex(0.5), vertex(-0.5), vertex(-0.5)]).len(), 3);
        assert!(clip_near(&[vertex(-0.5), vertex(-0.5), vertex(-0.5)]).is_empty());
    }

    #[test]
    fn test_additive_and_alpha_blend() {
        let dst = Vec4::new(0.2, 0.2, 0.2, 1.0);
        let src = Vec4::new(0.5, 0.0, 0.0, 0.5);
        let added = blend(&BlendState::additive(), src, dst);
        assert!((added.x - 0.7).abs() < 1e-6);
        let mixed = blend(&BlendState::alpha_blending(), src, dst);
        assert!((mixed.x - 0.35).abs() < 1e-6);
        assert!((mixed.y - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_linear_sampling_midpoint() {
        let mut buffer = ColorBuffer::new(TextureFormat::Rgba32Float, 2, 1);
        buffer.set(0, 0, Vec4::ZERO);
        buffer.set(1, 0, Vec4::ONE);
        let mid = buffer.sample(Vec2::new(0.5, 0.5), &SamplerDescriptor::default());
        assert!((mid.x - 0.5).abs() < 1e-6);
    }
}
