//! Software reference backend
//!
//! Executes every [`GraphicsBackend`] command on the CPU: near-plane clipping,
//! the top-left fill rule, separate front/back stencil ops, depth test and
//! write, blending and color masks. Fragment programs are small reference
//! approximations of the real shaders; they exist so that draw ordering,
//! stencil marking and state transitions can be observed and tested.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::backend::raster::*;
use crate::backend::traits::*;
use crate::backend::types::*;

const SCREEN: u64 = 0;
const MAX_OUTPUTS: usize = 4;

#[derive(Debug)]
struct GpuMesh {
    label: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    topology: PrimitiveTopology,
}

/// One submitted draw, as seen by the backend
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub program: ShaderProgram,
    pub target: Option<RenderTargetHandle>,
    pub state: RenderState,
    /// Fragments that passed every test and reached the color stage
    pub fragments: u64,
}

/// Counters accumulated since creation
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareStats {
    pub frames: u64,
    pub draw_calls: u64,
    pub fragments: u64,
    pub clears: u64,
}

/// CPU implementation of [`GraphicsBackend`]
#[derive(Debug)]
pub struct SoftwareBackend {
    width: u32,
    height: u32,
    targets: HashMap<u64, Framebuffer>,
    textures: HashMap<u64, ColorBuffer>,
    meshes: HashMap<u64, Arc<GpuMesh>>,
    next_id: u64,
    bound: u64,
    state: RenderState,
    units: BTreeMap<u32, (TextureSource, SamplerDescriptor)>,
    draw_log: Vec<DrawRecord>,
    stats: SoftwareStats,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        let mut targets = HashMap::new();
        targets.insert(
            SCREEN,
            Framebuffer::new(&RenderTargetDescriptor {
                label: "screen".to_string(),
                width,
                height,
                color_formats: vec![TextureFormat::Rgba8Unorm],
                depth_stencil: true,
            }),
        );
        log::trace!("SoftwareBackend: created {}x{} screen", width, height);

        Self {
            width,
            height,
            targets,
            textures: HashMap::new(),
            meshes: HashMap::new(),
            next_id: SCREEN + 1,
            bound: SCREEN,
            state: RenderState::default(),
            units: BTreeMap::new(),
            draw_log: Vec::new(),
            stats: SoftwareStats::default(),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn target_id(target: Option<RenderTargetHandle>) -> u64 {
        target.map_or(SCREEN, |t| t.0)
    }

    fn handle(id: u64) -> Option<RenderTargetHandle> {
        (id != SCREEN).then_some(RenderTargetHandle(id))
    }

    fn framebuffer(&self, target: Option<RenderTargetHandle>) -> BackendResult<&Framebuffer> {
        self.targets
            .get(&Self::target_id(target))
            .ok_or_else(|| BackendError::InvalidHandle(format!("render target {:?}", target)))
    }

    /// Draws submitted since the current frame began or the log was cleared
    pub fn draw_log(&self) -> &[DrawRecord] {
        &self.draw_log
    }

    pub fn clear_draw_log(&mut self) {
        self.draw_log.clear();
    }

    pub fn stats(&self) -> SoftwareStats {
        self.stats
    }

    /// Pixels whose stencil value is nonzero
    pub fn stencil_nonzero_count(&self, target: Option<RenderTargetHandle>) -> BackendResult<usize> {
        let fb = self.framebuffer(target)?;
        let ds = fb
            .depth_stencil
            .as_ref()
            .ok_or_else(|| BackendError::ReadbackFailed(format!("{} has no stencil", fb.label)))?;
        Ok(ds.stencil.iter().filter(|s| **s != 0).count())
    }

    pub fn color_at(
        &self,
        target: Option<RenderTargetHandle>,
        index: u32,
        x: u32,
        y: u32,
    ) -> BackendResult<Vec4> {
        let fb = self.framebuffer(target)?;
        let color = fb
            .colors
            .get(index as usize)
            .ok_or_else(|| BackendError::ReadbackFailed(format!("{} attachment {}", fb.label, index)))?;
        if x >= color.width || y >= color.height {
            return Err(BackendError::ReadbackFailed(format!("pixel {x},{y} out of range")));
        }
        Ok(color.get(x, y))
    }

    pub fn depth_at(&self, target: Option<RenderTargetHandle>, x: u32, y: u32) -> BackendResult<f32> {
        let fb = self.framebuffer(target)?;
        let ds = fb
            .depth_stencil
            .as_ref()
            .ok_or_else(|| BackendError::ReadbackFailed(format!("{} has no depth", fb.label)))?;
        if x >= ds.width || y >= ds.height {
            return Err(BackendError::ReadbackFailed(format!("pixel {x},{y} out of range")));
        }
        Ok(ds.depth[ds.index(x, y)])
    }

    fn sample_unit(&self, unit: u32, uv: Vec2) -> Option<Vec4> {
        let (source, sampler) = self.units.get(&unit)?;
        match source {
            TextureSource::Texture(handle) => {
                self.textures.get(&handle.0).map(|t| t.sample(uv, sampler))
            }
            TextureSource::Attachment { target, index } => self
                .targets
                .get(&target.0)
                .and_then(|fb| fb.colors.get(*index as usize))
                .map(|c| c.sample(uv, sampler)),
            TextureSource::Depth(target) => {
                let ds = self.targets.get(&target.0)?.depth_stencil.as_ref()?;
                let x = sampler.address_mode_u.wrap((uv.x * ds.width as f32) as i64, ds.width);
                let y = sampler.address_mode_v.wrap((uv.y * ds.height as f32) as i64, ds.height);
                let d = ds.depth[ds.index(x, y)];
                Some(Vec4::new(d, d, d, 1.0))
            }
        }
    }

    /// Reference fragment programs
    fn shade(
        &self,
        program: ShaderProgram,
        uniforms: &DrawUniforms,
        fragment: &Fragment,
        screen_uv: Vec2,
    ) -> [Vec4; MAX_OUTPUTS] {
        let mut out = [Vec4::ZERO; MAX_OUTPUTS];
        let sample = |unit: u32, uv: Vec2| self.sample_unit(unit, uv);

        match program {
            ShaderProgram::Geometry | ShaderProgram::Terrain => {
                let albedo = sample(0, fragment.uv).unwrap_or(Vec4::ONE) * uniforms.color;
                let normal = fragment.normal.normalize_or_zero();
                out[0] = albedo;
                out[1] = (normal * 0.5 + Vec3::splat(0.5)).extend(1.0);
                out[2] = uniforms.params.xyz().extend(1.0);
            }
            ShaderProgram::ShadowDepth | ShaderProgram::BackfaceDepth => {
                out[0] = Vec4::new(fragment.depth, 0.0, 0.0, 1.0);
            }
            ShaderProgram::ShadowVariance => {
                let d = fragment.depth;
                out[0] = Vec4::new(d, d * d, 0.0, 1.0);
            }
            ShaderProgram::StencilMark => {}
            ShaderProgram::PointLight => {
                let albedo = sample(0, screen_uv).unwrap_or(Vec4::ONE);
                out[0] = (albedo.xyz() * uniforms.color.xyz()).extend(1.0);
            }
            ShaderProgram::Forward | ShaderProgram::Lines => {
                out[0] = sample(0, fragment.uv).unwrap_or(Vec4::ONE) * uniforms.color;
            }
            ShaderProgram::BloomBrightPass => {
                let c = sample(0, screen_uv).unwrap_or(Vec4::ZERO);
                let threshold = uniforms.params.y;
                out[0] = ((c.xyz() - Vec3::splat(threshold)).max(Vec3::ZERO) * uniforms.color.xyz())
                    .extend(uniforms.color.w);
            }
            ShaderProgram::PostProcess => {
                let lit = sample(0, screen_uv).unwrap_or(Vec4::ZERO);
                let bloom = sample(1, screen_uv).unwrap_or(Vec4::ZERO);
                let exposure = uniforms.params.y.max(1e-3);
                let gamma = uniforms.params.z.max(1e-3);
                let hdr = lit.xyz() * uniforms.color.xyz() + bloom.xyz() * uniforms.params.x;
                let mapped = (Vec3::ONE - (-hdr * exposure).exp()).powf(1.0 / gamma);
                out[0] = mapped.extend(1.0);
            }
            _ => {
                let primary = sample(0, screen_uv).unwrap_or(Vec4::ONE);
                let secondary = sample(1, screen_uv).unwrap_or(Vec4::ZERO);
                out[0] = primary * uniforms.color + secondary * uniforms.params.x;
            }
        }
        out
    }

    /// Run the per-fragment test and write stages against `fb`
    fn process_fragment(
        &self,
        fb: &mut Framebuffer,
        program: ShaderProgram,
        uniforms: &DrawUniforms,
        fragment: &Fragment,
    ) -> bool {
        let state = &self.state;
        let (x, y) = (fragment.x, fragment.y);

        if let Some(ds) = fb.depth_stencil.as_mut() {
            let index = ds.index(x, y);
            let stored_stencil = ds.stencil[index];

            let stencil = state.stencil.map(|s| {
                let face = if fragment.front_facing { s.front } else { s.back };
                (s, face)
            });

            let updated = |s: &StencilState, op: StencilOperation| {
                let value = op.apply(stored_stencil, s.reference);
                (stored_stencil & !s.write_mask) | (value & s.write_mask)
            };

            if let Some((s, face)) = &stencil {
                let passes = face
                    .compare
                    .passes(s.reference & s.read_mask, stored_stencil & s.read_mask);
                if !passes {
                    ds.stencil[index] = updated(s, face.fail_op);
                    return false;
                }
            }

            if let Some(compare) = state.depth.test {
                if !compare.passes(fragment.depth, ds.depth[index]) {
                    if let Some((s, face)) = &stencil {
                        ds.stencil[index] = updated(s, face.depth_fail_op);
                    }
                    return false;
                }
            }

            if let Some((s, face)) = &stencil {
                ds.stencil[index] = updated(s, face.pass_op);
            }
            if state.depth.test.is_some() && state.depth.write {
                ds.depth[index] = fragment.depth;
            }
        }

        if state.color_writes.is_empty() {
            return true;
        }

        let screen_uv = Vec2::new(
            (x as f32 + 0.5) / fb.width as f32,
            (y as f32 + 0.5) / fb.height as f32,
        );
        let outputs = self.shade(program, uniforms, fragment, screen_uv);
        for (color, output) in fb.colors.iter_mut().zip(outputs) {
            let dst = color.get(x, y);
            let src = match &state.blend {
                Some(blend_state) => blend(blend_state, output, dst),
                None => output,
            };
            color.set(x, y, apply_color_writes(state.color_writes, src, dst));
        }
        true
    }

    fn take_bound(&mut self) -> BackendResult<Framebuffer> {
        self.targets
            .remove(&self.bound)
            .ok_or_else(|| BackendError::InvalidHandle(format!("bound target {}", self.bound)))
    }

    fn record(&mut self, program: ShaderProgram, fragments: u64) {
        self.stats.draw_calls += 1;
        self.stats.fragments += fragments;
        self.draw_log.push(DrawRecord {
            program,
            target: Self::handle(self.bound),
            state: self.state,
            fragments,
        });
    }

    fn culled(&self, front_facing: bool) -> bool {
        match self.state.cull_mode {
            CullMode::None => false,
            CullMode::Front => front_facing,
            CullMode::Back => !front_facing,
        }
    }

    fn rasterize_mesh(
        &self,
        fb: &mut Framebuffer,
        mesh: &GpuMesh,
        program: ShaderProgram,
        uniforms: &DrawUniforms,
    ) -> u64 {
        let normal_matrix = uniforms.model.inverse().transpose();
        let to_clip = |v: &Vertex| {
            let world = uniforms.model.transform_point3(v.position);
            ClipVertex {
                clip: uniforms.view_proj * world.extend(1.0),
                world,
                normal: normal_matrix.transform_vector3(v.normal),
                uv: v.uv,
            }
        };
        let (width, height) = (fb.width, fb.height);
        let mut fragments = 0;

        match mesh.topology {
            PrimitiveTopology::TriangleList => {
                for tri in mesh.indices.chunks_exact(3) {
                    let clipped = clip_near(&[
                        to_clip(&mesh.vertices[tri[0] as usize]),
                        to_clip(&mesh.vertices[tri[1] as usize]),
                        to_clip(&mesh.vertices[tri[2] as usize]),
                    ]);
                    if clipped.len() < 3 {
                        continue;
                    }
                    let screen: Vec<ScreenVertex> = clipped
                        .iter()
                        .map(|v| ScreenVertex::from_clip(v, width, height))
                        .collect();

                    // Facing is decided once for the whole clipped polygon.
                    let area = screen_area(&[screen[0], screen[1], screen[2]]);
                    let ccw = area < 0.0;
                    let front_facing = match self.state.front_face {
                        FrontFace::Ccw => ccw,
                        FrontFace::Cw => !ccw,
                    };
                    if self.culled(front_facing) {
                        continue;
                    }

                    for i in 1..screen.len() - 1 {
                        rasterize_triangle(
                            [screen[0], screen[i], screen[i + 1]],
                            front_facing,
                            width,
                            height,
                            |f| {
                                if self.process_fragment(fb, program, uniforms, &f) {
                                    fragments += 1;
                                }
                            },
                        );
                    }
                }
            }
            PrimitiveTopology::LineList => {
                for line in mesh.indices.chunks_exact(2) {
                    let a = to_clip(&mesh.vertices[line[0] as usize]);
                    let b = to_clip(&mesh.vertices[line[1] as usize]);
                    let (a, b) = match (a.clip.z >= 0.0, b.clip.z >= 0.0) {
                        (true, true) => (a, b),
                        (false, false) => continue,
                        (a_in, _) => {
                            let t = a.clip.z / (a.clip.z - b.clip.z);
                            let cut = ClipVertex {
                                clip: a.clip.lerp(b.clip, t),
                                world: a.world.lerp(b.world, t),
                                normal: a.normal,
                                uv: a.uv.lerp(b.uv, t),
                            };
                            if a_in {
                                (a, cut)
                            } else {
                                (cut, b)
                            }
                        }
                    };
                    rasterize_line(
                        ScreenVertex::from_clip(&a, width, height),
                        ScreenVertex::from_clip(&b, width, height),
                        width,
                        height,
                        |f| {
                            if self.process_fragment(fb, program, uniforms, &f) {
                                fragments += 1;
                            }
                        },
                    );
                }
            }
            PrimitiveTopology::PointList => {
                for index in &mesh.indices {
                    let v = to_clip(&mesh.vertices[*index as usize]);
                    if v.clip.z < 0.0 {
                        continue;
                    }
                    let s = ScreenVertex::from_clip(&v, width, height);
                    rasterize_line(s, s, width, height, |f| {
                        if self.process_fragment(fb, program, uniforms, &f) {
                            fragments += 1;
                        }
                    });
                }
            }
        }
        fragments
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "Software Backend"
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        self.width = width;
        self.height = height;
        if let Some(screen) = self.targets.get_mut(&SCREEN) {
            screen.resize(width, height);
        }
        log::debug!("SoftwareBackend: resized screen to {}x{}", width, height);
        Ok(())
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.bound = SCREEN;
        self.draw_log.clear();
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.stats.frames += 1;
        self.units.clear();
        Ok(())
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle> {
        log::trace!(
            "SoftwareBackend: creating texture {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );
        let expected = (desc.width * desc.height * 4) as usize;
        let buffer = match data {
            Some(bytes) if bytes.len() != expected => {
                return Err(BackendError::TextureCreationFailed(format!(
                    "{:?}: expected {} bytes, got {}",
                    desc.label,
                    expected,
                    bytes.len()
                )))
            }
            Some(bytes) => ColorBuffer::from_rgba8(desc.format, desc.width, desc.height, bytes),
            None => ColorBuffer::new(desc.format, desc.width, desc.height),
        };
        let id = self.allocate_id();
        self.textures.insert(id, buffer);
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<RenderTargetHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::RenderTargetCreationFailed(format!(
                "{} has zero size",
                desc.label
            )));
        }
        log::trace!(
            "SoftwareBackend: creating render target {} ({}x{}, {} color, depth: {})",
            desc.label,
            desc.width,
            desc.height,
            desc.color_formats.len(),
            desc.depth_stencil
        );
        let id = self.allocate_id();
        self.targets.insert(id, Framebuffer::new(desc));
        Ok(RenderTargetHandle(id))
    }

    fn resize_render_target(
        &mut self,
        target: RenderTargetHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let fb = self
            .targets
            .get_mut(&target.0)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{:?}", target)))?;
        fb.resize(width.max(1), height.max(1));
        Ok(())
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        if target.0 != SCREEN {
            self.targets.remove(&target.0);
        }
    }

    fn create_mesh(&mut self, desc: &MeshDescriptor) -> BackendResult<MeshHandle> {
        if let Some(bad) = desc.indices.iter().find(|i| **i as usize >= desc.vertices.len()) {
            return Err(BackendError::MeshCreationFailed(format!(
                "{}: index {} out of {} vertices",
                desc.label,
                bad,
                desc.vertices.len()
            )));
        }
        log::trace!(
            "SoftwareBackend: creating mesh {} ({} vertices, {} indices)",
            desc.label,
            desc.vertices.len(),
            desc.indices.len()
        );
        let id = self.allocate_id();
        self.meshes.insert(
            id,
            Arc::new(GpuMesh {
                label: desc.label.to_string(),
                vertices: desc.vertices.to_vec(),
                indices: desc.indices.to_vec(),
                topology: desc.topology,
            }),
        );
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh.0);
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) -> BackendResult<()> {
        let id = Self::target_id(target);
        if !self.targets.contains_key(&id) {
            return Err(BackendError::InvalidHandle(format!("render target {:?}", target)));
        }
        self.bound = id;
        Ok(())
    }

    fn clear(&mut self, flags: ClearFlags, values: &ClearValues) -> BackendResult<()> {
        let bound = self.bound;
        let fb = self
            .targets
            .get_mut(&bound)
            .ok_or_else(|| BackendError::InvalidHandle(format!("bound target {}", bound)))?;
        if flags.contains(ClearFlags::COLOR) {
            for color in &mut fb.colors {
                color.fill(values.color);
            }
        }
        if let Some(ds) = fb.depth_stencil.as_mut() {
            if flags.contains(ClearFlags::DEPTH) {
                ds.depth.fill(values.depth);
            }
            if flags.contains(ClearFlags::STENCIL) {
                ds.stencil.fill(values.stencil);
            }
        }
        self.stats.clears += 1;
        Ok(())
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.state = *state;
    }

    fn render_state(&self) -> RenderState {
        self.state
    }

    fn bind_texture(
        &mut self,
        unit: u32,
        source: TextureSource,
        sampler: &SamplerDescriptor,
    ) -> BackendResult<()> {
        let valid = match source {
            TextureSource::Texture(handle) => self.textures.contains_key(&handle.0),
            TextureSource::Attachment { target, index } => self
                .targets
                .get(&target.0)
                .is_some_and(|fb| (index as usize) < fb.colors.len()),
            TextureSource::Depth(target) => self
                .targets
                .get(&target.0)
                .is_some_and(|fb| fb.depth_stencil.is_some()),
        };
        if !valid {
            return Err(BackendError::InvalidHandle(format!("texture source {:?}", source)));
        }
        self.units.insert(unit, (source, *sampler));
        Ok(())
    }

    fn unbind_textures(&mut self) {
        self.units.clear();
    }

    fn blit_depth_stencil(
        &mut self,
        src: RenderTargetHandle,
        dst: RenderTargetHandle,
    ) -> BackendResult<()> {
        if src == dst {
            return Ok(());
        }
        let source = self
            .targets
            .get(&src.0)
            .and_then(|fb| fb.depth_stencil.clone())
            .ok_or_else(|| BackendError::BlitFailed(format!("{:?} has no depth-stencil", src)))?;
        let target = self
            .targets
            .get_mut(&dst.0)
            .and_then(|fb| fb.depth_stencil.as_mut())
            .ok_or_else(|| BackendError::BlitFailed(format!("{:?} has no depth-stencil", dst)))?;
        if source.width != target.width || source.height != target.height {
            return Err(BackendError::BlitFailed(format!(
                "size mismatch {}x{} -> {}x{}",
                source.width, source.height, target.width, target.height
            )));
        }
        *target = source;
        Ok(())
    }

    fn blit_color(
        &mut self,
        src: RenderTargetHandle,
        src_index: u32,
        dst: Option<RenderTargetHandle>,
        dst_index: u32,
    ) -> BackendResult<()> {
        let source = self
            .targets
            .get(&src.0)
            .and_then(|fb| fb.colors.get(src_index as usize))
            .cloned()
            .ok_or_else(|| BackendError::BlitFailed(format!("{:?}[{}]", src, src_index)))?;
        let target = self
            .targets
            .get_mut(&Self::target_id(dst))
            .and_then(|fb| fb.colors.get_mut(dst_index as usize))
            .ok_or_else(|| BackendError::BlitFailed(format!("{:?}[{}]", dst, dst_index)))?;

        let sampler = SamplerDescriptor::nearest();
        for y in 0..target.height {
            for x in 0..target.width {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / target.width as f32,
                    (y as f32 + 0.5) / target.height as f32,
                );
                target.set(x, y, source.sample(uv, &sampler));
            }
        }
        Ok(())
    }

    fn draw_mesh(
        &mut self,
        mesh: MeshHandle,
        program: ShaderProgram,
        uniforms: &DrawUniforms,
    ) -> BackendResult<()> {
        let gpu_mesh = self
            .meshes
            .get(&mesh.0)
            .cloned()
            .ok_or_else(|| BackendError::InvalidHandle(format!("{:?}", mesh)))?;
        let mut fb = self.take_bound()?;
        let fragments = self.rasterize_mesh(&mut fb, &gpu_mesh, program, uniforms);
        self.targets.insert(self.bound, fb);

        log::trace!(
            "SoftwareBackend: {:?} drew {} ({} fragments)",
            program,
            gpu_mesh.label,
            fragments
        );
        self.record(program, fragments);
        Ok(())
    }

    fn draw_fullscreen(
        &mut self,
        program: ShaderProgram,
        uniforms: &DrawUniforms,
    ) -> BackendResult<()> {
        let mut fb = self.take_bound()?;
        let mut fragments = 0;
        for y in 0..fb.height {
            for x in 0..fb.width {
                let fragment = Fragment {
                    x,
                    y,
                    depth: 0.0,
                    world: Vec3::ZERO,
                    normal: Vec3::Z,
                    uv: Vec2::new(
                        (x as f32 + 0.5) / fb.width as f32,
                        (y as f32 + 0.5) / fb.height as f32,
                    ),
                    front_facing: true,
                };
                if self.process_fragment(&mut fb, program, uniforms, &fragment) {
                    fragments += 1;
                }
            }
        }
        self.targets.insert(self.bound, fb);
        self.record(program, fragments);
        Ok(())
    }

    fn read_color(&self, target: Option<RenderTargetHandle>, index: u32) -> BackendResult<Vec<u8>> {
        let fb = self.framebuffer(target)?;
        fb.colors
            .get(index as usize)
            .map(ColorBuffer::to_rgba8)
            .ok_or_else(|| BackendError::ReadbackFailed(format!("{} attachment {}", fb.label, index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Mesh;
    use glam::Mat4;

    fn quad_target(backend: &mut SoftwareBackend) -> RenderTargetHandle {
        backend
            .create_render_target(&RenderTargetDescriptor {
                label: "test".into(),
                width: 32,
                height: 32,
                color_formats: vec![TextureFormat::Rgba16Float],
                depth_stencil: true,
            })
            .unwrap()
    }

    fn upload(backend: &mut SoftwareBackend, mesh: &Mesh) -> MeshHandle {
        backend.create_mesh(&mesh.descriptor()).unwrap()
    }

    fn view_proj() -> Mat4 {
        Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y)
    }

    #[test]
    fn test_cull_mode_selects_faces() {
        let mut backend = SoftwareBackend::new(32, 32);
        let target = quad_target(&mut backend);
        let cube = upload(&mut backend, &Mesh::cube());
        backend.bind_render_target(Some(target)).unwrap();
        backend.clear(ClearFlags::ALL, &ClearValues::default()).unwrap();

        let uniforms = DrawUniforms::mesh(Mat4::IDENTITY, view_proj(), Vec4::new(1.0, 0.0, 0.0, 1.0));
        backend.draw_mesh(cube, ShaderProgram::Forward, &uniforms).unwrap();
        assert!(backend.draw_log()[0].fragments > 0);
        assert_eq!(backend.color_at(Some(target), 0, 16, 16).unwrap().x, 1.0);
        let front_depth = backend.depth_at(Some(target), 16, 16).unwrap();

        backend.clear(ClearFlags::ALL, &ClearValues::default()).unwrap();
        backend.set_render_state(&RenderState::default().with_cull_mode(CullMode::Front));
        backend.draw_mesh(cube, ShaderProgram::Forward, &uniforms).unwrap();
        let back_depth = backend.depth_at(Some(target), 16, 16).unwrap();

        assert!(front_depth < back_depth);
        assert!(back_depth < 1.0);
    }

    #[test]
    fn test_stencil_depth_fail_marks_inside_volume() {
        let mut backend = SoftwareBackend::new(32, 32);
        let target = quad_target(&mut backend);
        let cube = upload(&mut backend, &Mesh::cube());
        let sphere = upload(&mut backend, &Mesh::sphere(16, 12));
        backend.bind_render_target(Some(target)).unwrap();
        backend.clear(ClearFlags::ALL, &ClearValues::default()).unwrap();

        // Scene depth: a small cube at the origin.
        let scale = Mat4::from_scale(Vec3::splat(0.5));
        backend
            .draw_mesh(cube, ShaderProgram::Geometry, &DrawUniforms::mesh(scale, view_proj(), Vec4::ONE))
            .unwrap();

        backend.set_render_state(&RenderState {
            depth: DepthState {
                test: Some(CompareFunction::Less),
                write: false,
            },
            stencil: Some(StencilState::separate(
                StencilFaceState::on_depth_fail(StencilOperation::DecrementWrap),
                StencilFaceState::on_depth_fail(StencilOperation::IncrementWrap),
            )),
            cull_mode: CullMode::None,
            color_writes: ColorWrites::empty(),
            ..Default::default()
        });
        let volume = Mat4::from_scale(Vec3::splat(2.0));
        backend
            .draw_mesh(sphere, ShaderProgram::StencilMark, &DrawUniforms::mesh(volume, view_proj(), Vec4::ONE))
            .unwrap();

        let marked = backend.stencil_nonzero_count(Some(target)).unwrap();
        assert!(marked > 0);
        // Center pixel sees the cube inside the sphere.
        let fb = backend.framebuffer(Some(target)).unwrap();
        let ds = fb.depth_stencil.as_ref().unwrap();
        assert_eq!(ds.stencil[ds.index(16, 16)], 1);
        // Corner pixel sees only background.
        assert_eq!(ds.stencil[ds.index(0, 0)], 0);
    }

    #[test]
    fn test_fullscreen_respects_stencil() {
        let mut backend = SoftwareBackend::new(8, 8);
        backend.clear(ClearFlags::ALL, &ClearValues::default()).unwrap();
        backend.set_render_state(&RenderState {
            stencil: Some(StencilState::both(StencilFaceState::test(CompareFunction::NotEqual))),
            ..RenderState::fullscreen()
        });
        backend
            .draw_fullscreen(ShaderProgram::Copy, &DrawUniforms::fullscreen(Vec4::ONE, Vec4::ZERO))
            .unwrap();
        assert_eq!(backend.draw_log()[0].fragments, 0);

        backend.set_render_state(&RenderState::fullscreen());
        backend
            .draw_fullscreen(ShaderProgram::Copy, &DrawUniforms::fullscreen(Vec4::ONE, Vec4::ZERO))
            .unwrap();
        assert_eq!(backend.draw_log()[1].fragments, 64);
    }

    #[test]
    fn test_readback_and_blit() {
        let mut backend = SoftwareBackend::new(4, 4);
        let target = backend
            .create_render_target(&RenderTargetDescriptor {
                label: "half".into(),
                width: 2,
                height: 2,
                color_formats: vec![TextureFormat::Rgba8Unorm],
                depth_stencil: false,
            })
            .unwrap();
        backend.bind_render_target(Some(target)).unwrap();
        backend
            .clear(
                ClearFlags::COLOR,
                &ClearValues {
                    color: Vec4::new(0.0, 1.0, 0.0, 1.0),
                    ..Default::default()
                },
            )
            .unwrap();
        backend.blit_color(target, 0, None, 0).unwrap();

        let pixels = backend.read_color(None, 0).unwrap();
        assert_eq!(pixels.len(), 4 * 4 * 4);
        assert!(pixels.chunks(4).all(|p| p == [0, 255, 0, 255]));
        assert!(backend.blit_depth_stencil(target, target).is_ok());
    }
}
