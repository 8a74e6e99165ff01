use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::executor::block_on;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

use slopemap_shared::difficulty::GradingTables;
use slopemap_shared::padding::PaddedElevationBuffer;
use slopemap_shared::shading::{RenderedTile, TileRenderParams};
use slopemap_shared::tile::{CoarseMapping, TileCoord};

use crate::TerrainShading;
use crate::error::{RendererError, RendererResult};
use crate::programs::ShaderProgramSet;
use crate::texture_pool::{PooledTexture, TexturePool, TextureSpec};

// --- GPU data types ---

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct Vertex {
    position: [f32; 2],
}

const QUAD_VERTICES: &[Vertex] = &[
    Vertex {
        position: [0.0, 0.0],
    },
    Vertex {
        position: [1.0, 0.0],
    },
    Vertex {
        position: [0.0, 1.0],
    },
    Vertex {
        position: [1.0, 1.0],
    },
];

const QUAD_INDICES: &[u16] = &[0, 1, 2, 2, 1, 3];

/// Fragment uniforms: 16 scalars = 64 bytes. Field order matches `Params` in the WGSL prelude.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct TerrainUniform {
    zoom: f32,
    latitude: f32,
    longitude: f32,
    day_of_year: f32,
    tile_x: f32,
    tile_y: f32,
    tile_size: f32,
    border: f32,
    padded_size: f32,
    convention: u32,
    smooth_kernel: u32,
    has_coarse: u32,
    coarse_scale: f32,
    coarse_offset_x: f32,
    coarse_offset_y: f32,
    coarse_size: f32,
}

impl TerrainUniform {
    fn new(
        padded: &PaddedElevationBuffer,
        params: &TileRenderParams,
        coarse: Option<(&PaddedElevationBuffer, CoarseMapping)>,
    ) -> Self {
        let (has_coarse, scale, offset, coarse_size) = match coarse {
            Some((buffer, mapping)) => (1, mapping.scale, mapping.offset, buffer.size as f32),
            None => (0, 0.0, (0.0, 0.0), 0.0),
        };
        Self {
            zoom: f32::from(params.zoom),
            latitude: params.lat as f32,
            longitude: params.lon as f32,
            day_of_year: f32::from(params.day_of_year),
            tile_x: params.tile_x as f32,
            tile_y: params.tile_y as f32,
            tile_size: padded.tile_size as f32,
            border: padded.border() as f32,
            padded_size: padded.size as f32,
            convention: params.convention().code(),
            smooth_kernel: u32::from(params.uses_smooth_kernel()),
            has_coarse,
            coarse_scale: scale as f32,
            coarse_offset_x: offset.0 as f32,
            coarse_offset_y: offset.1 as f32,
            coarse_size,
        }
    }
}

/// Bytes per row of a readback buffer, padded to the copy alignment.
fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// Reject buffers the device cannot hold in one texture before touching the GPU.
fn check_texture_size(size: usize, max_dimension: u32) -> RendererResult<()> {
    if size > max_dimension as usize {
        return Err(RendererError::InvalidBuffer(format!(
            "{size}x{size} buffer exceeds the {max_dimension} texel texture limit"
        )));
    }
    Ok(())
}

/// Submitted copy of a render target, waiting to be mapped.
struct Readback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    bytes_per_row: u32,
}

/// Headless wgpu renderer producing overlay tiles from padded elevation buffers.
pub struct TerrainRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    programs: Option<ShaderProgramSet>,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    pool: TexturePool<wgpu::Texture>,
    supported: AtomicBool,
    render_lock: Mutex<()>,
}

impl TerrainRenderer {
    /// Open a headless device and compile every shader program.
    ///
    /// Fails only when no adapter or device is available. A program that fails
    /// to compile yields a renderer that reports itself unsupported.
    pub async fn new(tables: &GradingTables) -> RendererResult<Self> {
        Self::open(tables, false).await
    }

    /// Like [`TerrainRenderer::new`], optionally forcing a software adapter on any backend.
    async fn open(tables: &GradingTables, force_fallback_adapter: bool) -> RendererResult<Self> {
        let backends = if force_fallback_adapter {
            wgpu::Backends::all()
        } else {
            wgpu::Backends::PRIMARY
        };
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .ok_or(RendererError::NoAdapter)?;
        let adapter_info = adapter.get_info();

        // Linear sampling of R32Float is an optional feature; fall back to nearest without it.
        let filterable = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        let required_features = if filterable {
            wgpu::Features::FLOAT32_FILTERABLE
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("slopemap-device"),
                    required_features,
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    ..Default::default()
                },
                None,
            )
            .await?;

        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            filterable,
            "terrain renderer device ready"
        );

        let programs = match ShaderProgramSet::compile(&device, tables, filterable) {
            Ok(programs) => Some(programs),
            Err(e) => {
                warn!(error = %e, "terrain renderer unsupported, tiles will be transparent");
                None
            }
        };

        let filter = if filterable {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("elevation-sampler"),
            mag_filter: filter,
            min_filter: filter,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad-verts"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad-indices"),
            contents: bytemuck::cast_slice(QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("terrain-ubo"),
            size: std::mem::size_of::<TerrainUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            device,
            queue,
            adapter_name: adapter_info.name,
            supported: AtomicBool::new(programs.is_some()),
            programs,
            sampler,
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            pool: TexturePool::default(),
            render_lock: Mutex::new(()),
        })
    }

    pub fn new_blocking(tables: &GradingTables) -> RendererResult<Self> {
        block_on(Self::new(tables))
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn pooled_textures(&self) -> usize {
        self.pool.live_pooled()
    }

    /// Render one tile. `Ok(None)` when there is nothing to render or the renderer is unsupported.
    pub fn process_terrain_tile(
        &self,
        padded: Option<&PaddedElevationBuffer>,
        params: &TileRenderParams,
        coarse: Option<&PaddedElevationBuffer>,
    ) -> RendererResult<Option<RenderedTile>> {
        let Some(padded) = padded else {
            return Ok(None);
        };
        if !self.supported.load(Ordering::Acquire) {
            return Ok(None);
        }
        let Some(pipeline) = self
            .programs
            .as_ref()
            .and_then(|programs| programs.pipeline(params.style))
        else {
            return Ok(None);
        };
        if padded.size == 0 || padded.data.len() != padded.size * padded.size {
            return Err(RendererError::InvalidBuffer(format!(
                "{} samples for a {}x{} buffer",
                padded.data.len(),
                padded.size,
                padded.size
            )));
        }
        let output_size = padded.output_size() as u32;
        if output_size == 0 {
            return Err(RendererError::InvalidBuffer("empty output tile".into()));
        }
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        check_texture_size(padded.size, max_dimension)?;
        if let Some(buffer) = coarse {
            check_texture_size(buffer.size, max_dimension)?;
        }

        let coarse = match coarse {
            Some(buffer) if params.style.casts_shadows() => {
                TileCoord::new(params.zoom, params.tile_x, params.tile_y)
                    .and_then(CoarseMapping::for_tile)
                    .map(|mapping| (buffer, mapping))
            }
            _ => None,
        };

        let _guard = self.render_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Uploads, draw and copy share one scope so any validation error fails this tile only.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let fine_tex = self.upload_elevation(padded);
        let coarse_tex = coarse.map(|(buffer, _)| self.upload_elevation(buffer));
        let target = self
            .pool
            .acquire(&self.device, TextureSpec::render_target(output_size));

        let uniform = TerrainUniform::new(padded, params, coarse);
        let readback = self.draw(pipeline, &uniform, &fine_tex, coarse_tex.as_ref(), &target);
        let scope_error = block_on(self.device.pop_error_scope());

        self.pool.release(&self.device, fine_tex);
        if let Some(tex) = coarse_tex {
            self.pool.release(&self.device, tex);
        }
        self.pool.release(&self.device, target);

        if let Some(e) = scope_error {
            return Err(RendererError::Render(e.to_string()));
        }
        let rgba = self.read_back(readback?)?;
        debug!(
            z = params.zoom,
            x = params.tile_x,
            y = params.tile_y,
            style = %params.style,
            "terrain tile rendered"
        );
        Ok(Some(RenderedTile {
            width: output_size,
            height: output_size,
            rgba,
        }))
    }

    fn upload_elevation(&self, buffer: &PaddedElevationBuffer) -> PooledTexture<wgpu::Texture> {
        let size = buffer.size as u32;
        let pooled = self.pool.acquire(&self.device, TextureSpec::elevation(size));
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &pooled.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&buffer.data),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size),
                rows_per_image: Some(size),
            },
            pooled.spec.extent(),
        );
        pooled
    }

    /// Encode and submit the draw plus the copy into a mappable buffer.
    fn draw(
        &self,
        pipeline: &wgpu::RenderPipeline,
        uniform: &TerrainUniform,
        fine: &PooledTexture<wgpu::Texture>,
        coarse: Option<&PooledTexture<wgpu::Texture>>,
        target: &PooledTexture<wgpu::Texture>,
    ) -> RendererResult<Readback> {
        let Some(programs) = self.programs.as_ref() else {
            return Err(RendererError::Unsupported);
        };
        let width = target.spec.width;
        let height = target.spec.height;

        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniform));

        let fine_view = fine.texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Without coarse data the fine texture fills the slot; `has_coarse` keeps it unread.
        let coarse_view = coarse
            .map(|tex| tex.texture.create_view(&wgpu::TextureViewDescriptor::default()))
            .unwrap_or_else(|| fine.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        let target_view = target.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("terrain-bg"),
            layout: &programs.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&fine_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&coarse_view),
                },
            ],
        });

        let bytes_per_row = aligned_bytes_per_row(width);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("terrain-readback"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("terrain-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("terrain-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            target.spec.extent(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(Readback {
            buffer,
            width,
            height,
            bytes_per_row,
        })
    }

    /// Map the readback buffer and strip the row padding.
    fn read_back(&self, readback: Readback) -> RendererResult<Vec<u8>> {
        let Readback {
            buffer,
            width,
            height,
            bytes_per_row,
        } = readback;
        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| RendererError::Readback("map callback dropped".into()))?
            .map_err(|e| RendererError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range();
        let row_bytes = (width * 4) as usize;
        let mut rgba = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * bytes_per_row as usize;
            rgba.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        buffer.unmap();

        Ok(rgba)
    }

    /// Release pooled GPU textures and stop accepting work.
    pub fn cleanup(&self) {
        self.supported.store(false, Ordering::Release);
        let _guard = self.render_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.pool.cleanup(&self.device);
    }
}

impl Drop for TerrainRenderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl TerrainShading for TerrainRenderer {
    fn backend(&self) -> &str {
        "wgpu"
    }

    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::Acquire)
    }

    fn process_terrain_tile(
        &self,
        padded: Option<&PaddedElevationBuffer>,
        params: &TileRenderParams,
        coarse: Option<&PaddedElevationBuffer>,
    ) -> RendererResult<Option<RenderedTile>> {
        TerrainRenderer::process_terrain_tile(self, padded, params, coarse)
    }
}

#[cfg(test)]
mod tests {
    use slopemap_shared::colors::{TRANSPARENT, opaque};
    use slopemap_shared::difficulty::DifficultyConvention;
    use slopemap_shared::elevation::NO_DATA;
    use slopemap_shared::shading::{AVALANCHE_COLORS, shade_tile};
    use slopemap_shared::style::{PaddingKind, VisualizationStyle};
    use slopemap_shared::tile::pixel_size_m;

    use super::*;

    fn params(style: VisualizationStyle, zoom: u8) -> TileRenderParams {
        TileRenderParams {
            zoom,
            tile_x: 2128 >> (12 - zoom.min(12)),
            tile_y: 1459 >> (12 - zoom.min(12)),
            lat: 46.0,
            lon: 7.0,
            style,
            day_of_year: 172,
        }
    }

    fn flat(kind: PaddingKind, tile_size: usize) -> PaddedElevationBuffer {
        let size = kind.padded_size(tile_size);
        PaddedElevationBuffer {
            kind,
            tile_size,
            size,
            data: vec![1200.0; size * size],
        }
    }

    #[test]
    fn uniform_is_64_bytes() {
        assert_eq!(std::mem::size_of::<TerrainUniform>(), 64);
    }

    #[test]
    fn uniform_carries_tile_geometry() {
        let padded = flat(PaddingKind::Minimal, 256);
        let uniform = TerrainUniform::new(&padded, &params(VisualizationStyle::Slope, 12), None);
        assert_eq!(uniform.border, 3.0);
        assert_eq!(uniform.padded_size, 262.0);
        assert_eq!(uniform.tile_size, 256.0);
        assert_eq!(uniform.smooth_kernel, 0);
        assert_eq!(uniform.has_coarse, 0);
        assert_eq!(uniform.convention, 0);
    }

    #[test]
    fn uniform_carries_coarse_mapping() {
        let padded = flat(PaddingKind::Extended, 256);
        let coarse = flat(PaddingKind::Extended, 256);
        let p = params(VisualizationStyle::SunExposure, 12);
        let tile = TileCoord::new(p.zoom, p.tile_x, p.tile_y).unwrap();
        let mapping = CoarseMapping::for_tile(tile).unwrap();
        let uniform = TerrainUniform::new(&padded, &p, Some((&coarse, mapping)));
        assert_eq!(uniform.has_coarse, 1);
        assert_eq!(uniform.coarse_size, 768.0);
        assert!((uniform.coarse_scale - 1.0 / 48.0).abs() < 1e-7);
        assert_eq!(uniform.border, 256.0);
    }

    #[test]
    fn high_zoom_selects_smooth_kernel() {
        let padded = flat(PaddingKind::Minimal, 256);
        let mut p = params(VisualizationStyle::Slope, 12);
        p.zoom = 14;
        assert_eq!(TerrainUniform::new(&padded, &p, None).smooth_kernel, 1);
    }

    #[test]
    fn row_alignment() {
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
        assert_eq!(aligned_bytes_per_row(256), 1024);
    }

    #[test]
    fn oversized_buffers_are_rejected_before_upload() {
        assert!(check_texture_size(768, 2048).is_ok());
        assert!(check_texture_size(2048, 2048).is_ok());
        assert!(matches!(
            check_texture_size(3 * 1024, 2048),
            Err(RendererError::InvalidBuffer(_))
        ));
    }

    /// Hardware adapter if present, otherwise a software one.
    fn gpu_renderer() -> Option<TerrainRenderer> {
        let tables = GradingTables::downhill();
        let renderer = TerrainRenderer::new_blocking(&tables)
            .or_else(|_| block_on(TerrainRenderer::open(&tables, true)))
            .ok()?;
        renderer.is_supported().then_some(renderer)
    }

    const TILE: usize = 32;

    fn surface(kind: PaddingKind, f: impl Fn(f32, f32) -> f32) -> PaddedElevationBuffer {
        let size = kind.padded_size(TILE);
        let data = (0..size * size)
            .map(|i| f((i % size) as f32, (i / size) as f32))
            .collect();
        PaddedElevationBuffer {
            kind,
            tile_size: TILE,
            size,
            data,
        }
    }

    fn pixel_m(p: &TileRenderParams) -> f32 {
        pixel_size_m(f64::from(p.zoom), p.lat, TILE as f64) as f32
    }

    /// Plane dropping eastward with the given rise over run.
    fn east_plane(p: &TileRenderParams, gradient: f32) -> PaddedElevationBuffer {
        let drop = gradient * pixel_m(p);
        surface(p.style.padding_kind(), move |col, _| 4000.0 - drop * col)
    }

    /// Render on the GPU and require every channel within 2 of the CPU reference.
    fn assert_matches_cpu(
        renderer: &TerrainRenderer,
        padded: &PaddedElevationBuffer,
        p: &TileRenderParams,
        coarse: Option<&PaddedElevationBuffer>,
    ) -> RenderedTile {
        let gpu = renderer
            .process_terrain_tile(Some(padded), p, coarse)
            .unwrap()
            .unwrap();
        let cpu = shade_tile(padded, p, coarse, &GradingTables::downhill());
        assert_eq!((gpu.width, gpu.height), (cpu.width, cpu.height));
        for (i, (g, c)) in gpu.rgba.iter().zip(&cpu.rgba).enumerate() {
            assert!(
                g.abs_diff(*c) <= 2,
                "{} at zoom {}: pixel ({}, {}) channel {}: gpu {g}, cpu {c}",
                p.style,
                p.zoom,
                (i / 4) % TILE,
                i / 4 / TILE,
                i % 4
            );
        }
        gpu
    }

    #[test]
    fn gpu_lifecycle_and_pooling() {
        let Some(renderer) = gpu_renderer() else {
            eprintln!("no wgpu adapter available, skipping");
            return;
        };
        let padded = flat(PaddingKind::Minimal, 64);
        let p = params(VisualizationStyle::Slope, 12);
        assert!(renderer.process_terrain_tile(None, &p, None).unwrap().is_none());

        let tile = renderer
            .process_terrain_tile(Some(&padded), &p, None)
            .unwrap()
            .unwrap();
        assert_eq!((tile.width, tile.height), (64, 64));
        assert!(tile.rgba.chunks_exact(4).all(|px| px[3] == 255));
        assert!(renderer.pooled_textures() > 0);

        renderer.cleanup();
        assert_eq!(renderer.pooled_textures(), 0);
        assert!(renderer.process_terrain_tile(Some(&padded), &p, None).unwrap().is_none());
    }

    #[test]
    fn gpu_slope_and_aspect_match_cpu() {
        let Some(renderer) = gpu_renderer() else {
            eprintln!("no wgpu adapter available, skipping");
            return;
        };
        let centre = (PaddingKind::Minimal.border(TILE) + TILE / 2) as f32;
        for zoom in [12, 14] {
            let p = params(VisualizationStyle::Slope, zoom);
            let scale = pixel_m(&p);
            // Bowl: slope grows from 0 at the centre toward the edges.
            let mut bowl = surface(PaddingKind::Minimal, |col, row| {
                let (dx, dy) = (col - centre, row - centre);
                1000.0 + 0.02 * scale * (dx * dx + dy * dy)
            });
            bowl.set(10, 12, NO_DATA);
            let tile = assert_matches_cpu(&renderer, &bowl, &p, None);
            assert_eq!(tile.pixel(7, 9), TRANSPARENT);

            let p = params(VisualizationStyle::Aspect, zoom);
            let tan = 20f32.to_radians().tan() * scale;
            let cone = surface(PaddingKind::Minimal, |col, row| {
                3000.0 - tan * (col - centre).hypot(row - centre)
            });
            assert_matches_cpu(&renderer, &cone, &p, None);
        }
    }

    #[test]
    fn gpu_difficulty_boundaries_match_cpu() {
        let Some(renderer) = gpu_renderer() else {
            eprintln!("no wgpu adapter available, skipping");
            return;
        };
        let europe = params(VisualizationStyle::DownhillDifficulty, 12);
        assert_eq!(europe.convention(), DifficultyConvention::Europe);
        let below = assert_matches_cpu(&renderer, &east_plane(&europe, 0.24), &europe, None);
        let above = assert_matches_cpu(&renderer, &east_plane(&europe, 0.26), &europe, None);
        assert_eq!(below.pixel(16, 16)[3], 255);
        assert_eq!(above.pixel(16, 16)[3], 255);
        assert_ne!(below.pixel(16, 16), above.pixel(16, 16));

        let mut japan = europe;
        (japan.lat, japan.lon) = (36.7, 137.8);
        assert_eq!(japan.convention(), DifficultyConvention::Japan);
        let steep = assert_matches_cpu(&renderer, &east_plane(&japan, 1.2), &japan, None);
        assert!(steep.is_fully_transparent());
        let graded = assert_matches_cpu(&renderer, &east_plane(&japan, 0.9), &japan, None);
        assert!(graded.rgba.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn gpu_avalanche_bands_match_cpu() {
        let Some(renderer) = gpu_renderer() else {
            eprintln!("no wgpu adapter available, skipping");
            return;
        };
        let p = params(VisualizationStyle::AvalancheSlopeClasses, 12);
        let bands = [
            (25.0, TRANSPARENT),
            (33.0, opaque(AVALANCHE_COLORS[0])),
            (38.0, opaque(AVALANCHE_COLORS[1])),
            (43.0, opaque(AVALANCHE_COLORS[2])),
            (50.0, opaque(AVALANCHE_COLORS[3])),
        ];
        for (degrees, expected) in bands {
            let plane = east_plane(&p, f32::to_radians(degrees).tan());
            let tile = assert_matches_cpu(&renderer, &plane, &p, None);
            assert_eq!(tile.pixel(16, 16), expected, "{degrees} degrees");
        }
    }

    #[test]
    fn gpu_sun_exposure_matches_cpu() {
        let Some(renderer) = gpu_renderer() else {
            eprintln!("no wgpu adapter available, skipping");
            return;
        };
        let flat_fine = surface(PaddingKind::Extended, |_, _| 1500.0);
        let flat_coarse = surface(PaddingKind::Extended, |_, _| 1500.0);
        for day in [172, 355] {
            let mut p = params(VisualizationStyle::SunExposure, 12);
            p.day_of_year = day;
            assert_matches_cpu(&renderer, &flat_fine, &p, None);
            let tile = assert_matches_cpu(&renderer, &flat_fine, &p, Some(&flat_coarse));
            assert!(tile.rgba.chunks_exact(4).all(|px| px[3] == 255));
        }
    }
}
