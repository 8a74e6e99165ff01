use futures::executor::block_on;
use tracing::{error, info};

use slopemap_shared::difficulty::GradingTables;
use slopemap_shared::style::VisualizationStyle;

use crate::error::{RendererError, RendererResult};
use crate::renderer::Vertex;
use crate::shaders::{FRAGMENT_ENTRY, VERTEX_ENTRY, fragment_source, vertex_source};

pub const RENDER_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// One compiled render pipeline per visualization style, sharing a vertex stage
/// and bind group layout.
pub struct ShaderProgramSet {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Vec<(VisualizationStyle, wgpu::RenderPipeline)>,
}

impl ShaderProgramSet {
    /// Compile every style. Any validation failure fails the whole set.
    pub fn compile(
        device: &wgpu::Device,
        tables: &GradingTables,
        filterable: bool,
    ) -> RendererResult<Self> {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("terrain-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                elevation_entry(1, filterable),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(if filterable {
                        wgpu::SamplerBindingType::Filtering
                    } else {
                        wgpu::SamplerBindingType::NonFiltering
                    }),
                    count: None,
                },
                elevation_entry(3, filterable),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("terrain-pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let vertex_module = compile_module(device, "terrain-vertex", vertex_source(), "vertex")?;

        let mut pipelines = Vec::with_capacity(VisualizationStyle::ALL.len());
        for style in VisualizationStyle::ALL {
            let source = fragment_source(style, tables);
            let fragment_module = compile_module(device, style.as_str(), &source, style.as_str())?;

            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(style.as_str()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(VERTEX_ENTRY),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x2,
                        }],
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some(FRAGMENT_ENTRY),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: RENDER_TARGET_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            if let Some(e) = block_on(device.pop_error_scope()) {
                error!(style = style.as_str(), error = %e, "terrain pipeline creation failed");
                return Err(RendererError::ShaderCompilation {
                    style: style.as_str(),
                    message: e.to_string(),
                });
            }
            pipelines.push((style, pipeline));
        }

        info!(count = pipelines.len(), filterable, "terrain shader programs compiled");
        Ok(Self {
            bind_group_layout,
            pipelines,
        })
    }

    pub fn pipeline(&self, style: VisualizationStyle) -> Option<&wgpu::RenderPipeline> {
        self.pipelines
            .iter()
            .find(|(s, _)| *s == style)
            .map(|(_, pipeline)| pipeline)
    }
}

fn elevation_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn compile_module(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    style: &'static str,
) -> RendererResult<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match block_on(device.pop_error_scope()) {
        Some(e) => {
            error!(style, error = %e, "terrain shader failed to compile");
            Err(RendererError::ShaderCompilation {
                style,
                message: e.to_string(),
            })
        }
        None => Ok(module),
    }
}
