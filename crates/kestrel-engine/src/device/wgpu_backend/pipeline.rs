use std::collections::HashMap;

use crate::coords::VertexFormat;
use crate::device::GpuShaderId;
use crate::render::{BlendMode, RenderOp};
use crate::texture::{TextureAddressMode, TextureFilter};

pub(super) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Everything that selects a distinct render pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub topology: wgpu::PrimitiveTopology,
    pub vertex: VertexFormat,
    pub blend: BlendMode,
    pub depth: bool,
    pub vertex_shader: Option<GpuShaderId>,
    pub pixel_shader: Option<GpuShaderId>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(super) struct SamplerKey {
    pub filter: TextureFilter,
    pub address: TextureAddressMode,
}

/// Fans are expanded to lists on the CPU; wgpu has no fan topology.
pub(super) fn topology(op: RenderOp) -> wgpu::PrimitiveTopology {
    match op {
        RenderOp::TriangleList | RenderOp::TriangleFan => wgpu::PrimitiveTopology::TriangleList,
        RenderOp::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        RenderOp::LineList => wgpu::PrimitiveTopology::LineList,
        RenderOp::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        RenderOp::PointList => wgpu::PrimitiveTopology::PointList,
    }
}

/// Rewrites a fan (`v0 v1 v2 v3 ..`) as a list (`v0 v1 v2, v0 v2 v3, ..`).
pub(super) fn expand_fan(bytes: &[u8], stride: usize, out: &mut Vec<u8>) -> usize {
    let count = bytes.len() / stride;
    if count < 3 {
        return 0;
    }
    let vertex = |i: usize| &bytes[i * stride..(i + 1) * stride];
    for i in 1..count - 1 {
        out.extend_from_slice(vertex(0));
        out.extend_from_slice(vertex(i));
        out.extend_from_slice(vertex(i + 1));
    }
    (count - 2) * 3
}

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    let comp = |src, dst, operation| wgpu::BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation,
    };
    match mode {
        BlendMode::Alpha => wgpu::BlendState {
            color: comp(
                wgpu::BlendFactor::SrcAlpha,
                wgpu::BlendFactor::OneMinusSrcAlpha,
                wgpu::BlendOperation::Add,
            ),
            alpha: comp(
                wgpu::BlendFactor::One,
                wgpu::BlendFactor::OneMinusSrcAlpha,
                wgpu::BlendOperation::Add,
            ),
        },
        BlendMode::Add => wgpu::BlendState {
            color: comp(
                wgpu::BlendFactor::SrcAlpha,
                wgpu::BlendFactor::One,
                wgpu::BlendOperation::Add,
            ),
            alpha: comp(
                wgpu::BlendFactor::One,
                wgpu::BlendFactor::One,
                wgpu::BlendOperation::Add,
            ),
        },
        BlendMode::Subtract => wgpu::BlendState {
            color: comp(
                wgpu::BlendFactor::SrcAlpha,
                wgpu::BlendFactor::One,
                wgpu::BlendOperation::ReverseSubtract,
            ),
            alpha: comp(
                wgpu::BlendFactor::One,
                wgpu::BlendFactor::One,
                wgpu::BlendOperation::Add,
            ),
        },
        BlendMode::Overwrite => wgpu::BlendState::REPLACE,
    }
}

const PLAIN_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const COLORED_ATTRS: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Unorm8x4];
const TEXTURED_ATTRS: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 2 => Float32x2];
const COLORED_TEXTURED_ATTRS: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Unorm8x4, 2 => Float32x2];

fn vertex_layout(format: VertexFormat) -> wgpu::VertexBufferLayout<'static> {
    let attributes: &'static [wgpu::VertexAttribute] = match format {
        VertexFormat::Plain => &PLAIN_ATTRS,
        VertexFormat::Colored => &COLORED_ATTRS,
        VertexFormat::Textured => &TEXTURED_ATTRS,
        VertexFormat::ColoredTextured => &COLORED_TEXTURED_ATTRS,
    };
    wgpu::VertexBufferLayout {
        array_stride: format.stride() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

fn builtin_vertex_entry(format: VertexFormat) -> &'static str {
    match format {
        VertexFormat::Plain => "vs_plain",
        VertexFormat::Colored => "vs_colored",
        VertexFormat::Textured => "vs_textured",
        VertexFormat::ColoredTextured => "vs_colored_textured",
    }
}

pub(super) fn sampler_descriptor(key: SamplerKey) -> wgpu::SamplerDescriptor<'static> {
    let filter = match key.filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    };
    let address = match key.address {
        TextureAddressMode::Wrap => wgpu::AddressMode::Repeat,
        TextureAddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
    };
    wgpu::SamplerDescriptor {
        label: Some("kestrel sampler"),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    }
}

/// Pipelines built lazily per `PipelineKey`; dropped wholesale on reset.
pub(super) struct PipelineCache {
    pub layout: wgpu::PipelineLayout,
    pub builtin: wgpu::ShaderModule,
    pub target_format: wgpu::TextureFormat,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new(
        device: &wgpu::Device,
        layouts: &[&wgpu::BindGroupLayout],
        target_format: wgpu::TextureFormat,
    ) -> Self {
        let builtin = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kestrel default shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/default.wgsl").into()),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kestrel pipeline layout"),
            bind_group_layouts: layouts,
            immediate_size: 0,
        });

        Self {
            layout,
            builtin,
            target_format,
            pipelines: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.pipelines.clear();
    }

    pub fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    /// Builds the pipeline for `key` if missing. Custom shader modules are looked up in
    /// `shaders`; a custom vertex module must export `vs_main`, a pixel module `fs_main`.
    pub fn ensure(
        &mut self,
        device: &wgpu::Device,
        key: PipelineKey,
        shaders: &HashMap<GpuShaderId, wgpu::ShaderModule>,
    ) {
        if self.pipelines.contains_key(&key) {
            return;
        }

        let (vs_module, vs_entry) = match key.vertex_shader.and_then(|id| shaders.get(&id)) {
            Some(m) => (m, "vs_main"),
            None => (&self.builtin, builtin_vertex_entry(key.vertex)),
        };
        let fs_module = key
            .pixel_shader
            .and_then(|id| shaders.get(&id))
            .unwrap_or(&self.builtin);

        let strip_index_format = None;
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("kestrel pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: vs_module,
                entry_point: Some(vs_entry),
                buffers: &[vertex_layout(key.vertex)],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: fs_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.target_format,
                    blend: Some(blend_state(key.blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: key.depth.then(|| wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipelines.insert(key, pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_expands_to_list() {
        let bytes: Vec<u8> = (0u8..5).collect();
        let mut out = Vec::new();
        assert_eq!(expand_fan(&bytes, 1, &mut out), 9);
        assert_eq!(out, vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
    }

    #[test]
    fn short_fan_draws_nothing() {
        let mut out = Vec::new();
        assert_eq!(expand_fan(&[0, 1], 1, &mut out), 0);
        assert!(out.is_empty());
    }
}
