use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::error::CompositorError;

/// Compiles GLSL through wgpu inside a validation error scope so front-end
/// diagnostics come back as [`CompositorError::ShaderCompile`].
pub(crate) fn compile_stage(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule, CompositorError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(CompositorError::ShaderCompile {
            label: label.to_string(),
            diagnostics: err.to_string(),
        });
    }
    tracing::debug!(label, ?stage, "compiled shader stage");
    Ok(module)
}

/// Pass-through quad vertex shader shared by every program.
///
/// Vertex layout must match `QuadVertex` in `gpu::pipeline`.
pub(crate) const QUAD_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_uv;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = a_uv;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Samples the live frame through its sample-space transform.
///
/// The uniform block layout must match `LiveUniforms` in `gpu::uniforms`.
pub(crate) const LIVE_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform LiveParams {
    mat4 sample_transform;
} params;

layout(set = 1, binding = 0) uniform texture2D live_texture;
layout(set = 1, binding = 1) uniform sampler live_sampler;

void main() {
    vec2 uv = (params.sample_transform * vec4(v_uv, 0.0, 1.0)).xy;
    out_color = vec4(texture(sampler2D(live_texture, live_sampler), uv).rgb, 1.0);
}
";

/// Plain 2-D sampling of a ring slot; stored frames are already transformed.
pub(crate) const STORED_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D stored_texture;
layout(set = 0, binding = 1) uniform sampler stored_sampler;

void main() {
    out_color = vec4(texture(sampler2D(stored_texture, stored_sampler), v_uv).rgb, 1.0);
}
";
